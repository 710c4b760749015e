use crate::sql_metadata_db::create_tables;
use anyhow::Result;
use sqlx::Row;
use tracing::{error, info};

/// The latest schema version for the metadata store.
pub const LATEST_METADATA_SCHEMA_VERSION: i32 = 1;

/// Reads the current schema version from the database.
pub async fn read_metadata_schema_version(tr: &mut sqlx::Transaction<'_, sqlx::Postgres>) -> i32 {
    match sqlx::query(
        "SELECT version
         FROM floe_migration;",
    )
    .fetch_one(&mut **tr)
    .await
    {
        Ok(row) => row.get("version"),
        Err(e) => {
            info!(
                "Error reading metadata schema version, assuming version 0: {}",
                e
            );
            0
        }
    }
}

/// Serializes concurrent migrations of the same database.
pub async fn acquire_lock(tr: &mut sqlx::Transaction<'_, sqlx::Postgres>, key: i64) -> Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(key)
        .execute(&mut **tr)
        .await?;
    Ok(())
}

async fn execute_migration(pool: sqlx::Pool<sqlx::Postgres>) -> Result<()> {
    let mut current_version = read_metadata_schema_version(&mut pool.begin().await?).await;
    if 0 == current_version {
        info!("creating v1 metadata schema");
        let mut tr = pool.begin().await?;
        create_tables(&mut tr).await?;
        current_version = read_metadata_schema_version(&mut tr).await;
        tr.commit().await?;
    }
    assert_eq!(current_version, LATEST_METADATA_SCHEMA_VERSION);
    Ok(())
}

/// Brings the metadata schema up to date, taking an advisory lock so that
/// multiple instances starting at once run the migration exactly once.
pub async fn migrate_db(pool: sqlx::Pool<sqlx::Postgres>) -> Result<()> {
    let mut tr = pool.begin().await?;
    let mut current_version = read_metadata_schema_version(&mut tr).await;
    drop(tr);
    info!("current metadata schema: {}", current_version);
    if current_version != LATEST_METADATA_SCHEMA_VERSION {
        let mut tr = pool.begin().await?;
        acquire_lock(&mut tr, 0).await?;
        current_version = read_metadata_schema_version(&mut pool.begin().await?).await;
        if LATEST_METADATA_SCHEMA_VERSION == current_version {
            return Ok(());
        }
        if let Err(e) = execute_migration(pool.clone()).await {
            error!("Error migrating database: {}", e);
            return Err(e);
        }
        current_version = read_metadata_schema_version(&mut tr).await;
    }
    assert_eq!(current_version, LATEST_METADATA_SCHEMA_VERSION);
    Ok(())
}
