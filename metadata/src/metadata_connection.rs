use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

use crate::sql_migration::migrate_db;

/// Connects to the metadata database.
pub async fn connect_to_metadata_db(db_uri: &str) -> Result<PgPool> {
    info!("connecting to metadata database");
    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect(db_uri)
        .await
        .with_context(|| String::from("Connecting to metadata database"))?;
    Ok(pool)
}

/// Connects and brings the schema up to date.
pub async fn connect_and_migrate(db_uri: &str) -> Result<PgPool> {
    let pool = connect_to_metadata_db(db_uri).await?;
    migrate_db(pool.clone()).await?;
    Ok(pool)
}
