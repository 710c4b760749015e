use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};

use crate::snapshot::SnapshotRecord;

const INSERT_CHUNK_SIZE: usize = 100;

/// Replaces the stored snapshot history of a table.
pub async fn replace_snapshots(
    tr: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    table_name: &str,
    snapshots: &[SnapshotRecord],
) -> Result<()> {
    sqlx::query("DELETE FROM snapshots WHERE table_name = $1;")
        .bind(table_name)
        .execute(&mut **tr)
        .await
        .with_context(|| format!("deleting snapshots of {table_name}"))?;

    for chunk in snapshots.chunks(INSERT_CHUNK_SIZE) {
        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO snapshots (table_name, snapshot_id, parent_id, committed_at, \
             operation, manifest_list, summary) ",
        );
        builder.push_values(chunk, |mut b, snapshot| {
            b.push_bind(table_name)
                .push_bind(snapshot.snapshot_id)
                .push_bind(snapshot.parent_id)
                .push_bind(snapshot.committed_at)
                .push_bind(&snapshot.operation)
                .push_bind(&snapshot.manifest_list)
                .push_bind(snapshot.summary.clone());
        });
        builder
            .build()
            .execute(&mut **tr)
            .await
            .with_context(|| format!("inserting snapshots of {table_name}"))?;
    }
    Ok(())
}

fn parse_snapshot_row(row: &PgRow) -> Result<SnapshotRecord> {
    Ok(SnapshotRecord {
        snapshot_id: row.try_get("snapshot_id")?,
        parent_id: row.try_get("parent_id")?,
        committed_at: row.try_get("committed_at")?,
        operation: row.try_get("operation")?,
        manifest_list: row.try_get("manifest_list")?,
        summary: row.try_get("summary")?,
    })
}

/// Stored snapshots of a table, newest first.
pub async fn list_snapshots(pool: &PgPool, table_name: &str) -> Result<Vec<SnapshotRecord>> {
    let rows = sqlx::query(
        "SELECT snapshot_id, parent_id, committed_at, operation, manifest_list, summary
         FROM snapshots
         WHERE table_name = $1
         ORDER BY committed_at DESC, snapshot_id DESC;",
    )
    .bind(table_name)
    .fetch_all(pool)
    .await
    .with_context(|| format!("listing snapshots of {table_name}"))?;
    rows.iter().map(parse_snapshot_row).collect()
}
