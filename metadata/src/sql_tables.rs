use anyhow::{Context, Result};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::table_descriptor::TableDescriptor;

/// Inserts or replaces the stored descriptor for a table.
pub async fn upsert_table_descriptor(
    tr: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    descriptor: &TableDescriptor,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO tables (name, columns, partitions, updated_at)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (name) DO UPDATE
         SET columns = EXCLUDED.columns,
             partitions = EXCLUDED.partitions,
             updated_at = EXCLUDED.updated_at;",
    )
    .bind(&descriptor.name)
    .bind(
        serde_json::to_value(&descriptor.columns).with_context(|| "serializing table columns")?,
    )
    .bind(
        serde_json::to_value(&descriptor.partition_levels)
            .with_context(|| "serializing partition levels")?,
    )
    .bind(descriptor.updated_at)
    .execute(&mut **tr)
    .await
    .with_context(|| format!("upserting table descriptor for {}", descriptor.name))?;
    Ok(())
}

fn parse_table_row(row: &PgRow) -> Result<TableDescriptor> {
    let columns: serde_json::Value = row.try_get("columns")?;
    let partition_levels: serde_json::Value = row.try_get("partitions")?;
    Ok(TableDescriptor {
        name: row.try_get("name")?,
        columns: serde_json::from_value(columns).with_context(|| "parsing table columns")?,
        partition_levels: serde_json::from_value(partition_levels)
            .with_context(|| "parsing partition levels")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn fetch_table_descriptor(
    pool: &PgPool,
    name: &str,
) -> Result<Option<TableDescriptor>> {
    let row = sqlx::query(
        "SELECT name, columns, partitions, updated_at
         FROM tables
         WHERE name = $1;",
    )
    .bind(name)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("fetching table descriptor for {name}"))?;
    row.as_ref().map(parse_table_row).transpose()
}

pub async fn list_table_descriptors(pool: &PgPool) -> Result<Vec<TableDescriptor>> {
    let rows = sqlx::query(
        "SELECT name, columns, partitions, updated_at
         FROM tables
         ORDER BY name;",
    )
    .fetch_all(pool)
    .await
    .with_context(|| "listing table descriptors")?;
    rows.iter().map(parse_table_row).collect()
}
