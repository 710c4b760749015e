use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};

use crate::partition::{PartitionDrillEntry, PartitionStats, TableTotals};

/// Multi-row inserts are chunked so one refresh of a very wide table does not
/// build an unbounded statement.
const INSERT_CHUNK_SIZE: usize = 100;

/// Replaces the stored partition set of a table. Delete-then-insert keeps a
/// retried refresh idempotent.
pub async fn replace_partitions(
    tr: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    table_name: &str,
    partitions: &[PartitionStats],
) -> Result<()> {
    sqlx::query("DELETE FROM partitions WHERE table_name = $1;")
        .bind(table_name)
        .execute(&mut **tr)
        .await
        .with_context(|| format!("deleting partitions of {table_name}"))?;

    let mut rows = Vec::with_capacity(partitions.len());
    for stats in partitions {
        let key = serde_json::to_value(&stats.partition)
            .with_context(|| "serializing partition key")?;
        rows.push((key, stats));
    }
    for chunk in rows.chunks(INSERT_CHUNK_SIZE) {
        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO partitions (table_name, partition, spec_id, record_count, file_count, \
             total_data_file_size_in_bytes, needs_optimize, needs_optimize_count, \
             last_updated_at, last_updated_snapshot_id) ",
        );
        builder.push_values(chunk, |mut b, (key, stats)| {
            b.push_bind(table_name)
                .push_bind(key.clone())
                .push_bind(stats.spec_id)
                .push_bind(stats.record_count)
                .push_bind(stats.file_count)
                .push_bind(stats.total_data_file_size_in_bytes)
                .push_bind(stats.needs_optimize)
                .push_bind(stats.needs_optimize_count)
                .push_bind(stats.last_updated_at)
                .push_bind(stats.last_updated_snapshot_id);
        });
        builder
            .build()
            .execute(&mut **tr)
            .await
            .with_context(|| format!("inserting partitions of {table_name}"))?;
    }
    Ok(())
}

fn parse_partition_row(row: &PgRow) -> Result<PartitionStats> {
    let key: serde_json::Value = row.try_get("partition")?;
    Ok(PartitionStats {
        partition: serde_json::from_value(key).with_context(|| "parsing partition key")?,
        spec_id: row.try_get("spec_id")?,
        record_count: row.try_get("record_count")?,
        file_count: row.try_get("file_count")?,
        total_data_file_size_in_bytes: row.try_get("total_data_file_size_in_bytes")?,
        needs_optimize: row.try_get("needs_optimize")?,
        needs_optimize_count: row.try_get("needs_optimize_count")?,
        last_updated_at: row.try_get("last_updated_at")?,
        last_updated_snapshot_id: row.try_get("last_updated_snapshot_id")?,
    })
}

pub async fn list_partitions(pool: &PgPool, table_name: &str) -> Result<Vec<PartitionStats>> {
    let rows = sqlx::query(
        "SELECT partition, spec_id, record_count, file_count, total_data_file_size_in_bytes,
                needs_optimize, needs_optimize_count, last_updated_at, last_updated_snapshot_id
         FROM partitions
         WHERE table_name = $1
         ORDER BY partition;",
    )
    .bind(table_name)
    .fetch_all(pool)
    .await
    .with_context(|| format!("listing partitions of {table_name}"))?;
    rows.iter().map(parse_partition_row).collect()
}

/// Sums partition statistics for one table's summary.
pub async fn fetch_table_totals(pool: &PgPool, table_name: &str) -> Result<TableTotals> {
    let row = sqlx::query(
        "SELECT count(*) AS partition_count,
                COALESCE(sum(record_count), 0)::BIGINT AS record_count,
                COALESCE(sum(file_count), 0)::BIGINT AS file_count,
                COALESCE(sum(total_data_file_size_in_bytes), 0)::BIGINT AS total_data_file_size_in_bytes,
                count(*) FILTER (WHERE needs_optimize) AS partitions_needing_optimize
         FROM partitions
         WHERE table_name = $1;",
    )
    .bind(table_name)
    .fetch_one(pool)
    .await
    .with_context(|| format!("aggregating partitions of {table_name}"))?;
    Ok(TableTotals {
        partition_count: row.try_get("partition_count")?,
        record_count: row.try_get("record_count")?,
        file_count: row.try_get("file_count")?,
        total_data_file_size_in_bytes: row.try_get("total_data_file_size_in_bytes")?,
        partitions_needing_optimize: row.try_get("partitions_needing_optimize")?,
    })
}

/// Aggregates the values of `next_level` across all partitions matching the
/// already-selected levels, for one step of the partition drill-down.
pub async fn drill_down_partitions(
    pool: &PgPool,
    table_name: &str,
    selected: &BTreeMap<String, String>,
    next_level: &str,
) -> Result<Vec<PartitionDrillEntry>> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT partition->>");
    builder.push_bind(next_level);
    builder.push(
        " AS value,
                count(*) AS partition_count,
                COALESCE(sum(record_count), 0)::BIGINT AS record_count,
                COALESCE(sum(file_count), 0)::BIGINT AS file_count,
                COALESCE(sum(total_data_file_size_in_bytes), 0)::BIGINT AS total_data_file_size_in_bytes,
                bool_or(needs_optimize) AS needs_optimize
         FROM partitions
         WHERE table_name = ",
    );
    builder.push_bind(table_name);
    builder.push(" AND partition->>");
    builder.push_bind(next_level);
    builder.push(" IS NOT NULL");
    for (level, value) in selected {
        builder.push(" AND partition->>");
        builder.push_bind(level.as_str());
        builder.push(" = ");
        builder.push_bind(value.as_str());
    }
    builder.push(" GROUP BY 1 ORDER BY 1;");
    let rows = builder
        .build()
        .fetch_all(pool)
        .await
        .with_context(|| format!("drilling down partitions of {table_name}"))?;
    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        entries.push(PartitionDrillEntry {
            value: row.try_get("value")?,
            partition_count: row.try_get("partition_count")?,
            record_count: row.try_get("record_count")?,
            file_count: row.try_get("file_count")?,
            total_data_file_size_in_bytes: row.try_get("total_data_file_size_in_bytes")?,
            needs_optimize: row.try_get("needs_optimize")?,
        });
    }
    Ok(entries)
}

/// Calendar dates of the partitions flagged for compaction within the window,
/// ascending. The date is derived from the year/month/day levels; `LPAD`
/// keeps rows written before values were zero-padded comparable.
pub async fn list_optimizable_partition_dates(
    pool: &PgPool,
    table_name: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<NaiveDate>> {
    let rows = sqlx::query(
        "SELECT (partition->>'year') || '-' || LPAD(partition->>'month', 2, '0') || '-' || LPAD(partition->>'day', 2, '0') AS partition_date
         FROM partitions
         WHERE table_name = $1
         AND needs_optimize
         AND (partition->>'year') || '-' || LPAD(partition->>'month', 2, '0') || '-' || LPAD(partition->>'day', 2, '0') >= $2
         AND (partition->>'year') || '-' || LPAD(partition->>'month', 2, '0') || '-' || LPAD(partition->>'day', 2, '0') <= $3
         ORDER BY partition_date;",
    )
    .bind(table_name)
    .bind(from.format("%Y-%m-%d").to_string())
    .bind(to.format("%Y-%m-%d").to_string())
    .fetch_all(pool)
    .await
    .with_context(|| format!("listing partitions of {table_name} needing optimize"))?;
    let mut dates = Vec::with_capacity(rows.len());
    for row in rows {
        let text: String = row.try_get("partition_date")?;
        dates.push(
            NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                .with_context(|| format!("parsing partition date {text:?}"))?,
        );
    }
    Ok(dates)
}
