//! Projects authoritative catalog state into the metadata store.
//!
//! A full refresh runs three steps in order, each in its own transaction:
//! table descriptor, partition statistics, snapshot history. The outer call
//! is deliberately not atomic: partition projection sits behind slow catalog
//! I/O, and holding write locks across it would starve readers. Each step
//! replaces its rows wholesale, so retrying a half-done refresh is
//! idempotent.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Utc};
use futures::StreamExt;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use floe_catalog::gateway::CatalogGateway;
use floe_catalog::transform::PartitionTransform;
use floe_catalog::types::{DataFile, PartitionField, PartitionValue, SnapshotInfo, TableSchema};
use floe_metadata::partition::{COMPACTION_THRESHOLD_BYTES, PartitionStats};
use floe_metadata::snapshot::SnapshotRecord;
use floe_metadata::sql_partitions;
use floe_metadata::table_descriptor::{
    ColumnDescriptor, HiddenSource, PartitionLevel, TableDescriptor, TimeTransform,
};

/// Projects Catalog Gateway state into the metadata store.
pub struct RefreshService {
    pool: PgPool,
    catalog: Arc<dyn CatalogGateway>,
}

/// Expands a partition spec into the logical levels used for navigation.
///
/// A `day` transform contributes hidden `year`, `month` and `day` levels over
/// the same source column; `month` contributes `year` and `month`; `year`
/// contributes `year`; identity keeps the source column as a visible level.
pub fn expand_partition_levels(spec: &[PartitionField]) -> Vec<PartitionLevel> {
    let mut levels = vec![];
    for field in spec {
        match field.transform {
            PartitionTransform::Identity => levels.push(PartitionLevel {
                name: field.source_column.clone(),
                is_hidden: false,
                hidden: None,
            }),
            PartitionTransform::Year => {
                levels.extend(hidden_levels(&field.source_column, TimeTransform::Year, &["year"]));
            }
            PartitionTransform::Month => levels.extend(hidden_levels(
                &field.source_column,
                TimeTransform::Month,
                &["year", "month"],
            )),
            PartitionTransform::Day => levels.extend(hidden_levels(
                &field.source_column,
                TimeTransform::Day,
                &["year", "month", "day"],
            )),
        }
    }
    levels
}

fn hidden_levels(column: &str, transform: TimeTransform, names: &[&str]) -> Vec<PartitionLevel> {
    names
        .iter()
        .map(|name| PartitionLevel {
            name: (*name).to_string(),
            is_hidden: true,
            hidden: Some(HiddenSource {
                column: column.to_string(),
                transform,
            }),
        })
        .collect()
}

fn partition_date(value: &PartitionValue) -> Result<NaiveDate> {
    match value {
        PartitionValue::Date(date) => Ok(*date),
        // Iceberg dates are days since the unix epoch
        PartitionValue::Int(days) => DateTime::<Utc>::UNIX_EPOCH
            .date_naive()
            .checked_add_signed(TimeDelta::days(*days))
            .with_context(|| format!("date value {days} out of range")),
        PartitionValue::Text(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .with_context(|| format!("could not parse date value {text:?}")),
        PartitionValue::Null => bail!("missing date value"),
    }
}

/// `month` transforms store months since the unix epoch.
fn month_parts(value: &PartitionValue) -> Result<(i32, u32)> {
    let PartitionValue::Int(months) = value else {
        bail!("unexpected month-transform value {value:?}");
    };
    let year = 1970 + months.div_euclid(12);
    let month = months.rem_euclid(12) + 1;
    Ok((year as i32, month as u32))
}

/// `year` transforms store years since the unix epoch.
fn year_part(value: &PartitionValue) -> Result<i32> {
    let PartitionValue::Int(years) = value else {
        bail!("unexpected year-transform value {value:?}");
    };
    Ok(1970 + *years as i32)
}

/// Normalizes a raw file partition tuple (keyed by spec field id) into the
/// logical level mapping stored per partition row. Month and day values are
/// zero-padded so the stored strings compare correctly as dates.
pub fn project_partition(
    spec: &[PartitionField],
    raw: &BTreeMap<i32, PartitionValue>,
) -> Result<BTreeMap<String, String>> {
    let mut projected = BTreeMap::new();
    for field in spec {
        let value = raw.get(&field.field_id).unwrap_or(&PartitionValue::Null);
        match field.transform {
            PartitionTransform::Identity => {
                projected.insert(field.source_column.clone(), value.render());
            }
            PartitionTransform::Day => {
                let date = partition_date(value)
                    .with_context(|| format!("projecting day field {}", field.field_id))?;
                projected.insert(String::from("year"), format!("{:04}", date.year()));
                projected.insert(String::from("month"), format!("{:02}", date.month()));
                projected.insert(String::from("day"), format!("{:02}", date.day()));
            }
            PartitionTransform::Month => {
                let (year, month) = month_parts(value)
                    .with_context(|| format!("projecting month field {}", field.field_id))?;
                projected.insert(String::from("year"), format!("{year:04}"));
                projected.insert(String::from("month"), format!("{month:02}"));
            }
            PartitionTransform::Year => {
                let year = year_part(value)
                    .with_context(|| format!("projecting year field {}", field.field_id))?;
                projected.insert(String::from("year"), format!("{year:04}"));
            }
        }
    }
    Ok(projected)
}

/// Aggregates data files sharing a normalized partition tuple into one stats
/// row. A partition needs optimize iff it holds at least one undersized file.
pub fn aggregate_partitions(
    spec: &[PartitionField],
    files: &[DataFile],
    current_snapshot: Option<&SnapshotInfo>,
) -> Result<Vec<PartitionStats>> {
    let last_updated_at = current_snapshot
        .map(|snapshot| snapshot_committed_at(snapshot))
        .unwrap_or_else(Utc::now);
    let last_updated_snapshot_id = current_snapshot.map(|snapshot| snapshot.snapshot_id);

    let mut grouped: BTreeMap<BTreeMap<String, String>, PartitionStats> = BTreeMap::new();
    for file in files {
        let key = project_partition(spec, &file.partition)?;
        let stats = grouped.entry(key.clone()).or_insert_with(|| PartitionStats {
            partition: key,
            spec_id: file.spec_id,
            record_count: 0,
            file_count: 0,
            total_data_file_size_in_bytes: 0,
            needs_optimize: false,
            needs_optimize_count: 0,
            last_updated_at,
            last_updated_snapshot_id,
        });
        stats.record_count += file.record_count;
        stats.file_count += 1;
        stats.total_data_file_size_in_bytes += file.file_size_bytes;
        if file.file_size_bytes < COMPACTION_THRESHOLD_BYTES {
            stats.needs_optimize_count += 1;
        }
    }
    for stats in grouped.values_mut() {
        stats.needs_optimize = stats.needs_optimize_count > 0;
    }
    Ok(grouped.into_values().collect())
}

fn snapshot_committed_at(snapshot: &SnapshotInfo) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(snapshot.timestamp_ms).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Copies one catalog snapshot into its stored form; an empty operation is
/// coerced to `"unknown"`.
pub fn project_snapshot(snapshot: &SnapshotInfo) -> SnapshotRecord {
    let operation = if snapshot.operation.is_empty() {
        String::from("unknown")
    } else {
        snapshot.operation.clone()
    };
    SnapshotRecord {
        snapshot_id: snapshot.snapshot_id,
        parent_id: snapshot.parent_id,
        committed_at: snapshot_committed_at(snapshot),
        operation,
        manifest_list: snapshot.manifest_list.clone(),
        summary: snapshot.summary.clone(),
    }
}

impl RefreshService {
    pub fn new(pool: PgPool, catalog: Arc<dyn CatalogGateway>) -> Self {
        Self { pool, catalog }
    }

    /// Refreshes schema, partition statistics and snapshots for one table.
    /// A failing step aborts the rest and surfaces; rows written by earlier
    /// steps remain valid.
    pub async fn refresh_table_full(&self, table: &str) -> Result<()> {
        let schema = self
            .catalog
            .describe_table(table)
            .await
            .with_context(|| format!("describing table {table}"))?;
        self.store_table_descriptor(table, &schema).await?;

        let snapshots = self
            .catalog
            .list_snapshots(table)
            .await
            .with_context(|| format!("listing snapshots of table {table}"))?;
        self.refresh_partition_stats(table, &schema, &snapshots)
            .await?;
        self.store_snapshots(table, &snapshots).await?;
        Ok(())
    }

    /// Re-projects only the snapshot history; the worker runs this after a
    /// snapshot expiration.
    pub async fn refresh_snapshots(&self, table: &str) -> Result<()> {
        let snapshots = self
            .catalog
            .list_snapshots(table)
            .await
            .with_context(|| format!("listing snapshots of table {table}"))?;
        self.store_snapshots(table, &snapshots).await
    }

    /// Refreshes every table the catalog reports. Per-table failures are
    /// logged and skipped; cancellation exits between tables.
    pub async fn refresh_all_tables(&self, token: &CancellationToken) -> Result<()> {
        let tables = self
            .catalog
            .list_tables()
            .await
            .with_context(|| "listing catalog tables")?;
        info!("refreshing {} tables", tables.len());
        for table in tables {
            if token.is_cancelled() {
                info!("refresh cycle interrupted");
                break;
            }
            if let Err(e) = self.refresh_table_full(&table).await {
                warn!("could not refresh table {table}: {e:?}");
            }
        }
        Ok(())
    }

    async fn store_table_descriptor(&self, table: &str, schema: &TableSchema) -> Result<()> {
        let descriptor = TableDescriptor {
            name: table.to_string(),
            columns: schema
                .columns
                .iter()
                .map(|column| ColumnDescriptor {
                    name: column.name.clone(),
                    data_type: column.data_type.clone(),
                })
                .collect(),
            partition_levels: expand_partition_levels(&schema.partition_spec),
            updated_at: Utc::now(),
        };
        let mut tr = self.pool.begin().await?;
        floe_metadata::sql_tables::upsert_table_descriptor(&mut tr, &descriptor).await?;
        tr.commit().await.with_context(|| "commit")?;
        Ok(())
    }

    async fn refresh_partition_stats(
        &self,
        table: &str,
        schema: &TableSchema,
        snapshots: &[SnapshotInfo],
    ) -> Result<()> {
        let current_snapshot = snapshots.iter().max_by_key(|s| s.timestamp_ms);
        let mut stream = self
            .catalog
            .list_data_files(table)
            .await
            .with_context(|| format!("listing data files of table {table}"))?;
        let mut files = vec![];
        while let Some(file) = stream.next().await {
            files.push(file.with_context(|| format!("reading data file of table {table}"))?);
        }
        let partitions = aggregate_partitions(&schema.partition_spec, &files, current_snapshot)?;
        let mut tr = self.pool.begin().await?;
        sql_partitions::replace_partitions(&mut tr, table, &partitions).await?;
        tr.commit().await.with_context(|| "commit")?;
        info!(
            "stored {} partitions from {} data files for table {table}",
            partitions.len(),
            files.len()
        );
        Ok(())
    }

    async fn store_snapshots(&self, table: &str, snapshots: &[SnapshotInfo]) -> Result<()> {
        let records: Vec<SnapshotRecord> = snapshots.iter().map(project_snapshot).collect();
        let mut tr = self.pool.begin().await?;
        floe_metadata::sql_snapshots::replace_snapshots(&mut tr, table, &records).await?;
        tr.commit().await.with_context(|| "commit")?;
        Ok(())
    }
}
