//! Validates user maintenance requests and expands them into queued tasks.
//!
//! Retention arguments are clamped to safe floors rather than rejected; the
//! clamped values are what lands in the stored task input. The optimize
//! fan-out turns one date-range request into one single-day task per
//! partition that actually needs compaction.

use anyhow::Context;
use chrono::NaiveDate;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

use floe_metadata::sql_partitions;
use floe_metadata::sql_task_queue;
use floe_metadata::task::{
    ExpireSnapshotsInput, OptimizeInput, RemoveOrphanFilesInput, TaskKind,
};

/// Snapshot retention below one week would race ongoing writers.
pub const MIN_RETENTION_DAYS: i32 = 7;
/// Always keep a tail of snapshots for time travel.
pub const MIN_RETAIN_LAST: i32 = 10;
pub const DEFAULT_FILE_SIZE_THRESHOLD_MB: i64 = 128;

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Threshold values below one megabyte fall back to the default.
pub fn effective_file_size_threshold(file_size_threshold_mb: i64) -> i64 {
    if file_size_threshold_mb < 1 {
        DEFAULT_FILE_SIZE_THRESHOLD_MB
    } else {
        file_size_threshold_mb
    }
}

pub struct TaskPlanner {
    pool: PgPool,
}

impl TaskPlanner {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn enqueue_expire_snapshots(
        &self,
        table: &str,
        retention_days: i32,
        retain_last: i32,
    ) -> Result<i64, PlannerError> {
        let input = ExpireSnapshotsInput {
            retention_days: retention_days.max(MIN_RETENTION_DAYS),
            retain_last: retain_last.max(MIN_RETAIN_LAST),
        };
        let id = sql_task_queue::enqueue(
            &self.pool,
            table,
            TaskKind::ExpireSnapshots,
            serde_json::to_value(input).context("serializing expire_snapshots input")?,
        )
        .await?;
        info!("queued expire_snapshots task {id} for table {table}");
        Ok(id)
    }

    pub async fn enqueue_remove_orphan_files(
        &self,
        table: &str,
        retention_days: i32,
    ) -> Result<i64, PlannerError> {
        let input = RemoveOrphanFilesInput {
            retention_days: retention_days.max(MIN_RETENTION_DAYS),
        };
        let id = sql_task_queue::enqueue(
            &self.pool,
            table,
            TaskKind::RemoveOrphanFiles,
            serde_json::to_value(input).context("serializing remove_orphan_files input")?,
        )
        .await?;
        info!("queued remove_orphan_files task {id} for table {table}");
        Ok(id)
    }

    /// Expands one optimize request into one queued task per flagged
    /// partition within `[from, to]`, ascending by partition date. No
    /// matching partition is a success with an empty id list.
    pub async fn enqueue_optimize(
        &self,
        table: &str,
        file_size_threshold_mb: i64,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<i64>, PlannerError> {
        let threshold = effective_file_size_threshold(file_size_threshold_mb);
        let (Some(from), Some(to)) = (from, to) else {
            return Err(PlannerError::InvalidArgument(String::from(
                "from and to are required",
            )));
        };
        if from > to {
            return Err(PlannerError::InvalidArgument(format!(
                "from {from} is after to {to}"
            )));
        }

        let dates =
            sql_partitions::list_optimizable_partition_dates(&self.pool, table, from, to).await?;
        let mut ids = Vec::with_capacity(dates.len());
        for date in dates {
            let input = OptimizeInput {
                file_size_threshold_mb: threshold,
                from: date,
                to: date,
            };
            let id = sql_task_queue::enqueue(
                &self.pool,
                table,
                TaskKind::Optimize,
                serde_json::to_value(input).context("serializing optimize input")?,
            )
            .await?;
            ids.push(id);
        }
        info!(
            "queued {} optimize tasks for table {table} between {from} and {to}",
            ids.len()
        );
        Ok(ids)
    }
}
