//! The task worker: a single scheduling loop claiming queued tasks and
//! spawning one handler per claim, bounded by the mutable concurrency
//! limiter. Handler failures land in the task row; the loop itself never
//! dies.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use sqlx::PgPool;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use floe_engine::gateway::MaintenanceEngine;
use floe_metadata::sql_task_queue;
use floe_metadata::sql_tables;
use floe_metadata::task::{
    ExpireSnapshotsInput, OptimizeInput, RemoveOrphanFilesInput, Task, TaskKind,
};

use crate::limiter::ConcurrencyLimiter;
use crate::refresh::RefreshService;

pub struct TaskWorker {
    pool: PgPool,
    engine: Arc<MaintenanceEngine>,
    refresh: Arc<RefreshService>,
    limiter: Arc<ConcurrencyLimiter>,
    poll_interval: Duration,
}

impl TaskWorker {
    pub fn new(
        pool: PgPool,
        engine: Arc<MaintenanceEngine>,
        refresh: Arc<RefreshService>,
        limiter: Arc<ConcurrencyLimiter>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            pool,
            engine,
            refresh,
            limiter,
            poll_interval,
        }
    }

    /// Runs until cancelled. Each tick claims at most one task; claim
    /// errors are logged and never fatal.
    pub async fn run(self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "task worker started, capacity {}",
            self.limiter.current_limit()
        );
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("task worker stopping");
                    return;
                }
                _ = ticker.tick() => {}
            }
            let Some(permit) = self.limiter.clone().try_acquire_owned() else {
                continue;
            };
            let task = match sql_task_queue::claim(&self.pool).await {
                Ok(Some(task)) => task,
                Ok(None) => {
                    drop(permit);
                    continue;
                }
                Err(e) => {
                    error!("could not claim task: {e:?}");
                    drop(permit);
                    continue;
                }
            };
            let pool = self.pool.clone();
            let engine = self.engine.clone();
            let refresh = self.refresh.clone();
            let task_token = token.clone();
            tokio::spawn(async move {
                let _permit = permit;
                run_claimed_task(&pool, &engine, &refresh, task, &task_token).await;
            });
        }
    }
}

/// Executes one claimed task and unconditionally records its outcome.
/// Completion failures are logged, never retried.
pub async fn run_claimed_task(
    pool: &PgPool,
    engine: &MaintenanceEngine,
    refresh: &RefreshService,
    task: Task,
    token: &CancellationToken,
) {
    info!(
        "task {} started: {} on table {}",
        task.id, task.kind, task.table_name
    );
    let (result, error) = match execute_task(pool, engine, refresh, &task, token).await {
        Ok(result) => (result, None),
        Err(e) => {
            warn!("task {} failed: {e:#}", task.id);
            (None, Some(format!("{e:#}")))
        }
    };
    if let Err(e) = sql_task_queue::complete(pool, task.id, result, error.as_deref()).await {
        error!("could not record completion of task {}: {e:?}", task.id);
    } else {
        info!("task {} finished", task.id);
    }
}

async fn execute_task(
    pool: &PgPool,
    engine: &MaintenanceEngine,
    refresh: &RefreshService,
    task: &Task,
    token: &CancellationToken,
) -> Result<Option<serde_json::Value>> {
    match TaskKind::parse(&task.kind) {
        Some(TaskKind::ExpireSnapshots) => {
            let input: ExpireSnapshotsInput = serde_json::from_value(task.input.clone())
                .with_context(|| "parsing expire_snapshots input")?;
            tokio::select! {
                _ = token.cancelled() => bail!("cancelled"),
                outcome = engine.expire_snapshots(
                    &task.table_name,
                    input.retention_days,
                    input.retain_last,
                ) => outcome?,
            }
            // expired snapshots are gone from the catalog; re-project them,
            // but a failure here must not fail the finished engine work
            if let Err(e) = refresh.refresh_snapshots(&task.table_name).await {
                warn!(
                    "could not refresh snapshots of table {} after expiration: {e:?}",
                    task.table_name
                );
            }
            Ok(None)
        }
        Some(TaskKind::RemoveOrphanFiles) => {
            let input: RemoveOrphanFilesInput = serde_json::from_value(task.input.clone())
                .with_context(|| "parsing remove_orphan_files input")?;
            let metrics = tokio::select! {
                _ = token.cancelled() => bail!("cancelled"),
                outcome = engine.remove_orphan_files(&task.table_name, input.retention_days) => outcome?,
            };
            Ok(Some(
                serde_json::to_value(metrics).with_context(|| "serializing orphan-file metrics")?,
            ))
        }
        Some(TaskKind::Optimize) => {
            let input: OptimizeInput = serde_json::from_value(task.input.clone())
                .with_context(|| "parsing optimize input")?;
            let descriptor = sql_tables::fetch_table_descriptor(pool, &task.table_name)
                .await?
                .with_context(|| format!("table {} not found in metadata store", task.table_name))?;
            let day_column = descriptor
                .day_partition_column()
                .context("no suitable day-partition column")?;
            tokio::select! {
                _ = token.cancelled() => bail!("cancelled"),
                outcome = engine.optimize(
                    &task.table_name,
                    input.file_size_threshold_mb,
                    day_column,
                    input.from,
                    input.to,
                ) => outcome?,
            }
            Ok(None)
        }
        None => bail!("unknown task kind {:?}", task.kind),
    }
}
