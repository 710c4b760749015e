use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio_retry2::strategy::ExponentialBackoff;
use tokio_retry2::{Retry, RetryError};
use tracing::warn;

use crate::error::EngineError;
use crate::statement::{
    expire_snapshots_statement, optimize_statement, remove_orphan_files_statement,
};

/// One metric row reported by a maintenance statement.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineMetric {
    pub name: String,
    pub value: serde_json::Value,
}

/// Executes one statement on the lakehouse engine.
#[async_trait]
pub trait EngineClient: Send + Sync {
    async fn execute(&self, statement: &str) -> Result<Vec<EngineMetric>, EngineError>;
}

/// Maintenance operations over an [`EngineClient`]. Transient failures are
/// retried with bounded exponential backoff; permanent ones fail fast.
pub struct MaintenanceEngine {
    client: Arc<dyn EngineClient>,
    catalog: String,
    database: String,
}

impl MaintenanceEngine {
    pub fn new(client: Arc<dyn EngineClient>, catalog: String, database: String) -> Self {
        Self {
            client,
            catalog,
            database,
        }
    }

    fn retry_strategy() -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(10)
            .max_delay(Duration::from_secs(60))
            .take(5)
    }

    async fn execute_with_retry(
        &self,
        statement: &str,
    ) -> Result<Vec<EngineMetric>, EngineError> {
        Retry::spawn(Self::retry_strategy(), || async {
            self.client.execute(statement).await.map_err(|e| {
                if e.is_transient() {
                    warn!("retrying engine statement: {e}");
                    RetryError::transient(e)
                } else {
                    RetryError::permanent(e)
                }
            })
        })
        .await
    }

    pub async fn expire_snapshots(
        &self,
        table: &str,
        retention_days: i32,
        retain_last: i32,
    ) -> Result<(), EngineError> {
        let statement = expire_snapshots_statement(
            &self.catalog,
            &self.database,
            table,
            retention_days,
            retain_last,
        );
        self.execute_with_retry(&statement).await?;
        Ok(())
    }

    pub async fn remove_orphan_files(
        &self,
        table: &str,
        retention_days: i32,
    ) -> Result<BTreeMap<String, serde_json::Value>, EngineError> {
        let statement =
            remove_orphan_files_statement(&self.catalog, &self.database, table, retention_days);
        let metrics = self.execute_with_retry(&statement).await?;
        Ok(metrics
            .into_iter()
            .map(|metric| (metric.name, metric.value))
            .collect())
    }

    pub async fn optimize(
        &self,
        table: &str,
        file_size_threshold_mb: i64,
        day_column: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<(), EngineError> {
        let statement = optimize_statement(
            &self.catalog,
            &self.database,
            table,
            file_size_threshold_mb,
            day_column,
            from,
            to,
        );
        self.execute_with_retry(&statement).await?;
        Ok(())
    }
}
