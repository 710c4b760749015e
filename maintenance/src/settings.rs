use anyhow::Result;
use sqlx::PgPool;
use tracing::warn;

use floe_metadata::sql_settings::{self, TASK_CONCURRENCY_KEY};

/// Reads the worker cap from settings, falling back to the configured value
/// when the setting is absent or unreadable.
pub async fn load_worker_count(pool: &PgPool, fallback: usize) -> Result<usize> {
    match sql_settings::get_setting(pool, TASK_CONCURRENCY_KEY).await? {
        Some(value) => match value.parse::<usize>() {
            Ok(parsed) => Ok(parsed.max(1)),
            Err(_) => {
                warn!("ignoring invalid {TASK_CONCURRENCY_KEY} setting {value:?}");
                Ok(fallback.max(1))
            }
        },
        None => Ok(fallback.max(1)),
    }
}

/// Persists the worker cap, clamped to at least one.
pub async fn store_worker_count(pool: &PgPool, count: usize) -> Result<()> {
    sql_settings::set_setting(pool, TASK_CONCURRENCY_KEY, &count.max(1).to_string()).await
}
