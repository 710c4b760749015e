use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{PgPool, Row};

/// Settings key holding the worker concurrency cap.
pub const TASK_CONCURRENCY_KEY: &str = "task_concurrency";

pub async fn get_setting(pool: &PgPool, key: &str) -> Result<Option<String>> {
    let row = sqlx::query("SELECT value FROM settings WHERE key = $1;")
        .bind(key)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("reading setting {key}"))?;
    row.map(|r| r.try_get("value").map_err(anyhow::Error::from))
        .transpose()
}

pub async fn set_setting(pool: &PgPool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO settings (key, value, updated_at)
         VALUES ($1, $2, $3)
         ON CONFLICT (key) DO UPDATE
         SET value = EXCLUDED.value,
             updated_at = EXCLUDED.updated_at;",
    )
    .bind(key)
    .bind(value)
    .bind(Utc::now())
    .execute(pool)
    .await
    .with_context(|| format!("writing setting {key}"))?;
    Ok(())
}
