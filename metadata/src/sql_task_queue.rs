use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use tracing::warn;

use crate::task::{Task, TaskKind, TaskStatus};

/// How many times a claim re-selects a candidate after losing the update
/// race before giving up until the caller's next tick.
const CLAIM_ATTEMPTS: usize = 3;

pub const DEFAULT_LIST_LIMIT: i64 = 20;

/// Queued/running totals for the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub running: i64,
    pub queued: i64,
}

/// Filters for the task listing; empty vectors mean no filter.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub table_name: Option<String>,
    pub kinds: Vec<TaskKind>,
    pub statuses: Vec<TaskStatus>,
    pub limit: Option<i64>,
    pub offset: i64,
}

/// One page of tasks plus the unlimited total matching the same filters.
#[derive(Debug, Clone, Serialize)]
pub struct TaskPage {
    pub items: Vec<Task>,
    pub total: i64,
}

fn parse_task_row(row: &PgRow) -> Result<Task> {
    let status: String = row.try_get("status")?;
    Ok(Task {
        id: row.try_get("id")?,
        table_name: row.try_get("table_name")?,
        kind: row.try_get("kind")?,
        status: TaskStatus::parse(&status)
            .with_context(|| format!("unknown task status {status:?}"))?,
        started_at: row.try_get("started_at")?,
        picked_up_at: row.try_get("picked_up_at")?,
        finished_at: row.try_get("finished_at")?,
        error_message: row.try_get("error_message")?,
        input: row.try_get("input")?,
        result: row.try_get("result")?,
    })
}

/// Appends a new queued task and returns its id. Ids are monotonic.
pub async fn enqueue(
    pool: &PgPool,
    table_name: &str,
    kind: TaskKind,
    input: serde_json::Value,
) -> Result<i64> {
    let row = sqlx::query(
        "INSERT INTO tasks (table_name, kind, status, started_at, input)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id;",
    )
    .bind(table_name)
    .bind(kind.as_str())
    .bind(TaskStatus::Queued.as_str())
    .bind(Utc::now())
    .bind(input)
    .fetch_one(pool)
    .await
    .with_context(|| format!("enqueuing {kind} task for table {table_name}"))?;
    Ok(row.try_get("id")?)
}

/// Claims the oldest queued task whose table has nothing running.
///
/// Selection and transition are separate statements: several claimants may
/// pick the same candidate, and the `status = 'queued'` guard on the update
/// lets exactly one of them win. A loser retries with the next candidate; no
/// candidate, or three lost races, yields `None` and the caller tries again
/// on its next tick.
pub async fn claim(pool: &PgPool) -> Result<Option<Task>> {
    for _attempt in 0..CLAIM_ATTEMPTS {
        let candidate = sqlx::query(
            "SELECT id FROM tasks
             WHERE status = 'queued'
             AND table_name NOT IN (SELECT table_name FROM tasks WHERE status = 'running')
             ORDER BY started_at
             LIMIT 1;",
        )
        .fetch_optional(pool)
        .await
        .with_context(|| "selecting claim candidate")?;
        let Some(candidate) = candidate else {
            return Ok(None);
        };
        let id: i64 = candidate.try_get("id")?;
        let claimed = sqlx::query(
            "UPDATE tasks
             SET status = 'running', picked_up_at = $2
             WHERE id = $1 AND status = 'queued'
             RETURNING id, table_name, kind, status, started_at, picked_up_at, finished_at,
                       error_message, input, result;",
        )
        .bind(id)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await
        .with_context(|| format!("claiming task {id}"))?;
        if let Some(row) = claimed {
            return Ok(Some(parse_task_row(&row)?));
        }
        // another claimant won this row, pick the next candidate
    }
    Ok(None)
}

/// Records the outcome of a claimed task. Terminal rows are never rewritten;
/// a task flushed while running simply has nothing left to update.
pub async fn complete(
    pool: &PgPool,
    id: i64,
    result: Option<serde_json::Value>,
    error: Option<&str>,
) -> Result<()> {
    let status = if error.is_none() {
        TaskStatus::Success
    } else {
        TaskStatus::Error
    };
    let updated = sqlx::query(
        "UPDATE tasks
         SET status = $2, finished_at = $3, result = $4, error_message = $5
         WHERE id = $1 AND status = 'running';",
    )
    .bind(id)
    .bind(status.as_str())
    .bind(Utc::now())
    .bind(result)
    .bind(error)
    .execute(pool)
    .await
    .with_context(|| format!("completing task {id}"))?;
    if updated.rows_affected() == 0 {
        warn!("task {id} is no longer running, dropping its completion");
    }
    Ok(())
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &TaskFilter) {
    let mut prefix = " WHERE ";
    if let Some(table_name) = &filter.table_name {
        builder.push(prefix).push("table_name = ");
        builder.push_bind(table_name.clone());
        prefix = " AND ";
    }
    if !filter.kinds.is_empty() {
        let kinds: Vec<String> = filter.kinds.iter().map(|k| k.as_str().to_string()).collect();
        builder.push(prefix).push("kind = ANY(");
        builder.push_bind(kinds);
        builder.push(")");
        prefix = " AND ";
    }
    if !filter.statuses.is_empty() {
        let statuses: Vec<String> = filter
            .statuses
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        builder.push(prefix).push("status = ANY(");
        builder.push_bind(statuses);
        builder.push(")");
    }
}

/// Lists tasks newest first, plus the unlimited count under the same filters.
pub async fn list(pool: &PgPool, filter: &TaskFilter) -> Result<TaskPage> {
    let mut count_builder = QueryBuilder::<Postgres>::new("SELECT count(*) AS total FROM tasks");
    push_filters(&mut count_builder, filter);
    let total: i64 = count_builder
        .build()
        .fetch_one(pool)
        .await
        .with_context(|| "counting tasks")?
        .try_get("total")?;

    let mut builder = QueryBuilder::<Postgres>::new(
        "SELECT id, table_name, kind, status, started_at, picked_up_at, finished_at, \
         error_message, input, result FROM tasks",
    );
    push_filters(&mut builder, filter);
    builder.push(" ORDER BY started_at DESC LIMIT ");
    builder.push_bind(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT).max(1));
    builder.push(" OFFSET ");
    builder.push_bind(filter.offset.max(0));
    let rows = builder
        .build()
        .fetch_all(pool)
        .await
        .with_context(|| "listing tasks")?;
    let items = rows.iter().map(parse_task_row).collect::<Result<Vec<_>>>()?;
    Ok(TaskPage { items, total })
}

pub async fn counts(pool: &PgPool) -> Result<TaskCounts> {
    let row = sqlx::query(
        "SELECT count(*) FILTER (WHERE status = 'running') AS running,
                count(*) FILTER (WHERE status = 'queued') AS queued
         FROM tasks;",
    )
    .fetch_one(pool)
    .await
    .with_context(|| "counting running and queued tasks")?;
    Ok(TaskCounts {
        running: row.try_get("running")?,
        queued: row.try_get("queued")?,
    })
}

/// Deletes every task row regardless of state; an operational control.
pub async fn flush(pool: &PgPool) -> Result<u64> {
    let deleted = sqlx::query("DELETE FROM tasks;")
        .execute(pool)
        .await
        .with_context(|| "flushing tasks")?;
    Ok(deleted.rows_affected())
}
