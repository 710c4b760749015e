//! HTTP handlers of the control plane: browse, metadata, tasks, settings and
//! refresh endpoints. Handlers stay thin; semantics live in the maintenance
//! services and the metadata store.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::routing::get;
use axum::{Extension, Json, Router, middleware};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use floe_maintenance::limiter::ConcurrencyLimiter;
use floe_maintenance::planner::TaskPlanner;
use floe_maintenance::refresh::RefreshService;
use floe_maintenance::settings;
use floe_metadata::partition::PartitionDrillEntry;
use floe_metadata::snapshot::SnapshotRecord;
use floe_metadata::sql_partitions;
use floe_metadata::sql_snapshots;
use floe_metadata::sql_tables;
use floe_metadata::sql_task_queue::{self, TaskCounts, TaskFilter};
use floe_metadata::table_descriptor::{ColumnDescriptor, PartitionLevel};
use floe_metadata::task::{Task, TaskKind, TaskStatus};
use floe_metadata::time::parse_flexible_date;

use crate::error::ApiError;
use crate::observability::observability_middleware;

pub struct AppContext {
    pub pool: PgPool,
    pub planner: TaskPlanner,
    pub refresh: Arc<RefreshService>,
    pub limiter: Arc<ConcurrencyLimiter>,
    pub shutdown: CancellationToken,
}

pub fn make_router(context: Arc<AppContext>) -> Router {
    Router::new()
        .route("/api/browse/tables", get(list_tables))
        .route("/api/browse/{table}", get(get_table))
        .route("/api/browse/{table}/partitions", axum::routing::post(drill_down))
        .route("/api/metadata/snapshots", get(list_snapshots))
        .route(
            "/api/tasks/{table}/expire-snapshots",
            axum::routing::post(enqueue_expire_snapshots),
        )
        .route(
            "/api/tasks/{table}/remove-orphan-files",
            axum::routing::post(enqueue_remove_orphan_files),
        )
        .route("/api/tasks/{table}/optimize", axum::routing::post(enqueue_optimize))
        .route("/api/tasks", get(list_tasks).delete(flush_tasks))
        .route("/api/tasks/counts", get(task_counts))
        .route(
            "/api/settings/task-concurrency",
            get(get_task_concurrency).put(put_task_concurrency),
        )
        .route("/api/refresh/full", get(refresh_full))
        .route("/api/refresh/table", get(refresh_table))
        .layer(middleware::from_fn(observability_middleware))
        .layer(Extension(context))
}

#[derive(Debug, Serialize)]
struct TableSummary {
    name: String,
    columns: Vec<ColumnDescriptor>,
    partition_levels: Vec<PartitionLevel>,
    updated_at: DateTime<Utc>,
    partition_count: i64,
    record_count: i64,
    file_count: i64,
    total_data_file_size_in_bytes: i64,
    partitions_needing_optimize: i64,
}

async fn summarize(
    pool: &PgPool,
    descriptor: floe_metadata::table_descriptor::TableDescriptor,
) -> Result<TableSummary, ApiError> {
    let totals = sql_partitions::fetch_table_totals(pool, &descriptor.name).await?;
    Ok(TableSummary {
        name: descriptor.name,
        columns: descriptor.columns,
        partition_levels: descriptor.partition_levels,
        updated_at: descriptor.updated_at,
        partition_count: totals.partition_count,
        record_count: totals.record_count,
        file_count: totals.file_count,
        total_data_file_size_in_bytes: totals.total_data_file_size_in_bytes,
        partitions_needing_optimize: totals.partitions_needing_optimize,
    })
}

async fn list_tables(
    Extension(context): Extension<Arc<AppContext>>,
) -> Result<Json<Vec<TableSummary>>, ApiError> {
    let descriptors = sql_tables::list_table_descriptors(&context.pool).await?;
    let mut summaries = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        summaries.push(summarize(&context.pool, descriptor).await?);
    }
    Ok(Json(summaries))
}

async fn get_table(
    Extension(context): Extension<Arc<AppContext>>,
    Path(table): Path<String>,
) -> Result<Json<TableSummary>, ApiError> {
    let descriptor = sql_tables::fetch_table_descriptor(&context.pool, &table)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("table {table} not found")))?;
    Ok(Json(summarize(&context.pool, descriptor).await?))
}

#[derive(Debug, Default, Deserialize)]
struct DrillDownRequest {
    #[serde(default)]
    partitions: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct DrillDownResponse {
    level: Option<String>,
    values: Vec<PartitionDrillEntry>,
}

async fn drill_down(
    Extension(context): Extension<Arc<AppContext>>,
    Path(table): Path<String>,
    Json(request): Json<DrillDownRequest>,
) -> Result<Json<DrillDownResponse>, ApiError> {
    let descriptor = sql_tables::fetch_table_descriptor(&context.pool, &table)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("table {table} not found")))?;
    for level in request.partitions.keys() {
        if !descriptor.partition_levels.iter().any(|l| &l.name == level) {
            return Err(ApiError::InvalidArgument(format!(
                "table {table} has no partition level {level:?}"
            )));
        }
    }
    // drill into the first level the caller has not pinned yet
    let next_level = descriptor
        .partition_levels
        .iter()
        .map(|level| level.name.as_str())
        .find(|name| !request.partitions.contains_key(*name));
    let Some(next_level) = next_level else {
        return Ok(Json(DrillDownResponse {
            level: None,
            values: vec![],
        }));
    };
    let values =
        sql_partitions::drill_down_partitions(&context.pool, &table, &request.partitions, next_level)
            .await?;
    Ok(Json(DrillDownResponse {
        level: Some(next_level.to_string()),
        values,
    }))
}

#[derive(Debug, Deserialize)]
struct SnapshotsQuery {
    table: String,
}

async fn list_snapshots(
    Extension(context): Extension<Arc<AppContext>>,
    Query(query): Query<SnapshotsQuery>,
) -> Result<Json<Vec<SnapshotRecord>>, ApiError> {
    if sql_tables::fetch_table_descriptor(&context.pool, &query.table)
        .await?
        .is_none()
    {
        return Err(ApiError::NotFound(format!(
            "table {} not found",
            query.table
        )));
    }
    let snapshots = sql_snapshots::list_snapshots(&context.pool, &query.table).await?;
    Ok(Json(snapshots))
}

#[derive(Debug, Serialize)]
struct EnqueueResponse {
    task_id: i64,
    status: TaskStatus,
}

#[derive(Debug, Deserialize)]
struct ExpireSnapshotsRequest {
    retention_days: i32,
    retain_last: i32,
}

async fn enqueue_expire_snapshots(
    Extension(context): Extension<Arc<AppContext>>,
    Path(table): Path<String>,
    Json(request): Json<ExpireSnapshotsRequest>,
) -> Result<Json<EnqueueResponse>, ApiError> {
    let task_id = context
        .planner
        .enqueue_expire_snapshots(&table, request.retention_days, request.retain_last)
        .await?;
    Ok(Json(EnqueueResponse {
        task_id,
        status: TaskStatus::Queued,
    }))
}

#[derive(Debug, Deserialize)]
struct RemoveOrphanFilesRequest {
    retention_days: i32,
}

async fn enqueue_remove_orphan_files(
    Extension(context): Extension<Arc<AppContext>>,
    Path(table): Path<String>,
    Json(request): Json<RemoveOrphanFilesRequest>,
) -> Result<Json<EnqueueResponse>, ApiError> {
    let task_id = context
        .planner
        .enqueue_remove_orphan_files(&table, request.retention_days)
        .await?;
    Ok(Json(EnqueueResponse {
        task_id,
        status: TaskStatus::Queued,
    }))
}

#[derive(Debug, Deserialize)]
struct OptimizeRequest {
    #[serde(default)]
    file_size_threshold_mb: i64,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
}

#[derive(Debug, Serialize)]
struct OptimizeResponse {
    task_ids: Vec<i64>,
    status: TaskStatus,
}

fn parse_request_date(value: Option<&str>) -> Result<Option<NaiveDate>, ApiError> {
    match value {
        None | Some("") => Ok(None),
        Some(text) => parse_flexible_date(text)
            .map(Some)
            .map_err(|e| ApiError::InvalidArgument(format!("{e:#}"))),
    }
}

async fn enqueue_optimize(
    Extension(context): Extension<Arc<AppContext>>,
    Path(table): Path<String>,
    Json(request): Json<OptimizeRequest>,
) -> Result<Json<OptimizeResponse>, ApiError> {
    let from = parse_request_date(request.from.as_deref())?;
    let to = parse_request_date(request.to.as_deref())?;
    let task_ids = context
        .planner
        .enqueue_optimize(&table, request.file_size_threshold_mb, from, to)
        .await?;
    Ok(Json(OptimizeResponse {
        task_ids,
        status: TaskStatus::Queued,
    }))
}

#[derive(Debug, Serialize)]
struct TaskListResponse {
    items: Vec<Task>,
    total: i64,
}

async fn list_tasks(
    Extension(context): Extension<Arc<AppContext>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<TaskListResponse>, ApiError> {
    let mut filter = TaskFilter::default();
    for (key, value) in params {
        match key.as_str() {
            "table" => filter.table_name = Some(value),
            "kind" => filter.kinds.push(TaskKind::parse(&value).ok_or_else(|| {
                ApiError::InvalidArgument(format!("unknown task kind {value:?}"))
            })?),
            "status" => filter.statuses.push(TaskStatus::parse(&value).ok_or_else(|| {
                ApiError::InvalidArgument(format!("unknown task status {value:?}"))
            })?),
            "limit" => {
                filter.limit = Some(value.parse().map_err(|_| {
                    ApiError::InvalidArgument(format!("invalid limit {value:?}"))
                })?);
            }
            "offset" => {
                filter.offset = value.parse().map_err(|_| {
                    ApiError::InvalidArgument(format!("invalid offset {value:?}"))
                })?;
            }
            _ => {}
        }
    }
    let page = sql_task_queue::list(&context.pool, &filter).await?;
    Ok(Json(TaskListResponse {
        items: page.items,
        total: page.total,
    }))
}

async fn task_counts(
    Extension(context): Extension<Arc<AppContext>>,
) -> Result<Json<TaskCounts>, ApiError> {
    Ok(Json(sql_task_queue::counts(&context.pool).await?))
}

#[derive(Debug, Serialize)]
struct FlushResponse {
    deleted: u64,
}

async fn flush_tasks(
    Extension(context): Extension<Arc<AppContext>>,
) -> Result<Json<FlushResponse>, ApiError> {
    let deleted = sql_task_queue::flush(&context.pool).await?;
    Ok(Json(FlushResponse { deleted }))
}

#[derive(Debug, Serialize)]
struct SettingResponse {
    value: usize,
}

#[derive(Debug, Deserialize)]
struct SettingRequest {
    value: i64,
}

async fn get_task_concurrency(
    Extension(context): Extension<Arc<AppContext>>,
) -> Result<Json<SettingResponse>, ApiError> {
    let value =
        settings::load_worker_count(&context.pool, context.limiter.current_limit()).await?;
    Ok(Json(SettingResponse { value }))
}

async fn put_task_concurrency(
    Extension(context): Extension<Arc<AppContext>>,
    Json(request): Json<SettingRequest>,
) -> Result<Json<SettingResponse>, ApiError> {
    if request.value < 1 {
        return Err(ApiError::InvalidArgument(String::from(
            "task concurrency must be at least 1",
        )));
    }
    let value = request.value as usize;
    settings::store_worker_count(&context.pool, value).await?;
    // running workers pick the new cap up on their next acquire
    context.limiter.set_limit(value);
    Ok(Json(SettingResponse { value }))
}

#[derive(Debug, Serialize)]
struct RefreshResponse {
    status: &'static str,
}

async fn refresh_full(
    Extension(context): Extension<Arc<AppContext>>,
) -> Result<Json<RefreshResponse>, ApiError> {
    context
        .refresh
        .refresh_all_tables(&context.shutdown)
        .await
        .map_err(ApiError::from_refresh_error)?;
    Ok(Json(RefreshResponse {
        status: "completed",
    }))
}

#[derive(Debug, Deserialize)]
struct RefreshTableQuery {
    table: String,
}

async fn refresh_table(
    Extension(context): Extension<Arc<AppContext>>,
    Query(query): Query<RefreshTableQuery>,
) -> Result<Json<RefreshResponse>, ApiError> {
    context
        .refresh
        .refresh_table_full(&query.table)
        .await
        .map_err(ApiError::from_refresh_error)?;
    Ok(Json(RefreshResponse {
        status: "completed",
    }))
}
