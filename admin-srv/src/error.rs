use axum::Json;
use axum::body::Body;
use axum::http::{Response, StatusCode};
use axum::response::IntoResponse;
use serde_json::json;
use thiserror::Error;

use floe_catalog::error::CatalogError;
use floe_maintenance::planner::PlannerError;

/// Errors surfaced by the HTTP API, mapped onto status codes. The body is
/// always `{"error": message}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<PlannerError> for ApiError {
    fn from(err: PlannerError) -> Self {
        match err {
            PlannerError::InvalidArgument(message) => Self::InvalidArgument(message),
            PlannerError::Internal(err) => Self::Internal(err),
        }
    }
}

impl ApiError {
    /// A refresh that failed because the catalog does not know the table is
    /// the caller's mistake; everything else is internal.
    pub fn from_refresh_error(err: anyhow::Error) -> Self {
        if let Some(CatalogError::TableNotFound(table)) = err.downcast_ref::<CatalogError>() {
            return Self::NotFound(format!("table {table} not found in catalog"));
        }
        Self::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response<Body> {
        let (status, message) = match &self {
            ApiError::InvalidArgument(message) => (StatusCode::BAD_REQUEST, message.clone()),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message.clone()),
            ApiError::Internal(err) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:?}")),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
