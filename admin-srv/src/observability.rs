//! Request/response logging middleware.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::info;

pub async fn observability_middleware(request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let uri = parts.uri.clone();
    info!("request method={} uri={uri}", parts.method);
    let begin = Instant::now();
    let response = next.run(Request::from_parts(parts, body)).await;
    info!(
        "response status={} uri={uri} duration_ms={}",
        response.status(),
        begin.elapsed().as_millis()
    );
    response
}
