//! HTTP middleware: the gateway itself and request logging

use crate::gateway::{Gateway, Outcome};
use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

/// Serve the request from the store, or hand it to the next service when an
/// error page is configured as pass-through
pub async fn gateway_middleware(
    State(gateway): State<Gateway>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match gateway.serve(request).await {
        Outcome::Served(response) => response,
        Outcome::PassThrough(request) => next.run(request).await,
    }
}

/// Logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        "Request completed"
    );

    response
}
