//! Router assembly

use crate::{gateway::Gateway, middleware};
use axum::{http::StatusCode, middleware as axum_middleware, Router};
use tower_http::trace::TraceLayer;

/// Router with the gateway in front of a plain 404
pub fn create_router(gateway: Gateway) -> Router {
    create_router_with_fallback(gateway, Router::new().fallback(not_found))
}

/// Router with the gateway in front of `next`, which receives pass-through requests
pub fn create_router_with_fallback(gateway: Gateway, next: Router) -> Router {
    next.layer(axum_middleware::from_fn_with_state(
        gateway,
        middleware::gateway_middleware,
    ))
    .layer(axum_middleware::from_fn(middleware::logging_middleware))
    .layer(TraceLayer::new_for_http())
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
