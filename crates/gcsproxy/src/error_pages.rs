//! Failure handling: status mapping and configured error pages

use crate::config::{ErrorPageTarget, GatewayConfig};
use crate::error::GatewayError;
use crate::response::write_error_document;
use axum::response::{IntoResponse, Response};
use gcsproxy_store::{GetOptions, ObjectStore};
use tracing::{debug, error};

/// What to do with a failed request
#[derive(Debug)]
pub enum ErrorOutcome {
    /// Send this response
    Respond(Response),
    /// Let the next handler produce the response
    PassThrough,
}

/// Decide the response for a failed request.
///
/// Conditional outcomes and non-GET failures are written as bare statuses.
/// A GET consults the per-status table, then the default page.
pub async fn dispatch(
    err: GatewayError,
    is_get: bool,
    config: &GatewayConfig,
    store: &dyn ObjectStore,
) -> ErrorOutcome {
    let status = err.status_code();
    match &err {
        GatewayError::Internal(_) => error!(status = status.as_u16(), error = %err, "Request failed"),
        _ => debug!(status = status.as_u16(), error = %err, "Request failed"),
    }

    if err.is_terminal() || !is_get {
        return ErrorOutcome::Respond(err.into_response());
    }

    let key = match config.error_page_for(status.as_u16()) {
        None => return ErrorOutcome::Respond(err.into_response()),
        Some(ErrorPageTarget::PassThrough) => return ErrorOutcome::PassThrough,
        Some(ErrorPageTarget::Document(key)) => key.trim_start_matches('/'),
    };

    match store.get_object(key, &GetOptions::unconditional()).await {
        Ok(reader) => ErrorOutcome::Respond(write_error_document(status, reader)),
        Err(fetch_err) => {
            error!(key = %key, error = %fetch_err, "Error serving error page");
            ErrorOutcome::Respond(err.into_response())
        }
    }
}
