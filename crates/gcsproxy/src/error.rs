//! Error types and their HTTP status codes

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gcsproxy_store::StoreError;
use thiserror::Error;

/// Result type alias using `GatewayError`
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Failure of a gateway request, classified by its HTTP outcome
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Key absent, or hidden by the visibility filter
    #[error("not found: {0}")]
    NotFound(String),

    /// Conditional read matched the current generation
    #[error("not modified")]
    NotModified,

    /// Store-reported precondition failure
    #[error("precondition failed")]
    PreconditionFailed,

    /// Requested range lies outside the object
    #[error("range not satisfiable")]
    RangeNotSatisfiable,

    /// Unsupported verb, disabled capability, or write to a directory key
    #[error("method not allowed")]
    MethodNotAllowed,

    /// Directory requested without an index and with browsing disabled
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Any unclassified store or I/O failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::NotModified => StatusCode::NOT_MODIFIED,
            Self::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            Self::RangeNotSatisfiable => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Conditional-request outcomes, which are never replaced by an error page
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::NotModified | Self::PreconditionFailed | Self::RangeNotSatisfiable
        )
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(key) => Self::NotFound(key),
            StoreError::NotModified(_) => Self::NotModified,
            StoreError::PreconditionFailed(_) => Self::PreconditionFailed,
            StoreError::RangeNotSatisfiable(_) => Self::RangeNotSatisfiable,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for GatewayError {
    /// A bare status; error bodies only ever come from configured error pages
    fn into_response(self) -> Response {
        self.status_code().into_response()
    }
}
