//! Error types for the gcsproxy-store crate

use thiserror::Error;

/// Result type alias using `StoreError`
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during object storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Object not found
    #[error("object not found: {0}")]
    NotFound(String),

    /// A generation-match precondition did not hold
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// A generation-not-match precondition matched the current object
    #[error("not modified: {0}")]
    NotModified(String),

    /// The requested byte range lies outside the object
    #[error("range not satisfiable: {0}")]
    RangeNotSatisfiable(String),

    /// The store refused the credentials in use
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Storage API returned an unexpected status
    #[error("storage API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Token acquisition or signing failed
    #[error("authentication error: {0}")]
    Auth(String),

    /// Connection error
    #[error("connection error: {0}")]
    Connection(String),

    /// Timeout error
    #[error("operation timed out")]
    Timeout,

    /// HTTP transport error
    #[error("http error: {0}")]
    Http(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl StoreError {
    /// True for the not-found signal, as opposed to a failure talking to the store
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StoreError::Timeout
        } else if err.is_connect() {
            StoreError::Connection(err.to_string())
        } else if err.is_decode() {
            StoreError::Deserialization(err.to_string())
        } else {
            StoreError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Deserialization(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for StoreError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        StoreError::Auth(err.to_string())
    }
}
