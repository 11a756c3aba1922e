//! Cluster access errors.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors talking to the orchestration API.
///
/// All of them are transport failures from the loop driver's point of
/// view: the tick is abandoned and the next one retries.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("failed to load credentials: {0}")]
    Credentials(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("{method} {path} returned {status}: {body}")]
    Status {
        method: String,
        path: String,
        status: u16,
        body: String,
    },

    #[error("{method} {path} timed out after {timeout:?}")]
    Timeout {
        method: String,
        path: String,
        timeout: Duration,
    },

    #[error("failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },

    #[error("invalid quantity {0:?}")]
    Quantity(String),

    #[error("container {container} not found in deployment {deployment}")]
    ContainerNotFound {
        deployment: String,
        container: String,
    },
}

impl ClusterError {
    /// Whether the API answered 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}
