//! Probe error types.

use thiserror::Error;

/// Result type alias for a single dataset probe.
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Why a replica could not report its datasets.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("timed out")]
    Timeout,
}
