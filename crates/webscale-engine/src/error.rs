//! Configuration errors.

use thiserror::Error;

/// Result type alias for policy loading and validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating the scaling policy.
///
/// Every variant is fatal at startup.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("setting {key} is not a valid number: {value:?}")]
    NotNumeric { key: &'static str, value: String },

    #[error("invalid policy: {0}")]
    Invalid(String),
}
