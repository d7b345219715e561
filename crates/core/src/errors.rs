//! Error types

use thiserror::Error;

/// Core error types
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid resolution: {0}")]
    InvalidResolution(String),

    #[error("Malformed price {input:?}: {reason}")]
    MalformedPrice { input: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Price feed errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceFeedError {
    #[error("Feed disconnected")]
    Disconnected,
}

/// Result type alias
pub type CoreResult<T> = Result<T, CoreError>;
