//! Error types for SkyStat

use thiserror::Error;

/// SkyStat error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid argument or violated precondition
    #[error("Validation error: {0}")]
    Validation(String),

    /// Structural mismatch detected while setting up an analysis
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Operation called before its prerequisite lifecycle phase
    #[error("State error: {0}")]
    State(String),

    /// Numerical or runtime failure
    #[error("Computation error: {0}")]
    Computation(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
