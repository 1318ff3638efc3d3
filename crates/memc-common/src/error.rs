//! Error types for memc-load

use thiserror::Error;

/// Result type alias for memc-load operations
pub type Result<T> = std::result::Result<T, MemcError>;

/// Main error type shared across the workspace
#[derive(Error, Debug)]
pub enum MemcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Payload decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid file pattern `{pattern}`: {reason}")]
    Pattern { pattern: String, reason: String },
}
