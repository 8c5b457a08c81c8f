//! Error types for CredParse

use thiserror::Error;

/// Result type alias for CredParse operations
pub type Result<T> = std::result::Result<T, CredParseError>;

/// Top-level error type shared by the workspace crates
#[derive(Error, Debug)]
pub enum CredParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Sink error: {0}")]
    Sink(String),
}

impl CredParseError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
