//! Error types for the CredParse CLI
//!
//! Every variant is user-facing: the message says what went wrong and what to
//! change.

use credparse_common::CredParseError;
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Exit status for invalid arguments or configuration
pub const EXIT_CONFIG: i32 = 2;

/// Exit status for runtime failures
pub const EXIT_FAILURE: i32 = 1;

/// Exit status after a forced interrupt
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Error, Debug)]
pub enum CliError {
    /// Arguments are missing or inconsistent
    #[error("Configuration error: {0}. Run 'credparse --help' for the accepted options.")]
    Config(String),

    /// Database connection or setup failed
    #[error("Database error: {0}. Check --host, --port, --db and credentials, and that the server accepts connections.")]
    Database(String),

    /// File system operation failed
    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    /// Any other failure while running
    #[error("{0}")]
    Run(String),
}

impl CliError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => EXIT_CONFIG,
            _ => EXIT_FAILURE,
        }
    }
}

impl From<CredParseError> for CliError {
    fn from(err: CredParseError) -> Self {
        match err {
            CredParseError::Config(msg) => CliError::Config(msg),
            CredParseError::Database(msg) => CliError::Database(msg),
            CredParseError::Io(e) => CliError::Io(e),
            other => CliError::Run(other.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_exit_with_usage_status() {
        let err: CliError = CredParseError::config("Field count must be at least 2").into();
        assert_eq!(err.exit_code(), EXIT_CONFIG);
        assert!(err.to_string().contains("credparse --help"));
    }

    #[test]
    fn test_database_errors_are_runtime_failures() {
        let err: CliError = CredParseError::Database("Cannot connect".to_string()).into();
        assert!(matches!(err, CliError::Database(_)));
        assert_eq!(err.exit_code(), EXIT_FAILURE);
    }
}
