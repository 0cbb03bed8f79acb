//! Centralized error types and conversions for assessd
//!
//! Library code returns [`AssessError`]. The daemon and CLI wrap it with
//! `anyhow` for context.

use std::path::PathBuf;
use thiserror::Error;

/// Global error type for assessd operations
#[derive(Error, Debug)]
pub enum AssessError {
    /// IO errors with path context
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid caller input (empty session type, malformed body)
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// HTTP listener failures
    #[error("Server error on {addr}: {message}")]
    Server { addr: String, message: String },
}

impl AssessError {
    /// Create an IO error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a server error
    pub fn server(addr: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Server {
            addr: addr.into(),
            message: message.into(),
        }
    }

    /// Returns the error severity level for logging
    pub fn severity(&self) -> tracing::Level {
        match self {
            AssessError::Config { .. } => tracing::Level::ERROR,
            AssessError::Server { .. } => tracing::Level::ERROR,
            AssessError::Io { .. } => tracing::Level::WARN,
            AssessError::Serialization { .. } => tracing::Level::WARN,
            AssessError::InvalidInput { .. } => tracing::Level::INFO,
        }
    }

    /// Returns a hint for the operator, when one is useful
    pub fn suggestion(&self) -> Option<String> {
        match self {
            AssessError::Config { .. } => Some(
                "Check ~/.assessd/config.json or the ASSESSD_* environment variables.".to_string(),
            ),
            AssessError::Server { .. } => {
                Some("Make sure the bind address is free, or pass --bind.".to_string())
            }
            AssessError::Serialization { .. } => Some(
                "Fix the JSON syntax in the config file, or remove it to use defaults.".to_string(),
            ),
            AssessError::InvalidInput { message } if message.contains("type") => {
                Some("Sessions need a non-empty type such as \"assessment\".".to_string())
            }
            _ => None,
        }
    }
}

/// Result type alias using AssessError
pub type Result<T> = std::result::Result<T, AssessError>;

impl From<serde_json::Error> for AssessError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}
