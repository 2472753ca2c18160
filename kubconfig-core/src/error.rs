//! Error types for kubconfig-core.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias using kubconfig-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for kubconfig operations
#[derive(Error, Debug)]
pub enum Error {
    // Control plane errors
    #[error("Permission denied: cannot {verb} {resource}")]
    PermissionDenied { verb: String, resource: String },

    #[error("{kind} not found: {name}")]
    NotFound { kind: String, name: String },

    #[error("Timed out waiting for consistency: {0}")]
    TimeoutWaitingForConsistency(String),

    #[error("Command failed: {cmd}\n{stderr}")]
    CommandFailed { cmd: String, stderr: String },

    // Token errors
    #[error("Token expiry mismatch: expected {expected}, got {actual}")]
    TokenIntegrityMismatch {
        expected: DateTime<Utc>,
        actual: DateTime<Utc>,
    },

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    // Session errors
    #[error("Session already expired at {0}")]
    SessionExpired(DateTime<Utc>),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Cleanup incomplete: {}", .0.join("; "))]
    PartialCleanupFailure(Vec<String>),

    // Document errors
    #[error("Malformed kubeconfig: {field}: {reason}")]
    MalformedDocument { field: String, reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create an error from a command failure
    pub fn command_failed(cmd: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandFailed {
            cmd: cmd.into(),
            stderr: stderr.into(),
        }
    }

    /// Create a document error naming the offending field
    pub fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedDocument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether the caller may retry the operation that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TimeoutWaitingForConsistency(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
