//! Error types for Memvault

use thiserror::Error;

use crate::validation::ValidationError;

/// Result type alias for Memvault operations
pub type Result<T> = std::result::Result<T, MemvaultError>;

/// Main error type for Memvault
#[derive(Error, Debug)]
pub enum MemvaultError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Tool name '{0}' already exists")]
    DuplicateName(String),

    #[error("Error executing tool '{tool}': {message}")]
    Execution { tool: String, message: String },

    #[error("Remote sync error: {0}")]
    RemoteSync(String),

    #[error("Remote request timed out after {0}ms")]
    Timeout(u64),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ValidationError> for MemvaultError {
    fn from(err: ValidationError) -> Self {
        MemvaultError::Validation(err.to_string())
    }
}

impl MemvaultError {
    /// Whether this error came from the remote mirror and may be degraded
    /// to metadata instead of failing the local operation.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            MemvaultError::RemoteSync(_) | MemvaultError::Timeout(_) | MemvaultError::Http(_)
        )
    }

    /// Get error code for MCP protocol
    pub fn code(&self) -> i64 {
        match self {
            MemvaultError::NotFound(_) => -32001,
            MemvaultError::Validation(_) => -32602,
            MemvaultError::DuplicateName(_) => -32006,
            MemvaultError::Execution { .. } => -32010,
            MemvaultError::RemoteSync(_) | MemvaultError::Timeout(_) => -32011,
            _ => -32000,
        }
    }
}
