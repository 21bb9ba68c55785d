//! Core Error Types
//!
//! Defines the foundational error types used across the Incito workspace.
//! These error types are dependency-free (only thiserror + std) to keep the core
//! crate lightweight.
//!
//! The main application crate extends these with additional variants
//! (e.g., Database, Sqlite, Sidecar) that require heavier dependencies.

use thiserror::Error;

/// Core error type for the Incito workspace.
#[derive(Error, Debug)]
pub enum CoreError {
    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Parse errors
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Result type alias for core errors
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}

impl From<CoreError> for String {
    fn from(err: CoreError) -> String {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::not_found("Unknown tool: searchWeb");
        assert_eq!(err.to_string(), "Not found: Unknown tool: searchWeb");
    }

    #[test]
    fn test_error_conversion() {
        let err = CoreError::validation("invalid variable key");
        let msg: String = err.into();
        assert!(msg.contains("Validation error"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let core_err: CoreError = io_err.into();
        assert!(matches!(core_err, CoreError::Io(_)));
    }

    #[test]
    fn test_parse_error() {
        let err = CoreError::parse("unterminated placeholder");
        assert_eq!(err.to_string(), "Parse error: unterminated placeholder");
    }
}
