//! Error Handling
//!
//! Unified error types for the application.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use incito_core::CoreError;
use incito_graders::GraderError;
use incito_llm::LlmError;

use crate::services::run_mode::RunModeError;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(String),

    /// SQLite errors (auto-converted from rusqlite::Error)
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Sidecar / model errors
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// Grader errors
    #[error(transparent)]
    Grader(#[from] GraderError),

    /// Run-mode errors
    #[error(transparent)]
    RunMode(#[from] RunModeError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Cancellation is expected control flow, not a failure to report.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Llm(e) => e.is_cancelled(),
            Self::RunMode(e) => e.is_cancelled(),
            _ => false,
        }
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(e) => AppError::Io(e),
            CoreError::Serialization(e) => AppError::Serialization(e),
            CoreError::Validation(msg) => AppError::Validation(msg),
            CoreError::NotFound(msg) => AppError::NotFound(msg),
            CoreError::Parse(msg) => AppError::Validation(format!("Parse error: {}", msg)),
        }
    }
}

/// Convert AppError to a string for command responses
impl From<AppError> for String {
    fn from(err: AppError) -> String {
        err.to_string()
    }
}
