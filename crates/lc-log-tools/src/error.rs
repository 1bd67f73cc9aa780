//! Extraction error types.

use thiserror::Error;

/// Errors that can occur while reading or extracting logs.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid log format: {0}")]
    Format(String),

    #[error("source not found: {0}")]
    NotFound(String),

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// Convenience alias for extraction results.
pub type LogResult<T> = Result<T, LogError>;
