//! Engine error types.

use lc_protocol::{IntentError, SessionId};
use thiserror::Error;

/// Errors raised while loading an endpoint catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid catalog: {0}")]
    Parse(String),

    /// Two entries share an id but differ in content.
    #[error("conflicting definitions for endpoint '{id}'")]
    Conflict { id: String },
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors raised while loading or validating engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid TOML: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Feedback session failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(SessionId),

    #[error("session {0} has no result to act on")]
    NoResult(SessionId),

    #[error("session {id} is already {phase}")]
    Terminal { id: SessionId, phase: String },
}

/// Top-level error for pipeline operations.
///
/// Retrieval and judgment failures never surface here: they degrade the
/// run instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Intent(#[from] IntentError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
