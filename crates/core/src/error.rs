//! Error types for the Planes workspace.
//!
//! This module defines a unified error enum covering configuration, I/O,
//! generation providers, retrieval and prompt rendering failures.

use thiserror::Error;

/// Unified error type for the Planes workspace.
///
/// Library functions return `Result<T, AppError>`. Degradable failures
/// (classification, extraction, retrieval) are absorbed by the pipeline;
/// only generation failures surface to callers.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Provider refused the request because of quota or rate limits (HTTP 429)
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Circuit breaker is open after repeated provider failures
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// An external call exceeded its time budget
    #[error("Timed out after {seconds}s: {operation}")]
    Timeout { operation: String, seconds: u64 },

    /// Party catalog and passage store errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Vector search errors
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Caller input outside accepted bounds (question length, history size)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Build a timeout error for the named operation.
    pub fn timeout(operation: impl Into<String>, seconds: u64) -> Self {
        AppError::Timeout {
            operation: operation.into(),
            seconds,
        }
    }

    /// Short, stable name of the error kind (used in traces and JSON output).
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Llm(_) => "llm",
            AppError::RateLimited(_) => "rate_limited",
            AppError::Unavailable(_) => "unavailable",
            AppError::Timeout { .. } => "timeout",
            AppError::Knowledge(_) => "knowledge",
            AppError::Retrieval(_) => "retrieval",
            AppError::Prompt(_) => "prompt",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::Serialization(_) => "serialization",
            AppError::Other(_) => "other",
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
