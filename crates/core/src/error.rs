//! Error types for motolaw.
//!
//! A single error enum covers every infrastructure failure category. Workflow
//! outcomes such as "no relevant evidence" or "unsafe question" are not errors
//! and never appear here.

use thiserror::Error;

/// Unified error type for motolaw.
///
/// All fallible functions return `Result<T, AppError>`.
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

    /// Knowledge base and embedding errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Web search provider errors
    #[error("Search error: {0}")]
    Search(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Conversation history store errors
    #[error("History error: {0}")]
    History(String),

    /// Workflow wiring errors (missing collaborator, invalid transition)
    #[error("Workflow error: {0}")]
    Workflow(String),

    /// An external call exceeded its deadline
    #[error("Timed out after {seconds}s: {operation}")]
    Timeout { operation: String, seconds: u64 },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = AppError::Timeout {
            operation: "web search".to_string(),
            seconds: 15,
        };
        assert_eq!(err.to_string(), "Timed out after 15s: web search");
    }

    #[test]
    fn test_from_serde_json() {
        let err: AppError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, AppError::Serialization(_)));
    }
}
