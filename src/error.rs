//! Error types for the insurance chat orchestrator

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Structured error code attached to every surfaced failure.
///
/// The code is for logs and the interaction log; users only ever see the
/// chat message that accompanies it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    BusinessRuleViolation,
    NotFound,
    UpstreamError,
    UnclassifiedInput,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::BusinessRuleViolation => "BUSINESS_RULE_VIOLATION",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::UpstreamError => "UPSTREAM_ERROR",
            ErrorCode::UnclassifiedInput => "UNCLASSIFIED_INPUT",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Infrastructure failures: knowledge search, storage, configuration.
///
/// Conversation problems (bad slot values, rule violations, unknown ids) are
/// never errors at this level; they travel as `ErrorCode`s on a turn's output.
/// Anything that does surface as an `OrchestrationError` during a turn is
/// reported to the user as `UPSTREAM_ERROR`.
#[derive(Error, Debug)]
pub enum OrchestrationError {
    #[error("Knowledge store error: {0}")]
    Knowledge(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_serialize_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::BusinessRuleViolation).unwrap();
        assert_eq!(json, "\"BUSINESS_RULE_VIOLATION\"");
        assert_eq!(ErrorCode::NotFound.to_string(), "NOT_FOUND");
    }

    #[test]
    fn test_library_errors_convert_with_context() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "knowledge.json");
        let err: OrchestrationError = io.into();
        assert!(matches!(err, OrchestrationError::IoError(_)));
        assert!(err.to_string().starts_with("IO error:"));

        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: OrchestrationError = json.into();
        assert!(err.to_string().starts_with("Serialization error:"));

        let err = OrchestrationError::Config("MAX_RESULTS must be a number".into());
        assert_eq!(
            err.to_string(),
            "Configuration error: MAX_RESULTS must be a number"
        );
    }
}
