//! LLM error types.

use thiserror::Error;

/// Errors from talking to a model backend.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The HTTP exchange failed.
    #[error("LLM request failed: {0}")]
    RequestFailed(String),

    /// The reply held no parseable JSON.
    #[error("Failed to parse LLM response as JSON: {0}")]
    ParseError(String),

    /// The JSON did not have the expected shape or values.
    #[error("LLM output schema validation failed: {0}")]
    SchemaValidation(String),

    /// No reply within the deadline.
    #[error("LLM request timed out after {0}ms")]
    Timeout(u64),

    /// No backend configured or reachable.
    #[error("LLM provider unavailable: {0}")]
    Unavailable(String),

    /// Every attempt failed.
    #[error("All LLM retry attempts exhausted after {attempts} tries: {last_error}")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// Error of the final attempt.
        last_error: String,
    },

    /// Invalid provider settings.
    #[error("LLM configuration error: {0}")]
    ConfigError(String),
}

impl LlmError {
    /// Whether the error means "no model here", as opposed to a bad reply.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::ConfigError(_))
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(0)
        } else if err.is_connect() {
            LlmError::Unavailable(err.to_string())
        } else {
            LlmError::RequestFailed(err.to_string())
        }
    }
}
