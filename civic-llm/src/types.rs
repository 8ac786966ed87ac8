//! Request, response and structured-output types.

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// A request to the model.
#[derive(Debug, Clone, Serialize)]
pub struct LlmRequest {
    /// System prompt (role, rules, output contract).
    pub system: String,
    /// User prompt (the concrete situation).
    pub user: String,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Temperature (0.0 = deterministic, 1.0 = creative).
    pub temperature: f32,
    /// Ask the backend for JSON-only output.
    pub json_mode: bool,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl LlmRequest {
    /// A request expecting a JSON object back (personas, chronicle entries).
    #[must_use]
    pub fn structured(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            max_tokens: 300,
            temperature: 0.7,
            json_mode: true,
            timeout_ms: 8000,
        }
    }

    /// A request for a single short line of free text.
    #[must_use]
    pub fn dialogue(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            max_tokens: 60,
            temperature: 0.8,
            json_mode: false,
            timeout_ms: 8000,
        }
    }

    /// Override sampling settings from a prompt template.
    #[must_use]
    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// A reply from the model.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmResponse {
    /// The generated text.
    pub text: String,
    /// Tokens generated, when the backend reports it.
    pub tokens_generated: u32,
    /// Latency in milliseconds.
    pub latency_ms: u64,
    /// Model that answered.
    pub model: String,
}

/// Structured newborn persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildPersonaOutput {
    /// Given name.
    pub name: String,
    /// `male` or `female`.
    pub gender: String,
    /// `child` or `teen`.
    pub age_group: String,
    /// Short temperament description.
    pub temperament: String,
    /// A few value tags.
    #[serde(default)]
    pub values: Vec<String>,
    /// One-sentence narrative summary.
    pub summary: String,
}

impl ChildPersonaOutput {
    /// Reject answers the simulation cannot use.
    ///
    /// # Errors
    /// [`LlmError::SchemaValidation`] naming the offending field.
    pub fn validate(&self) -> Result<(), LlmError> {
        if self.name.trim().is_empty() {
            return Err(LlmError::SchemaValidation("name is empty".into()));
        }
        if !matches!(self.gender.to_lowercase().as_str(), "male" | "female") {
            return Err(LlmError::SchemaValidation(format!("gender '{}'", self.gender)));
        }
        if !matches!(self.age_group.to_lowercase().as_str(), "child" | "teen") {
            return Err(LlmError::SchemaValidation(format!("age_group '{}'", self.age_group)));
        }
        if self.summary.trim().is_empty() {
            return Err(LlmError::SchemaValidation("summary is empty".into()));
        }
        Ok(())
    }
}

/// Structured chronicle entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityLogOutput {
    /// Short summary.
    pub summary: String,
    /// Longer log entry.
    pub log_entry: String,
}

impl CityLogOutput {
    /// Reject empty entries.
    ///
    /// # Errors
    /// [`LlmError::SchemaValidation`] when either field is blank.
    pub fn validate(&self) -> Result<(), LlmError> {
        if self.summary.trim().is_empty() || self.log_entry.trim().is_empty() {
            return Err(LlmError::SchemaValidation("summary and log_entry must be non-empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persona_output_validation() {
        let mut persona = ChildPersonaOutput {
            name: "Lia".into(),
            gender: "Female".into(),
            age_group: "child".into(),
            temperament: "curious".into(),
            values: vec!["kindness".into()],
            summary: "Born at dawn.".into(),
        };
        assert!(persona.validate().is_ok());
        persona.age_group = "adult".into();
        assert!(matches!(persona.validate(), Err(LlmError::SchemaValidation(_))));
    }

    #[test]
    fn persona_values_default_to_empty() {
        let json = r#"{"name":"Finn","gender":"male","age_group":"teen","temperament":"bold","summary":"A new face."}"#;
        let persona: ChildPersonaOutput = serde_json::from_str(json).expect("parses");
        assert!(persona.values.is_empty());
    }

    #[test]
    fn blank_log_is_rejected() {
        let log = CityLogOutput {
            summary: " ".into(),
            log_entry: "Something happened.".into(),
        };
        assert!(log.validate().is_err());
    }
}
