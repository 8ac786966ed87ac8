//! Language-model narrator.
//!
//! Implements the core [`Narrator`] boundary on top of `civic-llm`. Every
//! call is bounded by a hard timeout and degrades to the deterministic
//! fallback, so a slow or missing model never stalls the tick.

use std::time::Duration;

use civic_core::citizen::{AgeGroup, Gender};
use civic_core::config::LlmConfig;
use civic_core::narrator::{
    ChildPersonaRequest, CityEventPayload, CityLog, Narrator, ParentProfile, Persona, fallback_child_persona,
};
use civic_llm::prompt::{PromptEngine, PromptId};
use civic_llm::{ChildPersonaOutput, CityLogOutput, LlmClient, LlmError, LlmProvider, LlmRequest, LlmResponse};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info, warn};

/// Narrator backed by an Ollama or OpenAI-compatible model.
pub struct LlmNarrator {
    client: LlmClient,
    prompts: PromptEngine,
    runtime: Runtime,
    timeout: Duration,
}

impl LlmNarrator {
    /// Build from the `[llm]` config section. The API key, when needed, is
    /// read from the environment variable named by `api_key_env`; prompt
    /// files in `prompts_dir` replace the built-in templates.
    ///
    /// # Errors
    /// [`LlmError::ConfigError`] for an unknown provider, a missing key, an
    /// unreadable prompt file, or a runtime that fails to start.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config.api_key_env.as_deref().and_then(|var| std::env::var(var).ok());
        let provider = LlmProvider::from_name(&config.provider, &config.base_url, api_key)?;
        let client = LlmClient::new(provider, config.model.clone(), config.max_retries);
        let prompts = match &config.prompts_dir {
            Some(dir) => {
                info!(dir = %dir.display(), "Loading prompt overrides");
                PromptEngine::with_overrides(dir).map_err(LlmError::ConfigError)?
            }
            None => PromptEngine::builtin(),
        };
        Self::new(client, prompts, Duration::from_millis(config.timeout_ms))
    }

    /// Build around an explicit client and prompt set.
    ///
    /// # Errors
    /// [`LlmError::ConfigError`] if the runtime cannot start.
    pub fn new(client: LlmClient, prompts: PromptEngine, timeout: Duration) -> Result<Self, LlmError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("civic-llm")
            .enable_all()
            .build()
            .map_err(|e| LlmError::ConfigError(format!("failed to start LLM runtime: {e}")))?;
        info!(model = client.model(), available = client.is_available(), "LLM narrator ready");
        Ok(Self {
            client,
            prompts,
            runtime,
            timeout,
        })
    }

    /// Run one request to completion, bounded by the narrator timeout.
    fn call(&self, id: PromptId, vars: &[(&str, &str)]) -> Result<LlmResponse, LlmError> {
        if !self.client.is_available() {
            return Err(LlmError::Unavailable("no provider configured".into()));
        }
        let request = self.request(id, vars)?;
        let timeout_ms = request.timeout_ms;
        self.runtime
            .block_on(async { tokio::time::timeout(self.timeout, self.client.generate(&request)).await })
            .map_err(|_| LlmError::Timeout(timeout_ms))?
    }

    fn request(&self, id: PromptId, vars: &[(&str, &str)]) -> Result<LlmRequest, LlmError> {
        let template = self
            .prompts
            .get(id)
            .ok_or_else(|| LlmError::ConfigError(format!("prompt '{id}' not loaded")))?;
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        Ok(template.request(vars).with_timeout(timeout_ms))
    }

    fn persona_from_model(&self, request: &ChildPersonaRequest) -> Result<Persona, LlmError> {
        let date = request.date.format("%Y-%m-%d").to_string();
        let parents = describe_parents(&request.parents);
        let recent = if request.recent_events.is_empty() {
            "(none)".to_string()
        } else {
            request
                .recent_events
                .iter()
                .map(|e| format!("- {e}"))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let vars = [
            ("date", date.as_str()),
            ("address", request.household_address.as_str()),
            ("parents", parents.as_str()),
            ("recent_events", recent.as_str()),
        ];
        let response = self.call(PromptId::ChildPersona, &vars)?;
        let output: ChildPersonaOutput = self.client.parse_structured(&response)?;
        output.validate()?;
        persona_from_output(output)
    }

    fn log_from_model(&self, payload: &CityEventPayload) -> Result<CityLog, LlmError> {
        let date = payload.date.format("%Y-%m-%d").to_string();
        let location = payload.location.as_deref().unwrap_or("citywide");
        let vars = [
            ("date", date.as_str()),
            ("kind", payload.kind.as_str()),
            ("severity", payload.severity.as_str()),
            ("location", location),
            ("description", payload.description.as_str()),
        ];
        let response = self.call(PromptId::CityLog, &vars)?;
        let output: CityLogOutput = self.client.parse_structured(&response)?;
        output.validate()?;
        Ok(CityLog {
            summary: output.summary.trim().to_string(),
            log_entry: output.log_entry.trim().to_string(),
        })
    }
}

impl Narrator for LlmNarrator {
    fn generate_child_persona(&self, request: &ChildPersonaRequest) -> Persona {
        match self.persona_from_model(request) {
            Ok(persona) => persona,
            Err(err) => {
                if err.is_unavailable() {
                    debug!("No model configured; using deterministic persona");
                } else {
                    warn!(%err, address = %request.household_address, "Persona generation failed; using fallback");
                }
                fallback_child_persona(request)
            }
        }
    }

    fn record_city_event(&self, payload: &CityEventPayload) -> Option<CityLog> {
        match self.log_from_model(payload) {
            Ok(log) => Some(log),
            Err(err) if err.is_unavailable() => None,
            Err(err) => {
                warn!(%err, kind = %payload.kind, "City log generation failed");
                None
            }
        }
    }

    fn generate_response(&self, prompt: &str) -> Option<String> {
        let response = match self.call(PromptId::Dialogue, &[("situation", prompt)]) {
            Ok(response) => response,
            Err(err) if err.is_unavailable() => return None,
            Err(err) => {
                warn!(%err, "Dialogue generation failed");
                return None;
            }
        };
        let line = clean_line(&response.text);
        (!line.is_empty()).then_some(line)
    }

    fn is_available(&self) -> bool {
        self.client.is_available()
    }

    fn name(&self) -> &'static str {
        "llm"
    }
}

impl std::fmt::Debug for LlmNarrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmNarrator")
            .field("client", &self.client)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn describe_parents(parents: &[ParentProfile]) -> String {
    parents
        .iter()
        .map(|p| {
            let mut line = format!("- {} ({}, {})", p.name, p.gender.as_str(), p.age_group.as_str());
            if !p.temperament.is_empty() {
                line.push_str(": ");
                line.push_str(&p.temperament);
            }
            if !p.values.is_empty() {
                line.push_str("; values ");
                line.push_str(&p.values.join(", "));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn persona_from_output(output: ChildPersonaOutput) -> Result<Persona, LlmError> {
    let gender = Gender::parse(&output.gender)
        .ok_or_else(|| LlmError::SchemaValidation(format!("gender '{}'", output.gender)))?;
    let age_group = AgeGroup::parse(&output.age_group)
        .ok_or_else(|| LlmError::SchemaValidation(format!("age_group '{}'", output.age_group)))?;
    let persona = Persona {
        name: output.name.trim().to_string(),
        gender,
        age_group,
        temperament: output.temperament.trim().to_string(),
        values: output.values.into_iter().take(3).collect(),
        summary: output.summary.trim().to_string(),
    };
    persona.validate().map_err(LlmError::SchemaValidation)?;
    Ok(persona)
}

/// First non-empty line, without surrounding quotes or a speaker prefix.
fn clean_line(text: &str) -> String {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or_default();
    let line = match line.split_once(": ") {
        Some((speaker, rest)) if looks_like_name(speaker) && !rest.trim().is_empty() => rest,
        _ => line,
    };
    line.trim_matches(|c| matches!(c, '"' | '\u{201c}' | '\u{201d}'))
        .trim()
        .to_string()
}

fn looks_like_name(text: &str) -> bool {
    let words: Vec<&str> = text.split_whitespace().collect();
    (1..=3).contains(&words.len())
        && words
            .iter()
            .all(|w| w.chars().next().is_some_and(char::is_uppercase) && w.chars().all(char::is_alphabetic))
}
