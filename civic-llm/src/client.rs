//! LLM client: one interface over the Ollama and OpenAI-compatible APIs.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::types::{LlmRequest, LlmResponse};

/// Which backend serves the requests.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// Ollama's `/api/generate` endpoint.
    Ollama {
        /// Server root, e.g. `http://localhost:11434`.
        base_url: String,
    },
    /// A `/v1/chat/completions` endpoint.
    OpenAiCompatible {
        /// Server root.
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// No backend: every call fails with [`LlmError::Unavailable`].
    None,
}

impl LlmProvider {
    /// Build a provider from a config name (`ollama`, `openai`, `none`).
    ///
    /// # Errors
    /// [`LlmError::ConfigError`] for an unknown name or an OpenAI provider
    /// without an API key.
    pub fn from_name(name: &str, base_url: &str, api_key: Option<String>) -> Result<Self, LlmError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        match name.to_lowercase().as_str() {
            "none" | "" | "disabled" => Ok(Self::None),
            "ollama" => Ok(Self::Ollama { base_url }),
            "openai" | "openai_compatible" => {
                let api_key = api_key
                    .filter(|k| !k.trim().is_empty())
                    .ok_or_else(|| LlmError::ConfigError("OpenAI-compatible provider needs an API key".into()))?;
                Ok(Self::OpenAiCompatible { base_url, api_key })
            }
            other => Err(LlmError::ConfigError(format!("unknown provider '{other}'"))),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Ollama { .. } => "ollama",
            Self::OpenAiCompatible { .. } => "openai",
            Self::None => "none",
        }
    }
}

/// Routes requests to the configured backend.
pub struct LlmClient {
    provider: LlmProvider,
    http: Client,
    model: String,
    max_retries: u32,
}

impl LlmClient {
    /// Create a client for `model` on `provider`.
    #[must_use]
    pub fn new(provider: LlmProvider, model: impl Into<String>, max_retries: u32) -> Self {
        Self {
            provider,
            http: Client::new(),
            model: model.into(),
            max_retries,
        }
    }

    /// A client with no backend.
    #[must_use]
    pub fn none() -> Self {
        Self::new(LlmProvider::None, String::new(), 0)
    }

    /// Send `request` to the backend.
    ///
    /// # Errors
    /// [`LlmError::Unavailable`] without a backend, otherwise
    /// [`LlmError::RetriesExhausted`] once every attempt failed. The caller
    /// is expected to fall back to deterministic output on error.
    pub async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        match &self.provider {
            LlmProvider::None => Err(LlmError::Unavailable("No LLM provider configured".into())),
            LlmProvider::Ollama { base_url } => {
                let mut body = json!({
                    "model": self.model,
                    "system": request.system,
                    "prompt": request.user,
                    "stream": false,
                    "options": {
                        "temperature": request.temperature,
                        "num_predict": request.max_tokens,
                    }
                });
                if request.json_mode {
                    body["format"] = json!("json");
                }
                let url = format!("{base_url}/api/generate");
                self.send(&url, None, &body, request.timeout_ms, |v| {
                    (v["response"].as_str().map(str::to_string), v["eval_count"].as_u64())
                })
                .await
            }
            LlmProvider::OpenAiCompatible { base_url, api_key } => {
                let mut body = json!({
                    "model": self.model,
                    "messages": [
                        { "role": "system", "content": request.system },
                        { "role": "user", "content": request.user },
                    ],
                    "max_tokens": request.max_tokens,
                    "temperature": request.temperature,
                });
                if request.json_mode {
                    body["response_format"] = json!({ "type": "json_object" });
                }
                let url = format!("{base_url}/v1/chat/completions");
                self.send(&url, Some(api_key), &body, request.timeout_ms, |v| {
                    (
                        v["choices"][0]["message"]["content"].as_str().map(str::to_string),
                        v["usage"]["completion_tokens"].as_u64(),
                    )
                })
                .await
            }
        }
    }

    /// POST `body` with retries, pulling text and token count out of the
    /// reply with `extract`.
    async fn send(
        &self,
        url: &str,
        api_key: Option<&str>,
        body: &Value,
        timeout_ms: u64,
        extract: fn(&Value) -> (Option<String>, Option<u64>),
    ) -> Result<LlmResponse, LlmError> {
        let provider = self.provider.label();
        let mut last_error = String::new();

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(provider, attempt = attempt + 1, of = self.max_retries + 1, "Retrying LLM call");
            }

            let start = Instant::now();
            let mut call = self.http.post(url).json(body).timeout(Duration::from_millis(timeout_ms));
            if let Some(key) = api_key {
                call = call.bearer_auth(key);
            }
            let result = call.send().await;
            let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let json: Value = resp.json().await.map_err(|e| LlmError::ParseError(e.to_string()))?;
                    let (text, tokens) = extract(&json);
                    let Some(text) = text else {
                        last_error = "reply carried no text".into();
                        warn!(provider, "LLM reply carried no text");
                        continue;
                    };
                    debug!(provider, latency_ms, "LLM call succeeded");
                    return Ok(LlmResponse {
                        text,
                        tokens_generated: tokens.and_then(|t| u32::try_from(t).ok()).unwrap_or(0),
                        latency_ms,
                        model: self.model.clone(),
                    });
                }
                Ok(resp) => {
                    let status = resp.status();
                    last_error = format!("HTTP {status}: {}", resp.text().await.unwrap_or_default());
                    warn!(provider, %status, "LLM backend returned an error");
                }
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_timeout() {
                        warn!(provider, timeout_ms, "LLM request timed out");
                    } else {
                        warn!(provider, error = %last_error, "LLM request failed");
                    }
                }
            }
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }

    /// Parse a reply as structured JSON.
    ///
    /// Small models like to wrap JSON in prose or code fences, so the first
    /// `{` through the last `}` is what gets parsed.
    ///
    /// # Errors
    /// [`LlmError::ParseError`] if no object parses into `T`.
    pub fn parse_structured<T: serde::de::DeserializeOwned>(&self, response: &LlmResponse) -> Result<T, LlmError> {
        let body = extract_json_object(&response.text)
            .ok_or_else(|| LlmError::ParseError(format!("no JSON object in reply: '{}'", response.text)))?;
        serde_json::from_str(body)
            .map_err(|e| LlmError::ParseError(format!("JSON parse error: {e}; raw text: '{}'", response.text)))
    }

    /// Whether a backend is configured.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self.provider, LlmProvider::None)
    }

    /// Model name sent with each request.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The configured backend.
    #[must_use]
    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("provider", &self.provider.label())
            .field("model", &self.model)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

/// Slice from the first `{` to the last `}`.
#[must_use]
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CityLogOutput;

    fn reply(text: &str) -> LlmResponse {
        LlmResponse {
            text: text.into(),
            tokens_generated: 0,
            latency_ms: 0,
            model: "test".into(),
        }
    }

    #[test]
    fn provider_names_resolve() {
        assert!(matches!(LlmProvider::from_name("none", "", None), Ok(LlmProvider::None)));
        assert!(matches!(
            LlmProvider::from_name("Ollama", "http://localhost:11434/", None),
            Ok(LlmProvider::Ollama { base_url }) if base_url == "http://localhost:11434"
        ));
        assert!(LlmProvider::from_name("openai", "https://api.example", None).is_err());
        assert!(LlmProvider::from_name("carrier-pigeon", "", None).is_err());
    }

    #[test]
    fn parses_fenced_json() {
        let client = LlmClient::none();
        let text = "Sure!\n```json\n{\"summary\": \"Fire\", \"log_entry\": \"A fire broke out.\"}\n```";
        let log: CityLogOutput = client.parse_structured(&reply(text)).expect("parses");
        assert_eq!(log.summary, "Fire");
    }

    #[test]
    fn rejects_text_without_object() {
        let client = LlmClient::none();
        let err = client.parse_structured::<CityLogOutput>(&reply("no json here")).expect_err("fails");
        assert!(matches!(err, LlmError::ParseError(_)));
    }

    #[tokio::test]
    async fn none_provider_is_unavailable() {
        let client = LlmClient::none();
        assert!(!client.is_available());
        let err = client
            .generate(&LlmRequest::dialogue("sys", "hi"))
            .await
            .expect_err("no backend");
        assert!(err.is_unavailable());
    }
}
