//! # civic-llm: LLM Abstraction Layer for CIVIC
//!
//! One client for the two HTTP backends the city narrator can talk to:
//!   - **Ollama** (local, the default)
//!   - **OpenAI-compatible API** (any chat-completions endpoint)
//!
//! Every call the narrator makes goes through this crate:
//!   - Structured output: JSON mode plus tolerant extraction of the first
//!     JSON object in the reply
//!   - Per-request timeout and bounded retries
//!   - `LlmProvider::None` fails fast so callers drop straight to their
//!     deterministic fallback
//!
//! The crate knows nothing about citizens or households; it only renders
//! prompts and moves text.

#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod error;
pub mod prompt;
pub mod types;

pub use client::{LlmClient, LlmProvider};
pub use error::LlmError;
pub use types::{ChildPersonaOutput, CityLogOutput, LlmRequest, LlmResponse};
