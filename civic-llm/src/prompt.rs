//! Prompt templates for the city narrator.
//!
//! The built-in templates are compiled in; a directory of TOML files with
//! the same names can replace them without a rebuild.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::types::LlmRequest;

/// Newborn persona design (structured).
pub const CHILD_PERSONA_SYSTEM: &str = r"You are the Citizen Persona Designer for a small simulated city.
You design concise persona summaries for newborn citizens.

RULES:
- Blend the parents' temperaments and values; keep values to at most 3 short tags.
- The newborn is a child: age_group must be child or teen.
- gender must be male or female.
- The summary is one sentence and names both parents.
- Your response must be a single JSON object and nothing else.";

/// User half of the persona prompt.
pub const CHILD_PERSONA_USER: &str = r#"Date: {date}
Household address: {address}

Parents:
{parents}

Recent births in the city:
{recent_events}

Create the persona. Return JSON:
{"name": "given name", "gender": "male or female", "age_group": "child or teen", "temperament": "short description", "values": ["value", ...], "summary": "one-sentence narrative summary"}"#;

/// City chronicle entry (structured).
pub const CITY_LOG_SYSTEM: &str = r"You are the City Chronicle, keeping the log of a small simulated city.
You record concise narrative entries for events as they happen.

RULES:
- The summary is one short sentence a resident could repeat to a neighbour.
- The log entry is two or three sentences in a plain chronicle voice.
- Never invent casualties or names that are not in the event.
- Your response must be a single JSON object and nothing else.";

/// User half of the chronicle prompt.
pub const CITY_LOG_USER: &str = r#"Event date: {date}
Kind: {kind}
Severity: {severity}
Location: {location}
What happened: {description}

Record this event. Return JSON:
{"summary": "short summary", "log_entry": "chronicle entry"}"#;

/// Commuter small talk (free text).
pub const DIALOGUE_SYSTEM: &str = r"You are a dialogue writer for residents of a small simulated city.
You write exactly one spoken line of everyday small talk.

RULES:
- One or two short sentences, under 25 words.
- Output only the spoken words: no quotes, no speaker name, no stage directions.
- When the conversation has run its course, keep the line very short.";

/// User half of the dialogue prompt; the simulation supplies the situation.
pub const DIALOGUE_USER: &str = "{situation}";

/// Replace each `{key}` in `template` with its value. Unknown placeholders
/// are left alone.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{key}}}"), value);
    }
    result
}

// ---------------------------------------------------------------------------
// PromptEngine: built-in or TOML-loaded templates
// ---------------------------------------------------------------------------

/// Identifies a prompt template by purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// Newborn persona.
    ChildPersona,
    /// City chronicle entry.
    CityLog,
    /// Commuter dialogue line.
    Dialogue,
}

impl PromptId {
    /// TOML filename for this prompt.
    #[must_use]
    pub fn filename(self) -> &'static str {
        match self {
            Self::ChildPersona => "child_persona.toml",
            Self::CityLog => "city_log.toml",
            Self::Dialogue => "dialogue.toml",
        }
    }

    /// All prompt ids.
    #[must_use]
    pub fn all() -> &'static [PromptId] {
        &[Self::ChildPersona, Self::CityLog, Self::Dialogue]
    }
}

impl fmt::Display for PromptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ChildPersona => "child_persona",
            Self::CityLog => "city_log",
            Self::Dialogue => "dialogue",
        };
        write!(f, "{name}")
    }
}

impl FromStr for PromptId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "child_persona" => Ok(Self::ChildPersona),
            "city_log" => Ok(Self::CityLog),
            "dialogue" => Ok(Self::Dialogue),
            _ => Err(format!("unknown prompt id: '{s}'")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TomlPromptFile {
    prompt: TomlPromptData,
}

#[derive(Debug, Clone, Deserialize)]
struct TomlPromptData {
    version: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(default)]
    json_mode: bool,
    system: String,
    user: String,
}

/// A loaded, ready-to-render prompt template.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// Version string (`builtin` for compiled-in templates).
    pub version: String,
    /// Maximum output tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Whether the reply must be JSON.
    pub json_mode: bool,
    /// System prompt with `{key}` placeholders.
    pub system: String,
    /// User prompt with `{key}` placeholders.
    pub user: String,
}

impl PromptTemplate {
    /// Render into a request carrying this template's sampling settings.
    #[must_use]
    pub fn request(&self, vars: &[(&str, &str)]) -> LlmRequest {
        let system = render_template(&self.system, vars);
        let user = render_template(&self.user, vars);
        let base = if self.json_mode {
            LlmRequest::structured(system, user)
        } else {
            LlmRequest::dialogue(system, user)
        };
        base.with_sampling(self.max_tokens, self.temperature)
    }
}

/// Holds one template per [`PromptId`].
///
/// # Example
///
/// ```
/// use civic_llm::prompt::{PromptEngine, PromptId};
///
/// let engine = PromptEngine::builtin();
/// let (_system, user) = engine
///     .render(PromptId::Dialogue, &[("situation", "Say hello to Ava.")])
///     .expect("built-in dialogue template");
/// assert_eq!(user, "Say hello to Ava.");
/// ```
#[derive(Debug, Clone)]
pub struct PromptEngine {
    templates: HashMap<PromptId, PromptTemplate>,
}

impl PromptEngine {
    /// Engine with the compiled-in templates.
    #[must_use]
    pub fn builtin() -> Self {
        let mut templates = HashMap::new();
        templates.insert(
            PromptId::ChildPersona,
            PromptTemplate {
                version: "builtin".into(),
                max_tokens: 300,
                temperature: 0.8,
                json_mode: true,
                system: CHILD_PERSONA_SYSTEM.into(),
                user: CHILD_PERSONA_USER.into(),
            },
        );
        templates.insert(
            PromptId::CityLog,
            PromptTemplate {
                version: "builtin".into(),
                max_tokens: 250,
                temperature: 0.6,
                json_mode: true,
                system: CITY_LOG_SYSTEM.into(),
                user: CITY_LOG_USER.into(),
            },
        );
        templates.insert(
            PromptId::Dialogue,
            PromptTemplate {
                version: "builtin".into(),
                max_tokens: 60,
                temperature: 0.9,
                json_mode: false,
                system: DIALOGUE_SYSTEM.into(),
                user: DIALOGUE_USER.into(),
            },
        );
        Self { templates }
    }

    /// Built-in templates, overridden by whichever TOML files `dir` holds.
    ///
    /// # Errors
    /// Returns an error if a file exists but cannot be read or parsed.
    pub fn with_overrides(dir: impl AsRef<Path>) -> Result<Self, String> {
        let mut engine = Self::builtin();
        engine.templates.extend(load_dir(dir.as_ref())?);
        Ok(engine)
    }

    /// Load templates only from TOML files in `dir`.
    ///
    /// # Errors
    /// Returns an error if a file cannot be parsed or no file is present.
    pub fn from_directory(dir: impl AsRef<Path>) -> Result<Self, String> {
        let dir = dir.as_ref();
        let templates = load_dir(dir)?;
        if templates.is_empty() {
            return Err(format!("no prompt templates found in directory: {}", dir.display()));
        }
        Ok(Self { templates })
    }

    /// Template by id.
    #[must_use]
    pub fn get(&self, id: PromptId) -> Option<&PromptTemplate> {
        self.templates.get(&id)
    }

    /// Render `(system, user)` for `id`.
    ///
    /// # Errors
    /// Returns an error if the template is not loaded.
    pub fn render(&self, id: PromptId, vars: &[(&str, &str)]) -> Result<(String, String), String> {
        let tpl = self.get(id).ok_or_else(|| format!("prompt template '{id}' not loaded"))?;
        Ok((render_template(&tpl.system, vars), render_template(&tpl.user, vars)))
    }

    /// Number of loaded templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether no templates are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn load_dir(dir: &Path) -> Result<HashMap<PromptId, PromptTemplate>, String> {
    let mut templates = HashMap::new();
    for id in PromptId::all() {
        let path: PathBuf = dir.join(id.filename());
        if !path.exists() {
            continue;
        }
        let content = std::fs::read_to_string(&path).map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        let parsed: TomlPromptFile =
            toml::from_str(&content).map_err(|e| format!("failed to parse {}: {e}", path.display()))?;
        let d = parsed.prompt;
        templates.insert(
            *id,
            PromptTemplate {
                version: d.version,
                max_tokens: d.max_tokens,
                temperature: d.temperature,
                json_mode: d.json_mode,
                system: d.system,
                user: d.user,
            },
        );
    }
    Ok(templates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_rendering_works() {
        let rendered = render_template("Born at {address} on {date}.", &[("address", "B-004"), ("date", "2026-01-02")]);
        assert_eq!(rendered, "Born at B-004 on 2026-01-02.");
    }

    #[test]
    fn template_handles_missing_vars() {
        let rendered = render_template("Hello {name}, {unknown}.", &[("name", "Ava")]);
        assert_eq!(rendered, "Hello Ava, {unknown}.");
    }

    #[test]
    fn prompt_id_from_str_round_trip() {
        for id in PromptId::all() {
            let parsed: PromptId = id.to_string().parse().expect("should parse");
            assert_eq!(*id, parsed);
        }
        assert!("bard".parse::<PromptId>().is_err());
    }

    #[test]
    fn builtin_engine_has_every_template() {
        let engine = PromptEngine::builtin();
        assert_eq!(engine.len(), PromptId::all().len());
        for id in PromptId::all() {
            assert!(engine.get(*id).is_some(), "{id} missing");
        }
    }

    #[test]
    fn template_request_carries_sampling() {
        let engine = PromptEngine::builtin();
        let tpl = engine.get(PromptId::CityLog).expect("builtin");
        let request = tpl.request(&[("kind", "fire"), ("date", "2026-01-04")]);
        assert!(request.json_mode);
        assert_eq!(request.max_tokens, 250);
        assert!(request.user.contains("Kind: fire"));
    }

    #[test]
    fn directory_overrides_single_template() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("dialogue.toml"),
            r#"[prompt]
version = "2"
max_tokens = 40
temperature = 0.5
system = "Speak like a sailor."
user = "{situation}"
"#,
        )
        .expect("write");

        let only = PromptEngine::from_directory(dir.path()).expect("loads");
        assert_eq!(only.len(), 1);

        let merged = PromptEngine::with_overrides(dir.path()).expect("loads");
        assert_eq!(merged.len(), PromptId::all().len());
        let dialogue = merged.get(PromptId::Dialogue).expect("present");
        assert_eq!(dialogue.version, "2");
        assert!(!dialogue.json_mode);
    }

    #[test]
    fn from_directory_errors_on_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(PromptEngine::from_directory(dir.path()).is_err());
    }
}
