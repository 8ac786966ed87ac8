//! Configuration for the CIVIC simulation.
//!
//! Maps directly to `civic.toml`. Every field has a serde default so a
//! partial file (or an empty one) yields a working configuration.

use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CivicError, Result};

/// Top-level CIVIC configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CivicConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Simulated clock.
    #[serde(default)]
    pub clock: ClockConfig,
    /// Map dimensions.
    #[serde(default)]
    pub world: WorldConfig,
    /// Bootstrap population.
    #[serde(default)]
    pub population: PopulationConfig,
    /// Births and random city events.
    #[serde(default)]
    pub events: EventsConfig,
    /// Conversation engine.
    #[serde(default)]
    pub conversation: ConversationConfig,
    /// LLM narrator backend.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Persona snapshot and event log storage.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl CivicConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `CivicError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| CivicError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Seed for every random decision in the core.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            seed: default_seed(),
        }
    }
}

/// Simulated clock settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Simulated minutes per real second.
    #[serde(default = "default_minutes_per_second")]
    pub minutes_per_second: f64,
    /// First simulated day.
    #[serde(default = "default_start_date")]
    pub start_date: NaiveDate,
    /// Minute of day the simulation starts at.
    #[serde(default = "default_start_minutes")]
    pub start_minutes: u32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            minutes_per_second: default_minutes_per_second(),
            start_date: default_start_date(),
            start_minutes: default_start_minutes(),
        }
    }
}

/// Map dimensions used by procedural generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Width in tiles.
    #[serde(default = "default_width")]
    pub width: i32,
    /// Height in tiles.
    #[serde(default = "default_height")]
    pub height: i32,
    /// Render-space size of one tile.
    #[serde(default = "default_tile_size")]
    pub tile_size: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            tile_size: default_tile_size(),
        }
    }
}

/// Bootstrap population tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Stop bootstrapping once this many citizens exist.
    #[serde(default = "default_target_population")]
    pub target_population: usize,
    /// Maximum occupants of one residential tile.
    #[serde(default = "default_residential_capacity")]
    pub residential_capacity: usize,
    /// Chance that a bootstrapped adult is an elder.
    #[serde(default = "default_elder_chance")]
    pub elder_chance: f64,
    /// Chance that a household has a child or teen.
    #[serde(default = "default_child_chance")]
    pub child_chance: f64,
    /// Chance that such a dependant is a child rather than a teen.
    #[serde(default = "default_child_vs_teen")]
    pub child_vs_teen: f64,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            target_population: default_target_population(),
            residential_capacity: default_residential_capacity(),
            elder_chance: default_elder_chance(),
            child_chance: default_child_chance(),
            child_vs_teen: default_child_vs_teen(),
        }
    }
}

/// Birth and city event tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Minimum days between two births in one household.
    #[serde(default = "default_birth_cooldown_days")]
    pub birth_cooldown_days: i64,
    /// Length of the recent-births narrative log.
    #[serde(default = "default_recent_births")]
    pub recent_births_cap: usize,
    /// Lower bound of the random event inter-arrival, in days.
    #[serde(default = "default_min_interval")]
    pub min_event_interval_days: i64,
    /// Upper bound (inclusive) of the random event inter-arrival, in days.
    #[serde(default = "default_max_interval")]
    pub max_event_interval_days: i64,
    /// Days a broadcast memory survives.
    #[serde(default = "default_broadcast_expiry")]
    pub broadcast_expiry_days: i64,
    /// Initial parent/child relationship strength.
    #[serde(default = "default_birth_strength")]
    pub birth_relationship_strength: f32,
    /// Per-household daily chance that an eligible household has a child.
    #[serde(default = "default_birth_chance")]
    pub birth_chance: f64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            birth_cooldown_days: default_birth_cooldown_days(),
            recent_births_cap: default_recent_births(),
            min_event_interval_days: default_min_interval(),
            max_event_interval_days: default_max_interval(),
            broadcast_expiry_days: default_broadcast_expiry(),
            birth_relationship_strength: default_birth_strength(),
            birth_chance: default_birth_chance(),
        }
    }
}

/// Conversation engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Render-space distance at which two commuters start talking.
    #[serde(default = "default_proximity")]
    pub proximity_threshold: f32,
    /// Maximum turns, including the opening line.
    #[serde(default = "default_turn_cap")]
    pub turn_cap: usize,
    /// Average length of the last turns below which a conversation winds down.
    #[serde(default = "default_short_chars")]
    pub short_message_chars: usize,
    /// Pause between turns on the worker thread.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    /// Wall-clock seconds an ended conversation is kept for reporting.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// Size of the conversation worker pool.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Relationship increment applied to every participant pair.
    #[serde(default = "default_strength_increment")]
    pub strength_increment: f32,
    /// Seconds between background sweeps of ended conversations.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            proximity_threshold: default_proximity(),
            turn_cap: default_turn_cap(),
            short_message_chars: default_short_chars(),
            pacing_ms: default_pacing_ms(),
            retention_secs: default_retention_secs(),
            max_workers: default_max_workers(),
            strength_increment: default_strength_increment(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// LLM narrator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider: "none", "ollama", or "openai".
    #[serde(default = "default_provider")]
    pub provider: String,
    /// API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the API key (OpenAI-compatible only).
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Hard timeout for one call, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries inside the HTTP client before a call counts as failed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Directory of TOML prompt files that replace the built-in templates
    /// of the same name.
    #[serde(default)]
    pub prompts_dir: Option<PathBuf>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: None,
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            prompts_dir: None,
        }
    }
}

/// Persona snapshot and event log storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database path. `None` keeps everything in memory only.
    #[serde(default)]
    pub path: Option<String>,
    /// Optional JSON persona seed file used when the database is empty.
    #[serde(default)]
    pub seed_file: Option<String>,
    /// Enable SQLite WAL mode.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Verify persona checksums when loading.
    #[serde(default = "default_true")]
    pub verify_checksums: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            path: None,
            seed_file: None,
            wal_mode: true,
            verify_checksums: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_seed() -> u64 { 42 }
fn default_minutes_per_second() -> f64 { 720.0 }
fn default_start_date() -> NaiveDate { NaiveDate::from_ymd_opt(2026, 1, 1).unwrap_or_default() }
fn default_start_minutes() -> u32 { 8 * 60 }
fn default_width() -> i32 { 42 }
fn default_height() -> i32 { 32 }
fn default_tile_size() -> f32 { 32.0 }
fn default_target_population() -> usize { 150 }
fn default_residential_capacity() -> usize { 6 }
fn default_elder_chance() -> f64 { 0.15 }
fn default_child_chance() -> f64 { 0.35 }
fn default_child_vs_teen() -> f64 { 0.6 }
fn default_birth_cooldown_days() -> i64 { 120 }
fn default_recent_births() -> usize { 20 }
fn default_min_interval() -> i64 { 2 }
fn default_max_interval() -> i64 { 7 }
fn default_broadcast_expiry() -> i64 { 7 }
fn default_birth_strength() -> f32 { 0.8 }
fn default_birth_chance() -> f64 { 1.0 }
fn default_proximity() -> f32 { 24.0 }
fn default_turn_cap() -> usize { 6 }
fn default_short_chars() -> usize { 24 }
fn default_pacing_ms() -> u64 { 400 }
fn default_retention_secs() -> u64 { 600 }
fn default_max_workers() -> usize { 4 }
fn default_strength_increment() -> f32 { 0.05 }
fn default_sweep_interval() -> u64 { 30 }
fn default_provider() -> String { "none".to_string() }
fn default_base_url() -> String { "http://localhost:11434".to_string() }
fn default_model() -> String { "qwen2.5:1.5b".to_string() }
fn default_timeout_ms() -> u64 { 8_000 }
fn default_max_retries() -> u32 { 1 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = CivicConfig::from_toml("").expect("empty config parses");
        assert_eq!(config.population.residential_capacity, 6);
        assert_eq!(config.events.birth_cooldown_days, 120);
        assert_eq!(config.conversation.turn_cap, 6);
        assert_eq!(config.clock.start_minutes, 480);
        assert_eq!(config.llm.provider, "none");
        assert!(config.llm.prompts_dir.is_none());
    }

    #[test]
    fn partial_sections_override_only_named_fields() {
        let config = CivicConfig::from_toml(
            r#"
            [clock]
            minutes_per_second = 30.0
            start_date = "2027-03-05"

            [conversation]
            pacing_ms = 0

            [llm]
            prompts_dir = "prompts"
            "#,
        )
        .expect("partial config parses");
        assert!((config.clock.minutes_per_second - 30.0).abs() < f64::EPSILON);
        assert_eq!(config.clock.start_date, NaiveDate::from_ymd_opt(2027, 3, 5).expect("valid"));
        assert_eq!(config.conversation.pacing_ms, 0);
        assert_eq!(config.conversation.max_workers, 4);
        assert_eq!(config.llm.prompts_dir.as_deref(), Some(std::path::Path::new("prompts")));
        assert_eq!(config.llm.timeout_ms, 8_000);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = CivicConfig::from_toml("[clock\nbroken").expect_err("must fail");
        assert!(matches!(err, CivicError::Config(_)));
    }
}
