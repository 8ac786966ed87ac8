//! The narrator boundary: persona generation, event chronicling and dialogue.
//!
//! The simulation depends only on the [`Narrator`] trait. A language-model
//! backed implementation lives in the integration crate; the deterministic
//! [`FallbackNarrator`] here is what runs when no model is configured, and
//! is what every model-backed implementation falls back to on failure.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::citizen::{AgeGroup, Citizen, CitizenId, Gender};
use crate::memory::Severity;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Parent details handed to the narrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentProfile {
    /// Citizen id.
    pub id: CitizenId,
    /// Full name.
    pub name: String,
    /// Gender.
    pub gender: Gender,
    /// Age group.
    pub age_group: AgeGroup,
    /// Temperament text.
    pub temperament: String,
    /// Value tags.
    pub values: Vec<String>,
}

impl From<&Citizen> for ParentProfile {
    fn from(citizen: &Citizen) -> Self {
        Self {
            id: citizen.id,
            name: citizen.name.clone(),
            gender: citizen.gender,
            age_group: citizen.age_group,
            temperament: citizen.temperament.clone(),
            values: citizen.values.clone(),
        }
    }
}

/// Everything the narrator gets to invent a newborn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildPersonaRequest {
    /// Date of birth.
    pub date: NaiveDate,
    /// Household address.
    pub household_address: String,
    /// The two parents, father first.
    pub parents: Vec<ParentProfile>,
    /// Recent birth narratives for context.
    pub recent_events: Vec<String>,
}

/// A generated persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    /// Given name.
    pub name: String,
    /// Gender.
    pub gender: Gender,
    /// Age group; newborns are children or teens.
    pub age_group: AgeGroup,
    /// Temperament text.
    pub temperament: String,
    /// Value tags.
    pub values: Vec<String>,
    /// One-sentence narrative summary.
    pub summary: String,
}

impl Persona {
    /// Check that the persona can be turned into a citizen.
    ///
    /// # Errors
    /// Returns a description of the first structural problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("persona has an empty name".into());
        }
        if !matches!(self.age_group, AgeGroup::Child | AgeGroup::Teen) {
            return Err(format!("newborn cannot be {}", self.age_group.as_str()));
        }
        if self.summary.trim().is_empty() {
            return Err("persona has an empty summary".into());
        }
        Ok(())
    }
}

/// A city occurrence offered to the chronicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityEventPayload {
    /// Simulated date.
    pub date: NaiveDate,
    /// Event kind label (`fire`, `birth`, …).
    pub kind: String,
    /// Severity.
    pub severity: Severity,
    /// Plain description of what happened.
    pub description: String,
    /// Household address or district, when relevant.
    #[serde(default)]
    pub location: Option<String>,
}

/// A narrated chronicle entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityLog {
    /// Short summary, used as the broadcast memory text.
    pub summary: String,
    /// Longer log entry for the event log.
    pub log_entry: String,
}

// ---------------------------------------------------------------------------
// Boundary trait
// ---------------------------------------------------------------------------

/// External capability for persona, chronicle and dialogue generation.
///
/// Implementations are called from the tick thread (births, city events)
/// and from conversation workers (dialogue), so they must be `Send + Sync`
/// and must bound their own latency.
pub trait Narrator: Send + Sync {
    /// Invent a newborn. Never fails: on any problem an implementation
    /// returns [`fallback_child_persona`].
    fn generate_child_persona(&self, request: &ChildPersonaRequest) -> Persona;

    /// Narrate a city occurrence. `None` means "do not broadcast or log".
    fn record_city_event(&self, payload: &CityEventPayload) -> Option<CityLog>;

    /// Produce one line of dialogue. `None` selects a static fallback line.
    fn generate_response(&self, prompt: &str) -> Option<String>;

    /// Whether a real backend is configured and reachable.
    fn is_available(&self) -> bool;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Deterministic narrator used when no language model is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackNarrator;

impl Narrator for FallbackNarrator {
    fn generate_child_persona(&self, request: &ChildPersonaRequest) -> Persona {
        fallback_child_persona(request)
    }

    fn record_city_event(&self, _payload: &CityEventPayload) -> Option<CityLog> {
        None
    }

    fn generate_response(&self, _prompt: &str) -> Option<String> {
        None
    }

    fn is_available(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "fallback"
    }
}

const CHILD_NAMES: [&str; 8] = ["Aiden", "Noah", "Lia", "Riya", "Finn", "Zoey", "Milo", "Anya"];

/// Temperament given to every deterministic newborn.
pub const FALLBACK_TEMPERAMENT: &str = "Inquisitive child blending parental traits";

/// Build the deterministic newborn persona from the parents.
#[must_use]
pub fn fallback_child_persona(request: &ChildPersonaRequest) -> Persona {
    let first = request.parents.first();
    let second = request.parents.get(1);

    let initial = first
        .and_then(|p| p.name.chars().next())
        .map(|c| c.to_lowercase().to_string());
    let name = initial
        .and_then(|i| CHILD_NAMES.iter().find(|n| n.to_lowercase().starts_with(&i)))
        .unwrap_or(&CHILD_NAMES[0]);

    let mut values: Vec<String> = Vec::new();
    for value in request.parents.iter().flat_map(|p| p.values.iter()) {
        if values.len() == 3 {
            break;
        }
        if !values.contains(value) {
            values.push(value.clone());
        }
    }

    let parent_name = |p: Option<&ParentProfile>| p.map_or_else(|| "unknown".to_string(), |p| p.name.clone());

    Persona {
        name: (*name).to_string(),
        gender: first.map_or(Gender::Female, |p| p.gender),
        age_group: AgeGroup::Child,
        temperament: FALLBACK_TEMPERAMENT.to_string(),
        values,
        summary: format!(
            "Born on {} at {} to {} and {}.",
            request.date.format("%Y-%m-%d"),
            request.household_address,
            parent_name(first),
            parent_name(second),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent(id: u64, name: &str, gender: Gender, values: &[&str]) -> ParentProfile {
        ParentProfile {
            id: CitizenId(id),
            name: name.into(),
            gender,
            age_group: AgeGroup::Adult,
            temperament: "Calm".into(),
            values: values.iter().map(|v| (*v).to_string()).collect(),
        }
    }

    fn request() -> ChildPersonaRequest {
        ChildPersonaRequest {
            date: NaiveDate::from_ymd_opt(2026, 2, 14).expect("valid date"),
            household_address: "B-003".into(),
            parents: vec![
                parent(3, "Noah Alvarez", Gender::Male, &["family", "craft"]),
                parent(4, "Emma Alvarez", Gender::Female, &["craft", "curiosity", "honesty"]),
            ],
            recent_events: Vec::new(),
        }
    }

    #[test]
    fn fallback_names_both_parents() {
        let persona = FallbackNarrator.generate_child_persona(&request());
        assert_eq!(persona.age_group, AgeGroup::Child);
        assert!(persona.summary.contains("Noah Alvarez"));
        assert!(persona.summary.contains("Emma Alvarez"));
        assert!(persona.summary.contains("B-003"));
        assert!(persona.validate().is_ok());
    }

    #[test]
    fn fallback_picks_name_by_initial_and_merges_values() {
        let persona = fallback_child_persona(&request());
        assert_eq!(persona.name, "Noah");
        assert_eq!(persona.gender, Gender::Male);
        assert_eq!(persona.values, vec!["family", "craft", "curiosity"]);

        let mut other = request();
        other.parents[0].name = "Quinn Hale".into();
        assert_eq!(fallback_child_persona(&other).name, "Aiden");
    }

    #[test]
    fn fallback_boundary_is_silent_for_logs_and_dialogue() {
        let payload = CityEventPayload {
            date: NaiveDate::from_ymd_opt(2026, 1, 3).expect("valid date"),
            kind: "fire".into(),
            severity: Severity::High,
            description: "A fire broke out".into(),
            location: None,
        };
        assert!(FallbackNarrator.record_city_event(&payload).is_none());
        assert!(FallbackNarrator.generate_response("Hello").is_none());
        assert!(!FallbackNarrator.is_available());
    }

    #[test]
    fn validation_rejects_adult_newborns() {
        let mut persona = fallback_child_persona(&request());
        persona.age_group = AgeGroup::Adult;
        assert!(persona.validate().is_err());
        persona.age_group = AgeGroup::Teen;
        persona.name = "  ".into();
        assert!(persona.validate().is_err());
    }
}
