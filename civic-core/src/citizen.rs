//! Citizen and household data model.
//!
//! Citizens are never deleted and never age: the age group assigned at
//! creation is permanent.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::grid::TilePos;
use crate::memory::MemoryRecord;
use crate::schedule::DailySchedule;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Citizen identifier. Assigned from a monotonic counter, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CitizenId(pub u64);

impl fmt::Display for CitizenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Household identifier, from a counter disjoint from citizen ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HouseholdId(pub u64);

impl fmt::Display for HouseholdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Demographics
// ---------------------------------------------------------------------------

/// Citizen gender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    /// Male.
    Male,
    /// Female.
    Female,
}

impl Gender {
    /// Lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }

    /// Lenient parse used for narrator output.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "male" | "m" | "boy" => Some(Self::Male),
            "female" | "f" | "girl" => Some(Self::Female),
            _ => None,
        }
    }

    /// The other gender.
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::Male => Self::Female,
            Self::Female => Self::Male,
        }
    }
}

/// Fixed age bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeGroup {
    /// Child.
    Child,
    /// Teenager.
    Teen,
    /// Working-age adult.
    Adult,
    /// Elder (retired).
    Elder,
}

impl AgeGroup {
    /// Lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Child => "child",
            Self::Teen => "teen",
            Self::Adult => "adult",
            Self::Elder => "elder",
        }
    }

    /// Lenient parse used for narrator output.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "child" | "baby" | "newborn" | "infant" => Some(Self::Child),
            "teen" | "teenager" => Some(Self::Teen),
            "adult" => Some(Self::Adult),
            "elder" | "senior" => Some(Self::Elder),
            _ => None,
        }
    }
}

/// Employment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentStatus {
    /// Attends (or is due to attend) school.
    Student,
    /// Holds a job slot.
    Employed,
    /// Eligible but no slot was available.
    Unemployed,
    /// Elder.
    Retired,
}

impl EmploymentStatus {
    /// Lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Employed => "employed",
            Self::Unemployed => "unemployed",
            Self::Retired => "retired",
        }
    }

    /// All statuses in reporting order.
    pub const ALL: [Self; 4] = [Self::Student, Self::Employed, Self::Unemployed, Self::Retired];
}

/// Job category, which also selects the default schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profession {
    /// Office worker.
    Office,
    /// Shop worker.
    Retail,
    /// Factory worker.
    Industrial,
    /// Service worker.
    Service,
    /// Pupil.
    Student,
    /// No profession.
    None,
}

impl Profession {
    /// Lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Office => "office",
            Self::Retail => "retail",
            Self::Industrial => "industrial",
            Self::Service => "service",
            Self::Student => "student",
            Self::None => "none",
        }
    }
}

// ---------------------------------------------------------------------------
// Relationships
// ---------------------------------------------------------------------------

/// How two citizens know each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    /// The other citizen is this citizen's parent.
    Parent,
    /// The other citizen is this citizen's child.
    Child,
    /// Met in passing.
    Acquaintance,
}

/// A directed relationship record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// The other citizen.
    pub other: CitizenId,
    /// Relationship type.
    pub kind: RelationshipKind,
    /// Bond strength in `[0.0, 1.0]`.
    pub strength: f32,
}

impl Relationship {
    /// Create a relationship, clamping `strength` into range.
    #[must_use]
    pub fn new(other: CitizenId, kind: RelationshipKind, strength: f32) -> Self {
        Self {
            other,
            kind,
            strength: strength.clamp(0.0, 1.0),
        }
    }

    /// Increase strength by `delta`, capped at 1.0.
    pub fn strengthen(&mut self, delta: f32) {
        self.strength = (self.strength + delta).clamp(0.0, 1.0);
    }
}

// ---------------------------------------------------------------------------
// Citizen & Household
// ---------------------------------------------------------------------------

/// A simulated resident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citizen {
    /// Unique id.
    pub id: CitizenId,
    /// Display name.
    pub name: String,
    /// Gender.
    pub gender: Gender,
    /// Fixed age bracket.
    pub age_group: AgeGroup,
    /// Employment status.
    pub employment: EmploymentStatus,
    /// Profession.
    pub profession: Profession,
    /// Owning household.
    pub household: HouseholdId,
    /// Residential tile.
    pub home_tile: TilePos,
    /// Household address, e.g. `B-004`.
    pub address: String,
    /// Assigned job or school tile.
    #[serde(default)]
    pub job_tile: Option<TilePos>,
    /// Daily routine, absent for citizens without one.
    #[serde(default)]
    pub schedule: Option<DailySchedule>,
    /// Short temperament description.
    #[serde(default)]
    pub temperament: String,
    /// Value tags.
    #[serde(default)]
    pub values: Vec<String>,
    /// Relationships to other citizens.
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    /// Memories, oldest first.
    #[serde(default)]
    pub memories: Vec<MemoryRecord>,
    /// Free-form traits (e.g. the narrator's persona summary).
    #[serde(default)]
    pub traits: BTreeMap<String, String>,
}

impl Citizen {
    /// Only working-age adults count as prospective parents.
    #[must_use]
    pub fn is_adult(&self) -> bool {
        self.age_group == AgeGroup::Adult
    }

    /// Relationship towards `other`, if any.
    #[must_use]
    pub fn relationship_with(&self, other: CitizenId) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.other == other)
    }

    /// Strengthen the bond with `other`, creating an acquaintance if absent.
    pub fn strengthen_bond(&mut self, other: CitizenId, delta: f32) {
        if let Some(existing) = self.relationships.iter_mut().find(|r| r.other == other) {
            existing.strengthen(delta);
        } else {
            self.relationships
                .push(Relationship::new(other, RelationshipKind::Acquaintance, delta));
        }
    }
}

/// A group of citizens sharing a home tile and address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Household {
    /// Unique id.
    pub id: HouseholdId,
    /// Residential tile.
    pub home_tile: TilePos,
    /// Members in insertion order.
    pub members: Vec<CitizenId>,
    /// Address, unique per zone letter and sequence number.
    pub address: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn citizen() -> Citizen {
        Citizen {
            id: CitizenId(1),
            name: "Ava Moreau".into(),
            gender: Gender::Female,
            age_group: AgeGroup::Adult,
            employment: EmploymentStatus::Unemployed,
            profession: Profession::None,
            household: HouseholdId(1),
            home_tile: TilePos::new(3, 4),
            address: "A-000".into(),
            job_tile: None,
            schedule: None,
            temperament: String::new(),
            values: Vec::new(),
            relationships: Vec::new(),
            memories: Vec::new(),
            traits: BTreeMap::new(),
        }
    }

    #[test]
    fn strengthen_caps_at_one() {
        let mut rel = Relationship::new(CitizenId(2), RelationshipKind::Parent, 0.98);
        rel.strengthen(0.05);
        assert!((rel.strength - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn strengthen_bond_creates_acquaintance_once() {
        let mut c = citizen();
        c.strengthen_bond(CitizenId(9), 0.05);
        c.strengthen_bond(CitizenId(9), 0.05);
        assert_eq!(c.relationships.len(), 1);
        let rel = c.relationship_with(CitizenId(9)).expect("bond exists");
        assert_eq!(rel.kind, RelationshipKind::Acquaintance);
        assert!((rel.strength - 0.10).abs() < 1e-6);
    }

    #[test]
    fn enums_serialise_snake_case() {
        let json = serde_json::to_string(&EmploymentStatus::Unemployed).expect("serialise");
        assert_eq!(json, "\"unemployed\"");
        assert_eq!(AgeGroup::parse("Newborn"), Some(AgeGroup::Child));
        assert_eq!(Gender::parse(" FEMALE "), Some(Gender::Female));
    }
}
