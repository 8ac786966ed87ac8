//! Citizen memory records and expiry.
//!
//! A memory is a short summary of something the citizen lived through or
//! heard about. Broadcast city events carry an expiry date; births and
//! conversations do not.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// How much an occurrence mattered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Everyday happenings.
    Low,
    /// Noticeable disruptions.
    Medium,
    /// City-shaking events.
    High,
}

impl Severity {
    /// Lowercase label used in logs and reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// One remembered occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// When it happened (simulated time).
    pub timestamp: NaiveDateTime,
    /// One-line summary.
    pub summary: String,
    /// How much it mattered.
    pub severity: Severity,
    /// Free-form tags (`"birth"`, `"city_event"`, `"conversation"`, …).
    #[serde(default)]
    pub tags: Vec<String>,
    /// Last date on which the memory is still held. `None` never expires.
    #[serde(default)]
    pub expires_on: Option<NaiveDate>,
}

impl MemoryRecord {
    /// Create a non-expiring memory.
    #[must_use]
    pub fn durable(timestamp: NaiveDateTime, summary: impl Into<String>, severity: Severity, tags: &[&str]) -> Self {
        Self {
            timestamp,
            summary: summary.into(),
            severity,
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
            expires_on: None,
        }
    }

    /// Builder: set an expiry date.
    #[must_use]
    pub fn expiring_on(mut self, date: NaiveDate) -> Self {
        self.expires_on = Some(date);
        self
    }

    /// Expired once `today` is strictly past the expiry date.
    #[must_use]
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expires_on.is_some_and(|expiry| expiry < today)
    }

    /// Whether the memory carries `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Remove every expired memory, returning how many were dropped.
pub fn prune_expired(memories: &mut Vec<MemoryRecord>, today: NaiveDate) -> usize {
    let before = memories.len();
    memories.retain(|m| !m.is_expired(today));
    before - memories.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).expect("valid date")
    }

    fn at(d: u32) -> NaiveDateTime {
        day(d).and_hms_opt(9, 0, 0).expect("valid time")
    }

    #[test]
    fn expiry_is_strict() {
        let memory = MemoryRecord::durable(at(1), "Fair downtown", Severity::Low, &["city_event"])
            .expiring_on(day(8));
        assert!(!memory.is_expired(day(7)));
        assert!(!memory.is_expired(day(8)));
        assert!(memory.is_expired(day(9)));
    }

    #[test]
    fn prune_keeps_durable_memories() {
        let mut memories = vec![
            MemoryRecord::durable(at(1), "Born", Severity::High, &["birth"]),
            MemoryRecord::durable(at(1), "Fire", Severity::High, &["city_event"]).expiring_on(day(3)),
            MemoryRecord::durable(at(2), "Fair", Severity::Low, &["city_event"]).expiring_on(day(10)),
        ];
        let removed = prune_expired(&mut memories, day(4));
        assert_eq!(removed, 1);
        assert_eq!(memories.len(), 2);
        assert!(memories.iter().all(|m| m.summary != "Fire"));
        assert!(memories[0].has_tag("birth"));
    }
}
