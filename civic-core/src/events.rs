//! Births and random city events.
//!
//! The engine runs at most once per simulated calendar date. Births are
//! processed in three phases so that the narrator, which may block on a
//! language model, is never called while the city lock is held:
//!
//! 1. **plan** under the lock: find eligible households and build requests,
//! 2. **narrate** unlocked: ask the narrator for a persona per plan,
//! 3. **apply** under the lock: re-check eligibility and register the child.
//!
//! Random events follow a uniform 2–7 day inter-arrival and are always
//! rescheduled, whether or not the narrator produced a log.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::citizen::{CitizenId, HouseholdId};
use crate::config::EventsConfig;
use crate::memory::{MemoryRecord, Severity};
use crate::narrator::{ChildPersonaRequest, CityEventPayload, Narrator, ParentProfile};
use crate::population::CityState;

/// Kind of an event log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A child was born.
    Birth,
    /// Theft.
    Theft,
    /// Fire.
    Fire,
    /// Fair.
    Fair,
    /// Festival.
    Festival,
    /// Traffic accident.
    Accident,
    /// Protest.
    Protest,
    /// Celebration.
    Celebration,
}

impl EventKind {
    /// The random-event catalogue.
    pub const RANDOM: [Self; 7] = [
        Self::Theft,
        Self::Fire,
        Self::Fair,
        Self::Festival,
        Self::Accident,
        Self::Protest,
        Self::Celebration,
    ];

    /// Fixed severity of the kind.
    #[must_use]
    pub fn severity(self) -> Severity {
        match self {
            Self::Fire => Severity::High,
            Self::Birth | Self::Theft | Self::Accident | Self::Protest => Severity::Medium,
            Self::Fair | Self::Festival | Self::Celebration => Severity::Low,
        }
    }

    /// Lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Birth => "birth",
            Self::Theft => "theft",
            Self::Fire => "fire",
            Self::Fair => "fair",
            Self::Festival => "festival",
            Self::Accident => "accident",
            Self::Protest => "protest",
            Self::Celebration => "celebration",
        }
    }

    fn describe(self, district: char) -> String {
        match self {
            Self::Birth => format!("A child was born in district {district}"),
            Self::Theft => format!("A string of thefts was reported in district {district}"),
            Self::Fire => format!("A fire broke out in district {district}"),
            Self::Fair => format!("A street fair opened in district {district}"),
            Self::Festival => format!("A music festival filled the squares of district {district}"),
            Self::Accident => format!("A traffic accident blocked the roads of district {district}"),
            Self::Protest => format!("Residents of district {district} marched in protest"),
            Self::Celebration => format!("District {district} held a neighbourhood celebration"),
        }
    }
}

/// An append-only event log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityEvent {
    /// Simulated date.
    pub date: NaiveDate,
    /// Kind.
    pub kind: EventKind,
    /// Plain description given to the narrator.
    pub description: String,
    /// Severity.
    pub severity: Severity,
    /// Narrator summary.
    pub summary: String,
    /// Narrator log entry.
    pub narrative: String,
}

/// A birth selected in the planning phase.
#[derive(Debug, Clone)]
pub struct BirthPlan {
    /// Household expecting a child.
    pub household: HouseholdId,
    /// Request handed to the narrator.
    pub request: ChildPersonaRequest,
}

/// What one daily run changed.
#[derive(Debug, Clone, Default)]
pub struct DailyOutcome {
    /// Newborn citizens.
    pub births: Vec<CitizenId>,
    /// The random event that was broadcast, if any.
    pub broadcast: Option<CityEvent>,
    /// New event log entries (the broadcast event and birth chronicles).
    pub logged: Vec<CityEvent>,
}

impl DailyOutcome {
    /// Whether citizen state changed and the persona snapshot needs a flush.
    #[must_use]
    pub fn changed_citizens(&self) -> bool {
        !self.births.is_empty() || self.broadcast.is_some()
    }
}

/// Once-per-day birth and random-event driver.
#[derive(Debug)]
pub struct EventEngine {
    config: EventsConfig,
    rng: StdRng,
    last_run: Option<NaiveDate>,
    next_event: Option<NaiveDate>,
    log: Vec<CityEvent>,
}

impl EventEngine {
    /// Create an engine seeded for reproducible runs.
    #[must_use]
    pub fn new(config: EventsConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed ^ 0x0EEE_E000),
            last_run: None,
            next_event: None,
            log: Vec::new(),
        }
    }

    /// Seed the in-memory log with entries loaded from storage.
    pub fn restore_log(&mut self, entries: Vec<CityEvent>) {
        self.log = entries;
    }

    /// Whether the daily checks still have to run for `date`.
    #[must_use]
    pub fn is_due(&self, date: NaiveDate) -> bool {
        self.last_run != Some(date)
    }

    /// Date of the next scheduled random event.
    #[must_use]
    pub fn next_event_date(&self) -> Option<NaiveDate> {
        self.next_event
    }

    /// Event log, oldest first.
    #[must_use]
    pub fn log(&self) -> &[CityEvent] {
        &self.log
    }

    /// Run the daily checks for `now`'s date; a no-op if they already ran.
    pub fn run_daily(&mut self, city: &Mutex<CityState>, narrator: &dyn Narrator, now: NaiveDateTime) -> DailyOutcome {
        let date = now.date();
        if !self.is_due(date) {
            return DailyOutcome::default();
        }
        self.last_run = Some(date);

        let mut outcome = DailyOutcome::default();
        let plans = self.plan_births(&city.lock(), date);
        if !plans.is_empty() {
            self.run_births(city, narrator, plans, now, &mut outcome);
        }
        self.run_random_event(city, narrator, now, &mut outcome);
        outcome
    }

    /// Phase 1: pick eligible households and build persona requests.
    pub fn plan_births(&mut self, state: &CityState, date: NaiveDate) -> Vec<BirthPlan> {
        let chance = self.config.birth_chance.clamp(0.0, 1.0);
        let recent_events = state.recent_births();
        let mut plans = Vec::new();

        for household in state.households() {
            let (father, mother) = match state.check_birth(household.id, date, self.config.birth_cooldown_days) {
                Ok(parents) => parents,
                Err(err) => {
                    debug!(household = %household.id, %err, "No birth today");
                    continue;
                }
            };
            if !self.rng.gen_bool(chance) {
                continue;
            }
            let parents = [father, mother]
                .iter()
                .filter_map(|id| state.citizen(*id))
                .map(ParentProfile::from)
                .collect();
            plans.push(BirthPlan {
                household: household.id,
                request: ChildPersonaRequest {
                    date,
                    household_address: household.address.clone(),
                    parents,
                    recent_events: recent_events.clone(),
                },
            });
        }
        plans
    }

    fn run_births(
        &mut self,
        city: &Mutex<CityState>,
        narrator: &dyn Narrator,
        plans: Vec<BirthPlan>,
        now: NaiveDateTime,
        outcome: &mut DailyOutcome,
    ) {
        // Phase 2: narrate without holding the lock.
        let narrated: Vec<_> = plans
            .into_iter()
            .map(|plan| {
                let persona = narrator.generate_child_persona(&plan.request);
                (plan, persona)
            })
            .collect();

        // Phase 3: apply with re-validation.
        let mut born = Vec::new();
        {
            let mut state = city.lock();
            for (plan, persona) in narrated {
                match state.register_birth(plan.household, &persona, now, &self.config) {
                    Ok(child) => born.push((child, plan, persona)),
                    Err(err) => warn!(household = %plan.household, %err, "Birth skipped"),
                }
            }
        }

        for (child, plan, persona) in born {
            outcome.births.push(child);
            let payload = CityEventPayload {
                date: now.date(),
                kind: EventKind::Birth.as_str().to_string(),
                severity: EventKind::Birth.severity(),
                description: persona.summary.clone(),
                location: Some(plan.request.household_address.clone()),
            };
            if let Some(log) = narrator.record_city_event(&payload) {
                let entry = CityEvent {
                    date: now.date(),
                    kind: EventKind::Birth,
                    description: payload.description,
                    severity: payload.severity,
                    summary: log.summary,
                    narrative: log.log_entry,
                };
                info!(summary = %entry.summary, "Birth chronicled");
                self.log.push(entry.clone());
                outcome.logged.push(entry);
            }
        }
    }

    fn run_random_event(
        &mut self,
        city: &Mutex<CityState>,
        narrator: &dyn Narrator,
        now: NaiveDateTime,
        outcome: &mut DailyOutcome,
    ) {
        let date = now.date();
        let Some(scheduled) = self.next_event else {
            self.schedule_next(date);
            return;
        };
        if date < scheduled {
            return;
        }
        self.schedule_next(date);

        let kind = EventKind::RANDOM[self.rng.gen_range(0..EventKind::RANDOM.len())];
        let district = char::from(b'A' + self.rng.gen_range(0..6u8));
        let payload = CityEventPayload {
            date,
            kind: kind.as_str().to_string(),
            severity: kind.severity(),
            description: kind.describe(district),
            location: Some(format!("District {district}")),
        };

        let Some(log) = narrator.record_city_event(&payload) else {
            debug!(kind = kind.as_str(), "City event not narrated; nothing broadcast");
            return;
        };

        let memory = MemoryRecord::durable(
            now,
            log.summary.clone(),
            payload.severity,
            &["city_event", kind.as_str()],
        )
        .expiring_on(date + Duration::days(self.config.broadcast_expiry_days));
        city.lock().broadcast(&memory);

        let entry = CityEvent {
            date,
            kind,
            description: payload.description,
            severity: payload.severity,
            summary: log.summary,
            narrative: log.log_entry,
        };
        info!(kind = kind.as_str(), summary = %entry.summary, "City event broadcast");
        self.log.push(entry.clone());
        outcome.logged.push(entry.clone());
        outcome.broadcast = Some(entry);
    }

    fn schedule_next(&mut self, from: NaiveDate) {
        let min = self.config.min_event_interval_days.max(1);
        let max = self.config.max_event_interval_days.max(min);
        let next = from + Duration::days(self.rng.gen_range(min..=max));
        debug!(%next, "Next city event scheduled");
        self.next_event = Some(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PopulationConfig;
    use crate::grid::CityGrid;
    use crate::narrator::{CityLog, FallbackNarrator, Persona, fallback_child_persona};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Narrator that always chronicles and counts persona calls.
    #[derive(Default)]
    struct Chronicler {
        personas: AtomicUsize,
    }

    impl Narrator for Chronicler {
        fn generate_child_persona(&self, request: &ChildPersonaRequest) -> Persona {
            self.personas.fetch_add(1, Ordering::SeqCst);
            fallback_child_persona(request)
        }
        fn record_city_event(&self, payload: &CityEventPayload) -> Option<CityLog> {
            Some(CityLog {
                summary: format!("[{}] {}", payload.kind, payload.description),
                log_entry: payload.description.clone(),
            })
        }
        fn generate_response(&self, _prompt: &str) -> Option<String> {
            None
        }
        fn is_available(&self) -> bool {
            true
        }
        fn name(&self) -> &'static str {
            "chronicler"
        }
    }

    fn city() -> Mutex<CityState> {
        let grid = Arc::new(CityGrid::generate(42, 32));
        let mut rng = StdRng::seed_from_u64(11);
        Mutex::new(CityState::bootstrap(grid, &PopulationConfig::default(), &mut rng))
    }

    fn at(date: NaiveDate) -> NaiveDateTime {
        date.and_hms_opt(8, 0, 0).expect("valid time")
    }

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 1).expect("valid date")
    }

    #[test]
    fn runs_once_per_date() {
        let city = city();
        let narrator = Chronicler::default();
        let mut engine = EventEngine::new(EventsConfig::default(), 1);

        let first = engine.run_daily(&city, &narrator, at(start()));
        let calls = narrator.personas.load(Ordering::SeqCst);
        assert_eq!(calls, first.births.len());

        let again = engine.run_daily(&city, &narrator, at(start()) + Duration::hours(5));
        assert!(again.births.is_empty());
        assert!(again.logged.is_empty());
        assert_eq!(narrator.personas.load(Ordering::SeqCst), calls);
    }

    #[test]
    fn random_events_arrive_within_interval_and_broadcast() {
        let city = city();
        let narrator = Chronicler::default();
        let mut engine = EventEngine::new(EventsConfig::default(), 5);

        engine.run_daily(&city, &narrator, at(start()));
        let scheduled = engine.next_event_date().expect("first event scheduled");
        let gap = (scheduled - start()).num_days();
        assert!((2..=7).contains(&gap));

        let outcome = engine.run_daily(&city, &narrator, at(scheduled));
        let event = outcome.broadcast.expect("event broadcast");
        assert_ne!(event.kind, EventKind::Birth);
        let next = engine.next_event_date().expect("rescheduled");
        assert!(next > scheduled);

        let state = city.lock();
        for citizen in state.citizens() {
            let memory = citizen
                .memories
                .iter()
                .find(|m| m.has_tag("city_event"))
                .expect("broadcast reached everyone");
            assert_eq!(memory.expires_on, Some(scheduled + Duration::days(7)));
        }
    }

    #[test]
    fn silent_narrator_still_reschedules() {
        let city = city();
        let mut engine = EventEngine::new(EventsConfig::default(), 9);
        engine.run_daily(&city, &FallbackNarrator, at(start()));
        let scheduled = engine.next_event_date().expect("scheduled");

        let outcome = engine.run_daily(&city, &FallbackNarrator, at(scheduled));
        assert!(outcome.broadcast.is_none());
        assert!(engine.next_event_date().expect("rescheduled") > scheduled);
        assert!(engine.log().iter().all(|e| e.kind == EventKind::Birth));
    }

    #[test]
    fn births_are_chronicled_but_not_broadcast() {
        let city = city();
        let narrator = Chronicler::default();
        let mut engine = EventEngine::new(EventsConfig::default(), 2);
        let outcome = engine.run_daily(&city, &narrator, at(start()));
        let births = outcome.logged.iter().filter(|e| e.kind == EventKind::Birth).count();
        assert_eq!(births, outcome.births.len());
        let state = city.lock();
        assert!(state
            .citizens()
            .all(|c| c.memories.iter().all(|m| !m.has_tag("city_event"))));
    }

    #[test]
    fn zero_birth_chance_plans_nothing() {
        let city = city();
        let config = EventsConfig {
            birth_chance: 0.0,
            ..EventsConfig::default()
        };
        let mut engine = EventEngine::new(config, 3);
        let plans = engine.plan_births(&city.lock(), start());
        assert!(plans.is_empty());
    }
}
