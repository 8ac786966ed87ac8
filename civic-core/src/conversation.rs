//! Proximity-triggered conversations between commuters.
//!
//! A conversation moves `Created → Active → Ended`. The tick thread only
//! detects proximity and submits one job per conversation to the
//! [`WorkerPool`]; the worker generates turns, paces them, and finally
//! applies the social outcome to the city through
//! [`CityState::apply_social_update`] under the city lock.
//!
//! The [`ConversationRegistry`] is the single owner of in-flight
//! conversations. It keeps the set of busy citizens, so a citizen can never
//! appear in two conversations that have not ended.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::citizen::CitizenId;
use crate::config::ConversationConfig;
use crate::error::Result;
use crate::narrator::Narrator;
use crate::persistence::SharedStore;
use crate::population::CityState;
use crate::worker::WorkerPool;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Unique conversation identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    /// Create a new random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    /// Registered, waiting for a worker.
    Created,
    /// A worker is generating turns.
    Active,
    /// Finished; kept until swept.
    Ended,
}

/// Why a conversation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationOutcome {
    /// Reached the turn cap.
    TurnCap,
    /// Recent turns grew too short.
    WoundDown,
    /// The worker failed.
    Failed,
}

/// One line of dialogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Who spoke.
    pub speaker: CitizenId,
    /// What was said.
    pub message: String,
    /// Wall-clock time of the line.
    pub at: DateTime<Utc>,
}

/// A conversation as seen by reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Id.
    pub id: ConversationId,
    /// Participants, ascending.
    pub participants: Vec<CitizenId>,
    /// Turns published so far.
    pub turns: Vec<Turn>,
    /// Lifecycle state.
    pub state: ConversationState,
    /// Set once ended.
    pub outcome: Option<ConversationOutcome>,
    /// Simulated time the participants met.
    pub started_at: NaiveDateTime,
    /// Wall-clock time of the last change.
    pub last_activity: DateTime<Utc>,
}

impl Conversation {
    /// Whether the conversation still holds its participants.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state != ConversationState::Ended
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Shared owner of every known conversation. Clones share state.
#[derive(Clone, Default)]
pub struct ConversationRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

#[derive(Default)]
struct RegistryInner {
    conversations: HashMap<ConversationId, Conversation>,
    busy: HashSet<CitizenId>,
}

impl ConversationRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically register a conversation between `a` and `b`.
    ///
    /// Returns `None` if either citizen is already busy or `a == b`.
    pub fn try_begin(&self, a: CitizenId, b: CitizenId, started_at: NaiveDateTime) -> Option<ConversationId> {
        if a == b {
            return None;
        }
        let mut inner = self.inner.lock();
        if inner.busy.contains(&a) || inner.busy.contains(&b) {
            return None;
        }
        inner.busy.insert(a);
        inner.busy.insert(b);

        let id = ConversationId::new();
        let mut participants = vec![a, b];
        participants.sort_unstable();
        inner.conversations.insert(
            id,
            Conversation {
                id,
                participants,
                turns: Vec::new(),
                state: ConversationState::Created,
                outcome: None,
                started_at,
                last_activity: Utc::now(),
            },
        );
        Some(id)
    }

    /// Move a created conversation to `Active`.
    pub fn mark_active(&self, id: ConversationId) {
        if let Some(c) = self.inner.lock().conversations.get_mut(&id) {
            if c.state == ConversationState::Created {
                c.state = ConversationState::Active;
                c.last_activity = Utc::now();
            }
        }
    }

    /// Publish a turn for reporting.
    pub fn record_turn(&self, id: ConversationId, turn: Turn) {
        if let Some(c) = self.inner.lock().conversations.get_mut(&id) {
            c.last_activity = turn.at;
            c.turns.push(turn);
        }
    }

    /// End a conversation and release its participants.
    ///
    /// Returns the final state, or `None` if it was already ended or unknown.
    pub fn finish(&self, id: ConversationId, outcome: ConversationOutcome) -> Option<Conversation> {
        let mut inner = self.inner.lock();
        let conversation = inner.conversations.get_mut(&id)?;
        if conversation.state == ConversationState::Ended {
            return None;
        }
        conversation.state = ConversationState::Ended;
        conversation.outcome = Some(outcome);
        conversation.last_activity = Utc::now();
        let snapshot = conversation.clone();
        for participant in &snapshot.participants {
            inner.busy.remove(participant);
        }
        Some(snapshot)
    }

    /// Remove ended conversations idle for longer than `retention`.
    pub fn sweep(&self, retention: Duration, now: DateTime<Utc>) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.conversations.len();
        inner
            .conversations
            .retain(|_, c| c.is_open() || now - c.last_activity <= retention);
        before - inner.conversations.len()
    }

    /// Whether `citizen` is in an open conversation.
    #[must_use]
    pub fn is_busy(&self, citizen: CitizenId) -> bool {
        self.inner.lock().busy.contains(&citizen)
    }

    /// Copy of one conversation.
    #[must_use]
    pub fn get(&self, id: ConversationId) -> Option<Conversation> {
        self.inner.lock().conversations.get(&id).cloned()
    }

    /// Copies of every known conversation, most recent activity first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Conversation> {
        let mut all: Vec<_> = self.inner.lock().conversations.values().cloned().collect();
        all.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        all
    }

    /// Number of conversations not yet ended.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.inner.lock().conversations.values().filter(|c| c.is_open()).count()
    }

    /// Number of conversations held, ended ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().conversations.len()
    }

    /// Whether the registry holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ConversationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ConversationRegistry")
            .field("conversations", &inner.conversations.len())
            .field("busy", &inner.busy.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Everything a worker needs, cloned into each job.
#[derive(Clone)]
struct WorkerContext {
    config: ConversationConfig,
    registry: ConversationRegistry,
    city: Arc<Mutex<CityState>>,
    narrator: Arc<dyn Narrator>,
    store: Option<SharedStore>,
}

/// Detects proximity and runs conversations on the worker pool.
pub struct ConversationEngine {
    context: WorkerContext,
    pool: WorkerPool,
}

impl ConversationEngine {
    /// Start the engine, its worker pool and the background sweep.
    ///
    /// # Errors
    /// Returns `CivicError::WorkerPool` if the pool cannot start.
    pub fn new(
        config: ConversationConfig,
        city: Arc<Mutex<CityState>>,
        narrator: Arc<dyn Narrator>,
        store: Option<SharedStore>,
    ) -> Result<Self> {
        let pool = WorkerPool::new(config.max_workers)?;
        let registry = ConversationRegistry::new();

        let sweeper = registry.clone();
        let retention = Duration::seconds(i64::try_from(config.retention_secs).unwrap_or(i64::MAX));
        let every = StdDuration::from_secs(config.sweep_interval_secs.max(1));
        pool.spawn_background(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let removed = sweeper.sweep(retention, Utc::now());
                if removed > 0 {
                    debug!(removed, "Swept ended conversations");
                }
            }
        });

        Ok(Self {
            context: WorkerContext {
                config,
                registry,
                city,
                narrator,
                store,
            },
            pool,
        })
    }

    /// The shared registry.
    #[must_use]
    pub fn registry(&self) -> &ConversationRegistry {
        &self.context.registry
    }

    /// Scan mobile citizens pairwise in the given order and start a
    /// conversation for the first pair within range where neither citizen
    /// is busy. At most one conversation starts per call.
    pub fn maybe_start(&self, positions: &[(CitizenId, (f32, f32))], now: NaiveDateTime) -> Option<ConversationId> {
        let threshold = self.context.config.proximity_threshold;
        let registry = &self.context.registry;

        for (i, (a, pa)) in positions.iter().enumerate() {
            if registry.is_busy(*a) {
                continue;
            }
            for (b, pb) in &positions[i + 1..] {
                if distance(*pa, *pb) > threshold || registry.is_busy(*b) {
                    continue;
                }
                let Some(id) = registry.try_begin(*a, *b, now) else {
                    continue;
                };
                info!(conversation = %id, first = %a, second = %b, "Conversation started");
                let context = self.context.clone();
                let participants = vec![*a, *b];
                self.pool.submit(move || run_worker(&context, id, &participants));
                return Some(id);
            }
        }
        None
    }

    /// Sweep ended conversations now, independent of the background timer.
    pub fn sweep_now(&self) -> usize {
        let retention = Duration::seconds(i64::try_from(self.context.config.retention_secs).unwrap_or(i64::MAX));
        self.context.registry.sweep(retention, Utc::now())
    }

    /// Block until no conversation is open and every worker has applied its
    /// outcome, or `timeout` elapses. Returns whether the engine went idle.
    pub fn wait_idle(&self, timeout: StdDuration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while self.context.registry.open_count() > 0 || self.pool.in_flight() > 0 {
            if std::time::Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(StdDuration::from_millis(10));
        }
        true
    }
}

impl fmt::Debug for ConversationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationEngine")
            .field("registry", &self.context.registry)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    (a.0 - b.0).hypot(a.1 - b.1)
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

fn run_worker(context: &WorkerContext, id: ConversationId, participants: &[CitizenId]) {
    context.registry.mark_active(id);

    let generated = catch_unwind(AssertUnwindSafe(|| generate_turns(context, id, participants)));
    let (turns, outcome) = match generated {
        Ok(result) => result,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(conversation = %id, %reason, "Conversation worker failed");
            let published = context.registry.get(id).map(|c| c.turns).unwrap_or_default();
            (published, ConversationOutcome::Failed)
        }
    };

    let Some(ended) = context.registry.finish(id, outcome) else {
        return;
    };
    info!(conversation = %id, turns = turns.len(), ?outcome, "Conversation ended");
    if turns.is_empty() {
        return;
    }

    let mut city = context.city.lock();
    let names: Vec<String> = ended
        .participants
        .iter()
        .map(|p| city.citizen(*p).map_or_else(|| p.to_string(), |c| c.name.clone()))
        .collect();
    let summary = format!("{} talked while commuting ({} lines)", names.join(" and "), turns.len());
    city.apply_social_update(
        &ended.participants,
        &summary,
        ended.started_at,
        context.config.strength_increment,
    );
    // Saved under the city lock so a later snapshot can never be
    // overwritten by this one.
    if let Some(store) = &context.store {
        let records = city.persona_records();
        if let Err(err) = store.lock().save_personas(&records) {
            warn!(conversation = %id, %err, "Persona snapshot flush failed");
        }
    }
}

fn generate_turns(
    context: &WorkerContext,
    id: ConversationId,
    participants: &[CitizenId],
) -> (Vec<Turn>, ConversationOutcome) {
    let speakers: Vec<(CitizenId, String, String)> = {
        let city = context.city.lock();
        participants
            .iter()
            .map(|p| match city.citizen(*p) {
                Some(c) => (c.id, c.name.clone(), c.temperament.clone()),
                None => (*p, format!("Citizen {p}"), String::new()),
            })
            .collect()
    };

    let cap = context.config.turn_cap.max(1);
    let pacing = StdDuration::from_millis(context.config.pacing_ms);
    let mut turns: Vec<Turn> = Vec::with_capacity(cap);

    while turns.len() < cap {
        let index = turns.len();
        let (speaker, name, temperament) = &speakers[index % speakers.len()];
        let listener = &speakers[(index + 1) % speakers.len()].1;

        let prompt = dialogue_prompt(name, temperament, listener, &turns, &speakers);
        let message = context
            .narrator
            .generate_response(&prompt)
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| fallback_line(index, listener));

        let turn = Turn {
            speaker: *speaker,
            message,
            at: Utc::now(),
        };
        context.registry.record_turn(id, turn.clone());
        turns.push(turn);

        if is_winding_down(&turns, context.config.short_message_chars) {
            return (turns, ConversationOutcome::WoundDown);
        }
        if turns.len() < cap && !pacing.is_zero() {
            std::thread::sleep(pacing);
        }
    }
    (turns, ConversationOutcome::TurnCap)
}

/// The last three turns average fewer than `short_chars` characters.
fn is_winding_down(turns: &[Turn], short_chars: usize) -> bool {
    const WINDOW: usize = 3;
    if turns.len() < WINDOW {
        return false;
    }
    let recent = &turns[turns.len() - WINDOW..];
    let total: usize = recent.iter().map(|t| t.message.chars().count()).sum();
    total < short_chars * WINDOW
}

fn dialogue_prompt(
    speaker: &str,
    temperament: &str,
    listener: &str,
    turns: &[Turn],
    speakers: &[(CitizenId, String, String)],
) -> String {
    let mut prompt = format!(
        "You are {speaker}, a city resident ({temperament}). You bump into {listener} while commuting. "
    );
    if turns.is_empty() {
        prompt.push_str("Open the conversation with one short, friendly sentence.");
        return prompt;
    }
    prompt.push_str("Continue the conversation with one short sentence.\n\nSo far:\n");
    for turn in turns {
        let who = speakers
            .iter()
            .find(|(id, _, _)| *id == turn.speaker)
            .map_or("Someone", |(_, n, _)| n.as_str());
        prompt.push_str(&format!("{who}: {}\n", turn.message));
    }
    prompt
}

fn fallback_line(index: usize, listener: &str) -> String {
    match index {
        0 => format!("Good morning, {listener}! Heading the same way?"),
        1 => "Morning! Yes, same route as always, sadly.".to_string(),
        2 => "Did you hear about everything happening in town?".to_string(),
        3 => "A little. The city never really sits still, does it?".to_string(),
        4 => "True enough. Well, this is where I turn off.".to_string(),
        _ => format!("Take care, {listener}. See you around the block."),
    }
}
