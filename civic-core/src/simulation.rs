//! Top-level simulation driver.
//!
//! [`Simulation`] wires the clock, the city state, the stage scheduler, the
//! daily event engine and the conversation engine together. The host calls
//! [`Simulation::tick`] once per frame with the elapsed real seconds, feeds
//! commuter positions back through [`Simulation::observe_positions`], and
//! reads reports whenever it needs to draw something.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, error, info, warn};

use crate::citizen::CitizenId;
use crate::clock::SimulationClock;
use crate::config::CivicConfig;
use crate::conversation::{Conversation, ConversationEngine, ConversationId};
use crate::error::Result;
use crate::events::{CityEvent, DailyOutcome, EventEngine};
use crate::grid::{CityGrid, TilePos};
use crate::narrator::Narrator;
use crate::persistence::{PersistenceEngine, SharedStore, load_seed_file};
use crate::population::{CityState, PersonaRecord};
use crate::report::{
    self, CitizenReport, CitizenSummary, DashboardCitizen, DashboardSnapshot, PopulationSummary, TileReport,
};
use crate::schedule::{MobilityEvent, StageScheduler};

/// Number of event log entries shown on the dashboard.
const DASHBOARD_EVENT_LINES: usize = 10;

/// The running city.
pub struct Simulation {
    config: CivicConfig,
    clock: SimulationClock,
    grid: Arc<CityGrid>,
    city: Arc<Mutex<CityState>>,
    scheduler: StageScheduler,
    events: EventEngine,
    conversations: ConversationEngine,
    narrator: Arc<dyn Narrator>,
    store: Option<SharedStore>,
    running: bool,
}

impl Simulation {
    /// Build a simulation from config, generating the procedural map and
    /// opening the database named in `persistence.path`, if any.
    ///
    /// # Errors
    /// Fails if the database cannot be opened or the worker pool cannot start.
    pub fn from_config(config: CivicConfig, narrator: Arc<dyn Narrator>) -> Result<Self> {
        let grid = CityGrid::generate(config.world.width, config.world.height);
        let store = match &config.persistence.path {
            Some(path) => Some(PersistenceEngine::open(path, &config.persistence)?.shared()),
            None => None,
        };
        Self::new(config, grid, narrator, store)
    }

    /// Build a simulation on an explicit map and store.
    ///
    /// Citizens come from the store's persona snapshot when it has one, else
    /// from the configured seed file, else from a fresh bootstrap. A city
    /// that did not come from the store is written to it straight away.
    ///
    /// # Errors
    /// Fails if the conversation worker pool cannot start.
    pub fn new(
        config: CivicConfig,
        grid: CityGrid,
        narrator: Arc<dyn Narrator>,
        store: Option<SharedStore>,
    ) -> Result<Self> {
        let grid = Arc::new(grid);
        let mut rng = StdRng::seed_from_u64(config.general.seed);

        let (mut state, from_store) = load_city(&config, &grid, store.as_ref(), &mut rng);
        state.set_recent_births_cap(config.events.recent_births_cap);
        info!(
            citizens = state.population_count(),
            households = state.households_count(),
            narrator = narrator.name(),
            "City ready"
        );

        let mut events = EventEngine::new(config.events.clone(), config.general.seed);
        if let Some(store) = &store {
            match store.lock().load_events() {
                Ok(log) => events.restore_log(log),
                Err(err) => warn!(%err, "Could not load event log; starting empty"),
            }
        }

        let records = (!from_store && store.is_some()).then(|| state.persona_records());
        let city = Arc::new(Mutex::new(state));
        let conversations = ConversationEngine::new(
            config.conversation.clone(),
            Arc::clone(&city),
            Arc::clone(&narrator),
            store.clone(),
        )?;

        let sim = Self {
            clock: SimulationClock::from_config(&config.clock),
            config,
            grid,
            city,
            scheduler: StageScheduler::new(),
            events,
            conversations,
            narrator,
            store,
            running: true,
        };
        if let Some(records) = records {
            sim.write_snapshot(&records);
        }
        Ok(sim)
    }

    /// Advance by `dt_seconds` of real time.
    ///
    /// Reclassifies every citizen's stage, runs the daily births and random
    /// events once per simulated date, prunes expired memories, and returns
    /// the spawn/reposition/despawn events for the movement collaborator.
    /// A paused simulation returns nothing.
    pub fn tick(&mut self, dt_seconds: f64) -> Vec<MobilityEvent> {
        if !self.running {
            return Vec::new();
        }
        if let Err(err) = self.clock.advance(dt_seconds) {
            error!(%err, "Clock cannot advance further; pausing");
            self.running = false;
            return Vec::new();
        }
        let now = self.clock.now();
        let minute = self.clock.minute_of_day();

        let mobility = {
            let city = self.city.lock();
            self.scheduler.update(city.citizens(), minute)
        };

        let today = now.date();
        if self.events.is_due(today) {
            let outcome = self.events.run_daily(&self.city, self.narrator.as_ref(), now);
            self.persist_outcome(&outcome);
        }
        self.city.lock().prune_memories(today);
        mobility
    }

    /// Run the proximity trigger against commuter positions in pixels.
    pub fn observe_positions(&self, positions: &[(CitizenId, (f32, f32))]) -> Option<ConversationId> {
        self.conversations.maybe_start(positions, self.clock.now())
    }

    fn persist_outcome(&self, outcome: &DailyOutcome) {
        let Some(store) = &self.store else { return };
        if !outcome.logged.is_empty() {
            let store = store.lock();
            for event in &outcome.logged {
                if let Err(err) = store.append_event(event) {
                    warn!(%err, kind = event.kind.as_str(), "Failed to append city event");
                }
            }
        }
        if outcome.changed_citizens() {
            self.save_snapshot();
        }
    }

    /// Write the full persona snapshot to the store, if there is one.
    pub fn save_snapshot(&self) {
        if self.store.is_none() {
            return;
        }
        let city = self.city.lock();
        self.write_snapshot(&city.persona_records());
    }

    /// Once the city is shared, callers hold its lock; the store lock is
    /// always taken second.
    fn write_snapshot(&self, records: &[PersonaRecord]) {
        let Some(store) = &self.store else { return };
        match store.lock().save_personas(records) {
            Ok(count) => debug!(count, "Persona snapshot saved"),
            Err(err) => warn!(%err, "Failed to save persona snapshot"),
        }
    }

    // -- control ------------------------------------------------------------

    /// Pause or resume the clock.
    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Whether the clock advances on tick.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Block until every conversation has finished or `timeout` elapses.
    pub fn wait_for_conversations(&self, timeout: std::time::Duration) -> bool {
        self.conversations.wait_idle(timeout)
    }

    // -- accessors ----------------------------------------------------------

    /// The simulated clock.
    #[must_use]
    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    /// The map.
    #[must_use]
    pub fn grid(&self) -> &Arc<CityGrid> {
        &self.grid
    }

    /// Shared city state.
    #[must_use]
    pub fn city(&self) -> Arc<Mutex<CityState>> {
        Arc::clone(&self.city)
    }

    /// Current stage assignments.
    #[must_use]
    pub fn scheduler(&self) -> &StageScheduler {
        &self.scheduler
    }

    /// Event log, oldest first.
    #[must_use]
    pub fn event_log(&self) -> &[CityEvent] {
        self.events.log()
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &CivicConfig {
        &self.config
    }

    /// Tile size in pixels.
    #[must_use]
    pub fn tile_size(&self) -> f32 {
        self.config.world.tile_size
    }

    /// Snapshot of every tracked conversation, most recent first.
    #[must_use]
    pub fn conversations(&self) -> Vec<Conversation> {
        self.conversations.registry().snapshot()
    }

    /// Database path, when persistence is enabled.
    #[must_use]
    pub fn store_path(&self) -> Option<std::path::PathBuf> {
        self.store.as_ref().map(|s| s.lock().path().to_path_buf())
    }

    // -- reports ------------------------------------------------------------

    /// Report on one tile.
    #[must_use]
    pub fn tile_report(&self, tile: TilePos) -> Option<TileReport> {
        report::tile_report(&self.city.lock(), tile)
    }

    /// Report on one citizen.
    #[must_use]
    pub fn citizen_report(&self, id: CitizenId) -> Option<CitizenReport> {
        report::citizen_report(&self.city.lock(), &self.scheduler, id)
    }

    /// Headline population numbers.
    #[must_use]
    pub fn population_summary(&self) -> PopulationSummary {
        report::population_summary(&self.city.lock(), &self.scheduler)
    }

    /// Roster of every citizen.
    #[must_use]
    pub fn citizen_summaries(&self) -> Vec<CitizenSummary> {
        report::citizen_summaries(&self.city.lock(), &self.scheduler)
    }

    /// Recent birth narratives, newest last.
    #[must_use]
    pub fn recent_births(&self) -> Vec<String> {
        self.city.lock().recent_births()
    }

    /// Everything the external dashboard shows.
    #[must_use]
    pub fn dashboard_snapshot(&self) -> DashboardSnapshot {
        let (summary, roster, births) = {
            let city = self.city.lock();
            (
                report::population_summary(&city, &self.scheduler),
                report::citizen_summaries(&city, &self.scheduler),
                city.recent_births(),
            )
        };
        let log = self.events.log();
        let mut events = births;
        events.extend(
            log[log.len().saturating_sub(DASHBOARD_EVENT_LINES)..]
                .iter()
                .map(|e| format!("{}: {}", e.date.format("%b %d, %Y"), e.summary)),
        );

        DashboardSnapshot {
            time_str: self.clock.formatted_time(),
            date_str: self.clock.formatted_date(),
            city_metrics: report::city_metric_lines(&self.grid),
            population_metrics: report::population_metric_lines(&summary, self.running),
            citizens: roster.iter().map(DashboardCitizen::from).collect(),
            events,
        }
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("now", &self.clock.now())
            .field("running", &self.running)
            .field("narrator", &self.narrator.name())
            .field("store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

/// Pick the city source: stored snapshot, then seed file, then bootstrap.
/// The flag says whether the city came from the store.
fn load_city(config: &CivicConfig, grid: &Arc<CityGrid>, store: Option<&SharedStore>, rng: &mut StdRng) -> (CityState, bool) {
    if let Some(store) = store {
        match store.lock().load_personas() {
            Ok(records) if !records.is_empty() => {
                info!(records = records.len(), "Restoring city from persona snapshot");
                let state = CityState::from_records(Arc::clone(grid), &config.population, records, rng);
                return (state, true);
            }
            Ok(_) => {}
            Err(err) => warn!(%err, "Could not read persona snapshot"),
        }
    }

    if let Some(seed) = &config.persistence.seed_file {
        match load_seed_file(Path::new(seed)) {
            Ok(records) if !records.is_empty() => {
                let state = CityState::from_records(Arc::clone(grid), &config.population, records, rng);
                return (state, false);
            }
            Ok(_) => warn!(file = %seed, "Seed file holds no personas; bootstrapping"),
            Err(err) => warn!(%err, file = %seed, "Could not read seed file; bootstrapping"),
        }
    }

    (CityState::bootstrap(Arc::clone(grid), &config.population, rng), false)
}
