//! Frame loop: the host side of the simulation.
//!
//! Each frame ticks the core, applies its mobility events to the commuter
//! agents, moves them, hands their positions back for the proximity trigger,
//! and refreshes the dashboard feed.

use std::time::{Duration, Instant};

use civic_core::Simulation;
use tracing::{info, warn};

use crate::agents::AgentField;
use crate::dashboard::DashboardWriter;

/// How long shutdown waits for in-flight conversations.
const CONVERSATION_DRAIN: Duration = Duration::from_secs(5);

/// Options for [`Driver::run`].
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Real seconds to simulate.
    pub duration_secs: f64,
    /// Seconds per frame.
    pub frame_dt: f64,
    /// Sleep between frames so the run keeps wall-clock pace.
    pub realtime: bool,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    /// Frames executed.
    pub frames: u64,
    /// Conversations started.
    pub conversations: u64,
    /// Largest number of simultaneous commuters seen.
    pub peak_commuters: usize,
}

/// Owns the simulation and its movement collaborator.
pub struct Driver {
    sim: Simulation,
    agents: AgentField,
    dashboard: Option<DashboardWriter>,
}

impl Driver {
    /// Wrap a simulation. Agent randomness is derived from the config seed.
    #[must_use]
    pub fn new(sim: Simulation, dashboard: Option<DashboardWriter>) -> Self {
        let seed = sim.config().general.seed.wrapping_add(1);
        let agents = AgentField::new(sim.tile_size(), seed);
        Self { sim, agents, dashboard }
    }

    /// Advance one frame of `dt` seconds. Returns whether a conversation
    /// started.
    #[allow(clippy::cast_possible_truncation)]
    pub fn frame(&mut self, dt: f64) -> bool {
        let mut started = false;
        if self.sim.is_running() {
            let mobility = self.sim.tick(dt);
            if !mobility.is_empty() {
                let city = self.sim.city();
                let state = city.lock();
                self.agents.apply(&mobility, &state);
            }
            self.agents.step(self.sim.grid(), dt as f32);
            started = self.sim.observe_positions(&self.agents.positions()).is_some();
        }

        if let Some(writer) = &mut self.dashboard {
            if writer.due(dt) {
                writer.publish(&self.sim.dashboard_snapshot());
            }
        }
        started
    }

    /// Run frames until `options.duration_secs` of simulated real time has
    /// passed, then flush state.
    pub fn run(&mut self, options: RunOptions) -> RunStats {
        let frame_dt = options.frame_dt.max(1e-3);
        let mut stats = RunStats {
            frames: 0,
            conversations: 0,
            peak_commuters: 0,
        };
        let mut elapsed = 0.0;
        info!(
            duration_secs = options.duration_secs,
            frame_dt,
            realtime = options.realtime,
            start = %self.sim.clock().formatted_time(),
            "Simulation run starting"
        );

        while elapsed < options.duration_secs {
            let started_at = Instant::now();
            if self.frame(frame_dt) {
                stats.conversations += 1;
            }
            stats.frames += 1;
            stats.peak_commuters = stats.peak_commuters.max(self.agents.len());
            elapsed += frame_dt;

            if options.realtime {
                let budget = Duration::from_secs_f64(frame_dt);
                if let Some(rest) = budget.checked_sub(started_at.elapsed()) {
                    std::thread::sleep(rest);
                }
            }
        }

        self.finish();
        info!(
            frames = stats.frames,
            conversations = stats.conversations,
            peak_commuters = stats.peak_commuters,
            end = %self.sim.clock().formatted_time(),
            "Simulation run finished"
        );
        stats
    }

    /// Drain conversations, write the final snapshot and dashboard.
    pub fn finish(&mut self) {
        if !self.sim.wait_for_conversations(CONVERSATION_DRAIN) {
            warn!("Conversations still running at shutdown; abandoning them");
        }
        self.sim.save_snapshot();
        if let Some(writer) = &self.dashboard {
            writer.publish(&self.sim.dashboard_snapshot());
        }
    }

    /// Pause or resume.
    pub fn set_running(&mut self, running: bool) {
        self.sim.set_running(running);
    }

    /// The wrapped simulation.
    #[must_use]
    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    /// The commuter agents.
    #[must_use]
    pub fn agents(&self) -> &AgentField {
        &self.agents
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("sim", &self.sim)
            .field("agents", &self.agents.len())
            .field("dashboard", &self.dashboard)
            .finish()
    }
}
