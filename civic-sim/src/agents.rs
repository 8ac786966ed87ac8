//! Commuter agents: the visible, moving half of a commute.
//!
//! The core only decides *when* a citizen is in transit. This module turns
//! its spawn/reposition/despawn events into agents that wander the road
//! network, and reports their pixel positions back for the proximity
//! trigger.

use std::collections::BTreeMap;

use civic_core::citizen::CitizenId;
use civic_core::grid::{CityGrid, TilePos};
use civic_core::population::CityState;
use civic_core::schedule::{DailyStage, MobilityEvent};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Agent speed range in pixels per second.
const SPEED_RANGE: (f32, f32) = (65.0, 100.0);

const DIRECTIONS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// One commuting citizen on the map.
#[derive(Debug, Clone, PartialEq)]
pub struct CommuterAgent {
    /// The citizen this agent represents.
    pub citizen: CitizenId,
    /// Current commute stage.
    pub stage: DailyStage,
    /// Position in pixels.
    pub pos: (f32, f32),
    /// Last tile reached.
    pub tile: TilePos,
    /// Tile being walked towards; `None` once stranded.
    pub target: Option<TilePos>,
    direction: Option<(i32, i32)>,
    speed: f32,
}

impl CommuterAgent {
    fn place(&mut self, tile: TilePos, tile_size: f32) {
        self.tile = tile;
        self.pos = CityGrid::tile_center(tile, tile_size);
        self.direction = None;
        self.target = None;
    }

    /// Pick the next road tile, avoiding an immediate U-turn unless it is
    /// the only way on.
    fn choose_direction<R: Rng + ?Sized>(&mut self, grid: &CityGrid, initial: bool, rng: &mut R) {
        let backtrack = self.direction.map(|(dx, dy)| (-dx, -dy));
        let road_dirs: Vec<(i32, i32)> = DIRECTIONS
            .iter()
            .copied()
            .filter(|(dx, dy)| grid.is_road(TilePos::new(self.tile.x + dx, self.tile.y + dy)))
            .collect();
        let forward: Vec<(i32, i32)> = road_dirs
            .iter()
            .copied()
            .filter(|d| initial || Some(*d) != backtrack)
            .collect();
        let options = if forward.is_empty() { road_dirs } else { forward };

        match options.choose(rng) {
            Some(&(dx, dy)) => {
                self.direction = Some((dx, dy));
                self.target = Some(TilePos::new(self.tile.x + dx, self.tile.y + dy));
            }
            None => self.target = None,
        }
    }

    fn advance<R: Rng + ?Sized>(&mut self, grid: &CityGrid, tile_size: f32, dt: f32, rng: &mut R) {
        let Some(target) = self.target else { return };
        let center = CityGrid::tile_center(target, tile_size);
        let (dx, dy) = (center.0 - self.pos.0, center.1 - self.pos.1);
        let distance = dx.hypot(dy);
        let step = self.speed * dt;

        if distance <= step {
            self.pos = center;
            self.tile = target;
            self.choose_direction(grid, false, rng);
        } else if distance > 0.0 {
            self.pos.0 += dx * step / distance;
            self.pos.1 += dy * step / distance;
        }
    }
}

/// All live commuter agents, keyed by citizen.
#[derive(Debug)]
pub struct AgentField {
    agents: BTreeMap<CitizenId, CommuterAgent>,
    rng: StdRng,
    tile_size: f32,
}

impl AgentField {
    /// Empty field; `seed` drives speeds and route choices.
    #[must_use]
    pub fn new(tile_size: f32, seed: u64) -> Self {
        Self {
            agents: BTreeMap::new(),
            rng: StdRng::seed_from_u64(seed),
            tile_size,
        }
    }

    /// Apply the scheduler's mobility events.
    pub fn apply(&mut self, events: &[MobilityEvent], city: &CityState) {
        for event in events {
            match *event {
                MobilityEvent::Spawn { citizen, stage } => {
                    let Some(tile) = spawn_tile(city, citizen, stage) else { continue };
                    let speed = self.rng.gen_range(SPEED_RANGE.0..=SPEED_RANGE.1);
                    let mut agent = CommuterAgent {
                        citizen,
                        stage,
                        pos: (0.0, 0.0),
                        tile,
                        target: None,
                        direction: None,
                        speed,
                    };
                    agent.place(tile, self.tile_size);
                    agent.choose_direction(city.grid(), true, &mut self.rng);
                    debug!(citizen = citizen.0, stage = stage.as_str(), "Commuter spawned");
                    self.agents.insert(citizen, agent);
                }
                MobilityEvent::Reposition { citizen, stage } => {
                    let Some(tile) = spawn_tile(city, citizen, stage) else { continue };
                    let Some(agent) = self.agents.get_mut(&citizen) else { continue };
                    if agent.stage == stage {
                        continue;
                    }
                    agent.stage = stage;
                    agent.place(tile, self.tile_size);
                    agent.choose_direction(city.grid(), true, &mut self.rng);
                }
                MobilityEvent::Despawn { citizen } => {
                    if self.agents.remove(&citizen).is_some() {
                        debug!(citizen = citizen.0, "Commuter despawned");
                    }
                }
            }
        }
    }

    /// Move every agent by `dt` seconds.
    pub fn step(&mut self, grid: &CityGrid, dt: f32) {
        for agent in self.agents.values_mut() {
            agent.advance(grid, self.tile_size, dt, &mut self.rng);
        }
    }

    /// Pixel positions in ascending citizen order.
    #[must_use]
    pub fn positions(&self) -> Vec<(CitizenId, (f32, f32))> {
        self.agents.values().map(|a| (a.citizen, a.pos)).collect()
    }

    /// Agent for a citizen, if mobile.
    #[must_use]
    pub fn get(&self, citizen: CitizenId) -> Option<&CommuterAgent> {
        self.agents.get(&citizen)
    }

    /// Number of agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether nobody is commuting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// Road tile nearest home when leaving for work, nearest the workplace
/// (or home, without one) when heading back.
fn spawn_tile(city: &CityState, citizen: CitizenId, stage: DailyStage) -> Option<TilePos> {
    let citizen = city.citizen(citizen)?;
    let base = match stage {
        DailyStage::CommuteToWork => citizen.home_tile,
        _ => citizen.job_tile.unwrap_or(citizen.home_tile),
    };
    Some(city.grid().nearest_road_tile(base))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TILE: f32 = 32.0;

    /// A plus-shaped road crossing at (2,2) on a 5x5 park map.
    fn cross() -> CityGrid {
        CityGrid::from_rows(&["PPRPP", "PPRPP", "RRRRR", "PPRPP", "PPRPP"]).expect("valid map")
    }

    fn agent_at(tile: TilePos) -> CommuterAgent {
        let mut agent = CommuterAgent {
            citizen: CitizenId(1),
            stage: DailyStage::CommuteToWork,
            pos: (0.0, 0.0),
            tile,
            target: None,
            direction: None,
            speed: 80.0,
        };
        agent.place(tile, TILE);
        agent
    }

    #[test]
    fn initial_choice_is_a_road_neighbour() {
        let grid = cross();
        let mut rng = StdRng::seed_from_u64(3);
        let mut agent = agent_at(TilePos::new(2, 2));
        agent.choose_direction(&grid, true, &mut rng);
        let target = agent.target.expect("crossing has exits");
        assert!(grid.is_road(target));
        assert_eq!(target.manhattan(TilePos::new(2, 2)), 1);
    }

    #[test]
    fn agents_do_not_turn_back_at_a_crossing() {
        let grid = cross();
        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut agent = agent_at(TilePos::new(2, 2));
            agent.direction = Some((1, 0));
            agent.choose_direction(&grid, false, &mut rng);
            assert_ne!(agent.target, Some(TilePos::new(1, 2)), "seed {seed}");
        }
    }

    #[test]
    fn dead_end_allows_turning_back() {
        let grid = cross();
        let mut rng = StdRng::seed_from_u64(9);
        let mut agent = agent_at(TilePos::new(4, 2));
        agent.direction = Some((1, 0));
        agent.choose_direction(&grid, false, &mut rng);
        assert_eq!(agent.target, Some(TilePos::new(3, 2)));
    }

    #[test]
    fn isolated_agent_stays_put() {
        let grid = CityGrid::from_rows(&["PPP", "PRP", "PPP"]).expect("valid map");
        let mut rng = StdRng::seed_from_u64(1);
        let mut agent = agent_at(TilePos::new(1, 1));
        agent.choose_direction(&grid, true, &mut rng);
        assert!(agent.target.is_none());
        let before = agent.pos;
        agent.advance(&grid, TILE, 1.0, &mut rng);
        assert_eq!(agent.pos, before);
    }

    #[test]
    fn movement_is_bounded_by_speed() {
        let grid = cross();
        let mut rng = StdRng::seed_from_u64(5);
        let mut agent = agent_at(TilePos::new(0, 2));
        agent.choose_direction(&grid, true, &mut rng);
        assert_eq!(agent.target, Some(TilePos::new(1, 2)));
        let start = agent.pos;
        agent.advance(&grid, TILE, 0.1, &mut rng);
        let moved = (agent.pos.0 - start.0).hypot(agent.pos.1 - start.1);
        assert!((moved - 8.0).abs() < 1e-3, "moved {moved}");
        assert_eq!(agent.tile, TilePos::new(0, 2));

        agent.advance(&grid, TILE, 1.0, &mut rng);
        assert_eq!(agent.tile, TilePos::new(1, 2));
        assert_eq!(agent.pos, CityGrid::tile_center(TilePos::new(1, 2), TILE));
    }
}
