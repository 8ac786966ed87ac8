//! Job and school slot allocation.
//!
//! A [`SlotPool`] is a multiset of open `(tile, profession)` slots plus
//! per-tile capacity and assignment lists. Slots are consumed on assignment;
//! running out is a normal outcome, not an error.

use std::collections::BTreeMap;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;

use crate::citizen::{CitizenId, Profession};
use crate::grid::{CityGrid, TileKind, TilePos};

/// Office slots per office tile.
pub const OFFICE_SLOTS: u32 = 4;
/// Retail slots per commercial tile.
pub const RETAIL_SLOTS: u32 = 3;
/// Industrial slots per industrial tile.
pub const INDUSTRIAL_SLOTS: u32 = 5;
/// Service slots on every sixth office tile.
pub const SERVICE_SLOTS: u32 = 3;
/// School places on each school tile.
pub const SCHOOL_SLOTS: u32 = 8;

/// One unit of capacity at a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Slot {
    /// Workplace or school tile.
    pub tile: TilePos,
    /// Category of the slot.
    pub profession: Profession,
}

/// Open slots, tile capacities and current assignments.
#[derive(Debug, Clone, Default)]
pub struct SlotPool {
    available: Vec<Slot>,
    capacity: BTreeMap<TilePos, u32>,
    assignments: BTreeMap<TilePos, Vec<CitizenId>>,
}

impl SlotPool {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` slots of `profession` at `tile`.
    pub fn add(&mut self, tile: TilePos, profession: Profession, count: u32) {
        for _ in 0..count {
            self.available.push(Slot { tile, profession });
        }
        *self.capacity.entry(tile).or_insert(0) += count;
    }

    /// Shuffle the open slots.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.available.shuffle(rng);
    }

    /// Pop the next open slot and assign it to `citizen`.
    pub fn take(&mut self, citizen: CitizenId) -> Option<Slot> {
        let slot = self.available.pop()?;
        self.assign(slot.tile, citizen);
        Some(slot)
    }

    /// Guaranteed-placement assignment (used for births).
    ///
    /// Prefers the first tile (in coordinate order) with strictly remaining
    /// capacity. Otherwise takes any unused slot and grows that tile's
    /// capacity by one if it is already full.
    pub fn reserve(&mut self, citizen: CitizenId) -> Option<Slot> {
        let open_tile = self
            .capacity
            .iter()
            .find(|(tile, cap)| self.occupied(**tile) < **cap)
            .map(|(tile, _)| *tile);

        let open_index = open_tile.and_then(|tile| self.available.iter().rposition(|s| s.tile == tile));
        if let Some(index) = open_index {
            let slot = self.available.remove(index);
            self.assign(slot.tile, citizen);
            return Some(slot);
        }

        let slot = self.available.pop()?;
        let occupied = self.occupied(slot.tile);
        let capacity = self.capacity.entry(slot.tile).or_insert(0);
        if occupied >= *capacity {
            *capacity += 1;
        }
        self.assign(slot.tile, citizen);
        Some(slot)
    }

    /// Re-mark an assignment loaded from persisted state.
    ///
    /// Removes one open slot with the same tile and profession when present;
    /// otherwise grows the tile's capacity so the occupancy bound still holds.
    pub fn restore(&mut self, slot: Slot, citizen: CitizenId) {
        let tile = slot.tile;
        if let Some(index) = self.available.iter().rposition(|s| *s == slot) {
            self.available.remove(index);
        } else {
            let occupied = self.occupied(tile);
            let capacity = self.capacity.entry(tile).or_insert(0);
            if occupied >= *capacity {
                *capacity += 1;
            }
        }
        self.assign(tile, citizen);
    }

    fn assign(&mut self, tile: TilePos, citizen: CitizenId) {
        self.assignments.entry(tile).or_default().push(citizen);
    }

    /// Tracked capacity of a tile.
    #[must_use]
    pub fn capacity(&self, tile: TilePos) -> u32 {
        self.capacity.get(&tile).copied().unwrap_or(0)
    }

    /// Number of citizens assigned to a tile.
    #[must_use]
    pub fn occupied(&self, tile: TilePos) -> u32 {
        self.assignments
            .get(&tile)
            .map_or(0, |v| u32::try_from(v.len()).unwrap_or(u32::MAX))
    }

    /// Citizens assigned to a tile, in assignment order.
    #[must_use]
    pub fn assigned(&self, tile: TilePos) -> &[CitizenId] {
        self.assignments.get(&tile).map_or(&[], Vec::as_slice)
    }

    /// Number of open slots.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.available.len()
    }

    /// Tiles with tracked capacity.
    pub fn tiles(&self) -> impl Iterator<Item = (TilePos, u32)> + '_ {
        self.capacity.iter().map(|(t, c)| (*t, *c))
    }
}

/// Job and school pools built from one grid scan.
#[derive(Debug, Clone, Default)]
pub struct SlotAllocator {
    /// Job slots.
    pub jobs: SlotPool,
    /// School places.
    pub schools: SlotPool,
}

impl SlotAllocator {
    /// Scan the grid once in row-major order and shuffle both pools.
    pub fn build<R: Rng + ?Sized>(grid: &CityGrid, rng: &mut R) -> Self {
        let mut jobs = SlotPool::new();
        let mut schools = SlotPool::new();
        let mut office_tiles = Vec::new();

        for tile in grid.positions() {
            let Some(kind) = grid.get(tile) else { continue };
            match kind {
                TileKind::Office => {
                    office_tiles.push(tile);
                    jobs.add(tile, Profession::Office, OFFICE_SLOTS);
                }
                TileKind::Commercial => jobs.add(tile, Profession::Retail, RETAIL_SLOTS),
                TileKind::Industrial => jobs.add(tile, Profession::Industrial, INDUSTRIAL_SLOTS),
                _ => {}
            }
            if matches!(kind, TileKind::Commercial | TileKind::Office) && (tile.x + tile.y).rem_euclid(7) == 0 {
                schools.add(tile, Profession::Student, SCHOOL_SLOTS);
            }
        }

        for tile in office_tiles.into_iter().step_by(6) {
            jobs.add(tile, Profession::Service, SERVICE_SLOTS);
        }

        jobs.shuffle(rng);
        schools.shuffle(rng);
        Self { jobs, schools }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn build_weights_tiles_by_kind() {
        // (0,0) is office and a school tile; (6,1) is commercial with x+y=7.
        let grid = CityGrid::from_rows(&["OCIRRRR", "RRRRRRC"]).expect("valid map");
        let mut rng = StdRng::seed_from_u64(1);
        let slots = SlotAllocator::build(&grid, &mut rng);

        assert_eq!(slots.jobs.capacity(TilePos::new(0, 0)), OFFICE_SLOTS + SERVICE_SLOTS);
        assert_eq!(slots.jobs.capacity(TilePos::new(1, 0)), RETAIL_SLOTS);
        assert_eq!(slots.jobs.capacity(TilePos::new(2, 0)), INDUSTRIAL_SLOTS);
        assert_eq!(slots.jobs.remaining(), 4 + 3 + 3 + 5 + 3);
        assert_eq!(slots.schools.capacity(TilePos::new(0, 0)), SCHOOL_SLOTS);
        assert_eq!(slots.schools.capacity(TilePos::new(6, 1)), SCHOOL_SLOTS);
        assert_eq!(slots.schools.remaining(), 16);
    }

    #[test]
    fn take_exhausts_without_error() {
        let mut pool = SlotPool::new();
        pool.add(TilePos::new(1, 1), Profession::Retail, 2);
        assert!(pool.take(CitizenId(1)).is_some());
        assert!(pool.take(CitizenId(2)).is_some());
        assert!(pool.take(CitizenId(3)).is_none());
        assert_eq!(pool.assigned(TilePos::new(1, 1)), &[CitizenId(1), CitizenId(2)]);
    }

    #[test]
    fn reserve_prefers_tile_with_room() {
        let mut pool = SlotPool::new();
        pool.add(TilePos::new(0, 0), Profession::Student, 1);
        pool.add(TilePos::new(4, 4), Profession::Student, 2);
        pool.take(CitizenId(1)); // consumes a (4,4) slot: last added pops first
        let slot = pool.reserve(CitizenId(2)).expect("room left");
        assert_eq!(slot.tile, TilePos::new(0, 0));
        assert!(pool.occupied(TilePos::new(0, 0)) <= pool.capacity(TilePos::new(0, 0)));
    }

    #[test]
    fn restore_grows_capacity_when_slot_is_gone() {
        let mut pool = SlotPool::new();
        pool.add(TilePos::new(2, 2), Profession::Office, 1);
        let office = Slot {
            tile: TilePos::new(2, 2),
            profession: Profession::Office,
        };
        pool.restore(office, CitizenId(1));
        pool.restore(office, CitizenId(2));
        assert_eq!(pool.occupied(TilePos::new(2, 2)), 2);
        assert_eq!(pool.capacity(TilePos::new(2, 2)), 2);
        assert_eq!(pool.remaining(), 0);
    }

    #[test]
    fn restore_consumes_slot_of_matching_profession() {
        let tile = TilePos::new(3, 0);
        let mut pool = SlotPool::new();
        pool.add(tile, Profession::Office, 1);
        pool.add(tile, Profession::Service, 1);

        pool.restore(
            Slot {
                tile,
                profession: Profession::Office,
            },
            CitizenId(1),
        );
        assert_eq!(pool.capacity(tile), 2);
        let left = pool.take(CitizenId(2)).expect("service slot still open");
        assert_eq!(left.profession, Profession::Service);
        assert_eq!(pool.remaining(), 0);
    }
}
