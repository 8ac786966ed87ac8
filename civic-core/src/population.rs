//! Citizen and household registry.
//!
//! [`CityState`] is the single aggregate owning every citizen, household,
//! slot pool and birth record. It is created by bootstrapping from the grid
//! or by reconstructing from persona records, and afterwards only mutated
//! through the methods here (births, memory pruning, broadcasts, social
//! updates). The simulation wraps it in one mutex.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::citizen::{
    AgeGroup, Citizen, CitizenId, EmploymentStatus, Gender, Household, HouseholdId, Profession, Relationship,
    RelationshipKind,
};
use crate::config::{EventsConfig, PopulationConfig};
use crate::error::{CivicError, Result};
use crate::grid::{CityGrid, TileKind, TilePos};
use crate::memory::{self, MemoryRecord, Severity};
use crate::narrator::Persona;
use crate::schedule::DailySchedule;
use crate::slots::{Slot, SlotAllocator, SlotPool};

// ---------------------------------------------------------------------------
// Name & persona catalogues
// ---------------------------------------------------------------------------

const MALE_NAMES: [&str; 11] = [
    "Noah", "Liam", "Mason", "Ethan", "Logan", "Lucas", "James", "Benjamin", "Henry", "Aiden", "Levi",
];

const FEMALE_NAMES: [&str; 18] = [
    "Ava", "Emma", "Olivia", "Sophia", "Isabella", "Mia", "Charlotte", "Amelia", "Harper", "Evelyn", "Grace", "Lily",
    "Chloe", "Victoria", "Ella", "Scarlett", "Natalie", "Hannah",
];

const SURNAMES: [&str; 20] = [
    "Alvarez", "Bennett", "Chen", "Dubois", "Eriksen", "Fischer", "Garcia", "Haddad", "Ivanova", "Jensen",
    "Kowalski", "Laurent", "Moreau", "Nakamura", "Okafor", "Patel", "Quinn", "Rossi", "Silva", "Tanaka",
];

const TEMPERAMENTS: [&str; 8] = [
    "Warm and talkative",
    "Quiet and observant",
    "Ambitious and restless",
    "Patient and methodical",
    "Cheerful and impulsive",
    "Stubborn but loyal",
    "Curious and dreamy",
    "Practical and blunt",
];

const VALUES: [&str; 12] = [
    "family",
    "honesty",
    "ambition",
    "community",
    "curiosity",
    "tradition",
    "adventure",
    "craft",
    "faith",
    "independence",
    "kindness",
    "justice",
];

/// Trait key holding a newborn's narrator summary.
pub const SUMMARY_TRAIT: &str = "summary";

// ---------------------------------------------------------------------------
// Persisted record
// ---------------------------------------------------------------------------

/// One citizen as saved in the persona snapshot, keyed by household tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaRecord {
    /// Stable household tag (the household address).
    pub household_tag: String,
    /// Full citizen state.
    #[serde(flatten)]
    pub citizen: Citizen,
}

// ---------------------------------------------------------------------------
// CityState
// ---------------------------------------------------------------------------

/// The simulation-state aggregate.
#[derive(Debug, Clone)]
pub struct CityState {
    grid: Arc<CityGrid>,
    config: PopulationConfig,
    citizens: BTreeMap<CitizenId, Citizen>,
    households: BTreeMap<HouseholdId, Household>,
    households_by_tile: BTreeMap<TilePos, Vec<HouseholdId>>,
    next_citizen: u64,
    next_household: u64,
    zone_counters: BTreeMap<char, u32>,
    slots: SlotAllocator,
    last_birth: BTreeMap<HouseholdId, NaiveDate>,
    recent_births: VecDeque<String>,
    recent_births_cap: usize,
}

impl CityState {
    fn empty(grid: Arc<CityGrid>, config: PopulationConfig, slots: SlotAllocator) -> Self {
        Self {
            grid,
            config,
            citizens: BTreeMap::new(),
            households: BTreeMap::new(),
            households_by_tile: BTreeMap::new(),
            next_citizen: 1,
            next_household: 1,
            zone_counters: BTreeMap::new(),
            slots,
            last_birth: BTreeMap::new(),
            recent_births: VecDeque::new(),
            recent_births_cap: 20,
        }
    }

    /// Populate the city procedurally from its residential tiles.
    pub fn bootstrap<R: Rng + ?Sized>(grid: Arc<CityGrid>, config: &PopulationConfig, rng: &mut R) -> Self {
        let slots = SlotAllocator::build(&grid, rng);
        let mut state = Self::empty(Arc::clone(&grid), config.clone(), slots);

        let mut residential = grid.tiles_of(TileKind::Residential);
        residential.shuffle(rng);

        let target = config.target_population.max(1);
        let elder_chance = config.elder_chance.clamp(0.0, 1.0);
        let child_chance = config.child_chance.clamp(0.0, 1.0);
        let child_vs_teen = config.child_vs_teen.clamp(0.0, 1.0);
        let mut names = NameCycle::default();

        for tile in residential {
            if state.citizens.len() >= target {
                break;
            }
            let household = HouseholdId(state.next_household);
            let address = state.allocate_address(tile);
            let surname = SURNAMES.choose(rng).copied().unwrap_or("Smith");
            let mut members = Vec::new();

            let adults = rng.gen_range(1..=2);
            for _ in 0..adults {
                if state.citizens.len() >= target {
                    break;
                }
                let id = state.allocate_citizen_id();
                let gender = names.next_gender();
                let age_group = if rng.gen_bool(elder_chance) { AgeGroup::Elder } else { AgeGroup::Adult };
                let mut citizen = new_citizen(id, gender, age_group, household, tile, &address);
                citizen.name = format!("{} {surname}", names.next_name(gender));
                roll_personality(&mut citizen, rng);

                if age_group == AgeGroup::Elder {
                    citizen.employment = EmploymentStatus::Retired;
                } else if let Some(slot) = state.slots.jobs.take(id) {
                    citizen.employment = EmploymentStatus::Employed;
                    citizen.profession = slot.profession;
                    citizen.job_tile = Some(slot.tile);
                    citizen.schedule = DailySchedule::for_profession(slot.profession);
                }
                members.push(id);
                state.citizens.insert(id, citizen);
            }

            if members.is_empty() {
                continue;
            }

            if state.citizens.len() < target && rng.gen_bool(child_chance) {
                let id = state.allocate_citizen_id();
                let gender = names.next_gender();
                let age_group = if rng.gen_bool(child_vs_teen) { AgeGroup::Child } else { AgeGroup::Teen };
                let mut citizen = new_citizen(id, gender, age_group, household, tile, &address);
                citizen.name = format!("{} {surname}", names.next_name(gender));
                citizen.employment = EmploymentStatus::Student;
                citizen.profession = Profession::Student;
                roll_personality(&mut citizen, rng);
                if let Some(slot) = state.slots.schools.take(id) {
                    citizen.job_tile = Some(slot.tile);
                    citizen.schedule = Some(DailySchedule::student());
                }
                members.push(id);
                state.citizens.insert(id, citizen);
            }

            state.commit_household(Household {
                id: household,
                home_tile: tile,
                members,
                address,
            });
        }

        info!(
            citizens = state.citizens.len(),
            households = state.households.len(),
            open_jobs = state.slots.jobs.remaining(),
            open_school_places = state.slots.schools.remaining(),
            "Bootstrapped population"
        );
        state
    }

    /// Rebuild the city from persisted persona records.
    ///
    /// Records are grouped by household tag. A household whose records
    /// disagree on id or home tile, or whose tile lies outside the map, is
    /// skipped with a warning, as are nameless or duplicate citizens.
    pub fn from_records<R: Rng + ?Sized>(
        grid: Arc<CityGrid>,
        config: &PopulationConfig,
        records: Vec<PersonaRecord>,
        rng: &mut R,
    ) -> Self {
        let slots = SlotAllocator::build(&grid, rng);
        let mut state = Self::empty(Arc::clone(&grid), config.clone(), slots);

        let mut grouped: BTreeMap<String, Vec<Citizen>> = BTreeMap::new();
        for record in records {
            if record.citizen.name.trim().is_empty() {
                warn!(citizen = %record.citizen.id, "Skipping persona record without a name");
                continue;
            }
            grouped.entry(record.household_tag).or_default().push(record.citizen);
        }

        let mut skipped = 0usize;
        for (tag, mut members) in grouped {
            members.sort_by_key(|c| c.id);
            if let Err(reason) = state.check_household_group(&members) {
                warn!(household_tag = %tag, %reason, "Skipping inconsistent household");
                skipped += 1;
                continue;
            }
            let (household, home_tile) = (members[0].household, members[0].home_tile);

            let mut ids = Vec::with_capacity(members.len());
            for citizen in members {
                let id = citizen.id;
                if let Some(tile) = citizen.job_tile {
                    let slot = Slot {
                        tile,
                        profession: citizen.profession,
                    };
                    match citizen.employment {
                        EmploymentStatus::Employed => state.slots.jobs.restore(slot, id),
                        EmploymentStatus::Student => state.slots.schools.restore(slot, id),
                        EmploymentStatus::Unemployed | EmploymentStatus::Retired => {}
                    }
                }
                for memory in citizen.memories.iter().filter(|m| m.has_tag("birth")) {
                    let date = memory.timestamp.date();
                    let last = state.last_birth.entry(household).or_insert(date);
                    *last = (*last).max(date);
                }
                state.next_citizen = state.next_citizen.max(id.0 + 1);
                ids.push(id);
                state.citizens.insert(id, citizen);
            }

            state.note_address(&tag);
            state.next_household = state.next_household.max(household.0 + 1);
            state.commit_household(Household {
                id: household,
                home_tile,
                members: ids,
                address: tag,
            });
        }

        info!(
            citizens = state.citizens.len(),
            households = state.households.len(),
            skipped_households = skipped,
            "Reconstructed population from persona records"
        );
        state
    }

    fn check_household_group(&self, members: &[Citizen]) -> std::result::Result<(), String> {
        let Some(first) = members.first() else {
            return Err("no members".into());
        };
        if !self.grid.is_within(first.home_tile) {
            return Err(format!("home tile {} is outside the map", first.home_tile));
        }
        if self.households.contains_key(&first.household) {
            return Err(format!("household id {} already in use", first.household));
        }
        for citizen in members {
            if citizen.household != first.household || citizen.home_tile != first.home_tile {
                return Err(format!("citizen {} disagrees on household or home tile", citizen.id));
            }
            if self.citizens.contains_key(&citizen.id) {
                return Err(format!("citizen id {} appears twice", citizen.id));
            }
        }
        if members.windows(2).any(|w| w[0].id == w[1].id) {
            return Err("duplicate citizen id within household".into());
        }
        Ok(())
    }

    /// Set the length of the recent-births log.
    pub fn set_recent_births_cap(&mut self, cap: usize) {
        self.recent_births_cap = cap.max(1);
        while self.recent_births.len() > self.recent_births_cap {
            self.recent_births.pop_front();
        }
    }

    fn allocate_citizen_id(&mut self) -> CitizenId {
        let id = CitizenId(self.next_citizen);
        self.next_citizen += 1;
        id
    }

    fn allocate_address(&mut self, tile: TilePos) -> String {
        let zone = self.grid.zone_label(tile);
        let seq = self.zone_counters.entry(zone).or_insert(0);
        let address = format!("{zone}-{seq:03}");
        *seq += 1;
        address
    }

    fn note_address(&mut self, address: &str) {
        let mut parts = address.splitn(2, '-');
        let zone = parts.next().and_then(|z| z.chars().next());
        let seq = parts.next().and_then(|s| s.parse::<u32>().ok());
        if let (Some(zone), Some(seq)) = (zone, seq) {
            let counter = self.zone_counters.entry(zone).or_insert(0);
            *counter = (*counter).max(seq + 1);
        }
    }

    fn commit_household(&mut self, household: Household) {
        self.households_by_tile
            .entry(household.home_tile)
            .or_default()
            .push(household.id);
        self.next_household = self.next_household.max(household.id.0 + 1);
        self.households.insert(household.id, household);
    }

    // -----------------------------------------------------------------------
    // Births
    // -----------------------------------------------------------------------

    /// The prospective parents of a household: the lowest-id adult man and
    /// the lowest-id adult woman.
    ///
    /// # Errors
    /// `HouseholdNotFound`, or `BirthIneligible` when a parent is missing.
    pub fn prospective_parents(&self, household: HouseholdId) -> Result<(CitizenId, CitizenId)> {
        let home = self
            .households
            .get(&household)
            .ok_or(CivicError::HouseholdNotFound(household))?;
        let adult_of = |gender: Gender| {
            home.members
                .iter()
                .filter_map(|id| self.citizens.get(id))
                .filter(|c| c.is_adult() && c.gender == gender)
                .map(|c| c.id)
                .min()
        };
        match (adult_of(Gender::Male), adult_of(Gender::Female)) {
            (Some(father), Some(mother)) => Ok((father, mother)),
            _ => Err(CivicError::BirthIneligible {
                household,
                reason: "needs an adult man and an adult woman".into(),
            }),
        }
    }

    /// Check every birth precondition for `household` on `date`.
    ///
    /// # Errors
    /// Returns why the household cannot have a child today.
    pub fn check_birth(
        &self,
        household: HouseholdId,
        date: NaiveDate,
        cooldown_days: i64,
    ) -> Result<(CitizenId, CitizenId)> {
        let parents = self.prospective_parents(household)?;
        if let Some(last) = self.last_birth.get(&household) {
            let elapsed = (date - *last).num_days();
            if elapsed < cooldown_days {
                return Err(CivicError::BirthIneligible {
                    household,
                    reason: format!("last birth {elapsed} days ago"),
                });
            }
        }
        let home_tile = self.households[&household].home_tile;
        let occupants = self.residential_occupancy(home_tile);
        if occupants >= self.config.residential_capacity {
            return Err(CivicError::BirthIneligible {
                household,
                reason: format!("home tile full ({occupants}/{})", self.config.residential_capacity),
            });
        }
        Ok(parents)
    }

    /// Whether `household` may have a child on `date`.
    #[must_use]
    pub fn is_birth_eligible(&self, household: HouseholdId, date: NaiveDate, cooldown_days: i64) -> bool {
        self.check_birth(household, date, cooldown_days).is_ok()
    }

    /// Add a newborn described by `persona` to `household`.
    ///
    /// Preconditions are re-checked here, so a plan made earlier can be
    /// applied safely after the state moved on.
    ///
    /// # Errors
    /// Returns the failed precondition; nothing is mutated in that case.
    pub fn register_birth(
        &mut self,
        household: HouseholdId,
        persona: &Persona,
        now: NaiveDateTime,
        rules: &EventsConfig,
    ) -> Result<CitizenId> {
        let (father, mother) = self.check_birth(household, now.date(), rules.birth_cooldown_days)?;
        if let Err(reason) = persona.validate() {
            return Err(CivicError::BirthIneligible { household, reason });
        }

        let (home_tile, address) = {
            let home = &self.households[&household];
            (home.home_tile, home.address.clone())
        };
        let father_name = self.citizens[&father].name.clone();
        let mother_name = self.citizens[&mother].name.clone();

        let id = self.allocate_citizen_id();
        let mut child = new_citizen(id, persona.gender, persona.age_group, household, home_tile, &address);
        child.name = full_child_name(&persona.name, &father_name);
        child.employment = EmploymentStatus::Student;
        child.profession = Profession::Student;
        child.temperament.clone_from(&persona.temperament);
        child.values.clone_from(&persona.values);
        child.traits.insert(SUMMARY_TRAIT.to_string(), persona.summary.clone());
        if let Some(slot) = self.slots.schools.reserve(id) {
            child.job_tile = Some(slot.tile);
            child.schedule = Some(DailySchedule::student());
        }

        let strength = rules.birth_relationship_strength;
        child.relationships = vec![
            Relationship::new(father, RelationshipKind::Parent, strength),
            Relationship::new(mother, RelationshipKind::Parent, strength),
        ];
        child.memories.push(MemoryRecord::durable(
            now,
            format!("Born at {address} to {father_name} and {mother_name}"),
            Severity::High,
            &["birth", "family"],
        ));

        let child_name = child.name.clone();
        for parent in [father, mother] {
            if let Some(p) = self.citizens.get_mut(&parent) {
                p.relationships
                    .push(Relationship::new(id, RelationshipKind::Child, strength));
                p.memories.push(MemoryRecord::durable(
                    now,
                    format!("Welcomed {child_name} into the family"),
                    Severity::High,
                    &["birth", "family"],
                ));
            }
        }

        self.citizens.insert(id, child);
        if let Some(home) = self.households.get_mut(&household) {
            home.members.push(id);
        }
        self.last_birth.insert(household, now.date());
        self.recent_births.push_back(persona.summary.clone());
        while self.recent_births.len() > self.recent_births_cap {
            self.recent_births.pop_front();
        }

        info!(citizen = %id, %household, name = %child_name, "Citizen born");
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Memories & social updates
    // -----------------------------------------------------------------------

    /// Drop every expired memory across the population.
    pub fn prune_memories(&mut self, today: NaiveDate) -> usize {
        let removed: usize = self
            .citizens
            .values_mut()
            .map(|c| memory::prune_expired(&mut c.memories, today))
            .sum();
        if removed > 0 {
            debug!(removed, %today, "Pruned expired memories");
        }
        removed
    }

    /// Append an identical memory to every citizen. O(population).
    pub fn broadcast(&mut self, memory: &MemoryRecord) {
        for citizen in self.citizens.values_mut() {
            citizen.memories.push(memory.clone());
        }
    }

    /// Apply the outcome of a finished conversation: strengthen every
    /// participant pair by `increment` and give each participant `summary`
    /// as a durable memory. Unknown participants are skipped.
    pub fn apply_social_update(
        &mut self,
        participants: &[CitizenId],
        summary: &str,
        at: NaiveDateTime,
        increment: f32,
    ) {
        for &id in participants {
            let Some(citizen) = self.citizens.get_mut(&id) else {
                warn!(citizen = %id, "Conversation participant no longer exists");
                continue;
            };
            for &other in participants.iter().filter(|o| **o != id) {
                citizen.strengthen_bond(other, increment);
            }
            citizen
                .memories
                .push(MemoryRecord::durable(at, summary, Severity::Low, &["conversation"]));
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The grid this population lives on.
    #[must_use]
    pub fn grid(&self) -> &CityGrid {
        &self.grid
    }

    /// Look up a citizen.
    #[must_use]
    pub fn citizen(&self, id: CitizenId) -> Option<&Citizen> {
        self.citizens.get(&id)
    }

    /// Look up a household.
    #[must_use]
    pub fn household(&self, id: HouseholdId) -> Option<&Household> {
        self.households.get(&id)
    }

    /// All citizens, ascending by id.
    pub fn citizens(&self) -> impl Iterator<Item = &Citizen> + '_ {
        self.citizens.values()
    }

    /// All households, ascending by id.
    pub fn households(&self) -> impl Iterator<Item = &Household> + '_ {
        self.households.values()
    }

    /// Households living on `tile`.
    pub fn households_on(&self, tile: TilePos) -> impl Iterator<Item = &Household> + '_ {
        self.households_by_tile
            .get(&tile)
            .into_iter()
            .flatten()
            .filter_map(|id| self.households.get(id))
    }

    /// Occupants of a residential tile across all its households.
    #[must_use]
    pub fn residential_occupancy(&self, tile: TilePos) -> usize {
        self.households_on(tile).map(|h| h.members.len()).sum()
    }

    /// Residential capacity per tile.
    #[must_use]
    pub fn residential_capacity(&self) -> usize {
        self.config.residential_capacity
    }

    /// Job slot pool.
    #[must_use]
    pub fn jobs(&self) -> &SlotPool {
        &self.slots.jobs
    }

    /// School slot pool.
    #[must_use]
    pub fn schools(&self) -> &SlotPool {
        &self.slots.schools
    }

    /// Number of citizens.
    #[must_use]
    pub fn population_count(&self) -> usize {
        self.citizens.len()
    }

    /// Number of households.
    #[must_use]
    pub fn households_count(&self) -> usize {
        self.households.len()
    }

    /// Id the next citizen will receive.
    #[must_use]
    pub fn next_citizen_id(&self) -> CitizenId {
        CitizenId(self.next_citizen)
    }

    /// Citizens per employment status (every status present, possibly zero).
    #[must_use]
    pub fn employment_breakdown(&self) -> BTreeMap<EmploymentStatus, usize> {
        let mut counts: BTreeMap<EmploymentStatus, usize> =
            EmploymentStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for citizen in self.citizens.values() {
            *counts.entry(citizen.employment).or_insert(0) += 1;
        }
        counts
    }

    /// Date of the household's most recent birth.
    #[must_use]
    pub fn last_birth(&self, household: HouseholdId) -> Option<NaiveDate> {
        self.last_birth.get(&household).copied()
    }

    /// Recent birth narratives, oldest first.
    #[must_use]
    pub fn recent_births(&self) -> Vec<String> {
        self.recent_births.iter().cloned().collect()
    }

    /// Snapshot every citizen as a persona record.
    #[must_use]
    pub fn persona_records(&self) -> Vec<PersonaRecord> {
        self.citizens
            .values()
            .map(|citizen| PersonaRecord {
                household_tag: self
                    .households
                    .get(&citizen.household)
                    .map_or_else(|| citizen.address.clone(), |h| h.address.clone()),
                citizen: citizen.clone(),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct NameCycle {
    male: usize,
    female: usize,
    last_gender: Option<Gender>,
}

impl NameCycle {
    fn next_gender(&mut self) -> Gender {
        let gender = self.last_gender.map_or(Gender::Male, Gender::other);
        self.last_gender = Some(gender);
        gender
    }

    fn next_name(&mut self, gender: Gender) -> &'static str {
        match gender {
            Gender::Male => {
                let name = MALE_NAMES[self.male % MALE_NAMES.len()];
                self.male += 1;
                name
            }
            Gender::Female => {
                let name = FEMALE_NAMES[self.female % FEMALE_NAMES.len()];
                self.female += 1;
                name
            }
        }
    }
}

fn new_citizen(
    id: CitizenId,
    gender: Gender,
    age_group: AgeGroup,
    household: HouseholdId,
    home_tile: TilePos,
    address: &str,
) -> Citizen {
    Citizen {
        id,
        name: String::new(),
        gender,
        age_group,
        employment: EmploymentStatus::Unemployed,
        profession: Profession::None,
        household,
        home_tile,
        address: address.to_string(),
        job_tile: None,
        schedule: None,
        temperament: String::new(),
        values: Vec::new(),
        relationships: Vec::new(),
        memories: Vec::new(),
        traits: BTreeMap::new(),
    }
}

fn roll_personality<R: Rng + ?Sized>(citizen: &mut Citizen, rng: &mut R) {
    citizen.temperament = TEMPERAMENTS.choose(rng).copied().unwrap_or_default().to_string();
    let count = rng.gen_range(2..=3);
    citizen.values = VALUES
        .choose_multiple(rng, count)
        .map(|v| (*v).to_string())
        .collect();
}

/// Given names from the narrator get the father's surname.
fn full_child_name(given: &str, father: &str) -> String {
    let given = given.trim();
    if given.contains(char::is_whitespace) {
        return given.to_string();
    }
    match father.rsplit_once(' ') {
        Some((_, surname)) => format!("{given} {surname}"),
        None => given.to_string(),
    }
}
