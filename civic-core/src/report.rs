//! Read-only reporting snapshots for presentation collaborators.
//!
//! Everything here is plain serialisable data computed from a borrowed
//! [`CityState`] and [`StageScheduler`]; nothing holds references back into
//! the simulation.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::citizen::{
    AgeGroup, Citizen, CitizenId, EmploymentStatus, Gender, HouseholdId, Profession, RelationshipKind,
};
use crate::grid::{CityGrid, TileKind, TilePos};
use crate::population::CityState;
use crate::schedule::{DailyStage, StageScheduler};

// ---------------------------------------------------------------------------
// Tile report
// ---------------------------------------------------------------------------

/// A resident listed on a residential tile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OccupantListing {
    /// Citizen id.
    pub id: CitizenId,
    /// Name.
    pub name: String,
    /// Gender.
    pub gender: Gender,
    /// Age group.
    pub age_group: AgeGroup,
    /// Employment status.
    pub employment: EmploymentStatus,
}

/// A household listed on a residential tile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HouseholdListing {
    /// Household id.
    pub id: HouseholdId,
    /// Address.
    pub address: String,
    /// Member names in order.
    pub members: Vec<String>,
}

/// An employee or pupil listed on a workplace tile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeListing {
    /// Citizen id.
    pub id: CitizenId,
    /// Name.
    pub name: String,
    /// Profession.
    pub profession: Profession,
    /// Home address.
    pub address: String,
}

/// Category-specific part of a tile report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "category")]
pub enum TileDetails {
    /// Homes.
    Residential {
        /// Residential capacity.
        capacity: usize,
        /// Current occupants.
        occupant_count: usize,
        /// Households on the tile.
        households: Vec<HouseholdListing>,
        /// Every occupant.
        occupants: Vec<OccupantListing>,
    },
    /// Commercial, office or industrial tile.
    Workplace {
        /// Job capacity.
        capacity: u32,
        /// Current employees.
        occupant_count: usize,
        /// Employees in assignment order.
        employees: Vec<EmployeeListing>,
        /// School capacity, when the tile also hosts a school.
        school_capacity: u32,
        /// Pupils in assignment order.
        pupils: Vec<EmployeeListing>,
    },
    /// Park.
    Park,
    /// Plaza.
    Plaza,
    /// Water.
    Water,
    /// Road or street.
    Road,
    /// Unzoned lot.
    Building,
}

/// Everything known about one tile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileReport {
    /// Coordinate.
    pub tile: TilePos,
    /// Zone letter.
    pub zone: char,
    /// Terrain.
    pub terrain: TileKind,
    /// Category details.
    #[serde(flatten)]
    pub details: TileDetails,
}

/// Report on the tile at `tile`, or `None` outside the map.
#[must_use]
pub fn tile_report(state: &CityState, tile: TilePos) -> Option<TileReport> {
    let grid = state.grid();
    let terrain = grid.get(tile)?;
    let details = match terrain {
        TileKind::Residential => {
            let households: Vec<_> = state.households_on(tile).collect();
            let occupants: Vec<OccupantListing> = households
                .iter()
                .flat_map(|h| h.members.iter())
                .filter_map(|id| state.citizen(*id))
                .map(|c| OccupantListing {
                    id: c.id,
                    name: c.name.clone(),
                    gender: c.gender,
                    age_group: c.age_group,
                    employment: c.employment,
                })
                .collect();
            TileDetails::Residential {
                capacity: state.residential_capacity(),
                occupant_count: occupants.len(),
                households: households
                    .iter()
                    .map(|h| HouseholdListing {
                        id: h.id,
                        address: h.address.clone(),
                        members: h
                            .members
                            .iter()
                            .filter_map(|id| state.citizen(*id))
                            .map(|c| c.name.clone())
                            .collect(),
                    })
                    .collect(),
                occupants,
            }
        }
        TileKind::Commercial | TileKind::Office | TileKind::Industrial => {
            let listing = |ids: &[CitizenId]| -> Vec<EmployeeListing> {
                ids.iter()
                    .filter_map(|id| state.citizen(*id))
                    .map(|c| EmployeeListing {
                        id: c.id,
                        name: c.name.clone(),
                        profession: c.profession,
                        address: c.address.clone(),
                    })
                    .collect()
            };
            let employees = listing(state.jobs().assigned(tile));
            TileDetails::Workplace {
                capacity: state.jobs().capacity(tile),
                occupant_count: employees.len(),
                employees,
                school_capacity: state.schools().capacity(tile),
                pupils: listing(state.schools().assigned(tile)),
            }
        }
        TileKind::Park => TileDetails::Park,
        TileKind::Plaza => TileDetails::Plaza,
        TileKind::Water => TileDetails::Water,
        TileKind::MajorRoad | TileKind::Street => TileDetails::Road,
        TileKind::Building => TileDetails::Building,
    };

    Some(TileReport {
        tile,
        zone: grid.zone_label(tile),
        terrain,
        details,
    })
}

// ---------------------------------------------------------------------------
// Citizen report
// ---------------------------------------------------------------------------

/// Another member of the citizen's household.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelativeListing {
    /// Citizen id.
    pub id: CitizenId,
    /// Name.
    pub name: String,
    /// `Parent`, `Child` or `Household member`.
    pub relationship: String,
    /// Gender.
    pub gender: Gender,
    /// Age group.
    pub age_group: AgeGroup,
}

/// Full snapshot of one citizen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CitizenReport {
    /// Citizen id.
    pub id: CitizenId,
    /// Name.
    pub name: String,
    /// Gender.
    pub gender: Gender,
    /// Age group.
    pub age_group: AgeGroup,
    /// Employment status.
    pub employment: EmploymentStatus,
    /// Profession.
    pub profession: Profession,
    /// Address.
    pub address: String,
    /// Home tile.
    pub home_tile: TilePos,
    /// Job or school tile.
    pub job_tile: Option<TilePos>,
    /// Zone of the job or school tile.
    pub job_zone: Option<char>,
    /// Current stage.
    pub stage: DailyStage,
    /// Temperament.
    pub temperament: String,
    /// Value tags.
    pub values: Vec<String>,
    /// Household members other than the citizen.
    pub relatives: Vec<RelativeListing>,
    /// Number of relationship records.
    pub relationships: usize,
    /// Number of memories held.
    pub memories: usize,
}

/// Report on a single citizen.
#[must_use]
pub fn citizen_report(state: &CityState, scheduler: &StageScheduler, id: CitizenId) -> Option<CitizenReport> {
    let citizen = state.citizen(id)?;
    let relatives = state
        .household(citizen.household)
        .map(|h| {
            h.members
                .iter()
                .filter(|m| **m != id)
                .filter_map(|m| state.citizen(*m))
                .map(|relative| RelativeListing {
                    id: relative.id,
                    name: relative.name.clone(),
                    relationship: relation_label(citizen, relative.id).to_string(),
                    gender: relative.gender,
                    age_group: relative.age_group,
                })
                .collect()
        })
        .unwrap_or_default();

    Some(CitizenReport {
        id,
        name: citizen.name.clone(),
        gender: citizen.gender,
        age_group: citizen.age_group,
        employment: citizen.employment,
        profession: citizen.profession,
        address: citizen.address.clone(),
        home_tile: citizen.home_tile,
        job_tile: citizen.job_tile,
        job_zone: citizen.job_tile.map(|t| state.grid().zone_label(t)),
        stage: scheduler.stage_of(id),
        temperament: citizen.temperament.clone(),
        values: citizen.values.clone(),
        relatives,
        relationships: citizen.relationships.len(),
        memories: citizen.memories.len(),
    })
}

fn relation_label(citizen: &Citizen, other: CitizenId) -> &'static str {
    match citizen.relationship_with(other).map(|r| r.kind) {
        Some(RelationshipKind::Parent) => "Parent",
        Some(RelationshipKind::Child) => "Child",
        _ => "Household member",
    }
}

// ---------------------------------------------------------------------------
// Population summaries
// ---------------------------------------------------------------------------

/// Headline population numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PopulationSummary {
    /// Number of citizens.
    pub total: usize,
    /// Number of households.
    pub households: usize,
    /// Citizens per employment status.
    pub employment: BTreeMap<EmploymentStatus, usize>,
    /// Citizens currently commuting.
    pub mobile: usize,
}

/// Compute the population summary.
#[must_use]
pub fn population_summary(state: &CityState, scheduler: &StageScheduler) -> PopulationSummary {
    PopulationSummary {
        total: state.population_count(),
        households: state.households_count(),
        employment: state.employment_breakdown(),
        mobile: scheduler.mobile_count(),
    }
}

/// One roster row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CitizenSummary {
    /// Citizen id.
    pub id: CitizenId,
    /// Name.
    pub name: String,
    /// Gender.
    pub gender: Gender,
    /// Age group.
    pub age_group: AgeGroup,
    /// Employment status.
    pub employment: EmploymentStatus,
    /// Current stage.
    pub stage: DailyStage,
    /// Human-readable status.
    pub status: String,
    /// Human-readable location.
    pub location: String,
}

/// Roster of every citizen, ascending by id.
#[must_use]
pub fn citizen_summaries(state: &CityState, scheduler: &StageScheduler) -> Vec<CitizenSummary> {
    state
        .citizens()
        .map(|c| {
            let stage = scheduler.stage_of(c.id);
            CitizenSummary {
                id: c.id,
                name: c.name.clone(),
                gender: c.gender,
                age_group: c.age_group,
                employment: c.employment,
                stage,
                status: status_label(c, stage).to_string(),
                location: location_label(state.grid(), c, stage),
            }
        })
        .collect()
}

fn status_label(citizen: &Citizen, stage: DailyStage) -> &'static str {
    match stage {
        DailyStage::Home => "At home",
        DailyStage::CommuteToWork | DailyStage::CommuteHome => "Commuting",
        DailyStage::Work if citizen.employment == EmploymentStatus::Student => "At school",
        DailyStage::Work => "Working",
        DailyStage::OffDuty => "Off duty",
    }
}

fn location_label(grid: &CityGrid, citizen: &Citizen, stage: DailyStage) -> String {
    match (stage, citizen.job_tile) {
        (DailyStage::CommuteToWork | DailyStage::CommuteHome, _) => "Road".to_string(),
        (DailyStage::Work, Some(tile)) => grid
            .get(tile)
            .map_or_else(|| "Work".to_string(), |kind| format!("{} {}", kind.name(), grid.zone_label(tile))),
        _ => citizen.address.clone(),
    }
}

// ---------------------------------------------------------------------------
// Metric lines & dashboard
// ---------------------------------------------------------------------------

fn percent(part: usize, total: usize) -> String {
    if total == 0 {
        return "0.0%".to_string();
    }
    #[allow(clippy::cast_precision_loss)]
    let share = part as f64 * 100.0 / total as f64;
    format!("{share:.1}%")
}

/// City metric lines for the HUD and dashboard.
#[must_use]
pub fn city_metric_lines(grid: &CityGrid) -> Vec<String> {
    let total = grid.tile_count();
    let counts = grid.kind_counts();
    let count = |kinds: &[TileKind]| -> usize {
        counts
            .iter()
            .filter(|(k, _)| kinds.contains(k))
            .map(|(_, n)| *n)
            .sum()
    };

    let mut lines = vec![format!("Tiles: {total}")];
    let roads = count(&[TileKind::MajorRoad, TileKind::Street]);
    lines.push(format!("Road coverage: {roads} ({})", percent(roads, total)));
    let water = count(&[TileKind::Water]);
    lines.push(format!("Water: {water} ({})", percent(water, total)));
    let parks = count(&[TileKind::Park]);
    lines.push(format!("Parks: {parks} ({})", percent(parks, total)));
    let plazas = count(&[TileKind::Plaza]);
    if plazas > 0 {
        lines.push(format!("Plazas: {plazas} ({})", percent(plazas, total)));
    }
    for kind in [TileKind::Residential, TileKind::Commercial, TileKind::Office, TileKind::Industrial] {
        let n = count(&[kind]);
        lines.push(format!("{}: {n} ({})", kind.name(), percent(n, total)));
    }
    lines
}

/// Population metric lines for the HUD and dashboard.
#[must_use]
pub fn population_metric_lines(summary: &PopulationSummary, running: bool) -> Vec<String> {
    let total = summary.total;
    let mut lines = vec![format!("Citizens: {total}"), format!("Households: {}", summary.households)];
    if total > 0 {
        for (label, status) in [
            ("Employed", EmploymentStatus::Employed),
            ("Unemployed", EmploymentStatus::Unemployed),
            ("Students", EmploymentStatus::Student),
            ("Retired", EmploymentStatus::Retired),
        ] {
            let n = summary.employment.get(&status).copied().unwrap_or(0);
            lines.push(format!("{label}: {n} ({})", percent(n, total)));
        }
    }
    lines.push(format!("Active commuters: {}", summary.mobile));
    lines.push(format!("Simulation: {}", if running { "running" } else { "paused" }));
    lines
}

/// One citizen row in the dashboard file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardCitizen {
    /// Name.
    pub name: String,
    /// Status label.
    pub status: String,
    /// Location label.
    pub location: String,
}

/// Contents of the external dashboard's data file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSnapshot {
    /// `hh:mm AM/PM`.
    pub time_str: String,
    /// `Jan 01, 2026`.
    pub date_str: String,
    /// City metric lines.
    pub city_metrics: Vec<String>,
    /// Population metric lines.
    pub population_metrics: Vec<String>,
    /// Roster.
    pub citizens: Vec<DashboardCitizen>,
    /// Recent birth narratives and event summaries.
    pub events: Vec<String>,
}

impl From<&CitizenSummary> for DashboardCitizen {
    fn from(summary: &CitizenSummary) -> Self {
        Self {
            name: summary.name.clone(),
            status: summary.status.clone(),
            location: summary.location.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PopulationConfig;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::Arc;

    fn state() -> CityState {
        let mut rng = StdRng::seed_from_u64(21);
        CityState::bootstrap(Arc::new(CityGrid::generate(42, 32)), &PopulationConfig::default(), &mut rng)
    }

    #[test]
    fn residential_tile_lists_households() {
        let state = state();
        let citizen = state.citizens().next().expect("someone lives here");
        let report = tile_report(&state, citizen.home_tile).expect("tile on map");
        match report.details {
            TileDetails::Residential {
                capacity,
                occupant_count,
                households,
                occupants,
            } => {
                assert_eq!(capacity, 6);
                assert_eq!(occupant_count, occupants.len());
                assert!(occupants.iter().any(|o| o.id == citizen.id));
                assert!(households.iter().any(|h| h.address == citizen.address));
            }
            other => panic!("expected residential details, got {other:?}"),
        }
        assert!(tile_report(&state, TilePos::new(-1, 0)).is_none());
    }

    #[test]
    fn workplace_tile_lists_employees() {
        let state = state();
        let worker = state
            .citizens()
            .find(|c| c.employment == EmploymentStatus::Employed)
            .expect("someone is employed");
        let tile = worker.job_tile.expect("employed citizens have a job tile");
        let report = tile_report(&state, tile).expect("tile on map");
        let TileDetails::Workplace { capacity, employees, .. } = report.details else {
            panic!("expected workplace details");
        };
        assert!(employees.len() <= capacity as usize);
        assert!(employees.iter().any(|e| e.id == worker.id));
    }

    #[test]
    fn road_tiles_report_as_road() {
        let state = state();
        let report = tile_report(&state, TilePos::new(1, 1)).expect("on map");
        assert_eq!(report.details, TileDetails::Road);
        let json = serde_json::to_value(&report).expect("serialise");
        assert_eq!(json["category"], "Road");
    }

    #[test]
    fn citizen_report_lists_other_members() {
        let state = state();
        let household = state
            .households()
            .find(|h| h.members.len() > 1)
            .expect("a multi-member household");
        let first = household.members[0];
        let report = citizen_report(&state, &StageScheduler::new(), first).expect("citizen exists");
        assert_eq!(report.relatives.len(), household.members.len() - 1);
        assert!(report.relatives.iter().all(|r| r.id != first));
        assert_eq!(report.stage, DailyStage::Home);
    }

    #[test]
    fn metric_lines_follow_hud_layout() {
        let state = state();
        let summary = population_summary(&state, &StageScheduler::new());
        let lines = population_metric_lines(&summary, true);
        assert_eq!(lines[0], format!("Citizens: {}", summary.total));
        assert!(lines.iter().any(|l| l.starts_with("Employed: ")));
        assert_eq!(lines.last().map(String::as_str), Some("Simulation: running"));

        let city = city_metric_lines(state.grid());
        assert_eq!(city[0], "Tiles: 1344");
        assert!(city[1].starts_with("Road coverage: "));
    }
}
