//! Daily schedules and the stage scheduler.
//!
//! Each tick, every citizen's [`DailyStage`] is recomputed from its schedule
//! and the minute of day. Only a *change* of stage produces a
//! [`MobilityEvent`]; repeated updates at an unchanged time are silent.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::citizen::{Citizen, CitizenId, Profession};
use crate::clock::MINUTES_PER_DAY;

/// Four minute-of-day thresholds driving a citizen's routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DailySchedule {
    /// Leave home.
    pub commute_to_work_start: u32,
    /// Arrive at work or school.
    pub work_start: u32,
    /// Leave work.
    pub work_end: u32,
    /// Arrive home.
    pub commute_home_end: u32,
}

impl DailySchedule {
    /// Build a schedule from minute-of-day thresholds.
    #[must_use]
    pub const fn from_minutes(commute_to_work_start: u32, work_start: u32, work_end: u32, commute_home_end: u32) -> Self {
        Self {
            commute_to_work_start,
            work_start,
            work_end,
            commute_home_end,
        }
    }

    /// Default schedule for a profession. `None` has no routine.
    #[must_use]
    pub fn for_profession(profession: Profession) -> Option<Self> {
        let schedule = match profession {
            Profession::Office => Self::from_minutes(7 * 60 + 30, 9 * 60, 17 * 60, 18 * 60),
            Profession::Retail => Self::from_minutes(9 * 60, 10 * 60, 19 * 60, 20 * 60),
            Profession::Industrial => Self::from_minutes(5 * 60 + 30, 6 * 60 + 30, 15 * 60, 16 * 60),
            Profession::Service => Self::from_minutes(7 * 60 + 30, 8 * 60, 18 * 60, 19 * 60),
            Profession::Student => Self::student(),
            Profession::None => return None,
        };
        Some(schedule)
    }

    /// School-day schedule.
    #[must_use]
    pub const fn student() -> Self {
        Self::from_minutes(7 * 60 + 15, 8 * 60, 15 * 60, 16 * 60)
    }

    /// Stage at `minute` (wrapped into the day).
    #[must_use]
    pub fn stage_at(&self, minute: u32) -> DailyStage {
        let minute = minute % MINUTES_PER_DAY;
        if minute < self.commute_to_work_start {
            DailyStage::Home
        } else if minute < self.work_start {
            DailyStage::CommuteToWork
        } else if minute < self.work_end {
            DailyStage::Work
        } else if minute < self.commute_home_end {
            DailyStage::CommuteHome
        } else {
            DailyStage::OffDuty
        }
    }
}

/// Phase of a citizen's day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DailyStage {
    /// At home.
    Home,
    /// Travelling to work or school.
    CommuteToWork,
    /// At work or school.
    Work,
    /// Travelling home.
    CommuteHome,
    /// Evening, back home.
    OffDuty,
}

impl DailyStage {
    /// Commute stages are the only ones with a visible mobile agent.
    #[must_use]
    pub fn is_commute(self) -> bool {
        matches!(self, Self::CommuteToWork | Self::CommuteHome)
    }

    /// Lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::CommuteToWork => "commute_to_work",
            Self::Work => "work",
            Self::CommuteHome => "commute_home",
            Self::OffDuty => "off_duty",
        }
    }
}

/// Classify a citizen's stage. No schedule means always at home.
#[must_use]
pub fn classify(schedule: Option<&DailySchedule>, minute: u32) -> DailyStage {
    schedule.map_or(DailyStage::Home, |s| s.stage_at(minute))
}

/// Side effect requested from the movement collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MobilityEvent {
    /// Create a mobile agent for a citizen entering a commute.
    Spawn {
        /// The commuting citizen.
        citizen: CitizenId,
        /// The commute stage entered.
        stage: DailyStage,
    },
    /// Switch an existing agent to another commute stage.
    Reposition {
        /// The commuting citizen.
        citizen: CitizenId,
        /// The new commute stage.
        stage: DailyStage,
    },
    /// Remove the mobile agent.
    Despawn {
        /// The citizen who stopped commuting.
        citizen: CitizenId,
    },
}

/// Remembers each citizen's last stage and who is currently mobile.
#[derive(Debug, Clone, Default)]
pub struct StageScheduler {
    stages: BTreeMap<CitizenId, DailyStage>,
    mobile: BTreeSet<CitizenId>,
}

impl StageScheduler {
    /// Create an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute every citizen's stage at `minute`, returning the side
    /// effects for citizens whose stage changed.
    ///
    /// Citizens seen for the first time start from `Home`, so a citizen
    /// created mid-commute spawns on the next update.
    pub fn update<'a>(&mut self, citizens: impl IntoIterator<Item = &'a Citizen>, minute: u32) -> Vec<MobilityEvent> {
        let mut events = Vec::new();
        for citizen in citizens {
            let stage = classify(citizen.schedule.as_ref(), minute);
            let previous = self.stages.insert(citizen.id, stage).unwrap_or(DailyStage::Home);
            if previous == stage {
                continue;
            }

            if stage.is_commute() {
                if self.mobile.insert(citizen.id) {
                    events.push(MobilityEvent::Spawn {
                        citizen: citizen.id,
                        stage,
                    });
                } else {
                    events.push(MobilityEvent::Reposition {
                        citizen: citizen.id,
                        stage,
                    });
                }
            } else if self.mobile.remove(&citizen.id) {
                events.push(MobilityEvent::Despawn { citizen: citizen.id });
            }
        }
        events
    }

    /// Last computed stage of a citizen (`Home` if never seen).
    #[must_use]
    pub fn stage_of(&self, citizen: CitizenId) -> DailyStage {
        self.stages.get(&citizen).copied().unwrap_or(DailyStage::Home)
    }

    /// Whether the citizen currently has a mobile agent.
    #[must_use]
    pub fn is_mobile(&self, citizen: CitizenId) -> bool {
        self.mobile.contains(&citizen)
    }

    /// Currently mobile citizens, ascending by id.
    pub fn mobile(&self) -> impl Iterator<Item = CitizenId> + '_ {
        self.mobile.iter().copied()
    }

    /// Number of mobile citizens.
    #[must_use]
    pub fn mobile_count(&self) -> usize {
        self.mobile.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citizen::{AgeGroup, EmploymentStatus, Gender, HouseholdId};
    use crate::grid::TilePos;

    fn office_worker(id: u64) -> Citizen {
        Citizen {
            id: CitizenId(id),
            name: format!("Worker {id}"),
            gender: Gender::Male,
            age_group: AgeGroup::Adult,
            employment: EmploymentStatus::Employed,
            profession: Profession::Office,
            household: HouseholdId(1),
            home_tile: TilePos::new(0, 0),
            address: "A-000".into(),
            job_tile: Some(TilePos::new(5, 5)),
            schedule: DailySchedule::for_profession(Profession::Office),
            temperament: String::new(),
            values: Vec::new(),
            relationships: Vec::new(),
            memories: Vec::new(),
            traits: std::collections::BTreeMap::new(),
        }
    }

    #[test]
    fn half_open_thresholds() {
        let schedule = DailySchedule::from_minutes(450, 540, 1020, 1080);
        assert_eq!(schedule.stage_at(449), DailyStage::Home);
        assert_eq!(schedule.stage_at(450), DailyStage::CommuteToWork);
        assert_eq!(schedule.stage_at(539), DailyStage::CommuteToWork);
        assert_eq!(schedule.stage_at(540), DailyStage::Work);
        assert_eq!(schedule.stage_at(1079), DailyStage::CommuteHome);
        assert_eq!(schedule.stage_at(1080), DailyStage::OffDuty);
        // Wraps past midnight.
        assert_eq!(schedule.stage_at(1440 + 449), DailyStage::Home);
    }

    #[test]
    fn no_schedule_is_always_home() {
        for minute in [0, 450, 900, 1439] {
            assert_eq!(classify(None, minute), DailyStage::Home);
        }
        assert!(DailySchedule::for_profession(Profession::None).is_none());
    }

    #[test]
    fn transitions_emit_spawn_reposition_despawn() {
        let citizens = vec![office_worker(1)];
        let mut scheduler = StageScheduler::new();

        assert!(scheduler.update(&citizens, 400).is_empty());
        assert_eq!(
            scheduler.update(&citizens, 450),
            vec![MobilityEvent::Spawn {
                citizen: CitizenId(1),
                stage: DailyStage::CommuteToWork
            }]
        );
        assert_eq!(
            scheduler.update(&citizens, 540),
            vec![MobilityEvent::Despawn { citizen: CitizenId(1) }]
        );
        assert_eq!(
            scheduler.update(&citizens, 1020),
            vec![MobilityEvent::Spawn {
                citizen: CitizenId(1),
                stage: DailyStage::CommuteHome
            }]
        );
        assert_eq!(scheduler.mobile_count(), 1);
        assert_eq!(
            scheduler.update(&citizens, 1080),
            vec![MobilityEvent::Despawn { citizen: CitizenId(1) }]
        );
    }

    #[test]
    fn commute_to_commute_repositions() {
        let mut citizen = office_worker(7);
        // Work window collapsed so the commute stages are adjacent.
        citizen.schedule = Some(DailySchedule::from_minutes(450, 540, 540, 600));
        let citizens = vec![citizen];
        let mut scheduler = StageScheduler::new();
        scheduler.update(&citizens, 500);
        assert_eq!(
            scheduler.update(&citizens, 560),
            vec![MobilityEvent::Reposition {
                citizen: CitizenId(7),
                stage: DailyStage::CommuteHome
            }]
        );
    }

    #[test]
    fn repeated_update_is_idempotent() {
        let citizens = vec![office_worker(1), office_worker(2)];
        let mut scheduler = StageScheduler::new();
        assert_eq!(scheduler.update(&citizens, 460).len(), 2);
        assert!(scheduler.update(&citizens, 460).is_empty());
        assert!(scheduler.update(&citizens, 461).is_empty());
        assert!(scheduler.is_mobile(CitizenId(2)));
    }
}
