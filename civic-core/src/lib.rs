//! # CIVIC Core Library
//!
//! Headless simulation of a small tile-based city: citizens living in
//! households, holding jobs or school places, following daily schedules, and
//! producing emergent social behaviour.
//!
//! - **Clock**: accelerated simulated calendar
//! - **Grid**: tile map, zones, road queries
//! - **Population**: citizens, households, job and school slots, births
//! - **Schedule**: per-citizen daily stage and mobility events
//! - **Events**: daily births, random city events, memory broadcast
//! - **Conversation**: proximity-triggered dialogues on a bounded worker pool
//! - **Narrator**: the boundary to an optional language model, with a
//!   deterministic fallback
//! - **Persistence**: `SQLite` persona snapshot and event log
//!
//! ## Threading
//!
//! The tick thread and the conversation workers share one
//! `Arc<Mutex<CityState>>`. Persona snapshots are written while the city
//! lock is held, so the store lock is always taken after the city lock and
//! the last snapshot written reflects the latest population.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod citizen;
pub mod clock;
pub mod config;
pub mod conversation;
pub mod error;
pub mod events;
pub mod grid;
pub mod memory;
pub mod narrator;
pub mod persistence;
pub mod population;
pub mod report;
pub mod schedule;
pub mod simulation;
pub mod slots;
pub mod worker;

pub use citizen::{AgeGroup, Citizen, CitizenId, EmploymentStatus, Gender, Household, HouseholdId, Profession};
pub use clock::SimulationClock;
pub use config::CivicConfig;
pub use error::{CivicError, Result};
pub use grid::{CityGrid, TileKind, TilePos};
pub use narrator::{FallbackNarrator, Narrator};
pub use population::{CityState, PersonaRecord};
pub use schedule::{DailyStage, MobilityEvent};
pub use simulation::Simulation;
