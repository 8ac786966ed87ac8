//! # civic-sim: Headless Host for CIVIC
//!
//! Glue between `civic-core` and the outside world:
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │                civic-sim                  │
//! │  ┌──────────┐  ┌──────────┐  ┌─────────┐ │
//! │  │  Driver  │─▶│  Agents  │  │Dashboard│ │
//! │  └────┬─────┘  └──────────┘  └─────────┘ │
//! │       ▼                                   │
//! │  ┌──────────────────┐  ┌───────────────┐ │
//! │  │    civic-core    │◀─│ LlmNarrator   │ │
//! │  └──────────────────┘  │ (civic-llm)   │ │
//! │                        └───────────────┘ │
//! └──────────────────────────────────────────┘
//! ```
//!
//! - `narrator`: the core narrator boundary over a language model
//! - `agents`: commuter agents walking the road network
//! - `dashboard`: `dashboard_data.json` feed
//! - `driver`: the frame loop tying them together

#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod agents;
pub mod dashboard;
pub mod driver;
pub mod narrator;

pub use agents::{AgentField, CommuterAgent};
pub use dashboard::DashboardWriter;
pub use driver::{Driver, RunOptions, RunStats};
pub use narrator::LlmNarrator;
