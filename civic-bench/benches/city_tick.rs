//! Per-frame hot paths of the simulation.
//!
//! Rough targets on the default 42x32 map:
//!   stage_update_full_population ... < 50us
//!   memory_prune_full_population ... < 100us
//!   full_frame ..................... < 1ms

use std::hint::black_box;
use std::sync::Arc;

use chrono::NaiveDate;
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;

use civic_core::config::{CivicConfig, PopulationConfig};
use civic_core::grid::CityGrid;
use civic_core::narrator::FallbackNarrator;
use civic_core::population::CityState;
use civic_core::schedule::StageScheduler;
use civic_core::slots::SlotAllocator;
use civic_core::Simulation;
use civic_sim::Driver;

fn city() -> CityState {
    let grid = Arc::new(CityGrid::generate(42, 32));
    let mut rng = StdRng::seed_from_u64(7);
    CityState::bootstrap(grid, &PopulationConfig::default(), &mut rng)
}

fn bench_grid_generation(c: &mut Criterion) {
    c.bench_function("grid_generate_42x32", |b| {
        b.iter(|| black_box(CityGrid::generate(black_box(42), black_box(32))));
    });
}

fn bench_slot_build(c: &mut Criterion) {
    let grid = CityGrid::generate(42, 32);
    c.bench_function("slot_allocator_build", |b| {
        b.iter(|| {
            let mut rng = StdRng::seed_from_u64(11);
            black_box(SlotAllocator::build(black_box(&grid), &mut rng))
        });
    });
}

fn bench_bootstrap(c: &mut Criterion) {
    c.bench_function("bootstrap_population", |b| b.iter(|| black_box(city())));
}

fn bench_stage_update(c: &mut Criterion) {
    let state = city();
    let mut scheduler = StageScheduler::new();
    let mut minute = 0_u32;
    c.bench_function("stage_update_full_population", |b| {
        b.iter(|| {
            minute = (minute + 7) % 1440;
            black_box(scheduler.update(state.citizens(), black_box(minute)))
        });
    });
}

fn bench_memory_prune(c: &mut Criterion) {
    let state = city();
    let today = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap_or_default();
    c.bench_function("memory_prune_full_population", |b| {
        b.iter_batched(
            || state.clone(),
            |mut s| black_box(s.prune_memories(today)),
            BatchSize::SmallInput,
        );
    });
}

fn bench_full_frame(c: &mut Criterion) {
    let mut config = CivicConfig::default();
    config.clock.start_minutes = 7 * 60 + 30;
    config.conversation.pacing_ms = 0;
    let sim = Simulation::from_config(config, Arc::new(FallbackNarrator)).unwrap_or_else(|e| panic!("{e}"));
    let mut driver = Driver::new(sim, None);
    c.bench_function("full_frame", |b| b.iter(|| black_box(driver.frame(1.0 / 60.0))));
}

criterion_group!(
    benches,
    bench_grid_generation,
    bench_slot_build,
    bench_bootstrap,
    bench_stage_update,
    bench_memory_prune,
    bench_full_frame,
);
criterion_main!(benches);
