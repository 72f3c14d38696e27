//! Weekly timetable generation for schools.
//!
//! Assigns every (subject, class) lesson a qualified teacher, a room of the
//! right type (lab for practical subjects, classroom otherwise) and a time
//! slot, so that no class, teacher or room is booked twice in one slot.
//!
//! The pipeline for one request:
//!
//! 1. [`model::ModelBuilder`] validates the [`EntitySnapshot`] and turns it
//!    into a boolean candidate model with coverage and capacity constraints.
//! 2. A [`solver::SolverEngine`] searches the model within a budget.
//! 3. [`extract`] turns the chosen candidates into ordered [`TimetableEntry`]
//!    records.
//!
//! All randomness flows through one [`seed::SeedController`], so a seed
//! reproduces a timetable exactly.

pub mod data;
pub mod error;
pub mod extract;
pub mod model;
pub mod seed;
pub mod server;
pub mod solver;

pub use data::{
    EngineKind, EntitySnapshot, GenerationConfig, Schedule, TimeBudget, Timetable, TimetableEntry,
};
pub use error::ScheduleError;

use log::info;
use model::ModelBuilder;
use seed::SeedController;
use solver::{CancelToken, SolveLimits, engine_for};
use std::time::Instant;

/// Generates a timetable for `snapshot`.
///
/// Validation and construction-time infeasibility are errors. An infeasible
/// or budget-limited search is an ordinary [`Timetable::NoFeasibleSchedule`].
pub fn generate(
    snapshot: &EntitySnapshot,
    config: &GenerationConfig,
) -> Result<Timetable, ScheduleError> {
    generate_with_cancel(snapshot, config, None)
}

/// Like [`generate`], but stops early once `cancel` is triggered.
pub fn generate_with_cancel(
    snapshot: &EntitySnapshot,
    config: &GenerationConfig,
    cancel: Option<CancelToken>,
) -> Result<Timetable, ScheduleError> {
    let start_time = Instant::now();
    let mut seeds = SeedController::new(config.seed);
    info!("Generating timetable with seed {}", seeds.seed());

    let model = ModelBuilder::new(snapshot, config).build(&mut seeds)?;
    let limits = SolveLimits::from_budget(&config.time_budget, start_time).with_cancel(cancel);
    let engine = engine_for(config);
    let outcome = engine.solve(&model, &mut seeds, &limits);

    let timetable = extract::into_timetable(&model, &outcome, seeds.seed(), config.best_effort);
    let stats = timetable.stats();
    info!(
        "Timetable generation by {} finished with {} entries (solved: {}) after {} steps, {} backtracks in {:.2?}",
        engine.name(),
        timetable.entries().len(),
        timetable.is_solved(),
        stats.steps,
        stats.backtracks,
        start_time.elapsed()
    );
    Ok(timetable)
}
