//! Solver engines over a [`TimetableModel`].
//!
//! Two engines share one contract:
//!
//! - [`BacktrackingSolver`]: propagation plus depth-first binary branching,
//!   most-constrained requirement first, seeded tie-breaks. Honours step,
//!   deadline and cancellation limits and returns the best clash-free partial
//!   assignment when it stops early.
//! - [`IlpSolver`]: the same model handed to an integer program through
//!   `good_lp`, with the remaining deadline as the solver's time limit.

mod backtrack;
mod ilp;

pub use backtrack::BacktrackingSolver;
pub use ilp::IlpSolver;

use crate::data::{EngineKind, GenerationConfig, TimeBudget};
use crate::model::TimetableModel;
use crate::seed::SeedController;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Lifecycle of one search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Unsolved,
    Propagating,
    Branching,
    Solved,
    Infeasible,
    TimedOut,
    Failed,
}

/// Terminal states of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Solved,
    Infeasible,
    TimedOut,
    /// The engine itself reported an error; nothing is known about the model.
    Failed,
}

impl From<SolveStatus> for SearchState {
    fn from(status: SolveStatus) -> Self {
        match status {
            SolveStatus::Solved => SearchState::Solved,
            SolveStatus::Infeasible => SearchState::Infeasible,
            SolveStatus::TimedOut => SearchState::TimedOut,
            SolveStatus::Failed => SearchState::Failed,
        }
    }
}

/// Result of running an engine on a model.
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    /// Candidates fixed to true. Complete when `Solved`, otherwise the best
    /// clash-free partial assignment seen.
    pub chosen: Vec<usize>,
    pub steps: u64,
    pub backtracks: u64,
    pub elapsed: Duration,
    /// Engine error message when `status` is `Failed`.
    pub failure: Option<String>,
}

/// Shared flag a caller can set to stop a running search.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Effort bounds checked by the engines while searching.
#[derive(Debug, Clone, Default)]
pub struct SolveLimits {
    pub max_steps: Option<u64>,
    pub deadline: Option<Instant>,
    pub cancel: Option<CancelToken>,
}

impl SolveLimits {
    /// Limits for a budget whose clock started at `start`.
    pub fn from_budget(budget: &TimeBudget, start: Instant) -> Self {
        Self {
            max_steps: budget.max_steps,
            deadline: budget
                .time_limit_ms
                .map(|ms| start + Duration::from_millis(ms)),
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: Option<CancelToken>) -> Self {
        self.cancel = cancel;
        self
    }

    /// True once any bound has been reached.
    pub fn exceeded(&self, steps: u64) -> bool {
        if self.max_steps.is_some_and(|max| steps >= max) {
            return true;
        }
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return true;
        }
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// A search procedure over the timetable model.
pub trait SolverEngine {
    fn name(&self) -> &'static str;

    fn solve(
        &self,
        model: &TimetableModel<'_>,
        seeds: &mut SeedController,
        limits: &SolveLimits,
    ) -> SolveOutcome;
}

/// The engine selected by the configuration.
pub fn engine_for(config: &GenerationConfig) -> Box<dyn SolverEngine + Send> {
    match config.engine {
        EngineKind::Backtracking => Box::new(BacktrackingSolver::new()),
        EngineKind::Ilp => Box::new(IlpSolver::new(config.best_effort)),
    }
}
