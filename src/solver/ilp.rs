use super::{SolveLimits, SolveOutcome, SolveStatus, SolverEngine};
use crate::model::TimetableModel;
use crate::seed::SeedController;
use good_lp::variable;
use good_lp::{
    Expression, ProblemVariables, ResolutionError, Solution, SolutionStatus, SolverModel,
    Variable, WithTimeLimit, constraint, default_solver,
};
use log::{error, info, trace};
use std::time::Instant;

/// Solves the timetable model as a 0/1 integer program.
///
/// The objective maximises placed lessons; each variable carries a small
/// seeded bonus so equally good timetables are picked per seed. In
/// best-effort mode coverage becomes an upper bound, so an over-constrained
/// model still yields the largest clash-free partial timetable.
///
/// A deadline in `limits` becomes the solver's time limit. Step limits and
/// cancellation are checked before and after the solve.
#[derive(Debug, Clone, Default)]
pub struct IlpSolver {
    best_effort: bool,
}

impl IlpSolver {
    pub fn new(best_effort: bool) -> Self {
        Self { best_effort }
    }
}

impl SolverEngine for IlpSolver {
    fn name(&self) -> &'static str {
        "ilp"
    }

    fn solve(
        &self,
        model: &TimetableModel<'_>,
        seeds: &mut SeedController,
        limits: &SolveLimits,
    ) -> SolveOutcome {
        let start_time = Instant::now();
        let outcome = |status, chosen| SolveOutcome {
            status,
            chosen,
            steps: 1,
            backtracks: 0,
            elapsed: start_time.elapsed(),
            failure: None,
        };
        if limits.exceeded(0) {
            return outcome(SolveStatus::TimedOut, Vec::new());
        }
        if model.variable_count() == 0 {
            return outcome(SolveStatus::Solved, Vec::new());
        }

        info!(
            "Setting up ILP model with {} variables and {} constraints...",
            model.variable_count(),
            model.constraint_count()
        );
        let mut problem = ProblemVariables::new();
        let vars: Vec<Variable> = problem.add_vector(variable().binary(), model.variable_count());

        // bonuses sum to less than one lesson, so they only break ties
        let scale = 0.5 / (model.total_demand() as f64 + 1.0);
        let bonus = seeds.jitter(vars.len(), scale);
        let objective: Expression = vars
            .iter()
            .zip(&bonus)
            .map(|(var, b)| (1.0 + b) * *var)
            .sum();

        let mut lp = problem.maximise(objective).using(default_solver);

        for requirement in model.requirements() {
            let placed: Expression = requirement.candidates.iter().map(|&c| vars[c]).sum();
            let need = f64::from(requirement.need);
            if self.best_effort {
                lp.add_constraint(constraint!(placed <= need));
            } else {
                lp.add_constraint(constraint!(placed == need));
            }
        }
        for group in model.groups() {
            let used: Expression = group.members.iter().map(|&c| vars[c]).sum();
            let capacity = f64::from(group.capacity);
            lp.add_constraint(constraint!(used <= capacity));
        }
        trace!("Added {} ILP constraints.", model.constraint_count());

        let lp = match limits.deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                trace!("ILP time limit {:.2?}", remaining);
                lp.with_time_limit(remaining.as_secs_f64())
            }
            None => lp,
        };

        info!("Starting ILP solver...");
        let solution = match lp.solve() {
            Ok(s) => s,
            Err(e) => {
                let status = classify_error(&e, limits);
                match status {
                    SolveStatus::Infeasible => info!("ILP model is infeasible"),
                    SolveStatus::TimedOut => info!("ILP solver stopped at the time budget: {}", e),
                    _ => error!("ILP solver failed: {}", e),
                }
                return SolveOutcome {
                    failure: (status == SolveStatus::Failed).then(|| e.to_string()),
                    ..outcome(status, Vec::new())
                };
            }
        };

        let chosen: Vec<usize> = vars
            .iter()
            .enumerate()
            .filter(|(_, var)| solution.value(**var) > 0.5)
            .map(|(pos, _)| pos)
            .collect();
        let status = if chosen.len() as u64 == model.total_demand() {
            SolveStatus::Solved
        } else if matches!(solution.status(), SolutionStatus::TimeLimit) || limits.exceeded(0) {
            SolveStatus::TimedOut
        } else {
            SolveStatus::Infeasible
        };
        info!(
            "ILP solution placed {} of {} lessons in {:.2?}",
            chosen.len(),
            model.total_demand(),
            start_time.elapsed()
        );
        outcome(status, chosen)
    }
}

/// Infeasibility is a proof; any other error after the budget ran out is the
/// time limit cutting the solve short, and otherwise a solver failure.
fn classify_error(error: &ResolutionError, limits: &SolveLimits) -> SolveStatus {
    match error {
        ResolutionError::Infeasible => SolveStatus::Infeasible,
        _ if limits.exceeded(0) => SolveStatus::TimedOut,
        _ => SolveStatus::Failed,
    }
}
