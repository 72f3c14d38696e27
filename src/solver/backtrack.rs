use super::{SearchState, SolveLimits, SolveOutcome, SolveStatus, SolverEngine};
use crate::model::{TimetableModel, describe_candidate};
use crate::seed::SeedController;
use itertools::Itertools;
use log::{debug, info, trace};
use std::cmp::Reverse;
use std::time::Instant;

/// Depth-first search with propagation over the boolean candidate model.
///
/// Each node first propagates pending assignments to a fixpoint:
/// - a candidate set true fills its requirement and every capacity group it
///   belongs to; a full requirement or group forces its undecided members false.
/// - a candidate set false may leave a requirement with exactly as many
///   undecided candidates as it still needs; those are forced true.
/// - counting bounds over classes and teachers (see `count_resources`) prune
///   states where the remaining lessons no longer fit the open slots.
///
/// It then branches on the requirement with the least slot slack, trying one
/// of its candidates true and, on failure, false. Ties on both levels are
/// broken by seeded keys.
#[derive(Debug, Clone, Default)]
pub struct BacktrackingSolver;

impl BacktrackingSolver {
    pub fn new() -> Self {
        Self
    }
}

impl SolverEngine for BacktrackingSolver {
    fn name(&self) -> &'static str {
        "backtracking"
    }

    fn solve(
        &self,
        model: &TimetableModel<'_>,
        seeds: &mut SeedController,
        limits: &SolveLimits,
    ) -> SolveOutcome {
        let start = Instant::now();
        info!(
            "Starting backtracking search over {} variables and {} constraints...",
            model.variable_count(),
            model.constraint_count()
        );
        let search = Search::new(model, seeds);
        let mut outcome = search.run(limits);
        outcome.elapsed = start.elapsed();
        info!(
            "Search finished as {:?} after {} steps ({} backtracks) in {:.2?}",
            outcome.status, outcome.steps, outcome.backtracks, outcome.elapsed
        );
        outcome
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Value {
    Unknown,
    True,
    False,
}

/// Propagation hit a constraint that cannot be satisfied.
#[derive(Debug)]
struct Conflict;

#[derive(Debug, Clone, Copy)]
struct Decision {
    var: usize,
    /// Trail length before the decision was applied.
    mark: usize,
    /// The true branch already failed; this node now holds the false branch.
    refuted: bool,
}

struct Search<'m, 'a> {
    model: &'m TimetableModel<'a>,
    state: SearchState,
    values: Vec<Value>,
    trail: Vec<usize>,
    pending: Vec<(usize, bool)>,
    decisions: Vec<Decision>,
    group_true: Vec<u32>,
    req_true: Vec<u32>,
    req_open: Vec<u32>,
    /// Distinct slots with undecided candidates, per requirement.
    req_slots: Vec<u32>,
    /// Open slots beyond the lessons a class still needs.
    class_slack: Vec<u32>,
    /// Lessons a teacher could still give beyond those only it can give.
    teacher_spare: Vec<u32>,
    /// By chronological rank: the slot directly follows an adjacent one.
    follows_adjacent: Vec<bool>,
    covered: usize,
    chosen: usize,
    var_keys: Vec<u64>,
    req_keys: Vec<u64>,
    best: Vec<usize>,
    best_score: Option<(usize, usize)>,
    steps: u64,
    backtracks: u64,
}

impl<'m, 'a> Search<'m, 'a> {
    fn new(model: &'m TimetableModel<'a>, seeds: &mut SeedController) -> Self {
        let requirements = model.requirements();
        let snapshot = model.snapshot();
        let mut follows_adjacent = vec![false; snapshot.time_slots.len()];
        for &(_, later) in model.adjacent_pairs() {
            follows_adjacent[model.slot_rank(later)] = true;
        }
        Self {
            model,
            state: SearchState::Unsolved,
            values: vec![Value::Unknown; model.variable_count()],
            trail: Vec::with_capacity(model.variable_count()),
            pending: Vec::new(),
            decisions: Vec::new(),
            group_true: vec![0; model.groups().len()],
            req_true: vec![0; requirements.len()],
            req_open: requirements.iter().map(|r| r.candidates.len() as u32).collect(),
            req_slots: vec![0; requirements.len()],
            class_slack: vec![0; snapshot.classes.len()],
            teacher_spare: vec![0; snapshot.teachers.len()],
            follows_adjacent,
            covered: 0,
            chosen: 0,
            var_keys: seeds.tie_break_keys(model.variable_count()),
            req_keys: seeds.tie_break_keys(requirements.len()),
            best: Vec::new(),
            best_score: None,
            steps: 0,
            backtracks: 0,
        }
    }

    fn transition(&mut self, next: SearchState) {
        if self.state != next {
            trace!("search state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    fn run(mut self, limits: &SolveLimits) -> SolveOutcome {
        self.transition(SearchState::Propagating);
        for r in 0..self.model.requirements().len() {
            if self.review_requirement(r).is_err() {
                debug!("Requirement {} has fewer candidates than lessons needed", r);
                return self.finish(SolveStatus::Infeasible);
            }
        }

        loop {
            if limits.exceeded(self.steps) {
                return self.finish(SolveStatus::TimedOut);
            }
            self.steps += 1;

            self.transition(SearchState::Propagating);
            if self.settle().is_err() {
                if !self.backtrack() {
                    return self.finish(SolveStatus::Infeasible);
                }
                continue;
            }
            self.record_best();

            self.transition(SearchState::Branching);
            match self.select_branch() {
                Some(var) => {
                    if log::log_enabled!(log::Level::Trace) {
                        let candidate = &self.model.candidates()[var];
                        trace!(
                            "branch depth {}: (subject, class, teacher, room, slot) = {:?}",
                            self.decisions.len(),
                            describe_candidate(self.model, candidate)
                        );
                    }
                    self.decisions.push(Decision {
                        var,
                        mark: self.trail.len(),
                        refuted: false,
                    });
                    self.pending.push((var, true));
                }
                None => return self.finish(SolveStatus::Solved),
            }
        }
    }

    fn finish(mut self, status: SolveStatus) -> SolveOutcome {
        self.transition(status.into());
        let chosen = match status {
            SolveStatus::Solved => self.current_assignment(),
            SolveStatus::Infeasible => {
                let best = std::mem::take(&mut self.best);
                self.fill_greedily(best)
            }
            SolveStatus::TimedOut | SolveStatus::Failed => std::mem::take(&mut self.best),
        };
        SolveOutcome {
            status,
            chosen,
            steps: self.steps,
            backtracks: self.backtracks,
            elapsed: Default::default(),
            failure: None,
        }
    }

    /// Applies pending assignments until none are left.
    fn propagate(&mut self) -> Result<(), Conflict> {
        while let Some((var, value)) = self.pending.pop() {
            if let Err(conflict) = self.assign(var, value) {
                self.pending.clear();
                return Err(conflict);
            }
        }
        Ok(())
    }

    /// Alternates propagation and counting bounds until neither derives more.
    fn settle(&mut self) -> Result<(), Conflict> {
        loop {
            self.propagate()?;
            self.count_resources()?;
            if self.pending.is_empty() {
                return Ok(());
            }
        }
    }

    /// Counting bounds over the undecided part of the model.
    ///
    /// - a requirement needs one open slot per missing lesson.
    /// - a class needs one open slot per missing lesson; when the two are
    ///   equal every open slot must be used, so a slot with a single undecided
    ///   candidate forces it.
    /// - a teacher can give at most one lesson per free slot (free slots
    ///   pairwise non-adjacent under spacing), capped by its remaining load.
    ///   Lessons only that teacher can give must fit; when they fill it, its
    ///   candidates elsewhere are excluded.
    /// - all missing lessons must fit the combined teacher capacity.
    ///
    /// Also refreshes the slack counters used by branching.
    fn count_resources(&mut self) -> Result<(), Conflict> {
        let model = self.model;
        let snapshot = model.snapshot();
        let requirements = model.requirements();
        let candidates = model.candidates();
        let slots = snapshot.time_slots.len();
        let classes = snapshot.classes.len();
        let teachers = snapshot.teachers.len();

        let mut class_taken = vec![false; classes * slots];
        let mut class_open = vec![0u32; classes * slots];
        let mut class_last = vec![0usize; classes * slots];
        let mut teacher_busy = vec![false; teachers * slots];
        let mut teacher_free = vec![false; teachers * slots];
        let mut teacher_given = vec![0u32; teachers];
        for (var, candidate) in candidates.iter().enumerate() {
            let cs = requirements[candidate.requirement].class * slots + candidate.slot;
            let ts = candidate.teacher * slots + candidate.slot;
            match self.values[var] {
                Value::True => {
                    class_taken[cs] = true;
                    teacher_busy[ts] = true;
                    teacher_given[candidate.teacher] += 1;
                }
                Value::Unknown => {
                    class_open[cs] += 1;
                    class_last[cs] = var;
                    teacher_free[ts] = true;
                }
                Value::False => {}
            }
        }

        let mut class_need = vec![0u32; classes];
        let mut sole_need = vec![0u32; teachers];
        let mut sole_teacher: Vec<Option<usize>> = vec![None; requirements.len()];
        let mut total_need = 0u64;
        let mut seen = vec![usize::MAX; slots];
        for (r, requirement) in requirements.iter().enumerate() {
            self.req_slots[r] = 0;
            let missing = requirement.need.saturating_sub(self.req_true[r]);
            if missing == 0 {
                continue;
            }
            let mut teacher = None;
            let mut shared = false;
            for &var in &requirement.candidates {
                if self.values[var] != Value::Unknown {
                    continue;
                }
                let candidate = &candidates[var];
                if seen[candidate.slot] != r {
                    seen[candidate.slot] = r;
                    self.req_slots[r] += 1;
                }
                match teacher {
                    None => teacher = Some(candidate.teacher),
                    Some(t) if t != candidate.teacher => shared = true,
                    Some(_) => {}
                }
            }
            if self.req_slots[r] < missing {
                return Err(Conflict);
            }
            class_need[requirement.class] += missing;
            total_need += u64::from(missing);
            if !shared {
                if let Some(t) = teacher {
                    sole_need[t] += missing;
                    sole_teacher[r] = Some(t);
                }
            }
        }

        for class in 0..classes {
            let open: Vec<usize> = (class * slots..(class + 1) * slots)
                .filter(|&cs| !class_taken[cs] && class_open[cs] > 0)
                .collect();
            let open_count = open.len() as u32;
            if open_count < class_need[class] {
                return Err(Conflict);
            }
            self.class_slack[class] = open_count - class_need[class];
            if class_need[class] > 0 && self.class_slack[class] == 0 {
                for cs in open {
                    if class_open[cs] == 1 {
                        self.pending.push((class_last[cs], true));
                    }
                }
            }
        }

        let mut total_capacity = 0u64;
        for teacher in 0..teachers {
            let mut free = 0u32;
            let mut last_rank: Option<usize> = None;
            for (rank, &slot) in model.chronological_slots().iter().enumerate() {
                let ts = teacher * slots + slot;
                if teacher_busy[ts] || !teacher_free[ts] {
                    continue;
                }
                let after_taken = last_rank.is_some_and(|last| last + 1 == rank);
                if model.spaces_teachers() && self.follows_adjacent[rank] && after_taken {
                    continue;
                }
                free += 1;
                last_rank = Some(rank);
            }
            let capacity = match model.load_limit(teacher) {
                Some(limit) => free.min(limit.saturating_sub(teacher_given[teacher])),
                None => free,
            };
            if sole_need[teacher] > capacity {
                return Err(Conflict);
            }
            self.teacher_spare[teacher] = capacity - sole_need[teacher];
            total_capacity += u64::from(capacity);
        }
        if total_need > total_capacity {
            return Err(Conflict);
        }

        for (var, candidate) in candidates.iter().enumerate() {
            if self.values[var] == Value::Unknown
                && self.teacher_spare[candidate.teacher] == 0
                && sole_teacher[candidate.requirement] != Some(candidate.teacher)
            {
                self.pending.push((var, false));
            }
        }
        Ok(())
    }

    fn assign(&mut self, var: usize, value: bool) -> Result<(), Conflict> {
        let wanted = if value { Value::True } else { Value::False };
        match self.values[var] {
            Value::Unknown => {}
            current if current == wanted => return Ok(()),
            _ => return Err(Conflict),
        }

        let model = self.model;
        let r = model.candidates()[var].requirement;
        self.values[var] = wanted;
        self.trail.push(var);
        self.req_open[r] -= 1;

        if !value {
            return self.review_requirement(r);
        }

        // counters first, so undo stays symmetric even when a check fails
        self.chosen += 1;
        self.req_true[r] += 1;
        let need = model.requirements()[r].need;
        if self.req_true[r] == need {
            self.covered += 1;
        }
        for &g in model.memberships(var) {
            self.group_true[g] += 1;
        }

        if self.req_true[r] > need {
            return Err(Conflict);
        }
        if self.req_true[r] == need {
            self.exclude_open(&model.requirements()[r].candidates);
        }
        for &g in model.memberships(var) {
            let group = &model.groups()[g];
            if self.group_true[g] > group.capacity {
                return Err(Conflict);
            }
            if self.group_true[g] == group.capacity {
                self.exclude_open(&group.members);
            }
        }
        Ok(())
    }

    /// Fails when a requirement can no longer be covered and forces its
    /// remaining candidates when every one of them is needed.
    fn review_requirement(&mut self, r: usize) -> Result<(), Conflict> {
        let model = self.model;
        let requirement = &model.requirements()[r];
        let reachable = self.req_true[r] + self.req_open[r];
        if reachable < requirement.need {
            return Err(Conflict);
        }
        if reachable == requirement.need && self.req_open[r] > 0 {
            for &member in &requirement.candidates {
                if self.values[member] == Value::Unknown {
                    self.pending.push((member, true));
                }
            }
        }
        Ok(())
    }

    fn exclude_open(&mut self, members: &[usize]) {
        for &member in members {
            if self.values[member] == Value::Unknown {
                self.pending.push((member, false));
            }
        }
    }

    fn undo_to(&mut self, mark: usize) {
        let model = self.model;
        while self.trail.len() > mark {
            let Some(var) = self.trail.pop() else { break };
            let r = model.candidates()[var].requirement;
            if self.values[var] == Value::True {
                if self.req_true[r] == model.requirements()[r].need {
                    self.covered -= 1;
                }
                self.req_true[r] -= 1;
                self.chosen -= 1;
                for &g in model.memberships(var) {
                    self.group_true[g] -= 1;
                }
            }
            self.req_open[r] += 1;
            self.values[var] = Value::Unknown;
        }
    }

    /// Undoes the most recent open decision and queues its false branch.
    /// Returns false when the search space is exhausted.
    fn backtrack(&mut self) -> bool {
        self.pending.clear();
        while let Some(decision) = self.decisions.pop() {
            self.undo_to(decision.mark);
            if !decision.refuted {
                self.backtracks += 1;
                self.decisions.push(Decision {
                    refuted: true,
                    ..decision
                });
                self.pending.push((decision.var, false));
                return true;
            }
        }
        false
    }

    /// Most-constrained open requirement: fewest open slots beyond its missing
    /// lessons, then the class with the least slack, then fewest undecided
    /// candidates. Its candidate whose teacher has the most spare capacity is
    /// tried first.
    fn select_branch(&self) -> Option<usize> {
        let model = self.model;
        let requirements = model.requirements();
        let r = (0..requirements.len())
            .filter(|&r| self.req_true[r] < requirements[r].need)
            .min_by_key(|&r| {
                let missing = requirements[r].need - self.req_true[r];
                (
                    self.req_slots[r].saturating_sub(missing),
                    self.class_slack[requirements[r].class],
                    self.req_open[r],
                    self.req_keys[r],
                )
            })?;
        requirements[r]
            .candidates
            .iter()
            .copied()
            .filter(|&v| self.values[v] == Value::Unknown)
            .min_by_key(|&v| {
                let teacher = model.candidates()[v].teacher;
                (Reverse(self.teacher_spare[teacher]), self.var_keys[v])
            })
    }

    /// Extends a clash-free assignment with every candidate that still fits,
    /// requirements and candidates taken in seeded order.
    ///
    /// Counting bounds can refute a model before any lesson is placed; this
    /// still yields a partial timetable for best-effort callers.
    fn fill_greedily(&self, mut chosen: Vec<usize>) -> Vec<usize> {
        let model = self.model;
        let mut taken = vec![false; model.variable_count()];
        let mut group_used = vec![0u32; model.groups().len()];
        let mut req_used = vec![0u32; model.requirements().len()];
        for &var in &chosen {
            taken[var] = true;
            req_used[model.candidates()[var].requirement] += 1;
            for &g in model.memberships(var) {
                group_used[g] += 1;
            }
        }

        for r in (0..model.requirements().len()).sorted_by_key(|&r| self.req_keys[r]) {
            let requirement = &model.requirements()[r];
            for var in requirement
                .candidates
                .iter()
                .copied()
                .sorted_by_key(|&v| self.var_keys[v])
            {
                if req_used[r] >= requirement.need {
                    break;
                }
                let fits = model
                    .memberships(var)
                    .iter()
                    .all(|&g| group_used[g] < model.groups()[g].capacity);
                if taken[var] || !fits {
                    continue;
                }
                taken[var] = true;
                req_used[r] += 1;
                for &g in model.memberships(var) {
                    group_used[g] += 1;
                }
                chosen.push(var);
            }
        }
        chosen
    }

    fn current_assignment(&self) -> Vec<usize> {
        self.trail
            .iter()
            .copied()
            .filter(|&v| self.values[v] == Value::True)
            .collect()
    }

    /// Keeps the consistent state with the most covered requirements, then
    /// the most placed lessons.
    fn record_best(&mut self) {
        let score = (self.covered, self.chosen);
        if self.best_score.is_none_or(|best| score > best) {
            self.best_score = Some(score);
            self.best = self.current_assignment();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{GenerationConfig, TimeBudget};
    use crate::model::{GroupKind, ModelBuilder};
    use crate::test_support::*;
    use std::collections::HashSet;

    fn solve(
        snapshot: &crate::data::EntitySnapshot,
        config: &GenerationConfig,
    ) -> (SolveOutcome, Vec<crate::model::Candidate>, Vec<crate::model::Requirement>) {
        let mut seeds = SeedController::new(config.seed);
        let model = ModelBuilder::new(snapshot, config).build(&mut seeds).unwrap();
        let limits = SolveLimits::from_budget(&config.time_budget, Instant::now());
        let outcome = BacktrackingSolver::new().solve(&model, &mut seeds, &limits);
        (
            outcome,
            model.candidates().to_vec(),
            model.requirements().to_vec(),
        )
    }

    fn assert_clash_free(chosen: &[usize], candidates: &[crate::model::Candidate], reqs: &[crate::model::Requirement]) {
        let mut class_slots = HashSet::new();
        let mut teacher_slots = HashSet::new();
        let mut room_slots = HashSet::new();
        for &v in chosen {
            let c = candidates[v];
            assert!(class_slots.insert((reqs[c.requirement].class, c.slot)));
            assert!(teacher_slots.insert((c.teacher, c.slot)));
            assert!(room_slots.insert((c.room, c.slot)));
        }
    }

    #[test]
    fn test_solves_mixed_school() {
        let snapshot = mixed_school();
        let config = GenerationConfig::default().with_seed(11);
        let (outcome, candidates, reqs) = solve(&snapshot, &config);

        assert_eq!(outcome.status, SolveStatus::Solved);
        let demand: u32 = reqs.iter().map(|r| r.need).sum();
        assert_eq!(outcome.chosen.len() as u32, demand);
        assert_clash_free(&outcome.chosen, &candidates, &reqs);
        for (r, req) in reqs.iter().enumerate() {
            let placed = outcome
                .chosen
                .iter()
                .filter(|&&v| candidates[v].requirement == r)
                .count();
            assert_eq!(placed as u32, req.need);
        }
    }

    #[test]
    fn test_single_room_two_classes_spacing_is_infeasible() {
        // one teacher, one room, two adjacent slots: the teacher would teach back-to-back
        let snapshot = school(2, 2, 1, &[("MATH", false, vec![1], vec![1, 2])]);
        let config = GenerationConfig::default().with_seed(3);
        let (outcome, _, _) = solve(&snapshot, &config);
        assert_eq!(outcome.status, SolveStatus::Infeasible);
    }

    #[test]
    fn test_single_room_two_classes_without_spacing_uses_both_slots() {
        let snapshot = school(2, 2, 1, &[("MATH", false, vec![1], vec![1, 2])]);
        let config = GenerationConfig::default()
            .with_seed(3)
            .with_teacher_spacing(false);
        let (outcome, candidates, reqs) = solve(&snapshot, &config);
        assert_eq!(outcome.status, SolveStatus::Solved);
        assert_eq!(outcome.chosen.len(), 2);
        assert_clash_free(&outcome.chosen, &candidates, &reqs);
    }

    #[test]
    fn test_same_seed_same_assignment() {
        let snapshot = mixed_school();
        let config = GenerationConfig::default().with_seed(99);
        let (first, candidates, _) = solve(&snapshot, &config);
        let (second, _, _) = solve(&snapshot, &config);
        let as_tuples = |chosen: &[usize]| {
            let mut tuples: Vec<_> = chosen
                .iter()
                .map(|&v| {
                    let c = candidates[v];
                    (c.requirement, c.teacher, c.room, c.slot)
                })
                .collect();
            tuples.sort();
            tuples
        };
        assert_eq!(as_tuples(&first.chosen), as_tuples(&second.chosen));
    }

    #[test]
    fn test_step_budget_returns_clash_free_partial() {
        let snapshot = mixed_school();
        let config = GenerationConfig::default()
            .with_seed(5)
            .with_budget(TimeBudget::steps(2));
        let (outcome, candidates, reqs) = solve(&snapshot, &config);
        assert_eq!(outcome.status, SolveStatus::TimedOut);
        assert!(outcome.steps <= 2);
        let demand: u32 = reqs.iter().map(|r| r.need).sum();
        assert!((outcome.chosen.len() as u32) < demand);
        assert_clash_free(&outcome.chosen, &candidates, &reqs);
    }

    #[test]
    fn test_teacher_load_is_respected() {
        // teacher 1 may give 2 lessons; teacher 2 must take the rest
        let mut snapshot = school(4, 4, 4, &[("MATH", false, vec![1, 2], vec![1, 2, 3, 4])]);
        snapshot.teachers[0].max_lectures_per_week = 2;
        let config = GenerationConfig::default()
            .with_seed(8)
            .with_teacher_spacing(false);
        let mut seeds = SeedController::new(config.seed);
        let model = ModelBuilder::new(&snapshot, &config).build(&mut seeds).unwrap();
        assert!(model.groups_of_kind(GroupKind::TeacherLoad).count() >= 1);

        let limits = SolveLimits::default();
        let outcome = BacktrackingSolver::new().solve(&model, &mut seeds, &limits);
        assert_eq!(outcome.status, SolveStatus::Solved);
        let by_first = outcome
            .chosen
            .iter()
            .filter(|&&v| model.candidates()[v].teacher == 0)
            .count();
        assert!(by_first <= 2);
        assert_eq!(outcome.chosen.len(), 4);
    }

    #[test]
    fn test_empty_model_is_trivially_solved() {
        let snapshot = school(1, 2, 1, &[]);
        let config = GenerationConfig::default();
        let (outcome, _, _) = solve(&snapshot, &config);
        assert_eq!(outcome.status, SolveStatus::Solved);
        assert!(outcome.chosen.is_empty());
    }

    /// Three classes filling all six slots, three subjects each, every subject
    /// shared by two of the four teachers.
    fn full_week(pairs: [[u32; 2]; 9], spacing: bool) -> (crate::data::EntitySnapshot, GenerationConfig) {
        let codes: Vec<String> = (1..=9).map(|i| format!("S{}", i)).collect();
        let specs: Vec<_> = codes
            .iter()
            .zip(pairs)
            .enumerate()
            .map(|(i, (code, pair))| (code.as_str(), false, pair.to_vec(), vec![i as u32 % 3 + 1]))
            .collect();
        let snapshot = school(3, 6, 3, &specs);
        let mut config = GenerationConfig::default()
            .with_seed(21)
            .with_teacher_spacing(spacing)
            .with_budget(TimeBudget::steps(50_000));
        for code in &codes {
            config = config.with_frequency(code.as_str(), 2);
        }
        (snapshot, config)
    }

    #[test]
    fn test_spaced_teacher_capacity_refutes_full_week_at_root() {
        // 18 lessons but four spaced teachers give at most 3 each in six slots
        let (snapshot, config) = full_week(
            [[1, 2], [3, 4], [1, 3], [2, 4], [1, 4], [2, 3], [1, 2], [3, 4], [1, 3]],
            true,
        );
        let (outcome, _, _) = solve(&snapshot, &config);
        assert_eq!(outcome.status, SolveStatus::Infeasible);
        assert_eq!(outcome.backtracks, 0);
        assert!(outcome.steps <= 1);
    }

    #[test]
    fn test_refuted_week_still_offers_clash_free_partial() {
        let (snapshot, config) = full_week(
            [[1, 2], [3, 4], [1, 3], [2, 4], [1, 4], [2, 3], [1, 2], [3, 4], [1, 3]],
            true,
        );
        let (outcome, candidates, reqs) = solve(&snapshot, &config);
        assert_eq!(outcome.status, SolveStatus::Infeasible);
        // four spaced teachers over six slots give at most twelve lessons
        assert!(!outcome.chosen.is_empty());
        assert!(outcome.chosen.len() <= 12);
        assert_clash_free(&outcome.chosen, &candidates, &reqs);
    }

    #[test]
    fn test_full_week_without_spacing_is_solved() {
        // class k can always fall back on teacher k; teacher 4 is shared
        let (snapshot, config) = full_week(
            [[1, 4], [2, 4], [3, 4], [1, 4], [2, 4], [3, 4], [1, 4], [2, 4], [3, 4]],
            false,
        );
        let (outcome, candidates, reqs) = solve(&snapshot, &config);
        assert_eq!(outcome.status, SolveStatus::Solved);
        assert_eq!(outcome.chosen.len(), 18);
        assert_clash_free(&outcome.chosen, &candidates, &reqs);
    }

    #[test]
    fn test_teacher_without_spare_capacity_is_kept_for_own_lessons() {
        // teacher 1 alone teaches A twice and may give two lessons a week,
        // so B must go to teacher 2
        let mut snapshot = school(
            2,
            3,
            2,
            &[("A", false, vec![1], vec![1]), ("B", false, vec![1, 2], vec![2])],
        );
        snapshot.teachers[0].max_lectures_per_week = 2;
        let config = GenerationConfig::default()
            .with_seed(6)
            .with_frequency("A", 2)
            .with_teacher_spacing(false);
        let (outcome, candidates, reqs) = solve(&snapshot, &config);
        assert_eq!(outcome.status, SolveStatus::Solved);
        assert_eq!(outcome.backtracks, 0);
        for &v in &outcome.chosen {
            let c = candidates[v];
            let expected = if snapshot.subjects[reqs[c.requirement].subject].code == "A" { 0 } else { 1 };
            assert_eq!(c.teacher, expected);
        }
    }

    #[test]
    fn test_unit_propagation_forces_only_candidates() {
        // frequency 2 with exactly two slots and one room: both candidates are forced
        let snapshot = school(1, 2, 1, &[("MATH", false, vec![1], vec![1])]);
        let config = GenerationConfig::default()
            .with_frequency("MATH", 2)
            .with_teacher_spacing(false);
        let (outcome, _, _) = solve(&snapshot, &config);
        assert_eq!(outcome.status, SolveStatus::Solved);
        assert_eq!(outcome.chosen.len(), 2);
        assert_eq!(outcome.backtracks, 0);
    }
}
