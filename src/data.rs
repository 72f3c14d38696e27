use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// Type aliases for clarity
pub type TeacherId = u32;
pub type ClassId = u32;
pub type SubjectId = u32;
pub type RoomId = u32;
pub type TimeSlotId = u32;

fn default_max_lectures() -> u32 {
    18
}

/// A teacher who can be assigned to subjects they are qualified for.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: TeacherId,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub department: String,
    #[serde(default = "default_max_lectures")]
    pub max_lectures_per_week: u32,
}

/// A student group that attends lessons together.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Class {
    pub id: ClassId,
    pub name: String,
}

/// A subject taught to one or more classes by one of its qualified teachers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: SubjectId,
    pub name: String,
    pub code: String,
    pub teachers: Vec<TeacherId>,
    pub classes: Vec<ClassId>,
    /// Practical subjects need a lab, theory subjects a regular classroom.
    #[serde(default)]
    pub is_practical: bool,
}

/// Represents a physical room, either a lab or a regular classroom.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    #[serde(default)]
    pub is_lab: bool,
}

/// One period of the weekly grid.
///
/// Slots without a `day` all belong to the same implicit day, so the grid is
/// simply the slots ordered by start time.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeSlot {
    pub id: TimeSlotId,
    #[serde(default)]
    pub day: Option<Weekday>,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeSlot {
    /// Sort key for the chronological order of the weekly grid.
    pub fn chronological_key(&self) -> (u32, NaiveTime, NaiveTime, TimeSlotId) {
        let day = self.day.map_or(0, |d| d.num_days_from_monday());
        (day, self.start, self.end, self.id)
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(day) = self.day {
            write!(f, "{} ", day)?;
        }
        write!(f, "{} - {}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

/// Read-only snapshot of every entity taking part in one generation request.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySnapshot {
    #[serde(default)]
    pub teachers: Vec<Teacher>,
    #[serde(default)]
    pub classes: Vec<Class>,
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub time_slots: Vec<TimeSlot>,
}

/// Which search backend runs the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EngineKind {
    #[default]
    Backtracking,
    Ilp,
}

/// Caller-supplied bound on search effort.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeBudget {
    pub max_steps: Option<u64>,
    pub time_limit_ms: Option<u64>,
}

impl Default for TimeBudget {
    fn default() -> Self {
        Self {
            max_steps: None,
            time_limit_ms: Some(30_000),
        }
    }
}

impl TimeBudget {
    pub fn unlimited() -> Self {
        Self {
            max_steps: None,
            time_limit_ms: None,
        }
    }

    pub fn steps(max_steps: u64) -> Self {
        Self {
            max_steps: Some(max_steps),
            time_limit_ms: None,
        }
    }
}

/// Options for one generation request.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationConfig {
    /// Fixed seed for reproducible output; a fresh one is drawn when absent.
    pub seed: Option<u64>,
    /// Lessons per week keyed by subject code. Missing subjects default to 1.
    pub per_subject_frequency: BTreeMap<String, u32>,
    /// Forbid back-to-back lessons for the same teacher.
    pub enforce_teacher_spacing: bool,
    /// Treat `maxLecturesPerWeek` as a hard upper bound.
    pub enforce_teacher_load: bool,
    pub time_budget: TimeBudget,
    pub engine: EngineKind,
    /// Attach the best partial schedule when the search proves infeasibility.
    pub best_effort: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            per_subject_frequency: BTreeMap::new(),
            enforce_teacher_spacing: true,
            enforce_teacher_load: true,
            time_budget: TimeBudget::default(),
            engine: EngineKind::default(),
            best_effort: false,
        }
    }
}

impl GenerationConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_frequency(mut self, subject_code: impl Into<String>, frequency: u32) -> Self {
        self.per_subject_frequency.insert(subject_code.into(), frequency);
        self
    }

    pub fn with_teacher_spacing(mut self, enforce: bool) -> Self {
        self.enforce_teacher_spacing = enforce;
        self
    }

    pub fn with_budget(mut self, budget: TimeBudget) -> Self {
        self.time_budget = budget;
        self
    }

    pub fn with_engine(mut self, engine: EngineKind) -> Self {
        self.engine = engine;
        self
    }

    /// Required weekly lessons for a subject, per target class.
    pub fn frequency_of(&self, subject_code: &str) -> u32 {
        self.per_subject_frequency
            .get(subject_code)
            .copied()
            .unwrap_or(1)
    }
}

/// One scheduled lesson.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableEntry {
    pub class_id: ClassId,
    pub class_name: String,
    pub subject_id: SubjectId,
    pub subject_code: String,
    pub subject_name: String,
    pub teacher_id: TeacherId,
    pub teacher_name: String,
    pub room_id: RoomId,
    pub room_name: String,
    pub time_slot_id: TimeSlotId,
    pub timeslot_range: String,
}

/// Ordered timetable entries, grouped by class then by time slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub entries: Vec<TimetableEntry>,
    /// Set when some lessons could not be placed.
    pub partial: bool,
}

/// Effort counters reported with every outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchStats {
    pub variables: usize,
    pub constraints: usize,
    pub steps: u64,
    pub backtracks: u64,
    pub elapsed_ms: u64,
}

/// Why no complete schedule was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum Diagnostic {
    /// The hard constraints cannot be satisfied together.
    #[serde(rename_all = "camelCase")]
    Infeasible { best_effort: Option<Schedule> },
    /// The search budget ran out; `partial` is clash-free but incomplete.
    #[serde(rename_all = "camelCase")]
    TimedOut { partial: Schedule },
    /// The solver backend reported an error instead of an answer.
    #[serde(rename_all = "camelCase")]
    SolverFailed { message: String },
}

/// The final output of a generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Timetable {
    Schedule {
        schedule: Schedule,
        seed: u64,
        stats: SearchStats,
    },
    #[serde(rename_all = "camelCase")]
    NoFeasibleSchedule {
        diagnostic: Diagnostic,
        seed: u64,
        stats: SearchStats,
    },
}

impl Timetable {
    pub fn is_solved(&self) -> bool {
        matches!(self, Timetable::Schedule { .. })
    }

    /// The seed that reproduces this outcome.
    pub fn seed(&self) -> u64 {
        match self {
            Timetable::Schedule { seed, .. } | Timetable::NoFeasibleSchedule { seed, .. } => *seed,
        }
    }

    pub fn stats(&self) -> &SearchStats {
        match self {
            Timetable::Schedule { stats, .. } | Timetable::NoFeasibleSchedule { stats, .. } => {
                stats
            }
        }
    }

    /// Entries of the complete schedule, or of the partial one if any.
    pub fn entries(&self) -> &[TimetableEntry] {
        match self {
            Timetable::Schedule { schedule, .. } => &schedule.entries,
            Timetable::NoFeasibleSchedule { diagnostic, .. } => match diagnostic {
                Diagnostic::TimedOut { partial } => &partial.entries,
                Diagnostic::Infeasible {
                    best_effort: Some(schedule),
                } => &schedule.entries,
                Diagnostic::Infeasible { best_effort: None } | Diagnostic::SolverFailed { .. } => &[],
            },
        }
    }
}
