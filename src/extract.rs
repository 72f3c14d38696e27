//! Conversion of solved variables into timetable entries, plus an independent
//! audit of produced entries against the hard rules.

use crate::data::{
    Diagnostic, EntitySnapshot, GenerationConfig, Schedule, SearchStats, Timetable, TimetableEntry,
};
use crate::model::TimetableModel;
use crate::solver::{SolveOutcome, SolveStatus};
use itertools::Itertools;
use log::{debug, info};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Entries for the chosen candidates, ordered by class then by time slot.
///
/// Classes keep their snapshot order; slots follow the chronological grid.
/// The teacher of each entry is the one carried by the solved candidate.
pub fn extract_entries(model: &TimetableModel<'_>, chosen: &[usize]) -> Vec<TimetableEntry> {
    let snapshot = model.snapshot();
    let requirements = model.requirements();
    chosen
        .iter()
        .map(|&c| &model.candidates()[c])
        .sorted_by_key(|c| {
            let requirement = &requirements[c.requirement];
            (requirement.class, model.slot_rank(c.slot), requirement.subject)
        })
        .map(|c| {
            let requirement = &requirements[c.requirement];
            let class = &snapshot.classes[requirement.class];
            let subject = &snapshot.subjects[requirement.subject];
            let teacher = &snapshot.teachers[c.teacher];
            let room = &snapshot.rooms[c.room];
            let slot = &snapshot.time_slots[c.slot];
            TimetableEntry {
                class_id: class.id,
                class_name: class.name.clone(),
                subject_id: subject.id,
                subject_code: subject.code.clone(),
                subject_name: subject.name.clone(),
                teacher_id: teacher.id,
                teacher_name: teacher.name.clone(),
                room_id: room.id,
                room_name: room.name.clone(),
                time_slot_id: slot.id,
                timeslot_range: slot.to_string(),
            }
        })
        .collect()
}

/// Wraps a solver outcome into the public [`Timetable`] result.
pub fn into_timetable(
    model: &TimetableModel<'_>,
    outcome: &SolveOutcome,
    seed: u64,
    best_effort: bool,
) -> Timetable {
    let stats = SearchStats {
        variables: model.variable_count(),
        constraints: model.constraint_count(),
        steps: outcome.steps,
        backtracks: outcome.backtracks,
        elapsed_ms: outcome.elapsed.as_millis() as u64,
    };
    let entries = extract_entries(model, &outcome.chosen);
    debug!("Extracted {} timetable entries", entries.len());

    match outcome.status {
        SolveStatus::Solved => Timetable::Schedule {
            schedule: Schedule {
                entries,
                partial: false,
            },
            seed,
            stats,
        },
        SolveStatus::TimedOut => {
            info!(
                "Search budget exhausted; returning partial timetable with {} of {} lessons",
                entries.len(),
                model.total_demand()
            );
            Timetable::NoFeasibleSchedule {
                diagnostic: Diagnostic::TimedOut {
                    partial: Schedule {
                        entries,
                        partial: true,
                    },
                },
                seed,
                stats,
            }
        }
        SolveStatus::Infeasible => Timetable::NoFeasibleSchedule {
            diagnostic: Diagnostic::Infeasible {
                best_effort: best_effort.then_some(Schedule {
                    entries,
                    partial: true,
                }),
            },
            seed,
            stats,
        },
        SolveStatus::Failed => {
            let message = outcome
                .failure
                .clone()
                .unwrap_or_else(|| "solver failed".to_string());
            Timetable::NoFeasibleSchedule {
                diagnostic: Diagnostic::SolverFailed { message },
                seed,
                stats,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ViolationKind {
    ClassClash,
    TeacherClash,
    RoomClash,
    RoomTypeMismatch,
    UnqualifiedTeacher,
    ClassNotTaught,
    TeacherBackToBack,
    TeacherOverloaded,
    UnknownEntity,
}

/// A hard rule broken by a set of entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub description: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.description)
    }
}

/// Checks entries against clash freedom, room type, qualification, class
/// membership and, when configured, teacher spacing and weekly load.
///
/// Works on entity ids only, so it can audit timetables from any source.
pub fn audit_entries(
    snapshot: &EntitySnapshot,
    config: &GenerationConfig,
    entries: &[TimetableEntry],
) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut report = |kind, description: String| violations.push(Violation { kind, description });

    for (label, kind, keys) in [
        (
            "class",
            ViolationKind::ClassClash,
            entries.iter().map(|e| (e.class_id, e.time_slot_id)).collect_vec(),
        ),
        (
            "teacher",
            ViolationKind::TeacherClash,
            entries.iter().map(|e| (e.teacher_id, e.time_slot_id)).collect_vec(),
        ),
        (
            "room",
            ViolationKind::RoomClash,
            entries.iter().map(|e| (e.room_id, e.time_slot_id)).collect_vec(),
        ),
    ] {
        for ((id, slot), count) in keys.into_iter().counts().into_iter().sorted() {
            if count > 1 {
                report(
                    kind,
                    format!("{} {} has {} lessons in time slot {}", label, id, count, slot),
                );
            }
        }
    }

    let subjects: HashMap<_, _> = snapshot.subjects.iter().map(|s| (s.id, s)).collect();
    let rooms: HashMap<_, _> = snapshot.rooms.iter().map(|r| (r.id, r)).collect();
    for entry in entries {
        let (Some(subject), Some(room)) = (subjects.get(&entry.subject_id), rooms.get(&entry.room_id))
        else {
            report(
                ViolationKind::UnknownEntity,
                format!(
                    "entry for subject {} in room {} references unknown entities",
                    entry.subject_id, entry.room_id
                ),
            );
            continue;
        };
        if subject.is_practical != room.is_lab {
            report(
                ViolationKind::RoomTypeMismatch,
                format!("subject '{}' placed in room '{}'", subject.code, room.name),
            );
        }
        if !subject.teachers.contains(&entry.teacher_id) {
            report(
                ViolationKind::UnqualifiedTeacher,
                format!("teacher {} is not qualified for '{}'", entry.teacher_id, subject.code),
            );
        }
        if !subject.classes.contains(&entry.class_id) {
            report(
                ViolationKind::ClassNotTaught,
                format!("class {} does not take '{}'", entry.class_id, subject.code),
            );
        }
    }

    if config.enforce_teacher_spacing {
        let slot_order: Vec<_> = snapshot
            .time_slots
            .iter()
            .sorted_by_key(|s| s.chronological_key())
            .collect();
        let teacher_slots: BTreeMap<u32, Vec<u32>> = entries
            .iter()
            .map(|e| (e.teacher_id, e.time_slot_id))
            .into_group_map()
            .into_iter()
            .collect();
        for (a, b) in slot_order.iter().tuple_windows() {
            if a.day != b.day {
                continue;
            }
            for (teacher, slots) in &teacher_slots {
                if slots.contains(&a.id) && slots.contains(&b.id) {
                    report(
                        ViolationKind::TeacherBackToBack,
                        format!("teacher {} teaches in adjacent slots {} and {}", teacher, a.id, b.id),
                    );
                }
            }
        }
    }

    if config.enforce_teacher_load {
        let load = entries.iter().map(|e| e.teacher_id).counts();
        for teacher in &snapshot.teachers {
            let given = load.get(&teacher.id).copied().unwrap_or(0);
            if given > teacher.max_lectures_per_week as usize {
                report(
                    ViolationKind::TeacherOverloaded,
                    format!(
                        "teacher {} gives {} lessons, limit {}",
                        teacher.id, given, teacher.max_lectures_per_week
                    ),
                );
            }
        }
    }

    violations
}

/// Lessons still missing per (subject id, class id) for the configured frequencies.
pub fn coverage_gaps(
    snapshot: &EntitySnapshot,
    config: &GenerationConfig,
    entries: &[TimetableEntry],
) -> BTreeMap<(u32, u32), u32> {
    let placed = entries.iter().map(|e| (e.subject_id, e.class_id)).counts();
    let mut gaps = BTreeMap::new();
    for subject in &snapshot.subjects {
        let need = config.frequency_of(&subject.code);
        for &class in subject.classes.iter().unique() {
            let got = placed.get(&(subject.id, class)).copied().unwrap_or(0) as u32;
            if got < need {
                gaps.insert((subject.id, class), need - got);
            }
        }
    }
    gaps
}
