use chrono::NaiveTime;
use std::collections::HashSet;
use timetable_solver::data::{Class, Diagnostic, Room, Subject, Teacher, TimeSlot};
use timetable_solver::error::{ConstructionConflict, InvalidReference};
use timetable_solver::extract::{audit_entries, coverage_gaps};
use timetable_solver::solver::CancelToken;
use timetable_solver::{
    EngineKind, EntitySnapshot, GenerationConfig, ScheduleError, TimeBudget, Timetable,
    generate, generate_with_cancel,
};

fn slot(id: u32, hour: u32) -> TimeSlot {
    TimeSlot {
        id,
        day: None,
        start: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
        end: NaiveTime::from_hms_opt(hour + 1, 0, 0).unwrap(),
    }
}

fn teacher(id: u32, name: &str) -> Teacher {
    Teacher {
        id,
        name: name.into(),
        email: format!("{}@school.test", name.to_lowercase()),
        department: "General".into(),
        max_lectures_per_week: 18,
    }
}

fn subject(id: u32, code: &str, practical: bool, teachers: Vec<u32>, classes: Vec<u32>) -> Subject {
    Subject {
        id,
        name: code.into(),
        code: code.into(),
        teachers,
        classes,
        is_practical: practical,
    }
}

fn room(id: u32, name: &str, is_lab: bool) -> Room {
    Room {
        id,
        name: name.into(),
        is_lab,
    }
}

fn class(id: u32, name: &str) -> Class {
    Class {
        id,
        name: name.into(),
    }
}

/// Two classes sharing one subject, one teacher and one classroom.
fn one_room_school() -> EntitySnapshot {
    EntitySnapshot {
        teachers: vec![teacher(1, "Ada")],
        classes: vec![class(1, "7A"), class(2, "7B")],
        subjects: vec![subject(1, "MATH", false, vec![1], vec![1, 2])],
        rooms: vec![room(1, "R101", false)],
        time_slots: vec![slot(1, 9), slot(2, 10)],
    }
}

/// A week of 8 slots, 3 classes, labs and classrooms, several qualified teachers.
fn department() -> EntitySnapshot {
    EntitySnapshot {
        teachers: vec![
            teacher(1, "Ada"),
            teacher(2, "Grace"),
            teacher(3, "Alan"),
            teacher(4, "Barbara"),
        ],
        classes: vec![class(1, "10A"), class(2, "10B"), class(3, "10C")],
        subjects: vec![
            subject(1, "MATH", false, vec![1, 2], vec![1, 2, 3]),
            subject(2, "CS", false, vec![3], vec![1, 2, 3]),
            subject(3, "PHY-LAB", true, vec![2, 4], vec![1, 2, 3]),
            subject(4, "BIO", false, vec![4, 1], vec![2, 3]),
        ],
        rooms: vec![
            room(1, "R1", false),
            room(2, "R2", false),
            room(3, "Lab 1", true),
            room(4, "Lab 2", true),
        ],
        time_slots: (0..8).map(|i| slot(i + 1, 8 + i)).collect(),
    }
}

fn entry_set(timetable: &Timetable) -> HashSet<(u32, u32, u32, u32, u32)> {
    timetable
        .entries()
        .iter()
        .map(|e| (e.class_id, e.subject_id, e.teacher_id, e.room_id, e.time_slot_id))
        .collect()
}

#[test]
fn test_department_schedule_satisfies_all_rules() {
    let snapshot = department();
    let config = GenerationConfig::default()
        .with_seed(2024)
        .with_frequency("MATH", 2);
    let timetable = generate(&snapshot, &config).unwrap();
    assert!(timetable.is_solved());
    assert_eq!(timetable.seed(), 2024);

    let entries = timetable.entries();
    // MATH 2x3, CS 3, PHY 3, BIO 2
    assert_eq!(entries.len(), 14);
    assert!(audit_entries(&snapshot, &config, entries).is_empty());
    assert!(coverage_gaps(&snapshot, &config, entries).is_empty());

    // grouped by class, then chronological within a class
    for pair in entries.windows(2) {
        assert!(
            pair[0].class_id < pair[1].class_id
                || (pair[0].class_id == pair[1].class_id
                    && pair[0].time_slot_id < pair[1].time_slot_id)
        );
    }
}

#[test]
fn test_practical_subjects_only_in_labs() {
    let snapshot = department();
    let config = GenerationConfig::default().with_seed(7);
    let timetable = generate(&snapshot, &config).unwrap();
    for entry in timetable.entries() {
        let practical = snapshot
            .subjects
            .iter()
            .find(|s| s.id == entry.subject_id)
            .unwrap()
            .is_practical;
        let lab = snapshot.rooms.iter().find(|r| r.id == entry.room_id).unwrap().is_lab;
        assert_eq!(practical, lab, "{:?}", entry);
    }
}

#[test]
fn test_same_seed_reproduces_schedule() {
    let snapshot = department();
    let config = GenerationConfig::default().with_seed(31337);
    let first = generate(&snapshot, &config).unwrap();
    let second = generate(&snapshot, &config).unwrap();
    assert_eq!(first.entries(), second.entries());
}

#[test]
fn test_different_seeds_diversify_schedule() {
    let snapshot = department();
    let schedules: HashSet<Vec<(u32, u32, u32, u32, u32)>> = (0..12)
        .map(|seed| {
            let config = GenerationConfig::default().with_seed(seed);
            let timetable = generate(&snapshot, &config).unwrap();
            let mut entries: Vec<_> = entry_set(&timetable).into_iter().collect();
            entries.sort();
            entries
        })
        .collect();
    assert!(schedules.len() > 1);
}

#[test]
fn test_missing_seed_is_reported_for_replay() {
    let snapshot = department();
    let first = generate(&snapshot, &GenerationConfig::default()).unwrap();
    let replay = generate(
        &snapshot,
        &GenerationConfig::default().with_seed(first.seed()),
    )
    .unwrap();
    assert_eq!(first.entries(), replay.entries());
}

#[test]
fn test_one_room_back_to_back_is_infeasible() {
    let timetable = generate(&one_room_school(), &GenerationConfig::default().with_seed(1)).unwrap();
    match timetable {
        Timetable::NoFeasibleSchedule {
            diagnostic: Diagnostic::Infeasible { best_effort },
            ..
        } => assert!(best_effort.is_none()),
        other => panic!("expected infeasible, got {:?}", other),
    }
}

#[test]
fn test_one_room_best_effort_places_one_class() {
    let mut config = GenerationConfig::default().with_seed(1);
    config.best_effort = true;
    let snapshot = one_room_school();
    let timetable = generate(&snapshot, &config).unwrap();
    assert!(!timetable.is_solved());
    assert_eq!(timetable.entries().len(), 1);
    assert!(audit_entries(&snapshot, &config, timetable.entries()).is_empty());
}

#[test]
fn test_one_room_without_spacing_uses_both_slots() {
    let snapshot = one_room_school();
    let config = GenerationConfig::default()
        .with_seed(1)
        .with_teacher_spacing(false);
    let timetable = generate(&snapshot, &config).unwrap();
    assert!(timetable.is_solved());
    let slots: HashSet<u32> = timetable.entries().iter().map(|e| e.time_slot_id).collect();
    assert_eq!(slots.len(), 2);
}

#[test]
fn test_practical_subject_without_labs_never_gets_classroom() {
    let mut snapshot = one_room_school();
    snapshot.subjects[0].is_practical = true;
    let err = generate(&snapshot, &GenerationConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        ScheduleError::ModelInfeasibleByConstruction(ConstructionConflict::NoEligibleRoom { .. })
    ));
}

#[test]
fn test_subject_without_teachers_is_rejected() {
    let mut snapshot = one_room_school();
    snapshot.subjects[0].teachers.clear();
    let err = generate(&snapshot, &GenerationConfig::default()).unwrap_err();
    assert_eq!(err.kind(), "modelInfeasibleByConstruction");
}

#[test]
fn test_dangling_class_reference_is_rejected() {
    let mut snapshot = one_room_school();
    snapshot.subjects[0].classes.push(42);
    let err = generate(&snapshot, &GenerationConfig::default()).unwrap_err();
    assert_eq!(
        err,
        ScheduleError::InvalidEntityReference(InvalidReference::UnknownClass {
            subject: "MATH".into(),
            class: 42
        })
    );
}

#[test]
fn test_overflowing_frequencies_are_a_construction_error() {
    let mut snapshot = one_room_school();
    snapshot.subjects = vec![
        subject(1, "MATH", false, vec![1], vec![1]),
        subject(2, "ART", false, vec![1], vec![1]),
    ];
    let config = GenerationConfig::default()
        .with_frequency("MATH", u32::MAX)
        .with_frequency("ART", 2);
    let err = generate(&snapshot, &config).unwrap_err();
    assert_eq!(
        err,
        ScheduleError::ModelInfeasibleByConstruction(ConstructionConflict::ClassOverbooked {
            class: 1,
            demand: u64::from(u32::MAX) + 2,
            slots: 2,
        })
    );
}

#[test]
fn test_step_budget_yields_partial_schedule() {
    let snapshot = department();
    let config = GenerationConfig::default()
        .with_seed(3)
        .with_budget(TimeBudget::steps(3));
    let timetable = generate(&snapshot, &config).unwrap();
    match &timetable {
        Timetable::NoFeasibleSchedule {
            diagnostic: Diagnostic::TimedOut { partial },
            ..
        } => {
            assert!(partial.partial);
            assert!(partial.entries.len() < 11);
            assert!(audit_entries(&snapshot, &config, &partial.entries).is_empty());
        }
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[test]
fn test_cancelled_request_times_out() {
    let token = CancelToken::new();
    token.cancel();
    let config = GenerationConfig::default()
        .with_seed(3)
        .with_budget(TimeBudget::unlimited());
    let timetable = generate_with_cancel(&department(), &config, Some(token)).unwrap();
    assert!(matches!(
        timetable,
        Timetable::NoFeasibleSchedule {
            diagnostic: Diagnostic::TimedOut { .. },
            ..
        }
    ));
}

#[test]
fn test_ilp_engine_produces_valid_schedule() {
    let snapshot = one_room_school();
    let config = GenerationConfig::default()
        .with_seed(5)
        .with_teacher_spacing(false)
        .with_engine(EngineKind::Ilp);
    let timetable = generate(&snapshot, &config).unwrap();
    assert!(timetable.is_solved());
    assert_eq!(timetable.entries().len(), 2);
    assert!(audit_entries(&snapshot, &config, timetable.entries()).is_empty());
}

#[test]
fn test_parallel_requests_are_independent() {
    let snapshot = department();
    let expected = generate(&snapshot, &GenerationConfig::default().with_seed(77)).unwrap();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let snapshot = snapshot.clone();
            std::thread::spawn(move || {
                generate(&snapshot, &GenerationConfig::default().with_seed(77)).unwrap()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap().entries(), expected.entries());
    }
}
