//! Translation of an entity snapshot into a boolean capacity model.
//!
//! Every feasible (subject, class, teacher, room, slot) combination becomes one
//! boolean candidate. Combinations that break room type, teacher qualification
//! or class membership are never materialized. The remaining hard rules are
//! expressed as:
//!
//! - **Coverage**: each (subject, class) requirement takes exactly `need`
//!   candidates.
//! - **Capacity groups**: at most `capacity` candidates of a group are chosen.
//!   Clashes (class/teacher/room per slot), teacher spacing over adjacent
//!   slots and teacher weekly load are all capacity groups.

use crate::data::{
    ClassId, EntitySnapshot, GenerationConfig, RoomId, SubjectId, TeacherId, TimeSlotId,
};
use crate::error::{ConstructionConflict, InvalidReference, ScheduleError};
use crate::seed::SeedController;
use itertools::{Itertools, iproduct};
use log::{debug, info, trace, warn};
use std::collections::{BTreeMap, HashMap};

/// One boolean decision: teach `requirement` with `teacher` in `room` at `slot`.
///
/// All fields are positions in the snapshot's vectors, not entity ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub requirement: usize,
    pub teacher: usize,
    pub room: usize,
    pub slot: usize,
}

/// A class must receive a subject `need` times per week.
#[derive(Debug, Clone)]
pub struct Requirement {
    pub subject: usize,
    pub class: usize,
    pub need: u32,
    pub candidates: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupKind {
    ClassSlot,
    TeacherSlot,
    RoomSlot,
    TeacherSpacing,
    TeacherLoad,
}

/// At most `capacity` of `members` may be chosen.
#[derive(Debug, Clone)]
pub struct CapacityGroup {
    pub kind: GroupKind,
    pub capacity: u32,
    pub members: Vec<usize>,
}

/// The constraint model of one generation request.
#[derive(Debug)]
pub struct TimetableModel<'a> {
    snapshot: &'a EntitySnapshot,
    requirements: Vec<Requirement>,
    candidates: Vec<Candidate>,
    groups: Vec<CapacityGroup>,
    memberships: Vec<Vec<usize>>,
    slot_rank: Vec<usize>,
    chronological: Vec<usize>,
    adjacent_pairs: Vec<(usize, usize)>,
    teacher_spacing: bool,
    teacher_load: bool,
}

impl<'a> TimetableModel<'a> {
    pub fn snapshot(&self) -> &'a EntitySnapshot {
        self.snapshot
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn groups(&self) -> &[CapacityGroup] {
        &self.groups
    }

    /// Capacity groups a candidate belongs to.
    pub fn memberships(&self, candidate: usize) -> &[usize] {
        &self.memberships[candidate]
    }

    /// Position of a slot in the chronological weekly order.
    pub fn slot_rank(&self, slot: usize) -> usize {
        self.slot_rank[slot]
    }

    /// Slots in chronological weekly order.
    pub fn chronological_slots(&self) -> &[usize] {
        &self.chronological
    }

    /// Consecutive slots on the same day, as (earlier, later).
    pub fn adjacent_pairs(&self) -> &[(usize, usize)] {
        &self.adjacent_pairs
    }

    pub fn spaces_teachers(&self) -> bool {
        self.teacher_spacing
    }

    /// Weekly lesson limit of a teacher, when loads are enforced.
    pub fn load_limit(&self, teacher: usize) -> Option<u32> {
        self.teacher_load
            .then(|| self.snapshot.teachers[teacher].max_lectures_per_week)
    }

    pub fn variable_count(&self) -> usize {
        self.candidates.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.groups.len() + self.requirements.len()
    }

    /// Total number of lessons that must be placed.
    pub fn total_demand(&self) -> u64 {
        self.requirements.iter().map(|r| u64::from(r.need)).sum()
    }

    pub fn groups_of_kind(&self, kind: GroupKind) -> impl Iterator<Item = &CapacityGroup> {
        self.groups.iter().filter(move |g| g.kind == kind)
    }
}

/// Id → position lookups built once per snapshot.
struct EntityIndex {
    teachers: HashMap<TeacherId, usize>,
    classes: HashMap<ClassId, usize>,
}

impl EntityIndex {
    fn build(snapshot: &EntitySnapshot) -> Result<Self, InvalidReference> {
        check_unique("teacher", snapshot.teachers.iter().map(|t| t.id))?;
        check_unique("class", snapshot.classes.iter().map(|c| c.id))?;
        check_unique("subject", snapshot.subjects.iter().map(|s| s.id))?;
        check_unique("room", snapshot.rooms.iter().map(|r| r.id))?;
        check_unique("time slot", snapshot.time_slots.iter().map(|s| s.id))?;

        if let Some(code) = snapshot.subjects.iter().map(|s| &s.code).duplicates().next() {
            return Err(InvalidReference::DuplicateSubjectCode(code.clone()));
        }
        if let Some(slot) = snapshot.time_slots.iter().find(|s| s.end <= s.start) {
            return Err(InvalidReference::EmptyTimeSlot(slot.id));
        }

        let index = Self {
            teachers: positions(snapshot.teachers.iter().map(|t| t.id)),
            classes: positions(snapshot.classes.iter().map(|c| c.id)),
        };

        for subject in &snapshot.subjects {
            if let Some(&teacher) = subject
                .teachers
                .iter()
                .find(|id| !index.teachers.contains_key(id))
            {
                return Err(InvalidReference::UnknownTeacher {
                    subject: subject.code.clone(),
                    teacher,
                });
            }
            if let Some(&class) = subject
                .classes
                .iter()
                .find(|id| !index.classes.contains_key(id))
            {
                return Err(InvalidReference::UnknownClass {
                    subject: subject.code.clone(),
                    class,
                });
            }
        }

        Ok(index)
    }
}

fn check_unique(entity: &'static str, ids: impl Iterator<Item = u32>) -> Result<(), InvalidReference> {
    match ids.duplicates().next() {
        Some(id) => Err(InvalidReference::DuplicateId { entity, id }),
        None => Ok(()),
    }
}

fn positions(ids: impl Iterator<Item = u32>) -> HashMap<u32, usize> {
    ids.enumerate().map(|(pos, id)| (id, pos)).collect()
}

/// Builds a [`TimetableModel`] from a snapshot and a configuration.
pub struct ModelBuilder<'a> {
    snapshot: &'a EntitySnapshot,
    config: &'a GenerationConfig,
}

impl<'a> ModelBuilder<'a> {
    pub fn new(snapshot: &'a EntitySnapshot, config: &'a GenerationConfig) -> Self {
        Self { snapshot, config }
    }

    /// Validates the snapshot, runs the construction-time feasibility checks
    /// and materializes candidates and constraint groups.
    ///
    /// Room and slot iteration order is shuffled with `seeds`, which fixes the
    /// candidate order the engines see.
    pub fn build(&self, seeds: &mut SeedController) -> Result<TimetableModel<'a>, ScheduleError> {
        let snapshot = self.snapshot;
        let index = EntityIndex::build(snapshot)?;

        if let Some(code) = self
            .config
            .per_subject_frequency
            .keys()
            .find(|code| !snapshot.subjects.iter().any(|s| &s.code == *code))
        {
            return Err(InvalidReference::UnknownSubjectCode(code.clone()).into());
        }

        info!(
            "Building model from {} subjects, {} classes, {} teachers, {} rooms and {} time slots...",
            snapshot.subjects.len(),
            snapshot.classes.len(),
            snapshot.teachers.len(),
            snapshot.rooms.len(),
            snapshot.time_slots.len()
        );

        // chronological order and adjacency of the weekly grid
        let chronological: Vec<usize> = (0..snapshot.time_slots.len())
            .sorted_by_key(|&i| snapshot.time_slots[i].chronological_key())
            .collect();
        let mut slot_rank = vec![0; chronological.len()];
        for (rank, &slot) in chronological.iter().enumerate() {
            slot_rank[slot] = rank;
        }
        let adjacent_pairs: Vec<(usize, usize)> = chronological
            .iter()
            .tuple_windows()
            .filter(|&(&a, &b)| snapshot.time_slots[a].day == snapshot.time_slots[b].day)
            .map(|(&a, &b)| (a, b))
            .collect();

        // lab / classroom partition, shuffled so symmetric rooms are not always favoured
        let (mut labs, mut classrooms): (Vec<usize>, Vec<usize>) =
            (0..snapshot.rooms.len()).partition(|&r| snapshot.rooms[r].is_lab);
        seeds.shuffle(&mut labs);
        seeds.shuffle(&mut classrooms);
        let mut slot_order: Vec<usize> = (0..snapshot.time_slots.len()).collect();
        seeds.shuffle(&mut slot_order);

        let mut requirements = Vec::new();
        let mut eligible_teachers: Vec<Vec<usize>> = Vec::new();
        for (subject_pos, subject) in snapshot.subjects.iter().enumerate() {
            let need = self.config.frequency_of(&subject.code);
            if need == 0 {
                trace!("Subject '{}' has frequency 0, skipping.", subject.code);
                continue;
            }
            if subject.classes.is_empty() {
                warn!("Subject '{}' has no target classes; nothing to schedule.", subject.code);
                continue;
            }

            let teachers: Vec<usize> = subject
                .teachers
                .iter()
                .map(|id| index.teachers[id])
                .unique()
                .filter(|&t| {
                    !self.config.enforce_teacher_load
                        || snapshot.teachers[t].max_lectures_per_week > 0
                })
                .collect();
            if teachers.is_empty() {
                return Err(ConstructionConflict::NoQualifiedTeacher(subject.code.clone()).into());
            }
            let rooms = if subject.is_practical { &labs } else { &classrooms };
            if rooms.is_empty() {
                return Err(ConstructionConflict::NoEligibleRoom {
                    subject: subject.code.clone(),
                    practical: subject.is_practical,
                }
                .into());
            }
            if snapshot.time_slots.is_empty() {
                return Err(ConstructionConflict::NoTimeSlots.into());
            }

            for class_pos in subject.classes.iter().map(|id| index.classes[id]).unique() {
                requirements.push(Requirement {
                    subject: subject_pos,
                    class: class_pos,
                    need,
                    candidates: Vec::new(),
                });
                eligible_teachers.push(teachers.clone());
            }
        }

        self.check_capacity(&requirements, &eligible_teachers)?;

        let mut candidates = Vec::new();
        for (req_pos, requirement) in requirements.iter_mut().enumerate() {
            let practical = snapshot.subjects[requirement.subject].is_practical;
            let rooms = if practical { &labs } else { &classrooms };
            for (&slot, &room, &teacher) in
                iproduct!(slot_order.iter(), rooms.iter(), eligible_teachers[req_pos].iter())
            {
                requirement.candidates.push(candidates.len());
                candidates.push(Candidate {
                    requirement: req_pos,
                    teacher,
                    room,
                    slot,
                });
            }
        }
        trace!(
            "Generated {} candidate variables out of a theoretical maximum of {}.",
            candidates.len(),
            requirements.len() * snapshot.teachers.len() * snapshot.rooms.len() * snapshot.time_slots.len()
        );

        let groups = self.build_groups(&requirements, &candidates, &adjacent_pairs);
        let mut memberships = vec![Vec::new(); candidates.len()];
        for (group_pos, group) in groups.iter().enumerate() {
            for &member in &group.members {
                memberships[member].push(group_pos);
            }
        }

        let model = TimetableModel {
            snapshot,
            requirements,
            candidates,
            groups,
            memberships,
            slot_rank,
            chronological,
            adjacent_pairs,
            teacher_spacing: self.config.enforce_teacher_spacing,
            teacher_load: self.config.enforce_teacher_load,
        };
        info!(
            "Model built: {} requirements ({} lessons), {} variables, {} constraints.",
            model.requirements.len(),
            model.total_demand(),
            model.variable_count(),
            model.constraint_count()
        );
        Ok(model)
    }

    /// Counting arguments that prove infeasibility before any search.
    fn check_capacity(
        &self,
        requirements: &[Requirement],
        eligible_teachers: &[Vec<usize>],
    ) -> Result<(), ConstructionConflict> {
        let snapshot = self.snapshot;
        let slots = snapshot.time_slots.len() as u32;

        // summed in u64: one frequency alone may be u32::MAX
        let mut class_demand: BTreeMap<usize, u64> = BTreeMap::new();
        for requirement in requirements {
            *class_demand.entry(requirement.class).or_default() += u64::from(requirement.need);
        }
        for (&class, &demand) in &class_demand {
            if demand > u64::from(slots) {
                return Err(ConstructionConflict::ClassOverbooked {
                    class: snapshot.classes[class].id,
                    demand,
                    slots,
                });
            }
        }

        let lab_count = snapshot.rooms.iter().filter(|r| r.is_lab).count() as u32;
        let classroom_count = snapshot.rooms.len() as u32 - lab_count;
        for (lab, rooms) in [(true, lab_count), (false, classroom_count)] {
            let demand: u64 = requirements
                .iter()
                .filter(|r| snapshot.subjects[r.subject].is_practical == lab)
                .map(|r| u64::from(r.need))
                .sum();
            let capacity = u64::from(rooms) * u64::from(slots);
            if demand > capacity {
                return Err(ConstructionConflict::RoomCapacityExceeded {
                    lab,
                    demand,
                    capacity,
                });
            }
        }

        // a teacher who is the only option for some lessons must fit all of them
        let mut sole_demand: BTreeMap<usize, u64> = BTreeMap::new();
        for (requirement, teachers) in requirements.iter().zip(eligible_teachers) {
            if let [only] = teachers.as_slice() {
                *sole_demand.entry(*only).or_default() += u64::from(requirement.need);
            }
        }
        for (&teacher, &demand) in &sole_demand {
            let mut capacity = slots;
            if self.config.enforce_teacher_load {
                capacity = capacity.min(snapshot.teachers[teacher].max_lectures_per_week);
            }
            if demand > u64::from(capacity) {
                return Err(ConstructionConflict::TeacherOverloaded {
                    teacher: snapshot.teachers[teacher].id,
                    demand,
                    capacity,
                });
            }
        }

        Ok(())
    }

    fn build_groups(
        &self,
        requirements: &[Requirement],
        candidates: &[Candidate],
        adjacent_pairs: &[(usize, usize)],
    ) -> Vec<CapacityGroup> {
        let mut class_slot: BTreeMap<(usize, usize), Vec<usize>> = BTreeMap::new();
        let mut teacher_slot: BTreeMap<(usize, usize), Vec<usize>> = BTreeMap::new();
        let mut room_slot: BTreeMap<(usize, usize), Vec<usize>> = BTreeMap::new();
        let mut teacher_all: BTreeMap<usize, Vec<usize>> = BTreeMap::new();

        for (pos, candidate) in candidates.iter().enumerate() {
            let class = requirements[candidate.requirement].class;
            class_slot.entry((class, candidate.slot)).or_default().push(pos);
            teacher_slot
                .entry((candidate.teacher, candidate.slot))
                .or_default()
                .push(pos);
            room_slot.entry((candidate.room, candidate.slot)).or_default().push(pos);
            teacher_all.entry(candidate.teacher).or_default().push(pos);
        }

        let mut groups = Vec::new();
        let mut push = |kind: GroupKind, capacity: u32, members: Vec<usize>| {
            // groups that can never overflow constrain nothing
            if members.len() > capacity as usize {
                groups.push(CapacityGroup {
                    kind,
                    capacity,
                    members,
                });
            }
        };

        for members in class_slot.into_values() {
            push(GroupKind::ClassSlot, 1, members);
        }
        for members in room_slot.into_values() {
            push(GroupKind::RoomSlot, 1, members);
        }
        if self.config.enforce_teacher_spacing {
            let teachers: Vec<usize> = teacher_all.keys().copied().collect();
            for (teacher, &(a, b)) in iproduct!(teachers, adjacent_pairs.iter()) {
                let members: Vec<usize> = teacher_slot
                    .get(&(teacher, a))
                    .into_iter()
                    .chain(teacher_slot.get(&(teacher, b)))
                    .flatten()
                    .copied()
                    .collect();
                push(GroupKind::TeacherSpacing, 1, members);
            }
        }
        for members in teacher_slot.into_values() {
            push(GroupKind::TeacherSlot, 1, members);
        }
        if self.config.enforce_teacher_load {
            for (teacher, members) in teacher_all {
                let capacity = self.snapshot.teachers[teacher].max_lectures_per_week;
                push(GroupKind::TeacherLoad, capacity, members);
            }
        }

        debug!(
            "Constraint groups: {}",
            groups
                .iter()
                .counts_by(|g| g.kind)
                .into_iter()
                .sorted()
                .map(|(kind, count)| format!("{:?}={}", kind, count))
                .join(", ")
        );
        groups
    }
}

/// Entity ids of a candidate, for logs and diagnostics.
pub fn describe_candidate(
    model: &TimetableModel<'_>,
    candidate: &Candidate,
) -> (SubjectId, ClassId, TeacherId, RoomId, TimeSlotId) {
    let snapshot = model.snapshot();
    let requirement = &model.requirements()[candidate.requirement];
    (
        snapshot.subjects[requirement.subject].id,
        snapshot.classes[requirement.class].id,
        snapshot.teachers[candidate.teacher].id,
        snapshot.rooms[candidate.room].id,
        snapshot.time_slots[candidate.slot].id,
    )
}
