use crate::data::{ClassId, TeacherId, TimeSlotId};
use thiserror::Error;

/// Errors that stop a generation request before any search runs.
///
/// Search outcomes (infeasible, timed out) are not errors; they are reported
/// through [`crate::data::Timetable`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("invalid entity reference: {0}")]
    InvalidEntityReference(#[from] InvalidReference),
    #[error("model infeasible by construction: {0}")]
    ModelInfeasibleByConstruction(#[from] ConstructionConflict),
}

impl ScheduleError {
    /// Stable machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            ScheduleError::InvalidEntityReference(_) => "invalidEntityReference",
            ScheduleError::ModelInfeasibleByConstruction(_) => "modelInfeasibleByConstruction",
        }
    }
}

/// The snapshot is not referentially sound.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidReference {
    #[error("duplicate {entity} id {id}")]
    DuplicateId { entity: &'static str, id: u32 },
    #[error("duplicate subject code '{0}'")]
    DuplicateSubjectCode(String),
    #[error("subject '{subject}' references unknown teacher {teacher}")]
    UnknownTeacher { subject: String, teacher: TeacherId },
    #[error("subject '{subject}' references unknown class {class}")]
    UnknownClass { subject: String, class: ClassId },
    #[error("frequency configured for unknown subject code '{0}'")]
    UnknownSubjectCode(String),
    #[error("time slot {0} does not end after it starts")]
    EmptyTimeSlot(TimeSlotId),
}

/// Coverage is provably impossible without searching.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstructionConflict {
    #[error("subject '{0}' has no eligible teacher")]
    NoQualifiedTeacher(String),
    #[error("subject '{subject}' needs a {} but none exists", room_kind(.practical))]
    NoEligibleRoom { subject: String, practical: bool },
    #[error("no time slots are defined")]
    NoTimeSlots,
    #[error("class {class} needs {demand} lessons but the week has {slots} slots")]
    ClassOverbooked {
        class: ClassId,
        demand: u64,
        slots: u32,
    },
    #[error("{demand} {} lessons exceed {capacity} room-slots", room_kind(.lab))]
    RoomCapacityExceeded { lab: bool, demand: u64, capacity: u64 },
    #[error("teacher {teacher} must give {demand} lessons but can give at most {capacity}")]
    TeacherOverloaded {
        teacher: TeacherId,
        demand: u64,
        capacity: u32,
    },
}

fn room_kind(lab: &bool) -> &'static str {
    if *lab { "lab" } else { "classroom" }
}
