//! Validation errors raised by the domain rules.

use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("end time {end} must be after start time {start}")]
    StartNotBeforeEnd { start: NaiveTime, end: NaiveTime },

    #[error("weekday {0} is not a school day (1 = Monday .. 5 = Friday)")]
    InvalidWeekday(u8),

    #[error("lesson slot must be at least 1")]
    InvalidSlot,

    #[error("lesson {slot} would run past midnight")]
    SlotPastMidnight { slot: u32 },

    #[error("lesson {slot} on {day} is already taken by {subject}")]
    SlotTaken {
        day: &'static str,
        slot: u32,
        subject: String,
    },

    #[error("overlaps with {subject} ({start} - {end})")]
    Overlap {
        subject: String,
        start: NaiveTime,
        end: NaiveTime,
    },

    #[error("{field} must not be before {start}")]
    DateOrder {
        field: &'static str,
        start: NaiveDate,
    },

    #[error("deadline {0} is in the past")]
    DeadlineInPast(NaiveDate),

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{field} must have at least {min} characters")]
    TooShort { field: &'static str, min: usize },

    #[error("absences and late arrivals cannot carry a value")]
    UnexpectedValue,

    #[error("only unexcused absences can be excused")]
    NotAnAbsence,

    #[error("{0}")]
    Forbidden(&'static str),
}

impl ValidationError {
    /// Errors caused by another row already holding the requested place.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            ValidationError::SlotTaken { .. } | ValidationError::Overlap { .. }
        )
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, ValidationError::Forbidden(_))
    }
}
