//! Weekly schedule rules: slot arithmetic, conflict checks and temporary changes.

use crate::{
    ChangeKind, ClassScheduleEntryDraft, ClassScheduleEntryRecord, DEFAULT_BREAK_MINUTES,
    DEFAULT_DAY_START_HOUR, DEFAULT_LESSON_MINUTES, ProfileRecord, ScheduleChangeDraft,
    ScheduleChangeRecord, ScheduleEntryRecord, ValidationError,
};
use chrono::{NaiveDate, NaiveTime, TimeDelta};
use itertools::Itertools;
use std::collections::BTreeMap;

pub const WEEKDAY_NAMES: [&str; 5] = ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday"];

/// Name of a school day, 1 = Monday. Days outside 1..=5 have no name.
pub fn weekday_name(day: u8) -> &'static str {
    match day {
        1..=5 => WEEKDAY_NAMES[day as usize - 1],
        _ => "an unknown day",
    }
}

pub fn validate_weekday(day: u8) -> Result<(), ValidationError> {
    if (1..=5).contains(&day) {
        Ok(())
    } else {
        Err(ValidationError::InvalidWeekday(day))
    }
}

pub fn validate_slot(slot: u32) -> Result<(), ValidationError> {
    if slot >= 1 {
        Ok(())
    } else {
        Err(ValidationError::InvalidSlot)
    }
}

/// How a student's school day is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaySettings {
    pub day_start: NaiveTime,
    pub lesson_minutes: u32,
    pub break_minutes: u32,
}

impl Default for DaySettings {
    fn default() -> Self {
        Self {
            day_start: NaiveTime::from_hms_opt(DEFAULT_DAY_START_HOUR, 0, 0)
                .unwrap_or(NaiveTime::MIN),
            lesson_minutes: DEFAULT_LESSON_MINUTES,
            break_minutes: DEFAULT_BREAK_MINUTES,
        }
    }
}

impl From<&ProfileRecord> for DaySettings {
    fn from(profile: &ProfileRecord) -> Self {
        let defaults = DaySettings::default();
        Self {
            day_start: profile.day_start,
            lesson_minutes: if profile.lesson_minutes == 0 {
                defaults.lesson_minutes
            } else {
                profile.lesson_minutes
            },
            break_minutes: profile.break_minutes,
        }
    }
}

/// Start and end of the given lesson slot.
/// Slot `n` starts `(n - 1) * (lesson + break)` minutes after the day starts.
pub fn slot_times(
    settings: &DaySettings,
    slot: u32,
) -> Result<(NaiveTime, NaiveTime), ValidationError> {
    validate_slot(slot)?;
    let step = i64::from(settings.lesson_minutes) + i64::from(settings.break_minutes);
    let offset = TimeDelta::minutes(i64::from(slot - 1) * step);
    let (start, wrapped_start) = settings.day_start.overflowing_add_signed(offset);
    let (end, wrapped_end) =
        start.overflowing_add_signed(TimeDelta::minutes(i64::from(settings.lesson_minutes)));
    if wrapped_start != 0 || wrapped_end != 0 {
        return Err(ValidationError::SlotPastMidnight { slot });
    }
    Ok((start, end))
}

pub fn duration_minutes(start: NaiveTime, end: NaiveTime) -> i64 {
    (end - start).num_minutes()
}

/// A lesson placed on a weekday, with concrete times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedSlot {
    pub weekday: u8,
    pub slot: u32,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimedSlot {
    pub fn overlaps(&self, other: &TimedSlot) -> bool {
        self.weekday == other.weekday && self.start < other.end && self.end > other.start
    }
}

/// A lesson already in a schedule, with the subject name used in messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookedLesson {
    pub entry_id: u32,
    pub slot: TimedSlot,
    pub subject: String,
}

impl BookedLesson {
    pub fn from_entry(entry: &ScheduleEntryRecord, subject: impl Into<String>) -> Self {
        Self {
            entry_id: entry.entry_id,
            slot: TimedSlot {
                weekday: entry.weekday,
                slot: entry.slot,
                start: entry.start,
                end: entry.end,
            },
            subject: subject.into(),
        }
    }

    pub fn from_class_entry(entry: &ClassScheduleEntryRecord) -> Self {
        Self {
            entry_id: entry.entry_id,
            slot: TimedSlot {
                weekday: entry.weekday,
                slot: entry.slot,
                start: entry.start,
                end: entry.end,
            },
            subject: entry.subject_name.clone(),
        }
    }
}

/// Times, weekday and slot of a lesson, and whether another lesson holds the slot.
fn check_slot(
    candidate: &TimedSlot,
    editing: Option<u32>,
    booked: &[BookedLesson],
) -> Result<(), ValidationError> {
    if candidate.start >= candidate.end {
        return Err(ValidationError::StartNotBeforeEnd {
            start: candidate.start,
            end: candidate.end,
        });
    }
    validate_weekday(candidate.weekday)?;
    validate_slot(candidate.slot)?;

    match booked.iter().find(|b| {
        Some(b.entry_id) != editing
            && b.slot.weekday == candidate.weekday
            && b.slot.slot == candidate.slot
    }) {
        Some(other) => Err(ValidationError::SlotTaken {
            day: weekday_name(candidate.weekday),
            slot: candidate.slot,
            subject: other.subject.clone(),
        }),
        None => Ok(()),
    }
}

/// Check a lesson against the rest of its schedule.
///
/// `editing` is the id of the row being replaced, which never conflicts with itself.
/// Lessons on other weekdays are ignored.
pub fn validate_lesson(
    candidate: &TimedSlot,
    editing: Option<u32>,
    booked: &[BookedLesson],
) -> Result<(), ValidationError> {
    check_slot(candidate, editing, booked)?;

    let clash = booked.iter().find(|b| {
        Some(b.entry_id) != editing
            && b.slot.weekday == candidate.weekday
            && candidate.overlaps(&b.slot)
    });
    match clash {
        Some(other) => Err(ValidationError::Overlap {
            subject: other.subject.clone(),
            start: other.slot.start,
            end: other.slot.end,
        }),
        None => Ok(()),
    }
}

/// Check a class template lesson against the rest of the template.
///
/// Templates only guard their slots; times of neighbouring slots may overlap.
pub fn validate_class_entry(
    draft: &ClassScheduleEntryDraft,
    editing: Option<u32>,
    template: &[ClassScheduleEntryRecord],
) -> Result<(), ValidationError> {
    if draft.subject_name.trim().is_empty() {
        return Err(ValidationError::MissingField("subject_name"));
    }
    let booked: Vec<BookedLesson> = template.iter().map(BookedLesson::from_class_entry).collect();
    let candidate = TimedSlot {
        weekday: draft.weekday,
        slot: draft.slot,
        start: draft.start,
        end: draft.end,
    };
    check_slot(&candidate, editing, &booked)
}

/// Whether a temporary change applies on the given day.
pub fn is_change_active_on(change: &ScheduleChangeRecord, date: NaiveDate) -> bool {
    if date < change.starts_on {
        return false;
    }
    match change.ends_on {
        Some(ends_on) => date <= ends_on,
        None => true,
    }
}

pub fn validate_change(draft: &ScheduleChangeDraft) -> Result<(), ValidationError> {
    if let Some(ends_on) = draft.ends_on {
        if ends_on < draft.starts_on {
            return Err(ValidationError::DateOrder {
                field: "ends_on",
                start: draft.starts_on,
            });
        }
    }
    match draft.kind {
        ChangeKind::Moved => match (draft.new_start, draft.new_end) {
            (Some(start), Some(end)) if start >= end => {
                Err(ValidationError::StartNotBeforeEnd { start, end })
            }
            (Some(_), Some(_)) => Ok(()),
            (None, _) => Err(ValidationError::MissingField("new_start")),
            (_, None) => Err(ValidationError::MissingField("new_end")),
        },
        ChangeKind::Replaced if draft.new_subject_id.is_none() => {
            Err(ValidationError::MissingField("new_subject_id"))
        }
        ChangeKind::SubstituteTeacher if draft.substitute_teacher.trim().is_empty() => {
            Err(ValidationError::MissingField("substitute_teacher"))
        }
        _ => Ok(()),
    }
}

/// Group lessons by weekday, each day ordered by slot.
pub fn week_view(entries: &[ScheduleEntryRecord]) -> BTreeMap<u8, Vec<ScheduleEntryRecord>> {
    entries
        .iter()
        .cloned()
        .into_group_map_by(|e| e.weekday)
        .into_iter()
        .map(|(day, mut lessons)| {
            lessons.sort_by_key(|l| l.slot);
            (day, lessons)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LessonKind;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn booked(entry_id: u32, weekday: u8, slot: u32, start: NaiveTime, end: NaiveTime) -> BookedLesson {
        BookedLesson {
            entry_id,
            slot: TimedSlot {
                weekday,
                slot,
                start,
                end,
            },
            subject: format!("Subject {entry_id}"),
        }
    }

    #[test_log::test]
    fn test_slot_times_default_day() {
        let settings = DaySettings::default();
        assert_eq!(slot_times(&settings, 1).unwrap(), (t(8, 0), t(8, 50)));
        assert_eq!(slot_times(&settings, 3).unwrap(), (t(10, 0), t(10, 50)));
    }

    #[test_log::test]
    fn test_slot_times_custom_day() {
        let settings = DaySettings {
            day_start: t(7, 30),
            lesson_minutes: 45,
            break_minutes: 15,
        };
        assert_eq!(slot_times(&settings, 2).unwrap(), (t(8, 30), t(9, 15)));
    }

    #[test_log::test]
    fn test_slot_times_rejects_slot_zero_and_midnight() {
        let settings = DaySettings::default();
        assert_eq!(slot_times(&settings, 0), Err(ValidationError::InvalidSlot));
        assert_eq!(
            slot_times(&settings, 20),
            Err(ValidationError::SlotPastMidnight { slot: 20 })
        );
    }

    #[test_log::test]
    fn test_validate_lesson_start_before_end() {
        let candidate = TimedSlot {
            weekday: 1,
            slot: 1,
            start: t(9, 0),
            end: t(9, 0),
        };
        assert!(matches!(
            validate_lesson(&candidate, None, &[]),
            Err(ValidationError::StartNotBeforeEnd { .. })
        ));
    }

    #[test_log::test]
    fn test_validate_lesson_rejects_weekend() {
        let candidate = TimedSlot {
            weekday: 6,
            slot: 1,
            start: t(8, 0),
            end: t(8, 50),
        };
        assert_eq!(
            validate_lesson(&candidate, None, &[]),
            Err(ValidationError::InvalidWeekday(6))
        );
    }

    #[test_log::test]
    fn test_validate_lesson_slot_taken() {
        let existing = vec![booked(7, 2, 3, t(10, 0), t(10, 50))];
        let candidate = TimedSlot {
            weekday: 2,
            slot: 3,
            start: t(13, 0),
            end: t(13, 50),
        };
        let err = validate_lesson(&candidate, None, &existing).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(
            err.to_string(),
            "lesson 3 on Tuesday is already taken by Subject 7"
        );
    }

    #[test_log::test]
    fn test_validate_lesson_overlap() {
        let existing = vec![booked(1, 1, 1, t(8, 0), t(8, 50))];
        let candidate = TimedSlot {
            weekday: 1,
            slot: 2,
            start: t(8, 40),
            end: t(9, 30),
        };
        assert!(matches!(
            validate_lesson(&candidate, None, &existing),
            Err(ValidationError::Overlap { .. })
        ));
    }

    #[test_log::test]
    fn test_validate_lesson_touching_intervals_do_not_overlap() {
        let existing = vec![booked(1, 1, 1, t(8, 0), t(8, 50))];
        let candidate = TimedSlot {
            weekday: 1,
            slot: 2,
            start: t(8, 50),
            end: t(9, 40),
        };
        assert!(validate_lesson(&candidate, None, &existing).is_ok());
    }

    #[test_log::test]
    fn test_validate_lesson_ignores_self_and_other_days() {
        let existing = vec![
            booked(1, 1, 1, t(8, 0), t(8, 50)),
            booked(2, 2, 1, t(8, 0), t(8, 50)),
        ];
        let candidate = TimedSlot {
            weekday: 1,
            slot: 1,
            start: t(8, 10),
            end: t(9, 0),
        };
        assert!(validate_lesson(&candidate, Some(1), &existing).is_ok());
    }

    #[test_log::test]
    fn test_validate_class_entry_requires_subject() {
        let draft = ClassScheduleEntryDraft {
            weekday: 1,
            slot: 1,
            start: t(8, 0),
            end: t(8, 50),
            subject_name: "  ".to_string(),
            subject_color: None,
            room: String::new(),
            notes: String::new(),
            kind: LessonKind::Normal,
        };
        assert_eq!(
            validate_class_entry(&draft, None, &[]),
            Err(ValidationError::MissingField("subject_name"))
        );
    }

    fn class_entry(entry_id: u32, slot: u32, start: NaiveTime, end: NaiveTime) -> ClassScheduleEntryRecord {
        ClassScheduleEntryRecord {
            entry_id,
            class_room_id: 4,
            weekday: 1,
            slot,
            start,
            end,
            subject_name: "Math".to_string(),
            subject_color: "#007bff".to_string(),
            room: String::new(),
            notes: String::new(),
            kind: LessonKind::Normal,
        }
    }

    #[test_log::test]
    fn test_validate_class_entry_allows_overlapping_slots() {
        let template = vec![class_entry(1, 1, t(8, 0), t(8, 50))];
        let draft = ClassScheduleEntryDraft {
            weekday: 1,
            slot: 2,
            start: t(8, 30),
            end: t(9, 20),
            subject_name: "Physics".to_string(),
            subject_color: None,
            room: String::new(),
            notes: String::new(),
            kind: LessonKind::Normal,
        };
        assert_eq!(validate_class_entry(&draft, None, &template), Ok(()));

        let same_slot = ClassScheduleEntryDraft { slot: 1, ..draft.clone() };
        assert!(matches!(
            validate_class_entry(&same_slot, None, &template),
            Err(ValidationError::SlotTaken { slot: 1, .. })
        ));
        assert_eq!(validate_class_entry(&same_slot, Some(1), &template), Ok(()));

        let backwards = ClassScheduleEntryDraft {
            start: t(9, 20),
            end: t(8, 30),
            ..draft
        };
        assert!(matches!(
            validate_class_entry(&backwards, None, &template),
            Err(ValidationError::StartNotBeforeEnd { .. })
        ));
    }

    fn change(kind: ChangeKind) -> ScheduleChangeDraft {
        ScheduleChangeDraft {
            entry_id: 1,
            kind,
            starts_on: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            ends_on: None,
            reason: String::new(),
            new_start: None,
            new_end: None,
            new_room: String::new(),
            new_subject_id: None,
            substitute_teacher: String::new(),
        }
    }

    #[test_log::test]
    fn test_validate_change_rules() {
        assert!(validate_change(&change(ChangeKind::Cancelled)).is_ok());
        assert_eq!(
            validate_change(&change(ChangeKind::Moved)),
            Err(ValidationError::MissingField("new_start"))
        );
        assert_eq!(
            validate_change(&change(ChangeKind::Replaced)),
            Err(ValidationError::MissingField("new_subject_id"))
        );
        assert_eq!(
            validate_change(&change(ChangeKind::SubstituteTeacher)),
            Err(ValidationError::MissingField("substitute_teacher"))
        );

        let mut moved = change(ChangeKind::Moved);
        moved.new_start = Some(t(12, 0));
        moved.new_end = Some(t(12, 50));
        assert!(validate_change(&moved).is_ok());

        let mut backwards = change(ChangeKind::Cancelled);
        backwards.ends_on = NaiveDate::from_ymd_opt(2025, 3, 9);
        assert!(matches!(
            validate_change(&backwards),
            Err(ValidationError::DateOrder { .. })
        ));
    }

    #[test_log::test]
    fn test_change_active_window() {
        let record = ScheduleChangeRecord {
            change_id: 1,
            user_id: 1,
            entry_id: 1,
            kind: ChangeKind::Cancelled,
            starts_on: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            ends_on: NaiveDate::from_ymd_opt(2025, 3, 12),
            reason: String::new(),
            new_start: None,
            new_end: None,
            new_room: String::new(),
            new_subject_id: None,
            substitute_teacher: String::new(),
        };
        let day = |d| NaiveDate::from_ymd_opt(2025, 3, d).unwrap();
        assert!(!is_change_active_on(&record, day(9)));
        assert!(is_change_active_on(&record, day(10)));
        assert!(is_change_active_on(&record, day(12)));
        assert!(!is_change_active_on(&record, day(13)));

        let open_ended = ScheduleChangeRecord {
            ends_on: None,
            ..record
        };
        assert!(is_change_active_on(&open_ended, day(30)));
    }

    #[test_log::test]
    fn test_week_view_groups_and_orders() {
        let entry = |entry_id, weekday, slot| ScheduleEntryRecord {
            entry_id,
            user_id: 1,
            subject_id: 1,
            weekday,
            slot,
            start: t(8, 0),
            end: t(8, 50),
            room: String::new(),
            notes: String::new(),
            kind: LessonKind::Normal,
        };
        let view = week_view(&[entry(1, 2, 3), entry(2, 1, 1), entry(3, 2, 1)]);
        assert_eq!(view.len(), 2);
        let tuesday: Vec<u32> = view[&2].iter().map(|e| e.slot).collect();
        assert_eq!(tuesday, vec![1, 3]);
    }
}
