//! Homework validation, progress tracking and reminder scheduling.

use crate::{HomeworkDraft, HomeworkRecord, Priority, ValidationError};
use chrono::{DateTime, Days, NaiveDate, Utc};

pub const MIN_ESTIMATED_MINUTES: u32 = 5;
/// Progress lost when a completed homework is reopened.
const REOPEN_PENALTY: u8 = 10;

/// Check a submitted homework and return the assignment date it will be stored with.
pub fn validate_homework(
    draft: &HomeworkDraft,
    today: NaiveDate,
    creating: bool,
) -> Result<NaiveDate, ValidationError> {
    if draft.title.trim().is_empty() {
        return Err(ValidationError::MissingField("title"));
    }
    let assigned_on = draft.assigned_on.unwrap_or(today);
    if draft.deadline < assigned_on {
        return Err(ValidationError::DateOrder {
            field: "deadline",
            start: assigned_on,
        });
    }
    if creating && draft.deadline < today {
        return Err(ValidationError::DeadlineInPast(draft.deadline));
    }
    if let Some(minutes) = draft.estimated_minutes {
        if minutes < MIN_ESTIMATED_MINUTES {
            return Err(ValidationError::OutOfRange {
                field: "estimated minutes",
                value: f64::from(minutes),
                min: f64::from(MIN_ESTIMATED_MINUTES),
                max: f64::from(u32::MAX),
            });
        }
    }
    Ok(assigned_on)
}

pub fn validate_progress(progress: i64) -> Result<u8, ValidationError> {
    u8::try_from(progress)
        .ok()
        .filter(|p| *p <= 100)
        .ok_or(ValidationError::OutOfRange {
            field: "progress",
            value: progress as f64,
            min: 0.0,
            max: 100.0,
        })
}

/// Days until the deadline, negative when late, 0 once completed.
pub fn days_left(homework: &HomeworkRecord, today: NaiveDate) -> i64 {
    if homework.completed {
        return 0;
    }
    (homework.deadline - today).num_days()
}

pub fn is_overdue(homework: &HomeworkRecord, today: NaiveDate) -> bool {
    !homework.completed && today > homework.deadline
}

pub fn status_label(homework: &HomeworkRecord, today: NaiveDate) -> String {
    if homework.completed {
        return "completed".to_string();
    }
    if is_overdue(homework, today) {
        return "overdue".to_string();
    }
    match days_left(homework, today) {
        0 => "today".to_string(),
        1 => "tomorrow".to_string(),
        n => format!("in {n} days"),
    }
}

pub fn urgency_colour(homework: &HomeworkRecord, today: NaiveDate) -> &'static str {
    if is_overdue(homework, today) {
        "#dc3545"
    } else if days_left(homework, today) <= 1 {
        "#ffc107"
    } else if homework.priority == Priority::Urgent {
        "#fd7e14"
    } else {
        "#28a745"
    }
}

/// Share of the estimate still ahead, in whole minutes.
pub fn remaining_minutes(homework: &HomeworkRecord) -> u32 {
    match homework.estimated_minutes {
        Some(estimate) if homework.progress < 100 => {
            let left = u64::from(estimate) * u64::from(100 - homework.progress) / 100;
            u32::try_from(left).unwrap_or(estimate)
        }
        _ => 0,
    }
}

pub fn complete(homework: &mut HomeworkRecord, now: DateTime<Utc>) {
    homework.completed = true;
    homework.progress = 100;
    homework.completed_at = Some(now);
}

pub fn reopen(homework: &mut HomeworkRecord) {
    homework.completed = false;
    homework.completed_at = None;
    homework.progress = homework.progress.saturating_sub(REOPEN_PENALTY);
}

/// Flip the completion state. Returns true when the homework is now completed.
pub fn toggle_completion(homework: &mut HomeworkRecord, now: DateTime<Utc>) -> bool {
    if homework.completed {
        reopen(homework);
    } else {
        complete(homework, now);
    }
    homework.completed
}

/// Store new progress. Reaching 100 completes the homework.
/// Returns true when this call completed it.
pub fn set_progress(homework: &mut HomeworkRecord, progress: u8, now: DateTime<Utc>) -> bool {
    homework.progress = progress.min(100);
    if homework.progress == 100 && !homework.completed {
        complete(homework, now);
        return true;
    }
    false
}

pub fn add_worked_minutes(homework: &mut HomeworkRecord, minutes: u32) {
    homework.worked_minutes = homework.worked_minutes.saturating_add(minutes);
}

/// Fill in sharing fields before a save. A shared homework without an explicit
/// class goes to the author's class, and `shared_at` is only stamped once.
pub fn resolve_sharing(
    homework: &mut HomeworkRecord,
    profile_class: Option<u32>,
    now: DateTime<Utc>,
) {
    if !homework.share_with_class {
        return;
    }
    if homework.shared_class_room_id.is_none() {
        homework.shared_class_room_id = profile_class;
    }
    if homework.shared_at.is_none() {
        homework.shared_at = Some(now);
    }
}

/// Keep the completion timestamp in line with the completed flag.
pub fn sync_completion(homework: &mut HomeworkRecord, now: DateTime<Utc>) {
    if homework.completed && homework.completed_at.is_none() {
        homework.completed_at = Some(now);
    } else if !homework.completed {
        homework.completed_at = None;
    }
}

pub fn completed_on_time(homework: &HomeworkRecord) -> bool {
    homework.completed
        && homework
            .completed_at
            .is_some_and(|at| at.date_naive() <= homework.deadline)
}

/// Date a reminder should fire, if it is still ahead of us.
pub fn reminder_date(deadline: NaiveDate, days_before: u32, today: NaiveDate) -> Option<NaiveDate> {
    deadline
        .checked_sub_days(Days::new(u64::from(days_before)))
        .filter(|date| *date >= today)
}

pub fn reminder_message(
    subject: &str,
    title: &str,
    deadline: NaiveDate,
    remind_on: NaiveDate,
    custom: &str,
) -> String {
    if !custom.trim().is_empty() {
        return custom.to_string();
    }
    match (deadline - remind_on).num_days() {
        0 => format!("Homework for {subject} is due today: {title}"),
        1 => format!("Homework for {subject} is due tomorrow: {title}"),
        n => format!("Homework for {subject} is due in {n} days: {title}"),
    }
}

/// Build a fresh record from a validated draft.
pub fn new_record(
    user_id: u32,
    draft: &HomeworkDraft,
    assigned_on: NaiveDate,
) -> HomeworkRecord {
    HomeworkRecord {
        homework_id: 0,
        user_id,
        subject_id: draft.subject_id,
        title: draft.title.trim().to_string(),
        description: draft.description.clone(),
        pages: draft.pages.clone(),
        exercises: draft.exercises.clone(),
        assigned_on,
        deadline: draft.deadline,
        priority: draft.priority,
        difficulty: draft.difficulty,
        estimated_minutes: draft.estimated_minutes,
        worked_minutes: 0,
        progress: 0,
        completed: false,
        completed_at: None,
        share_with_class: draft.share_with_class,
        shared_class_room_id: draft.shared_class_room_id,
        shared_at: None,
        reminder_enabled: draft.reminder_enabled,
        reminder_days: draft.reminder_days,
        personal_notes: draft.personal_notes.clone(),
    }
}

/// Apply an edit, keeping progress and completion state.
pub fn apply_draft(homework: &mut HomeworkRecord, draft: &HomeworkDraft, assigned_on: NaiveDate) {
    let kept = HomeworkRecord {
        homework_id: homework.homework_id,
        user_id: homework.user_id,
        worked_minutes: homework.worked_minutes,
        progress: homework.progress,
        completed: homework.completed,
        completed_at: homework.completed_at,
        shared_at: homework.shared_at,
        ..new_record(homework.user_id, draft, assigned_on)
    };
    *homework = kept;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Difficulty;
    use chrono::TimeZone;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn draft(deadline: NaiveDate) -> HomeworkDraft {
        HomeworkDraft {
            subject_id: 1,
            title: "Exercises 1-10".to_string(),
            description: String::new(),
            pages: "42".to_string(),
            exercises: String::new(),
            assigned_on: None,
            deadline,
            priority: Priority::Normal,
            difficulty: Difficulty::Medium,
            estimated_minutes: Some(60),
            share_with_class: false,
            shared_class_room_id: None,
            reminder_enabled: true,
            reminder_days: 1,
            personal_notes: String::new(),
        }
    }

    fn homework(deadline: NaiveDate) -> HomeworkRecord {
        new_record(7, &draft(deadline), date(3, 1))
    }

    fn at(m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, m, d, 15, 0, 0).unwrap()
    }

    #[test_log::test]
    fn test_validate_homework() {
        let today = date(3, 10);
        assert_eq!(validate_homework(&draft(date(3, 12)), today, true), Ok(today));

        assert_eq!(
            validate_homework(&draft(date(3, 9)), today, true),
            Err(ValidationError::DateOrder {
                field: "deadline",
                start: today
            })
        );

        let mut past = draft(date(3, 5));
        past.assigned_on = Some(date(3, 1));
        assert_eq!(
            validate_homework(&past, today, true),
            Err(ValidationError::DeadlineInPast(date(3, 5)))
        );
        // Editing an old homework keeps its past deadline.
        assert_eq!(validate_homework(&past, today, false), Ok(date(3, 1)));

        let mut quick = draft(date(3, 12));
        quick.estimated_minutes = Some(4);
        assert!(validate_homework(&quick, today, true).is_err());

        let mut untitled = draft(date(3, 12));
        untitled.title = "  ".to_string();
        assert_eq!(
            validate_homework(&untitled, today, true),
            Err(ValidationError::MissingField("title"))
        );
    }

    #[test_log::test]
    fn test_validate_progress() {
        assert_eq!(validate_progress(0), Ok(0));
        assert_eq!(validate_progress(100), Ok(100));
        assert!(validate_progress(101).is_err());
        assert!(validate_progress(-1).is_err());
    }

    #[test_log::test]
    fn test_status_and_days_left() {
        let hw = homework(date(3, 12));
        assert_eq!(days_left(&hw, date(3, 10)), 2);
        assert_eq!(status_label(&hw, date(3, 10)), "in 2 days");
        assert_eq!(status_label(&hw, date(3, 11)), "tomorrow");
        assert_eq!(status_label(&hw, date(3, 12)), "today");
        assert_eq!(status_label(&hw, date(3, 13)), "overdue");
        assert!(is_overdue(&hw, date(3, 13)));
        assert_eq!(urgency_colour(&hw, date(3, 13)), "#dc3545");
        assert_eq!(urgency_colour(&hw, date(3, 11)), "#ffc107");
        assert_eq!(urgency_colour(&hw, date(3, 1)), "#28a745");

        let mut done = hw.clone();
        complete(&mut done, at(3, 11));
        assert_eq!(days_left(&done, date(3, 10)), 0);
        assert_eq!(status_label(&done, date(3, 20)), "completed");
        assert!(!is_overdue(&done, date(3, 20)));
    }

    #[test_log::test]
    fn test_remaining_minutes() {
        let mut hw = homework(date(3, 12));
        hw.progress = 25;
        assert_eq!(remaining_minutes(&hw), 45);
        hw.progress = 100;
        assert_eq!(remaining_minutes(&hw), 0);
        hw.estimated_minutes = None;
        hw.progress = 0;
        assert_eq!(remaining_minutes(&hw), 0);
    }

    #[test_log::test]
    fn test_remaining_minutes_large_estimate() {
        let mut hw = homework(date(3, 12));
        hw.estimated_minutes = Some(50_000_000);
        hw.progress = 0;
        assert_eq!(remaining_minutes(&hw), 50_000_000);
        hw.progress = 40;
        assert_eq!(remaining_minutes(&hw), 30_000_000);
        hw.estimated_minutes = Some(u32::MAX);
        hw.progress = 1;
        assert_eq!(remaining_minutes(&hw), 4_252_017_622);
    }

    #[test_log::test]
    fn test_toggle_completion() {
        let mut hw = homework(date(3, 12));
        hw.progress = 5;

        assert!(toggle_completion(&mut hw, at(3, 11)));
        assert_eq!(hw.progress, 100);
        assert_eq!(hw.completed_at, Some(at(3, 11)));
        assert!(completed_on_time(&hw));

        assert!(!toggle_completion(&mut hw, at(3, 11)));
        assert_eq!(hw.progress, 90);
        assert_eq!(hw.completed_at, None);

        hw.progress = 4;
        hw.completed = true;
        reopen(&mut hw);
        assert_eq!(hw.progress, 0);
    }

    #[test_log::test]
    fn test_set_progress_completes_at_100() {
        let mut hw = homework(date(3, 12));
        assert!(!set_progress(&mut hw, 50, at(3, 10)));
        assert!(!hw.completed);
        assert!(set_progress(&mut hw, 100, at(3, 13)));
        assert!(hw.completed);
        assert!(!completed_on_time(&hw));
        assert!(!set_progress(&mut hw, 100, at(3, 14)));
    }

    #[test_log::test]
    fn test_resolve_sharing() {
        let mut hw = homework(date(3, 12));
        resolve_sharing(&mut hw, Some(4), at(3, 2));
        assert_eq!(hw.shared_class_room_id, None);

        hw.share_with_class = true;
        resolve_sharing(&mut hw, Some(4), at(3, 2));
        assert_eq!(hw.shared_class_room_id, Some(4));
        assert_eq!(hw.shared_at, Some(at(3, 2)));

        resolve_sharing(&mut hw, Some(9), at(3, 5));
        assert_eq!(hw.shared_class_room_id, Some(4));
        assert_eq!(hw.shared_at, Some(at(3, 2)));
    }

    #[test_log::test]
    fn test_reminder_date() {
        assert_eq!(reminder_date(date(3, 12), 1, date(3, 10)), Some(date(3, 11)));
        assert_eq!(reminder_date(date(3, 12), 0, date(3, 12)), Some(date(3, 12)));
        assert_eq!(reminder_date(date(3, 12), 3, date(3, 10)), None);
    }

    #[test_log::test]
    fn test_reminder_message() {
        let deadline = date(3, 12);
        assert_eq!(
            reminder_message("Math", "Ex 1", deadline, deadline, ""),
            "Homework for Math is due today: Ex 1"
        );
        assert_eq!(
            reminder_message("Math", "Ex 1", deadline, date(3, 11), ""),
            "Homework for Math is due tomorrow: Ex 1"
        );
        assert_eq!(
            reminder_message("Math", "Ex 1", deadline, date(3, 9), ""),
            "Homework for Math is due in 3 days: Ex 1"
        );
        assert_eq!(
            reminder_message("Math", "Ex 1", deadline, date(3, 9), "Bring the atlas"),
            "Bring the atlas"
        );
    }

    #[test_log::test]
    fn test_apply_draft_keeps_progress() {
        let mut hw = homework(date(3, 12));
        hw.homework_id = 3;
        set_progress(&mut hw, 40, at(3, 2));
        add_worked_minutes(&mut hw, 25);

        let mut edit = draft(date(3, 20));
        edit.title = "Renamed".to_string();
        apply_draft(&mut hw, &edit, date(3, 1));

        assert_eq!(hw.homework_id, 3);
        assert_eq!(hw.title, "Renamed");
        assert_eq!(hw.deadline, date(3, 20));
        assert_eq!(hw.progress, 40);
        assert_eq!(hw.worked_minutes, 25);
    }

    #[test_log::test]
    fn test_sync_completion() {
        let mut hw = homework(date(3, 12));
        hw.completed = true;
        sync_completion(&mut hw, at(3, 3));
        assert_eq!(hw.completed_at, Some(at(3, 3)));
        hw.completed = false;
        sync_completion(&mut hw, at(3, 4));
        assert_eq!(hw.completed_at, None);
    }
}
