//! The caller's weekly schedule and its temporary changes.

use crate::auth::ApprovedUser;
use crate::effects::notify;
use crate::helpers::*;
use chrono::{Datelike, NaiveDate, Utc};
use rocket::State;
use rocket::http::Status;
use rocket::serde::Serialize;
use rocket::serde::json::Json;
use school_common::db_util::{
    PgConnection, PgPool, delete_schedule_change, delete_schedule_entry,
    get_active_schedule_changes, get_schedule_changes, get_schedule_entry, get_schedule_for_user,
    get_subject, get_subjects_for_user, insert_schedule_change, insert_schedule_entry,
    update_schedule_entry,
};
use school_common::notifications::schedule_change_added;
use school_common::propagation::PersonalLesson;
use school_common::schedule::{
    BookedLesson, DaySettings, TimedSlot, duration_minutes, slot_times, validate_change,
    validate_lesson, week_view, weekday_name,
};
use school_common::{
    ScheduleChangeDraft, ScheduleChangeRecord, ScheduleEntryDraft, ScheduleEntryRecord,
    SubjectRecord,
};
use std::collections::HashMap;

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct LessonView {
    #[serde(flatten)]
    pub entry: ScheduleEntryRecord,
    pub subject_name: String,
    pub subject_color: String,
    pub duration_minutes: i64,
    pub changes: Vec<ScheduleChangeRecord>,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct DayView {
    pub weekday: u8,
    pub name: &'static str,
    pub lessons: Vec<LessonView>,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct TodayView {
    pub date: NaiveDate,
    pub weekday: Option<u8>,
    pub lessons: Vec<LessonView>,
}

fn subject_index(subjects: Vec<SubjectRecord>) -> HashMap<u32, SubjectRecord> {
    subjects.into_iter().map(|s| (s.subject_id, s)).collect()
}

fn lesson_view(
    entry: ScheduleEntryRecord,
    subjects: &HashMap<u32, SubjectRecord>,
    changes: Vec<ScheduleChangeRecord>,
) -> LessonView {
    let (subject_name, subject_color) = subjects
        .get(&entry.subject_id)
        .map(|s| (s.name.clone(), s.color.clone()))
        .unwrap_or_default();
    LessonView {
        duration_minutes: duration_minutes(entry.start, entry.end),
        entry,
        subject_name,
        subject_color,
        changes,
    }
}

/// School day of a date, 1 = Monday. Weekends have none.
pub fn school_day(date: NaiveDate) -> Option<u8> {
    let day = date.weekday().number_from_monday();
    (day <= 5).then_some(day as u8)
}

/// Lessons of one date ordered by slot, each with the changes active that day.
pub fn lessons_on(
    conn: &mut PgConnection,
    user_id: u32,
    date: NaiveDate,
) -> Result<Vec<LessonView>, ApiError> {
    let Some(day) = school_day(date) else {
        return Ok(Vec::new());
    };
    let entries = get_schedule_for_user(conn, user_id, Some(day)).map_err(db_error)?;
    let subjects = subject_index(get_subjects_for_user(conn, user_id, true).map_err(db_error)?);
    let changes = get_active_schedule_changes(conn, user_id, date).map_err(db_error)?;

    let mut lessons: Vec<LessonView> = entries
        .into_iter()
        .map(|entry| {
            let active = changes
                .iter()
                .filter(|c| c.entry_id == entry.entry_id)
                .cloned()
                .collect();
            lesson_view(entry, &subjects, active)
        })
        .collect();
    lessons.sort_by_key(|l| l.entry.slot);
    Ok(lessons)
}

#[get("/schedule")]
pub fn get_week(pool: &State<PgPool>, user: ApprovedUser) -> ApiResult<Vec<DayView>> {
    let mut conn = connect(pool)?;
    let user_id = user.0.id();
    let entries = get_schedule_for_user(&mut conn, user_id, None).map_err(db_error)?;
    let subjects = subject_index(get_subjects_for_user(&mut conn, user_id, true).map_err(db_error)?);

    let mut by_day = week_view(&entries);
    let days = (1..=5)
        .map(|weekday| DayView {
            weekday,
            name: weekday_name(weekday),
            lessons: by_day
                .remove(&weekday)
                .unwrap_or_default()
                .into_iter()
                .map(|entry| lesson_view(entry, &subjects, Vec::new()))
                .collect(),
        })
        .collect();
    Ok(Json(days))
}

#[get("/schedule/today?<date>")]
pub fn get_today(
    pool: &State<PgPool>,
    user: ApprovedUser,
    date: Option<&str>,
) -> ApiResult<TodayView> {
    let date = match date {
        Some(raw) => raw
            .parse::<NaiveDate>()
            .map_err(|_| bad_request_error("date must be YYYY-MM-DD"))?,
        None => Utc::now().date_naive(),
    };
    let mut conn = connect(pool)?;
    Ok(Json(TodayView {
        date,
        weekday: school_day(date),
        lessons: lessons_on(&mut conn, user.0.id(), date)?,
    }))
}

/// Resolve the times of a submitted lesson and check it against the rest of the week.
fn checked_lesson(
    conn: &mut PgConnection,
    user: &ApprovedUser,
    draft: &ScheduleEntryDraft,
    editing: Option<u32>,
) -> Result<PersonalLesson, ApiError> {
    let user_id = user.0.id();
    found(get_subject(conn, user_id, draft.subject_id), "subject")?;

    let (start, end) = match (draft.start, draft.end) {
        (Some(start), Some(end)) => (start, end),
        (start, end) => {
            let settings = user
                .0
                .profile
                .as_ref()
                .map(DaySettings::from)
                .unwrap_or_default();
            let (slot_start, slot_end) =
                slot_times(&settings, draft.slot).map_err(validation_error)?;
            (start.unwrap_or(slot_start), end.unwrap_or(slot_end))
        }
    };

    let existing = get_schedule_for_user(conn, user_id, Some(draft.weekday)).map_err(db_error)?;
    let subjects = subject_index(get_subjects_for_user(conn, user_id, true).map_err(db_error)?);
    let booked: Vec<BookedLesson> = existing
        .iter()
        .map(|e| {
            let name = subjects
                .get(&e.subject_id)
                .map(|s| s.name.clone())
                .unwrap_or_default();
            BookedLesson::from_entry(e, name)
        })
        .collect();
    let candidate = TimedSlot {
        weekday: draft.weekday,
        slot: draft.slot,
        start,
        end,
    };
    validate_lesson(&candidate, editing, &booked).map_err(validation_error)?;

    Ok(PersonalLesson {
        subject_id: draft.subject_id,
        weekday: draft.weekday,
        slot: draft.slot,
        start,
        end,
        room: draft.room.clone(),
        notes: draft.notes.clone(),
        kind: draft.kind,
    })
}

#[post("/schedule/entries", data = "<draft>")]
pub fn create_entry(
    pool: &State<PgPool>,
    user: ApprovedUser,
    draft: Json<ScheduleEntryDraft>,
) -> ApiResult<ScheduleEntryRecord> {
    let mut conn = connect(pool)?;
    let lesson = checked_lesson(&mut conn, &user, &draft, None)?;
    insert_schedule_entry(&mut conn, user.0.id(), &lesson)
        .map(Json)
        .map_err(db_error)
}

#[put("/schedule/entries/<id>", data = "<draft>")]
pub fn put_entry(
    pool: &State<PgPool>,
    user: ApprovedUser,
    id: u32,
    draft: Json<ScheduleEntryDraft>,
) -> ApiResult<ScheduleEntryRecord> {
    let mut conn = connect(pool)?;
    found(get_schedule_entry(&mut conn, user.0.id(), id), "lesson")?;
    let lesson = checked_lesson(&mut conn, &user, &draft, Some(id))?;
    update_schedule_entry(&mut conn, user.0.id(), id, &lesson)
        .map(Json)
        .map_err(db_error)
}

#[delete("/schedule/entries/<id>")]
pub fn remove_entry(pool: &State<PgPool>, user: ApprovedUser, id: u32) -> Result<Status, ApiError> {
    let mut conn = connect(pool)?;
    match delete_schedule_entry(&mut conn, user.0.id(), id).map_err(db_error)? {
        true => Ok(Status::NoContent),
        false => Err(not_found_error("lesson not found")),
    }
}

#[get("/schedule/changes?<active_on>")]
pub fn list_changes(
    pool: &State<PgPool>,
    user: ApprovedUser,
    active_on: Option<&str>,
) -> ApiResult<Vec<ScheduleChangeRecord>> {
    let mut conn = connect(pool)?;
    let user_id = user.0.id();
    let changes = match active_on {
        Some(raw) => {
            let day = raw
                .parse::<NaiveDate>()
                .map_err(|_| bad_request_error("active_on must be YYYY-MM-DD"))?;
            get_active_schedule_changes(&mut conn, user_id, day)
        }
        None => get_schedule_changes(&mut conn, user_id),
    };
    changes.map(Json).map_err(db_error)
}

#[post("/schedule/changes", data = "<draft>")]
pub fn create_change(
    pool: &State<PgPool>,
    user: ApprovedUser,
    draft: Json<ScheduleChangeDraft>,
) -> ApiResult<ScheduleChangeRecord> {
    validate_change(&draft).map_err(validation_error)?;
    let mut conn = connect(pool)?;
    let user_id = user.0.id();

    let entry = found(get_schedule_entry(&mut conn, user_id, draft.entry_id), "lesson")?;
    if let Some(replacement) = draft.new_subject_id {
        found(get_subject(&mut conn, user_id, replacement), "replacement subject")?;
    }
    let change = insert_schedule_change(&mut conn, user_id, &draft).map_err(db_error)?;

    let subject = crate::effects::subject_name(&mut conn, user_id, entry.subject_id);
    notify(&mut conn, user_id, &schedule_change_added(change.kind, &subject));
    Ok(Json(change))
}

#[delete("/schedule/changes/<id>")]
pub fn remove_change(pool: &State<PgPool>, user: ApprovedUser, id: u32) -> Result<Status, ApiError> {
    let mut conn = connect(pool)?;
    match delete_schedule_change(&mut conn, user.0.id(), id).map_err(db_error)? {
        true => Ok(Status::NoContent),
        false => Err(not_found_error("schedule change not found")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn test_school_day() {
        // 2025-09-15 is a Monday
        let monday = NaiveDate::from_ymd_opt(2025, 9, 15).unwrap();
        assert_eq!(school_day(monday), Some(1));
        assert_eq!(school_day(monday + chrono::Days::new(4)), Some(5));
        assert_eq!(school_day(monday + chrono::Days::new(5)), None);
        assert_eq!(school_day(monday + chrono::Days::new(6)), None);
    }
}
