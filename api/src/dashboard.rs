//! Overview pages: dashboard, homework calendar and per-subject quick stats.

use crate::auth::ApprovedUser;
use crate::helpers::*;
use crate::homework::{HomeworkView, homework_views};
use crate::schedule::{LessonView, lessons_on};
use chrono::{Datelike, Days, NaiveDate, Utc};
use rocket::State;
use rocket::serde::Serialize;
use rocket::serde::json::Json;
use school_common::db_util::{
    GradeFilter, HomeworkFilter, PgPool, get_grades_for_user, get_homework_for_user,
    get_notifications, get_subjects_for_user,
};
use school_common::grade_stats::mean;
use school_common::homework::is_overdue;
use school_common::{
    CALENDAR_HORIZON_DAYS, GradeRecord, HomeworkRecord, NotificationRecord, RECENT_ACTIVITY_DAYS,
    URGENT_HOMEWORK_DAYS,
};

const DUE_SOON_SHOWN: usize = 5;
const RECENT_MARKS_SHOWN: usize = 5;
const RECENT_ABSENCES_SHOWN: usize = 3;
const UNREAD_SHOWN: i64 = 5;
const QUICK_STATS_DAYS: u64 = 30;

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct Dashboard {
    pub date: NaiveDate,
    pub active_subjects: usize,
    pub due_soon: Vec<HomeworkView>,
    pub due_today: Vec<HomeworkView>,
    pub recent_marks: Vec<GradeRecord>,
    pub recent_absences: Vec<GradeRecord>,
    pub today_schedule: Vec<LessonView>,
    pub unread_notifications: Vec<NotificationRecord>,
    pub open_homework: usize,
    pub overdue_homework: usize,
    pub marks_this_month: usize,
    pub month_average: Option<f64>,
    pub overall_average: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct QuickStats {
    pub subject_id: u32,
    pub name: String,
    pub color: String,
    pub recent_average: Option<f64>,
    pub recent_marks: usize,
    pub open_homework: usize,
}

fn mark_values<'a>(grades: impl IntoIterator<Item = &'a GradeRecord>) -> Vec<f64> {
    grades
        .into_iter()
        .filter(|g| g.is_mark())
        .filter_map(|g| g.value)
        .collect()
}

/// Homework still open and due in `[today, today + days]`, soonest first.
fn due_within(open: &[HomeworkRecord], today: NaiveDate, days: u64) -> Vec<HomeworkRecord> {
    let until = today.checked_add_days(Days::new(days)).unwrap_or(today);
    open.iter()
        .filter(|hw| hw.deadline >= today && hw.deadline <= until)
        .cloned()
        .collect()
}

fn days_ago(today: NaiveDate, days: i64) -> NaiveDate {
    today
        .checked_sub_days(Days::new(days.unsigned_abs()))
        .unwrap_or(today)
}

#[get("/dashboard")]
pub fn dashboard(pool: &State<PgPool>, user: ApprovedUser) -> ApiResult<Dashboard> {
    let today = Utc::now().date_naive();
    let mut conn = connect(pool)?;
    let user_id = user.0.id();

    let active_subjects = get_subjects_for_user(&mut conn, user_id, false)
        .map_err(db_error)?
        .len();
    let open = get_homework_for_user(
        &mut conn,
        user_id,
        &HomeworkFilter {
            completed: Some(false),
            ..Default::default()
        },
    )
    .map_err(db_error)?;
    let overdue_homework = open.iter().filter(|hw| is_overdue(hw, today)).count();

    let due_soon: Vec<HomeworkRecord> = due_within(&open, today, URGENT_HOMEWORK_DAYS.unsigned_abs())
        .into_iter()
        .take(DUE_SOON_SHOWN)
        .collect();
    let due_today = due_within(&open, today, 0);

    let grades = get_grades_for_user(&mut conn, user_id, &GradeFilter::default())
        .map_err(db_error)?;
    let recent_from = days_ago(today, RECENT_ACTIVITY_DAYS);
    let recent: Vec<&GradeRecord> = grades.iter().filter(|g| g.date >= recent_from).collect();
    let recent_marks = recent
        .iter()
        .filter(|g| g.is_mark())
        .take(RECENT_MARKS_SHOWN)
        .map(|g| (*g).clone())
        .collect();
    let recent_absences = recent
        .iter()
        .filter(|g| g.is_absence())
        .take(RECENT_ABSENCES_SHOWN)
        .map(|g| (*g).clone())
        .collect();

    let this_month = mark_values(
        grades
            .iter()
            .filter(|g| g.date.year() == today.year() && g.date.month() == today.month()),
    );

    Ok(Json(Dashboard {
        date: today,
        active_subjects,
        due_soon: homework_views(&mut conn, user_id, due_soon, today)?,
        due_today: homework_views(&mut conn, user_id, due_today, today)?,
        recent_marks,
        recent_absences,
        today_schedule: lessons_on(&mut conn, user_id, today)?,
        unread_notifications: get_notifications(&mut conn, user_id, Some(UNREAD_SHOWN), true)
            .map_err(db_error)?,
        open_homework: open.len(),
        overdue_homework,
        marks_this_month: this_month.len(),
        month_average: mean(&this_month),
        overall_average: mean(&mark_values(&grades)),
    }))
}

/// Open homework due within the calendar horizon.
#[get("/calendar")]
pub fn calendar(pool: &State<PgPool>, user: ApprovedUser) -> ApiResult<Vec<HomeworkView>> {
    let today = Utc::now().date_naive();
    let until = today
        .checked_add_days(Days::new(CALENDAR_HORIZON_DAYS.unsigned_abs()))
        .unwrap_or(today);
    let mut conn = connect(pool)?;
    let user_id = user.0.id();
    let homework = get_homework_for_user(
        &mut conn,
        user_id,
        &HomeworkFilter {
            completed: Some(false),
            due_from: Some(today),
            due_until: Some(until),
            ..Default::default()
        },
    )
    .map_err(db_error)?;
    homework_views(&mut conn, user_id, homework, today).map(Json)
}

#[get("/stats")]
pub fn quick_stats(pool: &State<PgPool>, user: ApprovedUser) -> ApiResult<Vec<QuickStats>> {
    let today = Utc::now().date_naive();
    let mut conn = connect(pool)?;
    let user_id = user.0.id();
    let subjects = get_subjects_for_user(&mut conn, user_id, false).map_err(db_error)?;
    let grades = get_grades_for_user(
        &mut conn,
        user_id,
        &GradeFilter {
            from: today.checked_sub_days(Days::new(QUICK_STATS_DAYS)),
            ..Default::default()
        },
    )
    .map_err(db_error)?;
    let open = get_homework_for_user(
        &mut conn,
        user_id,
        &HomeworkFilter {
            completed: Some(false),
            ..Default::default()
        },
    )
    .map_err(db_error)?;

    let stats = subjects
        .into_iter()
        .map(|subject| {
            let values = mark_values(grades.iter().filter(|g| g.subject_id == subject.subject_id));
            QuickStats {
                recent_average: mean(&values),
                recent_marks: values.len(),
                open_homework: open
                    .iter()
                    .filter(|hw| hw.subject_id == subject.subject_id)
                    .count(),
                subject_id: subject.subject_id,
                name: subject.name,
                color: subject.color,
            }
        })
        .collect();
    Ok(Json(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use school_common::HomeworkDraft;
    use school_common::homework::new_record;

    fn homework(deadline: NaiveDate) -> HomeworkRecord {
        let draft = HomeworkDraft {
            subject_id: 1,
            title: "Exercises".to_string(),
            description: String::new(),
            pages: String::new(),
            exercises: String::new(),
            assigned_on: None,
            deadline,
            priority: Default::default(),
            difficulty: Default::default(),
            estimated_minutes: None,
            share_with_class: false,
            shared_class_room_id: None,
            reminder_enabled: false,
            reminder_days: 1,
            personal_notes: String::new(),
        };
        new_record(1, &draft, deadline)
    }

    #[test_log::test]
    fn test_due_within() {
        let today = NaiveDate::from_ymd_opt(2025, 10, 6).unwrap();
        let open = vec![
            homework(NaiveDate::from_ymd_opt(2025, 10, 5).unwrap()),
            homework(today),
            homework(NaiveDate::from_ymd_opt(2025, 10, 9).unwrap()),
            homework(NaiveDate::from_ymd_opt(2025, 10, 10).unwrap()),
        ];
        assert_eq!(due_within(&open, today, 3).len(), 2);
        assert_eq!(due_within(&open, today, 0).len(), 1);
    }

    #[test_log::test]
    fn test_days_ago() {
        let today = NaiveDate::from_ymd_opt(2025, 10, 6).unwrap();
        assert_eq!(days_ago(today, 7), NaiveDate::from_ymd_opt(2025, 9, 29).unwrap());
    }
}
