//! Grade book: marks, absences, semesters and goals.

use crate::auth::ApprovedUser;
use crate::effects::after_grade_saved;
use crate::helpers::*;
use crate::mail_queue::MailQueue;
use chrono::{Datelike, Months, NaiveDate, Utc};
use rocket::State;
use rocket::http::Status;
use rocket::serde::Serialize;
use rocket::serde::json::Json;
use school_common::db_util::{
    GradeFilter, PgConnection, PgPool, activate_semester, delete_goal, delete_grade,
    delete_semester, ensure_semester, get_goal, get_goals_for_user, get_grade,
    get_grades_for_user, get_semester, get_semesters_for_user, get_subject,
    get_subjects_for_user, insert_goal, insert_grade, insert_semester, update_goal,
    update_grade, update_semester,
};
use school_common::grade_stats::{
    GradeOverview, SubjectStats, excuse_absence, goal_gap, goal_reached, goal_stats,
    grade_colour, marks_needed, overview, subject_stats, validate_goal, validate_grade,
    validate_semester,
};
use school_common::{
    AchievementRecord, GoalDraft, GradeDraft, GradeGoalRecord, GradeKind, GradeRecord,
    SemesterDraft, SemesterRecord, SubjectRecord,
};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct GradeView {
    #[serde(flatten)]
    pub grade: GradeRecord,
    pub subject_name: String,
    pub colour: Option<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct SavedGrade {
    pub grade: GradeView,
    pub unlocked: Vec<AchievementRecord>,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct SubjectSummary {
    pub subject: SubjectRecord,
    pub stats: SubjectStats,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct GradeStatsView {
    pub overview: GradeOverview,
    pub subjects: Vec<SubjectSummary>,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub grades: Vec<GradeView>,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct GoalView {
    #[serde(flatten)]
    pub goal: GradeGoalRecord,
    pub subject_name: String,
    pub current_average: Option<f64>,
    pub gap: f64,
    pub marks_needed: u32,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct SubjectGrades {
    pub subject: SubjectRecord,
    pub stats: SubjectStats,
    pub grades: Vec<GradeView>,
    pub goals: Vec<GoalView>,
}

fn subject_names(conn: &mut PgConnection, user_id: u32) -> Result<HashMap<u32, String>, ApiError> {
    Ok(get_subjects_for_user(conn, user_id, true)
        .map_err(db_error)?
        .into_iter()
        .map(|s| (s.subject_id, s.name))
        .collect())
}

fn grade_view(grade: GradeRecord, names: &HashMap<u32, String>) -> GradeView {
    GradeView {
        subject_name: names.get(&grade.subject_id).cloned().unwrap_or_default(),
        colour: grade.value.filter(|_| grade.is_mark()).map(grade_colour),
        grade,
    }
}

fn parse_date(raw: Option<&str>, field: &str) -> Result<Option<NaiveDate>, ApiError> {
    raw.map(|raw| {
        raw.parse::<NaiveDate>()
            .map_err(|_| bad_request_error(format!("{field} must be YYYY-MM-DD")))
    })
    .transpose()
}

/// Build the stored row for a validated draft, keeping the identity of `previous`.
fn grade_from_draft(
    user_id: u32,
    draft: &GradeDraft,
    kind: GradeKind,
    previous: Option<&GradeRecord>,
    today: NaiveDate,
) -> GradeRecord {
    let excused = kind == GradeKind::ExcusedAbsence;
    let excused_on = match previous {
        Some(p) if p.excused && excused => p.excused_on,
        _ => excused.then_some(today),
    };
    GradeRecord {
        grade_id: previous.map(|p| p.grade_id).unwrap_or_default(),
        user_id,
        subject_id: draft.subject_id,
        kind,
        value: draft.value.filter(|_| kind == GradeKind::Mark),
        assessment: draft.assessment,
        description: draft.description.clone(),
        date: draft.date.or(previous.map(|p| p.date)).unwrap_or(today),
        semester: draft.semester,
        excused,
        excused_on,
        notes: draft.notes.clone(),
        important: draft.important,
        created_at: previous.map(|p| p.created_at).unwrap_or_else(Utc::now),
    }
}

fn checked_grade(
    conn: &mut PgConnection,
    user_id: u32,
    draft: &GradeDraft,
    previous: Option<&GradeRecord>,
) -> Result<GradeRecord, ApiError> {
    let kind = validate_grade(draft).map_err(validation_error)?;
    found(get_subject(conn, user_id, draft.subject_id), "subject")?;
    let today = Utc::now().date_naive();
    ensure_semester(conn, user_id, draft.semester, today).map_err(db_error)?;
    Ok(grade_from_draft(user_id, draft, kind, previous, today))
}

fn saved(
    conn: &mut PgConnection,
    user_id: u32,
    grade: GradeRecord,
    unlocked: Vec<AchievementRecord>,
) -> ApiResult<SavedGrade> {
    let names = subject_names(conn, user_id)?;
    Ok(Json(SavedGrade {
        grade: grade_view(grade, &names),
        unlocked,
    }))
}

#[get("/grades?<subject>&<semester>&<kind>&<from>&<until>")]
pub fn list_grades(
    pool: &State<PgPool>,
    user: ApprovedUser,
    subject: Option<u32>,
    semester: Option<u8>,
    kind: Option<&str>,
    from: Option<&str>,
    until: Option<&str>,
) -> ApiResult<Vec<GradeView>> {
    let filter = GradeFilter {
        subject_id: subject,
        semester,
        kind: kind
            .map(|k| k.parse::<GradeKind>().map_err(bad_request_error))
            .transpose()?,
        from: parse_date(from, "from")?,
        until: parse_date(until, "until")?,
    };
    let mut conn = connect(pool)?;
    let user_id = user.0.id();
    let grades = get_grades_for_user(&mut conn, user_id, &filter).map_err(db_error)?;
    let names = subject_names(&mut conn, user_id)?;
    Ok(Json(grades.into_iter().map(|g| grade_view(g, &names)).collect()))
}

#[post("/grades", data = "<draft>")]
pub fn create_grade(
    pool: &State<PgPool>,
    mail: &State<MailQueue>,
    user: ApprovedUser,
    draft: Json<GradeDraft>,
) -> ApiResult<SavedGrade> {
    let mut conn = connect(pool)?;
    let user_id = user.0.id();
    let record = checked_grade(&mut conn, user_id, &draft, None)?;
    let stored = insert_grade(&mut conn, &record).map_err(db_error)?;
    tracing::debug!(user_id, grade_id = stored.grade_id, kind = %stored.kind, "Grade recorded");

    let unlocked = after_grade_saved(
        &mut conn,
        mail,
        &user.0.user,
        user.0.profile.as_ref(),
        &stored,
        true,
    );
    saved(&mut conn, user_id, stored, unlocked)
}

#[get("/grades/<id>")]
pub fn get_one_grade(pool: &State<PgPool>, user: ApprovedUser, id: u32) -> ApiResult<GradeView> {
    let mut conn = connect(pool)?;
    let user_id = user.0.id();
    let grade = found(get_grade(&mut conn, user_id, id), "grade")?;
    let names = subject_names(&mut conn, user_id)?;
    Ok(Json(grade_view(grade, &names)))
}

#[put("/grades/<id>", data = "<draft>")]
pub fn put_grade(
    pool: &State<PgPool>,
    mail: &State<MailQueue>,
    user: ApprovedUser,
    id: u32,
    draft: Json<GradeDraft>,
) -> ApiResult<SavedGrade> {
    let mut conn = connect(pool)?;
    let user_id = user.0.id();
    let previous = found(get_grade(&mut conn, user_id, id), "grade")?;
    let record = checked_grade(&mut conn, user_id, &draft, Some(&previous))?;
    let stored = update_grade(&mut conn, &record).map_err(db_error)?;

    let unlocked = after_grade_saved(
        &mut conn,
        mail,
        &user.0.user,
        user.0.profile.as_ref(),
        &stored,
        false,
    );
    saved(&mut conn, user_id, stored, unlocked)
}

#[delete("/grades/<id>")]
pub fn remove_grade(pool: &State<PgPool>, user: ApprovedUser, id: u32) -> Result<Status, ApiError> {
    let mut conn = connect(pool)?;
    match delete_grade(&mut conn, user.0.id(), id).map_err(db_error)? {
        true => Ok(Status::NoContent),
        false => Err(not_found_error("grade not found")),
    }
}

#[post("/grades/<id>/excuse")]
pub fn excuse_grade(
    pool: &State<PgPool>,
    mail: &State<MailQueue>,
    user: ApprovedUser,
    id: u32,
) -> ApiResult<SavedGrade> {
    let mut conn = connect(pool)?;
    let user_id = user.0.id();
    let mut grade = found(get_grade(&mut conn, user_id, id), "grade")?;
    excuse_absence(&mut grade, Utc::now().date_naive()).map_err(validation_error)?;
    let stored = update_grade(&mut conn, &grade).map_err(db_error)?;

    let unlocked = after_grade_saved(
        &mut conn,
        mail,
        &user.0.user,
        user.0.profile.as_ref(),
        &stored,
        false,
    );
    saved(&mut conn, user_id, stored, unlocked)
}

#[get("/grades/stats?<semester>")]
pub fn grade_stats(
    pool: &State<PgPool>,
    user: ApprovedUser,
    semester: Option<u8>,
) -> ApiResult<GradeStatsView> {
    let mut conn = connect(pool)?;
    let user_id = user.0.id();
    let grades = get_grades_for_user(
        &mut conn,
        user_id,
        &GradeFilter {
            semester,
            ..Default::default()
        },
    )
    .map_err(db_error)?;
    let subjects = get_subjects_for_user(&mut conn, user_id, false).map_err(db_error)?;

    let mut by_subject: HashMap<u32, Vec<GradeRecord>> = HashMap::new();
    for grade in &grades {
        by_subject
            .entry(grade.subject_id)
            .or_default()
            .push(grade.clone());
    }
    let subjects = subjects
        .into_iter()
        .map(|subject| {
            let stats = subject_stats(
                by_subject
                    .get(&subject.subject_id)
                    .map(Vec::as_slice)
                    .unwrap_or_default(),
            );
            SubjectSummary { subject, stats }
        })
        .collect();

    Ok(Json(GradeStatsView {
        overview: overview(&grades, Utc::now().date_naive()),
        subjects,
    }))
}

/// First and last day of a month.
fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let last = first.checked_add_months(Months::new(1))?.pred_opt()?;
    Some((first, last))
}

/// Group grades by day, earliest day first.
fn group_by_day(grades: Vec<GradeView>) -> Vec<CalendarDay> {
    let mut days: BTreeMap<NaiveDate, Vec<GradeView>> = BTreeMap::new();
    for view in grades {
        days.entry(view.grade.date).or_default().push(view);
    }
    days.into_iter()
        .map(|(date, grades)| CalendarDay { date, grades })
        .collect()
}

#[get("/grades/calendar?<year>&<month>")]
pub fn grade_calendar(
    pool: &State<PgPool>,
    user: ApprovedUser,
    year: Option<i32>,
    month: Option<u32>,
) -> ApiResult<Vec<CalendarDay>> {
    let today = Utc::now().date_naive();
    let (from, until) = month_bounds(
        year.unwrap_or(today.year()),
        month.unwrap_or(today.month()),
    )
    .ok_or_else(|| bad_request_error("invalid year or month"))?;

    let mut conn = connect(pool)?;
    let user_id = user.0.id();
    let grades = get_grades_for_user(
        &mut conn,
        user_id,
        &GradeFilter {
            from: Some(from),
            until: Some(until),
            ..Default::default()
        },
    )
    .map_err(db_error)?;
    let names = subject_names(&mut conn, user_id)?;
    let views = grades.into_iter().map(|g| grade_view(g, &names)).collect();
    Ok(Json(group_by_day(views)))
}

#[get("/grades/subject/<id>")]
pub fn subject_grades(pool: &State<PgPool>, user: ApprovedUser, id: u32) -> ApiResult<SubjectGrades> {
    let mut conn = connect(pool)?;
    let user_id = user.0.id();
    let subject = found(get_subject(&mut conn, user_id, id), "subject")?;
    let grades = get_grades_for_user(
        &mut conn,
        user_id,
        &GradeFilter {
            subject_id: Some(id),
            ..Default::default()
        },
    )
    .map_err(db_error)?;
    let stats = subject_stats(&grades);

    let names = HashMap::from([(subject.subject_id, subject.name.clone())]);
    let goals = goal_views(&mut conn, user_id)?
        .into_iter()
        .filter(|g| g.goal.subject_id == id)
        .collect();
    Ok(Json(SubjectGrades {
        subject,
        stats,
        grades: grades.into_iter().map(|g| grade_view(g, &names)).collect(),
        goals,
    }))
}

#[get("/semesters")]
pub fn list_semesters(pool: &State<PgPool>, user: ApprovedUser) -> ApiResult<Vec<SemesterRecord>> {
    let mut conn = connect(pool)?;
    get_semesters_for_user(&mut conn, user.0.id())
        .map(Json)
        .map_err(db_error)
}

/// Store a semester inactive, then activate it when asked so the other
/// semesters are switched off in the same step.
fn store_semester(
    conn: &mut PgConnection,
    user_id: u32,
    editing: Option<u32>,
    draft: &SemesterDraft,
) -> ApiResult<SemesterRecord> {
    validate_semester(draft).map_err(validation_error)?;
    let clash = get_semesters_for_user(conn, user_id)
        .map_err(db_error)?
        .into_iter()
        .any(|s| {
            Some(s.semester_id) != editing
                && s.number == draft.number
                && s.school_year == draft.school_year.trim()
        });
    if clash {
        return Err(conflict_error(format!(
            "semester {} of {} already exists",
            draft.number, draft.school_year
        )));
    }

    let inactive = SemesterDraft {
        active: false,
        school_year: draft.school_year.trim().to_string(),
        ..draft.clone()
    };
    let stored = match editing {
        Some(id) => update_semester(conn, user_id, id, &inactive),
        None => insert_semester(conn, user_id, &inactive),
    }
    .map_err(db_error)?;

    if draft.active {
        return activate_semester(conn, user_id, stored.semester_id)
            .map(Json)
            .map_err(db_error);
    }
    Ok(Json(stored))
}

#[post("/semesters", data = "<draft>")]
pub fn create_semester(
    pool: &State<PgPool>,
    user: ApprovedUser,
    draft: Json<SemesterDraft>,
) -> ApiResult<SemesterRecord> {
    let mut conn = connect(pool)?;
    store_semester(&mut conn, user.0.id(), None, &draft)
}

#[put("/semesters/<id>", data = "<draft>")]
pub fn put_semester(
    pool: &State<PgPool>,
    user: ApprovedUser,
    id: u32,
    draft: Json<SemesterDraft>,
) -> ApiResult<SemesterRecord> {
    let mut conn = connect(pool)?;
    found(get_semester(&mut conn, user.0.id(), id), "semester")?;
    store_semester(&mut conn, user.0.id(), Some(id), &draft)
}

#[delete("/semesters/<id>")]
pub fn remove_semester(pool: &State<PgPool>, user: ApprovedUser, id: u32) -> Result<Status, ApiError> {
    let mut conn = connect(pool)?;
    match delete_semester(&mut conn, user.0.id(), id).map_err(db_error)? {
        true => Ok(Status::NoContent),
        false => Err(not_found_error("semester not found")),
    }
}

#[post("/semesters/<id>/activate")]
pub fn activate(pool: &State<PgPool>, user: ApprovedUser, id: u32) -> ApiResult<SemesterRecord> {
    let mut conn = connect(pool)?;
    let user_id = user.0.id();
    found(get_semester(&mut conn, user_id, id), "semester")?;
    activate_semester(&mut conn, user_id, id)
        .map(Json)
        .map_err(db_error)
}

/// Goals with their progress, measured on the marks of the goal's semester.
fn goal_views(conn: &mut PgConnection, user_id: u32) -> Result<Vec<GoalView>, ApiError> {
    let goals = get_goals_for_user(conn, user_id).map_err(db_error)?;
    if goals.is_empty() {
        return Ok(Vec::new());
    }
    let names = subject_names(conn, user_id)?;
    let semesters: HashMap<u32, u8> = get_semesters_for_user(conn, user_id)
        .map_err(db_error)?
        .into_iter()
        .map(|s| (s.semester_id, s.number))
        .collect();
    let grades = get_grades_for_user(conn, user_id, &GradeFilter::default()).map_err(db_error)?;

    Ok(goals
        .into_iter()
        .map(|goal| {
            let stats = goal_stats(&goal, semesters.get(&goal.semester_id).copied(), &grades);
            GoalView {
                subject_name: names.get(&goal.subject_id).cloned().unwrap_or_default(),
                current_average: stats.mean,
                gap: goal_gap(goal.target_average, stats.mean),
                marks_needed: marks_needed(goal.target_average, stats.mean, stats.marks),
                goal,
            }
        })
        .collect())
}

/// Check a goal draft and build the row it will be stored as.
fn checked_goal(
    conn: &mut PgConnection,
    user_id: u32,
    draft: &GoalDraft,
    editing: Option<&GradeGoalRecord>,
) -> Result<GradeGoalRecord, ApiError> {
    validate_goal(draft.target_average).map_err(validation_error)?;
    found(get_subject(conn, user_id, draft.subject_id), "subject")?;
    let semester = found(get_semester(conn, user_id, draft.semester_id), "semester")?;

    let goals = get_goals_for_user(conn, user_id).map_err(db_error)?;
    let clash = goals.iter().any(|g| {
        Some(g.goal_id) != editing.map(|e| e.goal_id)
            && g.subject_id == draft.subject_id
            && g.semester_id == draft.semester_id
    });
    if clash {
        return Err(conflict_error(
            "a goal for this subject and semester already exists",
        ));
    }

    let grades = get_grades_for_user(
        conn,
        user_id,
        &GradeFilter {
            subject_id: Some(draft.subject_id),
            ..Default::default()
        },
    )
    .map_err(db_error)?;

    let mut goal = GradeGoalRecord {
        goal_id: editing.map(|e| e.goal_id).unwrap_or_default(),
        user_id,
        subject_id: draft.subject_id,
        semester_id: draft.semester_id,
        target_average: draft.target_average,
        description: draft.description.clone(),
        reached: false,
        reached_on: None,
    };
    goal.reached = goal_reached(&goal, goal_stats(&goal, Some(semester.number), &grades).mean);
    goal.reached_on = match editing {
        Some(e) if e.reached && goal.reached => e.reached_on,
        _ => goal.reached.then(|| Utc::now().date_naive()),
    };
    Ok(goal)
}

#[get("/goals")]
pub fn list_goals(pool: &State<PgPool>, user: ApprovedUser) -> ApiResult<Vec<GoalView>> {
    let mut conn = connect(pool)?;
    goal_views(&mut conn, user.0.id()).map(Json)
}

#[post("/goals", data = "<draft>")]
pub fn create_goal(
    pool: &State<PgPool>,
    user: ApprovedUser,
    draft: Json<GoalDraft>,
) -> ApiResult<GradeGoalRecord> {
    let mut conn = connect(pool)?;
    let goal = checked_goal(&mut conn, user.0.id(), &draft, None)?;
    insert_goal(&mut conn, &goal).map(Json).map_err(db_error)
}

#[put("/goals/<id>", data = "<draft>")]
pub fn put_goal(
    pool: &State<PgPool>,
    user: ApprovedUser,
    id: u32,
    draft: Json<GoalDraft>,
) -> ApiResult<GradeGoalRecord> {
    let mut conn = connect(pool)?;
    let user_id = user.0.id();
    let existing = found(get_goal(&mut conn, user_id, id), "goal")?;
    let goal = checked_goal(&mut conn, user_id, &draft, Some(&existing))?;
    update_goal(&mut conn, &goal).map(Json).map_err(db_error)
}

#[delete("/goals/<id>")]
pub fn remove_goal(pool: &State<PgPool>, user: ApprovedUser, id: u32) -> Result<Status, ApiError> {
    let mut conn = connect(pool)?;
    match delete_goal(&mut conn, user.0.id(), id).map_err(db_error)? {
        true => Ok(Status::NoContent),
        false => Err(not_found_error("goal not found")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(kind: GradeKind, value: Option<f64>) -> GradeDraft {
        GradeDraft {
            subject_id: 4,
            kind,
            value,
            assessment: None,
            description: String::new(),
            date: None,
            semester: 1,
            excused: false,
            notes: String::new(),
            important: false,
        }
    }

    #[test_log::test]
    fn test_month_bounds() {
        let (first, last) = month_bounds(2024, 2).unwrap();
        assert_eq!(first, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        let (_, december) = month_bounds(2025, 12).unwrap();
        assert_eq!(december, NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
        assert!(month_bounds(2025, 13).is_none());
    }

    #[test_log::test]
    fn test_grade_from_draft_keeps_identity() {
        let today = NaiveDate::from_ymd_opt(2025, 10, 2).unwrap();
        let first = grade_from_draft(7, &draft(GradeKind::Mark, Some(9.5)), GradeKind::Mark, None, today);
        assert_eq!(first.grade_id, 0);
        assert_eq!(first.date, today);
        assert!(!first.excused);

        let stored = GradeRecord {
            grade_id: 12,
            date: NaiveDate::from_ymd_opt(2025, 9, 20).unwrap(),
            ..first
        };
        let edited = grade_from_draft(
            7,
            &draft(GradeKind::Mark, Some(8.0)),
            GradeKind::Mark,
            Some(&stored),
            today,
        );
        assert_eq!(edited.grade_id, 12);
        assert_eq!(edited.date, stored.date);
        assert_eq!(edited.created_at, stored.created_at);
        assert_eq!(edited.value, Some(8.0));
    }

    #[test_log::test]
    fn test_excused_absence_is_stamped() {
        let today = NaiveDate::from_ymd_opt(2025, 10, 2).unwrap();
        let grade = grade_from_draft(
            7,
            &draft(GradeKind::Absence, None),
            GradeKind::ExcusedAbsence,
            None,
            today,
        );
        assert!(grade.excused);
        assert_eq!(grade.excused_on, Some(today));
        assert_eq!(grade.value, None);
    }

    #[test_log::test]
    fn test_group_by_day() {
        let today = NaiveDate::from_ymd_opt(2025, 10, 2).unwrap();
        let names = HashMap::new();
        let make = |day: u32, value: f64| {
            let mut g = grade_from_draft(1, &draft(GradeKind::Mark, Some(value)), GradeKind::Mark, None, today);
            g.date = NaiveDate::from_ymd_opt(2025, 10, day).unwrap();
            grade_view(g, &names)
        };
        let days = group_by_day(vec![make(9, 7.0), make(3, 10.0), make(9, 5.0)]);
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].date.day(), 3);
        assert_eq!(days[1].grades.len(), 2);
        assert_eq!(days[0].grades[0].colour, Some("#28a745"));
    }
}
