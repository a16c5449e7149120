//! Subjects of the caller and their statistics.

use crate::auth::ApprovedUser;
use crate::helpers::*;
use rocket::State;
use rocket::http::Status;
use rocket::serde::Serialize;
use rocket::serde::json::Json;
use school_common::accounts::validate_subject;
use school_common::db_util::{
    GradeFilter, HomeworkFilter, PgPool, count_lessons_for_subject, delete_subject,
    get_goals_for_user, get_grades_for_user, get_homework_for_user, get_subject,
    get_subject_by_name, get_subjects_for_user, insert_subject, update_subject,
    update_subject_rating,
};
use school_common::grade_stats::{SubjectStats, absence_percentage, subject_stats};
use school_common::{GradeGoalRecord, GradeRecord, HomeworkRecord, SubjectDraft, SubjectRecord};

const RECENT_GRADES: usize = 10;

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct SubjectDetail {
    pub subject: SubjectRecord,
    pub stats: SubjectStats,
    pub lessons_per_week: usize,
    pub absence_percentage: f64,
    pub recent_grades: Vec<GradeRecord>,
    pub open_homework: Vec<HomeworkRecord>,
    pub goals: Vec<GradeGoalRecord>,
}

#[get("/subjects?<all>")]
pub fn list_subjects(
    pool: &State<PgPool>,
    user: ApprovedUser,
    all: Option<bool>,
) -> ApiResult<Vec<SubjectRecord>> {
    let mut conn = connect(pool)?;
    get_subjects_for_user(&mut conn, user.0.id(), all.unwrap_or(false))
        .map(Json)
        .map_err(db_error)
}

#[post("/subjects", data = "<draft>")]
pub fn create_subject(
    pool: &State<PgPool>,
    user: ApprovedUser,
    draft: Json<SubjectDraft>,
) -> ApiResult<SubjectRecord> {
    validate_subject(&draft).map_err(validation_error)?;
    let mut conn = connect(pool)?;
    let user_id = user.0.id();

    let duplicate = get_subject_by_name(&mut conn, user_id, draft.name.trim()).map_err(db_error)?;
    if duplicate.is_some() {
        return Err(conflict_error(format!(
            "a subject named {} already exists",
            draft.name.trim()
        )));
    }
    insert_subject(&mut conn, user_id, &draft)
        .map(Json)
        .map_err(db_error)
}

#[get("/subjects/<id>")]
pub fn get_one_subject(pool: &State<PgPool>, user: ApprovedUser, id: u32) -> ApiResult<SubjectRecord> {
    let mut conn = connect(pool)?;
    found(get_subject(&mut conn, user.0.id(), id), "subject").map(Json)
}

#[put("/subjects/<id>", data = "<draft>")]
pub fn put_subject(
    pool: &State<PgPool>,
    user: ApprovedUser,
    id: u32,
    draft: Json<SubjectDraft>,
) -> ApiResult<SubjectRecord> {
    validate_subject(&draft).map_err(validation_error)?;
    let mut conn = connect(pool)?;
    let user_id = user.0.id();
    found(get_subject(&mut conn, user_id, id), "subject")?;

    let clash = get_subject_by_name(&mut conn, user_id, draft.name.trim()).map_err(db_error)?;
    if clash.is_some_and(|s| s.subject_id != id) {
        return Err(conflict_error(format!(
            "a subject named {} already exists",
            draft.name.trim()
        )));
    }
    update_subject(&mut conn, user_id, id, &draft)
        .map(Json)
        .map_err(db_error)
}

#[delete("/subjects/<id>")]
pub fn remove_subject(pool: &State<PgPool>, user: ApprovedUser, id: u32) -> Result<Status, ApiError> {
    let mut conn = connect(pool)?;
    match delete_subject(&mut conn, user.0.id(), id).map_err(db_error)? {
        true => Ok(Status::NoContent),
        false => Err(not_found_error("subject not found")),
    }
}

#[post("/subjects/<id>/rating/<value>")]
pub fn rate_subject(
    pool: &State<PgPool>,
    user: ApprovedUser,
    id: u32,
    value: u8,
) -> ApiResult<SubjectRecord> {
    if !(1..=5).contains(&value) {
        return Err(unprocessable_entity_error("rating must be between 1 and 5"));
    }
    let mut conn = connect(pool)?;
    let user_id = user.0.id();
    found(get_subject(&mut conn, user_id, id), "subject")?;
    update_subject_rating(&mut conn, user_id, id, value)
        .map(Json)
        .map_err(db_error)
}

#[get("/subjects/<id>/stats")]
pub fn subject_detail(pool: &State<PgPool>, user: ApprovedUser, id: u32) -> ApiResult<SubjectDetail> {
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
    let lessons_per_week = count_lessons_for_subject(&mut conn, user_id, id).map_err(db_error)?;

    let open_homework = get_homework_for_user(
        &mut conn,
        user_id,
        &HomeworkFilter {
            subject_id: Some(id),
            completed: Some(false),
            ..Default::default()
        },
    )
    .map_err(db_error)?;
    let goals = get_goals_for_user(&mut conn, user_id)
        .map_err(db_error)?
        .into_iter()
        .filter(|g| g.subject_id == id)
        .collect();

    Ok(Json(SubjectDetail {
        subject,
        absence_percentage: absence_percentage(stats.total_absences(), lessons_per_week),
        stats,
        lessons_per_week,
        recent_grades: grades.into_iter().take(RECENT_GRADES).collect(),
        open_homework,
        goals,
    }))
}
