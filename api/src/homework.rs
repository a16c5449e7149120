//! Homework of the caller: listing, editing, progress and completion.

use crate::auth::ApprovedUser;
use crate::effects::after_homework_saved;
use crate::helpers::*;
use crate::mail_queue::MailQueue;
use chrono::{NaiveDate, Utc};
use rocket::State;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::serde::{Deserialize, Serialize};
use school_common::db_util::{
    HomeworkFilter, PgConnection, PgPool, delete_homework, get_class_room, get_homework,
    get_homework_for_user, get_reminders_for_homework, get_subject, get_subjects_for_user,
    insert_homework, update_homework,
};
use school_common::homework::{
    add_worked_minutes, apply_draft, days_left, is_overdue, new_record, remaining_minutes,
    resolve_sharing, set_progress, status_label, toggle_completion, urgency_colour,
    validate_homework, validate_progress,
};
use school_common::{AchievementRecord, HomeworkDraft, HomeworkRecord, HomeworkReminderRecord};
use std::collections::HashMap;

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct HomeworkView {
    #[serde(flatten)]
    pub homework: HomeworkRecord,
    pub subject_name: String,
    pub days_left: i64,
    pub overdue: bool,
    pub status: String,
    pub colour: &'static str,
    pub remaining_minutes: u32,
}

impl HomeworkView {
    pub fn new(homework: HomeworkRecord, subject_name: String, today: NaiveDate) -> Self {
        Self {
            days_left: days_left(&homework, today),
            overdue: is_overdue(&homework, today),
            status: status_label(&homework, today),
            colour: urgency_colour(&homework, today),
            remaining_minutes: remaining_minutes(&homework),
            subject_name,
            homework,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct HomeworkDetail {
    #[serde(flatten)]
    pub view: HomeworkView,
    pub reminders: Vec<HomeworkReminderRecord>,
}

/// A saved homework with the achievements the save unlocked.
#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct SavedHomework {
    pub homework: HomeworkView,
    pub unlocked: Vec<AchievementRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct ProgressInput {
    pub progress: i64,
}

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct TimeInput {
    pub minutes: u32,
}

/// Attach subject names and derived fields to a list of homework.
pub fn homework_views(
    conn: &mut PgConnection,
    user_id: u32,
    homework: Vec<HomeworkRecord>,
    today: NaiveDate,
) -> Result<Vec<HomeworkView>, ApiError> {
    let names: HashMap<u32, String> = get_subjects_for_user(conn, user_id, true)
        .map_err(db_error)?
        .into_iter()
        .map(|s| (s.subject_id, s.name))
        .collect();
    Ok(homework
        .into_iter()
        .map(|hw| {
            let name = names.get(&hw.subject_id).cloned().unwrap_or_default();
            HomeworkView::new(hw, name, today)
        })
        .collect())
}

fn saved(
    conn: &mut PgConnection,
    user_id: u32,
    homework: HomeworkRecord,
    unlocked: Vec<AchievementRecord>,
) -> Json<SavedHomework> {
    let subject = crate::effects::subject_name(conn, user_id, homework.subject_id);
    Json(SavedHomework {
        homework: HomeworkView::new(homework, subject, Utc::now().date_naive()),
        unlocked,
    })
}

/// Store an edited homework and run the follow-up effects.
fn store_change(
    conn: &mut PgConnection,
    mail: &MailQueue,
    user: &ApprovedUser,
    homework: &HomeworkRecord,
    was_completed: bool,
) -> ApiResult<SavedHomework> {
    let stored = update_homework(conn, homework).map_err(db_error)?;
    let unlocked = after_homework_saved(
        conn,
        mail,
        user.0.id(),
        user.0.profile.as_ref(),
        &stored,
        was_completed,
        false,
    );
    Ok(saved(conn, user.0.id(), stored, unlocked))
}

fn check_draft_refs(
    conn: &mut PgConnection,
    user_id: u32,
    draft: &HomeworkDraft,
) -> Result<(), ApiError> {
    found(get_subject(conn, user_id, draft.subject_id), "subject")?;
    if let Some(class_room_id) = draft.shared_class_room_id {
        found(get_class_room(conn, class_room_id), "class")?;
    }
    Ok(())
}

#[get("/homework?<subject>&<status>")]
pub fn list_homework(
    pool: &State<PgPool>,
    user: ApprovedUser,
    subject: Option<u32>,
    status: Option<&str>,
) -> ApiResult<Vec<HomeworkView>> {
    let today = Utc::now().date_naive();
    let mut filter = HomeworkFilter {
        subject_id: subject,
        ..Default::default()
    };
    let mut overdue_only = false;
    match status {
        None | Some("all") => {}
        Some("open") => filter.completed = Some(false),
        Some("completed") => filter.completed = Some(true),
        Some("overdue") => {
            filter.completed = Some(false);
            overdue_only = true;
        }
        Some(other) => return Err(bad_request_error(format!("unknown status filter: {other}"))),
    }

    let mut conn = connect(pool)?;
    let user_id = user.0.id();
    let mut homework = get_homework_for_user(&mut conn, user_id, &filter).map_err(db_error)?;
    if overdue_only {
        homework.retain(|hw| is_overdue(hw, today));
    }
    homework_views(&mut conn, user_id, homework, today).map(Json)
}

#[post("/homework", data = "<draft>")]
pub fn create_homework(
    pool: &State<PgPool>,
    mail: &State<MailQueue>,
    user: ApprovedUser,
    draft: Json<HomeworkDraft>,
) -> ApiResult<SavedHomework> {
    let now = Utc::now();
    let assigned_on = validate_homework(&draft, now.date_naive(), true).map_err(validation_error)?;
    let mut conn = connect(pool)?;
    let user_id = user.0.id();
    check_draft_refs(&mut conn, user_id, &draft)?;

    let mut record = new_record(user_id, &draft, assigned_on);
    resolve_sharing(&mut record, user.0.class_room_id(), now);
    let stored = insert_homework(&mut conn, &record).map_err(db_error)?;
    tracing::debug!(user_id, homework_id = stored.homework_id, "Homework created");

    let unlocked = after_homework_saved(
        &mut conn,
        mail,
        user_id,
        user.0.profile.as_ref(),
        &stored,
        false,
        true,
    );
    Ok(saved(&mut conn, user_id, stored, unlocked))
}

#[get("/homework/<id>")]
pub fn get_one_homework(pool: &State<PgPool>, user: ApprovedUser, id: u32) -> ApiResult<HomeworkDetail> {
    let mut conn = connect(pool)?;
    let user_id = user.0.id();
    let homework = found(get_homework(&mut conn, user_id, id), "homework")?;
    let reminders = get_reminders_for_homework(&mut conn, id).map_err(db_error)?;
    let subject = crate::effects::subject_name(&mut conn, user_id, homework.subject_id);
    Ok(Json(HomeworkDetail {
        view: HomeworkView::new(homework, subject, Utc::now().date_naive()),
        reminders,
    }))
}

#[put("/homework/<id>", data = "<draft>")]
pub fn put_homework(
    pool: &State<PgPool>,
    mail: &State<MailQueue>,
    user: ApprovedUser,
    id: u32,
    draft: Json<HomeworkDraft>,
) -> ApiResult<SavedHomework> {
    let now = Utc::now();
    let assigned_on =
        validate_homework(&draft, now.date_naive(), false).map_err(validation_error)?;
    let mut conn = connect(pool)?;
    let user_id = user.0.id();
    let mut homework = found(get_homework(&mut conn, user_id, id), "homework")?;
    check_draft_refs(&mut conn, user_id, &draft)?;

    let was_completed = homework.completed;
    apply_draft(&mut homework, &draft, assigned_on);
    resolve_sharing(&mut homework, user.0.class_room_id(), now);
    store_change(&mut conn, mail, &user, &homework, was_completed)
}

#[delete("/homework/<id>")]
pub fn remove_homework(pool: &State<PgPool>, user: ApprovedUser, id: u32) -> Result<Status, ApiError> {
    let mut conn = connect(pool)?;
    match delete_homework(&mut conn, user.0.id(), id).map_err(db_error)? {
        true => Ok(Status::NoContent),
        false => Err(not_found_error("homework not found")),
    }
}

#[post("/homework/<id>/toggle-complete")]
pub fn toggle_homework(
    pool: &State<PgPool>,
    mail: &State<MailQueue>,
    user: ApprovedUser,
    id: u32,
) -> ApiResult<SavedHomework> {
    let mut conn = connect(pool)?;
    let mut homework = found(get_homework(&mut conn, user.0.id(), id), "homework")?;
    let was_completed = homework.completed;
    toggle_completion(&mut homework, Utc::now());
    store_change(&mut conn, mail, &user, &homework, was_completed)
}

#[post("/homework/<id>/progress", data = "<input>")]
pub fn homework_progress(
    pool: &State<PgPool>,
    mail: &State<MailQueue>,
    user: ApprovedUser,
    id: u32,
    input: Json<ProgressInput>,
) -> ApiResult<SavedHomework> {
    let progress = validate_progress(input.progress).map_err(validation_error)?;
    let mut conn = connect(pool)?;
    let mut homework = found(get_homework(&mut conn, user.0.id(), id), "homework")?;
    let was_completed = homework.completed;
    set_progress(&mut homework, progress, Utc::now());
    store_change(&mut conn, mail, &user, &homework, was_completed)
}

#[post("/homework/<id>/time", data = "<input>")]
pub fn homework_time(
    pool: &State<PgPool>,
    user: ApprovedUser,
    id: u32,
    input: Json<TimeInput>,
) -> ApiResult<HomeworkView> {
    if input.minutes == 0 {
        return Err(unprocessable_entity_error("minutes must be positive"));
    }
    let mut conn = connect(pool)?;
    let user_id = user.0.id();
    let mut homework = found(get_homework(&mut conn, user_id, id), "homework")?;
    add_worked_minutes(&mut homework, input.minutes);
    let stored = update_homework(&mut conn, &homework).map_err(db_error)?;
    let subject = crate::effects::subject_name(&mut conn, user_id, stored.subject_id);
    Ok(Json(HomeworkView::new(stored, subject, Utc::now().date_naive())))
}
