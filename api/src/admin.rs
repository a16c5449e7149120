//! Administration: account approval, roles, classes and class schedule templates.
//!
//! Template edits are pushed to the students of the class right away. The
//! response carries the propagation report so partial failures are visible.

use crate::account::AccountView;
use crate::auth::AdminUser;
use crate::effects::notify;
use crate::helpers::*;
use chrono::Utc;
use rocket::State;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::serde::{Deserialize, Serialize};
use school_common::accounts::{
    approve, check_deactivation, check_role_change, revoke, validate_class_room, validate_colour,
};
use school_common::db_util::{
    PgConnection, PgPool, PgScheduleStore, count_active_superadmins, deactivate_user,
    delete_class_entry, delete_class_room, get_all_class_rooms, get_class_entry, get_class_room,
    get_class_template, get_pending_profiles, get_profile, get_schedule_for_user,
    get_subjects_for_user, get_user_by_id, get_users_by_ids, insert_class_entry,
    insert_class_room, replace_class_template, update_class_entry, update_class_room,
    update_profile, update_user_role,
};
use school_common::notifications::account_approved;
use school_common::propagation::{
    PropagationReport, propagate_entry, propagate_replacement, retract_entry,
    template_from_personal,
};
use school_common::schedule::validate_class_entry;
use school_common::{
    ClassRoomDraft, ClassRoomRecord, ClassScheduleEntryDraft, ClassScheduleEntryRecord,
    ProfileRecord, UserRecord, UserRole,
};

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct RoleChange {
    pub role: UserRole,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct PendingAccount {
    pub user: UserRecord,
    pub profile: ProfileRecord,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct TemplateChange {
    pub entry: ClassScheduleEntryRecord,
    pub propagation: PropagationReport,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct TemplateImport {
    pub entries: Vec<ClassScheduleEntryRecord>,
    pub propagation: PropagationReport,
}

fn log_report(class_room_id: u32, action: &str, report: &PropagationReport) {
    if report.failed > 0 {
        tracing::warn!(
            class_room_id,
            students = report.students,
            failed = report.failed,
            "Class schedule {action} reached only part of the class"
        );
    } else {
        tracing::info!(
            class_room_id,
            students = report.students,
            applied = report.applied,
            "Class schedule {action} propagated"
        );
    }
}

fn load_account(conn: &mut PgConnection, user_id: u32) -> Result<(UserRecord, ProfileRecord), ApiError> {
    let user = found(get_user_by_id(conn, user_id), "user")?;
    let profile = found(get_profile(conn, user_id), "profile")?;
    Ok((user, profile))
}

#[get("/admin/users/pending")]
pub fn pending_accounts(pool: &State<PgPool>, _admin: AdminUser) -> ApiResult<Vec<PendingAccount>> {
    let mut conn = connect(pool)?;
    let profiles = get_pending_profiles(&mut conn).map_err(db_error)?;
    let ids: Vec<u32> = profiles.iter().map(|p| p.user_id).collect();
    let users = get_users_by_ids(&mut conn, &ids).map_err(db_error)?;

    let pending = profiles
        .into_iter()
        .filter_map(|profile| {
            let user = users.iter().find(|u| u.user_id == profile.user_id)?;
            (user.is_active && user.role == UserRole::Student).then(|| PendingAccount {
                user: user.clone(),
                profile,
            })
        })
        .collect();
    Ok(Json(pending))
}

#[post("/admin/users/<id>/approve")]
pub fn approve_account(pool: &State<PgPool>, admin: AdminUser, id: u32) -> ApiResult<AccountView> {
    let mut conn = connect(pool)?;
    let (user, mut profile) = load_account(&mut conn, id)?;
    if profile.approved {
        return Ok(Json(AccountView {
            user,
            profile: Some(profile),
        }));
    }
    approve(&mut profile, admin.0.id(), Utc::now());
    let profile = update_profile(&mut conn, &profile).map_err(db_error)?;
    notify(&mut conn, id, &account_approved());
    tracing::info!(user_id = id, approved_by = admin.0.id(), "Account approved");
    Ok(Json(AccountView {
        user,
        profile: Some(profile),
    }))
}

#[post("/admin/users/<id>/revoke")]
pub fn revoke_account(pool: &State<PgPool>, admin: AdminUser, id: u32) -> ApiResult<AccountView> {
    let mut conn = connect(pool)?;
    let (user, mut profile) = load_account(&mut conn, id)?;
    if user.role.is_admin() {
        return Err(forbidden_error("administrators do not need approval"));
    }
    revoke(&mut profile, Utc::now());
    let profile = update_profile(&mut conn, &profile).map_err(db_error)?;
    tracing::info!(user_id = id, revoked_by = admin.0.id(), "Approval revoked");
    Ok(Json(AccountView {
        user,
        profile: Some(profile),
    }))
}

#[post("/admin/users/<id>/deactivate")]
pub fn deactivate_account(pool: &State<PgPool>, admin: AdminUser, id: u32) -> ApiResult<UserRecord> {
    let mut conn = connect(pool)?;
    let target = found(get_user_by_id(&mut conn, id), "user")?;
    let superadmins = count_active_superadmins(&mut conn).map_err(db_error)?;
    check_deactivation(&admin.0.user, &target, superadmins).map_err(validation_error)?;
    let user = deactivate_user(&mut conn, id).map_err(db_error)?;
    tracing::info!(user_id = id, by = admin.0.id(), "User deactivated");
    Ok(Json(user))
}

#[put("/admin/users/<id>/role", data = "<change>")]
pub fn change_role(
    pool: &State<PgPool>,
    admin: AdminUser,
    id: u32,
    change: Json<RoleChange>,
) -> ApiResult<UserRecord> {
    let mut conn = connect(pool)?;
    let target = found(get_user_by_id(&mut conn, id), "user")?;
    let superadmins = count_active_superadmins(&mut conn).map_err(db_error)?;
    check_role_change(&admin.0.user, &target, change.role, superadmins)
        .map_err(validation_error)?;
    let user = update_user_role(&mut conn, id, change.role).map_err(db_error)?;
    tracing::info!(user_id = id, role = %user.role, by = admin.0.id(), "Role changed");
    Ok(Json(user))
}

#[get("/admin/classes")]
pub fn list_classes(pool: &State<PgPool>, _admin: AdminUser) -> ApiResult<Vec<ClassRoomRecord>> {
    let mut conn = connect(pool)?;
    get_all_class_rooms(&mut conn).map(Json).map_err(db_error)
}

fn check_class_name(
    conn: &mut PgConnection,
    draft: &ClassRoomDraft,
    editing: Option<u32>,
) -> Result<(), ApiError> {
    validate_class_room(draft).map_err(validation_error)?;
    let name = draft.name.trim();
    let clash = get_all_class_rooms(conn)
        .map_err(db_error)?
        .into_iter()
        .any(|c| Some(c.class_room_id) != editing && c.name == name);
    if clash {
        return Err(conflict_error(format!("class {name} already exists")));
    }
    Ok(())
}

#[post("/admin/classes", data = "<draft>")]
pub fn create_class(
    pool: &State<PgPool>,
    _admin: AdminUser,
    draft: Json<ClassRoomDraft>,
) -> ApiResult<ClassRoomRecord> {
    let mut conn = connect(pool)?;
    check_class_name(&mut conn, &draft, None)?;
    insert_class_room(&mut conn, &draft)
        .map(Json)
        .map_err(db_error)
}

#[put("/admin/classes/<id>", data = "<draft>")]
pub fn put_class(
    pool: &State<PgPool>,
    _admin: AdminUser,
    id: u32,
    draft: Json<ClassRoomDraft>,
) -> ApiResult<ClassRoomRecord> {
    let mut conn = connect(pool)?;
    found(get_class_room(&mut conn, id), "class")?;
    check_class_name(&mut conn, &draft, Some(id))?;
    update_class_room(&mut conn, id, &draft)
        .map(Json)
        .map_err(db_error)
}

/// Students keep their copied lessons. Their profiles lose the class link.
#[delete("/admin/classes/<id>")]
pub fn remove_class(pool: &State<PgPool>, _admin: AdminUser, id: u32) -> Result<Status, ApiError> {
    let mut conn = connect(pool)?;
    match delete_class_room(&mut conn, id).map_err(db_error)? {
        true => Ok(Status::NoContent),
        false => Err(not_found_error("class not found")),
    }
}

#[get("/admin/classes/<id>/schedule")]
pub fn class_schedule(
    pool: &State<PgPool>,
    _admin: AdminUser,
    id: u32,
) -> ApiResult<Vec<ClassScheduleEntryRecord>> {
    let mut conn = connect(pool)?;
    found(get_class_room(&mut conn, id), "class")?;
    get_class_template(&mut conn, id)
        .map(Json)
        .map_err(db_error)
}

fn check_template_entry(
    conn: &mut PgConnection,
    class_room_id: u32,
    draft: &ClassScheduleEntryDraft,
    editing: Option<u32>,
) -> Result<(), ApiError> {
    if let Some(color) = &draft.subject_color {
        validate_colour(color).map_err(validation_error)?;
    }
    let template = get_class_template(conn, class_room_id).map_err(db_error)?;
    validate_class_entry(draft, editing, &template).map_err(validation_error)
}

#[post("/admin/classes/<id>/schedule", data = "<draft>")]
pub fn create_class_entry(
    pool: &State<PgPool>,
    _admin: AdminUser,
    id: u32,
    draft: Json<ClassScheduleEntryDraft>,
) -> ApiResult<TemplateChange> {
    let mut conn = connect(pool)?;
    found(get_class_room(&mut conn, id), "class")?;
    check_template_entry(&mut conn, id, &draft, None)?;
    let entry = insert_class_entry(&mut conn, id, &draft).map_err(db_error)?;

    let propagation =
        propagate_entry(&mut PgScheduleStore::new(&mut conn), &entry, None).map_err(db_error)?;
    log_report(id, "entry", &propagation);
    Ok(Json(TemplateChange { entry, propagation }))
}

#[put("/admin/classes/<id>/schedule/<entry_id>", data = "<draft>")]
pub fn put_class_entry(
    pool: &State<PgPool>,
    _admin: AdminUser,
    id: u32,
    entry_id: u32,
    draft: Json<ClassScheduleEntryDraft>,
) -> ApiResult<TemplateChange> {
    let mut conn = connect(pool)?;
    let previous = found(get_class_entry(&mut conn, id, entry_id), "class schedule entry")?;
    check_template_entry(&mut conn, id, &draft, Some(entry_id))?;
    let entry = update_class_entry(&mut conn, id, entry_id, &draft).map_err(db_error)?;

    let propagation = propagate_entry(
        &mut PgScheduleStore::new(&mut conn),
        &entry,
        Some((previous.weekday, previous.slot)),
    )
    .map_err(db_error)?;
    log_report(id, "edit", &propagation);
    Ok(Json(TemplateChange { entry, propagation }))
}

#[delete("/admin/classes/<id>/schedule/<entry_id>")]
pub fn remove_class_entry(
    pool: &State<PgPool>,
    _admin: AdminUser,
    id: u32,
    entry_id: u32,
) -> ApiResult<TemplateChange> {
    let mut conn = connect(pool)?;
    let entry = found(get_class_entry(&mut conn, id, entry_id), "class schedule entry")?;
    delete_class_entry(&mut conn, id, entry_id).map_err(db_error)?;

    let propagation =
        retract_entry(&mut PgScheduleStore::new(&mut conn), &entry).map_err(db_error)?;
    log_report(id, "removal", &propagation);
    Ok(Json(TemplateChange { entry, propagation }))
}

/// Replace a class template with one student's personal schedule and push it
/// to the class. Slots only the old template defined are removed from the
/// students. Lessons students added themselves stay.
#[post("/admin/classes/<id>/schedule/import/<user_id>")]
pub fn import_class_schedule(
    pool: &State<PgPool>,
    _admin: AdminUser,
    id: u32,
    user_id: u32,
) -> ApiResult<TemplateImport> {
    let mut conn = connect(pool)?;
    found(get_class_room(&mut conn, id), "class")?;
    found(get_user_by_id(&mut conn, user_id), "user")?;

    let lessons = get_schedule_for_user(&mut conn, user_id, None).map_err(db_error)?;
    let subjects = get_subjects_for_user(&mut conn, user_id, true).map_err(db_error)?;
    let drafts = template_from_personal(&lessons, &subjects);
    if drafts.is_empty() {
        return Err(unprocessable_entity_error("the student has no lessons to import"));
    }

    let previous = get_class_template(&mut conn, id).map_err(db_error)?;
    let entries = replace_class_template(&mut conn, id, &drafts).map_err(db_error)?;
    let mut store = PgScheduleStore::new(&mut conn);
    let propagation =
        propagate_replacement(&mut store, &previous, &entries).map_err(db_error)?;
    log_report(id, "import", &propagation);
    Ok(Json(TemplateImport {
        entries,
        propagation,
    }))
}
