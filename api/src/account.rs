//! Registration and the caller's own profile.

use crate::auth::CurrentUser;
use crate::effects::notify;
use crate::helpers::*;
use chrono::Utc;
use rocket::State;
use rocket::serde::Serialize;
use rocket::serde::json::Json;
use school_common::accounts::{apply_profile_update, validate_profile_update, validate_registration};
use school_common::db_util::{
    PgConnection, PgPool, PgScheduleStore, get_admins, get_class_room, insert_student,
    update_profile, username_or_email_taken,
};
use school_common::notifications::account_pending;
use school_common::propagation::{reassign_student, seed_new_student};
use school_common::{ProfileRecord, ProfileUpdate, Registration, UserRecord};

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct AccountView {
    pub user: UserRecord,
    pub profile: Option<ProfileRecord>,
}

fn require_class(conn: &mut PgConnection, class_room_id: Option<u32>) -> Result<(), ApiError> {
    if let Some(class_room_id) = class_room_id {
        found(get_class_room(conn, class_room_id), "class")?;
    }
    Ok(())
}

#[post("/register", data = "<registration>")]
pub fn register(pool: &State<PgPool>, registration: Json<Registration>) -> ApiResult<AccountView> {
    validate_registration(&registration).map_err(validation_error)?;
    let mut conn = connect(pool)?;

    let taken = username_or_email_taken(
        &mut conn,
        registration.username.trim(),
        registration.email.trim(),
    )
    .map_err(db_error)?;
    if taken {
        return Err(conflict_error("username or email already registered"));
    }
    require_class(&mut conn, registration.class_room_id)?;

    let (user, profile) = insert_student(&mut conn, &registration).map_err(db_error)?;
    tracing::info!(user_id = user.user_id, username = %user.username, "Student registered");

    if let Some(class_room_id) = profile.class_room_id {
        let mut store = PgScheduleStore::new(&mut conn);
        match seed_new_student(&mut store, class_room_id, user.user_id) {
            Ok(lessons) => tracing::debug!(user_id = user.user_id, lessons, "Copied class schedule"),
            Err(e) => tracing::warn!(user_id = user.user_id, error = %e, "Failed to copy class schedule"),
        }
    }

    let pending = account_pending(&user);
    for admin in get_admins(&mut conn).map_err(db_error)? {
        notify(&mut conn, admin.user_id, &pending);
    }

    Ok(Json(AccountView {
        user,
        profile: Some(profile),
    }))
}

#[get("/profile")]
pub fn get_own_profile(current: CurrentUser) -> Json<AccountView> {
    Json(AccountView {
        user: current.user,
        profile: current.profile,
    })
}

#[put("/profile", data = "<update>")]
pub fn put_profile(
    pool: &State<PgPool>,
    current: CurrentUser,
    update: Json<ProfileUpdate>,
) -> ApiResult<AccountView> {
    validate_profile_update(&update).map_err(validation_error)?;
    let user_id = current.id();
    let mut profile = current
        .profile
        .ok_or_else(|| not_found_error("profile not found"))?;

    let mut conn = connect(pool)?;
    require_class(&mut conn, update.class_room_id)?;

    let moved_from = apply_profile_update(&mut profile, &update, Utc::now());
    let profile = update_profile(&mut conn, &profile).map_err(db_error)?;

    if let Some(previous) = moved_from {
        tracing::info!(user_id, ?previous, current = ?profile.class_room_id, "Student changed class");
        let mut store = PgScheduleStore::new(&mut conn);
        if let Err(e) = reassign_student(&mut store, user_id, previous, profile.class_room_id) {
            tracing::warn!(user_id, error = %e, "Failed to replace schedule after class change");
        }
    }

    Ok(Json(AccountView {
        user: current.user,
        profile: Some(profile),
    }))
}
