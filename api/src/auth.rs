//! Request guards for the user identified by the upstream gateway.
//!
//! The gateway authenticates the caller and forwards the user id in the
//! `X-User-Id` header. The guards only load and check that user.

use crate::effects;
use chrono::Utc;
use rocket::http::Status;
use rocket::outcome::try_outcome;
use rocket::request::{FromRequest, Outcome, Request};
use school_common::accounts::can_use_app;
use school_common::achievements::evaluate_activity_rules;
use school_common::db_util::{
    PgConnection, PgPool, count_active_days, get_pooled_database_connection, get_profile,
    get_user_by_id, record_activity,
};
use school_common::{ProfileRecord, UserRecord};

pub const USER_ID_HEADER: &str = "X-User-Id";

/// Why a guard refused the request. Read back by the catchers.
#[derive(Debug, Clone, Default)]
pub struct GuardFailure(pub Option<String>);

/// Any active user.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: UserRecord,
    pub profile: Option<ProfileRecord>,
}

impl CurrentUser {
    pub fn id(&self) -> u32 {
        self.user.user_id
    }

    pub fn class_room_id(&self) -> Option<u32> {
        self.profile.as_ref().and_then(|p| p.class_room_id)
    }
}

/// An active user allowed to use the planner: an admin or an approved student.
#[derive(Debug, Clone)]
pub struct ApprovedUser(pub CurrentUser);

/// An active admin or superadmin.
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

fn refuse<T>(request: &Request<'_>, status: Status, message: &str) -> Outcome<T, String> {
    request.local_cache(|| GuardFailure(Some(message.to_string())));
    Outcome::Error((status, message.to_string()))
}

fn parse_user_id(raw: Option<&str>) -> Result<u32, &'static str> {
    let raw = raw.ok_or("missing X-User-Id header")?;
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or("malformed X-User-Id header")
}

/// First sighting of a user on a day feeds the activity achievements.
fn track_activity(conn: &mut PgConnection, user: &UserRecord) {
    let now = Utc::now();
    let today = now.date_naive();
    let first_today = match record_activity(conn, user.user_id, today) {
        Ok(first_today) => first_today,
        Err(e) => {
            tracing::warn!(user_id = user.user_id, error = %e, "Failed to record activity");
            return;
        }
    };
    if !first_today {
        return;
    }
    match count_active_days(conn, user.user_id) {
        Ok(days) => {
            let unlocks = evaluate_activity_rules(user.created_at.date_naive(), today, days);
            effects::unlock_all(conn, user.user_id, &unlocks, now);
        }
        Err(e) => tracing::warn!(user_id = user.user_id, error = %e, "Failed to count active days"),
    }
}

fn load_user(pool: &PgPool, user_id: u32) -> Result<Option<CurrentUser>, String> {
    let mut conn = get_pooled_database_connection(pool)?;
    let Some(user) = get_user_by_id(&mut conn, user_id)? else {
        return Ok(None);
    };
    if !user.is_active {
        return Ok(None);
    }
    let profile = get_profile(&mut conn, user_id)?;
    track_activity(&mut conn, &user);
    Ok(Some(CurrentUser { user, profile }))
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CurrentUser {
    type Error = String;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(pool) = request.rocket().state::<PgPool>() else {
            return refuse(request, Status::InternalServerError, "database is not configured");
        };
        let user_id = match parse_user_id(request.headers().get_one(USER_ID_HEADER)) {
            Ok(user_id) => user_id,
            Err(message) => return refuse(request, Status::Unauthorized, message),
        };

        match load_user(pool, user_id) {
            Ok(Some(current)) => Outcome::Success(current),
            Ok(None) => refuse(request, Status::Unauthorized, "unknown or inactive user"),
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to load user");
                refuse(request, Status::InternalServerError, "database error")
            }
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ApprovedUser {
    type Error = String;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let current = try_outcome!(request.guard::<CurrentUser>().await);
        if can_use_app(&current.user, current.profile.as_ref()) {
            Outcome::Success(ApprovedUser(current))
        } else {
            refuse(request, Status::Forbidden, "account is awaiting approval")
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminUser {
    type Error = String;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let current = try_outcome!(request.guard::<CurrentUser>().await);
        if current.user.role.is_admin() {
            Outcome::Success(AdminUser(current))
        } else {
            refuse(request, Status::Forbidden, "administrator role required")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn test_parse_user_id() {
        assert_eq!(parse_user_id(Some("42")), Ok(42));
        assert_eq!(parse_user_id(Some(" 7 ")), Ok(7));
        assert_eq!(parse_user_id(None), Err("missing X-User-Id header"));
        assert_eq!(parse_user_id(Some("0")), Err("malformed X-User-Id header"));
        assert_eq!(parse_user_id(Some("abc")), Err("malformed X-User-Id header"));
    }
}
