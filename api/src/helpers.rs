//! Error bodies, fairings and small helpers shared by the route modules.

use crate::auth::USER_ID_HEADER;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Header;
use rocket::http::Status;
use rocket::request::Request;
use rocket::response::Response;
use rocket::response::status as rocket_status;
use rocket::serde::json::Json;
use rocket::serde::{Deserialize, Serialize};
use school_common::ValidationError;
use school_common::db_util::{PgPool, PgPooledConnection, get_pooled_database_connection};
use std::time::Instant;

/// Logs every request with its caller and duration. Server errors are logged as warnings.
#[derive(Clone, Copy)]
pub struct RequestTimingFairing;

#[rocket::async_trait]
impl Fairing for RequestTimingFairing {
    fn info(&self) -> Info {
        Info {
            name: "Request timing",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _data: &mut rocket::Data<'_>) {
        request.local_cache(Instant::now);
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let elapsed_ms = request.local_cache(Instant::now).elapsed().as_millis();
        let status = response.status().code;
        let user = request.headers().get_one(USER_ID_HEADER).unwrap_or("-");

        if status >= 500 {
            tracing::warn!(method = %request.method(), path = %request.uri(), user, status, elapsed_ms, "Request failed");
        } else {
            tracing::info!(method = %request.method(), path = %request.uri(), user, status, elapsed_ms, "Request completed");
        }
    }
}

/// Cross-origin headers for the browser front end: the methods the routes
/// use and the two request headers they read.
pub const CORS_HEADERS: [(&str, &str); 3] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE"),
    ("Access-Control-Allow-Headers", "Content-Type, X-User-Id"),
];

#[derive(Clone, Copy)]
pub struct CorsFairing;

#[rocket::async_trait]
impl Fairing for CorsFairing {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, _request: &'r Request<'_>, response: &mut Response<'r>) {
        for (name, value) in CORS_HEADERS {
            response.set_header(Header::new(name, value));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "rocket::serde")]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    NotFound,
    BadRequest,
    Unauthorized,
    Forbidden,
    Conflict,
    UnprocessableEntity,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct ApiErrorBody {
    error: ApiErrorKind,
    message: String,
}

impl ApiErrorBody {
    pub fn new(error: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
        }
    }
}

pub type ApiError = rocket_status::Custom<Json<ApiErrorBody>>;
pub type ApiResult<T> = Result<Json<T>, ApiError>;

fn api_error(status: Status, kind: ApiErrorKind, message: impl Into<String>) -> ApiError {
    rocket_status::Custom(status, Json(ApiErrorBody::new(kind, message)))
}

pub fn not_found_error(message: impl Into<String>) -> ApiError {
    api_error(Status::NotFound, ApiErrorKind::NotFound, message)
}

pub fn bad_request_error(message: impl Into<String>) -> ApiError {
    api_error(Status::BadRequest, ApiErrorKind::BadRequest, message)
}

pub fn forbidden_error(message: impl Into<String>) -> ApiError {
    api_error(Status::Forbidden, ApiErrorKind::Forbidden, message)
}

pub fn conflict_error(message: impl Into<String>) -> ApiError {
    api_error(Status::Conflict, ApiErrorKind::Conflict, message)
}

pub fn unprocessable_entity_error(message: impl Into<String>) -> ApiError {
    api_error(
        Status::UnprocessableEntity,
        ApiErrorKind::UnprocessableEntity,
        message,
    )
}

pub fn internal_error(message: impl Into<String>) -> ApiError {
    api_error(Status::InternalServerError, ApiErrorKind::Internal, message)
}

/// Body used by the catchers for errors raised outside a handler.
pub fn catcher_body(status: Status, message: impl Into<String>) -> Json<ApiErrorBody> {
    let kind = match status.code {
        400 => ApiErrorKind::BadRequest,
        401 => ApiErrorKind::Unauthorized,
        403 => ApiErrorKind::Forbidden,
        404 => ApiErrorKind::NotFound,
        409 => ApiErrorKind::Conflict,
        422 => ApiErrorKind::UnprocessableEntity,
        _ => ApiErrorKind::Internal,
    };
    Json(ApiErrorBody::new(kind, message))
}

/// Database failures are logged in full and reported without detail.
pub fn db_error(error: String) -> ApiError {
    tracing::error!(error = %error, "Database error");
    internal_error("database error")
}

pub fn validation_error(error: ValidationError) -> ApiError {
    if error.is_conflict() {
        conflict_error(error.to_string())
    } else if error.is_forbidden() {
        forbidden_error(error.to_string())
    } else {
        unprocessable_entity_error(error.to_string())
    }
}

pub fn connect(pool: &PgPool) -> Result<PgPooledConnection, ApiError> {
    get_pooled_database_connection(pool).map_err(db_error)
}

/// Unwrap a lookup, turning a missing row into a 404.
pub fn found<T>(row: Result<Option<T>, String>, what: &str) -> Result<T, ApiError> {
    row.map_err(db_error)?
        .ok_or_else(|| not_found_error(format!("{what} not found")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn test_validation_error_status() {
        let taken = ValidationError::SlotTaken {
            day: "Monday",
            slot: 1,
            subject: "Math".to_string(),
        };
        assert_eq!(validation_error(taken).0, Status::Conflict);
        assert_eq!(
            validation_error(ValidationError::Forbidden("no")).0,
            Status::Forbidden
        );
        assert_eq!(
            validation_error(ValidationError::InvalidSlot).0,
            Status::UnprocessableEntity
        );
    }

    #[test_log::test]
    fn test_cors_allows_identity_header() {
        let allowed = CORS_HEADERS
            .iter()
            .find(|(name, _)| *name == "Access-Control-Allow-Headers")
            .map(|(_, value)| *value)
            .unwrap();
        assert!(allowed.split(", ").any(|h| h == USER_ID_HEADER));
        assert!(allowed.split(", ").any(|h| h == "Content-Type"));
    }

    #[test_log::test]
    fn test_found() {
        assert_eq!(found(Ok(Some(3)), "thing").ok(), Some(3));
        let missing = found::<u32>(Ok(None), "subject").unwrap_err();
        assert_eq!(missing.0, Status::NotFound);
        assert_eq!(missing.1.message, "subject not found");
        assert_eq!(
            found::<u32>(Err("boom".to_string()), "x").unwrap_err().0,
            Status::InternalServerError
        );
    }

    #[test_log::test]
    fn test_catcher_body_kind() {
        assert_eq!(
            catcher_body(Status::Unauthorized, "who?").error,
            ApiErrorKind::Unauthorized
        );
        assert_eq!(
            catcher_body(Status::BadGateway, "x").error,
            ApiErrorKind::Internal
        );
    }
}
