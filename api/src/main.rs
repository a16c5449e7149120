//! A json api for students tracking subjects, schedules, homework and grades.

#[macro_use]
extern crate rocket;

mod account;
mod admin;
mod auth;
mod dashboard;
mod effects;
mod grades;
mod helpers;
mod homework;
mod mail_queue;
mod notifications;
mod schedule;
mod subjects;

use auth::GuardFailure;
use helpers::*;
use mail_queue::MailQueue;
use rocket::http::Status;
use rocket::request::Request;
use rocket::serde::json::Json;
use school_common::config::MailSettings;
use school_common::db_util::get_database_pool;
use tracing_subscriber::EnvFilter;

/// Message left by a refusing guard, or a generic one.
fn failure_message(request: &Request<'_>, fallback: &str) -> String {
    request
        .local_cache(GuardFailure::default)
        .0
        .clone()
        .unwrap_or_else(|| fallback.to_string())
}

#[catch(400)]
fn bad_request(request: &Request) -> Json<ApiErrorBody> {
    catcher_body(Status::BadRequest, failure_message(request, "malformed request"))
}

#[catch(401)]
fn unauthorized(request: &Request) -> Json<ApiErrorBody> {
    catcher_body(Status::Unauthorized, failure_message(request, "unknown user"))
}

#[catch(403)]
fn forbidden(request: &Request) -> Json<ApiErrorBody> {
    catcher_body(Status::Forbidden, failure_message(request, "access denied"))
}

#[catch(404)]
fn not_found(request: &Request) -> Json<ApiErrorBody> {
    catcher_body(
        Status::NotFound,
        failure_message(request, "the requested resource could not be found"),
    )
}

#[catch(409)]
fn conflict(request: &Request) -> Json<ApiErrorBody> {
    catcher_body(Status::Conflict, failure_message(request, "conflict"))
}

#[catch(422)]
fn unprocessable_entity(request: &Request) -> Json<ApiErrorBody> {
    catcher_body(
        Status::UnprocessableEntity,
        failure_message(request, "the request body could not be understood"),
    )
}

#[catch(500)]
fn internal(request: &Request) -> Json<ApiErrorBody> {
    catcher_body(
        Status::InternalServerError,
        failure_message(request, "internal server error"),
    )
}

#[launch]
fn rocket() -> _ {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let pool = match get_database_pool() {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build the database pool");
            std::process::exit(1);
        }
    };
    let mail = MailQueue::start(MailSettings::from_env());

    rocket::build()
        .manage(pool)
        .manage(mail)
        .attach(RequestTimingFairing)
        .attach(CorsFairing)
        .mount(
            "/",
            routes![
                account::register,
                account::get_own_profile,
                account::put_profile,
                dashboard::dashboard,
                dashboard::calendar,
                dashboard::quick_stats,
                notifications::list_notifications,
                notifications::read_notification,
                notifications::unread_notifications,
                notifications::list_achievements,
                subjects::list_subjects,
                subjects::create_subject,
                subjects::get_one_subject,
                subjects::put_subject,
                subjects::remove_subject,
                subjects::rate_subject,
                subjects::subject_detail,
                schedule::get_week,
                schedule::get_today,
                schedule::create_entry,
                schedule::put_entry,
                schedule::remove_entry,
                schedule::list_changes,
                schedule::create_change,
                schedule::remove_change,
                homework::list_homework,
                homework::create_homework,
                homework::get_one_homework,
                homework::put_homework,
                homework::remove_homework,
                homework::toggle_homework,
                homework::homework_progress,
                homework::homework_time,
                grades::list_grades,
                grades::create_grade,
                grades::get_one_grade,
                grades::put_grade,
                grades::remove_grade,
                grades::excuse_grade,
                grades::grade_stats,
                grades::grade_calendar,
                grades::subject_grades,
                grades::list_semesters,
                grades::create_semester,
                grades::put_semester,
                grades::remove_semester,
                grades::activate,
                grades::list_goals,
                grades::create_goal,
                grades::put_goal,
                grades::remove_goal,
                admin::pending_accounts,
                admin::approve_account,
                admin::revoke_account,
                admin::deactivate_account,
                admin::change_role,
                admin::list_classes,
                admin::create_class,
                admin::put_class,
                admin::remove_class,
                admin::class_schedule,
                admin::create_class_entry,
                admin::put_class_entry,
                admin::remove_class_entry,
                admin::import_class_schedule,
            ],
        )
        .register(
            "/",
            catchers![
                bad_request,
                unauthorized,
                forbidden,
                not_found,
                conflict,
                unprocessable_entity,
                internal
            ],
        )
}
