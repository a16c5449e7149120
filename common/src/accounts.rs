//! Registration, approval and role rules.

use crate::{
    ClassRoomDraft, ProfileRecord, ProfileUpdate, Registration, SubjectDraft, UserRecord,
    UserRole, ValidationError,
};
use chrono::{DateTime, NaiveTime, Utc};

const MIN_USERNAME_LEN: usize = 3;
const MAX_LESSON_MINUTES: u32 = 180;
const MAX_LESSONS_PER_DAY: u32 = 12;
const MAX_REMINDER_DAYS: u32 = 14;

fn looks_like_email(address: &str) -> bool {
    match address.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    }
}

pub fn validate_registration(registration: &Registration) -> Result<(), ValidationError> {
    if registration.username.trim().chars().count() < MIN_USERNAME_LEN {
        return Err(ValidationError::TooShort {
            field: "username",
            min: MIN_USERNAME_LEN,
        });
    }
    if !looks_like_email(registration.email.trim()) {
        return Err(ValidationError::MissingField("valid email"));
    }
    Ok(())
}

fn check_range(field: &'static str, value: u32, min: u32, max: u32) -> Result<(), ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field,
            value: f64::from(value),
            min: f64::from(min),
            max: f64::from(max),
        });
    }
    Ok(())
}

pub fn validate_profile_update(update: &ProfileUpdate) -> Result<(), ValidationError> {
    if update.class_label.trim().is_empty() {
        return Err(ValidationError::MissingField("class"));
    }
    let parent_email = update.parent_email.trim();
    if !parent_email.is_empty() && !looks_like_email(parent_email) {
        return Err(ValidationError::MissingField("valid parent email"));
    }
    check_range("lesson minutes", update.lesson_minutes, 1, MAX_LESSON_MINUTES)?;
    check_range("break minutes", update.break_minutes, 0, MAX_LESSON_MINUTES)?;
    check_range("lessons per day", update.lessons_per_day, 1, MAX_LESSONS_PER_DAY)?;
    check_range("reminder days", update.reminder_days_ahead, 0, MAX_REMINDER_DAYS)?;
    Ok(())
}

pub fn validate_subject(draft: &SubjectDraft) -> Result<(), ValidationError> {
    if draft.name.trim().is_empty() {
        return Err(ValidationError::MissingField("subject name"));
    }
    check_range("rating", u32::from(draft.rating), 1, 5)?;
    if let Some(color) = &draft.color {
        validate_colour(color)?;
    }
    Ok(())
}

/// Accepts `#rrggbb`.
pub fn validate_colour(color: &str) -> Result<(), ValidationError> {
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(ValidationError::MissingField("colour in #rrggbb form"));
    }
    Ok(())
}

pub fn validate_class_room(draft: &ClassRoomDraft) -> Result<(), ValidationError> {
    if draft.name.trim().is_empty() {
        return Err(ValidationError::MissingField("class name"));
    }
    Ok(())
}

/// Profile every new user starts with.
pub fn default_profile(user_id: u32, class_room_id: Option<u32>, now: DateTime<Utc>) -> ProfileRecord {
    ProfileRecord {
        user_id,
        class_label: String::new(),
        class_room_id,
        school: String::new(),
        parent_phone: String::new(),
        parent_email: String::new(),
        day_start: NaiveTime::from_hms_opt(crate::DEFAULT_DAY_START_HOUR, 0, 0)
            .unwrap_or(NaiveTime::MIN),
        lesson_minutes: crate::DEFAULT_LESSON_MINUTES,
        break_minutes: crate::DEFAULT_BREAK_MINUTES,
        lessons_per_day: crate::DEFAULT_LESSONS_PER_DAY,
        homework_reminders: true,
        grade_notifications: true,
        reminder_days_ahead: 1,
        approved: false,
        approved_at: None,
        approved_by: None,
        created_at: now,
        updated_at: now,
    }
}

/// Copy the editable fields into the profile.
/// Returns the previous class when the class assignment changed.
pub fn apply_profile_update(
    profile: &mut ProfileRecord,
    update: &ProfileUpdate,
    now: DateTime<Utc>,
) -> Option<Option<u32>> {
    let previous_class = profile.class_room_id;
    profile.class_label = update.class_label.trim().to_string();
    profile.class_room_id = update.class_room_id;
    profile.school = update.school.clone();
    profile.parent_phone = update.parent_phone.clone();
    profile.parent_email = update.parent_email.trim().to_string();
    profile.day_start = update.day_start;
    profile.lesson_minutes = update.lesson_minutes;
    profile.break_minutes = update.break_minutes;
    profile.lessons_per_day = update.lessons_per_day;
    profile.homework_reminders = update.homework_reminders;
    profile.grade_notifications = update.grade_notifications;
    profile.reminder_days_ahead = update.reminder_days_ahead;
    profile.updated_at = now;

    (previous_class != profile.class_room_id).then_some(previous_class)
}

/// Admins use everything. Students need an approved profile.
pub fn can_use_app(user: &UserRecord, profile: Option<&ProfileRecord>) -> bool {
    user.is_active && (user.role.is_admin() || profile.is_some_and(|p| p.approved))
}

pub fn approve(profile: &mut ProfileRecord, approver: u32, now: DateTime<Utc>) {
    profile.approved = true;
    profile.approved_at = Some(now);
    profile.approved_by = Some(approver);
    profile.updated_at = now;
}

pub fn revoke(profile: &mut ProfileRecord, now: DateTime<Utc>) {
    profile.approved = false;
    profile.approved_at = None;
    profile.approved_by = None;
    profile.updated_at = now;
}

/// Check a role change requested by `actor`.
/// `superadmins` is the number of active superadmins before the change.
pub fn check_role_change(
    actor: &UserRecord,
    target: &UserRecord,
    new_role: UserRole,
    superadmins: usize,
) -> Result<(), ValidationError> {
    if actor.role != UserRole::Superadmin {
        return Err(ValidationError::Forbidden("only a superadmin can change roles"));
    }
    if actor.user_id == target.user_id {
        return Err(ValidationError::Forbidden("you cannot change your own role"));
    }
    if target.role == UserRole::Superadmin && new_role != UserRole::Superadmin && superadmins <= 1
    {
        return Err(ValidationError::Forbidden("the last superadmin cannot be demoted"));
    }
    Ok(())
}

/// Deactivation follows the same protection as demotion.
pub fn check_deactivation(
    actor: &UserRecord,
    target: &UserRecord,
    superadmins: usize,
) -> Result<(), ValidationError> {
    if actor.user_id == target.user_id {
        return Err(ValidationError::Forbidden("you cannot deactivate yourself"));
    }
    if target.role == UserRole::Superadmin && actor.role != UserRole::Superadmin {
        return Err(ValidationError::Forbidden("only a superadmin can deactivate a superadmin"));
    }
    if target.role == UserRole::Superadmin && superadmins <= 1 {
        return Err(ValidationError::Forbidden("the last superadmin cannot be deactivated"));
    }
    Ok(())
}
