//! Side effects that follow a save: notifications, parent emails, reminders,
//! goals and achievements.
//!
//! None of these may fail the request that triggered them. Problems are
//! logged and the request carries on.

use crate::mail_queue::MailQueue;
use chrono::{DateTime, NaiveTime, Utc};
use school_common::achievements::{
    GradeFacts, HomeworkFacts, Unlock, evaluate_grade_rules, evaluate_homework_rules,
};
use school_common::db_util::{
    GradeFilter, HomeworkFilter, PgConnection, get_goals_for_user, get_grades_for_user,
    get_homework_for_user, get_semesters_for_user, get_subject, insert_notification,
    insert_reminder, unlock_achievement, update_goal,
};
use school_common::grade_stats::{goal_reached, goal_stats};
use school_common::homework::reminder_date;
use school_common::notifications::{self, NotificationDraft};
use school_common::{
    AchievementRecord, DEFAULT_REMINDER_HOUR, GradeRecord, HomeworkRecord, ProfileRecord,
    UserRecord,
};
use std::collections::HashMap;

fn log_failure<T>(result: Result<T, String>, what: &str, user_id: u32) -> Option<T> {
    result
        .map_err(|e| tracing::warn!(user_id, error = %e, "Failed to {what}"))
        .ok()
}

pub fn notify(conn: &mut PgConnection, user_id: u32, draft: &NotificationDraft) {
    log_failure(
        insert_notification(conn, user_id, draft),
        "store notification",
        user_id,
    );
}

/// Name of the user's subject, empty when it cannot be loaded.
pub fn subject_name(conn: &mut PgConnection, user_id: u32, subject_id: u32) -> String {
    log_failure(get_subject(conn, user_id, subject_id), "load subject", user_id)
        .flatten()
        .map(|s| s.name)
        .unwrap_or_default()
}

/// Persist rule hits. Every fresh unlock gets a notification.
pub fn unlock_all(
    conn: &mut PgConnection,
    user_id: u32,
    unlocks: &[Unlock],
    now: DateTime<Utc>,
) -> Vec<AchievementRecord> {
    let mut fresh = Vec::new();
    for hit in unlocks {
        let unlocked = log_failure(
            unlock_achievement(conn, user_id, hit, now),
            "unlock achievement",
            user_id,
        )
        .flatten();
        if let Some(achievement) = unlocked {
            tracing::info!(user_id, code = %achievement.code, "Achievement unlocked");
            notify(
                conn,
                user_id,
                &notifications::achievement_unlocked(&achievement.name),
            );
            fresh.push(achievement);
        }
    }
    fresh
}

/// Mark the subject's goals reached once the mean of their semester gets there.
fn refresh_goals(conn: &mut PgConnection, user_id: u32, subject_id: u32, grades: &[GradeRecord]) {
    let Some(goals) = log_failure(get_goals_for_user(conn, user_id), "load goals", user_id) else {
        return;
    };
    let Some(semesters) = log_failure(
        get_semesters_for_user(conn, user_id),
        "load semesters",
        user_id,
    ) else {
        return;
    };
    let numbers: HashMap<u32, u8> = semesters
        .into_iter()
        .map(|s| (s.semester_id, s.number))
        .collect();
    let today = Utc::now().date_naive();
    for mut goal in goals.into_iter().filter(|g| g.subject_id == subject_id) {
        let stats = goal_stats(&goal, numbers.get(&goal.semester_id).copied(), grades);
        let reached = goal_reached(&goal, stats.mean);
        if reached == goal.reached {
            continue;
        }
        goal.reached = reached;
        goal.reached_on = reached.then_some(today);
        log_failure(update_goal(conn, &goal), "update goal", user_id);
    }
}

/// Everything that follows storing or editing a grade.
pub fn after_grade_saved(
    conn: &mut PgConnection,
    mail: &MailQueue,
    user: &UserRecord,
    profile: Option<&ProfileRecord>,
    grade: &GradeRecord,
    created: bool,
) -> Vec<AchievementRecord> {
    let now = Utc::now();
    let user_id = user.user_id;

    if created {
        let subject = subject_name(conn, user_id, grade.subject_id);
        if let Some(draft) = notifications::grade_notification(grade, &subject) {
            notify(conn, user_id, &draft);
        }
        if let Some(email) =
            profile.and_then(|p| notifications::grade_email(p, user, grade, &subject))
        {
            mail.enqueue(email);
        }
    }

    let Some(grades) = log_failure(
        get_grades_for_user(conn, user_id, &GradeFilter::default()),
        "load grades",
        user_id,
    ) else {
        return Vec::new();
    };

    refresh_goals(conn, user_id, grade.subject_id, &grades);

    let facts = GradeFacts::collect(&grades, grade, now.date_naive());
    unlock_all(conn, user_id, &evaluate_grade_rules(&facts), now)
}

/// Everything that follows storing or editing a homework.
/// `was_completed` is the completion state before the save.
pub fn after_homework_saved(
    conn: &mut PgConnection,
    mail: &MailQueue,
    user_id: u32,
    profile: Option<&ProfileRecord>,
    homework: &HomeworkRecord,
    was_completed: bool,
    created: bool,
) -> Vec<AchievementRecord> {
    let now = Utc::now();
    let today = now.date_naive();
    let subject = subject_name(conn, user_id, homework.subject_id);

    if homework.reminder_enabled && !homework.completed {
        if let Some(remind_on) = reminder_date(homework.deadline, homework.reminder_days, today) {
            let remind_at = NaiveTime::from_hms_opt(DEFAULT_REMINDER_HOUR, 0, 0)
                .unwrap_or(NaiveTime::MIN);
            log_failure(
                insert_reminder(conn, homework.homework_id, remind_on, remind_at),
                "schedule reminder",
                user_id,
            );
        }
    }

    if created {
        if let Some(email) =
            profile.and_then(|p| notifications::new_homework_email(p, homework, &subject))
        {
            mail.enqueue(email);
        }
    }
    if homework.completed && !was_completed {
        notify(
            conn,
            user_id,
            &notifications::homework_completed(homework, &subject),
        );
        if let Some(email) =
            profile.and_then(|p| notifications::homework_completed_email(p, homework, &subject))
        {
            mail.enqueue(email);
        }
    }

    let Some(all) = log_failure(
        get_homework_for_user(conn, user_id, &HomeworkFilter::default()),
        "load homework",
        user_id,
    ) else {
        return Vec::new();
    };
    let facts = HomeworkFacts::collect(&all, homework, was_completed, today);
    unlock_all(conn, user_id, &evaluate_homework_rules(&facts), now)
}
