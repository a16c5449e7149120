//! Scheduled and administrative jobs for the school planner.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::too_many_lines)]

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use school_common::achievements::RETIRED_CODES;
use school_common::db_util::{
    self, PgConnection, get_due_reminders, get_homework_by_ids, get_profile, get_subject,
    mark_reminder_sent, purge_codes, record_reminder_delivery, upsert_catalog,
};
use school_common::email::Mailer;
use school_common::homework::reminder_message;
use school_common::notifications::{
    NotificationDraft, ParentEmail, homework_reminder, homework_reminder_email,
};
use school_common::{HomeworkRecord, HomeworkReminderRecord, ProfileRecord};
use std::collections::HashMap;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send every due homework reminder that has not been sent yet
    Reminders,

    /// Insert or refresh the achievement catalog
    SeedAchievements,

    /// Remove retired achievements and their unlocks
    PurgeAchievements,

    /// Send a test message through the configured mail provider
    SendTestEmail {
        /// Recipient address
        #[arg(long)]
        to: String,

        /// Subject line
        #[arg(long, default_value = "School planner test message")]
        subject: String,

        /// HTML body
        #[arg(
            long,
            default_value = "<p>If you can read this, parent emails are configured correctly.</p>"
        )]
        html: String,
    },
}

/// Counts reported at the end of a reminder run.
#[derive(Debug, Default, PartialEq, Eq)]
struct ReminderSummary {
    sent: usize,
    skipped: usize,
    emailed: usize,
    failed: usize,
}

/// What to do with a due reminder.
#[derive(Debug, PartialEq, Eq)]
enum ReminderAction<'a> {
    /// The homework is gone or done: mark the reminder sent without telling anyone.
    Skip,
    Deliver(&'a HomeworkRecord),
}

fn reminder_action<'a>(
    reminder: &HomeworkReminderRecord,
    homework: &'a HashMap<u32, HomeworkRecord>,
) -> ReminderAction<'a> {
    match homework.get(&reminder.homework_id) {
        Some(hw) if !hw.completed => ReminderAction::Deliver(hw),
        _ => ReminderAction::Skip,
    }
}

/// Everything a due reminder produces, built before anything is stored.
#[derive(Debug, PartialEq, Eq)]
struct ReminderDelivery {
    notification: NotificationDraft,
    email: Option<ParentEmail>,
}

fn plan_delivery(
    reminder: &HomeworkReminderRecord,
    homework: &HomeworkRecord,
    subject: &str,
    profile: Option<&ProfileRecord>,
) -> ReminderDelivery {
    let message = reminder_message(
        subject,
        &homework.title,
        homework.deadline,
        reminder.remind_on,
        &reminder.custom_message,
    );
    ReminderDelivery {
        email: profile.and_then(|p| homework_reminder_email(p, homework, subject, &message)),
        notification: homework_reminder(homework.homework_id, message),
    }
}

/// Stores the notification and marks the reminder sent atomically, then emails.
/// Returns whether an email went out.
fn deliver_reminder(
    conn: &mut PgConnection,
    mailer: &Mailer,
    reminder: &HomeworkReminderRecord,
    homework: &HomeworkRecord,
    now: DateTime<Utc>,
) -> Result<bool> {
    let subject = get_subject(conn, homework.user_id, homework.subject_id)
        .map_err(|e| anyhow!(e))?
        .map(|s| s.name)
        .unwrap_or_default();
    let profile = get_profile(conn, homework.user_id).map_err(|e| anyhow!(e))?;
    let delivery = plan_delivery(reminder, homework, &subject, profile.as_ref());

    record_reminder_delivery(
        conn,
        reminder.reminder_id,
        homework.user_id,
        &delivery.notification,
        now,
    )
    .map_err(|e| anyhow!(e))
    .context("storing reminder notification")?;

    let Some(email) = delivery.email else {
        return Ok(false);
    };
    match mailer.send(&email) {
        Ok(sent) => Ok(sent),
        Err(e) => {
            warn!(
                "Could not email reminder #{} for homework #{}: {e:#}",
                reminder.reminder_id, homework.homework_id
            );
            Ok(false)
        }
    }
}

fn send_reminders(conn: &mut PgConnection, mailer: &Mailer) -> Result<ReminderSummary> {
    let now = Utc::now();
    let due = get_due_reminders(conn, now.date_naive()).map_err(|e| anyhow!(e))?;
    info!("{} reminders are due.", due.len());

    let ids: Vec<u32> = due.iter().map(|r| r.homework_id).collect();
    let homework: HashMap<u32, HomeworkRecord> = get_homework_by_ids(conn, &ids)
        .map_err(|e| anyhow!(e))?
        .into_iter()
        .map(|hw| (hw.homework_id, hw))
        .collect();

    let mut summary = ReminderSummary::default();
    for reminder in &due {
        match reminder_action(reminder, &homework) {
            ReminderAction::Skip => {
                mark_reminder_sent(conn, reminder.reminder_id, now).map_err(|e| anyhow!(e))?;
                summary.skipped += 1;
            }
            ReminderAction::Deliver(hw) => match deliver_reminder(conn, mailer, reminder, hw, now) {
                Ok(emailed) => {
                    summary.sent += 1;
                    summary.emailed += usize::from(emailed);
                }
                Err(e) => {
                    error!("Reminder #{} failed: {e:#}", reminder.reminder_id);
                    summary.failed += 1;
                }
            },
        }
    }
    Ok(summary)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Reminders => {
            let mut conn = db_util::get_database_connection().map_err(|e| anyhow!(e))?;
            let mailer = Mailer::from_env()?;
            if !mailer.is_enabled() {
                warn!("SENDGRID_API_KEY is not set, reminders will only be stored in-app.");
            }
            let summary = send_reminders(&mut conn, &mailer)?;
            info!(
                "Reminders done: {} sent, {} emailed, {} skipped, {} failed.",
                summary.sent, summary.emailed, summary.skipped, summary.failed
            );
        }
        Command::SeedAchievements => {
            let mut conn = db_util::get_database_connection().map_err(|e| anyhow!(e))?;
            let (created, updated) = upsert_catalog(&mut conn).map_err(|e| anyhow!(e))?;
            info!("Achievement catalog seeded: {created} created, {updated} updated.");
        }
        Command::PurgeAchievements => {
            let mut conn = db_util::get_database_connection().map_err(|e| anyhow!(e))?;
            let (links, removed) = purge_codes(&mut conn, &RETIRED_CODES).map_err(|e| anyhow!(e))?;
            info!("Removed {removed} retired achievements and {links} unlocks.");
        }
        Command::SendTestEmail { to, subject, html } => {
            let mailer = Mailer::from_env()?;
            let sent = mailer
                .send(&ParentEmail { to, subject, html })
                .context("sending test email")?;
            if sent {
                info!("Test email sent.");
            } else {
                warn!("Mail is disabled, nothing was sent.");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use school_common::HomeworkDraft;
    use school_common::accounts::default_profile;
    use school_common::homework::{complete, new_record};

    fn homework(id: u32) -> HomeworkRecord {
        let deadline = NaiveDate::from_ymd_opt(2025, 10, 10).unwrap();
        let draft = HomeworkDraft {
            subject_id: 1,
            title: "Essay".to_string(),
            description: String::new(),
            pages: String::new(),
            exercises: String::new(),
            assigned_on: None,
            deadline,
            priority: Default::default(),
            difficulty: Default::default(),
            estimated_minutes: None,
            share_with_class: false,
            shared_class_room_id: None,
            reminder_enabled: true,
            reminder_days: 1,
            personal_notes: String::new(),
        };
        HomeworkRecord {
            homework_id: id,
            ..new_record(3, &draft, deadline)
        }
    }

    fn reminder(homework_id: u32) -> HomeworkReminderRecord {
        HomeworkReminderRecord {
            reminder_id: 1,
            homework_id,
            remind_on: NaiveDate::from_ymd_opt(2025, 10, 9).unwrap(),
            remind_at: chrono::NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            sent: false,
            sent_at: None,
            custom_message: String::new(),
        }
    }

    #[test_log::test]
    fn test_reminder_action() {
        let mut done = homework(2);
        complete(&mut done, Utc::now());
        let homework = HashMap::from([(1, homework(1)), (2, done)]);

        assert!(matches!(
            reminder_action(&reminder(1), &homework),
            ReminderAction::Deliver(hw) if hw.homework_id == 1
        ));
        assert_eq!(reminder_action(&reminder(2), &homework), ReminderAction::Skip);
        assert_eq!(reminder_action(&reminder(9), &homework), ReminderAction::Skip);
    }

    #[test_log::test]
    fn test_plan_delivery_builds_notification_and_email() {
        let hw = homework(1);
        let mut profile = default_profile(3, None, Utc::now());
        profile.parent_email = "parent@example.ro".to_string();
        profile.homework_reminders = true;

        let delivery = plan_delivery(&reminder(1), &hw, "Romanian", Some(&profile));
        assert_eq!(delivery.notification.link_url, "/homework/1");
        assert!(delivery.notification.message.contains("Essay"));
        let email = delivery.email.unwrap();
        assert_eq!(email.to, "parent@example.ro");
        assert_eq!(email.subject, "Homework reminder: Romanian");

        profile.homework_reminders = false;
        let delivery = plan_delivery(&reminder(1), &hw, "Romanian", Some(&profile));
        assert_eq!(delivery.email, None);
        assert_eq!(plan_delivery(&reminder(1), &hw, "Romanian", None).email, None);
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["school_jobs", "send-test-email", "--to", "a@b.ro"]).unwrap();
        assert!(matches!(cli.command, Command::SendTestEmail { ref to, .. } if to == "a@b.ro"));
        let cli = Cli::try_parse_from(["school_jobs", "purge-achievements"]).unwrap();
        assert!(matches!(cli.command, Command::PurgeAchievements));
    }
}
