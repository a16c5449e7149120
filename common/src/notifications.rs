//! In-app notification texts and parent emails.

use crate::{
    ChangeKind, GradeKind, GradeRecord, HomeworkRecord, NotificationKind, ProfileRecord,
    UserRecord,
};
use serde::{Deserialize, Serialize};

/// A notification about to be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDraft {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub link_url: String,
}

impl NotificationDraft {
    fn new(kind: NotificationKind, title: &str, message: String, link_url: String) -> Self {
        NotificationDraft {
            kind,
            title: title.to_string(),
            message,
            link_url,
        }
    }
}

/// Reaction to a freshly recorded grade row, if any.
pub fn grade_notification(grade: &GradeRecord, subject: &str) -> Option<NotificationDraft> {
    let link = format!("/grades/{}", grade.grade_id);
    match (grade.kind, grade.value) {
        (GradeKind::Mark, Some(value)) if value >= 9.0 => Some(NotificationDraft::new(
            NotificationKind::Grade,
            "Excellent grade!",
            format!("Congratulations! You got {value} in {subject}!"),
            link,
        )),
        (GradeKind::Mark, Some(value)) if value < 5.0 => Some(NotificationDraft::new(
            NotificationKind::Grade,
            "Low grade warning",
            format!("You got {value} in {subject}. Time to work a bit more!"),
            link,
        )),
        (GradeKind::Absence, _) => Some(NotificationDraft::new(
            NotificationKind::Absence,
            "New absence",
            format!("An absence in {subject} was recorded on {}.", grade.date),
            link,
        )),
        _ => None,
    }
}

pub fn homework_completed(homework: &HomeworkRecord, subject: &str) -> NotificationDraft {
    NotificationDraft::new(
        NotificationKind::Homework,
        "Homework completed!",
        format!("You completed \"{}\" for {subject}.", homework.title),
        format!("/homework/{}", homework.homework_id),
    )
}

pub fn homework_reminder(homework_id: u32, message: String) -> NotificationDraft {
    NotificationDraft::new(
        NotificationKind::Reminder,
        "Homework reminder",
        message,
        format!("/homework/{homework_id}"),
    )
}

pub fn achievement_unlocked(name: &str) -> NotificationDraft {
    NotificationDraft::new(
        NotificationKind::System,
        "Achievement unlocked!",
        name.to_string(),
        "/achievements".to_string(),
    )
}

pub fn schedule_change_added(kind: ChangeKind, subject: &str) -> NotificationDraft {
    NotificationDraft::new(
        NotificationKind::System,
        "Schedule change",
        format!("A change was added: {} for {subject}", kind.as_str().replace('_', " ")),
        "/schedule/changes".to_string(),
    )
}

pub fn account_approved() -> NotificationDraft {
    NotificationDraft::new(
        NotificationKind::System,
        "Account approved",
        "Your account was approved. You now have access to every feature.".to_string(),
        "/dashboard".to_string(),
    )
}

/// Sent to administrators when a new student registers.
pub fn account_pending(user: &UserRecord) -> NotificationDraft {
    NotificationDraft::new(
        NotificationKind::System,
        "New account awaiting approval",
        format!("{} ({}) registered and waits for approval.", user.full_name(), user.email),
        "/admin/users/pending".to_string(),
    )
}

/// An email ready for the outbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn email_body(intro: &str, items: &[(&str, String)]) -> String {
    let list: String = items
        .iter()
        .map(|(label, value)| format!("<li>{label}: {}</li>", escape_html(value)))
        .collect();
    format!("<p>Hello,</p><p>{intro}</p><ul>{list}</ul>")
}

fn parent_address(profile: &ProfileRecord) -> Option<String> {
    let address = profile.parent_email.trim();
    (!address.is_empty()).then(|| address.to_string())
}

fn homework_email(profile: &ProfileRecord) -> Option<String> {
    profile
        .homework_reminders
        .then(|| parent_address(profile))
        .flatten()
}

pub fn new_homework_email(
    profile: &ProfileRecord,
    homework: &HomeworkRecord,
    subject: &str,
) -> Option<ParentEmail> {
    let to = homework_email(profile)?;
    Some(ParentEmail {
        to,
        subject: format!("New homework for {subject}"),
        html: email_body(
            "A new homework was added:",
            &[
                ("Subject", subject.to_string()),
                ("Title", homework.title.clone()),
                ("Deadline", homework.deadline.to_string()),
                ("Priority", homework.priority.to_string()),
            ],
        ),
    })
}

pub fn homework_completed_email(
    profile: &ProfileRecord,
    homework: &HomeworkRecord,
    subject: &str,
) -> Option<ParentEmail> {
    let to = homework_email(profile)?;
    Some(ParentEmail {
        to,
        subject: format!("Homework completed: {subject}"),
        html: email_body(
            "A homework was marked as completed:",
            &[
                ("Subject", subject.to_string()),
                ("Title", homework.title.clone()),
                ("Deadline", homework.deadline.to_string()),
                ("Progress", format!("{}%", homework.progress)),
            ],
        ),
    })
}

pub fn homework_reminder_email(
    profile: &ProfileRecord,
    homework: &HomeworkRecord,
    subject: &str,
    message: &str,
) -> Option<ParentEmail> {
    let to = homework_email(profile)?;
    Some(ParentEmail {
        to,
        subject: format!("Homework reminder: {subject}"),
        html: email_body(
            &escape_html(message),
            &[
                ("Title", homework.title.clone()),
                ("Deadline", homework.deadline.to_string()),
                ("Progress", format!("{}%", homework.progress)),
            ],
        ),
    })
}

/// Email for a new mark or absence. Lates are not reported.
pub fn grade_email(
    profile: &ProfileRecord,
    student: &UserRecord,
    grade: &GradeRecord,
    subject: &str,
) -> Option<ParentEmail> {
    if !profile.grade_notifications {
        return None;
    }
    let to = parent_address(profile)?;
    let name = student.full_name();
    let (title, intro, mut items) = match (grade.kind, grade.value) {
        (GradeKind::Mark, Some(value)) => (
            format!("New mark in {subject}"),
            format!("{name} received a new mark:"),
            vec![("Mark", format!("{value:.2}"))],
        ),
        (GradeKind::Absence | GradeKind::ExcusedAbsence, _) => (
            format!("New absence in {subject}"),
            format!("{name} was marked absent:"),
            vec![(
                "Excused",
                if grade.excused { "yes" } else { "no" }.to_string(),
            )],
        ),
        _ => return None,
    };
    items.push(("Subject", subject.to_string()));
    items.push(("Date", grade.date.to_string()));
    if !grade.description.is_empty() {
        items.push(("Description", grade.description.clone()));
    }
    Some(ParentEmail {
        to,
        subject: title,
        html: email_body(&escape_html(&intro), &items),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::homework::new_record;
    use crate::{Difficulty, HomeworkDraft, Priority, UserRole};
    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};

    fn profile(parent_email: &str) -> ProfileRecord {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        ProfileRecord {
            user_id: 1,
            class_label: "10A".to_string(),
            class_room_id: None,
            school: String::new(),
            parent_phone: String::new(),
            parent_email: parent_email.to_string(),
            day_start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            lesson_minutes: 50,
            break_minutes: 10,
            lessons_per_day: 7,
            homework_reminders: true,
            grade_notifications: true,
            reminder_days_ahead: 1,
            approved: true,
            approved_at: Some(now),
            approved_by: Some(2),
            created_at: now,
            updated_at: now,
        }
    }

    fn student() -> UserRecord {
        UserRecord {
            user_id: 1,
            username: "ana".to_string(),
            email: "ana@example.com".to_string(),
            first_name: "Ana".to_string(),
            last_name: "Pop".to_string(),
            role: UserRole::Student,
            is_active: true,
            created_at: Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap(),
        }
    }

    fn grade(kind: GradeKind, value: Option<f64>) -> GradeRecord {
        GradeRecord {
            grade_id: 12,
            user_id: 1,
            subject_id: 1,
            kind,
            value,
            assessment: None,
            description: String::new(),
            date: NaiveDate::from_ymd_opt(2025, 3, 4).unwrap(),
            semester: 2,
            excused: false,
            excused_on: None,
            notes: String::new(),
            important: false,
            created_at: Utc.with_ymd_and_hms(2025, 3, 4, 8, 0, 0).unwrap(),
        }
    }

    fn homework() -> HomeworkRecord {
        let draft = HomeworkDraft {
            subject_id: 1,
            title: "Essay <draft>".to_string(),
            description: String::new(),
            pages: String::new(),
            exercises: String::new(),
            assigned_on: None,
            deadline: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            priority: Priority::High,
            difficulty: Difficulty::Hard,
            estimated_minutes: None,
            share_with_class: false,
            shared_class_room_id: None,
            reminder_enabled: true,
            reminder_days: 1,
            personal_notes: String::new(),
        };
        new_record(1, &draft, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap())
    }

    #[test_log::test]
    fn test_grade_notifications() {
        let high = grade_notification(&grade(GradeKind::Mark, Some(9.5)), "Math").unwrap();
        assert_eq!(high.title, "Excellent grade!");
        assert_eq!(high.kind, NotificationKind::Grade);
        assert_eq!(high.link_url, "/grades/12");

        let low = grade_notification(&grade(GradeKind::Mark, Some(4.0)), "Math").unwrap();
        assert_eq!(low.title, "Low grade warning");

        assert!(grade_notification(&grade(GradeKind::Mark, Some(7.0)), "Math").is_none());
        assert_eq!(
            grade_notification(&grade(GradeKind::Absence, None), "Math")
                .unwrap()
                .kind,
            NotificationKind::Absence
        );
        assert!(grade_notification(&grade(GradeKind::Late, None), "Math").is_none());
    }

    #[test_log::test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#x27;Jerry&#x27;&lt;/b&gt;"
        );
    }

    #[test_log::test]
    fn test_homework_emails_need_parent_and_flag() {
        let hw = homework();
        let email = new_homework_email(&profile("mom@example.com"), &hw, "Romanian").unwrap();
        assert_eq!(email.to, "mom@example.com");
        assert_eq!(email.subject, "New homework for Romanian");
        assert!(email.html.contains("Essay &lt;draft&gt;"));
        assert!(email.html.contains("2025-03-10"));

        assert!(new_homework_email(&profile("  "), &hw, "Romanian").is_none());

        let mut quiet = profile("mom@example.com");
        quiet.homework_reminders = false;
        assert!(homework_completed_email(&quiet, &hw, "Romanian").is_none());
        assert!(
            homework_reminder_email(&quiet, &hw, "Romanian", "Due tomorrow").is_none()
        );
    }

    #[test_log::test]
    fn test_grade_email() {
        let parent = profile("dad@example.com");
        let email = grade_email(&parent, &student(), &grade(GradeKind::Mark, Some(8.5)), "Physics")
            .unwrap();
        assert_eq!(email.subject, "New mark in Physics");
        assert!(email.html.contains("Ana Pop received a new mark"));
        assert!(email.html.contains("8.50"));

        let absence =
            grade_email(&parent, &student(), &grade(GradeKind::Absence, None), "Physics").unwrap();
        assert_eq!(absence.subject, "New absence in Physics");
        assert!(absence.html.contains("Excused: no"));

        assert!(grade_email(&parent, &student(), &grade(GradeKind::Late, None), "Physics").is_none());

        let mut quiet = parent.clone();
        quiet.grade_notifications = false;
        assert!(
            grade_email(&quiet, &student(), &grade(GradeKind::Mark, Some(8.5)), "Physics")
                .is_none()
        );
    }

    #[test_log::test]
    fn test_system_notifications() {
        assert_eq!(achievement_unlocked("First 10").message, "First 10");
        let change = schedule_change_added(ChangeKind::RoomChanged, "Biology");
        assert_eq!(change.message, "A change was added: room changed for Biology");
        assert!(account_pending(&student()).message.contains("Ana Pop (ana@example.com)"));
    }
}
