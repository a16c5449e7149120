//! Domain types and rules for the school planner.

pub mod accounts;
pub mod achievements;
pub mod config;
#[cfg(feature = "database")]
pub mod db_util;
#[cfg(feature = "network")]
pub mod email;
pub mod error;
pub mod grade_stats;
pub mod homework;
pub mod notifications;
pub mod propagation;
pub mod schedule;

pub use error::ValidationError;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_SUBJECT_COLOR: &str = "#007bff";
pub const DEFAULT_DAY_START_HOUR: u32 = 8;
pub const DEFAULT_LESSON_MINUTES: u32 = 50;
pub const DEFAULT_BREAK_MINUTES: u32 = 10;
pub const DEFAULT_LESSONS_PER_DAY: u32 = 7;
pub const DEFAULT_REMINDER_HOUR: u32 = 18;
pub const DEFAULT_SUBJECT_RATING: u8 = 3;
/// Weeks in a semester, used to estimate how many lessons a subject has.
pub const SEMESTER_WEEKS: usize = 18;
pub const URGENT_HOMEWORK_DAYS: i64 = 3;
pub const RECENT_ACTIVITY_DAYS: i64 = 7;
pub const CALENDAR_HORIZON_DAYS: i64 = 30;
pub const MIN_GRADE: f64 = 1.0;
pub const MAX_GRADE: f64 = 10.0;

/// Declares a string-backed enum stored as varchar and sent as snake_case JSON.
macro_rules! labelled_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok($name::$variant),)+
                    other => Err(format!(
                        "unknown {} value: {}",
                        stringify!($name),
                        other
                    )),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

labelled_enum!(
    /// Account role. Admins manage classes and approvals, superadmins also manage roles.
    UserRole {
        Student => "student",
        Admin => "admin",
        Superadmin => "superadmin",
    }
);

labelled_enum!(
    #[derive(Default)]
    LessonKind {
        #[default]
        Normal => "normal",
        Homeroom => "homeroom",
        Optional => "optional",
        Makeup => "makeup",
    }
);

labelled_enum!(
    /// Temporary deviation from the weekly schedule.
    ChangeKind {
        Cancelled => "cancelled",
        Moved => "moved",
        Replaced => "replaced",
        RoomChanged => "room_changed",
        SubstituteTeacher => "substitute_teacher",
    }
);

labelled_enum!(
    #[derive(Default)]
    Priority {
        Low => "low",
        #[default]
        Normal => "normal",
        High => "high",
        Urgent => "urgent",
    }
);

labelled_enum!(
    #[derive(Default)]
    Difficulty {
        Easy => "easy",
        #[default]
        Medium => "medium",
        Hard => "hard",
    }
);

labelled_enum!(
    /// What a row of the grade book records.
    GradeKind {
        Mark => "mark",
        Absence => "absence",
        ExcusedAbsence => "excused_absence",
        Late => "late",
    }
);

labelled_enum!(
    AssessmentKind {
        Oral => "oral",
        Test => "test",
        Thesis => "thesis",
        Project => "project",
        Homework => "homework",
        Activity => "activity",
        Behaviour => "behaviour",
        Other => "other",
    }
);

labelled_enum!(
    NotificationKind {
        Homework => "homework",
        Grade => "grade",
        Absence => "absence",
        Reminder => "reminder",
        System => "system",
    }
);

labelled_enum!(
    AchievementCategory {
        Grades => "grades",
        Absences => "absences",
        Homework => "homework",
        General => "general",
    }
);

labelled_enum!(
    /// Direction of the last three marks of a subject.
    Trend {
        Rising => "rising",
        Falling => "falling",
        Stable => "stable",
        Inconclusive => "inconclusive",
    }
);

impl UserRole {
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Superadmin)
    }
}

fn default_true() -> bool {
    true
}

fn default_rating() -> u8 {
    DEFAULT_SUBJECT_RATING
}

fn default_reminder_days() -> u32 {
    1
}

/// A user account as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: u32,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    /// First and last name when both are known, the username otherwise.
    pub fn full_name(&self) -> String {
        if !self.first_name.is_empty() && !self.last_name.is_empty() {
            format!("{} {}", self.first_name, self.last_name)
        } else {
            self.username.clone()
        }
    }
}

/// Per-student settings and approval state. Every user has exactly one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub user_id: u32,
    pub class_label: String,
    pub class_room_id: Option<u32>,
    pub school: String,
    pub parent_phone: String,
    pub parent_email: String,
    pub day_start: NaiveTime,
    pub lesson_minutes: u32,
    pub break_minutes: u32,
    pub lessons_per_day: u32,
    pub homework_reminders: bool,
    pub grade_notifications: bool,
    pub reminder_days_ahead: u32,
    pub approved: bool,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassRoomRecord {
    pub class_room_id: u32,
    pub name: String,
    pub school: String,
    pub county: String,
    pub head_teacher_id: Option<u32>,
    pub description: String,
}

/// One lesson of a class-wide schedule template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassScheduleEntryRecord {
    pub entry_id: u32,
    pub class_room_id: u32,
    pub weekday: u8,
    pub slot: u32,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub subject_name: String,
    pub subject_color: String,
    pub room: String,
    pub notes: String,
    pub kind: LessonKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub subject_id: u32,
    pub user_id: u32,
    pub name: String,
    pub teacher_name: String,
    pub room: String,
    pub color: String,
    pub description: String,
    pub textbook: String,
    pub active: bool,
    pub rating: u8,
}

/// One lesson of a student's personal weekly schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntryRecord {
    pub entry_id: u32,
    pub user_id: u32,
    pub subject_id: u32,
    pub weekday: u8,
    pub slot: u32,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub room: String,
    pub notes: String,
    pub kind: LessonKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleChangeRecord {
    pub change_id: u32,
    pub user_id: u32,
    pub entry_id: u32,
    pub kind: ChangeKind,
    pub starts_on: NaiveDate,
    pub ends_on: Option<NaiveDate>,
    pub reason: String,
    pub new_start: Option<NaiveTime>,
    pub new_end: Option<NaiveTime>,
    pub new_room: String,
    pub new_subject_id: Option<u32>,
    pub substitute_teacher: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeworkRecord {
    pub homework_id: u32,
    pub user_id: u32,
    pub subject_id: u32,
    pub title: String,
    pub description: String,
    pub pages: String,
    pub exercises: String,
    pub assigned_on: NaiveDate,
    pub deadline: NaiveDate,
    pub priority: Priority,
    pub difficulty: Difficulty,
    pub estimated_minutes: Option<u32>,
    pub worked_minutes: u32,
    pub progress: u8,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub share_with_class: bool,
    pub shared_class_room_id: Option<u32>,
    pub shared_at: Option<DateTime<Utc>>,
    pub reminder_enabled: bool,
    pub reminder_days: u32,
    pub personal_notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomeworkReminderRecord {
    pub reminder_id: u32,
    pub homework_id: u32,
    pub remind_on: NaiveDate,
    pub remind_at: NaiveTime,
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub custom_message: String,
}

/// A mark, absence or late arrival.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeRecord {
    pub grade_id: u32,
    pub user_id: u32,
    pub subject_id: u32,
    pub kind: GradeKind,
    pub value: Option<f64>,
    pub assessment: Option<AssessmentKind>,
    pub description: String,
    pub date: NaiveDate,
    pub semester: u8,
    pub excused: bool,
    pub excused_on: Option<NaiveDate>,
    pub notes: String,
    pub important: bool,
    pub created_at: DateTime<Utc>,
}

impl GradeRecord {
    pub fn is_mark(&self) -> bool {
        self.kind == GradeKind::Mark && self.value.is_some()
    }

    pub fn is_absence(&self) -> bool {
        matches!(self.kind, GradeKind::Absence | GradeKind::ExcusedAbsence)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemesterRecord {
    pub semester_id: u32,
    pub user_id: u32,
    pub number: u8,
    pub school_year: String,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeGoalRecord {
    pub goal_id: u32,
    pub user_id: u32,
    pub subject_id: u32,
    pub semester_id: u32,
    pub target_average: f64,
    pub description: String,
    pub reached: bool,
    pub reached_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub notification_id: u32,
    pub user_id: u32,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub link_url: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementRecord {
    pub achievement_id: u32,
    pub code: String,
    pub name: String,
    pub description: String,
    pub category: AchievementCategory,
    pub icon: String,
    pub points: u32,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAchievementRecord {
    pub user_id: u32,
    pub achievement_id: u32,
    pub unlocked_at: Option<DateTime<Utc>>,
    pub progress: u32,
}

/// Data sent by a new student. Identity itself is established upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub class_room_id: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub class_label: String,
    #[serde(default)]
    pub class_room_id: Option<u32>,
    #[serde(default)]
    pub school: String,
    #[serde(default)]
    pub parent_phone: String,
    #[serde(default)]
    pub parent_email: String,
    pub day_start: NaiveTime,
    pub lesson_minutes: u32,
    pub break_minutes: u32,
    pub lessons_per_day: u32,
    pub homework_reminders: bool,
    pub grade_notifications: bool,
    pub reminder_days_ahead: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassRoomDraft {
    pub name: String,
    #[serde(default)]
    pub school: String,
    #[serde(default)]
    pub county: String,
    #[serde(default)]
    pub head_teacher_id: Option<u32>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassScheduleEntryDraft {
    pub weekday: u8,
    pub slot: u32,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub subject_name: String,
    #[serde(default)]
    pub subject_color: Option<String>,
    #[serde(default)]
    pub room: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub kind: LessonKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectDraft {
    pub name: String,
    #[serde(default)]
    pub teacher_name: String,
    #[serde(default)]
    pub room: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub textbook: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_rating")]
    pub rating: u8,
}

/// A personal lesson as submitted. Missing times are derived from the slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntryDraft {
    pub subject_id: u32,
    pub weekday: u8,
    pub slot: u32,
    #[serde(default)]
    pub start: Option<NaiveTime>,
    #[serde(default)]
    pub end: Option<NaiveTime>,
    #[serde(default)]
    pub room: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub kind: LessonKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleChangeDraft {
    pub entry_id: u32,
    pub kind: ChangeKind,
    pub starts_on: NaiveDate,
    #[serde(default)]
    pub ends_on: Option<NaiveDate>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub new_start: Option<NaiveTime>,
    #[serde(default)]
    pub new_end: Option<NaiveTime>,
    #[serde(default)]
    pub new_room: String,
    #[serde(default)]
    pub new_subject_id: Option<u32>,
    #[serde(default)]
    pub substitute_teacher: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeworkDraft {
    pub subject_id: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub pages: String,
    #[serde(default)]
    pub exercises: String,
    #[serde(default)]
    pub assigned_on: Option<NaiveDate>,
    pub deadline: NaiveDate,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub estimated_minutes: Option<u32>,
    #[serde(default)]
    pub share_with_class: bool,
    #[serde(default)]
    pub shared_class_room_id: Option<u32>,
    #[serde(default = "default_true")]
    pub reminder_enabled: bool,
    #[serde(default = "default_reminder_days")]
    pub reminder_days: u32,
    #[serde(default)]
    pub personal_notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeDraft {
    pub subject_id: u32,
    pub kind: GradeKind,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub assessment: Option<AssessmentKind>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    pub semester: u8,
    #[serde(default)]
    pub excused: bool,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub important: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemesterDraft {
    pub number: u8,
    pub school_year: String,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalDraft {
    pub subject_id: u32,
    pub semester_id: u32,
    pub target_average: f64,
    #[serde(default)]
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn test_labelled_enum_defaults_and_labels() {
        assert_eq!(LessonKind::default(), LessonKind::Normal);
        assert_eq!(Priority::default(), Priority::Normal);
        assert_eq!(Difficulty::default(), Difficulty::Medium);
        assert_eq!("room_changed".parse::<ChangeKind>(), Ok(ChangeKind::RoomChanged));
        assert_eq!(GradeKind::ExcusedAbsence.to_string(), "excused_absence");
        assert!("weekly".parse::<Priority>().is_err());
    }
}
