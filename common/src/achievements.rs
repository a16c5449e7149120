//! Achievement catalog and the rules that unlock its entries.
//!
//! Rules are pure: the caller collects a snapshot of facts after a save and gets
//! back the codes to unlock. Persisting the unlocks (and skipping inactive or
//! unknown codes) happens in `db_util::achievements`.

use crate::{AchievementCategory, GradeKind, GradeRecord, HomeworkRecord, MAX_GRADE};
use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use itertools::Itertools;

use crate::homework::completed_on_time;

/// One catalog entry as seeded into the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub code: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: AchievementCategory,
    pub icon: &'static str,
    pub points: u32,
}

const fn entry(
    code: &'static str,
    name: &'static str,
    description: &'static str,
    category: AchievementCategory,
    icon: &'static str,
    points: u32,
) -> CatalogEntry {
    CatalogEntry {
        code,
        name,
        description,
        category,
        icon,
        points,
    }
}

pub const FIRST_10: &str = "FIRST_10";
pub const THREE_10_STREAK: &str = "THREE_10_STREAK";
pub const SUBJECT_AVG_9: &str = "SUBJECT_AVG_9";
pub const TEN_NOTES_MONTH: &str = "TEN_NOTES_MONTH";
pub const NO_LOW_GRADES_MONTH: &str = "NO_LOW_GRADES_MONTH";
pub const NO_ABSENCES_30D: &str = "NO_ABSENCES_30D";
pub const MOTIVATE_ABSENCE: &str = "MOTIVATE_ABSENCE";
pub const FIRST_HOMEWORK_ON_TIME: &str = "FIRST_HOMEWORK_ON_TIME";
pub const FIVE_HOMEWORKS_ROW: &str = "FIVE_HOMEWORKS_ROW";
pub const HOMEWORK_STREAK_14: &str = "HOMEWORK_STREAK_14";
pub const HOMEWORK_50_DONE: &str = "HOMEWORK_50_DONE";
pub const HOMEWORK_10_IMAGES: &str = "HOMEWORK_10_IMAGES";
pub const HOMEWORK_FIRST_SHARED: &str = "HOMEWORK_FIRST_SHARED";
pub const FIRST_LOGIN_DAY: &str = "FIRST_LOGIN_DAY";
pub const SEVEN_DAYS_ACTIVE: &str = "SEVEN_DAYS_ACTIVE";

pub const CATALOG: [CatalogEntry; 15] = [
    entry(FIRST_10, "First 10", "Get your first 10.", AchievementCategory::Grades, "fas fa-star", 20),
    entry(THREE_10_STREAK, "Triple 10", "Get three 10s in a row.", AchievementCategory::Grades, "fas fa-fire", 40),
    entry(SUBJECT_AVG_9, "Subject excellence", "Keep an average of at least 9 in a subject.", AchievementCategory::Grades, "fas fa-medal", 30),
    entry(TEN_NOTES_MONTH, "Busy month", "Receive at least 10 marks in one month.", AchievementCategory::Grades, "fas fa-calendar-check", 25),
    entry(NO_LOW_GRADES_MONTH, "Nothing below 7", "A whole month without marks below 7.", AchievementCategory::Grades, "fas fa-thumbs-up", 25),
    entry(NO_ABSENCES_30D, "Perfect attendance", "30 days without absences.", AchievementCategory::Absences, "fas fa-user-check", 30),
    entry(MOTIVATE_ABSENCE, "Responsible", "Excuse your first absence.", AchievementCategory::Absences, "fas fa-file-signature", 10),
    entry(FIRST_HOMEWORK_ON_TIME, "Good start", "Finish your first homework on time.", AchievementCategory::Homework, "fas fa-check-circle", 10),
    entry(FIVE_HOMEWORKS_ROW, "In rhythm", "Finish 5 homeworks in a row on time.", AchievementCategory::Homework, "fas fa-tasks", 25),
    entry(HOMEWORK_STREAK_14, "Two perfect weeks", "14 days in a row without late homework.", AchievementCategory::Homework, "fas fa-bolt", 40),
    entry(HOMEWORK_50_DONE, "Homework marathon", "Finish at least 50 homeworks.", AchievementCategory::Homework, "fas fa-running", 35),
    entry(HOMEWORK_10_IMAGES, "Rich gallery", "Upload at least 10 images to your homework.", AchievementCategory::Homework, "fas fa-images", 20),
    entry(HOMEWORK_FIRST_SHARED, "Generous classmate", "Share your first homework with the class.", AchievementCategory::Homework, "fas fa-share-alt", 15),
    entry(FIRST_LOGIN_DAY, "Welcome!", "You logged in on your first day.", AchievementCategory::General, "fas fa-door-open", 5),
    entry(SEVEN_DAYS_ACTIVE, "Consistency", "Active on 7 different days.", AchievementCategory::General, "fas fa-history", 20),
];

/// Codes that used to be seeded and are removed by the purge job.
pub const RETIRED_CODES: [&str; 3] = ["FULL_WEEK_SCHEDULE", "SUBJECTS_10", "FILES_20"];

const TEN_MARKS_MONTH_COUNT: usize = 10;
const LOW_MARK: f64 = 7.0;
const SUBJECT_EXCELLENCE: f64 = 9.0;
const ATTENDANCE_WINDOW_DAYS: u64 = 30;
const HOMEWORK_ROW: usize = 5;
const HOMEWORK_STREAK_DAYS: u64 = 14;
const HOMEWORK_MARATHON: usize = 50;
const ACTIVE_DAYS: usize = 7;

pub fn catalog_entry(code: &str) -> Option<&'static CatalogEntry> {
    CATALOG.iter().find(|e| e.code == code)
}

/// A code to unlock together with the progress value to record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unlock {
    pub code: &'static str,
    pub progress: u32,
}

impl Unlock {
    fn new(code: &'static str) -> Self {
        Unlock { code, progress: 0 }
    }

    fn with_progress(code: &'static str, progress: usize) -> Self {
        Unlock {
            code,
            progress: u32::try_from(progress).unwrap_or(u32::MAX),
        }
    }
}

/// Unlock state after applying a rule hit to the stored state.
/// The first unlock time is kept and progress never decreases.
/// The flag is true when this call performed the unlock.
pub fn merge_unlock(
    unlocked_at: Option<DateTime<Utc>>,
    stored_progress: u32,
    progress: u32,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, u32, bool) {
    match unlocked_at {
        Some(at) => (at, stored_progress.max(progress), false),
        None => (now, stored_progress.max(progress), true),
    }
}

/// What the grade rules look at after a grade is saved.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeFacts {
    /// Value of the saved row when it is a mark.
    pub saved_mark: Option<f64>,
    /// The saved row was an excused absence.
    pub saved_excused: bool,
    /// Marks of 10 the user holds.
    pub tens: usize,
    /// Most recent marks of the user, newest first, at most three.
    pub latest_marks: Vec<f64>,
    /// Mean of the saved row's subject.
    pub subject_mean: Option<f64>,
    pub marks_this_month: usize,
    /// Marks of the previous calendar month.
    pub previous_month_marks: Vec<f64>,
    pub absences_last_30_days: usize,
    pub excused_absences: usize,
}

impl GradeFacts {
    /// Build the facts from every grade of the user.
    pub fn collect(
        grades: &[GradeRecord],
        saved: &GradeRecord,
        today: NaiveDate,
    ) -> Self {
        let marks = || grades.iter().filter(|g| g.is_mark());
        let same_month = |g: &&GradeRecord, month: NaiveDate| {
            g.date.year() == month.year() && g.date.month() == month.month()
        };
        let this_month = today.with_day(1).unwrap_or(today);
        let previous_month = this_month.checked_sub_months(Months::new(1));
        let window_start = today
            .checked_sub_days(Days::new(ATTENDANCE_WINDOW_DAYS))
            .unwrap_or(NaiveDate::MIN);

        let subject_marks: Vec<f64> = marks()
            .filter(|g| g.subject_id == saved.subject_id)
            .filter_map(|g| g.value)
            .collect();

        GradeFacts {
            saved_mark: if saved.is_mark() { saved.value } else { None },
            saved_excused: saved.kind == GradeKind::ExcusedAbsence,
            tens: marks()
                .filter(|g| g.value.is_some_and(|v| v >= MAX_GRADE))
                .count(),
            latest_marks: marks()
                .sorted_by_key(|g| std::cmp::Reverse((g.date, g.created_at)))
                .take(3)
                .filter_map(|g| g.value)
                .collect(),
            subject_mean: crate::grade_stats::mean(&subject_marks),
            marks_this_month: marks().filter(|g| same_month(g, this_month)).count(),
            previous_month_marks: previous_month
                .map(|month| {
                    marks()
                        .filter(|g| same_month(g, month))
                        .filter_map(|g| g.value)
                        .collect()
                })
                .unwrap_or_default(),
            absences_last_30_days: grades
                .iter()
                .filter(|g| g.is_absence() && g.date >= window_start)
                .count(),
            excused_absences: grades
                .iter()
                .filter(|g| g.kind == GradeKind::ExcusedAbsence)
                .count(),
        }
    }
}

pub fn evaluate_grade_rules(facts: &GradeFacts) -> Vec<Unlock> {
    let mut unlocks = Vec::new();

    if let Some(value) = facts.saved_mark {
        if value >= MAX_GRADE && facts.tens == 1 {
            unlocks.push(Unlock::new(FIRST_10));
        }
        if facts.latest_marks.len() == 3 && facts.latest_marks.iter().all(|v| *v >= MAX_GRADE) {
            unlocks.push(Unlock::new(THREE_10_STREAK));
        }
        if facts.subject_mean.is_some_and(|m| m >= SUBJECT_EXCELLENCE) {
            unlocks.push(Unlock::new(SUBJECT_AVG_9));
        }
        if facts.marks_this_month >= TEN_MARKS_MONTH_COUNT {
            unlocks.push(Unlock::with_progress(TEN_NOTES_MONTH, facts.marks_this_month));
        }
        if !facts.previous_month_marks.is_empty()
            && facts.previous_month_marks.iter().all(|v| *v >= LOW_MARK)
        {
            unlocks.push(Unlock::new(NO_LOW_GRADES_MONTH));
        }
    }

    if facts.absences_last_30_days == 0 {
        unlocks.push(Unlock::new(NO_ABSENCES_30D));
    }
    if facts.saved_excused && facts.excused_absences >= 1 {
        unlocks.push(Unlock::with_progress(MOTIVATE_ABSENCE, facts.excused_absences));
    }

    unlocks
}

/// What the homework rules look at after a homework is saved.
#[derive(Debug, Clone, PartialEq)]
pub struct HomeworkFacts {
    /// The save turned an open homework into a completed one, on time.
    pub fresh_on_time_completion: bool,
    /// On-time flags of the latest completions, newest first, at most five.
    pub latest_completions_on_time: Vec<bool>,
    /// Homework due in the last two weeks (today included).
    pub due_in_streak_window: usize,
    pub due_in_streak_window_on_time: usize,
    pub completed_total: usize,
    pub saved_shared: bool,
    pub shared_total: usize,
}

impl HomeworkFacts {
    /// `was_completed` is the completion state before the save, false for new rows.
    pub fn collect(
        homework: &[HomeworkRecord],
        saved: &HomeworkRecord,
        was_completed: bool,
        today: NaiveDate,
    ) -> Self {
        let window_start = today
            .checked_sub_days(Days::new(HOMEWORK_STREAK_DAYS - 1))
            .unwrap_or(NaiveDate::MIN);
        let in_window: Vec<&HomeworkRecord> = homework
            .iter()
            .filter(|h| h.deadline >= window_start && h.deadline <= today)
            .collect();

        HomeworkFacts {
            fresh_on_time_completion: !was_completed && completed_on_time(saved),
            latest_completions_on_time: homework
                .iter()
                .filter(|h| h.completed)
                .sorted_by_key(|h| std::cmp::Reverse(h.completed_at))
                .take(HOMEWORK_ROW)
                .map(completed_on_time)
                .collect(),
            due_in_streak_window: in_window.len(),
            due_in_streak_window_on_time: in_window
                .iter()
                .filter(|h| completed_on_time(h))
                .count(),
            completed_total: homework.iter().filter(|h| h.completed).count(),
            saved_shared: saved.share_with_class,
            shared_total: homework.iter().filter(|h| h.share_with_class).count(),
        }
    }
}

pub fn evaluate_homework_rules(facts: &HomeworkFacts) -> Vec<Unlock> {
    let mut unlocks = Vec::new();

    if facts.fresh_on_time_completion {
        unlocks.push(Unlock::new(FIRST_HOMEWORK_ON_TIME));
    }
    if facts.latest_completions_on_time.len() == HOMEWORK_ROW
        && facts.latest_completions_on_time.iter().all(|on_time| *on_time)
    {
        unlocks.push(Unlock::new(FIVE_HOMEWORKS_ROW));
    }
    if facts.due_in_streak_window > 0
        && facts.due_in_streak_window == facts.due_in_streak_window_on_time
    {
        unlocks.push(Unlock::new(HOMEWORK_STREAK_14));
    }
    if facts.completed_total >= HOMEWORK_MARATHON {
        unlocks.push(Unlock::with_progress(HOMEWORK_50_DONE, facts.completed_total));
    }
    if facts.saved_shared && facts.shared_total >= 1 {
        unlocks.push(Unlock::with_progress(HOMEWORK_FIRST_SHARED, facts.shared_total));
    }

    unlocks
}

/// Activity rules, run when a user is seen for the first time on a day.
pub fn evaluate_activity_rules(
    registered_on: NaiveDate,
    today: NaiveDate,
    active_days: usize,
) -> Vec<Unlock> {
    let mut unlocks = Vec::new();
    if today == registered_on {
        unlocks.push(Unlock::new(FIRST_LOGIN_DAY));
    }
    if active_days >= ACTIVE_DAYS {
        unlocks.push(Unlock::with_progress(SEVEN_DAYS_ACTIVE, active_days));
    }
    unlocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::homework::{complete, new_record};
    use crate::{Difficulty, HomeworkDraft, Priority};
    use chrono::TimeZone;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn grade(id: u32, subject_id: u32, kind: GradeKind, value: Option<f64>, on: NaiveDate) -> GradeRecord {
        GradeRecord {
            grade_id: id,
            user_id: 1,
            subject_id,
            kind,
            value,
            assessment: None,
            description: String::new(),
            date: on,
            semester: 1,
            excused: kind == GradeKind::ExcusedAbsence,
            excused_on: None,
            notes: String::new(),
            important: false,
            created_at: Utc.timestamp_opt(1_700_000_000 + i64::from(id), 0).unwrap(),
        }
    }

    fn mark(id: u32, value: f64, on: NaiveDate) -> GradeRecord {
        grade(id, 1, GradeKind::Mark, Some(value), on)
    }

    fn codes(unlocks: &[Unlock]) -> Vec<&'static str> {
        unlocks.iter().map(|u| u.code).collect()
    }

    fn homework(id: u32, deadline: NaiveDate) -> HomeworkRecord {
        let draft = HomeworkDraft {
            subject_id: 1,
            title: format!("Homework {id}"),
            description: String::new(),
            pages: String::new(),
            exercises: String::new(),
            assigned_on: None,
            deadline,
            priority: Priority::Normal,
            difficulty: Difficulty::Easy,
            estimated_minutes: None,
            share_with_class: false,
            shared_class_room_id: None,
            reminder_enabled: false,
            reminder_days: 0,
            personal_notes: String::new(),
        };
        let mut record = new_record(1, &draft, date(1, 1));
        record.homework_id = id;
        record
    }

    fn done_on(mut hw: HomeworkRecord, on: NaiveDate) -> HomeworkRecord {
        complete(&mut hw, on.and_hms_opt(12, 0, 0).unwrap().and_utc());
        hw
    }

    #[test_log::test]
    fn test_catalog_is_consistent() {
        assert_eq!(CATALOG.iter().map(|e| e.code).unique().count(), CATALOG.len());
        assert_eq!(CATALOG.iter().map(|e| e.points).sum::<u32>(), 350);
        assert!(RETIRED_CODES.iter().all(|code| catalog_entry(code).is_none()));
        assert_eq!(catalog_entry(FIRST_10).unwrap().icon, "fas fa-star");
    }

    #[test_log::test]
    fn test_first_ten_only_once() {
        let today = date(3, 10);
        let first = mark(1, 10.0, today);
        let facts = GradeFacts::collect(&[first.clone()], &first, today);
        assert!(codes(&evaluate_grade_rules(&facts)).contains(&FIRST_10));

        let second = mark(2, 10.0, today);
        let facts = GradeFacts::collect(&[first, second.clone()], &second, today);
        assert!(!codes(&evaluate_grade_rules(&facts)).contains(&FIRST_10));
    }

    #[test_log::test]
    fn test_three_tens_and_subject_average() {
        let today = date(3, 10);
        let grades = vec![
            mark(1, 6.0, date(3, 1)),
            mark(2, 10.0, date(3, 2)),
            mark(3, 10.0, date(3, 3)),
            mark(4, 10.0, date(3, 4)),
        ];
        let facts = GradeFacts::collect(&grades, &grades[3], today);
        assert_eq!(facts.latest_marks, vec![10.0, 10.0, 10.0]);
        let unlocked = codes(&evaluate_grade_rules(&facts));
        assert!(unlocked.contains(&THREE_10_STREAK));
        // Mean is 9.0 exactly.
        assert!(unlocked.contains(&SUBJECT_AVG_9));
    }

    #[test_log::test]
    fn test_ten_marks_in_month_with_progress() {
        let today = date(3, 20);
        let grades: Vec<GradeRecord> = (1..=11).map(|i| mark(i, 8.0, date(3, i))).collect();
        let facts = GradeFacts::collect(&grades, &grades[10], today);
        let unlocks = evaluate_grade_rules(&facts);
        assert!(unlocks.contains(&Unlock {
            code: TEN_NOTES_MONTH,
            progress: 11
        }));
    }

    #[test_log::test]
    fn test_no_low_grades_previous_month() {
        let today = date(3, 5);
        let saved = mark(9, 8.0, today);
        let good = vec![mark(1, 7.0, date(2, 3)), mark(2, 9.0, date(2, 20)), saved.clone()];
        let facts = GradeFacts::collect(&good, &saved, today);
        assert!(codes(&evaluate_grade_rules(&facts)).contains(&NO_LOW_GRADES_MONTH));

        let bad = vec![mark(1, 6.5, date(2, 3)), mark(2, 9.0, date(2, 20)), saved.clone()];
        let facts = GradeFacts::collect(&bad, &saved, today);
        assert!(!codes(&evaluate_grade_rules(&facts)).contains(&NO_LOW_GRADES_MONTH));

        let empty = vec![saved.clone()];
        let facts = GradeFacts::collect(&empty, &saved, today);
        assert!(!codes(&evaluate_grade_rules(&facts)).contains(&NO_LOW_GRADES_MONTH));
    }

    #[test_log::test]
    fn test_no_absences_in_the_last_thirty_days() {
        let today = date(3, 31);
        let saved = mark(1, 8.0, today);

        let facts = GradeFacts::collect(&[saved.clone()], &saved, today);
        assert!(codes(&evaluate_grade_rules(&facts)).contains(&NO_ABSENCES_30D));

        let old_absence = grade(2, 1, GradeKind::Absence, None, date(2, 20));
        let facts = GradeFacts::collect(&[saved.clone(), old_absence], &saved, today);
        assert!(codes(&evaluate_grade_rules(&facts)).contains(&NO_ABSENCES_30D));

        let absent = grade(3, 1, GradeKind::Absence, None, date(3, 15));
        let facts = GradeFacts::collect(&[saved.clone(), absent], &saved, today);
        assert!(!codes(&evaluate_grade_rules(&facts)).contains(&NO_ABSENCES_30D));
    }

    #[test_log::test]
    fn test_excused_absence() {
        let today = date(3, 10);
        let excused = grade(1, 1, GradeKind::ExcusedAbsence, None, today);
        let facts = GradeFacts::collect(&[excused.clone()], &excused, today);
        assert_eq!(
            evaluate_grade_rules(&facts),
            vec![Unlock {
                code: MOTIVATE_ABSENCE,
                progress: 1
            }]
        );
    }

    #[test_log::test]
    fn test_homework_on_time_rules() {
        let today = date(3, 10);
        let hw = done_on(homework(1, date(3, 10)), date(3, 9));
        let facts = HomeworkFacts::collect(&[hw.clone()], &hw, false, today);
        let unlocked = codes(&evaluate_homework_rules(&facts));
        assert!(unlocked.contains(&FIRST_HOMEWORK_ON_TIME));
        assert!(unlocked.contains(&HOMEWORK_STREAK_14));
        assert!(!unlocked.contains(&FIVE_HOMEWORKS_ROW));

        // Saving an already completed homework again is not a fresh completion.
        let facts = HomeworkFacts::collect(&[hw.clone()], &hw, true, today);
        assert!(!codes(&evaluate_homework_rules(&facts)).contains(&FIRST_HOMEWORK_ON_TIME));

        let late = done_on(homework(2, date(3, 5)), date(3, 8));
        let facts = HomeworkFacts::collect(&[late.clone()], &late, false, today);
        let unlocked = codes(&evaluate_homework_rules(&facts));
        assert!(!unlocked.contains(&FIRST_HOMEWORK_ON_TIME));
        assert!(!unlocked.contains(&HOMEWORK_STREAK_14));
    }

    #[test_log::test]
    fn test_five_in_a_row_uses_latest_completions() {
        let today = date(3, 30);
        let mut all: Vec<HomeworkRecord> = (1..=5)
            .map(|i| done_on(homework(i, date(3, 10 + i)), date(3, 9 + i)))
            .collect();
        let facts = HomeworkFacts::collect(&all, &all[4], false, today);
        assert!(codes(&evaluate_homework_rules(&facts)).contains(&FIVE_HOMEWORKS_ROW));

        all.push(done_on(homework(6, date(3, 20)), date(3, 25)));
        let facts = HomeworkFacts::collect(&all, &all[5], false, today);
        assert!(!codes(&evaluate_homework_rules(&facts)).contains(&FIVE_HOMEWORKS_ROW));
    }

    #[test_log::test]
    fn test_streak_fails_with_open_homework_due() {
        let today = date(3, 20);
        let done = done_on(homework(1, date(3, 15)), date(3, 14));
        let open = homework(2, date(3, 18));
        let facts = HomeworkFacts::collect(&[done.clone(), open], &done, true, today);
        assert!(!codes(&evaluate_homework_rules(&facts)).contains(&HOMEWORK_STREAK_14));
    }

    #[test_log::test]
    fn test_marathon_and_sharing() {
        let today = date(6, 1);
        let mut all: Vec<HomeworkRecord> = (1..=50)
            .map(|i| done_on(homework(i, date(1, 1)), date(1, 1)))
            .collect();
        all[0].share_with_class = true;
        let facts = HomeworkFacts::collect(&all, &all[0], true, today);
        let unlocks = evaluate_homework_rules(&facts);
        assert!(unlocks.contains(&Unlock {
            code: HOMEWORK_50_DONE,
            progress: 50
        }));
        assert!(unlocks.contains(&Unlock {
            code: HOMEWORK_FIRST_SHARED,
            progress: 1
        }));
    }

    #[test_log::test]
    fn test_activity_rules() {
        let day = date(3, 1);
        assert_eq!(codes(&evaluate_activity_rules(day, day, 1)), vec![FIRST_LOGIN_DAY]);
        assert!(evaluate_activity_rules(day, date(3, 2), 2).is_empty());
        assert_eq!(
            evaluate_activity_rules(day, date(3, 9), 7),
            vec![Unlock {
                code: SEVEN_DAYS_ACTIVE,
                progress: 7
            }]
        );
    }

    #[test_log::test]
    fn test_merge_unlock_is_idempotent() {
        let first = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2025, 3, 9, 8, 0, 0).unwrap();

        assert_eq!(merge_unlock(None, 0, 3, first), (first, 3, true));
        assert_eq!(merge_unlock(Some(first), 3, 1, later), (first, 3, false));
        assert_eq!(merge_unlock(Some(first), 3, 8, later), (first, 8, false));
    }
}
