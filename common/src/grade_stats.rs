//! Grade book statistics, goals and grade validation.

use crate::{
    GradeDraft, GradeGoalRecord, GradeKind, GradeRecord, MAX_GRADE, MIN_GRADE, SEMESTER_WEEKS,
    SemesterDraft, Trend, ValidationError,
};
use chrono::{Datelike, Months, NaiveDate};
use itertools::Itertools;
use serde::Serialize;

/// Number of hypothetical 10s `marks_needed` will try before giving up.
const MAX_MARKS_NEEDED: u32 = 11;

/// Statistics of one subject, computed on demand from its grade rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectStats {
    pub marks: usize,
    pub mean: Option<f64>,
    pub highest: Option<f64>,
    pub lowest: Option<f64>,
    pub trend: Trend,
    pub absences: usize,
    pub excused_absences: usize,
    pub lates: usize,
}

impl SubjectStats {
    pub fn total_absences(&self) -> usize {
        self.absences + self.excused_absences
    }
}

/// Mark values in chronological order (date, then creation time).
fn chronological_marks<'a>(grades: impl IntoIterator<Item = &'a GradeRecord>) -> Vec<f64> {
    grades
        .into_iter()
        .filter(|g| g.is_mark())
        .sorted_by_key(|g| (g.date, g.created_at))
        .filter_map(|g| g.value)
        .collect()
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Compares the oldest and newest of the last three values.
pub fn trend(chronological: &[f64]) -> Trend {
    if chronological.len() < 3 {
        return Trend::Inconclusive;
    }
    let recent = &chronological[chronological.len() - 3..];
    let (first, last) = (recent[0], recent[2]);
    if first < last {
        Trend::Rising
    } else if first > last {
        Trend::Falling
    } else {
        Trend::Stable
    }
}

pub fn subject_stats(grades: &[GradeRecord]) -> SubjectStats {
    let marks = chronological_marks(grades);
    let count_kind = |kind: GradeKind| grades.iter().filter(|g| g.kind == kind).count();

    SubjectStats {
        marks: marks.len(),
        mean: mean(&marks),
        highest: marks.iter().copied().reduce(f64::max),
        lowest: marks.iter().copied().reduce(f64::min),
        trend: trend(&marks),
        absences: count_kind(GradeKind::Absence),
        excused_absences: count_kind(GradeKind::ExcusedAbsence),
        lates: count_kind(GradeKind::Late),
    }
}

/// Share of a subject's estimated semester lessons that were missed, in percent.
pub fn absence_percentage(total_absences: usize, lessons_per_week: usize) -> f64 {
    let lessons = SEMESTER_WEEKS * lessons_per_week;
    if lessons == 0 {
        return 0.0;
    }
    total_absences as f64 / lessons as f64 * 100.0
}

/// Display colour of a mark.
pub fn grade_colour(value: f64) -> &'static str {
    if value >= 9.0 {
        "#28a745"
    } else if value >= 7.0 {
        "#ffc107"
    } else if value >= 5.0 {
        "#fd7e14"
    } else {
        "#dc3545"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthStats {
    pub year: i32,
    pub month: u32,
    pub marks: usize,
    pub mean: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AbsenceSummary {
    pub total: usize,
    pub excused: usize,
    pub unexcused: usize,
    pub lates: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeOverview {
    pub marks: usize,
    pub mean: Option<f64>,
    pub highest: Option<f64>,
    pub lowest: Option<f64>,
    /// Count of marks in `[i, i+1)` at index `i - 1`. A 10 lands in the last bucket.
    pub distribution: [usize; 10],
    /// Oldest month first, ending with the month of `today`.
    pub months: Vec<MonthStats>,
    pub absences: AbsenceSummary,
}

fn bucket(value: f64) -> usize {
    (value.floor().clamp(MIN_GRADE, MAX_GRADE) as usize) - 1
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn overview(grades: &[GradeRecord], today: NaiveDate) -> GradeOverview {
    let marks = chronological_marks(grades);

    let mut distribution = [0; 10];
    for value in &marks {
        distribution[bucket(*value)] += 1;
    }

    let this_month = first_of_month(today);
    let months = (0..6)
        .rev()
        .filter_map(|back| this_month.checked_sub_months(Months::new(back)))
        .map(|start| {
            let values: Vec<f64> = grades
                .iter()
                .filter(|g| g.is_mark())
                .filter(|g| g.date.year() == start.year() && g.date.month() == start.month())
                .filter_map(|g| g.value)
                .collect();
            MonthStats {
                year: start.year(),
                month: start.month(),
                marks: values.len(),
                mean: mean(&values),
            }
        })
        .collect();

    let excused = grades
        .iter()
        .filter(|g| g.kind == GradeKind::ExcusedAbsence)
        .count();
    let unexcused = grades
        .iter()
        .filter(|g| g.kind == GradeKind::Absence)
        .count();

    GradeOverview {
        marks: marks.len(),
        mean: mean(&marks),
        highest: marks.iter().copied().reduce(f64::max),
        lowest: marks.iter().copied().reduce(f64::min),
        distribution,
        months,
        absences: AbsenceSummary {
            total: excused + unexcused,
            excused,
            unexcused,
            lates: grades.iter().filter(|g| g.kind == GradeKind::Late).count(),
        },
    }
}

/// Statistics a goal is measured against: its subject's grades in the goal's
/// semester. `semester_number` is `None` when the goal's semester is unknown,
/// which matches no grades.
pub fn goal_stats(
    goal: &GradeGoalRecord,
    semester_number: Option<u8>,
    grades: &[GradeRecord],
) -> SubjectStats {
    let relevant: Vec<GradeRecord> = grades
        .iter()
        .filter(|g| g.subject_id == goal.subject_id && Some(g.semester) == semester_number)
        .cloned()
        .collect();
    subject_stats(&relevant)
}

pub fn goal_reached(goal: &GradeGoalRecord, mean: Option<f64>) -> bool {
    mean.is_some_and(|m| m >= goal.target_average)
}

/// How far the current mean is below the target. The whole target when there are no marks.
pub fn goal_gap(target: f64, mean: Option<f64>) -> f64 {
    match mean {
        Some(m) => target - m,
        None => target,
    }
}

/// Estimate how many 10s would lift the mean to the target.
pub fn marks_needed(target: f64, mean: Option<f64>, count: usize) -> u32 {
    let Some(mean) = mean.filter(|_| count > 0) else {
        return 1;
    };
    if target - mean <= 0.0 {
        return 0;
    }

    let sum = mean * count as f64;
    let mut needed = 0;
    while needed < MAX_MARKS_NEEDED {
        needed += 1;
        let new_mean = (sum + MAX_GRADE * needed as f64) / (count as f64 + needed as f64);
        if new_mean >= target {
            break;
        }
    }
    needed
}

pub fn validate_goal(target_average: f64) -> Result<(), ValidationError> {
    if !(MIN_GRADE..=MAX_GRADE).contains(&target_average) {
        return Err(ValidationError::OutOfRange {
            field: "target average",
            value: target_average,
            min: MIN_GRADE,
            max: MAX_GRADE,
        });
    }
    Ok(())
}

fn validate_semester_number(number: u8) -> Result<(), ValidationError> {
    if !(1..=2).contains(&number) {
        return Err(ValidationError::OutOfRange {
            field: "semester",
            value: f64::from(number),
            min: 1.0,
            max: 2.0,
        });
    }
    Ok(())
}

/// Check a submitted grade and return the kind it will be stored with.
pub fn validate_grade(draft: &GradeDraft) -> Result<GradeKind, ValidationError> {
    validate_semester_number(draft.semester)?;

    match draft.kind {
        GradeKind::Mark => {
            let value = draft.value.ok_or(ValidationError::MissingField("value"))?;
            if !(MIN_GRADE..=MAX_GRADE).contains(&value) {
                return Err(ValidationError::OutOfRange {
                    field: "value",
                    value,
                    min: MIN_GRADE,
                    max: MAX_GRADE,
                });
            }
            Ok(GradeKind::Mark)
        }
        kind => {
            if draft.value.is_some() {
                return Err(ValidationError::UnexpectedValue);
            }
            if kind == GradeKind::Absence && draft.excused {
                Ok(GradeKind::ExcusedAbsence)
            } else {
                Ok(kind)
            }
        }
    }
}

pub fn validate_semester(draft: &SemesterDraft) -> Result<(), ValidationError> {
    validate_semester_number(draft.number)?;
    if draft.school_year.trim().is_empty() {
        return Err(ValidationError::MissingField("school year"));
    }
    if draft.ends_on < draft.starts_on {
        return Err(ValidationError::DateOrder {
            field: "semester end",
            start: draft.starts_on,
        });
    }
    Ok(())
}

/// Semester row created when a grade names a semester the user has not set up.
pub fn default_semester(number: u8, today: NaiveDate) -> Option<SemesterDraft> {
    let year = today.year();
    let (starts_on, ends_on) = match number {
        1 => (
            NaiveDate::from_ymd_opt(year, 9, 15)?,
            NaiveDate::from_ymd_opt(year + 1, 1, 31)?,
        ),
        2 => (
            NaiveDate::from_ymd_opt(year, 2, 1)?,
            NaiveDate::from_ymd_opt(year, 6, 15)?,
        ),
        _ => return None,
    };
    Some(SemesterDraft {
        number,
        school_year: format!("{}-{}", year, year + 1),
        starts_on,
        ends_on,
        active: false,
    })
}

/// Turn an unexcused absence into an excused one.
pub fn excuse_absence(grade: &mut GradeRecord, today: NaiveDate) -> Result<(), ValidationError> {
    if grade.kind != GradeKind::Absence {
        return Err(ValidationError::NotAnAbsence);
    }
    grade.kind = GradeKind::ExcusedAbsence;
    grade.excused = true;
    grade.excused_on = Some(today);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn grade(id: u32, kind: GradeKind, value: Option<f64>, on: NaiveDate) -> GradeRecord {
        GradeRecord {
            grade_id: id,
            user_id: 1,
            subject_id: 1,
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
        grade(id, GradeKind::Mark, Some(value), on)
    }

    fn draft(kind: GradeKind, value: Option<f64>) -> GradeDraft {
        GradeDraft {
            subject_id: 1,
            kind,
            value,
            assessment: None,
            description: String::new(),
            date: None,
            semester: 1,
            excused: false,
            notes: String::new(),
            important: false,
        }
    }

    #[test_log::test]
    fn test_subject_stats() {
        let grades = vec![
            mark(1, 6.0, date(2025, 10, 1)),
            mark(2, 8.0, date(2025, 10, 5)),
            mark(3, 10.0, date(2025, 10, 9)),
            grade(4, GradeKind::Absence, None, date(2025, 10, 10)),
            grade(5, GradeKind::ExcusedAbsence, None, date(2025, 10, 11)),
            grade(6, GradeKind::Late, None, date(2025, 10, 12)),
        ];
        let stats = subject_stats(&grades);
        assert_eq!(stats.marks, 3);
        assert_eq!(stats.mean, Some(8.0));
        assert_eq!(stats.highest, Some(10.0));
        assert_eq!(stats.lowest, Some(6.0));
        assert_eq!(stats.trend, Trend::Rising);
        assert_eq!(stats.absences, 1);
        assert_eq!(stats.excused_absences, 1);
        assert_eq!(stats.lates, 1);
        assert_eq!(stats.total_absences(), 2);
    }

    #[test_log::test]
    fn test_subject_stats_empty() {
        let stats = subject_stats(&[]);
        assert_eq!(stats.marks, 0);
        assert_eq!(stats.mean, None);
        assert_eq!(stats.highest, None);
        assert_eq!(stats.trend, Trend::Inconclusive);
    }

    #[test_log::test]
    fn test_trend_uses_most_recent_marks() {
        // Entered out of order: the three latest by date are 9, 7, 5.
        let grades = vec![
            mark(1, 5.0, date(2025, 11, 20)),
            mark(2, 4.0, date(2025, 9, 1)),
            mark(3, 9.0, date(2025, 11, 1)),
            mark(4, 7.0, date(2025, 11, 10)),
        ];
        assert_eq!(subject_stats(&grades).trend, Trend::Falling);
    }

    #[test_log::test]
    fn test_trend_variants() {
        assert_eq!(trend(&[5.0, 9.0]), Trend::Inconclusive);
        assert_eq!(trend(&[5.0, 9.0, 5.0]), Trend::Stable);
        assert_eq!(trend(&[9.0, 1.0, 4.0, 6.0]), Trend::Rising);
        assert_eq!(trend(&[10.0, 9.0, 8.0]), Trend::Falling);
    }

    #[test_log::test]
    fn test_absence_percentage() {
        assert_eq!(absence_percentage(9, 2), 25.0);
        assert_eq!(absence_percentage(4, 0), 0.0);
    }

    #[test_log::test]
    fn test_grade_colour() {
        assert_eq!(grade_colour(9.0), "#28a745");
        assert_eq!(grade_colour(8.99), "#ffc107");
        assert_eq!(grade_colour(5.0), "#fd7e14");
        assert_eq!(grade_colour(4.5), "#dc3545");
    }

    #[test_log::test]
    fn test_overview_distribution_and_months() {
        let today = date(2026, 3, 15);
        let grades = vec![
            mark(1, 10.0, date(2026, 3, 2)),
            mark(2, 9.5, date(2026, 3, 3)),
            mark(3, 4.0, date(2026, 1, 20)),
            mark(4, 1.0, date(2025, 6, 1)),
            grade(5, GradeKind::Absence, None, date(2026, 3, 4)),
            grade(6, GradeKind::ExcusedAbsence, None, date(2026, 3, 5)),
        ];
        let result = overview(&grades, today);

        assert_eq!(result.marks, 4);
        assert_eq!(result.distribution[9], 1);
        assert_eq!(result.distribution[8], 1);
        assert_eq!(result.distribution[3], 1);
        assert_eq!(result.distribution[0], 1);

        assert_eq!(result.months.len(), 6);
        assert_eq!((result.months[0].year, result.months[0].month), (2025, 10));
        let march = result.months.last().unwrap();
        assert_eq!((march.year, march.month, march.marks), (2026, 3, 2));
        assert_eq!(march.mean, Some(9.75));
        assert_eq!(result.months[3].marks, 1);
        assert_eq!(result.months[2].mean, None);

        assert_eq!(
            result.absences,
            AbsenceSummary {
                total: 2,
                excused: 1,
                unexcused: 1,
                lates: 0
            }
        );
    }

    #[test_log::test]
    fn test_marks_needed() {
        assert_eq!(marks_needed(9.0, None, 0), 1);
        assert_eq!(marks_needed(8.0, Some(8.5), 4), 0);
        // 2 marks averaging 8: one 10 gives 8.67, two give 9.0.
        assert_eq!(marks_needed(9.0, Some(8.0), 2), 2);
        // A perfect 10 is unreachable with a lower mean.
        assert_eq!(marks_needed(10.0, Some(9.0), 5), 11);
    }

    #[test_log::test]
    fn test_goal_helpers() {
        let goal = GradeGoalRecord {
            goal_id: 1,
            user_id: 1,
            subject_id: 1,
            semester_id: 1,
            target_average: 9.0,
            description: String::new(),
            reached: false,
            reached_on: None,
        };
        assert!(goal_reached(&goal, Some(9.0)));
        assert!(!goal_reached(&goal, Some(8.9)));
        assert!(!goal_reached(&goal, None));
        assert_eq!(goal_gap(9.0, Some(8.5)), 0.5);
        assert_eq!(goal_gap(9.0, None), 9.0);
        assert!(validate_goal(10.0).is_ok());
        assert!(validate_goal(10.5).is_err());
    }

    #[test_log::test]
    fn test_goal_stats_use_the_goal_semester() {
        let goal = GradeGoalRecord {
            goal_id: 1,
            user_id: 1,
            subject_id: 1,
            semester_id: 7,
            target_average: 8.0,
            description: String::new(),
            reached: false,
            reached_on: None,
        };
        let spring = GradeRecord {
            semester: 2,
            ..mark(3, 5.0, date(2025, 3, 3))
        };
        let other_subject = GradeRecord {
            subject_id: 2,
            semester: 2,
            ..mark(4, 10.0, date(2025, 3, 4))
        };
        let grades = vec![
            mark(1, 10.0, date(2024, 10, 1)),
            mark(2, 10.0, date(2024, 11, 1)),
            spring,
            other_subject,
        ];

        let all_year = subject_stats(&grades[..3]);
        assert!(goal_reached(&goal, all_year.mean));

        let stats = goal_stats(&goal, Some(2), &grades);
        assert_eq!(stats.marks, 1);
        assert_eq!(stats.mean, Some(5.0));
        assert!(!goal_reached(&goal, stats.mean));

        assert_eq!(goal_stats(&goal, Some(1), &grades).mean, Some(10.0));
        assert_eq!(goal_stats(&goal, None, &grades).marks, 0);
    }

    #[test_log::test]
    fn test_validate_grade() {
        assert_eq!(validate_grade(&draft(GradeKind::Mark, Some(7.5))), Ok(GradeKind::Mark));
        assert_eq!(
            validate_grade(&draft(GradeKind::Mark, None)),
            Err(ValidationError::MissingField("value"))
        );
        assert!(matches!(
            validate_grade(&draft(GradeKind::Mark, Some(0.5))),
            Err(ValidationError::OutOfRange { field: "value", .. })
        ));
        assert_eq!(
            validate_grade(&draft(GradeKind::Late, Some(5.0))),
            Err(ValidationError::UnexpectedValue)
        );

        let mut excused = draft(GradeKind::Absence, None);
        excused.excused = true;
        assert_eq!(validate_grade(&excused), Ok(GradeKind::ExcusedAbsence));

        let mut bad_semester = draft(GradeKind::Late, None);
        bad_semester.semester = 3;
        assert!(validate_grade(&bad_semester).is_err());
    }

    #[test_log::test]
    fn test_default_semester() {
        let first = default_semester(1, date(2025, 10, 1)).unwrap();
        assert_eq!(first.starts_on, date(2025, 9, 15));
        assert_eq!(first.ends_on, date(2026, 1, 31));
        assert_eq!(first.school_year, "2025-2026");
        assert!(validate_semester(&first).is_ok());

        let second = default_semester(2, date(2025, 10, 1)).unwrap();
        assert_eq!(second.starts_on, date(2025, 2, 1));
        assert_eq!(second.ends_on, date(2025, 6, 15));

        assert!(default_semester(3, date(2025, 10, 1)).is_none());
    }

    #[test_log::test]
    fn test_validate_semester_dates() {
        let mut draft = default_semester(1, date(2025, 10, 1)).unwrap();
        draft.ends_on = date(2025, 9, 1);
        assert!(matches!(
            validate_semester(&draft),
            Err(ValidationError::DateOrder { .. })
        ));
    }

    #[test_log::test]
    fn test_excuse_absence() {
        let today = date(2025, 11, 3);
        let mut absence = grade(1, GradeKind::Absence, None, date(2025, 11, 1));
        excuse_absence(&mut absence, today).unwrap();
        assert_eq!(absence.kind, GradeKind::ExcusedAbsence);
        assert!(absence.excused);
        assert_eq!(absence.excused_on, Some(today));

        assert_eq!(
            excuse_absence(&mut absence, today),
            Err(ValidationError::NotAnAbsence)
        );
        let mut late = grade(2, GradeKind::Late, None, today);
        assert!(excuse_absence(&mut late, today).is_err());
    }
}
