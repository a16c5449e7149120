//! Replication of class schedule templates into students' personal schedules.
//!
//! The class template is the source of truth for the lessons it defines. Every
//! student of the class gets a personal copy keyed by `(user, weekday, slot)`,
//! pointing at the student's own subject of the same name (created on demand).
//!
//! Propagation is best-effort per student: a failure for one student is logged
//! and counted in the report, the remaining students are still updated.

use crate::{
    ClassScheduleEntryDraft, ClassScheduleEntryRecord, LessonKind, ScheduleEntryRecord,
    SubjectRecord,
};
use chrono::NaiveTime;
use log::{debug, warn};
use serde::Serialize;

/// Personal lesson derived from a class template entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonalLesson {
    pub subject_id: u32,
    pub weekday: u8,
    pub slot: u32,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub room: String,
    pub notes: String,
    pub kind: LessonKind,
}

impl PersonalLesson {
    pub fn from_class_entry(entry: &ClassScheduleEntryRecord, subject_id: u32) -> Self {
        Self {
            subject_id,
            weekday: entry.weekday,
            slot: entry.slot,
            start: entry.start,
            end: entry.end,
            room: entry.room.clone(),
            notes: entry.notes.clone(),
            kind: entry.kind,
        }
    }
}

/// Storage operations propagation needs. Implemented over Postgres in `db_util`.
pub trait ScheduleStore {
    /// Users whose profile points at the class.
    fn class_students(&mut self, class_room_id: u32) -> Result<Vec<u32>, String>;

    /// Template lessons of the class, ordered by weekday and slot.
    fn class_template(&mut self, class_room_id: u32)
    -> Result<Vec<ClassScheduleEntryRecord>, String>;

    /// Id of the user's subject with this name, creating it with the colour if missing.
    fn ensure_subject(&mut self, user_id: u32, name: &str, color: &str) -> Result<u32, String>;

    /// Insert or replace the user's lesson at `(weekday, slot)`.
    fn upsert_lesson(&mut self, user_id: u32, lesson: &PersonalLesson) -> Result<(), String>;

    /// Remove the user's lesson at `(weekday, slot)`, returning the number of rows removed.
    fn remove_lesson(&mut self, user_id: u32, weekday: u8, slot: u32) -> Result<usize, String>;

    /// Remove every lesson of the user.
    fn clear_schedule(&mut self, user_id: u32) -> Result<usize, String>;

    fn has_schedule(&mut self, user_id: u32) -> Result<bool, String>;
}

/// Outcome of one propagation run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PropagationReport {
    pub students: usize,
    pub applied: usize,
    pub failed: usize,
}

impl PropagationReport {
    /// Fold another run over the same class into this report.
    pub fn merge(self, run: PropagationReport) -> PropagationReport {
        PropagationReport {
            students: self.students.max(run.students),
            applied: self.applied + run.applied,
            failed: self.failed + run.failed,
        }
    }
}

fn copy_entry<S: ScheduleStore>(
    store: &mut S,
    user_id: u32,
    entry: &ClassScheduleEntryRecord,
) -> Result<(), String> {
    let subject_id = store.ensure_subject(user_id, &entry.subject_name, &entry.subject_color)?;
    let lesson = PersonalLesson::from_class_entry(entry, subject_id);
    store.upsert_lesson(user_id, &lesson)
}

/// Push a created or edited template entry to every student of its class.
///
/// `previous_key` is the `(weekday, slot)` the entry had before an edit. When it
/// differs from the current key the students' rows at the old key are removed first.
pub fn propagate_entry<S: ScheduleStore>(
    store: &mut S,
    entry: &ClassScheduleEntryRecord,
    previous_key: Option<(u8, u32)>,
) -> Result<PropagationReport, String> {
    let students = store.class_students(entry.class_room_id)?;
    let moved_from = previous_key.filter(|key| *key != (entry.weekday, entry.slot));
    let mut report = PropagationReport {
        students: students.len(),
        ..Default::default()
    };

    for user_id in students {
        let result = match moved_from {
            Some((weekday, slot)) => store
                .remove_lesson(user_id, weekday, slot)
                .and_then(|_| copy_entry(store, user_id, entry)),
            None => copy_entry(store, user_id, entry),
        };
        match result {
            Ok(()) => report.applied += 1,
            Err(e) => {
                report.failed += 1;
                warn!(
                    "Could not propagate class entry #{} to user #{user_id}: {e}",
                    entry.entry_id
                );
            }
        }
    }

    debug!(
        "Propagated class entry #{}: {report:?}",
        entry.entry_id
    );
    Ok(report)
}

/// Remove a deleted template entry from every student of its class.
pub fn retract_entry<S: ScheduleStore>(
    store: &mut S,
    entry: &ClassScheduleEntryRecord,
) -> Result<PropagationReport, String> {
    let students = store.class_students(entry.class_room_id)?;
    let mut report = PropagationReport {
        students: students.len(),
        ..Default::default()
    };

    for user_id in students {
        match store.remove_lesson(user_id, entry.weekday, entry.slot) {
            Ok(_) => report.applied += 1,
            Err(e) => {
                report.failed += 1;
                warn!(
                    "Could not remove class entry #{} from user #{user_id}: {e}",
                    entry.entry_id
                );
            }
        }
    }
    Ok(report)
}

/// Push a replaced template to the class: keys of `previous` that `current`
/// no longer defines are removed from every student, then each current entry
/// is propagated. Lessons students added themselves are left alone.
pub fn propagate_replacement<S: ScheduleStore>(
    store: &mut S,
    previous: &[ClassScheduleEntryRecord],
    current: &[ClassScheduleEntryRecord],
) -> Result<PropagationReport, String> {
    let mut report = PropagationReport::default();
    for old in previous {
        let kept = current
            .iter()
            .any(|entry| (entry.weekday, entry.slot) == (old.weekday, old.slot));
        if !kept {
            report = report.merge(retract_entry(store, old)?);
        }
    }
    for entry in current {
        report = report.merge(propagate_entry(store, entry, None)?);
    }
    Ok(report)
}

/// Copy the whole class template into one student's schedule.
/// Entries that fail are skipped. Returns the number of lessons written.
pub fn apply_template<S: ScheduleStore>(
    store: &mut S,
    class_room_id: u32,
    user_id: u32,
) -> Result<usize, String> {
    let template = store.class_template(class_room_id)?;
    let mut written = 0;
    for entry in &template {
        match copy_entry(store, user_id, entry) {
            Ok(()) => written += 1,
            Err(e) => warn!(
                "Skipping class entry #{} for user #{user_id}: {e}",
                entry.entry_id
            ),
        }
    }
    Ok(written)
}

/// First class assignment of a new student: the template is copied only when
/// the student has no lessons yet.
pub fn seed_new_student<S: ScheduleStore>(
    store: &mut S,
    class_room_id: u32,
    user_id: u32,
) -> Result<usize, String> {
    if store.has_schedule(user_id)? {
        return Ok(0);
    }
    apply_template(store, class_room_id, user_id)
}

/// A student moved between classes (or left one): clear the personal schedule
/// and copy the new class template, if any. Nothing happens when the class is unchanged.
pub fn reassign_student<S: ScheduleStore>(
    store: &mut S,
    user_id: u32,
    previous_class: Option<u32>,
    current_class: Option<u32>,
) -> Result<usize, String> {
    if previous_class == current_class {
        return Ok(0);
    }
    store.clear_schedule(user_id)?;
    match current_class {
        Some(class_room_id) => apply_template(store, class_room_id, user_id),
        None => Ok(0),
    }
}

/// Template rows built from one student's personal schedule.
/// Lessons whose subject is unknown are left out.
pub fn template_from_personal(
    entries: &[ScheduleEntryRecord],
    subjects: &[SubjectRecord],
) -> Vec<ClassScheduleEntryDraft> {
    entries
        .iter()
        .filter_map(|entry| {
            let subject = subjects.iter().find(|s| s.subject_id == entry.subject_id)?;
            Some(ClassScheduleEntryDraft {
                weekday: entry.weekday,
                slot: entry.slot,
                start: entry.start,
                end: entry.end,
                subject_name: subject.name.clone(),
                subject_color: Some(subject.color.clone()),
                room: entry.room.clone(),
                notes: entry.notes.clone(),
                kind: entry.kind,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap, HashSet};

    #[derive(Default)]
    struct MemoryStore {
        class_of: HashMap<u32, u32>,
        templates: HashMap<u32, Vec<ClassScheduleEntryRecord>>,
        subjects: HashMap<(u32, String), (u32, String)>,
        lessons: BTreeMap<(u32, u8, u32), PersonalLesson>,
        broken_users: HashSet<u32>,
        next_subject_id: u32,
    }

    impl ScheduleStore for MemoryStore {
        fn class_students(&mut self, class_room_id: u32) -> Result<Vec<u32>, String> {
            let mut users: Vec<u32> = self
                .class_of
                .iter()
                .filter(|(_, class)| **class == class_room_id)
                .map(|(user, _)| *user)
                .collect();
            users.sort();
            Ok(users)
        }

        fn class_template(
            &mut self,
            class_room_id: u32,
        ) -> Result<Vec<ClassScheduleEntryRecord>, String> {
            Ok(self.templates.get(&class_room_id).cloned().unwrap_or_default())
        }

        fn ensure_subject(&mut self, user_id: u32, name: &str, color: &str) -> Result<u32, String> {
            if self.broken_users.contains(&user_id) {
                return Err("subject table unavailable".to_string());
            }
            let key = (user_id, name.to_string());
            if let Some((id, _)) = self.subjects.get(&key) {
                return Ok(*id);
            }
            self.next_subject_id += 1;
            self.subjects
                .insert(key, (self.next_subject_id, color.to_string()));
            Ok(self.next_subject_id)
        }

        fn upsert_lesson(&mut self, user_id: u32, lesson: &PersonalLesson) -> Result<(), String> {
            self.lessons
                .insert((user_id, lesson.weekday, lesson.slot), lesson.clone());
            Ok(())
        }

        fn remove_lesson(&mut self, user_id: u32, weekday: u8, slot: u32) -> Result<usize, String> {
            Ok(self
                .lessons
                .remove(&(user_id, weekday, slot))
                .map_or(0, |_| 1))
        }

        fn clear_schedule(&mut self, user_id: u32) -> Result<usize, String> {
            let before = self.lessons.len();
            self.lessons.retain(|(user, _, _), _| *user != user_id);
            Ok(before - self.lessons.len())
        }

        fn has_schedule(&mut self, user_id: u32) -> Result<bool, String> {
            Ok(self.lessons.keys().any(|(user, _, _)| *user == user_id))
        }
    }

    fn class_entry(entry_id: u32, weekday: u8, slot: u32, subject: &str) -> ClassScheduleEntryRecord {
        let start = NaiveTime::from_hms_opt(7 + slot, 0, 0).unwrap();
        let end = NaiveTime::from_hms_opt(7 + slot, 50, 0).unwrap();
        ClassScheduleEntryRecord {
            entry_id,
            class_room_id: 10,
            weekday,
            slot,
            start,
            end,
            subject_name: subject.to_string(),
            subject_color: "#ff0000".to_string(),
            room: "A1".to_string(),
            notes: String::new(),
            kind: LessonKind::Normal,
        }
    }

    fn personal(subject_id: u32, weekday: u8, slot: u32) -> PersonalLesson {
        PersonalLesson {
            subject_id,
            weekday,
            slot,
            start: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(14, 50, 0).unwrap(),
            room: String::new(),
            notes: String::new(),
            kind: LessonKind::Optional,
        }
    }

    fn store_with_class(users: &[u32]) -> MemoryStore {
        let mut store = MemoryStore::default();
        for user in users {
            store.class_of.insert(*user, 10);
        }
        store
    }

    #[test_log::test]
    fn test_propagate_creates_subject_and_lesson_for_each_student() {
        let mut store = store_with_class(&[1, 2]);
        let entry = class_entry(1, 1, 1, "Mathematics");

        let report = propagate_entry(&mut store, &entry, None).unwrap();

        assert_eq!(
            report,
            PropagationReport {
                students: 2,
                applied: 2,
                failed: 0
            }
        );
        assert!(store.lessons.contains_key(&(1, 1, 1)));
        assert!(store.lessons.contains_key(&(2, 1, 1)));
        let (_, color) = &store.subjects[&(1, "Mathematics".to_string())];
        assert_eq!(color, "#ff0000");
    }

    #[test_log::test]
    fn test_propagate_reuses_existing_subject() {
        let mut store = store_with_class(&[1]);
        let existing = store.ensure_subject(1, "Mathematics", "#000000").unwrap();

        propagate_entry(&mut store, &class_entry(1, 1, 1, "Mathematics"), None).unwrap();

        assert_eq!(store.lessons[&(1, 1, 1)].subject_id, existing);
        assert_eq!(store.subjects.len(), 1);
    }

    #[test_log::test]
    fn test_propagate_upserts_same_slot() {
        let mut store = store_with_class(&[1]);
        propagate_entry(&mut store, &class_entry(1, 2, 3, "Biology"), None).unwrap();
        propagate_entry(&mut store, &class_entry(1, 2, 3, "Chemistry"), Some((2, 3))).unwrap();

        assert_eq!(store.lessons.len(), 1);
        let chemistry = store.subjects[&(1, "Chemistry".to_string())].0;
        assert_eq!(store.lessons[&(1, 2, 3)].subject_id, chemistry);
    }

    #[test_log::test]
    fn test_propagate_moves_lesson_when_key_changes() {
        let mut store = store_with_class(&[1, 2]);
        propagate_entry(&mut store, &class_entry(1, 1, 1, "History"), None).unwrap();

        let moved = class_entry(1, 3, 4, "History");
        let report = propagate_entry(&mut store, &moved, Some((1, 1))).unwrap();

        assert_eq!(report.applied, 2);
        assert!(!store.lessons.contains_key(&(1, 1, 1)));
        assert!(!store.lessons.contains_key(&(2, 1, 1)));
        assert!(store.lessons.contains_key(&(1, 3, 4)));
        assert!(store.lessons.contains_key(&(2, 3, 4)));
    }

    #[test_log::test]
    fn test_propagate_failure_does_not_stop_other_students() {
        let mut store = store_with_class(&[1, 2, 3]);
        store.broken_users.insert(2);

        let report = propagate_entry(&mut store, &class_entry(1, 1, 1, "Music"), None).unwrap();

        assert_eq!(
            report,
            PropagationReport {
                students: 3,
                applied: 2,
                failed: 1
            }
        );
        assert!(store.lessons.contains_key(&(1, 1, 1)));
        assert!(!store.lessons.contains_key(&(2, 1, 1)));
        assert!(store.lessons.contains_key(&(3, 1, 1)));
    }

    #[test_log::test]
    fn test_retract_removes_only_matching_slot_of_class_students() {
        let mut store = store_with_class(&[1]);
        store.class_of.insert(5, 99);
        propagate_entry(&mut store, &class_entry(1, 1, 1, "Art"), None).unwrap();
        propagate_entry(&mut store, &class_entry(2, 1, 2, "Sport"), None).unwrap();
        store.upsert_lesson(5, &PersonalLesson::from_class_entry(&class_entry(9, 1, 1, "Art"), 1))
            .unwrap();

        let report = retract_entry(&mut store, &class_entry(1, 1, 1, "Art")).unwrap();

        assert_eq!(report.students, 1);
        assert!(!store.lessons.contains_key(&(1, 1, 1)));
        assert!(store.lessons.contains_key(&(1, 1, 2)));
        assert!(store.lessons.contains_key(&(5, 1, 1)));
    }

    #[test_log::test]
    fn test_reassign_clears_and_applies_new_template() {
        let mut store = MemoryStore::default();
        store.templates.insert(
            20,
            vec![class_entry(1, 1, 1, "Physics"), class_entry(2, 2, 2, "Latin")],
        );
        store
            .upsert_lesson(4, &PersonalLesson::from_class_entry(&class_entry(3, 5, 5, "Old"), 1))
            .unwrap();

        let written = reassign_student(&mut store, 4, Some(10), Some(20)).unwrap();

        assert_eq!(written, 2);
        assert!(!store.lessons.contains_key(&(4, 5, 5)));
        assert!(store.lessons.contains_key(&(4, 1, 1)));
        assert!(store.lessons.contains_key(&(4, 2, 2)));
    }

    #[test_log::test]
    fn test_reassign_same_class_is_a_no_op() {
        let mut store = MemoryStore::default();
        store
            .upsert_lesson(4, &PersonalLesson::from_class_entry(&class_entry(3, 5, 5, "Old"), 1))
            .unwrap();

        assert_eq!(reassign_student(&mut store, 4, Some(10), Some(10)).unwrap(), 0);
        assert!(store.lessons.contains_key(&(4, 5, 5)));
    }

    #[test_log::test]
    fn test_reassign_to_no_class_only_clears() {
        let mut store = MemoryStore::default();
        store
            .upsert_lesson(4, &PersonalLesson::from_class_entry(&class_entry(3, 5, 5, "Old"), 1))
            .unwrap();

        assert_eq!(reassign_student(&mut store, 4, Some(10), None).unwrap(), 0);
        assert!(store.lessons.is_empty());
    }

    #[test_log::test]
    fn test_seed_new_student_keeps_existing_schedule() {
        let mut store = MemoryStore::default();
        store
            .templates
            .insert(10, vec![class_entry(1, 1, 1, "Physics")]);
        store
            .upsert_lesson(4, &PersonalLesson::from_class_entry(&class_entry(3, 5, 5, "Own"), 1))
            .unwrap();

        assert_eq!(seed_new_student(&mut store, 10, 4).unwrap(), 0);
        assert_eq!(seed_new_student(&mut store, 10, 8).unwrap(), 1);
        assert!(!store.lessons.contains_key(&(4, 1, 1)));
        assert!(store.lessons.contains_key(&(8, 1, 1)));
    }

    #[test_log::test]
    fn test_template_from_personal() {
        let lesson = |entry_id, subject_id, slot| ScheduleEntryRecord {
            entry_id,
            user_id: 4,
            subject_id,
            weekday: 2,
            slot,
            start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(8, 50, 0).unwrap(),
            room: "B2".to_string(),
            notes: String::new(),
            kind: LessonKind::Optional,
        };
        let subject = SubjectRecord {
            subject_id: 7,
            user_id: 4,
            name: "Chemistry".to_string(),
            teacher_name: String::new(),
            room: String::new(),
            color: "#00ff00".to_string(),
            description: String::new(),
            textbook: String::new(),
            active: true,
            rating: 3,
        };

        let drafts = template_from_personal(&[lesson(1, 7, 1), lesson(2, 99, 2)], &[subject]);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].subject_name, "Chemistry");
        assert_eq!(drafts[0].subject_color.as_deref(), Some("#00ff00"));
        assert_eq!(drafts[0].kind, LessonKind::Optional);
        assert_eq!((drafts[0].weekday, drafts[0].slot), (2, 1));
    }

    #[test_log::test]
    fn test_merge_reports() {
        let first = PropagationReport {
            students: 3,
            applied: 3,
            failed: 0,
        };
        let second = PropagationReport {
            students: 3,
            applied: 2,
            failed: 1,
        };
        assert_eq!(
            PropagationReport::default().merge(first).merge(second),
            PropagationReport {
                students: 3,
                applied: 5,
                failed: 1,
            }
        );
    }

    #[test_log::test]
    fn test_replacement_drops_slots_missing_from_new_template() {
        let mut store = store_with_class(&[1, 2]);
        let previous = vec![
            class_entry(1, 1, 1, "Mathematics"),
            class_entry(2, 1, 2, "Biology"),
        ];
        for entry in &previous {
            propagate_entry(&mut store, entry, None).unwrap();
        }
        store.upsert_lesson(1, &personal(99, 1, 7)).unwrap();
        assert_eq!(store.lessons.len(), 5);

        let current = vec![class_entry(3, 1, 1, "Physics")];
        let report = propagate_replacement(&mut store, &previous, &current).unwrap();

        assert_eq!(
            report,
            PropagationReport {
                students: 2,
                applied: 4,
                failed: 0,
            }
        );
        assert!(!store.lessons.contains_key(&(1, 1, 2)));
        assert!(!store.lessons.contains_key(&(2, 1, 2)));
        let physics = store.subjects[&(2, "Physics".to_string())].0;
        assert_eq!(store.lessons[&(2, 1, 1)].subject_id, physics);
        assert_eq!(store.lessons[&(1, 1, 7)].subject_id, 99);
        assert_eq!(store.lessons.len(), 3);
    }
}
