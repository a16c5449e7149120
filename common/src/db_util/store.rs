//! Postgres implementation of the propagation storage seam.

use super::*;
use crate::propagation::{PersonalLesson, ScheduleStore};

pub struct PgScheduleStore<'a> {
    conn: &'a mut PgConnection,
}

impl<'a> PgScheduleStore<'a> {
    pub fn new(conn: &'a mut PgConnection) -> Self {
        Self { conn }
    }
}

impl ScheduleStore for PgScheduleStore<'_> {
    fn class_students(&mut self, class_room_id: u32) -> Result<Vec<u32>, String> {
        get_class_student_ids(self.conn, class_room_id)
    }

    fn class_template(
        &mut self,
        class_room_id: u32,
    ) -> Result<Vec<ClassScheduleEntryRecord>, String> {
        get_class_template(self.conn, class_room_id)
    }

    fn ensure_subject(&mut self, user_id: u32, name: &str, color: &str) -> Result<u32, String> {
        subjects::ensure_subject(self.conn, user_id, name, color)
    }

    fn upsert_lesson(&mut self, user_id: u32, lesson: &PersonalLesson) -> Result<(), String> {
        upsert_schedule_entry(self.conn, user_id, lesson).map(|_| ())
    }

    fn remove_lesson(&mut self, user_id: u32, weekday: u8, slot: u32) -> Result<usize, String> {
        delete_schedule_slot(self.conn, user_id, weekday, slot)
    }

    fn clear_schedule(&mut self, user_id: u32) -> Result<usize, String> {
        schedule::clear_schedule(self.conn, user_id)
    }

    fn has_schedule(&mut self, user_id: u32) -> Result<bool, String> {
        get_schedule_for_user(self.conn, user_id, None).map(|entries| !entries.is_empty())
    }
}
