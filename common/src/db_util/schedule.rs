use super::*;
use crate::propagation::PersonalLesson;

table! {
    schedule_entries (id) {
        id -> Integer,
        user_id -> Integer,
        subject_id -> Integer,
        weekday -> Integer,
        slot -> Integer,
        start_time -> Time,
        end_time -> Time,
        room -> Varchar,
        notes -> Varchar,
        kind -> Varchar,
    }
}

table! {
    schedule_changes (id) {
        id -> Integer,
        user_id -> Integer,
        entry_id -> Integer,
        kind -> Varchar,
        starts_on -> Date,
        ends_on -> Nullable<Date>,
        reason -> Varchar,
        new_start -> Nullable<Time>,
        new_end -> Nullable<Time>,
        new_room -> Varchar,
        new_subject_id -> Nullable<Integer>,
        substitute_teacher -> Varchar,
    }
}

#[derive(Queryable)]
#[diesel(table_name = schedule_entries)]
struct EntryPrivate {
    id: i32,
    user_id: i32,
    subject_id: i32,
    weekday: i32,
    slot: i32,
    start_time: NaiveTime,
    end_time: NaiveTime,
    room: String,
    notes: String,
    kind: String,
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = schedule_entries)]
struct EntryPrivateNew {
    user_id: i32,
    subject_id: i32,
    weekday: i32,
    slot: i32,
    start_time: NaiveTime,
    end_time: NaiveTime,
    room: String,
    notes: String,
    kind: String,
}

#[derive(Queryable)]
#[diesel(table_name = schedule_changes)]
struct ChangePrivate {
    id: i32,
    user_id: i32,
    entry_id: i32,
    kind: String,
    starts_on: NaiveDate,
    ends_on: Option<NaiveDate>,
    reason: String,
    new_start: Option<NaiveTime>,
    new_end: Option<NaiveTime>,
    new_room: String,
    new_subject_id: Option<i32>,
    substitute_teacher: String,
}

#[derive(Insertable)]
#[diesel(table_name = schedule_changes)]
struct ChangePrivateNew {
    user_id: i32,
    entry_id: i32,
    kind: String,
    starts_on: NaiveDate,
    ends_on: Option<NaiveDate>,
    reason: String,
    new_start: Option<NaiveTime>,
    new_end: Option<NaiveTime>,
    new_room: String,
    new_subject_id: Option<i32>,
    substitute_teacher: String,
}

fn entry_to_public(p: EntryPrivate) -> Result<ScheduleEntryRecord, String> {
    use conversions::*;
    Ok(ScheduleEntryRecord {
        entry_id: i32_to_u32(p.id)?,
        user_id: i32_to_u32(p.user_id)?,
        subject_id: i32_to_u32(p.subject_id)?,
        weekday: i32_to_u8(p.weekday)?,
        slot: i32_to_u32(p.slot)?,
        start: p.start_time,
        end: p.end_time,
        room: p.room,
        notes: p.notes,
        kind: parse_label(&p.kind)?,
    })
}

/// Row for a lesson whose times are already resolved.
fn build_entry_row(owner: u32, lesson: &PersonalLesson) -> Result<EntryPrivateNew, String> {
    use conversions::*;
    Ok(EntryPrivateNew {
        user_id: u32_to_i32(owner)?,
        subject_id: u32_to_i32(lesson.subject_id)?,
        weekday: u8_to_i32(lesson.weekday),
        slot: u32_to_i32(lesson.slot)?,
        start_time: lesson.start,
        end_time: lesson.end,
        room: lesson.room.clone(),
        notes: lesson.notes.clone(),
        kind: lesson.kind.as_str().to_string(),
    })
}

fn change_to_public(p: ChangePrivate) -> Result<ScheduleChangeRecord, String> {
    use conversions::*;
    Ok(ScheduleChangeRecord {
        change_id: i32_to_u32(p.id)?,
        user_id: i32_to_u32(p.user_id)?,
        entry_id: i32_to_u32(p.entry_id)?,
        kind: parse_label(&p.kind)?,
        starts_on: p.starts_on,
        ends_on: p.ends_on,
        reason: p.reason,
        new_start: p.new_start,
        new_end: p.new_end,
        new_room: p.new_room,
        new_subject_id: opti32_to_optu32(p.new_subject_id)?,
        substitute_teacher: p.substitute_teacher,
    })
}

fn build_change_row(owner: u32, draft: &ScheduleChangeDraft) -> Result<ChangePrivateNew, String> {
    use conversions::*;
    Ok(ChangePrivateNew {
        user_id: u32_to_i32(owner)?,
        entry_id: u32_to_i32(draft.entry_id)?,
        kind: draft.kind.as_str().to_string(),
        starts_on: draft.starts_on,
        ends_on: draft.ends_on,
        reason: draft.reason.clone(),
        new_start: draft.new_start,
        new_end: draft.new_end,
        new_room: draft.new_room.clone(),
        new_subject_id: optu32_to_opti32(draft.new_subject_id)?,
        substitute_teacher: draft.substitute_teacher.clone(),
    })
}

pub fn insert_schedule_entry(
    conn: &mut PgConnection,
    owner: u32,
    lesson: &PersonalLesson,
) -> Result<ScheduleEntryRecord, String> {
    use self::schedule_entries::dsl::*;

    let insert_row = build_entry_row(owner, lesson)?;

    diesel::insert_into(schedule_entries)
        .values(&insert_row)
        .get_result(conn)
        .map_err(|err| err.to_string())
        .and_then(entry_to_public)
}

/// Insert or replace the lesson at the user's `(weekday, slot)`.
pub fn upsert_schedule_entry(
    conn: &mut PgConnection,
    owner: u32,
    lesson: &PersonalLesson,
) -> Result<ScheduleEntryRecord, String> {
    use self::schedule_entries::dsl::*;

    let insert_row = build_entry_row(owner, lesson)?;

    diesel::insert_into(schedule_entries)
        .values(&insert_row)
        .on_conflict((user_id, weekday, slot))
        .do_update()
        .set(&insert_row)
        .get_result(conn)
        .map_err(|err| err.to_string())
        .and_then(entry_to_public)
}

pub fn get_schedule_entry(
    conn: &mut PgConnection,
    owner: u32,
    row_id: u32,
) -> Result<Option<ScheduleEntryRecord>, String> {
    use self::schedule_entries::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;
    let row_id = conversions::u32_to_i32(row_id)?;

    schedule_entries
        .filter(id.eq(row_id))
        .filter(user_id.eq(owner))
        .first::<EntryPrivate>(conn)
        .optional()
        .map_err(|err| err.to_string())?
        .map(entry_to_public)
        .transpose()
}

/// Lessons of a user ordered by weekday and slot, optionally for a single day.
pub fn get_schedule_for_user(
    conn: &mut PgConnection,
    owner: u32,
    day: Option<u8>,
) -> Result<Vec<ScheduleEntryRecord>, String> {
    use self::schedule_entries::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;

    let mut query = schedule_entries.filter(user_id.eq(owner)).into_boxed();
    if let Some(day) = day {
        query = query.filter(weekday.eq(conversions::u8_to_i32(day)));
    }

    query
        .order((weekday.asc(), slot.asc()))
        .load::<EntryPrivate>(conn)
        .map_err(|err| err.to_string())?
        .into_iter()
        .map(entry_to_public)
        .collect()
}

pub fn count_lessons_for_subject(
    conn: &mut PgConnection,
    owner: u32,
    subject: u32,
) -> Result<usize, String> {
    use self::schedule_entries::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;
    let subject = conversions::u32_to_i32(subject)?;

    let count: i64 = schedule_entries
        .filter(user_id.eq(owner))
        .filter(subject_id.eq(subject))
        .count()
        .get_result(conn)
        .map_err(|err| err.to_string())?;
    conversions::i64_to_usize(count)
}

pub fn update_schedule_entry(
    conn: &mut PgConnection,
    owner: u32,
    row_id: u32,
    lesson: &PersonalLesson,
) -> Result<ScheduleEntryRecord, String> {
    use self::schedule_entries::dsl::*;

    let row_id = conversions::u32_to_i32(row_id)?;
    let update_row = build_entry_row(owner, lesson)?;

    diesel::update(
        schedule_entries
            .filter(id.eq(row_id))
            .filter(user_id.eq(update_row.user_id)),
    )
    .set(&update_row)
    .get_result(conn)
    .map_err(|err| err.to_string())
    .and_then(entry_to_public)
}

pub fn delete_schedule_entry(
    conn: &mut PgConnection,
    owner: u32,
    row_id: u32,
) -> Result<bool, String> {
    use self::schedule_entries::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;
    let row_id = conversions::u32_to_i32(row_id)?;

    diesel::delete(schedule_entries.filter(id.eq(row_id)).filter(user_id.eq(owner)))
        .execute(conn)
        .map(|n| n > 0)
        .map_err(|err| err.to_string())
}

pub fn delete_schedule_slot(
    conn: &mut PgConnection,
    owner: u32,
    day: u8,
    lesson_slot: u32,
) -> Result<usize, String> {
    use self::schedule_entries::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;
    let lesson_slot = conversions::u32_to_i32(lesson_slot)?;

    diesel::delete(
        schedule_entries
            .filter(user_id.eq(owner))
            .filter(weekday.eq(conversions::u8_to_i32(day)))
            .filter(slot.eq(lesson_slot)),
    )
    .execute(conn)
    .map_err(|err| err.to_string())
}

pub fn clear_schedule(conn: &mut PgConnection, owner: u32) -> Result<usize, String> {
    use self::schedule_entries::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;

    diesel::delete(schedule_entries.filter(user_id.eq(owner)))
        .execute(conn)
        .map_err(|err| err.to_string())
}

pub fn insert_schedule_change(
    conn: &mut PgConnection,
    owner: u32,
    draft: &ScheduleChangeDraft,
) -> Result<ScheduleChangeRecord, String> {
    use self::schedule_changes::dsl::*;

    let insert_row = build_change_row(owner, draft)?;

    diesel::insert_into(schedule_changes)
        .values(&insert_row)
        .get_result(conn)
        .map_err(|err| err.to_string())
        .and_then(change_to_public)
}

/// Changes of a user, newest start first.
pub fn get_schedule_changes(
    conn: &mut PgConnection,
    owner: u32,
) -> Result<Vec<ScheduleChangeRecord>, String> {
    use self::schedule_changes::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;

    schedule_changes
        .filter(user_id.eq(owner))
        .order((starts_on.desc(), id.desc()))
        .load::<ChangePrivate>(conn)
        .map_err(|err| err.to_string())?
        .into_iter()
        .map(change_to_public)
        .collect()
}

/// Changes in effect on `day`.
pub fn get_active_schedule_changes(
    conn: &mut PgConnection,
    owner: u32,
    day: NaiveDate,
) -> Result<Vec<ScheduleChangeRecord>, String> {
    use self::schedule_changes::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;

    schedule_changes
        .filter(user_id.eq(owner))
        .filter(starts_on.le(day))
        .filter(ends_on.is_null().or(ends_on.ge(day)))
        .order(id.asc())
        .load::<ChangePrivate>(conn)
        .map_err(|err| err.to_string())?
        .into_iter()
        .map(change_to_public)
        .collect()
}

pub fn delete_schedule_change(
    conn: &mut PgConnection,
    owner: u32,
    row_id: u32,
) -> Result<bool, String> {
    use self::schedule_changes::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;
    let row_id = conversions::u32_to_i32(row_id)?;

    diesel::delete(schedule_changes.filter(id.eq(row_id)).filter(user_id.eq(owner)))
        .execute(conn)
        .map(|n| n > 0)
        .map_err(|err| err.to_string())
}
