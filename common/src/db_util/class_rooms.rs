use super::*;

table! {
    class_rooms (id) {
        id -> Integer,
        name -> Varchar,
        school -> Varchar,
        county -> Varchar,
        head_teacher_id -> Nullable<Integer>,
        description -> Varchar,
    }
}

table! {
    class_schedule_entries (id) {
        id -> Integer,
        class_room_id -> Integer,
        weekday -> Integer,
        slot -> Integer,
        start_time -> Time,
        end_time -> Time,
        subject_name -> Varchar,
        subject_color -> Varchar,
        room -> Varchar,
        notes -> Varchar,
        kind -> Varchar,
    }
}

#[derive(Queryable)]
#[diesel(table_name = class_rooms)]
struct ClassRoomPrivate {
    id: i32,
    name: String,
    school: String,
    county: String,
    head_teacher_id: Option<i32>,
    description: String,
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = class_rooms)]
#[diesel(treat_none_as_null = true)]
struct ClassRoomPrivateNew {
    name: String,
    school: String,
    county: String,
    head_teacher_id: Option<i32>,
    description: String,
}

#[derive(Queryable)]
#[diesel(table_name = class_schedule_entries)]
struct ClassEntryPrivate {
    id: i32,
    class_room_id: i32,
    weekday: i32,
    slot: i32,
    start_time: NaiveTime,
    end_time: NaiveTime,
    subject_name: String,
    subject_color: String,
    room: String,
    notes: String,
    kind: String,
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = class_schedule_entries)]
struct ClassEntryPrivateNew {
    class_room_id: i32,
    weekday: i32,
    slot: i32,
    start_time: NaiveTime,
    end_time: NaiveTime,
    subject_name: String,
    subject_color: String,
    room: String,
    notes: String,
    kind: String,
}

fn class_to_public(p: ClassRoomPrivate) -> Result<ClassRoomRecord, String> {
    use conversions::*;
    Ok(ClassRoomRecord {
        class_room_id: i32_to_u32(p.id)?,
        name: p.name,
        school: p.school,
        county: p.county,
        head_teacher_id: opti32_to_optu32(p.head_teacher_id)?,
        description: p.description,
    })
}

fn build_class_row(draft: &ClassRoomDraft) -> Result<ClassRoomPrivateNew, String> {
    use conversions::*;
    Ok(ClassRoomPrivateNew {
        name: draft.name.trim().to_string(),
        school: draft.school.clone(),
        county: draft.county.clone(),
        head_teacher_id: optu32_to_opti32(draft.head_teacher_id)?,
        description: draft.description.clone(),
    })
}

fn entry_to_public(p: ClassEntryPrivate) -> Result<ClassScheduleEntryRecord, String> {
    use conversions::*;
    Ok(ClassScheduleEntryRecord {
        entry_id: i32_to_u32(p.id)?,
        class_room_id: i32_to_u32(p.class_room_id)?,
        weekday: i32_to_u8(p.weekday)?,
        slot: i32_to_u32(p.slot)?,
        start: p.start_time,
        end: p.end_time,
        subject_name: p.subject_name,
        subject_color: p.subject_color,
        room: p.room,
        notes: p.notes,
        kind: parse_label(&p.kind)?,
    })
}

fn build_entry_row(
    class_id: u32,
    draft: &ClassScheduleEntryDraft,
) -> Result<ClassEntryPrivateNew, String> {
    use conversions::*;
    Ok(ClassEntryPrivateNew {
        class_room_id: u32_to_i32(class_id)?,
        weekday: u8_to_i32(draft.weekday),
        slot: u32_to_i32(draft.slot)?,
        start_time: draft.start,
        end_time: draft.end,
        subject_name: draft.subject_name.trim().to_string(),
        subject_color: draft
            .subject_color
            .clone()
            .unwrap_or_else(|| DEFAULT_SUBJECT_COLOR.to_string()),
        room: draft.room.clone(),
        notes: draft.notes.clone(),
        kind: draft.kind.as_str().to_string(),
    })
}

pub fn insert_class_room(
    conn: &mut PgConnection,
    draft: &ClassRoomDraft,
) -> Result<ClassRoomRecord, String> {
    use self::class_rooms::dsl::*;

    let insert_row = build_class_row(draft)?;

    diesel::insert_into(class_rooms)
        .values(&insert_row)
        .get_result(conn)
        .map_err(|err| err.to_string())
        .and_then(class_to_public)
}

pub fn get_class_room(
    conn: &mut PgConnection,
    row_id: u32,
) -> Result<Option<ClassRoomRecord>, String> {
    use self::class_rooms::dsl::*;

    let row_id = conversions::u32_to_i32(row_id)?;

    class_rooms
        .filter(id.eq(row_id))
        .first::<ClassRoomPrivate>(conn)
        .optional()
        .map_err(|err| err.to_string())?
        .map(class_to_public)
        .transpose()
}

pub fn get_all_class_rooms(conn: &mut PgConnection) -> Result<Vec<ClassRoomRecord>, String> {
    use self::class_rooms::dsl::*;

    class_rooms
        .order(name.asc())
        .load::<ClassRoomPrivate>(conn)
        .map_err(|err| err.to_string())?
        .into_iter()
        .map(class_to_public)
        .collect()
}

pub fn update_class_room(
    conn: &mut PgConnection,
    row_id: u32,
    draft: &ClassRoomDraft,
) -> Result<ClassRoomRecord, String> {
    use self::class_rooms::dsl::*;

    let row_id = conversions::u32_to_i32(row_id)?;
    let update_row = build_class_row(draft)?;

    diesel::update(class_rooms.filter(id.eq(row_id)))
        .set(&update_row)
        .get_result(conn)
        .map_err(|err| err.to_string())
        .and_then(class_to_public)
}

/// Delete a class. Its template goes with it and students keep their personal schedules.
pub fn delete_class_room(conn: &mut PgConnection, row_id: u32) -> Result<bool, String> {
    use self::class_rooms::dsl::*;

    let row_id = conversions::u32_to_i32(row_id)?;

    diesel::delete(class_rooms.filter(id.eq(row_id)))
        .execute(conn)
        .map(|n| n > 0)
        .map_err(|err| err.to_string())
}

pub fn insert_class_entry(
    conn: &mut PgConnection,
    class_id: u32,
    draft: &ClassScheduleEntryDraft,
) -> Result<ClassScheduleEntryRecord, String> {
    use self::class_schedule_entries::dsl::*;

    let insert_row = build_entry_row(class_id, draft)?;

    diesel::insert_into(class_schedule_entries)
        .values(&insert_row)
        .get_result(conn)
        .map_err(|err| err.to_string())
        .and_then(entry_to_public)
}

pub fn get_class_entry(
    conn: &mut PgConnection,
    class_id: u32,
    row_id: u32,
) -> Result<Option<ClassScheduleEntryRecord>, String> {
    use self::class_schedule_entries::dsl::*;

    let class_id = conversions::u32_to_i32(class_id)?;
    let row_id = conversions::u32_to_i32(row_id)?;

    class_schedule_entries
        .filter(id.eq(row_id))
        .filter(class_room_id.eq(class_id))
        .first::<ClassEntryPrivate>(conn)
        .optional()
        .map_err(|err| err.to_string())?
        .map(entry_to_public)
        .transpose()
}

/// Template of a class ordered by weekday and slot.
pub fn get_class_template(
    conn: &mut PgConnection,
    class_id: u32,
) -> Result<Vec<ClassScheduleEntryRecord>, String> {
    use self::class_schedule_entries::dsl::*;

    let class_id = conversions::u32_to_i32(class_id)?;

    class_schedule_entries
        .filter(class_room_id.eq(class_id))
        .order((weekday.asc(), slot.asc()))
        .load::<ClassEntryPrivate>(conn)
        .map_err(|err| err.to_string())?
        .into_iter()
        .map(entry_to_public)
        .collect()
}

pub fn update_class_entry(
    conn: &mut PgConnection,
    class_id: u32,
    row_id: u32,
    draft: &ClassScheduleEntryDraft,
) -> Result<ClassScheduleEntryRecord, String> {
    use self::class_schedule_entries::dsl::*;

    let row_id = conversions::u32_to_i32(row_id)?;
    let update_row = build_entry_row(class_id, draft)?;

    diesel::update(
        class_schedule_entries
            .filter(id.eq(row_id))
            .filter(class_room_id.eq(update_row.class_room_id)),
    )
    .set(&update_row)
    .get_result(conn)
    .map_err(|err| err.to_string())
    .and_then(entry_to_public)
}

pub fn delete_class_entry(
    conn: &mut PgConnection,
    class_id: u32,
    row_id: u32,
) -> Result<bool, String> {
    use self::class_schedule_entries::dsl::*;

    let class_id = conversions::u32_to_i32(class_id)?;
    let row_id = conversions::u32_to_i32(row_id)?;

    diesel::delete(
        class_schedule_entries
            .filter(id.eq(row_id))
            .filter(class_room_id.eq(class_id)),
    )
    .execute(conn)
    .map(|n| n > 0)
    .map_err(|err| err.to_string())
}

/// Replace the whole template of a class in one transaction.
pub fn replace_class_template(
    conn: &mut PgConnection,
    class_id: u32,
    drafts: &[ClassScheduleEntryDraft],
) -> Result<Vec<ClassScheduleEntryRecord>, String> {
    use self::class_schedule_entries::dsl::*;

    let insert_rows = drafts
        .iter()
        .map(|draft| build_entry_row(class_id, draft))
        .collect::<Result<Vec<ClassEntryPrivateNew>, String>>()?;
    let class_id = conversions::u32_to_i32(class_id)?;

    let rows: Vec<ClassEntryPrivate> = conn
        .transaction(|conn| {
            diesel::delete(class_schedule_entries.filter(class_room_id.eq(class_id)))
                .execute(conn)?;
            diesel::insert_into(class_schedule_entries)
                .values(&insert_rows)
                .get_results(conn)
        })
        .map_err(|err: diesel::result::Error| err.to_string())?;

    rows.into_iter().map(entry_to_public).collect()
}
