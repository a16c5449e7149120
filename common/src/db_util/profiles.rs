use super::*;
use diesel::result::Error as DieselError;

table! {
    student_profiles (user_id) {
        user_id -> Integer,
        class_label -> Varchar,
        class_room_id -> Nullable<Integer>,
        school -> Varchar,
        parent_phone -> Varchar,
        parent_email -> Varchar,
        day_start -> Time,
        lesson_minutes -> Integer,
        break_minutes -> Integer,
        lessons_per_day -> Integer,
        homework_reminders -> Bool,
        grade_notifications -> Bool,
        reminder_days_ahead -> Integer,
        approved -> Bool,
        approved_at -> Nullable<Timestamptz>,
        approved_by -> Nullable<Integer>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

#[derive(Queryable, Insertable, AsChangeset)]
#[diesel(table_name = student_profiles)]
#[diesel(treat_none_as_null = true)]
struct ProfilePrivate {
    user_id: i32,
    class_label: String,
    class_room_id: Option<i32>,
    school: String,
    parent_phone: String,
    parent_email: String,
    day_start: NaiveTime,
    lesson_minutes: i32,
    break_minutes: i32,
    lessons_per_day: i32,
    homework_reminders: bool,
    grade_notifications: bool,
    reminder_days_ahead: i32,
    approved: bool,
    approved_at: Option<DateTime<Utc>>,
    approved_by: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn private_to_public(p: ProfilePrivate) -> Result<ProfileRecord, String> {
    use conversions::*;
    Ok(ProfileRecord {
        user_id: i32_to_u32(p.user_id)?,
        class_label: p.class_label,
        class_room_id: opti32_to_optu32(p.class_room_id)?,
        school: p.school,
        parent_phone: p.parent_phone,
        parent_email: p.parent_email,
        day_start: p.day_start,
        lesson_minutes: i32_to_u32(p.lesson_minutes)?,
        break_minutes: i32_to_u32(p.break_minutes)?,
        lessons_per_day: i32_to_u32(p.lessons_per_day)?,
        homework_reminders: p.homework_reminders,
        grade_notifications: p.grade_notifications,
        reminder_days_ahead: i32_to_u32(p.reminder_days_ahead)?,
        approved: p.approved,
        approved_at: p.approved_at,
        approved_by: opti32_to_optu32(p.approved_by)?,
        created_at: p.created_at,
        updated_at: p.updated_at,
    })
}

fn public_to_private(p: &ProfileRecord) -> Result<ProfilePrivate, String> {
    use conversions::*;
    Ok(ProfilePrivate {
        user_id: u32_to_i32(p.user_id)?,
        class_label: p.class_label.clone(),
        class_room_id: optu32_to_opti32(p.class_room_id)?,
        school: p.school.clone(),
        parent_phone: p.parent_phone.clone(),
        parent_email: p.parent_email.clone(),
        day_start: p.day_start,
        lesson_minutes: u32_to_i32(p.lesson_minutes)?,
        break_minutes: u32_to_i32(p.break_minutes)?,
        lessons_per_day: u32_to_i32(p.lessons_per_day)?,
        homework_reminders: p.homework_reminders,
        grade_notifications: p.grade_notifications,
        reminder_days_ahead: u32_to_i32(p.reminder_days_ahead)?,
        approved: p.approved,
        approved_at: p.approved_at,
        approved_by: optu32_to_opti32(p.approved_by)?,
        created_at: p.created_at,
        updated_at: p.updated_at,
    })
}

/// Insert the default profile of a new user. Runs inside the registration transaction.
pub(super) fn insert_profile_row(
    conn: &mut PgConnection,
    new_user_id: i32,
    class_room: Option<u32>,
) -> QueryResult<ProfileRecord> {
    let user_id = conversions::i32_to_u32(new_user_id)
        .map_err(|e| DieselError::SerializationError(e.into()))?;
    let profile = crate::accounts::default_profile(user_id, class_room, Utc::now());
    let insert_row =
        public_to_private(&profile).map_err(|e| DieselError::SerializationError(e.into()))?;

    diesel::insert_into(student_profiles::table)
        .values(&insert_row)
        .get_result(conn)
        .and_then(|p| {
            private_to_public(p).map_err(|e| DieselError::DeserializationError(e.into()))
        })
}

pub fn get_profile(conn: &mut PgConnection, row_id: u32) -> Result<Option<ProfileRecord>, String> {
    use self::student_profiles::dsl::*;

    let row_id = conversions::u32_to_i32(row_id)?;

    student_profiles
        .filter(user_id.eq(row_id))
        .first::<ProfilePrivate>(conn)
        .optional()
        .map_err(|err| err.to_string())?
        .map(private_to_public)
        .transpose()
}

pub fn update_profile(
    conn: &mut PgConnection,
    update_row: &ProfileRecord,
) -> Result<ProfileRecord, String> {
    use self::student_profiles::dsl::*;

    let update_row = public_to_private(update_row)?;

    diesel::update(student_profiles.filter(user_id.eq(update_row.user_id)))
        .set(&update_row)
        .get_result(conn)
        .map_err(|err| err.to_string())
        .and_then(private_to_public)
}

/// Students of a class, by user id.
pub fn get_class_student_ids(conn: &mut PgConnection, class_id: u32) -> Result<Vec<u32>, String> {
    use self::student_profiles::dsl::*;

    let class_id = conversions::u32_to_i32(class_id)?;

    student_profiles
        .filter(class_room_id.eq(class_id))
        .select(user_id)
        .order(user_id.asc())
        .load::<i32>(conn)
        .map_err(|err| err.to_string())?
        .into_iter()
        .map(conversions::i32_to_u32)
        .collect()
}

/// Profiles awaiting approval, oldest first.
pub fn get_pending_profiles(conn: &mut PgConnection) -> Result<Vec<ProfileRecord>, String> {
    use self::student_profiles::dsl::*;

    student_profiles
        .filter(approved.eq(false))
        .order(created_at.asc())
        .load::<ProfilePrivate>(conn)
        .map_err(|err| err.to_string())?
        .into_iter()
        .map(private_to_public)
        .collect()
}

