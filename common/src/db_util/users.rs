use super::*;

table! {
    users (id) {
        id -> Integer,
        username -> Varchar,
        email -> Varchar,
        first_name -> Varchar,
        last_name -> Varchar,
        role -> Varchar,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

table! {
    user_activity (user_id, day) {
        user_id -> Integer,
        day -> Date,
    }
}

#[derive(Queryable)]
#[diesel(table_name = users)]
struct UserPrivate {
    id: i32,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    role: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = users)]
struct UserPrivateNew {
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    role: String,
}

#[derive(Insertable)]
#[diesel(table_name = user_activity)]
struct ActivityPrivateNew {
    user_id: i32,
    day: NaiveDate,
}

fn private_to_public(p: UserPrivate) -> Result<UserRecord, String> {
    use conversions::*;
    Ok(UserRecord {
        user_id: i32_to_u32(p.id)?,
        username: p.username,
        email: p.email,
        first_name: p.first_name,
        last_name: p.last_name,
        role: parse_label(&p.role)?,
        is_active: p.is_active,
        created_at: p.created_at,
    })
}

fn build_new_row(registration: &Registration) -> UserPrivateNew {
    UserPrivateNew {
        username: registration.username.trim().to_string(),
        email: registration.email.trim().to_string(),
        first_name: registration.first_name.trim().to_string(),
        last_name: registration.last_name.trim().to_string(),
        role: UserRole::Student.as_str().to_string(),
    }
}

/// Create a student account together with its profile.
pub fn insert_student(
    conn: &mut PgConnection,
    registration: &Registration,
) -> Result<(UserRecord, ProfileRecord), String> {
    use self::users::dsl::*;

    let insert_row = build_new_row(registration);

    conn.transaction(|conn| {
        let user: UserPrivate = diesel::insert_into(users)
            .values(&insert_row)
            .get_result(conn)?;
        let profile = insert_profile_row(conn, user.id, registration.class_room_id)?;
        Ok::<_, diesel::result::Error>((user, profile))
    })
    .map_err(|err| err.to_string())
    .and_then(|(user, profile)| Ok((private_to_public(user)?, profile)))
}

pub fn get_user_by_id(conn: &mut PgConnection, row_id: u32) -> Result<Option<UserRecord>, String> {
    use self::users::dsl::*;

    let row_id = conversions::u32_to_i32(row_id)?;

    users
        .filter(id.eq(row_id))
        .first::<UserPrivate>(conn)
        .optional()
        .map_err(|err| err.to_string())?
        .map(private_to_public)
        .transpose()
}

pub fn username_or_email_taken(
    conn: &mut PgConnection,
    input_username: &str,
    input_email: &str,
) -> Result<bool, String> {
    use self::users::dsl::*;

    diesel::select(diesel::dsl::exists(
        users.filter(
            username
                .eq(input_username.trim())
                .or(email.eq(input_email.trim())),
        ),
    ))
    .get_result(conn)
    .map_err(|err| err.to_string())
}

pub fn get_users_by_ids(
    conn: &mut PgConnection,
    row_ids: &[u32],
) -> Result<Vec<UserRecord>, String> {
    use self::users::dsl::*;

    let row_ids = row_ids
        .iter()
        .map(|i| conversions::u32_to_i32(*i))
        .collect::<Result<Vec<i32>, String>>()?;

    users
        .filter(id.eq_any(row_ids))
        .order(id.asc())
        .load::<UserPrivate>(conn)
        .map_err(|err| err.to_string())?
        .into_iter()
        .map(private_to_public)
        .collect()
}

pub fn get_admins(conn: &mut PgConnection) -> Result<Vec<UserRecord>, String> {
    use self::users::dsl::*;

    users
        .filter(role.eq_any([UserRole::Admin.as_str(), UserRole::Superadmin.as_str()]))
        .filter(is_active.eq(true))
        .order(id.asc())
        .load::<UserPrivate>(conn)
        .map_err(|err| err.to_string())?
        .into_iter()
        .map(private_to_public)
        .collect()
}

pub fn count_active_superadmins(conn: &mut PgConnection) -> Result<usize, String> {
    use self::users::dsl::*;

    let count: i64 = users
        .filter(role.eq(UserRole::Superadmin.as_str()))
        .filter(is_active.eq(true))
        .count()
        .get_result(conn)
        .map_err(|err| err.to_string())?;
    conversions::i64_to_usize(count)
}

pub fn update_user_role(
    conn: &mut PgConnection,
    row_id: u32,
    new_role: UserRole,
) -> Result<UserRecord, String> {
    use self::users::dsl::*;

    let row_id = conversions::u32_to_i32(row_id)?;

    diesel::update(users.filter(id.eq(row_id)))
        .set(role.eq(new_role.as_str()))
        .get_result(conn)
        .map_err(|err| err.to_string())
        .and_then(private_to_public)
}

pub fn deactivate_user(conn: &mut PgConnection, row_id: u32) -> Result<UserRecord, String> {
    use self::users::dsl::*;

    let row_id = conversions::u32_to_i32(row_id)?;

    diesel::update(users.filter(id.eq(row_id)))
        .set(is_active.eq(false))
        .get_result(conn)
        .map_err(|err| err.to_string())
        .and_then(private_to_public)
}

/// Record that the user was active on `today`.
/// Returns true the first time a day is recorded.
pub fn record_activity(
    conn: &mut PgConnection,
    input_user_id: u32,
    today: NaiveDate,
) -> Result<bool, String> {
    use self::user_activity::dsl::*;

    let insert_row = ActivityPrivateNew {
        user_id: conversions::u32_to_i32(input_user_id)?,
        day: today,
    };

    let inserted = diesel::insert_into(user_activity)
        .values(&insert_row)
        .on_conflict_do_nothing()
        .execute(conn)
        .map_err(|err| err.to_string())?;
    Ok(inserted > 0)
}

pub fn count_active_days(conn: &mut PgConnection, input_user_id: u32) -> Result<usize, String> {
    use self::user_activity::dsl::*;

    let input_user_id = conversions::u32_to_i32(input_user_id)?;

    let count: i64 = user_activity
        .filter(user_id.eq(input_user_id))
        .count()
        .get_result(conn)
        .map_err(|err| err.to_string())?;
    conversions::i64_to_usize(count)
}
