use super::*;

table! {
    subjects (id) {
        id -> Integer,
        user_id -> Integer,
        name -> Varchar,
        teacher_name -> Varchar,
        room -> Varchar,
        color -> Varchar,
        description -> Varchar,
        textbook -> Varchar,
        active -> Bool,
        rating -> Integer,
    }
}

#[derive(Queryable)]
#[diesel(table_name = subjects)]
struct SubjectPrivate {
    id: i32,
    user_id: i32,
    name: String,
    teacher_name: String,
    room: String,
    color: String,
    description: String,
    textbook: String,
    active: bool,
    rating: i32,
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = subjects)]
struct SubjectPrivateNew {
    user_id: i32,
    name: String,
    teacher_name: String,
    room: String,
    color: String,
    description: String,
    textbook: String,
    active: bool,
    rating: i32,
}

fn private_to_public(p: SubjectPrivate) -> Result<SubjectRecord, String> {
    use conversions::*;
    Ok(SubjectRecord {
        subject_id: i32_to_u32(p.id)?,
        user_id: i32_to_u32(p.user_id)?,
        name: p.name,
        teacher_name: p.teacher_name,
        room: p.room,
        color: p.color,
        description: p.description,
        textbook: p.textbook,
        active: p.active,
        rating: i32_to_u8(p.rating)?,
    })
}

fn build_new_row(owner: u32, draft: &SubjectDraft) -> Result<SubjectPrivateNew, String> {
    use conversions::*;
    Ok(SubjectPrivateNew {
        user_id: u32_to_i32(owner)?,
        name: draft.name.trim().to_string(),
        teacher_name: draft.teacher_name.clone(),
        room: draft.room.clone(),
        color: draft
            .color
            .clone()
            .unwrap_or_else(|| DEFAULT_SUBJECT_COLOR.to_string()),
        description: draft.description.clone(),
        textbook: draft.textbook.clone(),
        active: draft.active,
        rating: u8_to_i32(draft.rating),
    })
}

pub fn insert_subject(
    conn: &mut PgConnection,
    owner: u32,
    draft: &SubjectDraft,
) -> Result<SubjectRecord, String> {
    use self::subjects::dsl::*;

    let insert_row = build_new_row(owner, draft)?;

    diesel::insert_into(subjects)
        .values(&insert_row)
        .get_result(conn)
        .map_err(|err| err.to_string())
        .and_then(private_to_public)
}

/// Look up a subject owned by `owner`. Other users' subjects are reported as missing.
pub fn get_subject(
    conn: &mut PgConnection,
    owner: u32,
    row_id: u32,
) -> Result<Option<SubjectRecord>, String> {
    use self::subjects::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;
    let row_id = conversions::u32_to_i32(row_id)?;

    subjects
        .filter(id.eq(row_id))
        .filter(user_id.eq(owner))
        .first::<SubjectPrivate>(conn)
        .optional()
        .map_err(|err| err.to_string())?
        .map(private_to_public)
        .transpose()
}

pub fn get_subject_by_name(
    conn: &mut PgConnection,
    owner: u32,
    subject_name: &str,
) -> Result<Option<SubjectRecord>, String> {
    use self::subjects::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;

    subjects
        .filter(user_id.eq(owner))
        .filter(name.eq(subject_name.trim()))
        .first::<SubjectPrivate>(conn)
        .optional()
        .map_err(|err| err.to_string())?
        .map(private_to_public)
        .transpose()
}

/// Subjects of a user ordered by name. Inactive ones only when asked for.
pub fn get_subjects_for_user(
    conn: &mut PgConnection,
    owner: u32,
    include_inactive: bool,
) -> Result<Vec<SubjectRecord>, String> {
    use self::subjects::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;

    let mut query = subjects.filter(user_id.eq(owner)).into_boxed();
    if !include_inactive {
        query = query.filter(active.eq(true));
    }

    query
        .order(name.asc())
        .load::<SubjectPrivate>(conn)
        .map_err(|err| err.to_string())?
        .into_iter()
        .map(private_to_public)
        .collect()
}

pub fn update_subject(
    conn: &mut PgConnection,
    owner: u32,
    row_id: u32,
    draft: &SubjectDraft,
) -> Result<SubjectRecord, String> {
    use self::subjects::dsl::*;

    let row_id = conversions::u32_to_i32(row_id)?;
    let update_row = build_new_row(owner, draft)?;

    diesel::update(
        subjects
            .filter(id.eq(row_id))
            .filter(user_id.eq(update_row.user_id)),
    )
    .set(&update_row)
    .get_result(conn)
    .map_err(|err| err.to_string())
    .and_then(private_to_public)
}

pub fn update_subject_rating(
    conn: &mut PgConnection,
    owner: u32,
    row_id: u32,
    new_rating: u8,
) -> Result<SubjectRecord, String> {
    use self::subjects::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;
    let row_id = conversions::u32_to_i32(row_id)?;

    diesel::update(subjects.filter(id.eq(row_id)).filter(user_id.eq(owner)))
        .set(rating.eq(conversions::u8_to_i32(new_rating)))
        .get_result(conn)
        .map_err(|err| err.to_string())
        .and_then(private_to_public)
}

/// Delete a subject. Lessons, homework and grades of the subject are removed by cascade.
pub fn delete_subject(conn: &mut PgConnection, owner: u32, row_id: u32) -> Result<bool, String> {
    use self::subjects::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;
    let row_id = conversions::u32_to_i32(row_id)?;

    diesel::delete(subjects.filter(id.eq(row_id)).filter(user_id.eq(owner)))
        .execute(conn)
        .map(|n| n > 0)
        .map_err(|err| err.to_string())
}

/// Id of the user's subject with this name, created with the colour when missing.
pub fn ensure_subject(
    conn: &mut PgConnection,
    owner: u32,
    subject_name: &str,
    subject_color: &str,
) -> Result<u32, String> {
    if let Some(existing) = get_subject_by_name(conn, owner, subject_name)? {
        return Ok(existing.subject_id);
    }
    let draft = SubjectDraft {
        name: subject_name.to_string(),
        teacher_name: String::new(),
        room: String::new(),
        color: Some(subject_color.to_string()),
        description: String::new(),
        textbook: String::new(),
        active: true,
        rating: DEFAULT_SUBJECT_RATING,
    };
    insert_subject(conn, owner, &draft).map(|s| s.subject_id)
}
