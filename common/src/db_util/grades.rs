use super::*;
use diesel::result::Error as DieselError;

table! {
    grades (id) {
        id -> Integer,
        user_id -> Integer,
        subject_id -> Integer,
        kind -> Varchar,
        value -> Nullable<Numeric>,
        assessment -> Nullable<Varchar>,
        description -> Varchar,
        graded_on -> Date,
        semester -> Integer,
        excused -> Bool,
        excused_on -> Nullable<Date>,
        notes -> Text,
        important -> Bool,
        created_at -> Timestamptz,
    }
}

table! {
    semesters (id) {
        id -> Integer,
        user_id -> Integer,
        number -> Integer,
        school_year -> Varchar,
        starts_on -> Date,
        ends_on -> Date,
        active -> Bool,
    }
}

table! {
    grade_goals (id) {
        id -> Integer,
        user_id -> Integer,
        subject_id -> Integer,
        semester_id -> Integer,
        target_average -> Numeric,
        description -> Varchar,
        reached -> Bool,
        reached_on -> Nullable<Date>,
    }
}

#[derive(Queryable)]
#[diesel(table_name = grades)]
struct GradePrivate {
    id: i32,
    user_id: i32,
    subject_id: i32,
    kind: String,
    value: Option<BigDecimal>,
    assessment: Option<String>,
    description: String,
    graded_on: NaiveDate,
    semester: i32,
    excused: bool,
    excused_on: Option<NaiveDate>,
    notes: String,
    important: bool,
    created_at: DateTime<Utc>,
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = grades)]
#[diesel(treat_none_as_null = true)]
struct GradePrivateNew {
    user_id: i32,
    subject_id: i32,
    kind: String,
    value: Option<BigDecimal>,
    assessment: Option<String>,
    description: String,
    graded_on: NaiveDate,
    semester: i32,
    excused: bool,
    excused_on: Option<NaiveDate>,
    notes: String,
    important: bool,
}

#[derive(Queryable)]
#[diesel(table_name = semesters)]
struct SemesterPrivate {
    id: i32,
    user_id: i32,
    number: i32,
    school_year: String,
    starts_on: NaiveDate,
    ends_on: NaiveDate,
    active: bool,
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = semesters)]
struct SemesterPrivateNew {
    user_id: i32,
    number: i32,
    school_year: String,
    starts_on: NaiveDate,
    ends_on: NaiveDate,
    active: bool,
}

#[derive(Queryable)]
#[diesel(table_name = grade_goals)]
struct GoalPrivate {
    id: i32,
    user_id: i32,
    subject_id: i32,
    semester_id: i32,
    target_average: BigDecimal,
    description: String,
    reached: bool,
    reached_on: Option<NaiveDate>,
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = grade_goals)]
#[diesel(treat_none_as_null = true)]
struct GoalPrivateNew {
    user_id: i32,
    subject_id: i32,
    semester_id: i32,
    target_average: BigDecimal,
    description: String,
    reached: bool,
    reached_on: Option<NaiveDate>,
}

fn grade_to_public(p: GradePrivate) -> Result<GradeRecord, String> {
    use conversions::*;
    Ok(GradeRecord {
        grade_id: i32_to_u32(p.id)?,
        user_id: i32_to_u32(p.user_id)?,
        subject_id: i32_to_u32(p.subject_id)?,
        kind: parse_label(&p.kind)?,
        value: optbigdec_to_optf64(p.value)?,
        assessment: parse_opt_label(p.assessment)?,
        description: p.description,
        date: p.graded_on,
        semester: i32_to_u8(p.semester)?,
        excused: p.excused,
        excused_on: p.excused_on,
        notes: p.notes,
        important: p.important,
        created_at: p.created_at,
    })
}

fn grade_to_private(p: &GradeRecord) -> Result<GradePrivateNew, String> {
    use conversions::*;
    Ok(GradePrivateNew {
        user_id: u32_to_i32(p.user_id)?,
        subject_id: u32_to_i32(p.subject_id)?,
        kind: p.kind.as_str().to_string(),
        value: optf64_to_optbigdec(p.value)?,
        assessment: p.assessment.map(|a| a.as_str().to_string()),
        description: p.description.clone(),
        graded_on: p.date,
        semester: u8_to_i32(p.semester),
        excused: p.excused,
        excused_on: p.excused_on,
        notes: p.notes.clone(),
        important: p.important,
    })
}

fn semester_to_public(p: SemesterPrivate) -> Result<SemesterRecord, String> {
    use conversions::*;
    Ok(SemesterRecord {
        semester_id: i32_to_u32(p.id)?,
        user_id: i32_to_u32(p.user_id)?,
        number: i32_to_u8(p.number)?,
        school_year: p.school_year,
        starts_on: p.starts_on,
        ends_on: p.ends_on,
        active: p.active,
    })
}

fn build_semester_row(owner: u32, draft: &SemesterDraft) -> Result<SemesterPrivateNew, String> {
    use conversions::*;
    Ok(SemesterPrivateNew {
        user_id: u32_to_i32(owner)?,
        number: u8_to_i32(draft.number),
        school_year: draft.school_year.trim().to_string(),
        starts_on: draft.starts_on,
        ends_on: draft.ends_on,
        active: draft.active,
    })
}

fn goal_to_public(p: GoalPrivate) -> Result<GradeGoalRecord, String> {
    use conversions::*;
    Ok(GradeGoalRecord {
        goal_id: i32_to_u32(p.id)?,
        user_id: i32_to_u32(p.user_id)?,
        subject_id: i32_to_u32(p.subject_id)?,
        semester_id: i32_to_u32(p.semester_id)?,
        target_average: bigdec_to_f64(&p.target_average)?,
        description: p.description,
        reached: p.reached,
        reached_on: p.reached_on,
    })
}

fn goal_to_private(p: &GradeGoalRecord) -> Result<GoalPrivateNew, String> {
    use conversions::*;
    Ok(GoalPrivateNew {
        user_id: u32_to_i32(p.user_id)?,
        subject_id: u32_to_i32(p.subject_id)?,
        semester_id: u32_to_i32(p.semester_id)?,
        target_average: f64_to_bigdec(p.target_average)?,
        description: p.description.clone(),
        reached: p.reached,
        reached_on: p.reached_on,
    })
}

/// Store a new grade. The record id and creation time are ignored.
pub fn insert_grade(conn: &mut PgConnection, record: &GradeRecord) -> Result<GradeRecord, String> {
    use self::grades::dsl::*;

    let insert_row = grade_to_private(record)?;

    diesel::insert_into(grades)
        .values(&insert_row)
        .get_result(conn)
        .map_err(|err| err.to_string())
        .and_then(grade_to_public)
}

pub fn get_grade(
    conn: &mut PgConnection,
    owner: u32,
    row_id: u32,
) -> Result<Option<GradeRecord>, String> {
    use self::grades::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;
    let row_id = conversions::u32_to_i32(row_id)?;

    grades
        .filter(id.eq(row_id))
        .filter(user_id.eq(owner))
        .first::<GradePrivate>(conn)
        .optional()
        .map_err(|err| err.to_string())?
        .map(grade_to_public)
        .transpose()
}

/// Filters for listing grades.
#[derive(Debug, Clone, Default)]
pub struct GradeFilter {
    pub subject_id: Option<u32>,
    pub semester: Option<u8>,
    pub kind: Option<GradeKind>,
    pub from: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
}

/// Grades of a user, newest first.
pub fn get_grades_for_user(
    conn: &mut PgConnection,
    owner: u32,
    filter: &GradeFilter,
) -> Result<Vec<GradeRecord>, String> {
    use self::grades::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;

    let mut query = grades.filter(user_id.eq(owner)).into_boxed();
    if let Some(subject) = filter.subject_id {
        query = query.filter(subject_id.eq(conversions::u32_to_i32(subject)?));
    }
    if let Some(number) = filter.semester {
        query = query.filter(semester.eq(conversions::u8_to_i32(number)));
    }
    if let Some(wanted) = filter.kind {
        query = query.filter(kind.eq(wanted.as_str()));
    }
    if let Some(from) = filter.from {
        query = query.filter(graded_on.ge(from));
    }
    if let Some(until) = filter.until {
        query = query.filter(graded_on.le(until));
    }

    query
        .order((graded_on.desc(), created_at.desc()))
        .load::<GradePrivate>(conn)
        .map_err(|err| err.to_string())?
        .into_iter()
        .map(grade_to_public)
        .collect()
}

pub fn update_grade(conn: &mut PgConnection, record: &GradeRecord) -> Result<GradeRecord, String> {
    use self::grades::dsl::*;

    let row_id = conversions::u32_to_i32(record.grade_id)?;
    let update_row = grade_to_private(record)?;

    diesel::update(
        grades
            .filter(id.eq(row_id))
            .filter(user_id.eq(update_row.user_id)),
    )
    .set(&update_row)
    .get_result(conn)
    .map_err(|err| err.to_string())
    .and_then(grade_to_public)
}

pub fn delete_grade(conn: &mut PgConnection, owner: u32, row_id: u32) -> Result<bool, String> {
    use self::grades::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;
    let row_id = conversions::u32_to_i32(row_id)?;

    diesel::delete(grades.filter(id.eq(row_id)).filter(user_id.eq(owner)))
        .execute(conn)
        .map(|n| n > 0)
        .map_err(|err| err.to_string())
}

pub fn insert_semester(
    conn: &mut PgConnection,
    owner: u32,
    draft: &SemesterDraft,
) -> Result<SemesterRecord, String> {
    use self::semesters::dsl::*;

    let insert_row = build_semester_row(owner, draft)?;

    diesel::insert_into(semesters)
        .values(&insert_row)
        .get_result(conn)
        .map_err(|err| err.to_string())
        .and_then(semester_to_public)
}

pub fn get_semester(
    conn: &mut PgConnection,
    owner: u32,
    row_id: u32,
) -> Result<Option<SemesterRecord>, String> {
    use self::semesters::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;
    let row_id = conversions::u32_to_i32(row_id)?;

    semesters
        .filter(id.eq(row_id))
        .filter(user_id.eq(owner))
        .first::<SemesterPrivate>(conn)
        .optional()
        .map_err(|err| err.to_string())?
        .map(semester_to_public)
        .transpose()
}

/// Semesters of a user, most recent first.
pub fn get_semesters_for_user(
    conn: &mut PgConnection,
    owner: u32,
) -> Result<Vec<SemesterRecord>, String> {
    use self::semesters::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;

    semesters
        .filter(user_id.eq(owner))
        .order((starts_on.desc(), id.desc()))
        .load::<SemesterPrivate>(conn)
        .map_err(|err| err.to_string())?
        .into_iter()
        .map(semester_to_public)
        .collect()
}

pub fn update_semester(
    conn: &mut PgConnection,
    owner: u32,
    row_id: u32,
    draft: &SemesterDraft,
) -> Result<SemesterRecord, String> {
    use self::semesters::dsl::*;

    let row_id = conversions::u32_to_i32(row_id)?;
    let update_row = build_semester_row(owner, draft)?;

    diesel::update(
        semesters
            .filter(id.eq(row_id))
            .filter(user_id.eq(update_row.user_id)),
    )
    .set(&update_row)
    .get_result(conn)
    .map_err(|err| err.to_string())
    .and_then(semester_to_public)
}

pub fn delete_semester(conn: &mut PgConnection, owner: u32, row_id: u32) -> Result<bool, String> {
    use self::semesters::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;
    let row_id = conversions::u32_to_i32(row_id)?;

    diesel::delete(semesters.filter(id.eq(row_id)).filter(user_id.eq(owner)))
        .execute(conn)
        .map(|n| n > 0)
        .map_err(|err| err.to_string())
}

/// Make one semester the active one. At most one semester per user is active.
pub fn activate_semester(
    conn: &mut PgConnection,
    owner: u32,
    row_id: u32,
) -> Result<SemesterRecord, String> {
    use self::semesters::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;
    let row_id = conversions::u32_to_i32(row_id)?;

    let row: SemesterPrivate = conn
        .transaction(|conn| {
            diesel::update(semesters.filter(user_id.eq(owner)).filter(id.ne(row_id)))
                .set(active.eq(false))
                .execute(conn)?;
            diesel::update(semesters.filter(id.eq(row_id)).filter(user_id.eq(owner)))
                .set(active.eq(true))
                .get_result(conn)
        })
        .map_err(|err: DieselError| err.to_string())?;

    semester_to_public(row)
}

/// The user's semester with this number, created with default dates when missing.
pub fn ensure_semester(
    conn: &mut PgConnection,
    owner: u32,
    semester_number: u8,
    today: NaiveDate,
) -> Result<SemesterRecord, String> {
    let owner_i32 = conversions::u32_to_i32(owner)?;

    let existing = {
        use self::semesters::dsl::*;
        semesters
            .filter(user_id.eq(owner_i32))
            .filter(number.eq(conversions::u8_to_i32(semester_number)))
            .order((active.desc(), starts_on.desc()))
            .first::<SemesterPrivate>(conn)
            .optional()
            .map_err(|err| err.to_string())?
    };
    if let Some(row) = existing {
        return semester_to_public(row);
    }

    let draft = crate::grade_stats::default_semester(semester_number, today)
        .ok_or_else(|| format!("semester {semester_number} has no default dates"))?;
    log::info!("Creating semester {semester_number} for user {owner}");
    insert_semester(conn, owner, &draft)
}

/// Store a new goal. The record id is ignored.
pub fn insert_goal(
    conn: &mut PgConnection,
    record: &GradeGoalRecord,
) -> Result<GradeGoalRecord, String> {
    use self::grade_goals::dsl::*;

    let insert_row = goal_to_private(record)?;

    diesel::insert_into(grade_goals)
        .values(&insert_row)
        .get_result(conn)
        .map_err(|err| err.to_string())
        .and_then(goal_to_public)
}

pub fn get_goal(
    conn: &mut PgConnection,
    owner: u32,
    row_id: u32,
) -> Result<Option<GradeGoalRecord>, String> {
    use self::grade_goals::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;
    let row_id = conversions::u32_to_i32(row_id)?;

    grade_goals
        .filter(id.eq(row_id))
        .filter(user_id.eq(owner))
        .first::<GoalPrivate>(conn)
        .optional()
        .map_err(|err| err.to_string())?
        .map(goal_to_public)
        .transpose()
}

pub fn get_goals_for_user(
    conn: &mut PgConnection,
    owner: u32,
) -> Result<Vec<GradeGoalRecord>, String> {
    use self::grade_goals::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;

    grade_goals
        .filter(user_id.eq(owner))
        .order(id.asc())
        .load::<GoalPrivate>(conn)
        .map_err(|err| err.to_string())?
        .into_iter()
        .map(goal_to_public)
        .collect()
}

pub fn update_goal(
    conn: &mut PgConnection,
    record: &GradeGoalRecord,
) -> Result<GradeGoalRecord, String> {
    use self::grade_goals::dsl::*;

    let row_id = conversions::u32_to_i32(record.goal_id)?;
    let update_row = goal_to_private(record)?;

    diesel::update(
        grade_goals
            .filter(id.eq(row_id))
            .filter(user_id.eq(update_row.user_id)),
    )
    .set(&update_row)
    .get_result(conn)
    .map_err(|err| err.to_string())
    .and_then(goal_to_public)
}

pub fn delete_goal(conn: &mut PgConnection, owner: u32, row_id: u32) -> Result<bool, String> {
    use self::grade_goals::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;
    let row_id = conversions::u32_to_i32(row_id)?;

    diesel::delete(grade_goals.filter(id.eq(row_id)).filter(user_id.eq(owner)))
        .execute(conn)
        .map(|n| n > 0)
        .map_err(|err| err.to_string())
}
