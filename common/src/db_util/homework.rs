use super::*;
use crate::notifications::NotificationDraft;

table! {
    homework (id) {
        id -> Integer,
        user_id -> Integer,
        subject_id -> Integer,
        title -> Varchar,
        description -> Text,
        pages -> Varchar,
        exercises -> Varchar,
        assigned_on -> Date,
        deadline -> Date,
        priority -> Varchar,
        difficulty -> Varchar,
        estimated_minutes -> Nullable<Integer>,
        worked_minutes -> Integer,
        progress -> Integer,
        completed -> Bool,
        completed_at -> Nullable<Timestamptz>,
        share_with_class -> Bool,
        shared_class_room_id -> Nullable<Integer>,
        shared_at -> Nullable<Timestamptz>,
        reminder_enabled -> Bool,
        reminder_days -> Integer,
        personal_notes -> Text,
    }
}

table! {
    homework_reminders (id) {
        id -> Integer,
        homework_id -> Integer,
        remind_on -> Date,
        remind_at -> Time,
        sent -> Bool,
        sent_at -> Nullable<Timestamptz>,
        custom_message -> Varchar,
    }
}

#[derive(Queryable)]
#[diesel(table_name = homework)]
struct HomeworkPrivate {
    id: i32,
    user_id: i32,
    subject_id: i32,
    title: String,
    description: String,
    pages: String,
    exercises: String,
    assigned_on: NaiveDate,
    deadline: NaiveDate,
    priority: String,
    difficulty: String,
    estimated_minutes: Option<i32>,
    worked_minutes: i32,
    progress: i32,
    completed: bool,
    completed_at: Option<DateTime<Utc>>,
    share_with_class: bool,
    shared_class_room_id: Option<i32>,
    shared_at: Option<DateTime<Utc>>,
    reminder_enabled: bool,
    reminder_days: i32,
    personal_notes: String,
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = homework)]
#[diesel(treat_none_as_null = true)]
struct HomeworkPrivateNew {
    user_id: i32,
    subject_id: i32,
    title: String,
    description: String,
    pages: String,
    exercises: String,
    assigned_on: NaiveDate,
    deadline: NaiveDate,
    priority: String,
    difficulty: String,
    estimated_minutes: Option<i32>,
    worked_minutes: i32,
    progress: i32,
    completed: bool,
    completed_at: Option<DateTime<Utc>>,
    share_with_class: bool,
    shared_class_room_id: Option<i32>,
    shared_at: Option<DateTime<Utc>>,
    reminder_enabled: bool,
    reminder_days: i32,
    personal_notes: String,
}

#[derive(Queryable)]
#[diesel(table_name = homework_reminders)]
struct ReminderPrivate {
    id: i32,
    homework_id: i32,
    remind_on: NaiveDate,
    remind_at: NaiveTime,
    sent: bool,
    sent_at: Option<DateTime<Utc>>,
    custom_message: String,
}

#[derive(Insertable)]
#[diesel(table_name = homework_reminders)]
struct ReminderPrivateNew {
    homework_id: i32,
    remind_on: NaiveDate,
    remind_at: NaiveTime,
}

fn private_to_public(p: HomeworkPrivate) -> Result<HomeworkRecord, String> {
    use conversions::*;
    Ok(HomeworkRecord {
        homework_id: i32_to_u32(p.id)?,
        user_id: i32_to_u32(p.user_id)?,
        subject_id: i32_to_u32(p.subject_id)?,
        title: p.title,
        description: p.description,
        pages: p.pages,
        exercises: p.exercises,
        assigned_on: p.assigned_on,
        deadline: p.deadline,
        priority: parse_label(&p.priority)?,
        difficulty: parse_label(&p.difficulty)?,
        estimated_minutes: opti32_to_optu32(p.estimated_minutes)?,
        worked_minutes: i32_to_u32(p.worked_minutes)?,
        progress: i32_to_u8(p.progress)?,
        completed: p.completed,
        completed_at: p.completed_at,
        share_with_class: p.share_with_class,
        shared_class_room_id: opti32_to_optu32(p.shared_class_room_id)?,
        shared_at: p.shared_at,
        reminder_enabled: p.reminder_enabled,
        reminder_days: i32_to_u32(p.reminder_days)?,
        personal_notes: p.personal_notes,
    })
}

fn public_to_private(p: &HomeworkRecord) -> Result<HomeworkPrivateNew, String> {
    use conversions::*;
    Ok(HomeworkPrivateNew {
        user_id: u32_to_i32(p.user_id)?,
        subject_id: u32_to_i32(p.subject_id)?,
        title: p.title.clone(),
        description: p.description.clone(),
        pages: p.pages.clone(),
        exercises: p.exercises.clone(),
        assigned_on: p.assigned_on,
        deadline: p.deadline,
        priority: p.priority.as_str().to_string(),
        difficulty: p.difficulty.as_str().to_string(),
        estimated_minutes: optu32_to_opti32(p.estimated_minutes)?,
        worked_minutes: u32_to_i32(p.worked_minutes)?,
        progress: u8_to_i32(p.progress),
        completed: p.completed,
        completed_at: p.completed_at,
        share_with_class: p.share_with_class,
        shared_class_room_id: optu32_to_opti32(p.shared_class_room_id)?,
        shared_at: p.shared_at,
        reminder_enabled: p.reminder_enabled,
        reminder_days: u32_to_i32(p.reminder_days)?,
        personal_notes: p.personal_notes.clone(),
    })
}

fn reminder_to_public(p: ReminderPrivate) -> Result<HomeworkReminderRecord, String> {
    use conversions::*;
    Ok(HomeworkReminderRecord {
        reminder_id: i32_to_u32(p.id)?,
        homework_id: i32_to_u32(p.homework_id)?,
        remind_on: p.remind_on,
        remind_at: p.remind_at,
        sent: p.sent,
        sent_at: p.sent_at,
        custom_message: p.custom_message,
    })
}

/// Store a new homework. The record id is ignored.
pub fn insert_homework(
    conn: &mut PgConnection,
    record: &HomeworkRecord,
) -> Result<HomeworkRecord, String> {
    use self::homework::dsl::*;

    let insert_row = public_to_private(record)?;

    diesel::insert_into(homework)
        .values(&insert_row)
        .get_result(conn)
        .map_err(|err| err.to_string())
        .and_then(private_to_public)
}

pub fn get_homework(
    conn: &mut PgConnection,
    owner: u32,
    row_id: u32,
) -> Result<Option<HomeworkRecord>, String> {
    use self::homework::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;
    let row_id = conversions::u32_to_i32(row_id)?;

    homework
        .filter(id.eq(row_id))
        .filter(user_id.eq(owner))
        .first::<HomeworkPrivate>(conn)
        .optional()
        .map_err(|err| err.to_string())?
        .map(private_to_public)
        .transpose()
}

pub fn get_homework_by_ids(
    conn: &mut PgConnection,
    row_ids: &[u32],
) -> Result<Vec<HomeworkRecord>, String> {
    use self::homework::dsl::*;

    let row_ids = row_ids
        .iter()
        .map(|i| conversions::u32_to_i32(*i))
        .collect::<Result<Vec<i32>, String>>()?;

    homework
        .filter(id.eq_any(row_ids))
        .load::<HomeworkPrivate>(conn)
        .map_err(|err| err.to_string())?
        .into_iter()
        .map(private_to_public)
        .collect()
}

/// Filters for listing homework.
#[derive(Debug, Clone, Default)]
pub struct HomeworkFilter {
    pub subject_id: Option<u32>,
    pub completed: Option<bool>,
    pub due_from: Option<NaiveDate>,
    pub due_until: Option<NaiveDate>,
}

/// Homework of a user ordered by deadline.
pub fn get_homework_for_user(
    conn: &mut PgConnection,
    owner: u32,
    filter: &HomeworkFilter,
) -> Result<Vec<HomeworkRecord>, String> {
    use self::homework::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;

    let mut query = homework.filter(user_id.eq(owner)).into_boxed();
    if let Some(subject) = filter.subject_id {
        query = query.filter(subject_id.eq(conversions::u32_to_i32(subject)?));
    }
    if let Some(done) = filter.completed {
        query = query.filter(completed.eq(done));
    }
    if let Some(from) = filter.due_from {
        query = query.filter(deadline.ge(from));
    }
    if let Some(until) = filter.due_until {
        query = query.filter(deadline.le(until));
    }

    query
        .order((deadline.asc(), id.asc()))
        .load::<HomeworkPrivate>(conn)
        .map_err(|err| err.to_string())?
        .into_iter()
        .map(private_to_public)
        .collect()
}

pub fn update_homework(
    conn: &mut PgConnection,
    record: &HomeworkRecord,
) -> Result<HomeworkRecord, String> {
    use self::homework::dsl::*;

    let row_id = conversions::u32_to_i32(record.homework_id)?;
    let update_row = public_to_private(record)?;

    diesel::update(
        homework
            .filter(id.eq(row_id))
            .filter(user_id.eq(update_row.user_id)),
    )
    .set(&update_row)
    .get_result(conn)
    .map_err(|err| err.to_string())
    .and_then(private_to_public)
}

pub fn delete_homework(conn: &mut PgConnection, owner: u32, row_id: u32) -> Result<bool, String> {
    use self::homework::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;
    let row_id = conversions::u32_to_i32(row_id)?;

    diesel::delete(homework.filter(id.eq(row_id)).filter(user_id.eq(owner)))
        .execute(conn)
        .map(|n| n > 0)
        .map_err(|err| err.to_string())
}

/// Schedule a reminder. A second reminder for the same day is ignored.
pub fn insert_reminder(
    conn: &mut PgConnection,
    input_homework_id: u32,
    input_remind_on: NaiveDate,
    input_remind_at: NaiveTime,
) -> Result<Option<HomeworkReminderRecord>, String> {
    use self::homework_reminders::dsl::*;

    let insert_row = ReminderPrivateNew {
        homework_id: conversions::u32_to_i32(input_homework_id)?,
        remind_on: input_remind_on,
        remind_at: input_remind_at,
    };

    diesel::insert_into(homework_reminders)
        .values(&insert_row)
        .on_conflict((homework_id, remind_on))
        .do_nothing()
        .get_result::<ReminderPrivate>(conn)
        .optional()
        .map_err(|err| err.to_string())?
        .map(reminder_to_public)
        .transpose()
}

pub fn get_reminders_for_homework(
    conn: &mut PgConnection,
    input_homework_id: u32,
) -> Result<Vec<HomeworkReminderRecord>, String> {
    use self::homework_reminders::dsl::*;

    let input_homework_id = conversions::u32_to_i32(input_homework_id)?;

    homework_reminders
        .filter(homework_id.eq(input_homework_id))
        .order(remind_on.asc())
        .load::<ReminderPrivate>(conn)
        .map_err(|err| err.to_string())?
        .into_iter()
        .map(reminder_to_public)
        .collect()
}

/// Unsent reminders due on or before `today`, oldest first.
pub fn get_due_reminders(
    conn: &mut PgConnection,
    today: NaiveDate,
) -> Result<Vec<HomeworkReminderRecord>, String> {
    use self::homework_reminders::dsl::*;

    homework_reminders
        .filter(sent.eq(false))
        .filter(remind_on.le(today))
        .order((remind_on.asc(), id.asc()))
        .load::<ReminderPrivate>(conn)
        .map_err(|err| err.to_string())?
        .into_iter()
        .map(reminder_to_public)
        .collect()
}

pub fn mark_reminder_sent(
    conn: &mut PgConnection,
    row_id: u32,
    now: DateTime<Utc>,
) -> Result<HomeworkReminderRecord, String> {
    use self::homework_reminders::dsl::*;

    let row_id = conversions::u32_to_i32(row_id)?;

    diesel::update(homework_reminders.filter(id.eq(row_id)))
        .set((sent.eq(true), sent_at.eq(Some(now))))
        .get_result(conn)
        .map_err(|err| err.to_string())
        .and_then(reminder_to_public)
}

/// Store the reminder's notification and mark the reminder sent in one
/// transaction, so a reminder is never notified twice.
pub fn record_reminder_delivery(
    conn: &mut PgConnection,
    reminder_id: u32,
    owner: u32,
    draft: &NotificationDraft,
    now: DateTime<Utc>,
) -> Result<NotificationRecord, String> {
    conn.transaction::<_, anyhow::Error, _>(|conn| {
        let stored = insert_notification(conn, owner, draft).map_err(anyhow::Error::msg)?;
        mark_reminder_sent(conn, reminder_id, now).map_err(anyhow::Error::msg)?;
        Ok(stored)
    })
    .map_err(|err| err.to_string())
}
