use super::*;
use crate::notifications::NotificationDraft;

table! {
    notifications (id) {
        id -> Integer,
        user_id -> Integer,
        kind -> Varchar,
        title -> Varchar,
        message -> Text,
        link_url -> Varchar,
        is_read -> Bool,
        created_at -> Timestamptz,
    }
}

#[derive(Queryable)]
#[diesel(table_name = notifications)]
struct NotificationPrivate {
    id: i32,
    user_id: i32,
    kind: String,
    title: String,
    message: String,
    link_url: String,
    is_read: bool,
    created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = notifications)]
struct NotificationPrivateNew {
    user_id: i32,
    kind: String,
    title: String,
    message: String,
    link_url: String,
}

fn private_to_public(p: NotificationPrivate) -> Result<NotificationRecord, String> {
    use conversions::*;
    Ok(NotificationRecord {
        notification_id: i32_to_u32(p.id)?,
        user_id: i32_to_u32(p.user_id)?,
        kind: parse_label(&p.kind)?,
        title: p.title,
        message: p.message,
        link_url: p.link_url,
        read: p.is_read,
        created_at: p.created_at,
    })
}

pub fn insert_notification(
    conn: &mut PgConnection,
    owner: u32,
    draft: &NotificationDraft,
) -> Result<NotificationRecord, String> {
    use self::notifications::dsl::*;

    let insert_row = NotificationPrivateNew {
        user_id: conversions::u32_to_i32(owner)?,
        kind: draft.kind.as_str().to_string(),
        title: draft.title.clone(),
        message: draft.message.clone(),
        link_url: draft.link_url.clone(),
    };

    diesel::insert_into(notifications)
        .values(&insert_row)
        .get_result(conn)
        .map_err(|err| err.to_string())
        .and_then(private_to_public)
}

/// Notifications of a user, newest first.
pub fn get_notifications(
    conn: &mut PgConnection,
    owner: u32,
    limit: Option<i64>,
    unread_only: bool,
) -> Result<Vec<NotificationRecord>, String> {
    use self::notifications::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;

    let mut query = notifications
        .filter(user_id.eq(owner))
        .order((created_at.desc(), id.desc()))
        .into_boxed();
    if unread_only {
        query = query.filter(is_read.eq(false));
    }
    if let Some(limit) = limit {
        query = query.limit(limit);
    }

    query
        .load::<NotificationPrivate>(conn)
        .map_err(|err| err.to_string())?
        .into_iter()
        .map(private_to_public)
        .collect()
}

pub fn mark_notification_read(
    conn: &mut PgConnection,
    owner: u32,
    row_id: u32,
) -> Result<Option<NotificationRecord>, String> {
    use self::notifications::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;
    let row_id = conversions::u32_to_i32(row_id)?;

    diesel::update(notifications.filter(id.eq(row_id)).filter(user_id.eq(owner)))
        .set(is_read.eq(true))
        .get_result::<NotificationPrivate>(conn)
        .optional()
        .map_err(|err| err.to_string())?
        .map(private_to_public)
        .transpose()
}

pub fn mark_all_notifications_read(conn: &mut PgConnection, owner: u32) -> Result<usize, String> {
    use self::notifications::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;

    diesel::update(notifications.filter(user_id.eq(owner)).filter(is_read.eq(false)))
        .set(is_read.eq(true))
        .execute(conn)
        .map_err(|err| err.to_string())
}

pub fn count_unread_notifications(conn: &mut PgConnection, owner: u32) -> Result<usize, String> {
    use self::notifications::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;

    let count: i64 = notifications
        .filter(user_id.eq(owner))
        .filter(is_read.eq(false))
        .count()
        .get_result(conn)
        .map_err(|err| err.to_string())?;
    conversions::i64_to_usize(count)
}
