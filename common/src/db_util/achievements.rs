use super::*;
use crate::achievements::{CATALOG, CatalogEntry, Unlock, merge_unlock};
use diesel::result::Error as DieselError;

table! {
    achievements (id) {
        id -> Integer,
        code -> Varchar,
        name -> Varchar,
        description -> Varchar,
        category -> Varchar,
        icon -> Varchar,
        points -> Integer,
        is_active -> Bool,
    }
}

table! {
    user_achievements (user_id, achievement_id) {
        user_id -> Integer,
        achievement_id -> Integer,
        unlocked_at -> Nullable<Timestamptz>,
        progress -> Integer,
    }
}

#[derive(Queryable)]
#[diesel(table_name = achievements)]
struct AchievementPrivate {
    id: i32,
    code: String,
    name: String,
    description: String,
    category: String,
    icon: String,
    points: i32,
    is_active: bool,
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = achievements)]
struct AchievementPrivateNew {
    code: String,
    name: String,
    description: String,
    category: String,
    icon: String,
    points: i32,
    is_active: bool,
}

#[derive(Queryable, Insertable, AsChangeset)]
#[diesel(table_name = user_achievements)]
#[diesel(treat_none_as_null = true)]
struct UserAchievementPrivate {
    user_id: i32,
    achievement_id: i32,
    unlocked_at: Option<DateTime<Utc>>,
    progress: i32,
}

fn achievement_to_public(p: AchievementPrivate) -> Result<AchievementRecord, String> {
    use conversions::*;
    Ok(AchievementRecord {
        achievement_id: i32_to_u32(p.id)?,
        code: p.code,
        name: p.name,
        description: p.description,
        category: parse_label(&p.category)?,
        icon: p.icon,
        points: i32_to_u32(p.points)?,
        active: p.is_active,
    })
}

fn catalog_row(entry: &CatalogEntry) -> Result<AchievementPrivateNew, String> {
    Ok(AchievementPrivateNew {
        code: entry.code.to_string(),
        name: entry.name.to_string(),
        description: entry.description.to_string(),
        category: entry.category.as_str().to_string(),
        icon: entry.icon.to_string(),
        points: conversions::u32_to_i32(entry.points)?,
        is_active: true,
    })
}

fn user_achievement_to_public(p: UserAchievementPrivate) -> Result<UserAchievementRecord, String> {
    use conversions::*;
    Ok(UserAchievementRecord {
        user_id: i32_to_u32(p.user_id)?,
        achievement_id: i32_to_u32(p.achievement_id)?,
        unlocked_at: p.unlocked_at,
        progress: i32_to_u32(p.progress)?,
    })
}

/// Insert missing catalog entries and refresh existing ones.
/// Returns the number of created and updated rows.
pub fn upsert_catalog(conn: &mut PgConnection) -> Result<(usize, usize), String> {
    use self::achievements::dsl::*;

    let rows = CATALOG
        .iter()
        .map(catalog_row)
        .collect::<Result<Vec<AchievementPrivateNew>, String>>()?;

    conn.transaction(|conn| {
        let mut created = 0;
        let mut updated = 0;
        for row in &rows {
            let existing = achievements
                .filter(code.eq(&row.code))
                .select(id)
                .first::<i32>(conn)
                .optional()?;
            match existing {
                Some(row_id) => {
                    diesel::update(achievements.filter(id.eq(row_id)))
                        .set(row)
                        .execute(conn)?;
                    updated += 1;
                }
                None => {
                    diesel::insert_into(achievements).values(row).execute(conn)?;
                    created += 1;
                }
            }
        }
        Ok((created, updated))
    })
    .map_err(|err: DieselError| err.to_string())
}

/// Delete achievements by code together with every user unlock of them.
/// Returns the number of removed unlocks and achievements.
pub fn purge_codes(conn: &mut PgConnection, codes: &[&str]) -> Result<(usize, usize), String> {
    conn.transaction(|conn| {
        let ids: Vec<i32> = achievements::table
            .filter(achievements::code.eq_any(codes.to_vec()))
            .select(achievements::id)
            .load(conn)?;
        let links = diesel::delete(
            user_achievements::table.filter(user_achievements::achievement_id.eq_any(ids.clone())),
        )
        .execute(conn)?;
        let removed =
            diesel::delete(achievements::table.filter(achievements::id.eq_any(ids))).execute(conn)?;
        Ok((links, removed))
    })
    .map_err(|err: DieselError| err.to_string())
}

pub fn get_achievements(
    conn: &mut PgConnection,
    include_inactive: bool,
) -> Result<Vec<AchievementRecord>, String> {
    use self::achievements::dsl::*;

    let mut query = achievements.order((category.asc(), points.asc())).into_boxed();
    if !include_inactive {
        query = query.filter(is_active.eq(true));
    }

    query
        .load::<AchievementPrivate>(conn)
        .map_err(|err| err.to_string())?
        .into_iter()
        .map(achievement_to_public)
        .collect()
}

pub fn get_user_achievements(
    conn: &mut PgConnection,
    owner: u32,
) -> Result<Vec<UserAchievementRecord>, String> {
    use self::user_achievements::dsl::*;

    let owner = conversions::u32_to_i32(owner)?;

    user_achievements
        .filter(user_id.eq(owner))
        .order(unlocked_at.desc())
        .load::<UserAchievementPrivate>(conn)
        .map_err(|err| err.to_string())?
        .into_iter()
        .map(user_achievement_to_public)
        .collect()
}

/// Record a rule hit for a user.
///
/// Unknown and inactive codes are ignored. Returns the achievement when this
/// call unlocked it, `None` when it was already unlocked or skipped.
pub fn unlock_achievement(
    conn: &mut PgConnection,
    owner: u32,
    hit: &Unlock,
    now: DateTime<Utc>,
) -> Result<Option<AchievementRecord>, String> {
    let owner = conversions::u32_to_i32(owner)?;

    let result: Option<AchievementPrivate> = conn
        .transaction(|conn| {
            let achievement = achievements::table
                .filter(achievements::code.eq(hit.code))
                .filter(achievements::is_active.eq(true))
                .first::<AchievementPrivate>(conn)
                .optional()?;
            let Some(achievement) = achievement else {
                return Ok(None);
            };

            let stored = user_achievements::table
                .filter(user_achievements::user_id.eq(owner))
                .filter(user_achievements::achievement_id.eq(achievement.id))
                .first::<UserAchievementPrivate>(conn)
                .optional()?;
            let (stored_at, stored_progress) = match &stored {
                Some(s) => (s.unlocked_at, u32::try_from(s.progress).unwrap_or(0)),
                None => (None, 0),
            };
            let (unlocked_at, merged_progress, newly) =
                merge_unlock(stored_at, stored_progress, hit.progress, now);

            let row = UserAchievementPrivate {
                user_id: owner,
                achievement_id: achievement.id,
                unlocked_at: Some(unlocked_at),
                progress: i32::try_from(merged_progress).unwrap_or(i32::MAX),
            };
            diesel::insert_into(user_achievements::table)
                .values(&row)
                .on_conflict((user_achievements::user_id, user_achievements::achievement_id))
                .do_update()
                .set(&row)
                .execute(conn)?;

            Ok(newly.then_some(achievement))
        })
        .map_err(|err: DieselError| err.to_string())?;

    result.map(achievement_to_public).transpose()
}
