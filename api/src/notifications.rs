//! In-app notifications and the achievement board.

use crate::auth::ApprovedUser;
use crate::helpers::*;
use rocket::State;
use rocket::serde::Serialize;
use rocket::serde::json::Json;
use school_common::db_util::{
    PgPool, count_unread_notifications, get_achievements, get_notifications,
    get_user_achievements, mark_all_notifications_read, mark_notification_read,
};
use school_common::{AchievementRecord, NotificationRecord, UserAchievementRecord};
use std::collections::HashMap;

const UNREAD_PREVIEW: i64 = 5;
const DEFAULT_PAGE: i64 = 50;

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct UnreadSummary {
    pub count: usize,
    pub latest: Vec<NotificationRecord>,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct AchievementView {
    #[serde(flatten)]
    pub achievement: AchievementRecord,
    pub unlocked: bool,
    pub unlock: Option<UserAchievementRecord>,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct AchievementBoard {
    pub achievements: Vec<AchievementView>,
    pub unlocked: usize,
    pub total_points: u32,
}

/// Listing returns the notifications as they were, then marks them all read.
#[get("/notifications?<limit>")]
pub fn list_notifications(
    pool: &State<PgPool>,
    user: ApprovedUser,
    limit: Option<i64>,
) -> ApiResult<Vec<NotificationRecord>> {
    let limit = limit.unwrap_or(DEFAULT_PAGE).clamp(1, 500);
    let mut conn = connect(pool)?;
    let user_id = user.0.id();
    let notifications =
        get_notifications(&mut conn, user_id, Some(limit), false).map_err(db_error)?;
    let marked = mark_all_notifications_read(&mut conn, user_id).map_err(db_error)?;
    tracing::debug!(user_id, marked, "Marked notifications read");
    Ok(Json(notifications))
}

#[post("/notifications/<id>/read")]
pub fn read_notification(
    pool: &State<PgPool>,
    user: ApprovedUser,
    id: u32,
) -> ApiResult<NotificationRecord> {
    let mut conn = connect(pool)?;
    found(mark_notification_read(&mut conn, user.0.id(), id), "notification").map(Json)
}

#[get("/notifications/unread")]
pub fn unread_notifications(pool: &State<PgPool>, user: ApprovedUser) -> ApiResult<UnreadSummary> {
    let mut conn = connect(pool)?;
    let user_id = user.0.id();
    Ok(Json(UnreadSummary {
        count: count_unread_notifications(&mut conn, user_id).map_err(db_error)?,
        latest: get_notifications(&mut conn, user_id, Some(UNREAD_PREVIEW), true)
            .map_err(db_error)?,
    }))
}

fn board(
    catalog: Vec<AchievementRecord>,
    unlocks: Vec<UserAchievementRecord>,
) -> AchievementBoard {
    let mut unlocks: HashMap<u32, UserAchievementRecord> = unlocks
        .into_iter()
        .map(|u| (u.achievement_id, u))
        .collect();
    let achievements: Vec<AchievementView> = catalog
        .into_iter()
        .map(|achievement| {
            let unlock = unlocks.remove(&achievement.achievement_id);
            AchievementView {
                unlocked: unlock.as_ref().is_some_and(|u| u.unlocked_at.is_some()),
                unlock,
                achievement,
            }
        })
        .collect();
    let earned = achievements.iter().filter(|a| a.unlocked);
    AchievementBoard {
        unlocked: earned.clone().count(),
        total_points: earned.map(|a| a.achievement.points).sum(),
        achievements,
    }
}

#[get("/achievements")]
pub fn list_achievements(pool: &State<PgPool>, user: ApprovedUser) -> ApiResult<AchievementBoard> {
    let mut conn = connect(pool)?;
    let catalog = get_achievements(&mut conn, false).map_err(db_error)?;
    let unlocks = get_user_achievements(&mut conn, user.0.id()).map_err(db_error)?;
    Ok(Json(board(catalog, unlocks)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use school_common::AchievementCategory;

    fn achievement(id: u32, points: u32) -> AchievementRecord {
        AchievementRecord {
            achievement_id: id,
            code: format!("CODE_{id}"),
            name: format!("Achievement {id}"),
            description: String::new(),
            category: AchievementCategory::General,
            icon: "star".to_string(),
            points,
            active: true,
        }
    }

    #[test_log::test]
    fn test_board_counts_unlocked_points() {
        let unlocks = vec![
            UserAchievementRecord {
                user_id: 1,
                achievement_id: 2,
                unlocked_at: Some(Utc::now()),
                progress: 1,
            },
            UserAchievementRecord {
                user_id: 1,
                achievement_id: 3,
                unlocked_at: None,
                progress: 4,
            },
        ];
        let board = board(
            vec![achievement(1, 10), achievement(2, 25), achievement(3, 50)],
            unlocks,
        );
        assert_eq!(board.unlocked, 1);
        assert_eq!(board.total_points, 25);
        assert!(!board.achievements[0].unlocked);
        assert!(board.achievements[1].unlocked);
        assert_eq!(board.achievements[2].unlock.as_ref().map(|u| u.progress), Some(4));
    }
}
