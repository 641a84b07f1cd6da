use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;

use crate::error::AppResult;
use crate::festival::Season;

const LIST_LIMIT: i64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "notification_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    FriendRequest,
    ConnectionSuccess,
    NewMessage,
}

#[derive(Debug, Clone, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub kind: NotificationType,
    pub related_user_id: Option<Uuid>,
    pub related_user_nickname: Option<String>,
    pub related_entity_id: Option<Uuid>,
    pub season: Option<Season>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct RelatedUser {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub related_user: Option<RelatedUser>,
    pub related_entity_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season: Option<Season>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Notification> for NotificationView {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            kind: n.kind,
            related_user: n.related_user_id.map(|id| RelatedUser {
                id,
                nickname: n.related_user_nickname,
            }),
            related_entity_id: n.related_entity_id,
            season: n.season,
            is_read: n.is_read,
            created_at: n.created_at,
        }
    }
}

/// A notification about to be written.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: Uuid,
    pub kind: NotificationType,
    pub related_user_id: Option<Uuid>,
    pub related_entity_id: Option<Uuid>,
    pub season: Option<Season>,
}

impl Notification {
    pub async fn create<'e, E: PgExecutor<'e>>(executor: E, new: NewNotification) -> AppResult<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO notifications (id, recipient_id, kind, related_user_id, related_entity_id, season)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(new.recipient_id)
        .bind(new.kind)
        .bind(new.related_user_id)
        .bind(new.related_entity_id)
        .bind(new.season)
        .execute(executor)
        .await?;
        Ok(id)
    }

    pub async fn list_for(pool: &PgPool, recipient: Uuid) -> AppResult<Vec<Self>> {
        // Older rows may predate the season column; recover it from the message.
        Ok(sqlx::query_as::<_, Notification>(
            r#"
            SELECT
                n.id, n.recipient_id, n.kind, n.related_user_id,
                u.nickname AS related_user_nickname,
                n.related_entity_id,
                COALESCE(n.season, m.season) AS season,
                n.is_read, n.created_at
            FROM notifications n
            LEFT JOIN users u ON u.id = n.related_user_id
            LEFT JOIN messages m ON n.kind = 'NEW_MESSAGE' AND m.id = n.related_entity_id
            WHERE n.recipient_id = $1
            ORDER BY n.created_at DESC
            LIMIT $2
            "#,
        )
        .bind(recipient)
        .bind(LIST_LIMIT)
        .fetch_all(pool)
        .await?)
    }

    pub async fn mark_all_read(pool: &PgPool, recipient: Uuid) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE recipient_id = $1 AND NOT is_read",
        )
        .bind(recipient)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Deletes read notifications created before `cutoff`. Unread ones are kept.
    pub async fn purge_read_before(pool: &PgPool, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE is_read AND created_at < $1")
            .bind(cutoff)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Out-of-range retention keeps everything rather than panicking.
pub fn retention_cutoff(now: DateTime<Utc>, retention_days: i64) -> DateTime<Utc> {
    Duration::try_days(retention_days.max(0))
        .and_then(|keep| now.checked_sub_signed(keep))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn kind_uses_wire_names() {
        assert_eq!(
            serde_json::to_string(&NotificationType::ConnectionSuccess).unwrap(),
            "\"CONNECTION_SUCCESS\""
        );
    }

    #[test]
    fn cutoff_is_retention_days_back() {
        let now = Utc.with_ymd_and_hms(2026, 3, 31, 0, 0, 0).unwrap();
        assert_eq!(
            retention_cutoff(now, 90),
            Utc.with_ymd_and_hms(2025, 12, 31, 0, 0, 0).unwrap()
        );
        assert_eq!(retention_cutoff(now, -5), now);
        assert_eq!(retention_cutoff(now, i64::MAX), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn view_renames_kind_to_type() {
        let view = NotificationView::from(Notification {
            id: Uuid::new_v4(),
            recipient_id: Uuid::new_v4(),
            kind: NotificationType::NewMessage,
            related_user_id: Some(Uuid::new_v4()),
            related_user_nickname: Some("A".into()),
            related_entity_id: None,
            season: Some(Season::Spring),
            is_read: false,
            created_at: Utc::now(),
        });
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["type"], "NEW_MESSAGE");
        assert_eq!(json["season"], "spring");
        assert_eq!(json["relatedUser"]["nickname"], "A");
        assert_eq!(json["isRead"], false);
    }
}
