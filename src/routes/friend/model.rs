use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::festival::{MessageView, Season};
use crate::routes::notification::{NewNotification, Notification, NotificationType};
use crate::routes::user::{SceneLayout, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "friend_status", rename_all = "lowercase")]
pub enum FriendStatus {
    Pending,
    Accepted,
}

/// One row per unordered pair of users. `requester_id` records who asked
/// first; the friendship check ignores direction.
#[derive(Debug, Clone, FromRow)]
pub struct FriendLink {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub recipient_id: Uuid,
    pub status: FriendStatus,
    pub created_at: DateTime<Utc>,
}

const LINK_COLUMNS: &str = "id, requester_id, recipient_id, status, created_at";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestBody {
    pub target_user_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RespondAction {
    Accept,
    Reject,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondBody {
    pub request_id: Uuid,
    pub action: RespondAction,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestResponse {
    pub success: bool,
    pub auto_accepted: bool,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FriendEntry {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user_id: String,
    pub nickname: String,
    pub selected_scene: Option<String>,
}

#[derive(Debug, FromRow)]
pub struct IncomingRow {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub requester_id: Uuid,
    pub requester_handle: String,
    pub requester_nickname: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingRequest {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub requester: FriendEntry,
    pub created_at: DateTime<Utc>,
}

impl From<IncomingRow> for IncomingRequest {
    fn from(row: IncomingRow) -> Self {
        Self {
            id: row.id,
            requester: FriendEntry {
                id: row.requester_id,
                user_id: row.requester_handle,
                nickname: row.requester_nickname,
                selected_scene: None,
            },
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendCheckResponse {
    pub is_friend: bool,
}

/// The parts of a friend's account shown on their decorated scene.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecorOwner {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub nickname: String,
    pub selected_scene: Option<String>,
    pub theme_preference: Season,
    pub custom_backgrounds: BTreeMap<String, String>,
    pub scene_layout: SceneLayout,
}

impl From<User> for DecorOwner {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            nickname: user.nickname,
            selected_scene: user.selected_scene,
            theme_preference: user.theme_preference,
            custom_backgrounds: user.custom_backgrounds.0,
            scene_layout: user.scene_layout.0,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecorResponse {
    #[serde(flatten)]
    pub owner: DecorOwner,
    pub messages: Vec<MessageView>,
    pub is_unlocked: bool,
}

/// Account every user starts out befriended with. Requests to it are
/// accepted without asking.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnboardingBot<'a> {
    pub handle: Option<&'a str>,
    pub nickname: Option<&'a str>,
}

impl<'a> OnboardingBot<'a> {
    pub fn from_config(config: &'a Config) -> Self {
        Self {
            handle: config.onboarding_bot_user_id.as_deref(),
            nickname: config.onboarding_bot_nickname.as_deref(),
        }
    }

    /// Exact login handle, or a nickname containing the configured one
    /// regardless of case.
    pub fn matches(&self, handle: &str, nickname: &str) -> bool {
        if self.handle == Some(handle) {
            return true;
        }
        self.nickname.is_some_and(|bot| {
            !bot.is_empty() && nickname.trim().to_lowercase().contains(&bot.to_lowercase())
        })
    }
}

/// Error for a request that hit an existing link.
pub fn conflict_error(existing: Option<&FriendLink>) -> AppError {
    match existing.map(|link| link.status) {
        Some(FriendStatus::Accepted) => AppError::AlreadyFriends,
        _ => AppError::DuplicateRequest,
    }
}

impl FriendLink {
    /// Only the recipient of a pending request may answer it.
    pub fn ensure_responder(&self, responder: Uuid) -> AppResult<()> {
        if responder != self.recipient_id {
            return Err(AppError::Forbidden("只能处理发给自己的好友请求".into()));
        }
        if self.status == FriendStatus::Accepted {
            return Err(AppError::InvalidInput("该请求已处理".into()));
        }
        Ok(())
    }

    pub async fn are_friends(pool: &PgPool, a: Uuid, b: Uuid) -> AppResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM friend_links
                WHERE status = 'accepted'
                  AND ((requester_id = $1 AND recipient_id = $2)
                    OR (requester_id = $2 AND recipient_id = $1))
            )
            "#,
        )
        .bind(a)
        .bind(b)
        .fetch_one(pool)
        .await?;
        Ok(exists)
    }

    pub async fn find_between<'e, E: PgExecutor<'e>>(executor: E, a: Uuid, b: Uuid) -> AppResult<Option<Self>> {
        let query = format!(
            r#"
            SELECT {} FROM friend_links
            WHERE (requester_id = $1 AND recipient_id = $2)
               OR (requester_id = $2 AND recipient_id = $1)
            "#,
            LINK_COLUMNS
        );
        Ok(sqlx::query_as::<_, FriendLink>(&query)
            .bind(a)
            .bind(b)
            .fetch_optional(executor)
            .await?)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> AppResult<Option<Self>> {
        let query = format!("SELECT {} FROM friend_links WHERE id = $1", LINK_COLUMNS);
        Ok(sqlx::query_as::<_, FriendLink>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?)
    }

    /// Creates a link from `requester` to `target`. The pair index turns a
    /// concurrent duplicate into a no-op insert, after which the existing
    /// row picks the error. The onboarding bot accepts immediately and the
    /// requester is told right away.
    pub async fn send_request(
        pool: &PgPool,
        requester: Uuid,
        target: Uuid,
        bot: OnboardingBot<'_>,
    ) -> AppResult<Self> {
        if requester == target {
            return Err(AppError::SelfRequest);
        }
        let target_user = User::require(pool, target).await?;
        let auto_accept = bot.matches(&target_user.user_id, &target_user.nickname);

        let status = if auto_accept {
            FriendStatus::Accepted
        } else {
            FriendStatus::Pending
        };

        let mut tx = pool.begin().await?;
        let query = format!(
            r#"
            INSERT INTO friend_links (id, requester_id, recipient_id, status)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT DO NOTHING
            RETURNING {}
            "#,
            LINK_COLUMNS
        );
        let inserted = sqlx::query_as::<_, FriendLink>(&query)
            .bind(Uuid::new_v4())
            .bind(requester)
            .bind(target)
            .bind(status)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(link) = inserted else {
            let existing = Self::find_between(&mut *tx, requester, target).await?;
            return Err(conflict_error(existing.as_ref()));
        };

        let note = if auto_accept {
            NewNotification {
                recipient_id: requester,
                kind: NotificationType::ConnectionSuccess,
                related_user_id: Some(target),
                related_entity_id: Some(link.id),
                season: None,
            }
        } else {
            NewNotification {
                recipient_id: target,
                kind: NotificationType::FriendRequest,
                related_user_id: Some(requester),
                related_entity_id: Some(link.id),
                season: None,
            }
        };
        Notification::create(&mut *tx, note).await?;
        tx.commit().await?;

        Ok(link)
    }

    pub async fn respond(
        pool: &PgPool,
        request_id: Uuid,
        responder: Uuid,
        action: RespondAction,
    ) -> AppResult<()> {
        let link = Self::find_by_id(pool, request_id)
            .await?
            .ok_or(AppError::NotFound("friend request"))?;
        link.ensure_responder(responder)?;
        link.answer(pool, action).await
    }

    /// Applies the answer to a link read earlier. Both branches only touch a
    /// row that is still pending, so losing a race to another answer is
    /// reported as a missing request.
    pub async fn answer(&self, pool: &PgPool, action: RespondAction) -> AppResult<()> {
        let mut tx = pool.begin().await?;
        match action {
            RespondAction::Accept => {
                let updated = sqlx::query(
                    "UPDATE friend_links SET status = 'accepted' WHERE id = $1 AND status = 'pending'",
                )
                .bind(self.id)
                .execute(&mut *tx)
                .await?;
                if updated.rows_affected() == 0 {
                    return Err(AppError::NotFound("friend request"));
                }
                Notification::create(
                    &mut *tx,
                    NewNotification {
                        recipient_id: self.requester_id,
                        kind: NotificationType::ConnectionSuccess,
                        related_user_id: Some(self.recipient_id),
                        related_entity_id: Some(self.id),
                        season: None,
                    },
                )
                .await?;
            }
            RespondAction::Reject => {
                let deleted = sqlx::query("DELETE FROM friend_links WHERE id = $1 AND status = 'pending'")
                    .bind(self.id)
                    .execute(&mut *tx)
                    .await?;
                if deleted.rows_affected() == 0 {
                    return Err(AppError::NotFound("friend request"));
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }

    /// Makes `user` and the bot friends. A pending request in either
    /// direction is accepted in place. Returns whether anything changed.
    pub async fn link_onboarding_bot(pool: &PgPool, user: Uuid, bot_id: Uuid) -> AppResult<bool> {
        if user == bot_id {
            return Ok(false);
        }
        let result = sqlx::query(
            r#"
            INSERT INTO friend_links (id, requester_id, recipient_id, status)
            VALUES ($1, $2, $3, 'accepted')
            ON CONFLICT ((LEAST(requester_id, recipient_id)), (GREATEST(requester_id, recipient_id)))
            DO UPDATE SET status = 'accepted' WHERE friend_links.status = 'pending'
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user)
        .bind(bot_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_friends(pool: &PgPool, user: Uuid) -> AppResult<Vec<FriendEntry>> {
        Ok(sqlx::query_as::<_, FriendEntry>(
            r#"
            SELECT u.id, u.user_id, u.nickname, u.selected_scene
            FROM friend_links f
            JOIN users u ON u.id = CASE WHEN f.requester_id = $1 THEN f.recipient_id ELSE f.requester_id END
            WHERE f.status = 'accepted' AND (f.requester_id = $1 OR f.recipient_id = $1)
            ORDER BY u.nickname
            "#,
        )
        .bind(user)
        .fetch_all(pool)
        .await?)
    }

    pub async fn incoming_requests(pool: &PgPool, user: Uuid) -> AppResult<Vec<IncomingRow>> {
        Ok(sqlx::query_as::<_, IncomingRow>(
            r#"
            SELECT f.id, f.created_at, u.id AS requester_id,
                   u.user_id AS requester_handle, u.nickname AS requester_nickname
            FROM friend_links f
            JOIN users u ON u.id = f.requester_id
            WHERE f.recipient_id = $1 AND f.status = 'pending'
            ORDER BY f.created_at DESC
            "#,
        )
        .bind(user)
        .fetch_all(pool)
        .await?)
    }

    pub async fn pending_targets(pool: &PgPool, user: Uuid) -> AppResult<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT recipient_id FROM friend_links WHERE requester_id = $1 AND status = 'pending'",
        )
        .bind(user)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(requester: Uuid, recipient: Uuid, status: FriendStatus) -> FriendLink {
        FriendLink {
            id: Uuid::new_v4(),
            requester_id: requester,
            recipient_id: recipient,
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn existing_link_picks_conflict_error() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let accepted = link(a, b, FriendStatus::Accepted);
        let pending = link(b, a, FriendStatus::Pending);
        assert!(matches!(conflict_error(Some(&accepted)), AppError::AlreadyFriends));
        assert!(matches!(conflict_error(Some(&pending)), AppError::DuplicateRequest));
        assert!(matches!(conflict_error(None), AppError::DuplicateRequest));
    }

    #[test]
    fn requester_cannot_answer_own_request() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let pending = link(a, b, FriendStatus::Pending);
        assert!(pending.ensure_responder(b).is_ok());
        assert!(matches!(pending.ensure_responder(a), Err(AppError::Forbidden(_))));
        assert!(matches!(pending.ensure_responder(c), Err(AppError::Forbidden(_))));
    }

    #[test]
    fn accepted_request_cannot_be_answered_again() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let accepted = link(a, b, FriendStatus::Accepted);
        assert!(matches!(accepted.ensure_responder(b), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn onboarding_bot_matches_handle_or_nickname() {
        let bot = OnboardingBot {
            handle: Some("20070421"),
            nickname: Some("andy"),
        };
        assert!(bot.matches("20070421", "someone"));
        assert!(bot.matches("other", " Andy "));
        assert!(bot.matches("other", "小Andy酱"));
        assert!(!bot.matches("other", "Bob"));

        let unset = OnboardingBot::default();
        assert!(!unset.matches("20070421", "andy"));
    }

    #[test]
    fn respond_action_parses_lowercase() {
        let body: RespondBody = serde_json::from_str(&format!(
            r#"{{"requestId":"{}","action":"reject"}}"#,
            Uuid::nil()
        ))
        .unwrap();
        assert_eq!(body.action, RespondAction::Reject);
        assert!(serde_json::from_str::<RespondAction>("\"maybe\"").is_err());
    }
}
