use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::festival::{MessageView, Season, current_year};
use crate::routes::friend::FriendLink;
use crate::routes::notification::{NewNotification, Notification, NotificationType};

pub const MAX_CONTENT_CHARS: usize = 500;
const MAX_STICKER_TYPE_CHARS: usize = 64;

#[derive(Debug, Clone, FromRow)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub sticker_type: String,
    pub content: String,
    pub season: Season,
    pub year: i32,
    pub scene_id: Option<String>,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
    pub sender_nickname: Option<String>,
}

const MESSAGE_SELECT: &str = r#"
    SELECT
        m.id, m.sender_id, m.recipient_id, m.sticker_type, m.content, m.season,
        m.year, m.scene_id, m.is_private, m.created_at,
        u.nickname AS sender_nickname
    FROM messages m
    LEFT JOIN users u ON u.id = m.sender_id
"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub recipient_id: Uuid,
    pub sticker_type: String,
    pub content: String,
    pub season: Season,
    pub year: Option<i32>,
    pub scene_id: Option<String>,
    pub is_private: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub sticker_type: String,
    pub content: String,
    pub season: Season,
    pub year: i32,
    pub scene_id: Option<String>,
    pub is_private: bool,
}

impl SendMessageRequest {
    /// Validates the request and fills in defaults. `year` falls back to
    /// the current year in China time.
    pub fn into_new(self, sender_id: Uuid, now: DateTime<Utc>) -> AppResult<NewMessage> {
        if self.recipient_id == sender_id {
            return Err(AppError::InvalidInput("不能给自己发送贴纸".into()));
        }
        let sticker_type = self.sticker_type.trim();
        if sticker_type.is_empty() || sticker_type.chars().count() > MAX_STICKER_TYPE_CHARS {
            return Err(AppError::InvalidInput("stickerType 无效".into()));
        }
        if self.content.trim().is_empty() {
            return Err(AppError::InvalidInput("内容不能为空".into()));
        }
        if self.content.chars().count() > MAX_CONTENT_CHARS {
            return Err(AppError::InvalidInput(format!(
                "内容不能超过 {} 个字符",
                MAX_CONTENT_CHARS
            )));
        }

        Ok(NewMessage {
            sender_id,
            recipient_id: self.recipient_id,
            sticker_type: sticker_type.to_string(),
            content: self.content,
            season: self.season,
            year: self.year.unwrap_or_else(|| current_year(now)),
            scene_id: self
                .scene_id
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            is_private: self.is_private.unwrap_or(false),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub success: bool,
    pub message_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxResponse {
    pub messages: Vec<MessageView>,
    pub is_unlocked: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDetailResponse {
    pub message: MessageView,
    pub is_unlocked: bool,
}

#[derive(Debug, Serialize)]
pub struct SentMessagesResponse {
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub reason: Option<String>,
}

impl Message {
    pub fn is_participant(&self, user: Uuid) -> bool {
        user == self.sender_id || user == self.recipient_id
    }

    pub fn ensure_can_view(&self, viewer: Uuid) -> AppResult<()> {
        if self.is_participant(viewer) {
            Ok(())
        } else {
            Err(AppError::Forbidden("只能查看自己发送或收到的贴纸".into()))
        }
    }

    /// Only the recipient may delete; senders cannot unsend.
    pub fn ensure_can_delete(&self, requester: Uuid) -> AppResult<()> {
        if requester == self.recipient_id {
            Ok(())
        } else {
            Err(AppError::Forbidden("只能删除自己收到的贴纸".into()))
        }
    }

    pub fn ensure_can_report(&self, reporter: Uuid) -> AppResult<()> {
        if self.is_participant(reporter) {
            Ok(())
        } else {
            Err(AppError::Forbidden("只能举报自己发送或收到的贴纸".into()))
        }
    }

    pub fn ensure_can_place(&self, user: Uuid) -> AppResult<()> {
        if user == self.sender_id {
            Ok(())
        } else {
            Err(AppError::Forbidden("只能移动自己发送的贴纸".into()))
        }
    }

    /// Persists the message and its `NEW_MESSAGE` notification together.
    /// Fails with `NotFriends` unless an accepted link exists right now.
    pub async fn send(pool: &PgPool, new: NewMessage) -> AppResult<Uuid> {
        if !FriendLink::are_friends(pool, new.sender_id, new.recipient_id).await? {
            tracing::debug!("{} tried to message non-friend {}", new.sender_id, new.recipient_id);
            return Err(AppError::NotFriends);
        }

        let id = Uuid::new_v4();
        let mut tx = pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO messages
                (id, sender_id, recipient_id, sticker_type, content, season, year, scene_id, is_private)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(id)
        .bind(new.sender_id)
        .bind(new.recipient_id)
        .bind(&new.sticker_type)
        .bind(&new.content)
        .bind(new.season)
        .bind(new.year)
        .bind(&new.scene_id)
        .bind(new.is_private)
        .execute(&mut *tx)
        .await?;

        Notification::create(
            &mut *tx,
            NewNotification {
                recipient_id: new.recipient_id,
                kind: NotificationType::NewMessage,
                related_user_id: Some(new.sender_id),
                related_entity_id: Some(id),
                season: Some(new.season),
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            "{} sent {} sticker {} to {}",
            new.sender_id,
            new.season,
            id,
            new.recipient_id
        );
        Ok(id)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> AppResult<Option<Self>> {
        let query = format!("{} WHERE m.id = $1", MESSAGE_SELECT);
        Ok(sqlx::query_as::<_, Message>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?)
    }

    pub async fn require(pool: &PgPool, id: Uuid) -> AppResult<Self> {
        Self::find_by_id(pool, id)
            .await?
            .ok_or(AppError::NotFound("message"))
    }

    pub async fn mailbox(pool: &PgPool, recipient: Uuid, season: Season, year: i32) -> AppResult<Vec<Self>> {
        let query = format!(
            "{} WHERE m.recipient_id = $1 AND m.season = $2 AND m.year = $3 ORDER BY m.created_at",
            MESSAGE_SELECT
        );
        Ok(sqlx::query_as::<_, Message>(&query)
            .bind(recipient)
            .bind(season)
            .bind(year)
            .fetch_all(pool)
            .await?)
    }

    pub async fn sent_by(pool: &PgPool, sender: Uuid, season: Season, year: i32) -> AppResult<Vec<Self>> {
        let query = format!(
            "{} WHERE m.sender_id = $1 AND m.season = $2 AND m.year = $3 ORDER BY m.created_at DESC",
            MESSAGE_SELECT
        );
        Ok(sqlx::query_as::<_, Message>(&query)
            .bind(sender)
            .bind(season)
            .bind(year)
            .fetch_all(pool)
            .await?)
    }

    /// Everything `recipient` has received in a season, across years.
    pub async fn received_in_season(pool: &PgPool, recipient: Uuid, season: Season) -> AppResult<Vec<Self>> {
        let query = format!(
            "{} WHERE m.recipient_id = $1 AND m.season = $2 ORDER BY m.created_at",
            MESSAGE_SELECT
        );
        Ok(sqlx::query_as::<_, Message>(&query)
            .bind(recipient)
            .bind(season)
            .fetch_all(pool)
            .await?)
    }

    pub async fn delete<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
