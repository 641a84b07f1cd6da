use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgPool, types::Json};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::festival::Season;

#[derive(Debug, Deserialize)]
pub struct ArchiveRequest {
    pub year: i32,
    pub season: Season,
}

#[derive(Debug, Serialize)]
pub struct ArchiveResponse {
    pub success: bool,
    pub count: usize,
}

/// A message frozen into a snapshot. Stored as-is so later schema changes
/// to `messages` do not rewrite history.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedMessage {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub sender_id: Uuid,
    pub sender_nickname: Option<String>,
    pub sticker_type: String,
    pub content: String,
    pub scene_id: Option<String>,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub year: i32,
    pub season: Season,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
pub struct HistoryScene {
    pub id: Uuid,
    pub year: i32,
    pub season: Season,
    pub data: Json<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySceneView {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub year: i32,
    pub season: Season,
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

impl From<HistoryScene> for HistorySceneView {
    fn from(scene: HistoryScene) -> Self {
        Self {
            id: scene.id,
            year: scene.year,
            season: scene.season,
            data: scene.data.0,
            created_at: scene.created_at,
        }
    }
}

impl HistoryScene {
    /// Moves the owner's received messages for `year`/`season` into a new
    /// snapshot. Nothing to move means no snapshot.
    pub async fn archive(pool: &PgPool, owner: Uuid, year: i32, season: Season) -> AppResult<usize> {
        let mut tx = pool.begin().await?;

        let messages = sqlx::query_as::<_, ArchivedMessage>(
            r#"
            SELECT m.id, m.sender_id, u.nickname AS sender_nickname, m.sticker_type,
                   m.content, m.scene_id, m.is_private, m.created_at
            FROM messages m
            LEFT JOIN users u ON u.id = m.sender_id
            WHERE m.recipient_id = $1 AND m.year = $2 AND m.season = $3
            ORDER BY m.created_at
            FOR UPDATE OF m
            "#,
        )
        .bind(owner)
        .bind(year)
        .bind(season)
        .fetch_all(&mut *tx)
        .await?;

        if messages.is_empty() {
            return Ok(0);
        }

        let data = serde_json::to_value(&messages)
            .map_err(|e| AppError::Internal(format!("failed to encode snapshot: {}", e)))?;
        sqlx::query(
            "INSERT INTO history_scenes (id, user_id, year, season, data) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(owner)
        .bind(year)
        .bind(season)
        .bind(Json(data))
        .execute(&mut *tx)
        .await?;

        let ids: Vec<Uuid> = messages.iter().map(|m| m.id).collect();
        sqlx::query("DELETE FROM messages WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(messages.len())
    }

    pub async fn list_for(pool: &PgPool, owner: Uuid) -> AppResult<Vec<HistorySummary>> {
        Ok(sqlx::query_as::<_, HistorySummary>(
            "SELECT id, year, season, created_at FROM history_scenes WHERE user_id = $1 ORDER BY year DESC, created_at DESC",
        )
        .bind(owner)
        .fetch_all(pool)
        .await?)
    }

    /// Someone else's snapshot is reported as missing.
    pub async fn find_owned(pool: &PgPool, id: Uuid, owner: Uuid) -> AppResult<Self> {
        sqlx::query_as::<_, HistoryScene>(
            "SELECT id, year, season, data, created_at FROM history_scenes WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("history scene"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archived_message_keeps_private_text() {
        let msg = ArchivedMessage {
            id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            sender_nickname: Some("A".into()),
            sticker_type: "tree".into(),
            content: "only for you".into(),
            scene_id: None,
            is_private: true,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(vec![msg]).unwrap();
        assert_eq!(json[0]["content"], "only for you");
        assert_eq!(json[0]["isPrivate"], true);
        assert!(json[0].get("_id").is_some());
    }

    #[test]
    fn archive_request_reads_lowercase_season() {
        let req: ArchiveRequest = serde_json::from_str(r#"{"year":2025,"season":"christmas"}"#).unwrap();
        assert_eq!(req.year, 2025);
        assert_eq!(req.season, Season::Christmas);
    }
}
