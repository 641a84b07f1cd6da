use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::festival::Season;
use crate::routes::message::Message;
use crate::utils::is_unique_violation;

const MAX_REASON_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "report_status", rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Resolved,
    Dismissed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportAction {
    Resolve,
    Dismiss,
}

impl ReportAction {
    pub fn outcome(self) -> ReportStatus {
        match self {
            ReportAction::Resolve => ReportStatus::Resolved,
            ReportAction::Dismiss => ReportStatus::Dismissed,
        }
    }

    /// Only a resolve may take the message down with it.
    pub fn deletes_message(self, requested: bool) -> bool {
        self == ReportAction::Resolve && requested
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveReportBody {
    pub action: String,
    pub delete_message: Option<bool>,
}

impl ResolveReportBody {
    pub fn parse_action(&self) -> AppResult<ReportAction> {
        match self.action.as_str() {
            "resolve" => Ok(ReportAction::Resolve),
            "dismiss" => Ok(ReportAction::Dismiss),
            other => Err(AppError::InvalidInput(format!("未知操作: {}", other))),
        }
    }
}

/// A pending report joined with everything a moderator needs to judge it.
#[derive(Debug, FromRow)]
pub struct ReportRow {
    pub id: Uuid,
    pub reason: Option<String>,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    pub reporter_id: Uuid,
    pub reporter_handle: Option<String>,
    pub message_id: Option<Uuid>,
    pub sticker_type: Option<String>,
    pub content: Option<String>,
    pub season: Option<Season>,
    pub year: Option<i32>,
    pub is_private: Option<bool>,
    pub sender_id: Option<Uuid>,
    pub sender_handle: Option<String>,
    pub recipient_id: Option<Uuid>,
    pub recipient_handle: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedMessage {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub sticker_type: Option<String>,
    pub content: Option<String>,
    pub season: Option<Season>,
    pub year: Option<i32>,
    pub is_private: bool,
    pub sender: Option<Party>,
    pub recipient: Option<Party>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportView {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub reason: Option<String>,
    pub status: ReportStatus,
    pub reporter: Party,
    /// `None` once the message has been removed by other means.
    pub message: Option<ReportedMessage>,
    pub created_at: DateTime<Utc>,
}

impl From<ReportRow> for ReportView {
    fn from(row: ReportRow) -> Self {
        let message = row.message_id.map(|id| ReportedMessage {
            id,
            sticker_type: row.sticker_type,
            content: row.content,
            season: row.season,
            year: row.year,
            is_private: row.is_private.unwrap_or(false),
            sender: row.sender_id.map(|id| Party {
                id,
                user_id: row.sender_handle,
            }),
            recipient: row.recipient_id.map(|id| Party {
                id,
                user_id: row.recipient_handle,
            }),
        });
        Self {
            id: row.id,
            reason: row.reason,
            status: row.status,
            reporter: Party {
                id: row.reporter_id,
                user_id: row.reporter_handle,
            },
            message,
            created_at: row.created_at,
        }
    }
}

pub struct Report;

impl Report {
    pub fn normalize_reason(reason: Option<String>) -> AppResult<Option<String>> {
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        if reason.as_ref().is_some_and(|r| r.chars().count() > MAX_REASON_CHARS) {
            return Err(AppError::InvalidInput(format!(
                "举报理由不能超过 {} 个字符",
                MAX_REASON_CHARS
            )));
        }
        Ok(reason)
    }

    /// Files a pending report. A second pending report from the same
    /// reporter on the same message trips the partial unique index.
    pub async fn create(
        pool: &PgPool,
        message: &Message,
        reporter: Uuid,
        reason: Option<String>,
    ) -> AppResult<Uuid> {
        message.ensure_can_report(reporter)?;
        let reason = Self::normalize_reason(reason)?;

        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO reports (id, message_id, reporter_id, reason) VALUES ($1, $2, $3, $4)")
            .bind(id)
            .bind(message.id)
            .bind(reporter)
            .bind(reason)
            .execute(pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::AlreadyReported
                } else {
                    e.into()
                }
            })?;
        Ok(id)
    }

    pub async fn list_pending(pool: &PgPool) -> AppResult<Vec<ReportRow>> {
        Ok(sqlx::query_as::<_, ReportRow>(
            r#"
            SELECT
                r.id, r.reason, r.status, r.created_at,
                r.reporter_id, ru.user_id AS reporter_handle,
                r.message_id, m.sticker_type, m.content, m.season, m.year, m.is_private,
                m.sender_id, su.user_id AS sender_handle,
                m.recipient_id, tu.user_id AS recipient_handle
            FROM reports r
            LEFT JOIN users ru ON ru.id = r.reporter_id
            LEFT JOIN messages m ON m.id = r.message_id
            LEFT JOIN users su ON su.id = m.sender_id
            LEFT JOIN users tu ON tu.id = m.recipient_id
            WHERE r.status = 'pending'
            ORDER BY r.created_at DESC
            "#,
        )
        .fetch_all(pool)
        .await?)
    }

    /// Closes a pending report, optionally removing the message, in one
    /// transaction. The status guard on the update means only one
    /// moderator wins a race.
    pub async fn process(
        pool: &PgPool,
        id: Uuid,
        action: ReportAction,
        delete_message: bool,
    ) -> AppResult<Option<Uuid>> {
        let mut tx = pool.begin().await?;

        let claimed: Option<(Option<Uuid>,)> = sqlx::query_as(
            "UPDATE reports SET status = $1, resolved_at = now() WHERE id = $2 AND status = 'pending' RETURNING message_id",
        )
        .bind(action.outcome())
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let message_id = match claimed {
            Some((message_id,)) => message_id,
            None => {
                let exists: Option<(ReportStatus,)> =
                    sqlx::query_as("SELECT status FROM reports WHERE id = $1")
                        .bind(id)
                        .fetch_optional(&mut *tx)
                        .await?;
                return Err(match exists {
                    Some(_) => AppError::AlreadyProcessed,
                    None => AppError::NotFound("report"),
                });
            }
        };

        let mut deleted = None;
        if action.deletes_message(delete_message) {
            if let Some(message_id) = message_id {
                if Message::delete(&mut *tx, message_id).await? {
                    deleted = Some(message_id);
                }
            }
        }
        tx.commit().await?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(action: &str) -> ResolveReportBody {
        ResolveReportBody {
            action: action.into(),
            delete_message: Some(true),
        }
    }

    #[test]
    fn unknown_action_is_invalid_input() {
        assert!(matches!(body("escalate").parse_action(), Err(AppError::InvalidInput(_))));
        assert_eq!(body("resolve").parse_action().unwrap(), ReportAction::Resolve);
        assert_eq!(body("dismiss").parse_action().unwrap(), ReportAction::Dismiss);
    }

    #[test]
    fn dismiss_never_deletes() {
        assert!(ReportAction::Resolve.deletes_message(true));
        assert!(!ReportAction::Resolve.deletes_message(false));
        assert!(!ReportAction::Dismiss.deletes_message(true));
    }

    #[test]
    fn outcome_is_terminal_status() {
        assert_eq!(ReportAction::Resolve.outcome(), ReportStatus::Resolved);
        assert_eq!(ReportAction::Dismiss.outcome(), ReportStatus::Dismissed);
    }

    #[test]
    fn reason_is_trimmed_and_bounded() {
        assert_eq!(Report::normalize_reason(Some("  spam ".into())).unwrap().as_deref(), Some("spam"));
        assert_eq!(Report::normalize_reason(Some("   ".into())).unwrap(), None);
        assert!(Report::normalize_reason(Some("x".repeat(MAX_REASON_CHARS + 1))).is_err());
    }

    #[test]
    fn view_shows_private_content_to_moderators() {
        let row = ReportRow {
            id: Uuid::new_v4(),
            reason: None,
            status: ReportStatus::Pending,
            created_at: Utc::now(),
            reporter_id: Uuid::new_v4(),
            reporter_handle: Some("bob".into()),
            message_id: Some(Uuid::new_v4()),
            sticker_type: Some("tree".into()),
            content: Some("secret".into()),
            season: Some(Season::Christmas),
            year: Some(2025),
            is_private: Some(true),
            sender_id: Some(Uuid::new_v4()),
            sender_handle: Some("amy".into()),
            recipient_id: None,
            recipient_handle: None,
        };
        let json = serde_json::to_value(ReportView::from(row)).unwrap();
        assert_eq!(json["message"]["content"], "secret");
        assert_eq!(json["message"]["isPrivate"], true);
        assert_eq!(json["reporter"]["userId"], "bob");
    }
}
