use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, types::Json};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::festival::Season;
use crate::utils::is_unique_violation;

pub const MAX_NICKNAME_CHANGES: i32 = 3;
pub const MAX_PASSWORD_CHANGES: i32 = 1;
const SEARCH_LIMIT: i64 = 100;

/// Sticker placement on a scene, in percent of the scene's width and height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub left: f64,
    pub top: f64,
}

impl Position {
    pub fn validate(&self) -> AppResult<()> {
        let in_range = |v: f64| v.is_finite() && (0.0..=100.0).contains(&v);
        if in_range(self.left) && in_range(self.top) {
            Ok(())
        } else {
            Err(AppError::InvalidInput("left and top must be between 0 and 100".into()))
        }
    }
}

/// season -> message id -> position
pub type SceneLayout = BTreeMap<String, BTreeMap<String, Position>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum UserRole {
    User,
    Moderator,
}

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub user_id: String,
    pub nickname: String,
    pub password_hash: String,
    pub role: UserRole,
    pub selected_scene: Option<String>,
    pub theme_preference: Season,
    pub custom_backgrounds: Json<BTreeMap<String, String>>,
    pub scene_layout: Json<SceneLayout>,
    pub nickname_change_count: i32,
    pub password_change_count: i32,
    pub login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

const USER_COLUMNS: &str = r#"
    id, user_id, nickname, password_hash, role, selected_scene, theme_preference,
    custom_backgrounds, scene_layout, nickname_change_count, password_change_count,
    login_attempts, locked_until, created_at
"#;

/// The signed-in user's own view of their account.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user_id: String,
    pub nickname: String,
    pub role: UserRole,
    pub selected_scene: Option<String>,
    pub theme_preference: Season,
    pub custom_backgrounds: BTreeMap<String, String>,
    pub scene_layout: SceneLayout,
    pub nickname_change_count: i32,
    pub password_change_count: i32,
    pub created_at: DateTime<Utc>,
}

impl From<User> for Profile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            user_id: user.user_id,
            nickname: user.nickname,
            role: user.role,
            selected_scene: user.selected_scene,
            theme_preference: user.theme_preference,
            custom_backgrounds: user.custom_backgrounds.0,
            scene_layout: user.scene_layout.0,
            nickname_change_count: user.nickname_change_count,
            password_change_count: user.password_change_count,
            created_at: user.created_at,
        }
    }
}

/// What other users see in search results and friend lists.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub nickname: String,
    pub selected_scene: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub nickname: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectSceneRequest {
    pub scene_id: String,
    pub theme: Season,
}

#[derive(Debug, Deserialize)]
pub struct SceneLayoutRequest {
    pub season: Season,
    pub positions: BTreeMap<Uuid, Position>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundRequest {
    pub scene_id: String,
    pub image_url: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateNicknameRequest {
    pub nickname: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePasswordRequest {
    pub password: String,
}

pub fn validate_handle(user_id: &str) -> AppResult<&str> {
    let trimmed = user_id.trim();
    let len = trimmed.chars().count();
    if !(1..=10).contains(&len) {
        return Err(AppError::InvalidInput("ID 为 1～10 位".into()));
    }
    Ok(trimmed)
}

pub fn validate_password(password: &str) -> AppResult<&str> {
    let trimmed = password.trim();
    if trimmed.chars().count() != 6 {
        return Err(AppError::InvalidInput("密码必须为 6 位".into()));
    }
    Ok(trimmed)
}

pub fn validate_nickname(nickname: &str) -> AppResult<&str> {
    let trimmed = nickname.trim();
    let len = trimmed.chars().count();
    if !(1..=24).contains(&len) {
        return Err(AppError::InvalidInput("昵称长度必须在1到24个字符之间".into()));
    }
    Ok(trimmed)
}

/// Lock applied after a failed password attempt, given the failure count
/// including this one. The count restarts after the long lock.
pub fn lockout_after(attempts: i32) -> Option<Duration> {
    if attempts >= 10 {
        Some(Duration::hours(1))
    } else if attempts >= 5 {
        Some(Duration::minutes(1))
    } else {
        None
    }
}

impl User {
    pub fn is_moderator(&self) -> bool {
        self.role == UserRole::Moderator
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }

    pub async fn create(
        pool: &PgPool,
        user_id: &str,
        nickname: &str,
        password_hash: &str,
    ) -> AppResult<Self> {
        let query = format!(
            "INSERT INTO users (id, user_id, nickname, password_hash) VALUES ($1, $2, $3, $4) RETURNING {}",
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&query)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(nickname)
            .bind(password_hash)
            .fetch_one(pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Duplicate("该名称/ID 已经被使用，请重新输入".into())
                } else {
                    e.into()
                }
            })
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> AppResult<Option<Self>> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?)
    }

    pub async fn find_by_handle(pool: &PgPool, user_id: &str) -> AppResult<Option<Self>> {
        let query = format!("SELECT {} FROM users WHERE user_id = $1", USER_COLUMNS);
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await?)
    }

    pub async fn require(pool: &PgPool, id: Uuid) -> AppResult<Self> {
        Self::find_by_id(pool, id).await?.ok_or(AppError::UserNotFound)
    }

    pub async fn nickname_taken(pool: &PgPool, nickname: &str) -> AppResult<bool> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE nickname = $1)")
                .bind(nickname)
                .fetch_one(pool)
                .await?;
        Ok(exists)
    }

    pub async fn record_failed_login(
        pool: &PgPool,
        id: Uuid,
        attempts: i32,
        locked_until: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        sqlx::query("UPDATE users SET login_attempts = $1, locked_until = $2 WHERE id = $3")
            .bind(attempts)
            .bind(locked_until)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn reset_login_failures(pool: &PgPool, id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE users SET login_attempts = 0, locked_until = NULL WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Empty or `*` lists everyone except the viewer.
    pub async fn search(
        pool: &PgPool,
        viewer: Uuid,
        nickname: Option<&str>,
    ) -> AppResult<Vec<PublicUser>> {
        let pattern = match nickname.map(str::trim) {
            Some(n) if !n.is_empty() && n != "*" => format!("%{}%", escape_like(n)),
            _ => "%".to_string(),
        };
        Ok(sqlx::query_as::<_, PublicUser>(
            r#"
            SELECT id, nickname, selected_scene
            FROM users
            WHERE id <> $1 AND nickname ILIKE $2
            ORDER BY nickname
            LIMIT $3
            "#,
        )
        .bind(viewer)
        .bind(pattern)
        .bind(SEARCH_LIMIT)
        .fetch_all(pool)
        .await?)
    }

    pub async fn select_scene(pool: &PgPool, id: Uuid, scene_id: &str, theme: Season) -> AppResult<()> {
        sqlx::query("UPDATE users SET selected_scene = $1, theme_preference = $2 WHERE id = $3")
            .bind(scene_id)
            .bind(theme)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Replaces the whole layout of one season.
    pub async fn save_scene_layout(
        pool: &PgPool,
        id: Uuid,
        season: Season,
        positions: &BTreeMap<Uuid, Position>,
    ) -> AppResult<()> {
        let positions: BTreeMap<String, Position> = positions
            .iter()
            .map(|(message_id, pos)| (message_id.to_string(), *pos))
            .collect();
        sqlx::query(
            "UPDATE users SET scene_layout = jsonb_set(scene_layout, ARRAY[$1::text], $2, true) WHERE id = $3",
        )
        .bind(season.as_str())
        .bind(Json(positions))
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Places one sticker on `owner`'s scene without touching the others.
    pub async fn set_sticker_position(
        pool: &PgPool,
        owner: Uuid,
        season: Season,
        message_id: Uuid,
        position: Position,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET scene_layout = jsonb_set(
                scene_layout || jsonb_build_object($1::text, COALESCE(scene_layout -> $1::text, '{}'::jsonb)),
                ARRAY[$1::text, $2::text],
                $3,
                true
            )
            WHERE id = $4
            "#,
        )
        .bind(season.as_str())
        .bind(message_id.to_string())
        .bind(Json(position))
        .bind(owner)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn set_background(pool: &PgPool, id: Uuid, scene_id: &str, image_url: &str) -> AppResult<()> {
        sqlx::query(
            "UPDATE users SET custom_backgrounds = jsonb_set(custom_backgrounds, ARRAY[$1::text], to_jsonb($2::text), true) WHERE id = $3",
        )
        .bind(scene_id)
        .bind(image_url)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Counter and rename land in one statement so concurrent requests
    /// cannot exceed the allowance.
    pub async fn change_nickname(pool: &PgPool, id: Uuid, nickname: &str) -> AppResult<Self> {
        let query = format!(
            r#"
            UPDATE users
            SET nickname = $1, nickname_change_count = nickname_change_count + 1
            WHERE id = $2 AND nickname_change_count < $3
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let updated = sqlx::query_as::<_, User>(&query)
            .bind(nickname)
            .bind(id)
            .bind(MAX_NICKNAME_CHANGES)
            .fetch_optional(pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Duplicate("该名称已经被使用，请重新输入".into())
                } else {
                    e.into()
                }
            })?;
        updated.ok_or_else(|| {
            AppError::LimitReached(format!("昵称最多只能修改 {} 次", MAX_NICKNAME_CHANGES))
        })
    }

    pub async fn change_password(pool: &PgPool, id: Uuid, password_hash: &str) -> AppResult<Self> {
        let query = format!(
            r#"
            UPDATE users
            SET password_hash = $1, password_change_count = password_change_count + 1
            WHERE id = $2 AND password_change_count < $3
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&query)
            .bind(password_hash)
            .bind(id)
            .bind(MAX_PASSWORD_CHANGES)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| {
                AppError::LimitReached(format!("密码最多只能修改 {} 次", MAX_PASSWORD_CHANGES))
            })
    }
}

fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
