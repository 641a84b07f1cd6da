use axum::extract::State;
use chrono::Utc;

use crate::{
    AppState,
    error::{AppError, AppResult},
    extract::Json,
    routes::user::{User, lockout_after, validate_handle, validate_nickname, validate_password},
    utils::{generate_token, hash_password, verify_password},
};

use super::model::{CheckIdRequest, CheckIdResponse, LoginRequest, RegisterRequest, TokenResponse};

#[axum::debug_handler]
pub async fn check_id(
    State(state): State<AppState>,
    Json(req): Json<CheckIdRequest>,
) -> AppResult<Json<CheckIdResponse>> {
    let user_id = validate_handle(&req.user_id)?;
    let exists = User::find_by_handle(&state.pool, user_id).await?.is_some();
    Ok(Json(CheckIdResponse { exists }))
}

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Json<TokenResponse>> {
    let user_id = validate_handle(&req.user_id)?;
    let nickname = validate_nickname(&req.nickname)?;
    let password = validate_password(&req.password)?;

    if User::find_by_handle(&state.pool, user_id).await?.is_some()
        || User::nickname_taken(&state.pool, nickname).await?
    {
        return Err(AppError::Duplicate("该名称/ID 已经被使用，请重新输入".into()));
    }

    let password_hash =
        hash_password(password).map_err(|e| AppError::Internal(format!("hash failed: {}", e)))?;
    // The unique indexes still catch a concurrent registration of the same handle.
    let user = User::create(&state.pool, user_id, nickname, &password_hash).await?;
    tracing::info!("Registered user {} ({})", user.user_id, user.id);

    let token = generate_token(user.id, &state.config)?;
    Ok(Json(TokenResponse { success: true, token }))
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let user_id = validate_handle(&req.user_id)?;
    let password = validate_password(&req.password)?;

    let user = User::find_by_handle(&state.pool, user_id)
        .await?
        .ok_or(AppError::NotFound("account"))?;

    let now = Utc::now();
    if let Some(until) = user.locked_until.filter(|_| user.is_locked(now)) {
        let minutes = ((until - now).num_seconds() + 59) / 60;
        return Err(AppError::AccountLocked(format!(
            "账户已冻结，请 {} 分钟后再试",
            minutes.max(1)
        )));
    }

    let valid = verify_password(password, &user.password_hash)
        .map_err(|e| AppError::Internal(format!("verify failed: {}", e)))?;

    if !valid {
        let attempts = user.login_attempts + 1;
        return match lockout_after(attempts) {
            Some(lock) => {
                let stored = if attempts >= 10 { 0 } else { attempts };
                User::record_failed_login(&state.pool, user.id, stored, Some(now + lock)).await?;
                tracing::info!("Locked {} for {} minutes", user.user_id, lock.num_minutes());
                Err(AppError::AccountLocked(format!(
                    "密码错误次数过多，账户已冻结 {} 分钟",
                    lock.num_minutes()
                )))
            }
            None => {
                User::record_failed_login(&state.pool, user.id, attempts, None).await?;
                Err(AppError::InvalidCredentials(format!(
                    "密码错误，还可尝试 {} 次",
                    5 - attempts
                )))
            }
        };
    }

    if user.login_attempts > 0 || user.locked_until.is_some() {
        User::reset_login_failures(&state.pool, user.id).await?;
    }

    let token = generate_token(user.id, &state.config)?;
    Ok(Json(TokenResponse { success: true, token }))
}
