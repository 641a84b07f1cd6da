use axum::extract::{Extension, State};

use crate::{
    AppState,
    error::{AppError, AppResult},
    extract::{Json, Query},
    utils::{Claims, SuccessResponse, hash_password, success},
};

use super::model::{
    BackgroundRequest, Profile, PublicUser, SceneLayoutRequest, SearchQuery, SelectSceneRequest,
    UpdateNicknameRequest, UpdatePasswordRequest, User, validate_nickname, validate_password,
};

#[axum::debug_handler]
pub async fn get_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Profile>> {
    let user = User::require(&state.pool, claims.sub).await?;
    Ok(Json(Profile::from(user)))
}

#[axum::debug_handler]
pub async fn search(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Vec<PublicUser>>> {
    let users = User::search(&state.pool, claims.sub, query.nickname.as_deref()).await?;
    Ok(Json(users))
}

#[axum::debug_handler]
pub async fn select_scene(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SelectSceneRequest>,
) -> AppResult<Json<SuccessResponse>> {
    let scene_id = req.scene_id.trim();
    if scene_id.is_empty() {
        return Err(AppError::InvalidInput("sceneId 不能为空".into()));
    }
    User::select_scene(&state.pool, claims.sub, scene_id, req.theme).await?;
    Ok(success())
}

#[axum::debug_handler]
pub async fn save_scene_layout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SceneLayoutRequest>,
) -> AppResult<Json<SuccessResponse>> {
    for position in req.positions.values() {
        position.validate()?;
    }
    User::save_scene_layout(&state.pool, claims.sub, req.season, &req.positions).await?;
    Ok(success())
}

#[axum::debug_handler]
pub async fn set_background(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<BackgroundRequest>,
) -> AppResult<Json<SuccessResponse>> {
    let scene_id = req.scene_id.trim();
    let image_url = req.image_url.trim();
    if scene_id.is_empty() || image_url.is_empty() {
        return Err(AppError::InvalidInput("sceneId 和 imageUrl 不能为空".into()));
    }
    if image_url.contains("://") || image_url.starts_with("data:") {
        return Err(AppError::InvalidInput("imageUrl 只能是站内资源路径".into()));
    }
    User::set_background(&state.pool, claims.sub, scene_id, image_url).await?;
    Ok(success())
}

#[axum::debug_handler]
pub async fn update_nickname(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateNicknameRequest>,
) -> AppResult<Json<Profile>> {
    let nickname = validate_nickname(&req.nickname)?;
    let user = User::change_nickname(&state.pool, claims.sub, nickname).await?;
    tracing::info!("User {} changed nickname ({} used)", user.id, user.nickname_change_count);
    Ok(Json(Profile::from(user)))
}

#[axum::debug_handler]
pub async fn update_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdatePasswordRequest>,
) -> AppResult<Json<Profile>> {
    let password = validate_password(&req.password)?;
    let password_hash =
        hash_password(password).map_err(|e| AppError::Internal(format!("hash failed: {}", e)))?;
    let user = User::change_password(&state.pool, claims.sub, &password_hash).await?;
    tracing::info!("User {} changed password", user.id);
    Ok(Json(Profile::from(user)))
}
