use axum::extract::{Extension, State};
use uuid::Uuid;

use crate::{
    AppState,
    error::AppResult,
    extract::{Json, Path},
    utils::Claims,
};

use super::model::{ArchiveRequest, ArchiveResponse, HistoryScene, HistorySceneView, HistorySummary};

#[axum::debug_handler]
pub async fn archive(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ArchiveRequest>,
) -> AppResult<Json<ArchiveResponse>> {
    let count = HistoryScene::archive(&state.pool, claims.sub, req.year, req.season).await?;
    if count > 0 {
        tracing::info!("{} archived {} {} messages from {}", claims.sub, count, req.season, req.year);
    }
    Ok(Json(ArchiveResponse {
        success: true,
        count,
    }))
}

#[axum::debug_handler]
pub async fn list_years(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<HistorySummary>>> {
    Ok(Json(HistoryScene::list_for(&state.pool, claims.sub).await?))
}

#[axum::debug_handler]
pub async fn get_scene(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<HistorySceneView>> {
    let scene = HistoryScene::find_owned(&state.pool, id, claims.sub).await?;
    Ok(Json(HistorySceneView::from(scene)))
}
