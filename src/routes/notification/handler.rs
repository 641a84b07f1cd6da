use std::time::Duration;

use axum::extract::{Extension, State};
use chrono::Utc;
use sqlx::PgPool;

use crate::{
    AppState,
    error::AppResult,
    extract::Json,
    utils::{Claims, SuccessResponse, success},
};

use super::model::{Notification, NotificationView, retention_cutoff};

#[axum::debug_handler]
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<NotificationView>>> {
    let notes = Notification::list_for(&state.pool, claims.sub).await?;
    Ok(Json(notes.into_iter().map(NotificationView::from).collect()))
}

#[axum::debug_handler]
pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<SuccessResponse>> {
    let updated = Notification::mark_all_read(&state.pool, claims.sub).await?;
    tracing::debug!("Marked {} notifications read for {}", updated, claims.sub);
    Ok(success())
}

/// Periodically drops read notifications past their retention.
pub fn spawn_retention_task(pool: PgPool, retention_days: i64, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let cutoff = retention_cutoff(Utc::now(), retention_days);
            match Notification::purge_read_before(&pool, cutoff).await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Purged {} read notifications older than {}", n, cutoff),
                Err(e) => tracing::error!("Notification purge failed: {}", e),
            }
        }
    });
}
