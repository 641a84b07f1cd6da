use axum::extract::{Extension, State};
use uuid::Uuid;

use crate::{
    AppState,
    error::AppResult,
    extract::{Json, Path},
    utils::{Claims, SuccessResponse, success},
};

use super::model::{Report, ReportView, ResolveReportBody};

#[axum::debug_handler]
pub async fn list_reports(State(state): State<AppState>) -> AppResult<Json<Vec<ReportView>>> {
    let rows = Report::list_pending(&state.pool).await?;
    Ok(Json(rows.into_iter().map(ReportView::from).collect()))
}

#[axum::debug_handler]
pub async fn resolve_report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(report_id): Path<Uuid>,
    Json(payload): Json<ResolveReportBody>,
) -> AppResult<Json<SuccessResponse>> {
    let action = payload.parse_action()?;
    let deleted = Report::process(
        &state.pool,
        report_id,
        action,
        payload.delete_message.unwrap_or(false),
    )
    .await?;

    tracing::info!(
        "Moderator {} closed report {} as {:?}{}",
        claims.sub,
        report_id,
        action.outcome(),
        deleted
            .map(|id| format!(", deleted message {}", id))
            .unwrap_or_default()
    );
    Ok(success())
}
