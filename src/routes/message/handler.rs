use axum::extract::{Extension, State};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    AppState,
    error::AppResult,
    extract::{Json, Path, Query},
    festival::{MessageView, Season, UnlockOverride, UnlockQuery, current_year},
    routes::{
        admin::Report,
        user::{Position, User},
    },
    utils::{Claims, SuccessResponse, success},
};

use super::model::{
    MailboxResponse, Message, MessageDetailResponse, ReportRequest, SendMessageRequest,
    SendMessageResponse, SentMessagesResponse,
};

#[axum::debug_handler]
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<SendMessageRequest>,
) -> AppResult<Json<SendMessageResponse>> {
    let new = payload.into_new(claims.sub, Utc::now())?;
    let message_id = Message::send(&state.pool, new).await?;
    Ok(Json(SendMessageResponse {
        success: true,
        message_id,
    }))
}

/// This year's stickers for one season, with a single unlock flag shared by
/// the whole list.
#[axum::debug_handler]
pub async fn get_mailbox(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(season): Path<String>,
    Query(query): Query<UnlockQuery>,
) -> AppResult<Json<MailboxResponse>> {
    let season: Season = season.parse()?;
    let now = Utc::now();
    let year = current_year(now);
    let unlock = UnlockOverride::from_request(state.config.allow_unlock_override, &query);
    let is_unlocked = state.calendar.resolve(season, year, now, unlock);

    let messages = Message::mailbox(&state.pool, claims.sub, season, year).await?;
    let messages = messages
        .iter()
        .map(|m| MessageView::for_viewer(m, claims.sub, is_unlocked))
        .collect();

    Ok(Json(MailboxResponse {
        messages,
        is_unlocked,
    }))
}

#[axum::debug_handler]
pub async fn get_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Query(query): Query<UnlockQuery>,
) -> AppResult<Json<MessageDetailResponse>> {
    let message = Message::require(&state.pool, id).await?;
    message.ensure_can_view(claims.sub)?;

    let unlock = UnlockOverride::from_request(state.config.allow_unlock_override, &query);
    let is_unlocked = state
        .calendar
        .resolve(message.season, message.year, Utc::now(), unlock);

    Ok(Json(MessageDetailResponse {
        message: MessageView::for_viewer(&message, claims.sub, is_unlocked),
        is_unlocked,
    }))
}

#[axum::debug_handler]
pub async fn get_sent(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(season): Path<String>,
) -> AppResult<Json<SentMessagesResponse>> {
    let season: Season = season.parse()?;
    let year = current_year(Utc::now());

    let messages = Message::sent_by(&state.pool, claims.sub, season, year).await?;
    Ok(Json(SentMessagesResponse {
        messages: messages.iter().map(MessageView::for_author).collect(),
    }))
}

#[axum::debug_handler]
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SuccessResponse>> {
    let message = Message::require(&state.pool, id).await?;
    message.ensure_can_delete(claims.sub)?;

    Message::delete(&state.pool, message.id).await?;
    tracing::info!("{} deleted received message {}", claims.sub, message.id);
    Ok(success())
}

#[axum::debug_handler]
pub async fn report_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReportRequest>,
) -> AppResult<Json<SuccessResponse>> {
    let message = Message::require(&state.pool, id).await?;
    let report_id = Report::create(&state.pool, &message, claims.sub, payload.reason).await?;
    tracing::info!("{} reported message {} ({})", claims.sub, message.id, report_id);
    Ok(success())
}

/// The sender arranges their sticker on the recipient's scene.
#[axum::debug_handler]
pub async fn update_position(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(position): Json<Position>,
) -> AppResult<Json<SuccessResponse>> {
    position.validate()?;
    let message = Message::require(&state.pool, id).await?;
    message.ensure_can_place(claims.sub)?;

    User::set_sticker_position(
        &state.pool,
        message.recipient_id,
        message.season,
        message.id,
        position,
    )
    .await?;
    Ok(success())
}
