use axum::{
    extract::{Extension, State},
    http::header,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    AppState,
    error::{AppError, AppResult},
    extract::{Json, Path, Query},
    festival::{MessageView, Season, UnlockOverride, UnlockQuery, current_year},
    routes::{message::Message, user::User},
    utils::{Claims, SuccessResponse, success},
};

use super::model::{
    DecorOwner, DecorResponse, FriendCheckResponse, FriendEntry, FriendLink, FriendRequestBody,
    FriendRequestResponse, FriendStatus, IncomingRequest, OnboardingBot, RespondBody,
};

#[axum::debug_handler]
pub async fn send_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<FriendRequestBody>,
) -> AppResult<Json<FriendRequestResponse>> {
    let link = FriendLink::send_request(
        &state.pool,
        claims.sub,
        payload.target_user_id,
        OnboardingBot::from_config(&state.config),
    )
    .await?;

    let auto_accepted = link.status == FriendStatus::Accepted;
    tracing::info!(
        "Friend request {} from {} to {} (auto accepted: {})",
        link.id,
        claims.sub,
        payload.target_user_id,
        auto_accepted
    );
    Ok(Json(FriendRequestResponse {
        success: true,
        auto_accepted,
    }))
}

#[axum::debug_handler]
pub async fn respond(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<RespondBody>,
) -> AppResult<Json<SuccessResponse>> {
    FriendLink::respond(&state.pool, payload.request_id, claims.sub, payload.action).await?;
    tracing::info!(
        "{} answered friend request {} with {:?}",
        claims.sub,
        payload.request_id,
        payload.action
    );
    Ok(success())
}

/// Accepted friends. The onboarding bot is added on first sight when one
/// is configured.
#[axum::debug_handler]
pub async fn list_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<FriendEntry>>> {
    let mut friends = FriendLink::list_friends(&state.pool, claims.sub).await?;

    if let Some(handle) = OnboardingBot::from_config(&state.config).handle {
        match User::find_by_handle(&state.pool, handle).await? {
            Some(bot) if !friends.iter().any(|f| f.id == bot.id) => {
                if FriendLink::link_onboarding_bot(&state.pool, claims.sub, bot.id).await? {
                    tracing::info!("Linked {} to onboarding bot {}", claims.sub, bot.id);
                    friends = FriendLink::list_friends(&state.pool, claims.sub).await?;
                }
            }
            Some(_) => {}
            None => tracing::debug!("Onboarding bot {} is not registered", handle),
        }
    }

    Ok(Json(friends))
}

#[axum::debug_handler]
pub async fn incoming_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<IncomingRequest>>> {
    let rows = FriendLink::incoming_requests(&state.pool, claims.sub).await?;
    Ok(Json(rows.into_iter().map(IncomingRequest::from).collect()))
}

#[axum::debug_handler]
pub async fn sent_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<Uuid>>> {
    Ok(Json(FriendLink::pending_targets(&state.pool, claims.sub).await?))
}

#[axum::debug_handler]
pub async fn check_friend(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(target_id): Path<Uuid>,
) -> AppResult<Json<FriendCheckResponse>> {
    let is_friend = FriendLink::are_friends(&state.pool, claims.sub, target_id).await?;
    Ok(Json(FriendCheckResponse { is_friend }))
}

/// A friend's spring scene. Friendship is checked before existence so a
/// stranger cannot learn which ids are registered.
#[axum::debug_handler]
pub async fn get_decor(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(friend_id): Path<Uuid>,
    Query(query): Query<UnlockQuery>,
) -> AppResult<impl IntoResponse> {
    if friend_id != claims.sub && !FriendLink::are_friends(&state.pool, claims.sub, friend_id).await? {
        return Err(AppError::NotFriends);
    }
    let owner = User::require(&state.pool, friend_id).await?;

    let now = Utc::now();
    let unlock = UnlockOverride::from_request(state.config.allow_unlock_override, &query);
    let calendar = &state.calendar;

    let messages = Message::received_in_season(&state.pool, owner.id, Season::Spring)
        .await?
        .iter()
        .map(|m| {
            let unlocked = calendar.resolve(m.season, m.year, now, unlock);
            MessageView::for_viewer(m, claims.sub, unlocked)
        })
        .collect();
    let is_unlocked = calendar.resolve(Season::Spring, current_year(now), now, unlock);

    let body = DecorResponse {
        owner: DecorOwner::from(owner),
        messages,
        is_unlocked,
    };
    Ok(([(header::CACHE_CONTROL, "no-store")], Json(body)))
}
