use std::sync::Arc;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
};
use tower::ServiceBuilder;

use crate::{
    AppState,
    middleware::{
        RateLimiter, SignatureVerifier, auth_middleware, log_errors, moderator_only, rate_limit,
        verify_signature,
    },
    routes,
};

// 账号相关，无需登录也无需签名
fn auth_routes(state: &AppState) -> Router<AppState> {
    let limiter = Arc::new(RateLimiter::new(
        state.redis.clone(),
        "auth",
        state.config.auth_rate_limit_window(),
        state.config.auth_rate_limit_requests,
    ));

    Router::new()
        .route("/auth/check-id", post(routes::auth::check_id))
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login))
        .layer(from_fn_with_state(limiter, rate_limit))
}

fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(routes::user::get_me))
        .route("/users/search", get(routes::user::search))
        .route("/users/scene", put(routes::user::select_scene))
        .route("/users/scene-layout", put(routes::user::save_scene_layout))
        .route("/users/background", put(routes::user::set_background))
        .route("/users/nickname", put(routes::user::update_nickname))
        .route("/users/password", put(routes::user::update_password))
}

fn friend_routes() -> Router<AppState> {
    Router::new()
        .route("/friends", get(routes::friend::list_friends))
        .route("/friends/request", post(routes::friend::send_request))
        .route("/friends/respond", post(routes::friend::respond))
        .route("/friends/requests", get(routes::friend::incoming_requests))
        .route("/friends/requests/sent", get(routes::friend::sent_requests))
        .route("/friends/check/{id}", get(routes::friend::check_friend))
        .route("/friends/{id}/decor", get(routes::friend::get_decor))
}

// `{id}` is a season on GET and a message id on DELETE
fn message_routes() -> Router<AppState> {
    Router::new()
        .route("/messages", post(routes::message::send_message))
        .route("/messages/detail/{id}", get(routes::message::get_message))
        .route("/messages/sent/{id}", get(routes::message::get_sent))
        .route(
            "/messages/{id}",
            get(routes::message::get_mailbox).delete(routes::message::delete_message),
        )
        .route("/messages/{id}/report", post(routes::message::report_message))
        .route("/messages/{id}/position", put(routes::message::update_position))
}

fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(routes::notification::list_notifications))
        .route("/notifications/read-all", put(routes::notification::mark_all_read))
}

fn history_routes() -> Router<AppState> {
    Router::new()
        .route("/history/archive", post(routes::history::archive))
        .route("/history/years", get(routes::history::list_years))
        .route("/history/{id}", get(routes::history::get_scene))
}

fn admin_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/reports", get(routes::admin::list_reports))
        .route("/admin/reports/{id}", put(routes::admin::resolve_report))
        .layer(from_fn_with_state(state.clone(), moderator_only))
}

/// Every endpoint under `api_base_uri`. Protected routes check the bearer
/// token first, then the request signature.
pub fn create_router(state: AppState) -> Router {
    let verifier = Arc::new(SignatureVerifier::new(&state.config));
    let global_limiter = Arc::new(RateLimiter::new(
        state.redis.clone(),
        "global",
        state.config.rate_limit_window(),
        state.config.rate_limit_requests,
    ));

    let public_routes = Router::new()
        .route("/health", get(routes::health::health))
        .merge(auth_routes(&state));

    let protected_routes = Router::new()
        .merge(user_routes())
        .merge(friend_routes())
        .merge(message_routes())
        .merge(notification_routes())
        .merge(history_routes())
        .merge(admin_routes(&state))
        .layer(from_fn_with_state(verifier, verify_signature))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let api = Router::new().merge(public_routes).merge(protected_routes);
    let base = state.config.api_base_uri.trim_end_matches('/');
    let router = if base.is_empty() {
        api
    } else {
        Router::new().nest(base, api)
    };

    router
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(global_limiter, rate_limit))
                .layer(from_fn(log_errors)),
        )
        .with_state(state)
}
