use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::{
    AppState,
    error::AppError,
    routes::user::User,
    utils::{Claims, verify_token},
};

/// Validates `Authorization: Bearer <jwt>` and exposes the [`Claims`] to
/// handlers as a request extension.
///
/// [`Claims`]: crate::utils::Claims
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(AppError::Unauthorized)?;

    let claims = verify_token(bearer.token(), &state.config.jwt_secret).map_err(|e| {
        tracing::debug!("Rejected bearer token: {}", e);
        AppError::Unauthorized
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Lets a request through only if the caller is currently a moderator.
/// The role is read from the database, not the token, so a demotion takes
/// effect immediately. Must run after [`auth_middleware`].
pub async fn moderator_only(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .cloned()
        .ok_or(AppError::Unauthorized)?;

    let user = User::require(&state.pool, claims.sub).await?;
    if !user.is_moderator() {
        tracing::warn!("Non-moderator {} tried to reach {}", claims.sub, req.uri().path());
        return Err(AppError::Forbidden("需要管理员权限".into()));
    }
    Ok(next.run(req).await)
}
