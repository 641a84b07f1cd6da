use axum::Json;
use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("authentication required")]
    Unauthorized,

    #[error("invalid request signature: {0}")]
    InvalidSignature(&'static str),

    #[error("{0}")]
    Forbidden(String),

    #[error("only friends can do this")]
    NotFriends,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("user not found")]
    UserNotFound,

    #[error("{0}")]
    InvalidInput(String),

    #[error("cannot send a friend request to yourself")]
    SelfRequest,

    #[error("a friend request between these users is already pending")]
    DuplicateRequest,

    #[error("these users are already friends")]
    AlreadyFriends,

    #[error("you have already reported this message")]
    AlreadyReported,

    #[error("this report has already been processed")]
    AlreadyProcessed,

    #[error("{0}")]
    Duplicate(String),

    #[error("{0}")]
    LimitReached(String),

    #[error("{0}")]
    AccountLocked(String),

    #[error("{0}")]
    InvalidCredentials(String),

    #[error("too many requests, retry in {0} seconds")]
    RateLimited(u64),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidInput(format!("请求体格式错误: {}", rejection.body_text()))
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::InvalidInput(format!("路径参数错误: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::InvalidInput(format!("查询参数错误: {}", rejection.body_text()))
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized | AppError::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::NotFriends | AppError::AccountLocked(_) => {
                StatusCode::FORBIDDEN
            }
            AppError::NotFound(_) | AppError::UserNotFound => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_)
            | AppError::SelfRequest
            | AppError::DuplicateRequest
            | AppError::AlreadyFriends
            | AppError::AlreadyReported
            | AppError::AlreadyProcessed
            | AppError::Duplicate(_)
            | AppError::LimitReached(_)
            | AppError::InvalidCredentials(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Database(_) | AppError::Redis(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::InvalidSignature(_) => "INVALID_SIGNATURE",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFriends => "NOT_FRIENDS",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::UserNotFound => "USER_NOT_FOUND",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::SelfRequest => "SELF_REQUEST",
            AppError::DuplicateRequest => "DUPLICATE_REQUEST",
            AppError::AlreadyFriends => "ALREADY_FRIENDS",
            AppError::AlreadyReported => "ALREADY_REPORTED",
            AppError::AlreadyProcessed => "ALREADY_PROCESSED",
            AppError::Duplicate(_) => "DUPLICATE",
            AppError::LimitReached(_) => "LIMIT_REACHED",
            AppError::AccountLocked(_) => "ACCOUNT_LOCKED",
            AppError::InvalidCredentials(_) => "INVALID_PASSWORD",
            AppError::RateLimited(_) => "RATE_LIMITED",
            AppError::Database(_) | AppError::Redis(_) | AppError::Internal(_) => "SERVER_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                "服务器繁忙，请稍后重试".to_string()
            }
            AppError::Redis(e) => {
                tracing::error!("Redis error: {}", e);
                "服务器繁忙，请稍后重试".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "服务器繁忙，请稍后重试".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(ErrorResponse {
            error: self.code(),
            message,
        });

        (status, body).into_response()
    }
}
