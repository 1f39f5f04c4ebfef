use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::auth::SessionError;
use crate::content::ContentError;
use crate::db::StorageError;
use crate::reactions::ReactionError;
use crate::users::{SignUpErrors, UserError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid sign-up: {0}")]
    SignUp(SignUpErrors),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Storage(e.into())
    }
}

impl From<r2d2::Error> for AppError {
    fn from(e: r2d2::Error) -> Self {
        AppError::Storage(e.into())
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Invalid => AppError::Unauthorized,
            SessionError::ActiveSession => AppError::Conflict(e.to_string()),
            SessionError::LifetimeOutOfRange => AppError::Internal(e.to_string()),
            SessionError::TokenGeneration(e) => AppError::Internal(e.to_string()),
            SessionError::Storage(e) => AppError::Storage(e),
        }
    }
}

impl From<UserError> for AppError {
    fn from(e: UserError) -> Self {
        match e {
            UserError::Invalid(errors) => AppError::SignUp(errors),
            UserError::Duplicate => AppError::Conflict(e.to_string()),
            UserError::InvalidCredentials => AppError::Unauthorized,
            UserError::NotFound => AppError::NotFound,
            UserError::Hash(e) => AppError::Internal(e.to_string()),
            UserError::Storage(e) => AppError::Storage(e),
        }
    }
}

impl From<ReactionError> for AppError {
    fn from(e: ReactionError) -> Self {
        match e {
            ReactionError::TargetNotFound => AppError::NotFound,
            ReactionError::Conflict => AppError::Conflict(e.to_string()),
            ReactionError::Storage(e) => AppError::Storage(e),
        }
    }
}

impl From<ContentError> for AppError {
    fn from(e: ContentError) -> Self {
        match e {
            ContentError::NotFound => AppError::NotFound,
            ContentError::Forbidden => AppError::Forbidden,
            ContentError::Invalid(msg) => AppError::BadRequest(msg),
            ContentError::Storage(e) => AppError::Storage(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::SignUp(errors) => {
                return (StatusCode::BAD_REQUEST, Json(errors.clone())).into_response();
            }
            AppError::Conflict(msg) => {
                tracing::warn!("Conflict: {}", msg);
                (StatusCode::CONFLICT, msg.clone())
            }
            AppError::Storage(e) => {
                tracing::error!("Storage error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, message).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
