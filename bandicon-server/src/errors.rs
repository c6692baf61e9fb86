use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bandicon_collab::{AuthError, DatabaseError, RoomError};
use bandicon_core::SlotError;
use log::error;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

/// The body of every error response
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    #[schema(example = "This session is already taken by another user")]
    pub detail: String,
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let detail = match &self {
            Self::Unknown(message) => {
                error!("Request failed: {}", message);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (self.as_status_code(), Json(ErrorBody { detail })).into_response()
    }
}

impl From<SlotError> for ServerError {
    fn from(value: SlotError) -> Self {
        let detail = value.to_string();

        match value {
            SlotError::SlotNotFound(_) => Self::NotFound(detail),
            SlotError::NotManager => Self::Forbidden(detail),
            SlotError::SlotOccupied
            | SlotError::AlreadyReserved
            | SlotError::AlreadyConfirmed
            | SlotError::AlreadyEnded => Self::Conflict(detail),
            _ => Self::BadRequest(detail),
        }
    }
}

impl From<RoomError> for ServerError {
    fn from(value: RoomError) -> Self {
        let detail = value.to_string();

        match value {
            RoomError::Slot(e) => e.into(),
            RoomError::Db(e) => e.into(),
            RoomError::RoomNotFound | RoomError::UserNotFound(_) => Self::NotFound(detail),
            RoomError::AlreadyEvaluated => Self::Conflict(detail),
            RoomError::HashError(e) => Self::Unknown(e),
            _ => Self::BadRequest(detail),
        }
    }
}

impl From<AuthError> for ServerError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::InvalidCredentials | AuthError::PasswordTooShort => {
                Self::BadRequest(value.to_string())
            }
            AuthError::InvalidSession => Self::Unauthorized(value.to_string()),
            AuthError::Db(e) => e.into(),
            AuthError::HashError(e) => Self::Unknown(e),
        }
    }
}

impl From<DatabaseError> for ServerError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound { resource, .. } => {
                Self::NotFound(format!("The {} does not exist", resource))
            }
            DatabaseError::Conflict { .. } => Self::Conflict(value.to_string()),
            e => Self::Unknown(e.to_string()),
        }
    }
}
