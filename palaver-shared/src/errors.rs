use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::types::ApiErrorResponse;

/// Application error codes following the pattern E{area}{sequence}
///
/// Ranges:
/// - E0xxx: Shared/infrastructure errors
/// - E1xxx: Identity and session errors
/// - E2xxx: Profile errors
/// - E4xxx: Messaging and group errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Shared (E0xxx)
    InternalError,
    ValidationError,
    Unauthorized,
    PayloadTooLarge,
    MalformedReference,

    // Identity (E1xxx)
    InvalidCredentials,
    UsernameTaken,
    EmailTaken,
    TokenExpired,
    TokenInvalid,
    SessionRevoked,
    PasswordTooWeak,

    // Profile (E2xxx)
    UserNotFound,
    AvatarUploadFailed,

    // Messaging (E4xxx)
    MessageNotFound,
    GroupNotFound,
    GroupNameRequired,
    NotGroupCreator,
    InvalidChatType,
    AttachmentUploadFailed,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            // Shared
            Self::InternalError => "E0001",
            Self::ValidationError => "E0002",
            Self::Unauthorized => "E0004",
            Self::PayloadTooLarge => "E0009",
            Self::MalformedReference => "E0010",

            // Identity
            Self::InvalidCredentials => "E1001",
            Self::UsernameTaken => "E1002",
            Self::EmailTaken => "E1003",
            Self::TokenExpired => "E1004",
            Self::TokenInvalid => "E1005",
            Self::SessionRevoked => "E1006",
            Self::PasswordTooWeak => "E1008",

            // Profile
            Self::UserNotFound => "E2001",
            Self::AvatarUploadFailed => "E2004",

            // Messaging
            Self::MessageNotFound => "E4003",
            Self::GroupNameRequired => "E4004",
            Self::GroupNotFound => "E4005",
            Self::NotGroupCreator => "E4006",
            Self::InvalidChatType => "E4007",
            Self::AttachmentUploadFailed => "E4008",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ValidationError | Self::PasswordTooWeak
            | Self::MalformedReference | Self::GroupNameRequired
            | Self::InvalidChatType => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UserNotFound | Self::MessageNotFound
            | Self::GroupNotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized | Self::InvalidCredentials | Self::TokenExpired
            | Self::TokenInvalid | Self::SessionRevoked => StatusCode::UNAUTHORIZED,
            Self::NotGroupCreator => StatusCode::FORBIDDEN,
            Self::UsernameTaken | Self::EmailTaken => StatusCode::CONFLICT,
            Self::AvatarUploadFailed | Self::AttachmentUploadFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known { code: ErrorCode, message: String },

    /// An anonymous browser hit a protected page; answered with a redirect.
    #[error("login required")]
    LoginRequired,

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// The code this error is reported under, if it carries one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            AppError::Known { code, .. } => Some(*code),
            AppError::LoginRequired => Some(ErrorCode::Unauthorized),
            AppError::Internal(_) | AppError::Database(_) => Some(ErrorCode::InternalError),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            AppError::Known { code, message } => {
                let status = code.status_code();
                if status.is_server_error() {
                    tracing::error!(code = code.code(), error = %message, "request failed");
                }
                (status, ApiErrorResponse::new(code.code(), message))
            }
            AppError::LoginRequired => {
                return Redirect::to("/login").into_response();
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new(ErrorCode::InternalError.code(), "internal server error"),
                )
            }
            AppError::Database(err) => {
                tracing::error!(error = %err, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new(ErrorCode::InternalError.code(), "internal server error"),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
