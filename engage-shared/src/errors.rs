use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::types::api::ApiErrorResponse;

/// Application error codes following the pattern E{area}{sequence}
///
/// Ranges:
/// - E0xxx: Shared/infrastructure errors
/// - E1xxx: Auth errors
/// - E8xxx: Engagement and earnings errors
/// - E9xxx: Integrity review errors (flags, warnings)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Shared (E0xxx)
    InternalError,
    ValidationError,
    NotFound,
    Unauthorized,
    Forbidden,
    RateLimited,

    // Auth (E1xxx)
    TokenExpired,
    TokenInvalid,
    SchedulerSecretInvalid,

    // Engagement and earnings (E8xxx)
    PostNotFound,
    UserNotFound,
    DuplicateEngagement,
    EngagementNotFound,
    CapExceeded,
    PayeeUnverified,

    // Integrity review (E9xxx)
    FlagNotFound,
    FlagAlreadyResolved,
    InvalidReviewDecision,
    WarningNotFound,
    WarningAlreadyCleared,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            // Shared
            Self::InternalError => "E0001",
            Self::ValidationError => "E0002",
            Self::NotFound => "E0003",
            Self::Unauthorized => "E0004",
            Self::Forbidden => "E0005",
            Self::RateLimited => "E0006",

            // Auth
            Self::TokenExpired => "E1004",
            Self::TokenInvalid => "E1005",
            Self::SchedulerSecretInvalid => "E1015",

            // Engagement and earnings
            Self::PostNotFound => "E8001",
            Self::UserNotFound => "E8002",
            Self::DuplicateEngagement => "E8003",
            Self::EngagementNotFound => "E8004",
            Self::CapExceeded => "E8005",
            Self::PayeeUnverified => "E8006",

            // Integrity review
            Self::FlagNotFound => "E9001",
            Self::FlagAlreadyResolved => "E9002",
            Self::InvalidReviewDecision => "E9003",
            Self::WarningNotFound => "E9004",
            Self::WarningAlreadyCleared => "E9005",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ValidationError | Self::InvalidReviewDecision => StatusCode::BAD_REQUEST,
            Self::NotFound | Self::PostNotFound | Self::UserNotFound
            | Self::EngagementNotFound | Self::FlagNotFound
            | Self::WarningNotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized | Self::TokenExpired | Self::TokenInvalid
            | Self::SchedulerSecretInvalid => StatusCode::UNAUTHORIZED,
            Self::Forbidden | Self::PayeeUnverified => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::DuplicateEngagement | Self::FlagAlreadyResolved
            | Self::WarningAlreadyCleared => StatusCode::CONFLICT,
            Self::CapExceeded => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known {
        code: ErrorCode,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: ErrorCode, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// The structured code carried by this error, if it is a known one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            AppError::Known { code, .. } => Some(*code),
            AppError::Validation(_) => Some(ErrorCode::ValidationError),
            AppError::Internal(_) | AppError::Database(_) => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            AppError::Known { code, message, details } => {
                let status = code.status_code();
                let mut resp = ApiErrorResponse::new(code.code(), message);
                if let Some(d) = details {
                    resp = resp.with_details(d.clone());
                }
                (status, resp)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new("E0001", "internal server error"),
                )
            }
            AppError::Database(err) => {
                tracing::error!(error = %err, "database error");
                match err {
                    diesel::result::Error::NotFound => (
                        StatusCode::NOT_FOUND,
                        ApiErrorResponse::new("E0003", "resource not found"),
                    ),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ApiErrorResponse::new("E0001", "database error"),
                    ),
                }
            }
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorResponse::new("E0002", msg),
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
