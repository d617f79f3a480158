//! API error type.
//!
//! Every failure a handler can produce ends up here and leaves as
//! `{"code": "...", "message": "..."}` with a matching status:
//!
//! ```text
//! ValidationError ─┐
//! CoreError ───────┼──► ApiError { status, code, message, details? } ──► JSON
//! DbError ─────────┤
//! AuthError ───────┤
//! ExportError ─────┘
//! ```
//!
//! axum's extractor rejections (bad JSON, query or path) keep their HTTP
//! status and become `VALIDATION_ERROR`.
//!
//! Database and internal failures are logged with their cause and reported
//! to the client with a generic message.

use axum::extract::rejection::{BytesRejection, JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error};

use caixa_core::{CoreError, ValidationError};
use caixa_db::DbError;

use crate::auth::AuthError;
use crate::export::ExportError;

#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        ApiError {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn internal(cause: impl std::fmt::Display) -> Self {
        error!(error = %cause, "Internal error");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", "Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code,
            message: &self.message,
            details: self.details.as_ref(),
        };
        (self.status, Json(body)).into_response()
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
    }
}

/// Request shape errors: the status axum picked, our code, axum's reason.
fn rejected(status: StatusCode, reason: String) -> ApiError {
    debug!(%status, %reason, "Request rejected by extractor");
    ApiError::new(status, "VALIDATION_ERROR", reason)
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        rejected(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        rejected(rejection.status(), rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        rejected(rejection.status(), rejection.body_text())
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        rejected(rejection.status(), rejection.body_text())
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::Validation(e) => e.into(),
            CoreError::SessionAlreadyOpen => {
                ApiError::new(StatusCode::CONFLICT, "SESSION_ALREADY_OPEN", message)
            }
            CoreError::NoOpenSession | CoreError::SessionClosed(_) => {
                ApiError::new(StatusCode::CONFLICT, "NO_OPEN_SESSION", message)
            }
            CoreError::SessionNotFound(_) | CoreError::ProductNotFound(_) => {
                ApiError::not_found(message)
            }
            CoreError::BalanceMismatch {
                declared,
                expected,
                difference,
            } => ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "BALANCE_MISMATCH", message)
                .with_details(json!({
                    "declared": declared.to_decimal_string(),
                    "expected": expected.to_decimal_string(),
                    "difference": difference.to_decimal_string(),
                })),
            CoreError::InsufficientStock {
                available,
                requested,
                ..
            } => ApiError::new(StatusCode::CONFLICT, "INSUFFICIENT_STOCK", message)
                .with_details(json!({ "available": available, "requested": requested })),
            CoreError::NoImportPreview => {
                ApiError::new(StatusCode::CONFLICT, "NO_IMPORT_PREVIEW", message)
            }
            CoreError::AmountOverflow(_) => {
                ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", message)
            }
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Rule(rule) => rule.into(),
            DbError::NotFound { .. } => ApiError::not_found(err.to_string()),
            DbError::UniqueViolation { .. } => {
                ApiError::new(StatusCode::CONFLICT, "VALIDATION_ERROR", err.to_string())
            }
            DbError::CheckViolation(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
            }
            other => {
                error!(error = %other, "Database error");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Database operation failed",
                )
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        match err {
            AuthError::InvalidCredentials
            | AuthError::InvalidTwoFactorCode
            | AuthError::Unauthenticated => {
                ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
            }
            AuthError::InvalidToken(_) => {
                ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Invalid or expired token")
            }
            AuthError::AccountLocked { until } => {
                ApiError::new(StatusCode::LOCKED, "ACCOUNT_LOCKED", message)
                    .with_details(json!({ "locked_until": until.to_rfc3339() }))
            }
            AuthError::DeviceMismatch { can_unlink } => {
                ApiError::new(StatusCode::FORBIDDEN, "DEVICE_MISMATCH", message)
                    .with_details(json!({ "can_unlink": can_unlink }))
            }
            AuthError::SessionReplaced => {
                ApiError::new(StatusCode::UNAUTHORIZED, "SESSION_REPLACED", message)
            }
            AuthError::Forbidden => ApiError::new(StatusCode::FORBIDDEN, "FORBIDDEN", message),
            AuthError::TwoFactorNotEnrolled => {
                ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
            }
            AuthError::TokenCreation(_) | AuthError::PasswordHash(_) => ApiError::internal(message),
        }
    }
}

impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        ApiError::internal(err)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
