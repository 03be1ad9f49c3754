//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use ad_credits_core::CreditError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The action has no configured cost.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// Conflict - resource already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Insufficient credits.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// The refund or grant reference was already used.
    #[error("duplicate refund: {0}")]
    DuplicateRefund(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::UnknownAction(action) => (
                StatusCode::BAD_REQUEST,
                "unknown_action",
                format!("No credit cost configured for action {action}"),
                Some(serde_json::json!({ "action": action })),
            ),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::InsufficientCredits { balance, required } => (
                StatusCode::PAYMENT_REQUIRED,
                "insufficient_credits",
                self.to_string(),
                Some(serde_json::json!({
                    "balance": balance,
                    "required": required
                })),
            ),
            Self::DuplicateRefund(key) => (
                StatusCode::CONFLICT,
                "duplicate_refund",
                format!("Reference {key} already credited"),
                None,
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<CreditError> for ApiError {
    fn from(err: CreditError) -> Self {
        match err {
            CreditError::InsufficientCredits { balance, required } => {
                Self::InsufficientCredits { balance, required }
            }
            CreditError::AccountNotFound { .. } => Self::NotFound("Account not found".into()),
            CreditError::AccountAlreadyExists { .. } => {
                Self::Conflict("Account already exists".into())
            }
            CreditError::UnknownAction { action } => Self::UnknownAction(action),
            CreditError::InvalidAmount(msg) | CreditError::InvalidRefund(msg) => {
                Self::BadRequest(msg)
            }
            CreditError::InvalidId(e) => Self::BadRequest(e.to_string()),
            CreditError::DuplicateRefund { key } => Self::DuplicateRefund(key),
            CreditError::Storage(msg) | CreditError::Configuration(msg) => Self::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_errors_map_to_codes() {
        let cases = [
            (
                ApiError::from(CreditError::UnknownAction {
                    action: "x".into(),
                }),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(CreditError::AccountNotFound {
                    user_id: "u".into(),
                }),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(CreditError::DuplicateRefund { key: "k".into() }),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(CreditError::InsufficientCredits {
                    balance: 0,
                    required: 5,
                }),
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                ApiError::from(CreditError::from(
                    "nope".parse::<ad_credits_core::UserId>().unwrap_err(),
                )),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(CreditError::Storage("disk".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
