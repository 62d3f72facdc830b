//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use storyvault_core::{IdError, LedgerError, PaymentStatus, Tier};
use storyvault_store::StoreError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden - valid credentials but the resource belongs to someone else.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

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

    /// No votes of the tier remain for this contest.
    #[error("no {tier} votes remaining")]
    AllowanceExhausted {
        /// The exhausted tier.
        tier: Tier,
    },

    /// The contest is outside its voting window.
    #[error("contest not open for voting: {0}")]
    ContestNotVotable(String),

    /// The payment processor does not report the session as paid.
    #[error("payment not confirmed: status={status}")]
    PaymentNotConfirmed {
        /// Status reported by the processor.
        status: PaymentStatus,
    },

    /// Storage stayed contended after retries.
    #[error("storage conflict: {0}")]
    StorageConflict(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// External service error.
    #[error("external service error: {0}")]
    ExternalService(String),
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
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone(), None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
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
            Self::AllowanceExhausted { tier } => (
                StatusCode::CONFLICT,
                "allowance_exhausted",
                self.to_string(),
                Some(serde_json::json!({ "tier": tier })),
            ),
            Self::ContestNotVotable(msg) => (
                StatusCode::CONFLICT,
                "contest_not_votable",
                msg.clone(),
                None,
            ),
            Self::PaymentNotConfirmed { status } => (
                StatusCode::PAYMENT_REQUIRED,
                "payment_not_confirmed",
                self.to_string(),
                Some(serde_json::json!({ "status": status })),
            ),
            Self::StorageConflict(msg) => {
                tracing::warn!(error = %msg, "Storage conflict persisted after retries");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "storage_conflict",
                    "The request conflicted with concurrent updates, try again".to_string(),
                    None,
                )
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            Self::ExternalService(msg) => (
                StatusCode::BAD_GATEWAY,
                "external_service_error",
                msg.clone(),
                None,
            ),
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

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound(format!("{entity} not found: {id}")),
            StoreError::AlreadyExists { entity, id } => {
                Self::Conflict(format!("{entity} already exists: {id}"))
            }
            StoreError::InsufficientCredits { balance, required } => {
                Self::InsufficientCredits { balance, required }
            }
            StoreError::AllowanceExhausted { tier } => Self::AllowanceExhausted { tier },
            StoreError::Conflict(msg) => Self::StorageConflict(msg),
            StoreError::InvalidEntry(e) => Self::BadRequest(e.to_string()),
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<IdError> for ApiError {
    fn from(err: IdError) -> Self {
        Self::BadRequest(format!("invalid id: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_api_errors() {
        assert!(matches!(
            ApiError::from(StoreError::Conflict("busy".into())),
            ApiError::StorageConflict(_)
        ));
        assert!(matches!(
            ApiError::from(StoreError::AllowanceExhausted { tier: Tier::Free }),
            ApiError::AllowanceExhausted { tier: Tier::Free }
        ));
        assert!(matches!(
            ApiError::from(StoreError::InvalidEntry(LedgerError::ZeroAmount)),
            ApiError::BadRequest(_)
        ));
    }

    #[test]
    fn status_codes() {
        let cases = [
            (ApiError::Unauthorized, StatusCode::UNAUTHORIZED),
            (
                ApiError::AllowanceExhausted { tier: Tier::Super },
                StatusCode::CONFLICT,
            ),
            (
                ApiError::PaymentNotConfirmed {
                    status: PaymentStatus::Unpaid,
                },
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                ApiError::StorageConflict("busy".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
