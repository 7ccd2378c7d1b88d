//! HTTP mapping for domain errors.
//!
//! Body shape: `{"error": "<message>", "code": "<STABLE_CODE>"}` plus an
//! optional `detail` for provider failures.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pari_ledger::{AmountError, ErrorClass, LedgerError};
use pari_payments::{ProviderError, ReconcileError};

use crate::api_types::ErrorResponse;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub detail: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            detail: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_INPUT", message)
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        let status = match (e.class(), &e) {
            (ErrorClass::Validation, _) => StatusCode::BAD_REQUEST,
            (ErrorClass::Authorization, LedgerError::Unauthenticated) => StatusCode::UNAUTHORIZED,
            (ErrorClass::Authorization, _) => StatusCode::FORBIDDEN,
            (ErrorClass::Precondition, LedgerError::UserNotFound { .. })
            | (ErrorClass::Precondition, LedgerError::MarketNotFound { .. }) => {
                StatusCode::NOT_FOUND
            }
            (ErrorClass::Precondition, _) => StatusCode::BAD_REQUEST,
            (ErrorClass::Integrity, _) => StatusCode::CONFLICT,
            (ErrorClass::Storage, _) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %e, "request failed in store");
        } else if e.is_retryable() {
            tracing::warn!(error = %e, "lost a concurrent update; nothing written");
        }
        Self::new(status, e.code(), e.to_string())
    }
}

impl From<AmountError> for ApiError {
    fn from(e: AmountError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_AMOUNT", e.to_string())
    }
}

impl From<ProviderError> for ApiError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::NotConfigured => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "PROVIDER_NOT_CONFIGURED",
                "payment provider is not configured",
            ),
            other => {
                tracing::error!(error = %other, "payment provider call failed");
                Self {
                    detail: Some(other.detail()),
                    ..Self::new(
                        StatusCode::BAD_GATEWAY,
                        "PROVIDER_FAILED",
                        "failed to create order",
                    )
                }
            }
        }
    }
}

impl From<ReconcileError> for ApiError {
    fn from(e: ReconcileError) -> Self {
        let (status, code) = match &e {
            ReconcileError::NotConfigured => {
                (StatusCode::SERVICE_UNAVAILABLE, "WEBHOOK_NOT_CONFIGURED")
            }
            ReconcileError::BadSignature => (StatusCode::BAD_REQUEST, "INVALID_SIGNATURE"),
            ReconcileError::Malformed(_) => (StatusCode::BAD_REQUEST, "INVALID_JSON"),
            ReconcileError::Commit(_) => (StatusCode::INTERNAL_SERVER_ERROR, "COMMIT_FAILED"),
        };
        Self::new(status, code, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                code: self.code.to_string(),
                detail: self.detail,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn ledger_classes_map_to_status() {
        let id = Uuid::new_v4();
        let cases = [
            (LedgerError::InvalidAmount { amount: 0 }, StatusCode::BAD_REQUEST),
            (LedgerError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (LedgerError::Forbidden, StatusCode::FORBIDDEN),
            (LedgerError::MarketNotFound { market_id: id }, StatusCode::NOT_FOUND),
            (LedgerError::UserNotFound { user_id: None }, StatusCode::NOT_FOUND),
            (
                LedgerError::InsufficientBalance {
                    balance: 1,
                    requested: 2,
                },
                StatusCode::BAD_REQUEST,
            ),
            (LedgerError::AlreadyClaimed { market_id: id }, StatusCode::BAD_REQUEST),
            (LedgerError::Conflict("x".into()), StatusCode::CONFLICT),
            (LedgerError::Storage("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            let code = err.code();
            let api = ApiError::from(err);
            assert_eq!(api.status, status, "{code}");
            assert_eq!(api.code, code);
        }
    }

    #[test]
    fn provider_errors_distinguish_unavailable_from_failed() {
        assert_eq!(
            ApiError::from(ProviderError::NotConfigured).status,
            StatusCode::SERVICE_UNAVAILABLE
        );
        let failed = ApiError::from(ProviderError::Transport("timeout".into()));
        assert_eq!(failed.status, StatusCode::BAD_GATEWAY);
        assert_eq!(failed.detail.as_deref(), Some("timeout"));
    }
}
