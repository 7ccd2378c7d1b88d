//! Identity boundary.
//!
//! An upstream identity layer authenticates the caller and forwards the
//! email in [`PRINCIPAL_HEADER`]. This daemon must only be reachable through
//! that layer.

use axum::http::HeaderMap;
use pari_ledger::{LedgerError, LedgerStore};
use pari_schemas::{Principal, UserRow};

pub const PRINCIPAL_HEADER: &str = "x-pari-user";

pub fn principal_from_headers(headers: &HeaderMap) -> Option<Principal> {
    headers
        .get(PRINCIPAL_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(Principal::new)
}

pub fn require_principal(headers: &HeaderMap) -> Result<Principal, LedgerError> {
    principal_from_headers(headers).ok_or(LedgerError::Unauthenticated)
}

/// The registered user behind `principal`, or `UserNotFound`.
pub async fn require_user(
    store: &dyn LedgerStore,
    principal: &Principal,
) -> Result<UserRow, LedgerError> {
    store
        .fetch_user_by_email(&principal.email)
        .await?
        .ok_or(LedgerError::UserNotFound { user_id: None })
}
