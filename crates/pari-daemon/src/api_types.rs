//! Request and response types for all pari-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests. No business logic lives here.

use chrono::{DateTime, Utc};
use pari_ledger::Pools;
use pari_schemas::{LedgerEntryRow, MarketRow, Side, UserRow};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

// ---------------------------------------------------------------------------
// /v1/me
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub balance: i64,
    /// "admin" | "user"
    pub role: String,
}

impl MeResponse {
    pub fn new(user: UserRow, is_admin: bool) -> Self {
        Self {
            id: user.user_id,
            email: user.email,
            name: user.name,
            balance: user.balance,
            role: if is_admin { "admin" } else { "user" }.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// /v1/markets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSummary {
    pub id: Uuid,
    pub question: String,
    pub total_yes: i64,
    pub total_no: i64,
    pub resolved: bool,
    pub outcome_yes: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<&MarketRow> for MarketSummary {
    fn from(m: &MarketRow) -> Self {
        Self {
            id: m.market_id,
            question: m.question.clone(),
            total_yes: m.total_yes,
            total_no: m.total_no,
            resolved: m.resolved,
            outcome_yes: m.outcome_yes(),
            created_at: m.created_at_utc,
            resolved_at: m.resolved_at_utc,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDetail {
    #[serde(flatten)]
    pub summary: MarketSummary,
    /// Share of the total pool backing YES; 0.5 for an empty market.
    pub yes_price: f64,
    pub no_price: f64,
}

impl From<&MarketRow> for MarketDetail {
    fn from(m: &MarketRow) -> Self {
        let pools = Pools::of(m);
        Self {
            summary: MarketSummary::from(m),
            yes_price: pools.yes_price(),
            no_price: pools.no_price(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMarketRequest {
    pub question: Option<String>,
}

// ---------------------------------------------------------------------------
// /v1/markets/{id}/wager | resolve | claim
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WagerResponse {
    pub ok: bool,
    pub side: Side,
    pub amount: i64,
    pub balance: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    pub ok: bool,
    pub outcome_yes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    pub ok: bool,
    pub amount_claimed: i64,
    pub balance: i64,
}

// ---------------------------------------------------------------------------
// /v1/wallet/transactions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub id: Uuid,
    pub kind: String,
    pub amount: i64,
    pub status: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl From<&LedgerEntryRow> for TransactionView {
    fn from(e: &LedgerEntryRow) -> Self {
        Self {
            id: e.entry_id,
            kind: e.kind.as_str().to_string(),
            amount: e.amount,
            status: e.status.as_str().to_string(),
            description: e.description.clone(),
            created_at: e.created_at_utc,
        }
    }
}

// ---------------------------------------------------------------------------
// /v1/payments/webhook
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
}
