//! pari-schemas
//!
//! Row and value types shared by every pari crate. Money is always `i64`
//! minor currency units (paise / cents). No IO lives here.

use std::fmt;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

/// One of the two outcomes of a binary market.
///
/// Used both for the side a wager backs and for the declared outcome of a
/// resolved market. Raw strings and booleans are converted at the boundary
/// and never passed further inward.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    /// Storage representation (`YES` / `NO`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Yes => "YES",
            Side::No => "NO",
        }
    }

    /// Case-insensitive parse of `yes` / `no`.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" => Ok(Side::Yes),
            "no" => Ok(Side::No),
            other => Err(anyhow!("invalid side '{}'. expected one of: yes | no", other)),
        }
    }

    pub fn from_outcome_yes(outcome_yes: bool) -> Self {
        if outcome_yes {
            Side::Yes
        } else {
            Side::No
        }
    }

    pub fn is_yes(&self) -> bool {
        matches!(self, Side::Yes)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Ledger entry kind / status
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerKind {
    Wager,
    Claim,
    Deposit,
    Withdrawal,
}

impl LedgerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerKind::Wager => "WAGER",
            LedgerKind::Claim => "CLAIM",
            LedgerKind::Deposit => "DEPOSIT",
            LedgerKind::Withdrawal => "WITHDRAWAL",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "WAGER" => Ok(LedgerKind::Wager),
            "CLAIM" => Ok(LedgerKind::Claim),
            "DEPOSIT" => Ok(LedgerKind::Deposit),
            "WITHDRAWAL" => Ok(LedgerKind::Withdrawal),
            other => Err(anyhow!("invalid ledger kind: {}", other)),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerStatus {
    Pending,
    Completed,
    Failed,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Pending => "PENDING",
            LedgerStatus::Completed => "COMPLETED",
            LedgerStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(LedgerStatus::Pending),
            "COMPLETED" => Ok(LedgerStatus::Completed),
            "FAILED" => Ok(LedgerStatus::Failed),
            other => Err(anyhow!("invalid ledger status: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Authenticated caller as established by the upstream identity layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Normalised (trimmed, lower-cased) email.
    pub email: String,
}

impl Principal {
    /// Returns `None` for a blank identity.
    pub fn new(raw_email: &str) -> Option<Self> {
        let email = raw_email.trim().to_ascii_lowercase();
        if email.is_empty() {
            None
        } else {
            Some(Self { email })
        }
    }

    /// Display name derived from the email local part.
    pub fn display_name(&self) -> String {
        self.email
            .split('@')
            .next()
            .unwrap_or(self.email.as_str())
            .to_string()
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRow {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    /// Never negative.
    pub balance: i64,
    pub created_at_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketRow {
    pub market_id: Uuid,
    pub question: String,
    pub created_by: Uuid,
    pub total_yes: i64,
    pub total_no: i64,
    pub resolved: bool,
    /// Set exactly once, together with `resolved`.
    pub outcome: Option<Side>,
    pub resolved_at_utc: Option<DateTime<Utc>>,
    pub created_at_utc: DateTime<Utc>,
}

impl MarketRow {
    pub fn total_pool(&self) -> i64 {
        self.total_yes.saturating_add(self.total_no)
    }

    pub fn outcome_yes(&self) -> Option<bool> {
        self.outcome.map(|s| s.is_yes())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WagerRow {
    pub wager_id: Uuid,
    pub market_id: Uuid,
    pub user_id: Uuid,
    pub side: Side,
    pub amount: i64,
    pub created_at_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRow {
    pub claim_id: Uuid,
    pub market_id: Uuid,
    pub user_id: Uuid,
    pub amount_claimed: i64,
    pub created_at_utc: DateTime<Utc>,
}

/// Append-only wallet transaction. Signed amount: debits are negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntryRow {
    pub entry_id: Uuid,
    pub user_id: Uuid,
    pub kind: LedgerKind,
    pub amount: i64,
    pub status: LedgerStatus,
    /// Internal row this entry accounts for (wager id, claim id).
    pub reference_id: Option<String>,
    /// Provider payment id for deposits; unique among DEPOSIT entries.
    pub external_ref: Option<String>,
    pub description: String,
    pub created_at_utc: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_parse_is_case_insensitive_and_closed() {
        assert_eq!(Side::parse("YES").unwrap(), Side::Yes);
        assert_eq!(Side::parse(" no ").unwrap(), Side::No);
        assert!(Side::parse("maybe").is_err());
        assert!(Side::parse("").is_err());
    }

    #[test]
    fn side_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Side::Yes).unwrap(), "\"yes\"");
        assert_eq!(Side::No.as_str(), "NO");
    }

    #[test]
    fn market_total_pool_saturates() {
        let m = MarketRow {
            market_id: Uuid::new_v4(),
            question: "q".to_string(),
            created_by: Uuid::new_v4(),
            total_yes: i64::MAX,
            total_no: 5,
            resolved: false,
            outcome: None,
            resolved_at_utc: None,
            created_at_utc: Utc::now(),
        };
        assert_eq!(m.total_pool(), i64::MAX);
    }

    #[test]
    fn principal_normalises_and_rejects_blank() {
        let p = Principal::new("  Alice@Example.COM ").unwrap();
        assert_eq!(p.email, "alice@example.com");
        assert_eq!(p.display_name(), "alice");
        assert!(Principal::new("   ").is_none());
    }

    #[test]
    fn ledger_kind_round_trips_storage_str() {
        for k in [
            LedgerKind::Wager,
            LedgerKind::Claim,
            LedgerKind::Deposit,
            LedgerKind::Withdrawal,
        ] {
            assert_eq!(LedgerKind::parse(k.as_str()).unwrap(), k);
        }
    }
}
