//! Durable store seam.
//!
//! # Contract
//! Every mutating method is one atomic commit: either all of its writes land
//! or none do. Rows that feed a decision are re-read inside that commit
//! (row lock, conditional update, or unique constraint), never trusted from a
//! read made earlier by the caller. Implementations run the decision logic of
//! [`crate::pool`], [`crate::settlement`] and [`crate::claims`] on the rows
//! they re-read.

use pari_schemas::{ClaimRow, LedgerEntryRow, MarketRow, Side, UserRow, WagerRow};
use uuid::Uuid;

use crate::{claims::ClaimReceipt, error::LedgerError, pool::WagerReceipt, pool::WagerRequest};

/// A captured external payment to credit to `user_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositCredit {
    /// Provider payment id; the dedup key.
    pub payment_id: String,
    pub order_id: String,
    pub user_id: Uuid,
    /// Minor units, > 0.
    pub amount: i64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepositOutcome {
    Credited { entry_id: Uuid, balance: i64 },
    /// A DEPOSIT entry with this payment id already exists; nothing written.
    Duplicate,
}

#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    async fn fetch_user(&self, user_id: Uuid) -> Result<Option<UserRow>, LedgerError>;

    async fn fetch_user_by_email(&self, email: &str) -> Result<Option<UserRow>, LedgerError>;

    /// Insert the user if absent (with `starter_balance`); return the stored row.
    async fn ensure_user(
        &self,
        email: &str,
        name: &str,
        starter_balance: i64,
    ) -> Result<UserRow, LedgerError>;

    async fn create_market(&self, question: &str, created_by: Uuid)
        -> Result<MarketRow, LedgerError>;

    async fn fetch_market(&self, market_id: Uuid) -> Result<Option<MarketRow>, LedgerError>;

    /// Newest first.
    async fn list_markets(&self) -> Result<Vec<MarketRow>, LedgerError>;

    async fn fetch_markets(&self, market_ids: &[Uuid]) -> Result<Vec<MarketRow>, LedgerError>;

    /// Debit, pool increment, wager insert and WAGER entry in one commit.
    async fn place_wager(&self, req: &WagerRequest) -> Result<WagerReceipt, LedgerError>;

    /// Conditional `resolved = false → true`. Fails with `AlreadyResolved`
    /// when another resolve won; the stored outcome is never changed.
    async fn resolve_market(&self, market_id: Uuid, outcome: Side)
        -> Result<MarketRow, LedgerError>;

    /// Claim insert (unique per market/user), credit and CLAIM entry in one commit.
    async fn claim_payout(&self, user_id: Uuid, market_id: Uuid)
        -> Result<ClaimReceipt, LedgerError>;

    /// Fast-path duplicate check. Not a substitute for the guard inside
    /// [`LedgerStore::credit_deposit`].
    async fn deposit_exists(&self, payment_id: &str) -> Result<bool, LedgerError>;

    /// Credit and DEPOSIT entry in one commit, guarded by uniqueness of the
    /// payment id among DEPOSIT entries.
    async fn credit_deposit(&self, credit: &DepositCredit) -> Result<DepositOutcome, LedgerError>;

    /// Newest first.
    async fn wagers_for_user(&self, user_id: Uuid) -> Result<Vec<WagerRow>, LedgerError>;

    async fn claims_for_user(&self, user_id: Uuid) -> Result<Vec<ClaimRow>, LedgerError>;

    /// Newest first, at most `limit`.
    async fn recent_entries(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<LedgerEntryRow>, LedgerError>;
}
