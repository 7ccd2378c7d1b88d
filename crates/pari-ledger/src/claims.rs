//! Claim Processor.
//!
//! Pays a resolved market's winner exactly once per (market, user). The
//! winning stake is the sum of all of the user's wagers on the winning side;
//! losing-side wagers contribute nothing.

use pari_schemas::{MarketRow, Side, WagerRow};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    error::LedgerError,
    question_excerpt,
    settlement::{payout, Pools},
    store::LedgerStore,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub claim_id: Uuid,
    pub amount_claimed: i64,
    /// Balance after the credit.
    pub balance: i64,
}

/// Sum of `user_id`'s wagers on `market_id` backing `side`.
pub fn winning_stake(wagers: &[WagerRow], user_id: Uuid, market_id: Uuid, side: Side) -> i64 {
    wagers
        .iter()
        .filter(|w| w.user_id == user_id && w.market_id == market_id && w.side == side)
        .fold(0i64, |acc, w| acc.saturating_add(w.amount))
}

/// Decide the payout for a claim from rows read inside the commit.
///
/// Order: market exists, resolved with an outcome, not already claimed,
/// winning stake > 0, payout > 0.
pub fn plan_claim(
    market: Option<&MarketRow>,
    market_id: Uuid,
    already_claimed: bool,
    stake_on_winning_side: i64,
) -> Result<i64, LedgerError> {
    let market = market.ok_or(LedgerError::MarketNotFound { market_id })?;
    let outcome = match (market.resolved, market.outcome) {
        (true, Some(outcome)) => outcome,
        _ => return Err(LedgerError::NotResolved { market_id }),
    };
    if already_claimed {
        return Err(LedgerError::AlreadyClaimed { market_id });
    }
    if stake_on_winning_side <= 0 {
        return Err(LedgerError::NothingToClaim { market_id });
    }

    let amount = payout(Pools::of(market), outcome, stake_on_winning_side);
    if amount <= 0 {
        return Err(LedgerError::NothingToClaim { market_id });
    }
    Ok(amount)
}

pub fn claim_description(question: &str) -> String {
    format!("Claim: {}...", question_excerpt(question))
}

pub async fn claim(
    store: &dyn LedgerStore,
    user_id: Uuid,
    market_id: Uuid,
) -> Result<ClaimReceipt, LedgerError> {
    let receipt = store.claim_payout(user_id, market_id).await?;
    info!(
        %user_id,
        %market_id,
        amount_claimed = receipt.amount_claimed,
        balance = receipt.balance,
        "payout claimed"
    );
    Ok(receipt)
}
