//! Pool Accountant.
//!
//! A wager moves `amount` from the user's balance into one of the market's
//! two running pools and leaves an immutable wager row plus a WAGER ledger
//! entry behind. Preconditions are evaluated in a fixed order so callers get
//! the same reportable outcome from every backend:
//!
//! 1. amount > 0
//! 2. user exists
//! 3. user.balance >= amount
//! 4. market exists
//! 5. market is open

use pari_schemas::{MarketRow, Side, UserRow};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{error::LedgerError, question_excerpt, store::LedgerStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WagerRequest {
    pub user_id: Uuid,
    pub market_id: Uuid,
    pub side: Side,
    /// Minor units.
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WagerReceipt {
    pub wager_id: Uuid,
    pub side: Side,
    pub amount: i64,
    /// Balance after the debit.
    pub balance: i64,
}

pub fn validate_amount(amount: i64) -> Result<(), LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount { amount });
    }
    Ok(())
}

/// Evaluate every wager precondition against rows read inside the commit.
pub fn check_wager(
    user: Option<&UserRow>,
    market: Option<&MarketRow>,
    req: &WagerRequest,
) -> Result<(), LedgerError> {
    validate_amount(req.amount)?;

    let user = user.ok_or(LedgerError::UserNotFound {
        user_id: Some(req.user_id),
    })?;
    if user.balance < req.amount {
        return Err(LedgerError::InsufficientBalance {
            balance: user.balance,
            requested: req.amount,
        });
    }

    let market = market.ok_or(LedgerError::MarketNotFound {
        market_id: req.market_id,
    })?;
    if market.resolved {
        return Err(LedgerError::MarketResolved {
            market_id: req.market_id,
        });
    }
    Ok(())
}

/// Add `amount` to the pool backing `side`.
pub fn apply_to_pools(market: &mut MarketRow, side: Side, amount: i64) -> Result<(), LedgerError> {
    let pool = match side {
        Side::Yes => &mut market.total_yes,
        Side::No => &mut market.total_no,
    };
    *pool = pool
        .checked_add(amount)
        .ok_or_else(|| LedgerError::InvalidInput("pool total overflow".to_string()))?;
    Ok(())
}

pub fn wager_description(question: &str) -> String {
    format!("Wager on: {}...", question_excerpt(question))
}

/// Validate input, then hand the wager to the store's atomic commit.
///
/// An ambiguous failure (timeout, dropped connection) is returned as-is and
/// never retried here: a wager is not idempotent.
pub async fn place_wager(
    store: &dyn LedgerStore,
    req: &WagerRequest,
) -> Result<WagerReceipt, LedgerError> {
    validate_amount(req.amount)?;

    let receipt = store.place_wager(req).await?;
    info!(
        user_id = %req.user_id,
        market_id = %req.market_id,
        side = %req.side,
        amount = req.amount,
        balance = receipt.balance,
        "wager placed"
    );
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(balance: i64) -> UserRow {
        UserRow {
            user_id: Uuid::new_v4(),
            email: "u@example.com".to_string(),
            name: "u".to_string(),
            balance,
            created_at_utc: Utc::now(),
        }
    }

    fn market(resolved: bool) -> MarketRow {
        MarketRow {
            market_id: Uuid::new_v4(),
            question: "Will it rain?".to_string(),
            created_by: Uuid::new_v4(),
            total_yes: 0,
            total_no: 0,
            resolved,
            outcome: resolved.then_some(Side::Yes),
            resolved_at_utc: None,
            created_at_utc: Utc::now(),
        }
    }

    fn req(u: &UserRow, m: &MarketRow, amount: i64) -> WagerRequest {
        WagerRequest {
            user_id: u.user_id,
            market_id: m.market_id,
            side: Side::Yes,
            amount,
        }
    }

    #[test]
    fn non_positive_amount_is_rejected_first() {
        let (u, m) = (user(0), market(true));
        assert_eq!(
            check_wager(None, None, &req(&u, &m, 0)),
            Err(LedgerError::InvalidAmount { amount: 0 })
        );
        assert_eq!(
            check_wager(Some(&u), Some(&m), &req(&u, &m, -5)),
            Err(LedgerError::InvalidAmount { amount: -5 })
        );
    }

    #[test]
    fn balance_is_checked_before_market_state() {
        let (u, m) = (user(500), market(true));
        assert_eq!(
            check_wager(Some(&u), Some(&m), &req(&u, &m, 600)),
            Err(LedgerError::InsufficientBalance {
                balance: 500,
                requested: 600
            })
        );
    }

    #[test]
    fn resolved_and_missing_markets_are_rejected() {
        let (u, m) = (user(500), market(true));
        assert_eq!(
            check_wager(Some(&u), Some(&m), &req(&u, &m, 100)),
            Err(LedgerError::MarketResolved {
                market_id: m.market_id
            })
        );
        assert_eq!(
            check_wager(Some(&u), None, &req(&u, &m, 100)),
            Err(LedgerError::MarketNotFound {
                market_id: m.market_id
            })
        );
    }

    #[test]
    fn exact_balance_is_enough() {
        let (u, m) = (user(100), market(false));
        assert!(check_wager(Some(&u), Some(&m), &req(&u, &m, 100)).is_ok());
    }

    #[test]
    fn pool_increment_targets_the_chosen_side() {
        let mut m = market(false);
        apply_to_pools(&mut m, Side::No, 250).unwrap();
        apply_to_pools(&mut m, Side::Yes, 40).unwrap();
        assert_eq!((m.total_yes, m.total_no), (40, 250));

        m.total_yes = i64::MAX;
        assert!(apply_to_pools(&mut m, Side::Yes, 1).is_err());
    }

    #[test]
    fn description_quotes_at_most_fifty_chars() {
        let q = "x".repeat(80);
        let d = wager_description(&q);
        assert_eq!(d, format!("Wager on: {}...", "x".repeat(50)));
    }
}
