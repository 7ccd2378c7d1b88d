//! Settlement Engine.
//!
//! Market lifecycle is `OPEN → RESOLVED` (terminal). Resolution freezes the
//! outcome and both pools; payouts are derived from the frozen pools on
//! demand and only persisted when claimed.
//!
//! # Payout
//! With winning pool `W`, total pool `T = yes + no` and winning-side stake
//! `s`, `payout = floor(T * s / W)`. `W = 0` or `s = 0` pays 0. Flooring
//! keeps `Σ payouts <= T`; the remainder (dust) stays in the pool.

use chrono::{DateTime, Utc};
use pari_schemas::{MarketRow, Principal, Side};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{authz::Authorizer, error::LedgerError, store::LedgerStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pools {
    pub yes: i64,
    pub no: i64,
}

impl Pools {
    pub fn of(market: &MarketRow) -> Self {
        Self {
            yes: market.total_yes,
            no: market.total_no,
        }
    }

    pub fn total(&self) -> i64 {
        self.yes.saturating_add(self.no)
    }

    pub fn side(&self, side: Side) -> i64 {
        match side {
            Side::Yes => self.yes,
            Side::No => self.no,
        }
    }

    /// Share of the total pool backing YES; 0.5 for an empty market.
    pub fn yes_price(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            self.yes as f64 / total as f64
        } else {
            0.5
        }
    }

    pub fn no_price(&self) -> f64 {
        1.0 - self.yes_price()
    }
}

/// Proportional payout for `stake` on the winning side `outcome`.
pub fn payout(pools: Pools, outcome: Side, stake: i64) -> i64 {
    let winning = pools.side(outcome);
    if winning <= 0 || stake <= 0 {
        return 0;
    }
    let total = i128::from(pools.total());
    let raw = total * i128::from(stake) / i128::from(winning);
    // stake <= winning for any real position, so raw <= total fits in i64.
    i64::try_from(raw).unwrap_or(i64::MAX).min(pools.total())
}

/// A market can be resolved only if it exists and is still open.
pub fn check_resolvable(market: Option<&MarketRow>, market_id: Uuid) -> Result<(), LedgerError> {
    let market = market.ok_or(LedgerError::MarketNotFound { market_id })?;
    if market.resolved {
        return Err(LedgerError::AlreadyResolved { market_id });
    }
    Ok(())
}

/// Apply the one-way transition to an in-memory row.
pub fn freeze(market: &mut MarketRow, outcome: Side, now: DateTime<Utc>) -> Result<(), LedgerError> {
    check_resolvable(Some(market), market.market_id)?;
    market.resolved = true;
    market.outcome = Some(outcome);
    market.resolved_at_utc = Some(now);
    Ok(())
}

/// Resolve `market_id` to `outcome` on behalf of `principal`.
///
/// Authorization is checked before any store access. A second resolve fails
/// with `AlreadyResolved` and leaves the declared outcome untouched.
pub async fn resolve(
    store: &dyn LedgerStore,
    authz: &dyn Authorizer,
    principal: Option<&Principal>,
    market_id: Uuid,
    outcome: Side,
) -> Result<MarketRow, LedgerError> {
    let principal = principal.ok_or(LedgerError::Unauthenticated)?;
    if !authz.is_authorized(principal) {
        warn!(email = %principal.email, %market_id, "resolve refused: not an admin");
        return Err(LedgerError::Forbidden);
    }

    let market = store.resolve_market(market_id, outcome).await?;
    info!(
        %market_id,
        outcome = %outcome,
        total_yes = market.total_yes,
        total_no = market.total_no,
        resolved_by = %principal.email,
        "market resolved"
    );
    Ok(market)
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn pools(yes: i64, no: i64) -> Pools {
        Pools { yes, no }
    }

    #[test]
    fn sole_winner_takes_whole_pool() {
        assert_eq!(payout(pools(300, 700), Side::Yes, 300), 1_000);
    }

    #[test]
    fn payouts_are_floored_and_never_exceed_total() {
        // Three equal winners of 1 each on a pool of 10: 10*1/3 = 3 each, dust 1.
        let p = pools(3, 7);
        let each = payout(p, Side::Yes, 1);
        assert_eq!(each, 3);
        assert!(each * 3 <= p.total());
    }

    #[test]
    fn empty_winning_side_or_zero_stake_pays_nothing() {
        assert_eq!(payout(pools(0, 500), Side::Yes, 0), 0);
        assert_eq!(payout(pools(0, 500), Side::Yes, 10), 0);
        assert_eq!(payout(pools(200, 500), Side::No, 0), 0);
    }

    #[test]
    fn large_pools_do_not_overflow() {
        let p = pools(i64::MAX / 2, i64::MAX / 2);
        assert_eq!(payout(p, Side::No, i64::MAX / 2), p.total());
    }

    #[test]
    fn pool_total_saturates() {
        let p = pools(i64::MAX, 1);
        assert_eq!(p.total(), i64::MAX);
        assert_eq!(payout(p, Side::Yes, i64::MAX), i64::MAX);
        assert!(p.yes_price() <= 1.0);
    }

    #[test]
    fn empty_market_prices_at_even_odds() {
        assert_eq!(pools(0, 0).yes_price(), 0.5);
        assert_eq!(pools(250, 750).yes_price(), 0.25);
        assert_eq!(pools(250, 750).no_price(), 0.75);
    }

    #[test]
    fn freeze_is_one_way() {
        let mut m = MarketRow {
            market_id: Uuid::new_v4(),
            question: "q".to_string(),
            created_by: Uuid::new_v4(),
            total_yes: 1,
            total_no: 2,
            resolved: false,
            outcome: None,
            resolved_at_utc: None,
            created_at_utc: Utc::now(),
        };
        let t0 = Utc::now();
        freeze(&mut m, Side::No, t0).unwrap();
        assert_eq!(
            freeze(&mut m, Side::Yes, Utc::now()),
            Err(LedgerError::AlreadyResolved {
                market_id: m.market_id
            })
        );
        assert_eq!(m.outcome, Some(Side::No));
        assert_eq!(m.resolved_at_utc, Some(t0));
    }
}
