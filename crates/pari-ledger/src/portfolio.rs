//! Per-market positions for a single user.
//!
//! Stakes are kept per side: a user who backed both YES and NO on the same
//! market sees both totals, and a projected payout for each possible outcome.

use std::collections::HashMap;

use pari_schemas::{ClaimRow, MarketRow, Side, WagerRow};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::settlement::{payout, Pools};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub market_id: Uuid,
    pub question: String,
    pub yes_stake: i64,
    pub no_stake: i64,
    pub stake: i64,
    pub resolved: bool,
    pub outcome_yes: Option<bool>,
    pub has_claimed: bool,
    pub claimed_amount: i64,
    /// Winning-side payout still collectable; 0 once claimed or while open.
    pub claimable: i64,
    /// Payout of the YES stake if YES wins, against current pools.
    pub payout_if_yes: i64,
    /// Payout of the NO stake if NO wins, against current pools.
    pub payout_if_no: i64,
}

/// Build positions in order of each market's most recent wager.
///
/// `wagers` must be newest first; wagers whose market is missing from
/// `markets` are skipped.
pub fn build_portfolio(wagers: &[WagerRow], markets: &[MarketRow], claims: &[ClaimRow]) -> Vec<Position> {
    let by_id: HashMap<Uuid, &MarketRow> = markets.iter().map(|m| (m.market_id, m)).collect();

    let mut order: Vec<Uuid> = Vec::new();
    let mut stakes: HashMap<Uuid, (i64, i64)> = HashMap::new();
    for w in wagers {
        if !by_id.contains_key(&w.market_id) {
            continue;
        }
        let entry = stakes.entry(w.market_id).or_insert_with(|| {
            order.push(w.market_id);
            (0, 0)
        });
        match w.side {
            Side::Yes => entry.0 = entry.0.saturating_add(w.amount),
            Side::No => entry.1 = entry.1.saturating_add(w.amount),
        }
    }

    let mut claimed: HashMap<Uuid, i64> = HashMap::new();
    for c in claims {
        let sum = claimed.entry(c.market_id).or_insert(0);
        *sum = sum.saturating_add(c.amount_claimed);
    }

    order
        .into_iter()
        .filter_map(|market_id| {
            let market = by_id.get(&market_id)?;
            let (yes_stake, no_stake) = stakes.get(&market_id).copied().unwrap_or((0, 0));
            let pools = Pools::of(market);
            let claimed_amount = claimed.get(&market_id).copied().unwrap_or(0);
            let has_claimed = claims.iter().any(|c| c.market_id == market_id);

            let winning_payout = match (market.resolved, market.outcome) {
                (true, Some(Side::Yes)) => payout(pools, Side::Yes, yes_stake),
                (true, Some(Side::No)) => payout(pools, Side::No, no_stake),
                _ => 0,
            };

            Some(Position {
                market_id,
                question: market.question.clone(),
                yes_stake,
                no_stake,
                stake: yes_stake.saturating_add(no_stake),
                resolved: market.resolved,
                outcome_yes: market.outcome_yes(),
                has_claimed,
                claimed_amount,
                claimable: if has_claimed { 0 } else { winning_payout },
                payout_if_yes: payout(pools, Side::Yes, yes_stake),
                payout_if_no: payout(pools, Side::No, no_stake),
            })
        })
        .collect()
}
