//! pari-ledger
//!
//! Wagering, settlement and claim rules for binary pari-mutuel markets.
//!
//! - [`pool`]: the Pool Accountant (wager preconditions, pool increments)
//! - [`settlement`]: the Settlement Engine (one-way resolve, payout formula)
//! - [`claims`]: the Claim Processor (winning stake, exactly-once payout)
//! - [`portfolio`]: read-side aggregation of a user's positions
//! - [`store`]: the [`LedgerStore`] seam every durable backend implements
//!
//! Decision logic here is pure. Store implementations call it from inside
//! their atomic commit, after re-reading the rows it decides on, so the same
//! rules apply whichever backend holds the data.

pub mod amount;
pub mod authz;
pub mod claims;
pub mod error;
pub mod portfolio;
pub mod pool;
pub mod settlement;
pub mod store;

pub use amount::{parse_major_units, AmountError, DepositLimits};
pub use authz::{AllowList, Authorizer};
pub use claims::{claim, plan_claim, winning_stake, ClaimReceipt};
pub use error::{ErrorClass, LedgerError};
pub use pool::{check_wager, place_wager, WagerReceipt, WagerRequest};
pub use portfolio::{build_portfolio, Position};
pub use settlement::{check_resolvable, payout, resolve, Pools};
pub use store::{DepositCredit, DepositOutcome, LedgerStore};

/// Ledger descriptions quote at most this many characters of a question.
pub const DESCRIPTION_QUESTION_CHARS: usize = 50;

pub(crate) fn question_excerpt(question: &str) -> String {
    question.chars().take(DESCRIPTION_QUESTION_CHARS).collect()
}
