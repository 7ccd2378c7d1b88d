//! In-memory [`LedgerStore`].
//!
//! One mutex guards all state, so each method body is a serial commit. Every
//! method computes its full effect before touching state; an error leaves
//! nothing behind. `fail_next_commit` injects a storage failure into the
//! next mutating call.

use chrono::Utc;
use pari_ledger::claims::{claim_description, plan_claim, winning_stake};
use pari_ledger::pool::{apply_to_pools, check_wager, wager_description};
use pari_ledger::settlement::freeze;
use pari_ledger::{
    ClaimReceipt, DepositCredit, DepositOutcome, LedgerError, LedgerStore, WagerReceipt,
    WagerRequest,
};
use pari_schemas::{
    ClaimRow, LedgerEntryRow, LedgerKind, LedgerStatus, MarketRow, Side, UserRow, WagerRow,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
struct State {
    users: Vec<UserRow>,
    markets: Vec<MarketRow>,
    wagers: Vec<WagerRow>,
    claims: Vec<ClaimRow>,
    entries: Vec<LedgerEntryRow>,
}

impl State {
    fn user(&self, user_id: Uuid) -> Option<&UserRow> {
        self.users.iter().find(|u| u.user_id == user_id)
    }

    fn user_mut(&mut self, user_id: Uuid) -> Option<&mut UserRow> {
        self.users.iter_mut().find(|u| u.user_id == user_id)
    }

    fn market(&self, market_id: Uuid) -> Option<&MarketRow> {
        self.markets.iter().find(|m| m.market_id == market_id)
    }

    fn market_mut(&mut self, market_id: Uuid) -> Option<&mut MarketRow> {
        self.markets.iter_mut().find(|m| m.market_id == market_id)
    }
}

#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    state: Mutex<State>,
    fail_next_commit: AtomicBool,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next mutating call fails with a storage error and writes nothing.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    pub fn entry_count(&self, kind: LedgerKind) -> usize {
        self.lock()
            .map(|s| s.entries.iter().filter(|e| e.kind == kind).count())
            .unwrap_or(0)
    }

    pub fn claim_count(&self, market_id: Uuid) -> usize {
        self.lock()
            .map(|s| s.claims.iter().filter(|c| c.market_id == market_id).count())
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, LedgerError> {
        self.state
            .lock()
            .map_err(|_| LedgerError::Storage("memory store poisoned".to_string()))
    }

    /// Lock for a mutating call, consuming an injected failure if armed.
    fn begin(&self) -> Result<MutexGuard<'_, State>, LedgerError> {
        let guard = self.lock()?;
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(LedgerError::Storage("injected commit failure".to_string()));
        }
        Ok(guard)
    }
}

fn entry(
    user_id: Uuid,
    kind: LedgerKind,
    amount: i64,
    reference_id: Option<String>,
    external_ref: Option<String>,
    description: String,
) -> LedgerEntryRow {
    LedgerEntryRow {
        entry_id: Uuid::new_v4(),
        user_id,
        kind,
        amount,
        status: LedgerStatus::Completed,
        reference_id,
        external_ref,
        description,
        created_at_utc: Utc::now(),
    }
}

#[async_trait::async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn fetch_user(&self, user_id: Uuid) -> Result<Option<UserRow>, LedgerError> {
        Ok(self.lock()?.user(user_id).cloned())
    }

    async fn fetch_user_by_email(&self, email: &str) -> Result<Option<UserRow>, LedgerError> {
        Ok(self.lock()?.users.iter().find(|u| u.email == email).cloned())
    }

    async fn ensure_user(
        &self,
        email: &str,
        name: &str,
        starter_balance: i64,
    ) -> Result<UserRow, LedgerError> {
        let mut s = self.begin()?;
        if let Some(u) = s.users.iter().find(|u| u.email == email) {
            return Ok(u.clone());
        }
        if starter_balance < 0 {
            return Err(LedgerError::InvalidAmount {
                amount: starter_balance,
            });
        }
        let user = UserRow {
            user_id: Uuid::new_v4(),
            email: email.to_string(),
            name: name.to_string(),
            balance: starter_balance,
            created_at_utc: Utc::now(),
        };
        s.users.push(user.clone());
        Ok(user)
    }

    async fn create_market(
        &self,
        question: &str,
        created_by: Uuid,
    ) -> Result<MarketRow, LedgerError> {
        let mut s = self.begin()?;
        if s.user(created_by).is_none() {
            return Err(LedgerError::UserNotFound {
                user_id: Some(created_by),
            });
        }
        let market = MarketRow {
            market_id: Uuid::new_v4(),
            question: question.to_string(),
            created_by,
            total_yes: 0,
            total_no: 0,
            resolved: false,
            outcome: None,
            resolved_at_utc: None,
            created_at_utc: Utc::now(),
        };
        s.markets.push(market.clone());
        Ok(market)
    }

    async fn fetch_market(&self, market_id: Uuid) -> Result<Option<MarketRow>, LedgerError> {
        Ok(self.lock()?.market(market_id).cloned())
    }

    async fn list_markets(&self) -> Result<Vec<MarketRow>, LedgerError> {
        Ok(self.lock()?.markets.iter().rev().cloned().collect())
    }

    async fn fetch_markets(&self, market_ids: &[Uuid]) -> Result<Vec<MarketRow>, LedgerError> {
        let s = self.lock()?;
        Ok(s.markets
            .iter()
            .filter(|m| market_ids.contains(&m.market_id))
            .cloned()
            .collect())
    }

    async fn place_wager(&self, req: &WagerRequest) -> Result<WagerReceipt, LedgerError> {
        let mut s = self.begin()?;
        check_wager(s.user(req.user_id), s.market(req.market_id), req)?;

        let mut market = s
            .market(req.market_id)
            .cloned()
            .ok_or(LedgerError::MarketNotFound {
                market_id: req.market_id,
            })?;
        apply_to_pools(&mut market, req.side, req.amount)?;
        let description = wager_description(&market.question);

        let wager = WagerRow {
            wager_id: Uuid::new_v4(),
            market_id: req.market_id,
            user_id: req.user_id,
            side: req.side,
            amount: req.amount,
            created_at_utc: Utc::now(),
        };
        let debit = entry(
            req.user_id,
            LedgerKind::Wager,
            -req.amount,
            Some(wager.wager_id.to_string()),
            None,
            description,
        );

        // Preconditions hold; apply every write.
        let balance = match s.user_mut(req.user_id) {
            Some(u) => {
                u.balance -= req.amount;
                u.balance
            }
            None => {
                return Err(LedgerError::UserNotFound {
                    user_id: Some(req.user_id),
                })
            }
        };
        if let Some(m) = s.market_mut(req.market_id) {
            *m = market;
        }
        let wager_id = wager.wager_id;
        s.wagers.push(wager);
        s.entries.push(debit);

        Ok(WagerReceipt {
            wager_id,
            side: req.side,
            amount: req.amount,
            balance,
        })
    }

    async fn resolve_market(
        &self,
        market_id: Uuid,
        outcome: Side,
    ) -> Result<MarketRow, LedgerError> {
        let mut s = self.begin()?;
        let market = s
            .market_mut(market_id)
            .ok_or(LedgerError::MarketNotFound { market_id })?;
        freeze(market, outcome, Utc::now())?;
        Ok(market.clone())
    }

    async fn claim_payout(
        &self,
        user_id: Uuid,
        market_id: Uuid,
    ) -> Result<ClaimReceipt, LedgerError> {
        let mut s = self.begin()?;
        if s.user(user_id).is_none() {
            return Err(LedgerError::UserNotFound {
                user_id: Some(user_id),
            });
        }
        let market = s.market(market_id).cloned();
        let already_claimed = s
            .claims
            .iter()
            .any(|c| c.market_id == market_id && c.user_id == user_id);
        let stake = market
            .as_ref()
            .and_then(|m| m.outcome)
            .map(|o| winning_stake(&s.wagers, user_id, market_id, o))
            .unwrap_or(0);

        let amount = plan_claim(market.as_ref(), market_id, already_claimed, stake)?;
        let question = market.map(|m| m.question).unwrap_or_default();

        let claim = ClaimRow {
            claim_id: Uuid::new_v4(),
            market_id,
            user_id,
            amount_claimed: amount,
            created_at_utc: Utc::now(),
        };
        let credit = entry(
            user_id,
            LedgerKind::Claim,
            amount,
            Some(claim.claim_id.to_string()),
            None,
            claim_description(&question),
        );

        let balance = match s.user_mut(user_id) {
            Some(u) => {
                u.balance += amount;
                u.balance
            }
            None => {
                return Err(LedgerError::UserNotFound {
                    user_id: Some(user_id),
                })
            }
        };
        let claim_id = claim.claim_id;
        s.claims.push(claim);
        s.entries.push(credit);

        Ok(ClaimReceipt {
            claim_id,
            amount_claimed: amount,
            balance,
        })
    }

    async fn deposit_exists(&self, payment_id: &str) -> Result<bool, LedgerError> {
        Ok(self.lock()?.entries.iter().any(|e| {
            e.kind == LedgerKind::Deposit && e.external_ref.as_deref() == Some(payment_id)
        }))
    }

    async fn credit_deposit(&self, credit: &DepositCredit) -> Result<DepositOutcome, LedgerError> {
        if credit.amount <= 0 {
            return Err(LedgerError::InvalidAmount {
                amount: credit.amount,
            });
        }
        let mut s = self.begin()?;
        let duplicate = s.entries.iter().any(|e| {
            e.kind == LedgerKind::Deposit
                && e.external_ref.as_deref() == Some(credit.payment_id.as_str())
        });
        if duplicate {
            return Ok(DepositOutcome::Duplicate);
        }

        let deposit = entry(
            credit.user_id,
            LedgerKind::Deposit,
            credit.amount,
            Some(credit.order_id.clone()),
            Some(credit.payment_id.clone()),
            credit.description.clone(),
        );
        let balance = match s.user_mut(credit.user_id) {
            Some(u) => {
                u.balance += credit.amount;
                u.balance
            }
            None => {
                return Err(LedgerError::UserNotFound {
                    user_id: Some(credit.user_id),
                })
            }
        };
        let entry_id = deposit.entry_id;
        s.entries.push(deposit);
        Ok(DepositOutcome::Credited { entry_id, balance })
    }

    async fn wagers_for_user(&self, user_id: Uuid) -> Result<Vec<WagerRow>, LedgerError> {
        let s = self.lock()?;
        Ok(s.wagers
            .iter()
            .rev()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn claims_for_user(&self, user_id: Uuid) -> Result<Vec<ClaimRow>, LedgerError> {
        let s = self.lock()?;
        Ok(s.claims
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn recent_entries(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<LedgerEntryRow>, LedgerError> {
        let s = self.lock()?;
        Ok(s.entries
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }
}
