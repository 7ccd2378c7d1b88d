//! Reconciles captured payments into ledger credits.
//!
//! # Contract
//! - No secret configured: every notification is refused.
//! - The signature is checked over the raw bytes before anything is parsed.
//! - Only a captured `payment.captured` with an order id is actionable.
//! - At most one DEPOSIT entry per payment id. [`LedgerStore::deposit_exists`]
//!   is a fast path only; the guard is inside [`LedgerStore::credit_deposit`].
//! - Beneficiary comes from order notes, else a best-effort fetch of the
//!   order. Unresolvable deposits are acknowledged and logged, not credited.
//! - Only a failed commit is surfaced as an error, so the provider retries.

use pari_ledger::{DepositCredit, DepositOutcome, LedgerError, LedgerStore};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::provider::PaymentProvider;
use crate::signature::verify_signature;
use crate::webhook::{decode, CapturedPayment, Relevance};
use crate::DEPOSIT_DESCRIPTION;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Ignored {
        reason: &'static str,
    },
    Duplicate {
        payment_id: String,
    },
    Unattributed {
        payment_id: String,
        order_id: String,
    },
    Credited {
        payment_id: String,
        user_id: Uuid,
        amount: i64,
        balance: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    NotConfigured,
    BadSignature,
    Malformed(String),
    /// The store failed; nothing was written.
    Commit(LedgerError),
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileError::NotConfigured => write!(f, "webhook secret not configured"),
            ReconcileError::BadSignature => write!(f, "invalid signature"),
            ReconcileError::Malformed(m) => write!(f, "invalid JSON: {m}"),
            ReconcileError::Commit(e) => write!(f, "failed to credit balance: {e}"),
        }
    }
}

impl std::error::Error for ReconcileError {}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn LedgerStore>,
    provider: Option<Arc<dyn PaymentProvider>>,
    webhook_secret: Option<String>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        provider: Option<Arc<dyn PaymentProvider>>,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            store,
            provider,
            webhook_secret: webhook_secret.filter(|s| !s.is_empty()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.webhook_secret.is_some()
    }

    pub async fn handle(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let secret = self
            .webhook_secret
            .as_deref()
            .ok_or(ReconcileError::NotConfigured)?;

        if !signature.is_some_and(|sig| verify_signature(secret, raw_body, sig)) {
            tracing::warn!("webhook signature rejected");
            return Err(ReconcileError::BadSignature);
        }

        let relevance =
            decode(raw_body).map_err(|e| ReconcileError::Malformed(e.to_string()))?;

        let payment = match relevance {
            Relevance::Actionable(p) => p,
            Relevance::Ignored { reason } => {
                tracing::debug!(reason, "webhook ignored");
                return Ok(ReconcileOutcome::Ignored { reason });
            }
        };

        tracing::info!(
            payment_id = %payment.payment_id,
            order_id = %payment.order_id,
            amount = payment.amount,
            "payment captured"
        );

        if self
            .store
            .deposit_exists(&payment.payment_id)
            .await
            .map_err(ReconcileError::Commit)?
        {
            return Ok(self.duplicate(&payment));
        }

        let Some(user_id) = self.resolve_beneficiary(&payment).await else {
            return Ok(unattributed(&payment, None));
        };

        let credit = DepositCredit {
            payment_id: payment.payment_id.clone(),
            order_id: payment.order_id.clone(),
            user_id,
            amount: payment.amount,
            description: DEPOSIT_DESCRIPTION.to_string(),
        };

        match self.store.credit_deposit(&credit).await {
            Ok(DepositOutcome::Credited { balance, .. }) => {
                tracing::info!(
                    payment_id = %payment.payment_id,
                    user_id = %user_id,
                    amount = payment.amount,
                    balance,
                    "deposit credited"
                );
                Ok(ReconcileOutcome::Credited {
                    payment_id: payment.payment_id,
                    user_id,
                    amount: payment.amount,
                    balance,
                })
            }
            Ok(DepositOutcome::Duplicate) => Ok(self.duplicate(&payment)),
            Err(LedgerError::UserNotFound { .. }) => Ok(unattributed(&payment, Some(user_id))),
            Err(e) => {
                tracing::error!(
                    payment_id = %payment.payment_id,
                    user_id = %user_id,
                    amount = payment.amount,
                    error = %e,
                    "deposit commit failed"
                );
                Err(ReconcileError::Commit(e))
            }
        }
    }

    fn duplicate(&self, payment: &CapturedPayment) -> ReconcileOutcome {
        tracing::info!(payment_id = %payment.payment_id, "duplicate payment, already credited");
        ReconcileOutcome::Duplicate {
            payment_id: payment.payment_id.clone(),
        }
    }

    async fn resolve_beneficiary(&self, payment: &CapturedPayment) -> Option<Uuid> {
        if let Some(id) = payment.noted_user_id.as_deref().and_then(parse_user_id) {
            return Some(id);
        }
        let provider = self.provider.as_ref()?;
        match provider.fetch_order(&payment.order_id).await {
            Ok(order) => order.noted_user_id().as_deref().and_then(parse_user_id),
            Err(e) => {
                tracing::warn!(
                    order_id = %payment.order_id,
                    error = %e,
                    "order fetch for beneficiary failed"
                );
                None
            }
        }
    }
}

fn parse_user_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw.trim()).ok()
}

fn unattributed(payment: &CapturedPayment, user_id: Option<Uuid>) -> ReconcileOutcome {
    tracing::error!(
        payment_id = %payment.payment_id,
        order_id = %payment.order_id,
        amount = payment.amount,
        user_id = ?user_id,
        "captured payment cannot be attributed to a user; not credited"
    );
    ReconcileOutcome::Unattributed {
        payment_id: payment.payment_id.clone(),
        order_id: payment.order_id.clone(),
    }
}
