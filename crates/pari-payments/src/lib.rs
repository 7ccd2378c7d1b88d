//! pari-payments
//!
//! External credit intake: deposit order creation against the payment
//! provider, webhook authentication, and reconciliation of captured payments
//! into the ledger.
//!
//! This crate does not own balances. Every credit goes through
//! [`pari_ledger::LedgerStore::credit_deposit`].

pub mod orders;
pub mod provider;
pub mod reconciler;
pub mod signature;
pub mod webhook;

pub use orders::{create_deposit_order, receipt_for, DepositOrder};
pub use provider::{OrderRequest, PaymentProvider, ProviderError, ProviderOrder, RazorpayClient};
pub use reconciler::{ReconcileError, ReconcileOutcome, Reconciler};
pub use signature::{sign_payload, verify_signature};
pub use webhook::{classify, decode, CapturedPayment, Relevance, WebhookEnvelope};

/// Header carrying the hex HMAC-SHA256 of the raw webhook body.
pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

/// Ledger description for provider deposits.
pub const DEPOSIT_DESCRIPTION: &str = "Deposit via Razorpay";
