//! Shared runtime state for pari-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. Every collaborator is
//! behind a trait object so tests can swap in-memory doubles.

use std::sync::Arc;

use pari_config::Settings;
use pari_ledger::{Authorizer, LedgerStore};
use pari_payments::{PaymentProvider, Reconciler};
use serde::{Deserialize, Serialize};

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Clone)]
pub struct AppState {
    pub build: BuildInfo,
    pub settings: Settings,
    pub store: Arc<dyn LedgerStore>,
    /// Admin capability check.
    pub authz: Arc<dyn Authorizer>,
    /// `None` when provider credentials are absent; deposit orders then
    /// answer 503.
    pub provider: Option<Arc<dyn PaymentProvider>>,
    pub reconciler: Reconciler,
}

impl AppState {
    pub fn new(
        settings: Settings,
        store: Arc<dyn LedgerStore>,
        authz: Arc<dyn Authorizer>,
        provider: Option<Arc<dyn PaymentProvider>>,
        webhook_secret: Option<String>,
    ) -> Self {
        let reconciler = Reconciler::new(Arc::clone(&store), provider.clone(), webhook_secret);
        Self {
            build: BuildInfo {
                service: "pari-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            settings,
            store,
            authz,
            provider,
            reconciler,
        }
    }
}
