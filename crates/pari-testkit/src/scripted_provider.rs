//! Payment provider double with scripted orders and failures.

use pari_payments::{OrderRequest, PaymentProvider, ProviderError, ProviderOrder};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct ScriptedProvider {
    key_id: String,
    orders: Mutex<HashMap<String, ProviderOrder>>,
    created: Mutex<Vec<OrderRequest>>,
    fail_with: Mutex<Option<ProviderError>>,
    fetch_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(key_id: &str) -> Self {
        Self {
            key_id: key_id.to_string(),
            ..Self::default()
        }
    }

    /// Make `fetch_order(order_id)` return an order with these notes.
    pub fn with_order(self, order_id: &str, notes: Value) -> Self {
        if let Ok(mut orders) = self.orders.lock() {
            orders.insert(
                order_id.to_string(),
                ProviderOrder {
                    id: order_id.to_string(),
                    amount: 0,
                    currency: None,
                    receipt: None,
                    notes,
                },
            );
        }
        self
    }

    /// Every subsequent call fails with `err` until cleared.
    pub fn fail_with(&self, err: Option<ProviderError>) {
        if let Ok(mut slot) = self.fail_with.lock() {
            *slot = err;
        }
    }

    pub fn created_orders(&self) -> Vec<OrderRequest> {
        self.created.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn scripted_failure(&self) -> Option<ProviderError> {
        self.fail_with.lock().ok().and_then(|f| f.clone())
    }
}

#[async_trait::async_trait]
impl PaymentProvider for ScriptedProvider {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn create_order(&self, req: &OrderRequest) -> Result<ProviderOrder, ProviderError> {
        if let Some(err) = self.scripted_failure() {
            return Err(err);
        }
        let mut created = self
            .created
            .lock()
            .map_err(|_| ProviderError::Transport("poisoned".to_string()))?;
        created.push(req.clone());
        let order = ProviderOrder {
            id: format!("order_{}", created.len()),
            amount: req.amount,
            currency: Some(req.currency.clone()),
            receipt: Some(req.receipt.clone()),
            notes: serde_json::to_value(&req.notes).unwrap_or(Value::Null),
        };
        if let Ok(mut orders) = self.orders.lock() {
            orders.insert(order.id.clone(), order.clone());
        }
        Ok(order)
    }

    async fn fetch_order(&self, order_id: &str) -> Result<ProviderOrder, ProviderError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.scripted_failure() {
            return Err(err);
        }
        self.orders
            .lock()
            .ok()
            .and_then(|o| o.get(order_id).cloned())
            .ok_or(ProviderError::Api {
                status: 404,
                description: "order not found".to_string(),
            })
    }
}
