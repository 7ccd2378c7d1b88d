//! Deposit order creation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::provider::{OrderRequest, PaymentProvider, ProviderError};

/// Provider limit on receipt length.
pub const RECEIPT_MAX_CHARS: usize = 40;

/// Order metadata key carrying the beneficiary.
pub const USER_ID_NOTE: &str = "userId";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositOrder {
    pub order_id: String,
    /// Minor units.
    pub amount: i64,
    pub currency: String,
    pub key_id: String,
}

/// `d_<last 12 chars of user id>_<base36 epoch millis>`.
pub fn receipt_for(user_id: Uuid, now_ms: i64) -> String {
    let id = user_id.to_string();
    let tail: String = id.chars().skip(id.chars().count().saturating_sub(12)).collect();
    let receipt = format!("d_{}_{}", tail, to_base36(now_ms.max(0) as u64));
    receipt.chars().take(RECEIPT_MAX_CHARS).collect()
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

pub async fn create_deposit_order(
    provider: &dyn PaymentProvider,
    user_id: Uuid,
    amount_minor: i64,
    currency: &str,
    now_ms: i64,
) -> Result<DepositOrder, ProviderError> {
    let req = OrderRequest {
        amount: amount_minor,
        currency: currency.to_string(),
        receipt: receipt_for(user_id, now_ms),
        notes: BTreeMap::from([(USER_ID_NOTE.to_string(), user_id.to_string())]),
    };
    let order = provider.create_order(&req).await?;
    tracing::info!(
        order_id = %order.id,
        user_id = %user_id,
        amount = amount_minor,
        "deposit order created"
    );
    Ok(DepositOrder {
        order_id: order.id,
        amount: amount_minor,
        currency: req.currency,
        key_id: provider.key_id().to_string(),
    })
}
