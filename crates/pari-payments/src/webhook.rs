//! Provider notification payloads and the relevance filter.
//!
//! Every field is optional on the wire; [`classify`] decides whether a
//! notification is actionable and extracts what the reconciler needs.

use serde::Deserialize;
use serde_json::Value;

pub const PAYMENT_CAPTURED_EVENT: &str = "payment.captured";
const CAPTURED_STATUS: &str = "captured";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEnvelope {
    pub event: Option<String>,
    #[serde(default)]
    pub payload: WebhookPayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    pub payment: Option<EntityWrapper<PaymentEntity>>,
    pub order: Option<EntityWrapper<OrderEntity>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityWrapper<T> {
    pub entity: Option<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentEntity {
    pub id: Option<String>,
    pub order_id: Option<String>,
    /// Minor units.
    pub amount: Option<i64>,
    pub status: Option<String>,
    #[serde(default)]
    pub notes: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderEntity {
    pub id: Option<String>,
    #[serde(default)]
    pub notes: Value,
}

/// Fields of a captured payment, validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPayment {
    pub payment_id: String,
    pub order_id: String,
    pub amount: i64,
    /// Beneficiary as carried in order (or payment) notes, unparsed.
    pub noted_user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relevance {
    Actionable(CapturedPayment),
    Ignored { reason: &'static str },
}

/// `userId` from a notes object. Providers send `[]` for empty notes.
pub fn note_user_id(notes: &Value) -> Option<String> {
    notes
        .get("userId")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn classify(envelope: &WebhookEnvelope) -> Relevance {
    if envelope.event.as_deref() != Some(PAYMENT_CAPTURED_EVENT) {
        return Relevance::Ignored {
            reason: "event not payment.captured",
        };
    }
    let Some(payment) = envelope
        .payload
        .payment
        .as_ref()
        .and_then(|p| p.entity.as_ref())
    else {
        return Relevance::Ignored {
            reason: "missing payment entity",
        };
    };
    let (Some(payment_id), Some(order_id)) = (
        payment.id.as_deref().filter(|s| !s.is_empty()),
        payment.order_id.as_deref().filter(|s| !s.is_empty()),
    ) else {
        return Relevance::Ignored {
            reason: "missing payment id or order id",
        };
    };
    if payment.status.as_deref() != Some(CAPTURED_STATUS) {
        return Relevance::Ignored {
            reason: "payment status not captured",
        };
    }
    let amount = match payment.amount {
        Some(a) if a > 0 => a,
        _ => {
            return Relevance::Ignored {
                reason: "missing or non-positive amount",
            }
        }
    };

    let order_notes = envelope
        .payload
        .order
        .as_ref()
        .and_then(|o| o.entity.as_ref())
        .and_then(|o| note_user_id(&o.notes));
    let noted_user_id = order_notes.or_else(|| note_user_id(&payment.notes));

    Relevance::Actionable(CapturedPayment {
        payment_id: payment_id.to_string(),
        order_id: order_id.to_string(),
        amount,
        noted_user_id,
    })
}

/// Decode a verified body and classify it.
///
/// Only a `payment.captured` body is decoded into [`WebhookEnvelope`]; any
/// other event is ignored whatever its shape. Bytes that are not JSON at all
/// are an error.
pub fn decode(raw: &[u8]) -> Result<Relevance, serde_json::Error> {
    let value: Value = serde_json::from_slice(raw)?;
    if value.get("event").and_then(Value::as_str) != Some(PAYMENT_CAPTURED_EVENT) {
        return Ok(Relevance::Ignored {
            reason: "event not payment.captured",
        });
    }
    let envelope: WebhookEnvelope = serde_json::from_value(value)?;
    Ok(classify(&envelope))
}
