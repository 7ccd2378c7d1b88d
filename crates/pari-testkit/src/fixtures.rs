//! Webhook payload fixtures.

use pari_payments::sign_payload;
use serde_json::{json, Value};

/// A `payment.captured` notification. `order_user_id` goes into the order
/// entity notes when present.
pub fn captured_payment(
    payment_id: &str,
    order_id: &str,
    amount: i64,
    order_user_id: Option<&str>,
) -> Value {
    let notes = match order_user_id {
        Some(u) => json!({ "userId": u }),
        None => json!([]),
    };
    json!({
        "entity": "event",
        "event": "payment.captured",
        "payload": {
            "payment": {
                "entity": {
                    "id": payment_id,
                    "order_id": order_id,
                    "amount": amount,
                    "currency": "INR",
                    "status": "captured",
                    "notes": []
                }
            },
            "order": {
                "entity": { "id": order_id, "notes": notes }
            }
        }
    })
}

/// Serialize `payload` and sign the exact bytes.
pub fn signed(secret: &str, payload: &Value) -> (Vec<u8>, String) {
    let body = payload.to_string().into_bytes();
    let sig = sign_payload(secret, &body);
    (body, sig)
}
