//! Scenario: deposit orders carry the beneficiary and a bounded receipt.

use pari_payments::{create_deposit_order, ProviderError};
use pari_testkit::ScriptedProvider;
use uuid::Uuid;

#[tokio::test]
async fn order_carries_user_note_and_receipt() {
    let provider = ScriptedProvider::new("rzp_public_key");
    let user_id = Uuid::new_v4();

    let order = create_deposit_order(&provider, user_id, 50_000, "INR", 1_700_000_000_000)
        .await
        .unwrap();
    assert_eq!(order.order_id, "order_1");
    assert_eq!(order.amount, 50_000);
    assert_eq!(order.currency, "INR");
    assert_eq!(order.key_id, "rzp_public_key");

    let sent = provider.created_orders();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].notes.get("userId"), Some(&user_id.to_string()));
    assert!(sent[0].receipt.starts_with("d_"));
    assert!(sent[0].receipt.len() <= 40);

    let json = serde_json::to_value(&order).unwrap();
    assert_eq!(json["orderId"], "order_1");
    assert_eq!(json["keyId"], "rzp_public_key");
}

#[tokio::test]
async fn provider_failure_propagates() {
    let provider = ScriptedProvider::new("k");
    provider.fail_with(Some(ProviderError::Api {
        status: 400,
        description: "amount exceeds maximum".into(),
    }));
    let err = create_deposit_order(&provider, Uuid::new_v4(), 100, "INR", 0)
        .await
        .unwrap_err();
    assert_eq!(err.detail(), "amount exceeds maximum");
    assert!(provider.created_orders().is_empty());
}
