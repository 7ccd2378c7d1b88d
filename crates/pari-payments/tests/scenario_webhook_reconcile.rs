//! Scenario: webhook notifications reconcile into at most one credit.
//!
//! # Invariants under test
//! - Fail closed without a secret; bad signatures are refused before parsing.
//! - Duplicate deliveries of one payment id credit exactly once.
//! - Irrelevant events are acknowledged without effect, whatever their shape.
//! - Beneficiary falls back to the provider order; unresolvable deposits
//!   are acknowledged but not credited.
//! - A failed commit is surfaced so the provider retries.

use pari_ledger::LedgerStore;
use pari_payments::{ReconcileError, ReconcileOutcome, Reconciler, ProviderError};
use pari_schemas::LedgerKind;
use pari_testkit::{captured_payment, signed, MemoryLedgerStore, ScriptedProvider};
use serde_json::json;
use std::sync::Arc;

const SECRET: &str = "whook-test-secret";

async fn setup() -> (Arc<MemoryLedgerStore>, Reconciler, uuid::Uuid) {
    let store = Arc::new(MemoryLedgerStore::new());
    let user = store.ensure_user("p@example.com", "p", 0).await.unwrap();
    let rec = Reconciler::new(store.clone(), None, Some(SECRET.to_string()));
    (store, rec, user.user_id)
}

#[tokio::test]
async fn duplicate_delivery_credits_once() {
    let (store, rec, user_id) = setup().await;
    let payload = captured_payment("p1", "order_1", 50_000, Some(&user_id.to_string()));
    let (body, sig) = signed(SECRET, &payload);

    let first = rec.handle(&body, Some(&sig)).await.unwrap();
    assert_eq!(
        first,
        ReconcileOutcome::Credited {
            payment_id: "p1".into(),
            user_id,
            amount: 50_000,
            balance: 50_000,
        }
    );
    let second = rec.handle(&body, Some(&sig)).await.unwrap();
    assert_eq!(second, ReconcileOutcome::Duplicate { payment_id: "p1".into() });

    let user = store.fetch_user(user_id).await.unwrap().unwrap();
    assert_eq!(user.balance, 50_000);
    assert_eq!(store.entry_count(LedgerKind::Deposit), 1);
}

#[tokio::test]
async fn concurrent_duplicate_deliveries_credit_once() {
    let (store, rec, user_id) = setup().await;
    let payload = captured_payment("p-race", "order_r", 700, Some(&user_id.to_string()));
    let (body, sig) = signed(SECRET, &payload);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let rec = rec.clone();
        let (body, sig) = (body.clone(), sig.clone());
        handles.push(tokio::spawn(async move { rec.handle(&body, Some(&sig)).await }));
    }
    let mut credited = 0;
    for h in handles {
        match h.await.unwrap().unwrap() {
            ReconcileOutcome::Credited { .. } => credited += 1,
            ReconcileOutcome::Duplicate { .. } => {}
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(credited, 1);
    assert_eq!(store.fetch_user(user_id).await.unwrap().unwrap().balance, 700);
}

#[tokio::test]
async fn missing_secret_fails_closed() {
    let store = Arc::new(MemoryLedgerStore::new());
    let rec = Reconciler::new(store, None, None);
    assert!(!rec.is_configured());
    let (body, sig) = signed(SECRET, &captured_payment("p1", "o1", 1, None));
    assert_eq!(
        rec.handle(&body, Some(&sig)).await.unwrap_err(),
        ReconcileError::NotConfigured
    );
}

#[tokio::test]
async fn bad_signature_is_rejected_before_parsing() {
    let (store, rec, user_id) = setup().await;
    let payload = captured_payment("p1", "o1", 100, Some(&user_id.to_string()));
    let (body, _) = signed(SECRET, &payload);
    let (_, wrong) = signed("other-secret", &payload);

    assert_eq!(
        rec.handle(&body, Some(&wrong)).await.unwrap_err(),
        ReconcileError::BadSignature
    );
    assert_eq!(rec.handle(&body, None).await.unwrap_err(), ReconcileError::BadSignature);
    // Garbage body with no valid signature: still a signature failure.
    assert_eq!(
        rec.handle(b"not json", Some("00")).await.unwrap_err(),
        ReconcileError::BadSignature
    );
    assert_eq!(store.entry_count(LedgerKind::Deposit), 0);
}

#[tokio::test]
async fn signed_garbage_is_malformed() {
    let (_store, rec, _) = setup().await;
    let body = b"{not json".to_vec();
    let sig = pari_payments::sign_payload(SECRET, &body);
    assert!(matches!(
        rec.handle(&body, Some(&sig)).await.unwrap_err(),
        ReconcileError::Malformed(_)
    ));
}

#[tokio::test]
async fn irrelevant_events_are_acknowledged_without_effect() {
    let (store, rec, user_id) = setup().await;
    let mut failed = captured_payment("p2", "o2", 100, Some(&user_id.to_string()));
    failed["event"] = json!("payment.failed");
    let (body, sig) = signed(SECRET, &failed);

    assert!(matches!(
        rec.handle(&body, Some(&sig)).await.unwrap(),
        ReconcileOutcome::Ignored { .. }
    ));
    assert_eq!(store.fetch_user(user_id).await.unwrap().unwrap().balance, 0);
}

#[tokio::test]
async fn foreign_event_shapes_are_acknowledged_not_rejected() {
    let (store, rec, _) = setup().await;
    let foreign = json!({
        "event": "refund.processed",
        "payload": {"payment": {"entity": {"id": 917, "order_id": ["x"], "amount": "12"}}}
    });
    let (body, sig) = signed(SECRET, &foreign);

    assert_eq!(
        rec.handle(&body, Some(&sig)).await.unwrap(),
        ReconcileOutcome::Ignored {
            reason: "event not payment.captured"
        }
    );
    assert_eq!(store.entry_count(LedgerKind::Deposit), 0);
}

#[tokio::test]
async fn beneficiary_recovered_from_provider_order() {
    let store = Arc::new(MemoryLedgerStore::new());
    let user = store.ensure_user("f@example.com", "f", 10).await.unwrap();
    let provider = Arc::new(
        ScriptedProvider::new("key_test").with_order("o-fb", json!({"userId": user.user_id.to_string()})),
    );
    let rec = Reconciler::new(store.clone(), Some(provider.clone()), Some(SECRET.into()));

    let (body, sig) = signed(SECRET, &captured_payment("p-fb", "o-fb", 90, None));
    let out = rec.handle(&body, Some(&sig)).await.unwrap();
    assert!(matches!(out, ReconcileOutcome::Credited { balance: 100, .. }), "{out:?}");
    assert_eq!(provider.fetch_calls(), 1);
}

#[tokio::test]
async fn unattributable_deposit_is_acknowledged_not_credited() {
    let store = Arc::new(MemoryLedgerStore::new());
    let provider = Arc::new(ScriptedProvider::new("key_test"));
    provider.fail_with(Some(ProviderError::Transport("connection refused".into())));
    let rec = Reconciler::new(store.clone(), Some(provider), Some(SECRET.into()));

    // No notes, and the fallback fetch fails.
    let (body, sig) = signed(SECRET, &captured_payment("p-x", "o-x", 90, None));
    assert_eq!(
        rec.handle(&body, Some(&sig)).await.unwrap(),
        ReconcileOutcome::Unattributed {
            payment_id: "p-x".into(),
            order_id: "o-x".into()
        }
    );

    // Notes name a user that does not exist.
    let ghost = uuid::Uuid::new_v4().to_string();
    let (body, sig) = signed(SECRET, &captured_payment("p-y", "o-y", 90, Some(&ghost)));
    assert!(matches!(
        rec.handle(&body, Some(&sig)).await.unwrap(),
        ReconcileOutcome::Unattributed { .. }
    ));
    assert_eq!(store.entry_count(LedgerKind::Deposit), 0);
}

#[tokio::test]
async fn commit_failure_is_surfaced_and_retry_credits() {
    let (store, rec, user_id) = setup().await;
    let (body, sig) = signed(SECRET, &captured_payment("p-c", "o-c", 250, Some(&user_id.to_string())));

    store.fail_next_commit();
    assert!(matches!(
        rec.handle(&body, Some(&sig)).await.unwrap_err(),
        ReconcileError::Commit(_)
    ));
    assert_eq!(store.fetch_user(user_id).await.unwrap().unwrap().balance, 0);

    // Provider retries the delivery.
    assert!(matches!(
        rec.handle(&body, Some(&sig)).await.unwrap(),
        ReconcileOutcome::Credited { balance: 250, .. }
    ));
}
