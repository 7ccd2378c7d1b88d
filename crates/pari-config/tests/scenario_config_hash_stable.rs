//! Scenario: config hash is deterministic under layering and key order.

use pari_config::load_layered_yaml_from_strings;

const BASE_YAML: &str = r#"
server:
  bind_addr: "0.0.0.0:8787"
wallet:
  starter_balance: 10000
  currency: "INR"
payments:
  keys_env:
    key_id: "PARI_PAYMENTS_KEY_ID"
    key_secret: "PARI_PAYMENTS_KEY_SECRET"
"#;

const BASE_YAML_REORDERED: &str = r#"
payments:
  keys_env:
    key_secret: "PARI_PAYMENTS_KEY_SECRET"
    key_id: "PARI_PAYMENTS_KEY_ID"
wallet:
  currency: "INR"
  starter_balance: 10000
server:
  bind_addr: "0.0.0.0:8787"
"#;

const OVERRIDE_YAML: &str = r#"
wallet:
  starter_balance: 500
"#;

#[test]
fn same_input_same_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.config_hash.len(), 64, "sha256 hex");
}

#[test]
fn key_order_does_not_change_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(a.canonical_json, b.canonical_json);
    assert_eq!(a.config_hash, b.config_hash);
}

#[test]
fn later_layer_overrides_and_changes_hash() {
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let layered = load_layered_yaml_from_strings(&[BASE_YAML, OVERRIDE_YAML]).unwrap();

    assert_ne!(base.config_hash, layered.config_hash);
    assert_eq!(
        layered.config_json.pointer("/wallet/starter_balance"),
        Some(&serde_json::json!(500))
    );
    // Sibling keys survive the deep merge.
    assert_eq!(
        layered.config_json.pointer("/wallet/currency"),
        Some(&serde_json::json!("INR"))
    );
}

#[test]
fn empty_layer_is_a_no_op() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML, ""]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
}
