//! Layered YAML configuration for the wagering daemon.
//!
//! Config documents hold non-secret settings and the NAMES of environment
//! variables that carry secrets. Values that look like secrets are rejected
//! at load time; see [`secrets`] for runtime resolution.

use anyhow::{bail, Context, Result};
use pari_ledger::DepositLimits;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;

pub mod secrets;

pub use secrets::{resolve_secrets, ResolvedSecrets};

/// If any leaf string in the effective config starts with one of these, load
/// fails with CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "rzp_live_",  // payment provider live key id
    "rzp_test_",  // payment provider test key id
    "whsec_",     // webhook signing secret
    "sk-",
    "sk_live",
    "sk_test",
    "AKIA",       // AWS access key ID
    "-----BEGIN", // PEM private keys
    "ghp_",
    "glpat-",
];

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";
pub const DEFAULT_STARTER_BALANCE: i64 = 10_000;
pub const DEFAULT_CURRENCY: &str = "INR";
pub const DEFAULT_PAYMENTS_BASE_URL: &str = "https://api.razorpay.com/v1";

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }
    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

/// Earlier docs are the base; later docs override key by key.
pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        // An empty document parses to null; treat it as an empty layer.
        if v_yaml.is_null() {
            continue;
        }
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    // serde_json::Map is sorted by key, so serialization is canonical.
    let canonical_json = serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        if let Some(s) = v.pointer(&ptr).and_then(Value::as_str) {
            if looks_like_secret(s) {
                bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
            }
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                let next = format!("{}/{}", prefix, i);
                collect_leaf_pointers(vv, &next, out);
            }
        }
        _ => {
            let p = if prefix.is_empty() {
                "/".to_string()
            } else {
                prefix.to_string()
            };
            out.push(p);
        }
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

// ---------------------------------------------------------------------------
// Unused-key guard
// ---------------------------------------------------------------------------

/// JSON-pointer prefixes the daemon actually reads. Keep in step with
/// [`Settings::from_config_json`] and [`secrets::resolve_secrets`].
pub const CONSUMED_POINTERS: &[&str] = &[
    "/server/bind_addr",
    "/wallet/starter_balance",
    "/wallet/currency",
    "/wallet/deposit/min_units",
    "/wallet/deposit/max_units",
    "/payments/base_url",
    "/payments/keys_env",
    "/payments/webhook_secret_env",
    "/admin/allow_list_env",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    /// Sorted leaf pointers not covered by any consumed prefix.
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// With `Fail`, unused keys are an error; with `Warn`, they are only reported.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let mut leaves: Vec<String> = Vec::new();
    collect_leaf_pointers(config_json, "", &mut leaves);

    let unused: BTreeSet<String> = leaves
        .into_iter()
        .filter(|lp| !CONSUMED_POINTERS.iter().any(|cp| is_prefix_pointer(cp, lp)))
        .collect();

    let report = UnusedKeyReport {
        unused_leaf_pointers: unused.into_iter().collect(),
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        bail!(
            "CONFIG_UNUSED_KEYS: {} unused config leaf key(s) detected: {:?}",
            report.unused_leaf_pointers.len(),
            report.unused_leaf_pointers
        );
    }
    Ok(report)
}

/// "/a/b" covers "/a/b" and "/a/b/c" but not "/a/bc".
fn is_prefix_pointer(prefix: &str, leaf: &str) -> bool {
    leaf == prefix
        || (leaf.starts_with(prefix) && leaf.as_bytes().get(prefix.len()) == Some(&b'/'))
}

// ---------------------------------------------------------------------------
// Typed settings
// ---------------------------------------------------------------------------

/// Non-secret runtime settings with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub bind_addr: String,
    /// Minor units credited to a user on first sight.
    pub starter_balance: i64,
    pub currency: String,
    pub deposit_limits: DepositLimits,
    pub payments_base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            starter_balance: DEFAULT_STARTER_BALANCE,
            currency: DEFAULT_CURRENCY.to_string(),
            deposit_limits: DepositLimits::default(),
            payments_base_url: DEFAULT_PAYMENTS_BASE_URL.to_string(),
        }
    }
}

impl Settings {
    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        let d = Settings::default();

        let bind_addr = read_str(config_json, "/server/bind_addr")?.unwrap_or(d.bind_addr);
        let starter_balance =
            read_i64(config_json, "/wallet/starter_balance")?.unwrap_or(d.starter_balance);
        if starter_balance < 0 {
            bail!("CONFIG_INVALID /wallet/starter_balance must be >= 0");
        }
        let currency = read_str(config_json, "/wallet/currency")?.unwrap_or(d.currency);

        let min_units = read_i64(config_json, "/wallet/deposit/min_units")?
            .unwrap_or(d.deposit_limits.min_units);
        let max_units = read_i64(config_json, "/wallet/deposit/max_units")?
            .unwrap_or(d.deposit_limits.max_units);
        if min_units < 1 || max_units < min_units {
            bail!(
                "CONFIG_INVALID /wallet/deposit: require 1 <= min_units <= max_units (got {min_units}..{max_units})"
            );
        }

        let payments_base_url = read_str(config_json, "/payments/base_url")?
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or(d.payments_base_url);

        Ok(Self {
            bind_addr,
            starter_balance,
            currency,
            deposit_limits: DepositLimits {
                min_units,
                max_units,
            },
            payments_base_url,
        })
    }
}

fn read_str(v: &Value, ptr: &str) -> Result<Option<String>> {
    match v.pointer(ptr) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => bail!("CONFIG_INVALID {ptr} must be a string"),
    }
}

fn read_i64(v: &Value, ptr: &str) -> Result<Option<i64>> {
    match v.pointer(ptr) {
        None | Some(Value::Null) => Ok(None),
        Some(x) => x
            .as_i64()
            .map(Some)
            .with_context(|| format!("CONFIG_INVALID {ptr} must be an integer")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_pointer_respects_segment_boundary() {
        assert!(is_prefix_pointer("/payments/keys_env", "/payments/keys_env/key_id"));
        assert!(is_prefix_pointer("/wallet/currency", "/wallet/currency"));
        assert!(!is_prefix_pointer("/wallet/currency", "/wallet/currency_symbol"));
    }

    #[test]
    fn short_values_are_never_secrets() {
        assert!(!looks_like_secret("sk-1"));
        assert!(looks_like_secret("rzp_live_abcdef123"));
        assert!(!looks_like_secret("PARI_PAYMENTS_KEY_ID"));
    }
}
