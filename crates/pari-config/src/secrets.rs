//! Runtime secret resolution.
//!
//! Config stores only env var NAMES. The daemon calls [`resolve_secrets`]
//! once at startup and passes the result to constructors. `Debug` redacts
//! every value, and nothing here ever echoes a value into an error.

use serde_json::Value;

pub const DEFAULT_KEY_ID_ENV: &str = "PARI_PAYMENTS_KEY_ID";
pub const DEFAULT_KEY_SECRET_ENV: &str = "PARI_PAYMENTS_KEY_SECRET";
pub const DEFAULT_WEBHOOK_SECRET_ENV: &str = "PARI_WEBHOOK_SECRET";
pub const DEFAULT_ADMIN_LIST_ENV: &str = "PARI_ADMIN_EMAILS";

/// All optional. A missing secret disables the feature that needs it
/// (deposit orders, webhook intake, admin actions) instead of failing boot.
#[derive(Clone, Default)]
pub struct ResolvedSecrets {
    pub payments_key_id: Option<String>,
    pub payments_key_secret: Option<String>,
    pub webhook_secret: Option<String>,
    /// Comma-separated admin emails.
    pub admin_emails: Option<String>,
}

impl ResolvedSecrets {
    /// Key id and secret are only useful together.
    pub fn payments_keys(&self) -> Option<(&str, &str)> {
        match (&self.payments_key_id, &self.payments_key_secret) {
            (Some(id), Some(secret)) => Some((id.as_str(), secret.as_str())),
            _ => None,
        }
    }
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field(
                "payments_key_id",
                &self.payments_key_id.as_ref().map(|_| "<REDACTED>"),
            )
            .field(
                "payments_key_secret",
                &self.payments_key_secret.as_ref().map(|_| "<REDACTED>"),
            )
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "<REDACTED>"),
            )
            .field(
                "admin_emails",
                &self.admin_emails.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

/// Env var NAMES read from config, falling back to the well-known defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretEnvNames {
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: String,
    pub admin_emails: String,
}

impl SecretEnvNames {
    pub fn from_config_json(config_json: &Value) -> Self {
        let name = |ptr: &str, default: &str| {
            read_str_at(config_json, ptr).unwrap_or_else(|| default.to_string())
        };
        Self {
            key_id: name("/payments/keys_env/key_id", DEFAULT_KEY_ID_ENV),
            key_secret: name("/payments/keys_env/key_secret", DEFAULT_KEY_SECRET_ENV),
            webhook_secret: name("/payments/webhook_secret_env", DEFAULT_WEBHOOK_SECRET_ENV),
            admin_emails: name("/admin/allow_list_env", DEFAULT_ADMIN_LIST_ENV),
        }
    }
}

fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let trimmed = config.pointer(pointer)?.as_str()?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Blank counts as unset.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

pub fn resolve_secrets(config_json: &Value) -> ResolvedSecrets {
    resolve_secrets_with(&SecretEnvNames::from_config_json(config_json), resolve_env)
}

/// Same as [`resolve_secrets`] with an injectable lookup, for tests.
pub fn resolve_secrets_with<F>(names: &SecretEnvNames, lookup: F) -> ResolvedSecrets
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    ResolvedSecrets {
        payments_key_id: get(&names.key_id),
        payments_key_secret: get(&names.key_secret),
        webhook_secret: get(&names.webhook_secret),
        admin_emails: get(&names.admin_emails),
    }
}
