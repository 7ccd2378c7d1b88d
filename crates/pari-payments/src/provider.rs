//! Payment provider boundary.
//!
//! [`PaymentProvider`] is the seam; [`RazorpayClient`] is the HTTP adapter.
//! Credentials are handed in by the caller and never logged.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::webhook::note_user_id;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderRequest {
    /// Minor units.
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProviderOrder {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub notes: Value,
}

impl ProviderOrder {
    pub fn noted_user_id(&self) -> Option<String> {
        note_user_id(&self.notes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Credentials are absent; the feature is unavailable.
    NotConfigured,
    /// Network or transport failure.
    Transport(String),
    /// The provider answered with a non-success status.
    Api { status: u16, description: String },
    /// The response body could not be decoded.
    Decode(String),
}

impl ProviderError {
    /// Short operator-facing detail.
    pub fn detail(&self) -> String {
        match self {
            ProviderError::NotConfigured => "payment provider is not configured".to_string(),
            ProviderError::Transport(m) | ProviderError::Decode(m) => m.clone(),
            ProviderError::Api { description, .. } => description.clone(),
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::NotConfigured => write!(f, "payment provider is not configured"),
            ProviderError::Transport(m) => write!(f, "provider transport error: {m}"),
            ProviderError::Api {
                status,
                description,
            } => write!(f, "provider api error status={status}: {description}"),
            ProviderError::Decode(m) => write!(f, "provider decode error: {m}"),
        }
    }
}

impl std::error::Error for ProviderError {}

#[async_trait::async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Public key id handed to checkout clients.
    fn key_id(&self) -> &str;

    async fn create_order(&self, req: &OrderRequest) -> Result<ProviderOrder, ProviderError>;

    async fn fetch_order(&self, order_id: &str) -> Result<ProviderOrder, ProviderError>;
}

/// HTTP adapter using basic auth with the key id / key secret pair.
#[derive(Clone)]
pub struct RazorpayClient {
    key_id: String,
    key_secret: String,
    http: reqwest::Client,
    base_url: String,
}

impl fmt::Debug for RazorpayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RazorpayClient")
            .field("key_id", &self.key_id)
            .field("key_secret", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl RazorpayClient {
    pub fn new(key_id: String, key_secret: String, base_url: String) -> Self {
        Self {
            key_id,
            key_secret,
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn orders_url(&self) -> String {
        format!("{}/orders", self.base_url)
    }

    async fn decode(resp: reqwest::Response) -> Result<ProviderOrder, ProviderError> {
        let status = resp.status();
        if !status.is_success() {
            let body: Value = resp.json().await.unwrap_or(Value::Null);
            return Err(ProviderError::Api {
                status: status.as_u16(),
                description: error_description(&body),
            });
        }
        resp.json::<ProviderOrder>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

/// `{"error": {"description": ..}}` is the provider's error shape.
fn error_description(body: &Value) -> String {
    body.pointer("/error/description")
        .or_else(|| body.get("description"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            let raw = body.to_string();
            raw.chars().take(200).collect()
        })
}

#[async_trait::async_trait]
impl PaymentProvider for RazorpayClient {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn create_order(&self, req: &OrderRequest) -> Result<ProviderOrder, ProviderError> {
        let resp = self
            .http
            .post(self.orders_url())
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(req)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Self::decode(resp).await
    }

    async fn fetch_order(&self, order_id: &str) -> Result<ProviderOrder, ProviderError> {
        let resp = self
            .http
            .get(format!("{}/{}", self.orders_url(), order_id))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Self::decode(resp).await
    }
}
