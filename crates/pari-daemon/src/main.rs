//! pari-daemon entry point.
//!
//! This file is intentionally thin: it loads config and secrets, connects
//! the store, builds the shared state, wires middleware, and starts the
//! HTTP server. All route handlers live in `routes.rs`.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use pari_config::{
    load_layered_yaml, report_unused_keys, resolve_secrets, Settings, UnusedKeyPolicy,
};
use pari_daemon::{routes, state::AppState};
use pari_db::PgLedgerStore;
use pari_ledger::AllowList;
use pari_payments::{PaymentProvider, RazorpayClient};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

/// Comma-separated YAML paths, later overriding earlier.
const ENV_CONFIG_PATHS: &str = "PARI_CONFIG_PATHS";
const DEFAULT_CONFIG_PATH: &str = "config/base.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let paths_raw =
        std::env::var(ENV_CONFIG_PATHS).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let paths: Vec<&str> = paths_raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    let loaded = load_layered_yaml(&paths).context("load config")?;
    let unused = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !unused.is_clean() {
        warn!(keys = ?unused.unused_leaf_pointers, "config contains unused keys");
    }
    let settings = Settings::from_config_json(&loaded.config_json)?;
    let secrets = resolve_secrets(&loaded.config_json);
    info!(config_hash = %loaded.config_hash, ?secrets, "config loaded");

    let pool = pari_db::connect_from_env().await?;
    pari_db::migrate(&pool).await?;
    let store = Arc::new(PgLedgerStore::new(pool));

    let authz = Arc::new(AllowList::from_csv(
        secrets.admin_emails.as_deref().unwrap_or_default(),
    ));
    if authz.is_empty() {
        warn!("admin allow-list is empty; admin actions are disabled");
    }

    let provider: Option<Arc<dyn PaymentProvider>> = match secrets.payments_keys() {
        Some((key_id, key_secret)) => Some(Arc::new(RazorpayClient::new(
            key_id.to_string(),
            key_secret.to_string(),
            settings.payments_base_url.clone(),
        ))),
        None => {
            warn!("payment provider keys absent; deposit orders are disabled");
            None
        }
    };
    if secrets.webhook_secret.is_none() {
        warn!("webhook secret absent; payment webhooks will be refused");
    }

    let addr: SocketAddr = settings
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address: {}", settings.bind_addr))?;

    let shared = Arc::new(AppState::new(
        settings,
        store,
        authz,
        provider,
        secrets.webhook_secret.clone(),
    ));

    let app = routes::build_router(shared)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    info!("pari-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
