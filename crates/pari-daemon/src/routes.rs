//! Axum router and all HTTP handlers for pari-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Handlers check identity first, then parse input, then
//! hand off to pari-ledger / pari-payments.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use pari_ledger::{
    build_portfolio, claim, parse_major_units, place_wager, pool::validate_amount, resolve,
    LedgerError, WagerRequest,
};
use pari_payments::{create_deposit_order, ProviderError, SIGNATURE_HEADER};
use pari_schemas::Side;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::{
    api_types::{
        ClaimResponse, CreateMarketRequest, HealthResponse, MarketDetail, MarketSummary,
        MeResponse, ResolveResponse, TransactionView, WagerResponse, WebhookAck,
    },
    auth::{require_principal, require_user},
    error::ApiError,
    state::AppState,
};

/// Wallet history page size.
pub const TRANSACTIONS_LIMIT: i64 = 100;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/me", get(me))
        .route("/v1/markets", get(list_markets).post(create_market))
        .route("/v1/markets/:id", get(get_market))
        .route("/v1/markets/:id/wager", post(wager))
        .route("/v1/markets/:id/resolve", post(resolve_market))
        .route("/v1/markets/:id/claim", post(claim_payout))
        .route("/v1/portfolio", get(portfolio))
        .route("/v1/wallet/transactions", get(transactions))
        .route("/v1/wallet/orders", post(create_order))
        .route("/v1/payments/webhook", post(payment_webhook))
        .with_state(state)
}

type ApiResult<T> = Result<T, ApiError>;

fn parse_json_body(body: &Bytes) -> ApiResult<Value> {
    serde_json::from_slice(body)
        .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, "INVALID_JSON", "invalid JSON"))
}

fn parse_market_id(raw: &str) -> ApiResult<Uuid> {
    // An id that cannot exist is reported like a missing market.
    Uuid::parse_str(raw.trim()).map_err(|_| {
        ApiError::new(StatusCode::NOT_FOUND, "MARKET_NOT_FOUND", "market not found")
    })
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/me
// ---------------------------------------------------------------------------

pub(crate) async fn me(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<MeResponse>> {
    let principal = require_principal(&headers)?;
    let user = st
        .store
        .ensure_user(
            &principal.email,
            &principal.display_name(),
            st.settings.starter_balance,
        )
        .await?;
    let is_admin = st.authz.is_authorized(&principal);
    Ok(Json(MeResponse::new(user, is_admin)))
}

// ---------------------------------------------------------------------------
// /v1/markets
// ---------------------------------------------------------------------------

pub(crate) async fn list_markets(
    State(st): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<MarketSummary>>> {
    let markets = st.store.list_markets().await?;
    Ok(Json(markets.iter().map(MarketSummary::from).collect()))
}

pub(crate) async fn create_market(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<MarketDetail>)> {
    let principal = require_principal(&headers)?;
    if !st.authz.is_authorized(&principal) {
        return Err(LedgerError::Forbidden.into());
    }
    let req: CreateMarketRequest = serde_json::from_value(parse_json_body(&body)?)
        .map_err(|_| ApiError::bad_request("question must be a string"))?;
    let question = req.question.as_deref().map(str::trim).unwrap_or_default();
    if question.is_empty() {
        return Err(ApiError::bad_request("question is required"));
    }

    let admin = st
        .store
        .ensure_user(
            &principal.email,
            &principal.display_name(),
            st.settings.starter_balance,
        )
        .await?;
    let market = st.store.create_market(question, admin.user_id).await?;
    info!(market_id = %market.market_id, created_by = %principal.email, "market created");
    Ok((StatusCode::CREATED, Json(MarketDetail::from(&market))))
}

pub(crate) async fn get_market(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<MarketDetail>> {
    let market_id = parse_market_id(&id)?;
    let market = st
        .store
        .fetch_market(market_id)
        .await?
        .ok_or(LedgerError::MarketNotFound { market_id })?;
    Ok(Json(MarketDetail::from(&market)))
}

// ---------------------------------------------------------------------------
// POST /v1/markets/{id}/wager
// ---------------------------------------------------------------------------

pub(crate) async fn wager(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WagerResponse>> {
    let principal = require_principal(&headers)?;
    let market_id = parse_market_id(&id)?;
    let body = parse_json_body(&body)?;

    let side = body
        .get("side")
        .and_then(Value::as_str)
        .and_then(|s| Side::parse(s).ok())
        .ok_or_else(|| ApiError::bad_request("side must be 'yes' or 'no'"))?;
    // Integers only; fractions and strings are malformed.
    let amount = body
        .get("amount")
        .and_then(Value::as_i64)
        .ok_or_else(|| {
            ApiError::bad_request("amount (positive integer, minor units) is required")
        })?;
    // Input is fully validated before the first store read.
    validate_amount(amount)?;

    let user = require_user(st.store.as_ref(), &principal).await?;
    let receipt = place_wager(
        st.store.as_ref(),
        &WagerRequest {
            user_id: user.user_id,
            market_id,
            side,
            amount,
        },
    )
    .await?;

    Ok(Json(WagerResponse {
        ok: true,
        side: receipt.side,
        amount: receipt.amount,
        balance: receipt.balance,
    }))
}

// ---------------------------------------------------------------------------
// POST /v1/markets/{id}/resolve
// ---------------------------------------------------------------------------

pub(crate) async fn resolve_market(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<ResolveResponse>> {
    // Identity and privilege are checked before the body is looked at.
    let principal = require_principal(&headers)?;
    if !st.authz.is_authorized(&principal) {
        return Err(LedgerError::Forbidden.into());
    }
    let market_id = parse_market_id(&id)?;
    let outcome_yes = parse_json_body(&body)?
        .get("outcomeYes")
        .and_then(Value::as_bool)
        .ok_or_else(|| ApiError::bad_request("outcomeYes (boolean) is required"))?;

    let market = resolve(
        st.store.as_ref(),
        st.authz.as_ref(),
        Some(&principal),
        market_id,
        Side::from_outcome_yes(outcome_yes),
    )
    .await?;

    Ok(Json(ResolveResponse {
        ok: true,
        outcome_yes: market.outcome_yes().unwrap_or(outcome_yes),
    }))
}

// ---------------------------------------------------------------------------
// POST /v1/markets/{id}/claim
// ---------------------------------------------------------------------------

pub(crate) async fn claim_payout(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<ClaimResponse>> {
    let principal = require_principal(&headers)?;
    let market_id = parse_market_id(&id)?;
    let user = require_user(st.store.as_ref(), &principal).await?;
    let receipt = claim(st.store.as_ref(), user.user_id, market_id).await?;
    Ok(Json(ClaimResponse {
        ok: true,
        amount_claimed: receipt.amount_claimed,
        balance: receipt.balance,
    }))
}

// ---------------------------------------------------------------------------
// GET /v1/portfolio
// ---------------------------------------------------------------------------

pub(crate) async fn portfolio(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let principal = require_principal(&headers)?;
    let user = require_user(st.store.as_ref(), &principal).await?;

    let wagers = st.store.wagers_for_user(user.user_id).await?;
    let mut market_ids: Vec<Uuid> = wagers.iter().map(|w| w.market_id).collect();
    market_ids.sort();
    market_ids.dedup();
    let markets = st.store.fetch_markets(&market_ids).await?;
    let claims = st.store.claims_for_user(user.user_id).await?;

    Ok(Json(build_portfolio(&wagers, &markets, &claims)))
}

// ---------------------------------------------------------------------------
// GET /v1/wallet/transactions
// ---------------------------------------------------------------------------

pub(crate) async fn transactions(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<TransactionView>>> {
    let principal = require_principal(&headers)?;
    let user = require_user(st.store.as_ref(), &principal).await?;
    let entries = st
        .store
        .recent_entries(user.user_id, TRANSACTIONS_LIMIT)
        .await?;
    Ok(Json(entries.iter().map(TransactionView::from).collect()))
}

// ---------------------------------------------------------------------------
// POST /v1/wallet/orders
// ---------------------------------------------------------------------------

pub(crate) async fn create_order(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let principal = require_principal(&headers)?;
    let provider = st.provider.clone().ok_or(ProviderError::NotConfigured)?;

    let body = parse_json_body(&body)?;
    let amount_minor = parse_major_units(body.get("amount"), st.settings.deposit_limits)?;
    let user = require_user(st.store.as_ref(), &principal).await?;

    let order = create_deposit_order(
        provider.as_ref(),
        user.user_id,
        amount_minor,
        &st.settings.currency,
        chrono::Utc::now().timestamp_millis(),
    )
    .await?;
    Ok(Json(order))
}

// ---------------------------------------------------------------------------
// POST /v1/payments/webhook
// ---------------------------------------------------------------------------

pub(crate) async fn payment_webhook(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let outcome = st.reconciler.handle(&body, signature).await?;
    tracing::debug!(?outcome, "webhook handled");
    Ok(Json(WebhookAck { received: true }))
}
