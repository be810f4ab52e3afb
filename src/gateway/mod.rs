//! Axum-based HTTP gateway for the credit-metered generation service.
//!
//! Endpoints:
//! - `POST /generate`        — spend one credit on a generation
//! - `GET  /profile/{id}`    — balance + bonus timer
//! - `POST /bonus/claim`     — claim the daily bonus
//! - `GET  /packages`        — purchasable credit packages
//! - `POST /invoice`         — create a signed payment invoice
//! - `POST /webhook/payment` — provider payment notifications
//! - `GET  /health`          — liveness check
//!
//! The webhook endpoint acknowledges every notification with HTTP 200 and
//! `{"status":"ok"}` whatever the internal outcome, so the provider never
//! retry-storms on rejections; only a storage failure returns 500 to force
//! a redelivery (which the applied-order ledger makes idempotent).

use crate::config::Config;
use crate::generate::{GenerationOutcome, Generator, OpenRouterGenerator, UsageGate};
use crate::ledger::{self, AccountStore, BonusOutcome, CreditLedger};
use crate::notify::{LogNotifier, Notifier};
use crate::payment::{
    self, signing, InvoiceClient, PaymentNotification, ReconcileOutcome, WebhookReconciler,
};
use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB) — prevents memory exhaustion.
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout — bounds a generation round-trip end to end.
pub const REQUEST_TIMEOUT_SECS: u64 = 120;
/// Sliding window used by gateway rate limiting.
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// How often the rate limiter sweeps stale IP entries from its map.
const RATE_LIMITER_SWEEP_INTERVAL_SECS: u64 = 300; // 5 minutes

#[derive(Debug)]
struct SlidingWindowRateLimiter {
    limit_per_window: u32,
    window: Duration,
    requests: Mutex<(HashMap<String, Vec<Instant>>, Instant)>,
}

impl SlidingWindowRateLimiter {
    fn new(limit_per_window: u32, window: Duration) -> Self {
        Self {
            limit_per_window,
            window,
            requests: Mutex::new((HashMap::new(), Instant::now())),
        }
    }

    fn allow(&self, key: &str) -> bool {
        // A limit of 0 disables limiting for this endpoint class.
        if self.limit_per_window == 0 {
            return true;
        }

        let now = Instant::now();
        let cutoff = now.checked_sub(self.window).unwrap_or_else(Instant::now);

        let mut guard = self.requests.lock();
        let (requests, last_sweep) = &mut *guard;

        // Periodic sweep so idle IPs don't accumulate forever.
        if last_sweep.elapsed() >= Duration::from_secs(RATE_LIMITER_SWEEP_INTERVAL_SECS) {
            requests.retain(|_, timestamps| {
                timestamps.retain(|t| *t > cutoff);
                !timestamps.is_empty()
            });
            *last_sweep = now;
        }

        let entry = requests.entry(key.to_owned()).or_default();
        entry.retain(|instant| *instant > cutoff);

        if entry.len() >= self.limit_per_window as usize {
            return false;
        }

        entry.push(now);
        true
    }
}

#[derive(Debug)]
pub struct GatewayRateLimiter {
    generate: SlidingWindowRateLimiter,
    webhook: SlidingWindowRateLimiter,
}

impl GatewayRateLimiter {
    fn new(generate_per_minute: u32, webhook_per_minute: u32) -> Self {
        let window = Duration::from_secs(RATE_LIMIT_WINDOW_SECS);
        Self {
            generate: SlidingWindowRateLimiter::new(generate_per_minute, window),
            webhook: SlidingWindowRateLimiter::new(webhook_per_minute, window),
        }
    }

    fn allow_generate(&self, key: &str) -> bool {
        self.generate.allow(key)
    }

    fn allow_webhook(&self, key: &str) -> bool {
        self.webhook.allow(key)
    }
}

fn client_key_from_headers(headers: &HeaderMap) -> String {
    for header_name in ["X-Forwarded-For", "X-Real-IP"] {
        if let Some(value) = headers.get(header_name).and_then(|v| v.to_str().ok()) {
            let first = value.split(',').next().unwrap_or("").trim();
            if !first.is_empty() {
                return first.to_owned();
            }
        }
    }
    "unknown".into()
}

/// Shared state for all axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub ledger: CreditLedger,
    pub gate: UsageGate,
    pub reconciler: WebhookReconciler,
    pub invoices: Arc<InvoiceClient>,
    /// Shared secret for inbound webhook signature verification.
    pub webhook_key: Option<Arc<str>>,
    pub rate_limiter: Arc<GatewayRateLimiter>,
}

/// Run the HTTP gateway.
pub async fn run_gateway(config: &Config) -> Result<()> {
    std::fs::create_dir_all(&config.data_dir)?;
    let store = AccountStore::open(&config.ledger_db_path())?;
    let ledger = CreditLedger::new(store, &config.ledger);

    let generator: Arc<dyn Generator> = Arc::new(OpenRouterGenerator::new(&config.generator)?);
    let gate = UsageGate::new(
        ledger.clone(),
        generator,
        Duration::from_secs(config.generator.timeout_secs.max(1)),
    );

    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let reconciler = WebhookReconciler::new(ledger.clone(), notifier);

    let invoices = Arc::new(InvoiceClient::new(&config.payment));
    if !invoices.is_enabled() {
        tracing::warn!("no merchant credentials configured — invoice creation disabled");
    }

    let webhook_key: Option<Arc<str>> = config
        .payment
        .signing_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(Arc::from);
    if webhook_key.is_none() {
        tracing::warn!("no signing key configured — all payment webhooks will be rejected");
    }

    let state = AppState {
        ledger,
        gate,
        reconciler,
        invoices,
        webhook_key,
        rate_limiter: Arc::new(GatewayRateLimiter::new(
            config.gateway.generate_rate_limit_per_minute,
            config.gateway.webhook_rate_limit_per_minute,
        )),
    };

    let addr: SocketAddr = format!("{}:{}", config.gateway.host, config.gateway.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("scriptforge gateway listening on http://{addr}");

    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

/// Build the router with body-limit, timeout, and CORS layers.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/generate", post(handle_generate))
        .route("/profile/{account_id}", get(handle_profile))
        .route("/bonus/claim", post(handle_bonus_claim))
        .route("/packages", get(handle_packages))
        .route("/invoice", post(handle_invoice))
        .route("/webhook/payment", post(handle_payment_webhook))
        .route("/health", get(handle_health))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

#[derive(Debug, Deserialize)]
struct GenerateBody {
    account_id: String,
    #[serde(default)]
    display_name: Option<String>,
    prompt: String,
}

async fn handle_generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<GenerateBody>,
) -> impl IntoResponse {
    let client_key = client_key_from_headers(&headers);
    if !state.rate_limiter.allow_generate(&client_key) {
        let err = serde_json::json!({
            "error": "Too many generation requests. Please retry later.",
            "retry_after": RATE_LIMIT_WINDOW_SECS,
        });
        return (StatusCode::TOO_MANY_REQUESTS, Json(err));
    }

    if body.account_id.trim().is_empty() || body.prompt.trim().is_empty() {
        let err = serde_json::json!({"error": "account_id and prompt are required"});
        return (StatusCode::BAD_REQUEST, Json(err));
    }

    let outcome = state
        .gate
        .handle(
            body.account_id.trim(),
            body.display_name.as_deref(),
            &body.prompt,
        )
        .await;

    match outcome {
        Ok(GenerationOutcome::Generated { text, balance }) => (
            StatusCode::OK,
            Json(serde_json::json!({"text": text, "balance": balance})),
        ),
        Ok(GenerationOutcome::Insufficient) => (
            StatusCode::PAYMENT_REQUIRED,
            Json(serde_json::json!({
                "error": "insufficient_credit",
                "message": "Balance is empty. Claim the daily bonus or buy a credit package.",
            })),
        ),
        Ok(GenerationOutcome::ServiceUnavailable) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "error": "service_unavailable",
                "message": "Generation is temporarily unavailable. Please try again.",
            })),
        ),
        Err(e) => {
            tracing::error!("generate: storage unavailable: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "error": "service_unavailable",
                    "message": "Please try again later.",
                })),
            )
        }
    }
}

async fn handle_profile(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> impl IntoResponse {
    let account = match state.ledger.ensure_account(account_id.trim()) {
        Ok(account) => account,
        Err(e) => {
            tracing::error!("profile: storage unavailable: {e}");
            let err = serde_json::json!({"error": "service_unavailable"});
            return (StatusCode::SERVICE_UNAVAILABLE, Json(err));
        }
    };

    let bonus = match ledger::evaluate_bonus(
        account.last_bonus_at,
        Utc::now(),
        state.ledger.bonus_period(),
    ) {
        ledger::BonusEligibility::Available => serde_json::json!({"available": true}),
        ledger::BonusEligibility::WaitRemaining(wait) => {
            let (hours, minutes) = ledger::wait_hours_minutes(wait);
            serde_json::json!({
                "available": false,
                "wait_hours": hours,
                "wait_minutes": minutes,
            })
        }
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "account_id": account.id,
            "display_name": account.display_name,
            "balance": account.balance,
            "bonus": bonus,
        })),
    )
}

#[derive(Debug, Deserialize)]
struct BonusClaimBody {
    account_id: String,
}

async fn handle_bonus_claim(
    State(state): State<AppState>,
    Json(body): Json<BonusClaimBody>,
) -> impl IntoResponse {
    let grant = state.ledger.bonus_grant();
    match state
        .ledger
        .claim_bonus(body.account_id.trim(), grant, Utc::now())
    {
        Ok(BonusOutcome::Granted { balance }) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "granted", "balance": balance})),
        ),
        Ok(BonusOutcome::TooEarly { wait }) => {
            let (hours, minutes) = ledger::wait_hours_minutes(wait);
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "status": "too_early",
                    "wait_hours": hours,
                    "wait_minutes": minutes,
                })),
            )
        }
        Err(e) => {
            tracing::error!("bonus claim: storage unavailable: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({"error": "service_unavailable"})),
            )
        }
    }
}

async fn handle_packages() -> impl IntoResponse {
    Json(serde_json::json!({"packages": payment::CREDIT_PACKAGES}))
}

#[derive(Debug, Deserialize)]
struct InvoiceBodyRequest {
    account_id: String,
    package_id: String,
}

async fn handle_invoice(
    State(state): State<AppState>,
    Json(body): Json<InvoiceBodyRequest>,
) -> impl IntoResponse {
    let Some(package) = payment::find_package(&body.package_id) else {
        let err = serde_json::json!({"error": format!("unknown package: {}", body.package_id)});
        return (StatusCode::BAD_REQUEST, Json(err));
    };

    let prepared = match state.invoices.prepare(body.account_id.trim(), package) {
        Ok(prepared) => prepared,
        Err(payment::invoice::InvoiceError::Disabled) => {
            let err = serde_json::json!({"error": "payments are not configured"});
            return (StatusCode::SERVICE_UNAVAILABLE, Json(err));
        }
        Err(payment::invoice::InvoiceError::Order(e)) => {
            let err = serde_json::json!({"error": e.to_string()});
            return (StatusCode::BAD_REQUEST, Json(err));
        }
        Err(e) => {
            tracing::error!("invoice preparation failed: {e}");
            let err = serde_json::json!({"error": "invoice preparation failed"});
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(err));
        }
    };

    match state.invoices.submit(&prepared).await {
        Ok(pay_url) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "order_token": prepared.order_token,
                "encoded_body": prepared.signed.encoded,
                "signature": prepared.signed.signature,
                "credits": prepared.credits,
                "pay_url": pay_url,
            })),
        ),
        Err(e) => {
            tracing::warn!("invoice submission failed: {e}");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({"error": "payment provider unavailable"})),
            )
        }
    }
}

/// Payment provider notification endpoint.
///
/// The signature is checked over the raw body before any parsing. Every
/// domain outcome acknowledges with 200 so the provider stops redelivering;
/// rejections are observable in logs only.
async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let ok = || (StatusCode::OK, Json(serde_json::json!({"status": "ok"})));

    let client_key = client_key_from_headers(&headers);
    if !state.rate_limiter.allow_webhook(&client_key) {
        tracing::warn!("payment webhook rate limit exceeded for key: {client_key}");
        let err = serde_json::json!({
            "error": "Too many webhook requests. Please retry later.",
            "retry_after": RATE_LIMIT_WINDOW_SECS,
        });
        return (StatusCode::TOO_MANY_REQUESTS, Json(err));
    }

    let Some(ref key) = state.webhook_key else {
        tracing::warn!("payment webhook received but no signing key is configured");
        return ok();
    };

    let signature = headers
        .get("X-Signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !signing::verify(key, &body, signature) {
        tracing::warn!(
            "payment webhook signature verification failed (signature: {})",
            if signature.is_empty() {
                "<missing>"
            } else {
                "<invalid>"
            }
        );
        return ok();
    }

    let notification: PaymentNotification = match serde_json::from_slice(&body) {
        Ok(notification) => notification,
        Err(e) => {
            tracing::warn!("payment webhook body did not parse: {e}");
            return ok();
        }
    };

    match state.reconciler.reconcile(&notification).await {
        Ok(ReconcileOutcome::Applied { .. })
        | Ok(ReconcileOutcome::Ignored(_))
        | Ok(ReconcileOutcome::Rejected(_)) => ok(),
        Err(e) => {
            // Storage down: answer 500 so the provider redelivers; the
            // applied-order ledger absorbs the replay once storage is back.
            tracing::error!("payment webhook: storage unavailable: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"status": "error"})),
            )
        }
    }
}
