//! # REST API
//!
//! Builds the axum router that fronts the gateway. Relayers submit dispatches
//! and redemptions here; operators rotate signers and handlers through the
//! `/admin` routes.
//!
//! ## Endpoints
//!
//! | Method | Path                          | Description                          |
//! |--------|-------------------------------|--------------------------------------|
//! | GET    | `/health`                     | Liveness check                       |
//! | GET    | `/status`                     | Gateway configuration summary        |
//! | GET    | `/signers`                    | Trusted signer set                   |
//! | GET    | `/handlers`                   | Asset type to handler kind           |
//! | GET    | `/nonces/:digest`             | Whether a digest has been consumed   |
//! | GET    | `/events`                     | Recent gateway events                |
//! | GET    | `/balances/:asset/:account`   | Custody balance                      |
//! | POST   | `/dispatch`                   | Outbound operation, caller-signed    |
//! | POST   | `/redeem`                     | Inbound operation with a quorum proof|
//! | POST   | `/digest`                     | Operation digest attestors sign      |
//! | POST   | `/digest/dispatch`            | Dispatch digest the caller signs     |
//! | POST   | `/admin/signers`              | Add signers                          |
//! | DELETE | `/admin/signers`              | Remove signers                       |
//! | PUT    | `/admin/threshold`            | Change the threshold                 |
//! | POST   | `/admin/handlers`             | Register a handler kind              |
//! | DELETE | `/admin/handlers/:asset_type` | Unregister a handler                 |
//! | PUT    | `/admin/batcher`              | Replace the batch executor           |
//! | POST   | `/admin/credit`               | Seed a custody balance               |
//!
//! Admin routes require `Authorization: Bearer <token>` and are disabled
//! entirely when the node runs without an admin token.
//!
//! A dispatch names no depositor. The body carries the depositor's
//! signature over the dispatch digest and the gateway debits whoever
//! signed it.
//!
//! Every call that reaches the gateway is persisted before it returns,
//! including failed redemptions: their nonce is already consumed.

use std::collections::VecDeque;
use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    http::{header::AUTHORIZATION, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use conduit_contracts::{handler_for_kind, LedgerBatchExecutor};
use conduit_protocol::bridge::{
    AssetKey, AssetType, BridgeError, BridgeGateway, DedupStrategy, ErrorCategory, GatewayEvent,
};
use conduit_protocol::config::{MAX_DETAILS_BYTES, MAX_PROOF_SIGNATURES};
use conduit_protocol::crypto::{dispatch_digest, Address, Digest, Signature};
use conduit_protocol::storage::ConduitDB;

use crate::metrics::SharedMetrics;

/// How many events `/events` keeps around.
pub const EVENT_BUFFER: usize = 256;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// The gateway plus the tail of its event stream.
pub struct Bridge {
    pub gateway: BridgeGateway,
    recent_events: VecDeque<GatewayEvent>,
}

impl Bridge {
    pub fn new(gateway: BridgeGateway) -> Self {
        Self {
            gateway,
            recent_events: VecDeque::with_capacity(EVENT_BUFFER),
        }
    }

    fn collect_events(&mut self) {
        for event in self.gateway.take_events() {
            if self.recent_events.len() == EVENT_BUFFER {
                self.recent_events.pop_front();
            }
            tracing::info!(?event, "gateway event");
            self.recent_events.push_back(event);
        }
    }
}

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    /// Gateway calls are serialized through this lock.
    pub bridge: Arc<Mutex<Bridge>>,
    pub db: Arc<ConduitDB>,
    pub metrics: SharedMetrics,
    /// `None` disables the admin routes.
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    /// Records events, persists the gateway, and refreshes the gauges.
    /// Only nonces consumed since the last commit are written.
    fn commit(&self, bridge: &mut Bridge) -> Result<(), ApiError> {
        bridge.collect_events();
        let snapshot = bridge.gateway.pending_snapshot();
        self.db
            .save_snapshot(&snapshot)
            .map_err(|e| ApiError::Storage(e.to_string()))?;
        bridge.gateway.mark_persisted(&snapshot);
        self.metrics.observe_gateway(&bridge.gateway);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    let admin = Router::new()
        .route("/signers", post(add_signers_handler).delete(remove_signers_handler))
        .route("/threshold", put(threshold_handler))
        .route("/handlers", post(add_handler_handler))
        .route("/handlers/:asset_type", delete(remove_handler_handler))
        .route("/batcher", put(batcher_handler))
        .route("/credit", post(credit_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/signers", get(signers_handler))
        .route("/handlers", get(handlers_handler))
        .route("/nonces/:digest", get(nonce_handler))
        .route("/events", get(events_handler))
        .route("/balances/:asset/:account", get(balance_handler))
        .route("/dispatch", post(dispatch_handler))
        .route("/redeem", post(redeem_handler))
        .route("/digest", post(digest_handler))
        .route("/digest/dispatch", post(dispatch_digest_handler))
        .nest("/admin", admin)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,
}

#[derive(Debug)]
pub enum ApiError {
    Bridge(BridgeError),
    BadRequest(String),
    Storage(String),
    Unauthorized,
    AdminDisabled,
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        ApiError::Bridge(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, category) = match self {
            ApiError::Bridge(err) => {
                let category = err.category();
                let status = match (&err, category) {
                    (BridgeError::UnsupportedAssetType(_), _)
                    | (BridgeError::HandlerDoesNotExist(_), _) => StatusCode::NOT_FOUND,
                    (_, ErrorCategory::Configuration) => StatusCode::BAD_REQUEST,
                    (_, ErrorCategory::Authorization) => StatusCode::FORBIDDEN,
                    (_, ErrorCategory::Replay) => StatusCode::CONFLICT,
                    (_, ErrorCategory::Execution) => StatusCode::UNPROCESSABLE_ENTITY,
                };
                (status, err.to_string(), Some(category))
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Storage(msg) => {
                tracing::error!(error = %msg, "failed to persist gateway state");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("storage error: {msg}"),
                    None,
                )
            }
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "missing or invalid admin token".to_string(),
                None,
            ),
            ApiError::AdminDisabled => (
                StatusCode::FORBIDDEN,
                "admin API is disabled on this node".to_string(),
                None,
            ),
        };
        (status, Json(ErrorResponse { error, category })).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub network: String,
    pub threshold: usize,
    pub signers: usize,
    pub dedup: DedupStrategy,
    /// Whether every signer has a distinct address prefix. When false the
    /// prefix bitmap falls back to address-set deduplication.
    pub distinct_prefixes: bool,
    pub handlers: usize,
    pub batcher: Address,
    pub consumed_nonces: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HandlerEntry {
    pub asset_type: AssetType,
    pub kind: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NonceResponse {
    pub digest: Digest,
    pub consumed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumed_at: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub asset: AssetKey,
    pub account: Address,
    pub balance: u128,
}

/// Body of `/digest` and `/digest/dispatch`. `details` is hex, `0x` optional.
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationRequest {
    pub asset_type: AssetType,
    pub details: String,
}

/// Body of `/dispatch`. `signature` is the depositor's signature over the
/// dispatch digest of `(asset_type, details)`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub asset_type: AssetType,
    pub details: String,
    pub signature: Signature,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DispatchResponse {
    /// The account the dispatch was charged to.
    pub caller: Address,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RedeemRequest {
    pub asset_type: AssetType,
    pub details: String,
    pub signatures: Vec<Signature>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DigestResponse {
    pub digest: Digest,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignersRequest {
    pub signers: Vec<Address>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignersResponse {
    /// The signers the call actually added or removed.
    pub changed: Vec<Address>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThresholdRequest {
    pub threshold: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatcherRequest {
    pub address: Address,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreditRequest {
    pub asset: AssetKey,
    pub account: Address,
    pub amount: u128,
}

fn parse_details(raw: &str) -> Result<Vec<u8>, ApiError> {
    let bytes = hex::decode(raw.strip_prefix("0x").unwrap_or(raw))
        .map_err(|e| ApiError::BadRequest(format!("details are not valid hex: {e}")))?;
    if bytes.len() > MAX_DETAILS_BYTES {
        return Err(ApiError::BadRequest(format!(
            "details exceed {MAX_DETAILS_BYTES} bytes"
        )));
    }
    Ok(bytes)
}

// ---------------------------------------------------------------------------
// Admin Authentication
// ---------------------------------------------------------------------------

async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let expected = state.admin_token.as_deref().ok_or(ApiError::AdminDisabled)?;
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    if !constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
        tracing::warn!(path = %request.uri().path(), "rejected admin request with bad token");
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(request).await)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ---------------------------------------------------------------------------
// Query Handlers
// ---------------------------------------------------------------------------

/// `GET /health`
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".into(),
        version: state.version.clone(),
    })
}

/// `GET /status`
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let bridge = state.bridge.lock();
    let gateway = &bridge.gateway;
    Json(StatusResponse {
        version: state.version.clone(),
        network: gateway.network().to_string(),
        threshold: gateway.threshold(),
        signers: gateway.signers().len(),
        dedup: gateway.dedup(),
        distinct_prefixes: gateway.signers().has_distinct_prefixes(),
        handlers: gateway.handlers().len(),
        batcher: gateway.batcher(),
        consumed_nonces: gateway.nonces().len(),
    })
}

/// `GET /signers`
async fn signers_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.bridge.lock().gateway.signers().signers())
}

/// `GET /handlers`
async fn handlers_handler(State(state): State<AppState>) -> impl IntoResponse {
    let entries: Vec<HandlerEntry> = state
        .bridge
        .lock()
        .gateway
        .handlers()
        .entries()
        .into_iter()
        .map(|(asset_type, kind)| HandlerEntry { asset_type, kind })
        .collect();
    Json(entries)
}

/// `GET /nonces/:digest`
async fn nonce_handler(
    Path(digest): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<NonceResponse>, ApiError> {
    let digest: Digest = digest
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid digest: {e}")))?;
    let consumed_at = state.bridge.lock().gateway.nonces().consumed_at(&digest);
    Ok(Json(NonceResponse {
        digest,
        consumed: consumed_at.is_some(),
        consumed_at,
    }))
}

/// `GET /events`, oldest first.
async fn events_handler(State(state): State<AppState>) -> impl IntoResponse {
    let events: Vec<GatewayEvent> = state.bridge.lock().recent_events.iter().cloned().collect();
    Json(events)
}

/// `GET /balances/:asset/:account`
async fn balance_handler(
    Path((asset, account)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let asset: AssetKey = asset
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid asset key: {e}")))?;
    let account: Address = account
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid account: {e}")))?;
    let balance = state.bridge.lock().gateway.custody().balance_of(&asset, &account);
    Ok(Json(BalanceResponse {
        asset,
        account,
        balance,
    }))
}

// ---------------------------------------------------------------------------
// Operation Handlers
// ---------------------------------------------------------------------------

/// `POST /dispatch`
///
/// The signed request's digest is consumed even when the handler refuses
/// it, so the snapshot is written whatever the outcome.
async fn dispatch_handler(
    State(state): State<AppState>,
    Json(req): Json<DispatchRequest>,
) -> Result<(StatusCode, Json<DispatchResponse>), ApiError> {
    let details = parse_details(&req.details)?;
    let mut bridge = state.bridge.lock();

    let outcome = bridge
        .gateway
        .dispatch_signed(req.asset_type, &details, &req.signature);
    state.commit(&mut bridge)?;
    match outcome {
        Ok(caller) => {
            state.metrics.dispatches_total.inc();
            Ok((StatusCode::ACCEPTED, Json(DispatchResponse { caller })))
        }
        Err(err) => {
            state.metrics.record_rejection(err.category());
            Err(err.into())
        }
    }
}

/// `POST /redeem`
///
/// A rejected proof still consumes the digest, so the snapshot is written
/// whatever the outcome.
async fn redeem_handler(
    State(state): State<AppState>,
    Json(req): Json<RedeemRequest>,
) -> Result<Json<DigestResponse>, ApiError> {
    if req.signatures.len() > MAX_PROOF_SIGNATURES {
        return Err(ApiError::BadRequest(format!(
            "proof carries {} signatures, at most {MAX_PROOF_SIGNATURES} allowed",
            req.signatures.len()
        )));
    }
    let details = parse_details(&req.details)?;
    let timer = state.metrics.redeem_latency_seconds.start_timer();
    let mut bridge = state.bridge.lock();

    let outcome = bridge.gateway.redeem(req.asset_type, &details, &req.signatures);
    state.commit(&mut bridge)?;
    timer.observe_duration();
    match outcome {
        Ok(digest) => {
            state.metrics.redemptions_total.inc();
            Ok(Json(DigestResponse { digest }))
        }
        Err(err) => {
            tracing::warn!(asset_type = req.asset_type, error = %err, "redemption rejected");
            state.metrics.record_rejection(err.category());
            Err(err.into())
        }
    }
}

/// `POST /digest`
async fn digest_handler(
    State(state): State<AppState>,
    Json(req): Json<OperationRequest>,
) -> Result<Json<DigestResponse>, ApiError> {
    let details = parse_details(&req.details)?;
    let digest = state
        .bridge
        .lock()
        .gateway
        .operation_hash(req.asset_type, &details)?;
    Ok(Json(DigestResponse { digest }))
}

/// `POST /digest/dispatch`
async fn dispatch_digest_handler(
    State(state): State<AppState>,
    Json(req): Json<OperationRequest>,
) -> Result<Json<DigestResponse>, ApiError> {
    let details = parse_details(&req.details)?;
    let bridge = state.bridge.lock();
    bridge.gateway.handlers().resolve(req.asset_type)?;
    let digest = dispatch_digest(bridge.gateway.network(), req.asset_type, &details);
    Ok(Json(DigestResponse { digest }))
}

// ---------------------------------------------------------------------------
// Admin Handlers
// ---------------------------------------------------------------------------

/// `POST /admin/signers`
async fn add_signers_handler(
    State(state): State<AppState>,
    Json(req): Json<SignersRequest>,
) -> Result<Json<SignersResponse>, ApiError> {
    let mut bridge = state.bridge.lock();
    let changed = bridge.gateway.add_signers(&req.signers)?;
    state.commit(&mut bridge)?;
    Ok(Json(SignersResponse { changed }))
}

/// `DELETE /admin/signers`
async fn remove_signers_handler(
    State(state): State<AppState>,
    Json(req): Json<SignersRequest>,
) -> Result<Json<SignersResponse>, ApiError> {
    let mut bridge = state.bridge.lock();
    let changed = bridge.gateway.remove_signers(&req.signers)?;
    state.commit(&mut bridge)?;
    Ok(Json(SignersResponse { changed }))
}

/// `PUT /admin/threshold`
async fn threshold_handler(
    State(state): State<AppState>,
    Json(req): Json<ThresholdRequest>,
) -> Result<StatusCode, ApiError> {
    let mut bridge = state.bridge.lock();
    bridge.gateway.set_threshold(req.threshold)?;
    state.commit(&mut bridge)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /admin/handlers`
async fn add_handler_handler(
    State(state): State<AppState>,
    Json(req): Json<HandlerEntry>,
) -> Result<StatusCode, ApiError> {
    let handler = handler_for_kind(&req.kind)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown handler kind: {}", req.kind)))?;
    let mut bridge = state.bridge.lock();
    bridge.gateway.add_handler(req.asset_type, handler)?;
    state.commit(&mut bridge)?;
    Ok(StatusCode::CREATED)
}

/// `DELETE /admin/handlers/:asset_type`
async fn remove_handler_handler(
    Path(asset_type): Path<AssetType>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let mut bridge = state.bridge.lock();
    bridge.gateway.remove_handler(asset_type)?;
    state.commit(&mut bridge)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /admin/batcher`
async fn batcher_handler(
    State(state): State<AppState>,
    Json(req): Json<BatcherRequest>,
) -> Result<StatusCode, ApiError> {
    let mut bridge = state.bridge.lock();
    let executor = LedgerBatchExecutor::new(req.address, bridge.gateway.network().clone());
    bridge.gateway.set_batcher(Arc::new(executor))?;
    state.commit(&mut bridge)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /admin/credit`
///
/// Stands in for the host ledger minting or depositing into an account.
async fn credit_handler(
    State(state): State<AppState>,
    Json(req): Json<CreditRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let mut bridge = state.bridge.lock();
    bridge
        .gateway
        .custody_mut()
        .credit(req.asset, req.account, req.amount)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    state.commit(&mut bridge)?;
    let balance = bridge.gateway.custody().balance_of(&req.asset, &req.account);
    Ok(Json(BalanceResponse {
        asset: req.asset,
        account: req.account,
        balance,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
