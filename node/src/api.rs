//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the node's HTTP interface. Every
//! mutating endpoint takes the acting identity as the `caller` field of its
//! JSON body and returns the operation's [`Receipt`] on success.
//!
//! ## Endpoints
//!
//! | Method | Path                                        | Description              |
//! |--------|---------------------------------------------|--------------------------|
//! | GET    | `/health`                                   | Liveness check           |
//! | GET    | `/status`                                   | Node status summary      |
//! | POST   | `/tokens`                                   | Deploy a token           |
//! | GET    | `/tokens/:asset`                            | Token metadata           |
//! | POST   | `/tokens/:asset/mint`                       | Mint (owner only)        |
//! | POST   | `/tokens/:asset/transfer`                   | Transfer                 |
//! | POST   | `/tokens/:asset/approve`                    | Set allowance            |
//! | POST   | `/tokens/:asset/transfer_from`              | Spend allowance          |
//! | GET    | `/tokens/:asset/balances/:account`          | Balance                  |
//! | GET    | `/tokens/:asset/allowances/:owner/:spender` | Allowance                |
//! | POST   | `/grants`                                   | Add a grant              |
//! | POST   | `/grants/claim`                             | Claim the caller's grant |
//! | GET    | `/grants/:recipient`                        | Grant lookup             |
//! | POST   | `/grants/:recipient/decrease_lock_time`     | Shorten the lock         |
//! | POST   | `/grants/:recipient/remove`                 | Cancel and refund        |
//! | GET    | `/ws`                                       | Live event stream        |
//!
//! Failures answer with a 4xx status and `{ "error": ..., "kind": ... }`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use grantvault_contracts::config::DEFAULT_DECIMALS;
use grantvault_contracts::types::amount_string;
use grantvault_contracts::{
    Address, Amount, AssetId, ErrorKind, Grant, Log, Receipt, Runtime, RuntimeError, Timestamp,
    TokenInfo,
};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Ledgers and vault.
    pub runtime: Arc<Runtime>,
    /// Committed events, fanned out to WebSocket subscribers. The runtime
    /// publishes here through [`publish_to`].
    pub event_tx: broadcast::Sender<Log>,
    pub metrics: SharedMetrics,
}

impl AppState {
    /// Runs one mutating operation and records its metrics.
    fn apply<F>(&self, op: &'static str, f: F) -> Result<Json<Receipt>, ApiError>
    where
        F: FnOnce(&Runtime) -> Result<Receipt, RuntimeError>,
    {
        let started = Instant::now();
        let result = f(&self.runtime);
        self.metrics.observe(
            op,
            result.as_ref().map(|_| ()).map_err(RuntimeError::kind),
            started.elapsed(),
        );

        let receipt = result?;
        self.metrics
            .active_grants
            .set(self.runtime.grant_count() as i64);
        Ok(Json(receipt))
    }
}

/// Event hook that forwards each committed log to `tx`. Installed on the
/// runtime, it runs under the state lock, so subscribers see logs in
/// commit order.
pub fn publish_to(tx: broadcast::Sender<Log>) -> impl Fn(&Receipt) + Send + Sync + 'static {
    move |receipt| {
        for log in &receipt.events {
            // No subscribers is not an error.
            let _ = tx.send(log.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/ws", get(ws_handler))
        .route("/tokens", post(deploy_token_handler))
        .route("/tokens/:asset", get(token_info_handler))
        .route("/tokens/:asset/mint", post(mint_handler))
        .route("/tokens/:asset/transfer", post(transfer_handler))
        .route("/tokens/:asset/approve", post(approve_handler))
        .route("/tokens/:asset/transfer_from", post(transfer_from_handler))
        .route("/tokens/:asset/balances/:account", get(balance_handler))
        .route(
            "/tokens/:asset/allowances/:owner/:spender",
            get(allowance_handler),
        )
        .route("/grants", post(add_grant_handler))
        .route("/grants/claim", post(claim_grant_handler))
        .route("/grants/:recipient", get(grant_handler))
        .route(
            "/grants/:recipient/decrease_lock_time",
            post(decrease_lock_time_handler),
        )
        .route("/grants/:recipient/remove", post(remove_grant_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error body for every failed request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl From<RuntimeError> for ApiError {
    fn from(err: RuntimeError) -> Self {
        let kind = err.kind();
        let status = match kind {
            ErrorKind::UnknownAsset | ErrorKind::NoSuchGrant => StatusCode::NOT_FOUND,
            ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
            ErrorKind::GrantAlreadyExists | ErrorKind::DuplicateSymbol => StatusCode::CONFLICT,
            ErrorKind::InvalidTokenMetadata | ErrorKind::ZeroAmount => StatusCode::BAD_REQUEST,
            ErrorKind::InsufficientBalance
            | ErrorKind::InsufficientAllowance
            | ErrorKind::Overflow
            | ErrorKind::NotYetUnlocked
            | ErrorKind::LockTimeIncrease
            | ErrorKind::AssetMismatch => StatusCode::UNPROCESSABLE_ENTITY,
        };
        Self {
            status,
            body: ErrorResponse {
                error: err.to_string(),
                kind,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    /// Node clock, Unix seconds.
    pub now: Timestamp,
    pub vault_address: Address,
    pub token_count: usize,
    pub grant_count: usize,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
pub struct DeployTokenRequest {
    pub caller: Address,
    pub name: String,
    pub symbol: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

fn default_decimals() -> u8 {
    DEFAULT_DECIMALS
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeployTokenResponse {
    pub asset_id: AssetId,
}

#[derive(Debug, Deserialize)]
pub struct MintRequest {
    pub caller: Address,
    pub to: Address,
    #[serde(with = "amount_string")]
    pub amount: Amount,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub caller: Address,
    pub to: Address,
    #[serde(with = "amount_string")]
    pub amount: Amount,
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub caller: Address,
    pub spender: Address,
    #[serde(with = "amount_string")]
    pub amount: Amount,
}

#[derive(Debug, Deserialize)]
pub struct TransferFromRequest {
    pub caller: Address,
    pub owner: Address,
    pub to: Address,
    #[serde(with = "amount_string")]
    pub amount: Amount,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub asset: AssetId,
    pub account: Address,
    #[serde(with = "amount_string")]
    pub balance: Amount,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AllowanceResponse {
    pub asset: AssetId,
    pub owner: Address,
    pub spender: Address,
    #[serde(with = "amount_string")]
    pub allowance: Amount,
}

#[derive(Debug, Deserialize)]
pub struct AddGrantRequest {
    pub caller: Address,
    pub asset: AssetId,
    pub recipient: Address,
    #[serde(with = "amount_string")]
    pub amount: Amount,
    pub unlock_time: Timestamp,
}

#[derive(Debug, Deserialize)]
pub struct DecreaseLockTimeRequest {
    pub caller: Address,
    pub new_unlock_time: Timestamp,
}

#[derive(Debug, Deserialize)]
pub struct RemoveGrantRequest {
    pub caller: Address,
}

#[derive(Debug, Deserialize)]
pub struct ClaimGrantRequest {
    pub caller: Address,
    pub grantor: Address,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GrantResponse {
    pub recipient: Address,
    #[serde(flatten)]
    pub grant: Grant,
    /// Whether the grant is claimable at the node's current time.
    pub unlocked: bool,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        version: state.version.clone(),
        now: state.runtime.now(),
        vault_address: state.runtime.vault_address(),
        token_count: state.runtime.token_count(),
        grant_count: state.runtime.grant_count(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn deploy_token_handler(
    State(state): State<AppState>,
    Json(req): Json<DeployTokenRequest>,
) -> Result<(StatusCode, Json<DeployTokenResponse>), ApiError> {
    let started = Instant::now();
    let result = state
        .runtime
        .deploy_token(&req.caller, &req.name, &req.symbol, req.decimals);
    state.metrics.observe(
        "deploy_token",
        result.as_ref().map(|_| ()).map_err(RuntimeError::kind),
        started.elapsed(),
    );
    let asset_id = result?;
    Ok((StatusCode::CREATED, Json(DeployTokenResponse { asset_id })))
}

async fn token_info_handler(
    Path(asset): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<TokenInfo>, ApiError> {
    Ok(Json(state.runtime.token_info(&asset)?))
}

async fn mint_handler(
    Path(asset): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<MintRequest>,
) -> Result<Json<Receipt>, ApiError> {
    state.apply("mint", |rt| {
        rt.mint(&req.caller, &asset, &req.to, req.amount)
    })
}

async fn transfer_handler(
    Path(asset): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<Receipt>, ApiError> {
    state.apply("transfer", |rt| {
        rt.transfer(&req.caller, &asset, &req.to, req.amount)
    })
}

async fn approve_handler(
    Path(asset): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<ApproveRequest>,
) -> Result<Json<Receipt>, ApiError> {
    state.apply("approve", |rt| {
        rt.approve(&req.caller, &asset, &req.spender, req.amount)
    })
}

async fn transfer_from_handler(
    Path(asset): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<TransferFromRequest>,
) -> Result<Json<Receipt>, ApiError> {
    state.apply("transfer_from", |rt| {
        rt.transfer_from(&req.caller, &asset, &req.owner, &req.to, req.amount)
    })
}

async fn balance_handler(
    Path((asset, account)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.runtime.balance_of(&asset, &account)?;
    Ok(Json(BalanceResponse {
        asset,
        account,
        balance,
    }))
}

async fn allowance_handler(
    Path((asset, owner, spender)): Path<(String, String, String)>,
    State(state): State<AppState>,
) -> Result<Json<AllowanceResponse>, ApiError> {
    let allowance = state.runtime.allowance(&asset, &owner, &spender)?;
    Ok(Json(AllowanceResponse {
        asset,
        owner,
        spender,
        allowance,
    }))
}

async fn add_grant_handler(
    State(state): State<AppState>,
    Json(req): Json<AddGrantRequest>,
) -> Result<Json<Receipt>, ApiError> {
    state.apply("add_grant", |rt| {
        rt.add_grant(
            &req.caller,
            &req.asset,
            &req.recipient,
            req.amount,
            req.unlock_time,
        )
    })
}

async fn grant_handler(
    Path(recipient): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<GrantResponse>, ApiError> {
    let grant = state.runtime.grant(&recipient).ok_or_else(|| {
        ApiError::from(RuntimeError::Vault(
            grantvault_contracts::VaultError::NoSuchGrant(recipient.clone()),
        ))
    })?;
    let unlocked = grant.is_unlocked(state.runtime.now());
    Ok(Json(GrantResponse {
        recipient,
        grant,
        unlocked,
    }))
}

async fn decrease_lock_time_handler(
    Path(recipient): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<DecreaseLockTimeRequest>,
) -> Result<Json<Receipt>, ApiError> {
    state.apply("decrease_lock_time", |rt| {
        rt.decrease_lock_time(&req.caller, &recipient, req.new_unlock_time)
    })
}

async fn remove_grant_handler(
    Path(recipient): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<RemoveGrantRequest>,
) -> Result<Json<Receipt>, ApiError> {
    state.apply("remove_grant", |rt| rt.remove_grant(&req.caller, &recipient))
}

async fn claim_grant_handler(
    State(state): State<AppState>,
    Json(req): Json<ClaimGrantRequest>,
) -> Result<Json<Receipt>, ApiError> {
    state.apply("claim_grant", |rt| rt.claim_grant(&req.caller, &req.grantor))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Streams committed events to one subscriber until it disconnects.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(log) => {
                        let payload = match serde_json::to_string(&log) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    // Push-only channel.
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
