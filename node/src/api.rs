//! # REST API
//!
//! Builds the axum router that exposes the relay node's HTTP interface.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                     | Description                              |
//! |--------|--------------------------|------------------------------------------|
//! | GET    | `/health`                | Liveness probe                           |
//! | GET    | `/status`                | Node and ledger summary                  |
//! | GET    | `/accounts/:id`          | Internal balance and last nonce          |
//! | GET    | `/tokens/:id`            | Credential token by id                   |
//! | GET    | `/events`                | Journal page (`?since=&limit=`)          |
//! | POST   | `/relay/deposit`         | Relay a signed deposit                   |
//! | POST   | `/relay/withdraw`        | Relay a signed withdrawal                |
//! | POST   | `/relay/payment`         | Relay a signed payment                   |
//! | POST   | `/relay/nft-mint`        | Relay a provider-signed credential mint  |
//! | POST   | `/relay/nft-transfer`    | Relay a signed credential transfer       |
//!
//! Relay bodies are `{"signer": "0x..", "payload": "0x..", "signature": "0x.."}`.
//! The node is the caller: it presents its own proof of work and earns the
//! engine fee. Refusals come back as 4xx with `{"error": .., "kind": ..}`,
//! where `kind` is the ledger's stable error name.

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use cashier_contracts::{CredentialError, LedgerError, Operation, TokenId};
use cashier_protocol::types::AccountId;

use crate::service::{LedgerSummary, RelayService, ServiceError};
use crate::store::JournalEntry;

/// Largest page `/events` returns, whatever `limit` asks for.
pub const MAX_EVENTS_PAGE: usize = 500;

const DEFAULT_EVENTS_PAGE: usize = 100;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone: everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    pub service: Arc<RelayService>,
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
        .route("/accounts/:id", get(account_handler))
        .route("/tokens/:id", get(token_handler))
        .route("/events", get(events_handler))
        .route("/relay/deposit", post(deposit_handler))
        .route("/relay/withdraw", post(withdraw_handler))
        .route("/relay/payment", post(payment_handler))
        .route("/relay/nft-mint", post(nft_mint_handler))
        .route("/relay/nft-transfer", post(nft_transfer_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Body of every `POST /relay/*` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayRequest {
    /// Account the payload claims to be signed by.
    pub signer: AccountId,
    /// Hex-encoded payload, `0x` prefix optional.
    pub payload: String,
    /// Hex-encoded 65-byte signature, `0x` prefix optional.
    pub signature: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RelayResponse {
    pub operation: Operation,
    pub relay: AccountId,
    pub events: Vec<JournalEntry>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub ledger: LedgerSummary,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    pub since: Option<u64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Everything a handler can fail with, already shaped as an HTTP answer.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "bad_request",
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            kind: "not_found",
            message: message.into(),
        }
    }
}

/// HTTP status for a ledger refusal.
fn rejection_status(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::InvalidSignature { .. } | LedgerError::MalformedSignature(_) => {
            StatusCode::UNAUTHORIZED
        }
        LedgerError::Unauthorized { .. }
        | LedgerError::Credential(CredentialError::Unauthorized { .. })
        | LedgerError::Credential(CredentialError::NotOwner { .. }) => StatusCode::FORBIDDEN,
        LedgerError::Credential(CredentialError::UnknownToken(_)) => StatusCode::NOT_FOUND,
        LedgerError::InvalidNonce { .. } | LedgerError::AlreadyConsumed(_) => StatusCode::CONFLICT,
        LedgerError::InsufficientBalance { .. }
        | LedgerError::FeesExceedAmount { .. }
        | LedgerError::ArithmeticOverflow
        | LedgerError::Expired { .. }
        | LedgerError::Asset(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::CollaboratorNotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_REQUEST,
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Rejected(e) => Self {
                status: rejection_status(&e),
                kind: e.kind(),
                message: e.to_string(),
            },
            ServiceError::Work(e) => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                kind: "relay_work",
                message: e.to_string(),
            },
            ServiceError::Store(e) => {
                tracing::error!("storage failure: {}", e);
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    kind: "storage",
                    message: "storage failure".into(),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.message,
            kind: self.kind.to_string(),
        };
        (self.status, Json(body)).into_response()
    }
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, ApiError> {
    let trimmed = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    hex::decode(trimmed).map_err(|e| ApiError::bad_request(format!("{field} is not hex: {e}")))
}

fn parse_account(id: &str) -> Result<AccountId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::bad_request(format!("invalid account id {id:?}: {e}")))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 if the node is alive.
///
/// This is the liveness probe for orchestrators (k8s, systemd, etc.).
/// It intentionally does not touch the ledger. That belongs in `/status`.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: ledger wiring, fee configuration and journal position.
async fn status_handler(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    Ok(Json(StatusResponse {
        version: state.version.clone(),
        ledger: state.service.summary()?,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}

/// `GET /accounts/:id`: balance and last nonce. Unknown accounts read as zero.
async fn account_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let account = parse_account(&id)?;
    Ok(Json(state.service.account(&account)))
}

/// `GET /tokens/:id`: one credential token, or 404.
async fn token_handler(
    Path(id): Path<TokenId>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .service
        .token(id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("unknown token {id}")))
}

/// `GET /events?since=&limit=`: journal entries from `since`, oldest first.
async fn events_handler(
    Query(query): Query<EventsQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<JournalEntry>>, ApiError> {
    let since = query.since.unwrap_or(0);
    let limit = query
        .limit
        .unwrap_or(DEFAULT_EVENTS_PAGE)
        .min(MAX_EVENTS_PAGE);
    Ok(Json(state.service.events(since, limit)?))
}

async fn deposit_handler(
    State(state): State<AppState>,
    Json(req): Json<RelayRequest>,
) -> Result<Json<RelayResponse>, ApiError> {
    relay(state, Operation::Deposit, req).await
}

async fn withdraw_handler(
    State(state): State<AppState>,
    Json(req): Json<RelayRequest>,
) -> Result<Json<RelayResponse>, ApiError> {
    relay(state, Operation::Withdraw, req).await
}

async fn payment_handler(
    State(state): State<AppState>,
    Json(req): Json<RelayRequest>,
) -> Result<Json<RelayResponse>, ApiError> {
    relay(state, Operation::Payment, req).await
}

async fn nft_mint_handler(
    State(state): State<AppState>,
    Json(req): Json<RelayRequest>,
) -> Result<Json<RelayResponse>, ApiError> {
    relay(state, Operation::NftMint, req).await
}

async fn nft_transfer_handler(
    State(state): State<AppState>,
    Json(req): Json<RelayRequest>,
) -> Result<Json<RelayResponse>, ApiError> {
    relay(state, Operation::NftTransfer, req).await
}

/// Decode the body and hand it to the service off the async runtime:
/// a submission may grind proof of work and always flushes to disk.
async fn relay(
    state: AppState,
    operation: Operation,
    req: RelayRequest,
) -> Result<Json<RelayResponse>, ApiError> {
    let payload = decode_hex("payload", &req.payload)?;
    let signature = decode_hex("signature", &req.signature)?;
    let signer = req.signer;

    let service = Arc::clone(&state.service);
    let events = tokio::task::spawn_blocking(move || {
        service.submit(operation, &signer, &payload, &signature)
    })
    .await
    .map_err(|e| {
        tracing::error!("relay task failed: {}", e);
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "internal",
            message: "relay task failed".into(),
        }
    })??;

    Ok(Json(RelayResponse {
        operation,
        relay: state.service.relay_account(),
        events,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
