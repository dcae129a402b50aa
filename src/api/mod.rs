//! HTTP surface for the ticketing service.
//!
//! Thin handlers over [`AppStore`]: gating rejections map to 403 with the
//! triggered flags, signer-required writes to 501, lookups that miss to 404.

use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header::CACHE_CONTROL};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::chain::ChainError;
use crate::core::{CreateEventRequest, Event, Ticket, TransferAnalysis};
use crate::db::{FraudAlertRecord, SharedDatabase};
use crate::fraud::{FraudStatistics, SharedFraudEngine};
use crate::metadata::{TicketPass, TicketVerifier, VerificationOutcome};
use crate::service::{CreatedEvent, ServiceError};
use crate::store::AppStore;
use crate::watchlist::{ListKind, ListedAddress};

#[derive(Clone)]
pub struct AppState {
    pub store: AppStore,
    pub engine: SharedFraudEngine,
    pub db: SharedDatabase,
    /// Scan history for QR verification, shared across requests.
    pub verifier: Arc<Mutex<TicketVerifier>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventCreateBody {
    organizer: String,
    #[serde(flatten)]
    request: CreateEventRequest,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TicketPurchaseBody {
    buyer: String,
    event_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferBody {
    from: String,
    to: String,
    token_id: u64,
    /// Sale price as a decimal AVAX string; missing or unparseable counts as 0.
    #[serde(default)]
    price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyBody {
    pass: TicketPass,
    gate_event_id: u64,
}

#[derive(Debug, Deserialize)]
struct AlertsQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct WatchlistBody {
    address: String,
    #[serde(default)]
    reason: Option<String>,
}

fn error_response(err: ServiceError) -> Response {
    let (status, flags) = match &err {
        ServiceError::EventRejected { flags, .. }
        | ServiceError::EventHighRisk { flags, .. }
        | ServiceError::TransferBlocked { flags, .. } => {
            (StatusCode::FORBIDDEN, Some(flags.clone()))
        }
        ServiceError::Chain(ChainError::SignerRequired(_)) => (StatusCode::NOT_IMPLEMENTED, None),
        ServiceError::Chain(ChainError::EventNotFound(_) | ChainError::TicketNotFound(_)) => {
            (StatusCode::NOT_FOUND, None)
        }
        ServiceError::Chain(ChainError::InvalidEventId) => (StatusCode::BAD_REQUEST, None),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, None),
    };

    let mut body = json!({ "error": err.to_string() });
    if let Some(flags) = flags {
        body["flags"] = json!(flags);
    }
    (status, Json(body)).into_response()
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_events(State(state): State<AppState>) -> Json<Vec<Event>> {
    Json(state.store.load_events().await)
}

async fn event_detail(
    State(state): State<AppState>,
    Path(event_id): Path<u64>,
) -> Result<Json<Event>, Response> {
    match state.store.service().get_event(event_id).await {
        Ok(event) => Ok(Json(event)),
        // Serve the cached copy when the chain read fails.
        Err(err) => match state.store.event_by_id(event_id) {
            Some(event) => Ok(Json(event)),
            None => Err(error_response(err)),
        },
    }
}

async fn create_event(
    State(state): State<AppState>,
    Json(body): Json<EventCreateBody>,
) -> Result<Json<CreatedEvent>, Response> {
    let created = state
        .store
        .create_event(&body.organizer, &body.request)
        .await
        .map_err(error_response)?;
    Ok(Json(created))
}

async fn buy_ticket(
    State(state): State<AppState>,
    Json(body): Json<TicketPurchaseBody>,
) -> Result<Json<Value>, Response> {
    let token_id = state
        .store
        .buy_ticket(&body.buyer, body.event_id)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "tokenId": token_id })))
}

async fn user_tickets(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Json<Vec<Ticket>> {
    Json(state.store.load_user_tickets(&owner).await)
}

async fn use_ticket(
    State(state): State<AppState>,
    Path(token_id): Path<u64>,
) -> Result<Json<Value>, Response> {
    state
        .store
        .use_ticket(token_id)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "tokenId": token_id, "isUsed": true })))
}

async fn transfer_ticket(
    State(state): State<AppState>,
    Json(body): Json<TransferBody>,
) -> Result<Json<TransferAnalysis>, Response> {
    let analysis = state
        .store
        .transfer_ticket(&body.from, &body.to, body.token_id, &body.price)
        .await
        .map_err(error_response)?;
    Ok(Json(analysis))
}

async fn token_metadata(
    State(state): State<AppState>,
    Path(token_id): Path<u64>,
) -> Result<Response, Response> {
    let (document, stored) = state
        .store
        .service()
        .ticket_metadata(token_id)
        .map_err(error_response)?;
    let cache = if stored {
        "public, max-age=31536000, immutable"
    } else {
        "public, max-age=3600"
    };
    Ok(([(CACHE_CONTROL, cache)], Json(document)).into_response())
}

async fn verify_ticket(
    State(state): State<AppState>,
    Json(body): Json<VerifyBody>,
) -> Json<VerificationOutcome> {
    let outcome = state
        .verifier
        .lock()
        .unwrap()
        .verify(&body.pass, body.gate_event_id);
    Json(outcome)
}

async fn fraud_statistics(State(state): State<AppState>) -> Json<FraudStatistics> {
    Json(state.engine.statistics())
}

async fn fraud_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertsQuery>,
) -> Result<Json<Vec<FraudAlertRecord>>, Response> {
    let alerts = state
        .db
        .recent_alerts(query.limit.unwrap_or(50))
        .map_err(|err| error_response(err.into()))?;
    Ok(Json(alerts))
}

async fn add_blacklist(
    State(state): State<AppState>,
    Json(body): Json<WatchlistBody>,
) -> Result<Json<ListedAddress>, Response> {
    let entry = ListedAddress::new(&body.address, ListKind::Blocked, body.reason);
    state.engine.add_to_blacklist(&entry.address);
    state
        .db
        .upsert_watchlist(&entry)
        .map_err(|err| error_response(err.into()))?;
    info!(address = %entry.address, "address blacklisted");
    Ok(Json(entry))
}

async fn remove_blacklist(
    State(state): State<AppState>,
    Json(body): Json<WatchlistBody>,
) -> Result<Json<Value>, Response> {
    let address = body.address.to_lowercase();
    state.engine.remove_from_blacklist(&address);
    let removed = state
        .db
        .remove_watchlist(&address)
        .map_err(|err| error_response(err.into()))?;
    Ok(Json(json!({ "address": address, "removed": removed })))
}

async fn add_whitelist(
    State(state): State<AppState>,
    Json(body): Json<WatchlistBody>,
) -> Result<Json<ListedAddress>, Response> {
    let entry = ListedAddress::new(&body.address, ListKind::Trusted, body.reason);
    state.engine.add_to_whitelist(&entry.address);
    state
        .db
        .upsert_watchlist(&entry)
        .map_err(|err| error_response(err.into()))?;
    info!(address = %entry.address, "address whitelisted");
    Ok(Json(entry))
}

async fn remove_whitelist(
    State(state): State<AppState>,
    Json(body): Json<WatchlistBody>,
) -> Result<Json<Value>, Response> {
    let address = body.address.to_lowercase();
    state.engine.remove_from_whitelist(&address);
    let removed = state
        .db
        .remove_watchlist(&address)
        .map_err(|err| error_response(err.into()))?;
    Ok(Json(json!({ "address": address, "removed": removed })))
}

async fn check_address(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Json<Value> {
    let address = address.to_lowercase();
    Json(json!({
        "address": address,
        "blacklisted": state.engine.is_blacklisted(&address),
        "whitelisted": state.engine.is_whitelisted(&address),
    }))
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/events", get(list_events).post(create_event))
        .route("/api/events/{id}", get(event_detail))
        .route("/api/tickets", post(buy_ticket))
        .route("/api/tickets/{id}", get(user_tickets))
        .route("/api/tickets/{id}/use", post(use_ticket))
        .route("/api/transfers", post(transfer_ticket))
        .route("/api/metadata/{id}", get(token_metadata))
        .route("/api/verify", post(verify_ticket))
        .route("/api/fraud/statistics", get(fraud_statistics))
        .route("/api/fraud/alerts", get(fraud_alerts))
        .route(
            "/api/fraud/blacklist",
            post(add_blacklist).delete(remove_blacklist),
        )
        .route(
            "/api/fraud/whitelist",
            post(add_whitelist).delete(remove_whitelist),
        )
        .route("/api/fraud/check/{address}", get(check_address))
        .layer(cors)
        .with_state(state)
}

pub async fn serve(state: AppState, bind: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %bind, "api listening");
    axum::serve(listener, build_router(state)).await
}
