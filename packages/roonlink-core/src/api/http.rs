//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to services for business logic.

use axum::{
    body::Bytes,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::response::{api_ok, api_success};
use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::device::DeviceId;
use crate::error::{RoonlinkError, RoonlinkResult};
use crate::host::HostError;
use crate::protocol_constants::SERVICE_ID;
use crate::services::DeviceCommand;
use crate::transport::ChangeNotifier;

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ZoneChangeRequest {
    zone_ids: Vec<String>,
}

#[derive(Deserialize)]
struct TokenRequest {
    token: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/devices", get(list_devices))
        .route("/api/devices/{id}", get(get_device))
        .route("/api/devices/{id}/{command}", post(device_command))
        .route("/api/states", get(list_states))
        .route("/api/states/{entity_id}", get(get_state))
        .route("/api/services/{domain}/{service}", post(call_service))
        .route("/api/transport/changes", post(transport_changes))
        .route("/api/transport/token", post(transport_token))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Parses an optional JSON body; an empty body is an empty object.
fn parse_body(body: &Bytes) -> RoonlinkResult<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }
    serde_json::from_slice(body)
        .map_err(|e| RoonlinkError::InvalidRequest(format!("invalid JSON body: {}", e)))
}

fn device_id(raw: &str) -> RoonlinkResult<DeviceId> {
    DeviceId::parse(raw).ok_or_else(|| RoonlinkError::DeviceNotFound(raw.to_string()))
}

fn require_notifier(state: &AppState) -> RoonlinkResult<&ChangeNotifier> {
    state.notifier.as_ref().ok_or_else(|| {
        RoonlinkError::Configuration("push transport is not enabled (transport: push)".into())
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "engineRunning": state.engine.is_running(),
        "devices": state.registry.len(),
        "wsConnections": state.ws_manager.connection_count(),
    }))
}

async fn list_devices(State(state): State<AppState>) -> impl IntoResponse {
    let zones = state.roon.zones.as_ref();
    let devices: Vec<_> = state
        .registry
        .ids()
        .iter()
        .filter_map(|id| state.registry.describe(id, zones))
        .collect();
    api_success(json!({ "devices": devices }))
}

async fn get_device(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> RoonlinkResult<impl IntoResponse> {
    let id = device_id(&id)?;
    let summary = state
        .registry
        .describe(&id, state.roon.zones.as_ref())
        .ok_or_else(|| RoonlinkError::DeviceNotFound(id.to_string()))?;
    Ok(api_success(summary))
}

/// POST /api/devices/{id}/{command}
///
/// `command` is a `media_player` service name; the body carries its data.
async fn device_command(
    Path((id, command)): Path<(String, String)>,
    State(state): State<AppState>,
    body: Bytes,
) -> RoonlinkResult<impl IntoResponse> {
    let id = device_id(&id)?;
    let data = parse_body(&body)?;
    let command = DeviceCommand::parse(&command, &data)?;
    let outcome = state.commands.execute(&id, command).await?;
    Ok(api_success(outcome))
}

async fn list_states(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({ "states": state.host.entity_states() }))
}

async fn get_state(
    Path(entity_id): Path<String>,
    State(state): State<AppState>,
) -> RoonlinkResult<impl IntoResponse> {
    let entity = state
        .host
        .entity_state(&entity_id)
        .ok_or(HostError::EntityNotFound(entity_id))?;
    Ok(api_success(entity))
}

async fn call_service(
    Path((domain, service)): Path<(String, String)>,
    State(state): State<AppState>,
    body: Bytes,
) -> RoonlinkResult<impl IntoResponse> {
    let data = parse_body(&body)?;
    state.host.call_service(&domain, &service, data).await?;
    Ok(api_ok())
}

/// POST /api/transport/changes
///
/// Webhook for the external Roon extension. A dropped notification is not
/// an error; the next periodic pass catches up.
async fn transport_changes(
    State(state): State<AppState>,
    Json(payload): Json<ZoneChangeRequest>,
) -> RoonlinkResult<impl IntoResponse> {
    let notifier = require_notifier(&state)?;
    let accepted = notifier.zones_changed(payload.zone_ids);
    Ok(api_success(json!({ "accepted": accepted })))
}

async fn transport_token(
    State(state): State<AppState>,
    Json(payload): Json<TokenRequest>,
) -> RoonlinkResult<impl IntoResponse> {
    let token = payload.token.trim();
    if token.is_empty() {
        return Err(RoonlinkError::InvalidRequest("token must not be empty".into()));
    }
    require_notifier(&state)?.set_token(token.to_string());
    log::info!("[API] Transport token updated");
    Ok(api_ok())
}
