//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to the session registry.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::response::{api_ok, api_success};
use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::error::TandemResult;
use crate::identity::{resolve, to_legacy_stream_fields, TrackReference};
use crate::protocol_constants::{LEGACY_FIELDS_CONTRACT_VERSION, SERVICE_ID};
use crate::session::CommandRequest;

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemberRequest {
    member_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotQuery {
    #[serde(default)]
    member_id: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/sessions", get(list_sessions).post(create_session))
        .route("/api/sessions/count", get(count_sessions))
        .route("/api/sessions/{group_id}/join", post(join_session))
        .route("/api/sessions/{group_id}/leave", post(leave_session))
        .route("/api/sessions/{group_id}/heartbeat", post(heartbeat))
        .route("/api/sessions/{group_id}/snapshot", get(get_snapshot))
        .route("/api/sessions/{group_id}/commands", post(submit_command))
        .route("/api/resolve", post(resolve_track))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe; clients check `service` to recognise an authority.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let allow_member_control = state.config.read().session.allow_member_control;
    api_success(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "sessions": state.registry.count(),
        "connections": state.ws_manager.connection_count(),
        "allowMemberControl": allow_member_control,
    }))
}

/// Discovery: number of active sessions.
async fn count_sessions(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({ "count": state.registry.count() }))
}

async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    api_success(state.registry.list())
}

async fn create_session(
    State(state): State<AppState>,
    Json(payload): Json<MemberRequest>,
) -> TandemResult<impl IntoResponse> {
    let snapshot = state.registry.create(&payload.member_id)?;
    Ok(api_success(snapshot))
}

async fn join_session(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Json(payload): Json<MemberRequest>,
) -> TandemResult<impl IntoResponse> {
    let snapshot = state.registry.join(&group_id, &payload.member_id)?;
    Ok(api_success(snapshot))
}

async fn leave_session(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Json(payload): Json<MemberRequest>,
) -> TandemResult<impl IntoResponse> {
    state.registry.leave(&group_id, &payload.member_id)?;
    Ok(api_success(json!({ "left": true })))
}

async fn heartbeat(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Json(payload): Json<MemberRequest>,
) -> TandemResult<impl IntoResponse> {
    state.registry.heartbeat(&group_id, &payload.member_id)?;
    Ok(api_ok())
}

/// Pull. With `memberId`, also refreshes that member's liveness.
async fn get_snapshot(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Query(query): Query<SnapshotQuery>,
) -> TandemResult<impl IntoResponse> {
    let snapshot = state
        .registry
        .snapshot(&group_id, query.member_id.as_deref())?;
    Ok(api_success(snapshot))
}

async fn submit_command(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Json(request): Json<CommandRequest>,
) -> TandemResult<impl IntoResponse> {
    let snapshot = state.registry.apply_command(&group_id, &request)?;
    Ok(api_success(snapshot))
}

/// Resolves any track reference to its canonical identity and legacy fields.
async fn resolve_track(Json(reference): Json<TrackReference>) -> impl IntoResponse {
    let identity = resolve(&reference);
    let legacy = to_legacy_stream_fields(&identity);
    api_success(json!({
        "identity": identity,
        "legacy": legacy,
        "contractVersion": LEGACY_FIELDS_CONTRACT_VERSION,
    }))
}
