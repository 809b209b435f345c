//! Session admission RPCs.

use crate::error::RpcError;
use crate::state::{AppState, CurrentPrincipal};
use axum::{
    extract::Extension,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub fn router() -> Router {
    Router::new()
        .route("/api/rpc/QueryService/GetActiveSessions", post(get_active_sessions))
        .route("/api/rpc/QueryService/TerminateSession", post(terminate_session))
}

#[derive(Debug, Deserialize)]
struct ActiveSessionsRequest {
    connection_id: String,
}

async fn get_active_sessions(
    Extension(state): Extension<Arc<AppState>>,
    Extension(CurrentPrincipal(principal)): Extension<CurrentPrincipal>,
    Json(req): Json<ActiveSessionsRequest>,
) -> Result<Json<serde_json::Value>, RpcError> {
    let sessions = state
        .broker
        .active_sessions(principal.as_ref(), &req.connection_id)
        .await?;
    Ok(Json(json!({ "sessions": sessions })))
}

#[derive(Debug, Deserialize)]
struct TerminateSessionRequest {
    connection_id: String,
    pid: i32,
}

async fn terminate_session(
    Extension(state): Extension<Arc<AppState>>,
    Extension(CurrentPrincipal(principal)): Extension<CurrentPrincipal>,
    Json(req): Json<TerminateSessionRequest>,
) -> Result<Json<serde_json::Value>, RpcError> {
    let terminated = state
        .broker
        .terminate_session(principal.as_ref(), &req.connection_id, req.pid)
        .await?;
    Ok(Json(json!({ "terminated": terminated })))
}
