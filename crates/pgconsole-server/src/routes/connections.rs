//! Connection RPCs.

use crate::error::RpcError;
use crate::state::{AppState, CurrentPrincipal};
use axum::{
    extract::Extension,
    routing::post,
    Json, Router,
};
use pgconsole_core::{ConnectionConfig, SslMode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

pub fn router() -> Router {
    Router::new()
        .route("/api/rpc/ConnectionService/ListConnections", post(list_connections))
        .route("/api/rpc/ConnectionService/GetConnection", post(get_connection))
        .route("/api/rpc/ConnectionService/TestConnection", post(test_connection))
}

/// The client-visible shape of a connection. Credentials never leave the
/// gateway.
#[derive(Debug, Serialize)]
struct ConnectionSummary {
    id: String,
    name: String,
    host: String,
    port: u16,
    database: String,
    username: String,
    ssl_mode: SslMode,
    labels: Vec<String>,
    lazy: bool,
}

impl From<&ConnectionConfig> for ConnectionSummary {
    fn from(conn: &ConnectionConfig) -> Self {
        Self {
            id: conn.id.clone(),
            name: conn.name.clone(),
            host: conn.host.clone(),
            port: conn.port,
            database: conn.database.clone(),
            username: conn.username.clone(),
            ssl_mode: conn.ssl_mode,
            labels: conn.labels.clone(),
            lazy: conn.lazy,
        }
    }
}

async fn list_connections(
    Extension(state): Extension<Arc<AppState>>,
    Extension(CurrentPrincipal(principal)): Extension<CurrentPrincipal>,
) -> Result<Json<serde_json::Value>, RpcError> {
    let principal = principal.ok_or_else(pgconsole_core::GatewayError::unauthenticated)?;
    let accessible = state.broker.iam().accessible_connections(&principal.email);

    let connections: Vec<ConnectionSummary> = state
        .policy
        .get_connections()
        .iter()
        .filter(|conn| accessible.contains(&conn.id))
        .map(ConnectionSummary::from)
        .collect();

    Ok(Json(json!({
        "connections": connections,
        "labels": state.policy.get_labels(),
    })))
}

#[derive(Debug, Deserialize)]
struct ConnectionRequest {
    connection_id: String,
}

async fn get_connection(
    Extension(state): Extension<Arc<AppState>>,
    Extension(CurrentPrincipal(principal)): Extension<CurrentPrincipal>,
    Json(req): Json<ConnectionRequest>,
) -> Result<Json<serde_json::Value>, RpcError> {
    let conn = state
        .broker
        .accessible_connection(principal.as_ref(), &req.connection_id)?;
    Ok(Json(json!({ "connection": ConnectionSummary::from(&conn) })))
}

async fn test_connection(
    Extension(state): Extension<Arc<AppState>>,
    Extension(CurrentPrincipal(principal)): Extension<CurrentPrincipal>,
    Json(req): Json<ConnectionRequest>,
) -> Result<Json<serde_json::Value>, RpcError> {
    let info = state
        .broker
        .test_connection(principal.as_ref(), &req.connection_id)
        .await?;
    Ok(Json(json!({
        "ok": true,
        "server_major_version": info.server_major_version,
    })))
}
