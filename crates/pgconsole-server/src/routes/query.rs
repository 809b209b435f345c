//! Query RPCs: streaming execution, cancellation and export auditing.

use crate::error::RpcError;
use crate::state::{AppState, CurrentPrincipal};
use axum::{
    body::Body,
    extract::Extension,
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;

pub fn router() -> Router {
    Router::new()
        .route("/api/rpc/QueryService/ExecuteSQL", post(execute_sql))
        .route("/api/rpc/QueryService/CancelQuery", post(cancel_query))
        .route("/api/rpc/QueryService/AuditExport", post(audit_export))
}

#[derive(Debug, Deserialize)]
struct ExecuteSqlRequest {
    connection_id: String,
    sql: String,
    #[serde(default)]
    query_id: String,
    #[serde(default)]
    search_path: Option<String>,
}

/// Server-streaming execution: one JSON frame per line. The first frame
/// carries only the backend pid; authorization failures surface as plain
/// RPC errors before any frame is written.
async fn execute_sql(
    Extension(state): Extension<Arc<AppState>>,
    Extension(CurrentPrincipal(principal)): Extension<CurrentPrincipal>,
    Json(req): Json<ExecuteSqlRequest>,
) -> Result<Response, RpcError> {
    let frames = state
        .broker
        .execute_sql(
            principal.as_ref(),
            &req.connection_id,
            &req.sql,
            &req.query_id,
            req.search_path.as_deref(),
        )
        .await?;

    let lines = frames.map(|frame| {
        let mut line = serde_json::to_string(&frame).unwrap_or_else(|err| {
            json!({ "error": format!("cannot encode frame: {err}") }).to_string()
        });
        line.push('\n');
        Ok::<_, Infallible>(line)
    });

    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(lines),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct CancelQueryRequest {
    connection_id: String,
    query_id: String,
}

async fn cancel_query(
    Extension(state): Extension<Arc<AppState>>,
    Extension(CurrentPrincipal(principal)): Extension<CurrentPrincipal>,
    Json(req): Json<CancelQueryRequest>,
) -> Result<Json<serde_json::Value>, RpcError> {
    let result = state
        .broker
        .cancel_query(principal.as_ref(), &req.connection_id, &req.query_id)
        .await?;
    Ok(Json(serde_json::to_value(result).unwrap_or_default()))
}

#[derive(Debug, Deserialize)]
struct AuditExportRequest {
    connection_id: String,
}

async fn audit_export(
    Extension(state): Extension<Arc<AppState>>,
    Extension(CurrentPrincipal(principal)): Extension<CurrentPrincipal>,
    Json(req): Json<AuditExportRequest>,
) -> Result<Json<serde_json::Value>, RpcError> {
    state
        .broker
        .audit_export(principal.as_ref(), &req.connection_id)
        .await?;
    Ok(Json(json!({ "ok": true })))
}
