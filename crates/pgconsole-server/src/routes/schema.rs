//! Schema introspection RPCs.
//!
//! Every method demands at least one permission on the connection; a
//! connection without grants answers exactly like a missing one.

use crate::error::RpcError;
use crate::state::{AppState, CurrentPrincipal};
use axum::{
    extract::Extension,
    routing::post,
    Json, Router,
};
use pgconsole_adapter_pg::introspect;
use pgconsole_auth::Principal;
use pgconsole_broker::QueryBroker;
use pgconsole_core::GatewayError;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub fn router() -> Router {
    Router::new()
        .route("/api/rpc/QueryService/GetSchemas", post(get_schemas))
        .route("/api/rpc/QueryService/GetTables", post(get_tables))
        .route("/api/rpc/QueryService/GetColumns", post(get_columns))
        .route("/api/rpc/QueryService/GetTableInfo", post(get_table_info))
        .route("/api/rpc/QueryService/GetIndexes", post(get_indexes))
        .route("/api/rpc/QueryService/GetConstraints", post(get_constraints))
        .route("/api/rpc/QueryService/GetTriggers", post(get_triggers))
        .route("/api/rpc/QueryService/GetPolicies", post(get_policies))
        .route("/api/rpc/QueryService/GetGrants", post(get_grants))
        .route(
            "/api/rpc/QueryService/GetMaterializedViews",
            post(get_materialized_views),
        )
        .route("/api/rpc/QueryService/GetFunctions", post(get_functions))
        .route("/api/rpc/QueryService/GetProcedures", post(get_procedures))
        .route("/api/rpc/QueryService/GetFunctionInfo", post(get_function_info))
        .route(
            "/api/rpc/QueryService/GetFunctionDependencies",
            post(get_function_dependencies),
        )
}

#[derive(Debug, Deserialize)]
struct ConnectionScope {
    connection_id: String,
}

#[derive(Debug, Deserialize)]
struct SchemaScope {
    connection_id: String,
    schema: String,
}

#[derive(Debug, Deserialize)]
struct TableScope {
    connection_id: String,
    schema: String,
    table: String,
}

#[derive(Debug, Deserialize)]
struct FunctionScope {
    connection_id: String,
    schema: String,
    name: String,
}

async fn client(
    broker: &QueryBroker,
    principal: &Option<Principal>,
    connection_id: &str,
) -> Result<pgconsole_adapter_pg::PgClient, GatewayError> {
    let principal = principal
        .as_ref()
        .ok_or_else(GatewayError::unauthenticated)?;
    let (_, client) = broker.client_for(principal, connection_id).await?;
    Ok(client)
}

fn db_err(err: pgconsole_adapter_pg::AdapterError) -> RpcError {
    RpcError(GatewayError::unavailable(err.to_string()))
}

async fn get_schemas(
    Extension(state): Extension<Arc<AppState>>,
    Extension(CurrentPrincipal(principal)): Extension<CurrentPrincipal>,
    Json(req): Json<ConnectionScope>,
) -> Result<Json<serde_json::Value>, RpcError> {
    let client = client(&state.broker, &principal, &req.connection_id).await?;
    let schemas = introspect::get_schemas(&client).await.map_err(db_err)?;
    Ok(Json(json!({ "schemas": schemas })))
}

async fn get_tables(
    Extension(state): Extension<Arc<AppState>>,
    Extension(CurrentPrincipal(principal)): Extension<CurrentPrincipal>,
    Json(req): Json<SchemaScope>,
) -> Result<Json<serde_json::Value>, RpcError> {
    let client = client(&state.broker, &principal, &req.connection_id).await?;
    let tables = introspect::get_tables(&client, &req.schema).await.map_err(db_err)?;
    Ok(Json(json!({ "tables": tables })))
}

async fn get_columns(
    Extension(state): Extension<Arc<AppState>>,
    Extension(CurrentPrincipal(principal)): Extension<CurrentPrincipal>,
    Json(req): Json<TableScope>,
) -> Result<Json<serde_json::Value>, RpcError> {
    let client = client(&state.broker, &principal, &req.connection_id).await?;
    let columns = introspect::get_columns(&client, &req.schema, &req.table)
        .await
        .map_err(db_err)?;
    Ok(Json(json!({ "columns": columns })))
}

async fn get_table_info(
    Extension(state): Extension<Arc<AppState>>,
    Extension(CurrentPrincipal(principal)): Extension<CurrentPrincipal>,
    Json(req): Json<TableScope>,
) -> Result<Json<serde_json::Value>, RpcError> {
    let client = client(&state.broker, &principal, &req.connection_id).await?;
    let info = introspect::get_table_info(&client, &req.schema, &req.table)
        .await
        .map_err(db_err)?
        .ok_or_else(|| GatewayError::not_found(format!("table '{}.{}'", req.schema, req.table)))?;
    Ok(Json(json!({ "table": info })))
}

async fn get_indexes(
    Extension(state): Extension<Arc<AppState>>,
    Extension(CurrentPrincipal(principal)): Extension<CurrentPrincipal>,
    Json(req): Json<TableScope>,
) -> Result<Json<serde_json::Value>, RpcError> {
    let client = client(&state.broker, &principal, &req.connection_id).await?;
    let indexes = introspect::get_indexes(&client, &req.schema, &req.table)
        .await
        .map_err(db_err)?;
    Ok(Json(json!({ "indexes": indexes })))
}

async fn get_constraints(
    Extension(state): Extension<Arc<AppState>>,
    Extension(CurrentPrincipal(principal)): Extension<CurrentPrincipal>,
    Json(req): Json<TableScope>,
) -> Result<Json<serde_json::Value>, RpcError> {
    let client = client(&state.broker, &principal, &req.connection_id).await?;
    let constraints = introspect::get_constraints(&client, &req.schema, &req.table)
        .await
        .map_err(db_err)?;
    Ok(Json(json!({ "constraints": constraints })))
}

async fn get_triggers(
    Extension(state): Extension<Arc<AppState>>,
    Extension(CurrentPrincipal(principal)): Extension<CurrentPrincipal>,
    Json(req): Json<TableScope>,
) -> Result<Json<serde_json::Value>, RpcError> {
    let client = client(&state.broker, &principal, &req.connection_id).await?;
    let triggers = introspect::get_triggers(&client, &req.schema, &req.table)
        .await
        .map_err(db_err)?;
    Ok(Json(json!({ "triggers": triggers })))
}

async fn get_policies(
    Extension(state): Extension<Arc<AppState>>,
    Extension(CurrentPrincipal(principal)): Extension<CurrentPrincipal>,
    Json(req): Json<TableScope>,
) -> Result<Json<serde_json::Value>, RpcError> {
    let client = client(&state.broker, &principal, &req.connection_id).await?;
    let policies = introspect::get_policies(&client, &req.schema, &req.table)
        .await
        .map_err(db_err)?;
    Ok(Json(json!({ "policies": policies })))
}

async fn get_grants(
    Extension(state): Extension<Arc<AppState>>,
    Extension(CurrentPrincipal(principal)): Extension<CurrentPrincipal>,
    Json(req): Json<TableScope>,
) -> Result<Json<serde_json::Value>, RpcError> {
    let client = client(&state.broker, &principal, &req.connection_id).await?;
    let grants = introspect::get_grants(&client, &req.schema, &req.table)
        .await
        .map_err(db_err)?;
    Ok(Json(json!({ "grants": grants })))
}

async fn get_materialized_views(
    Extension(state): Extension<Arc<AppState>>,
    Extension(CurrentPrincipal(principal)): Extension<CurrentPrincipal>,
    Json(req): Json<SchemaScope>,
) -> Result<Json<serde_json::Value>, RpcError> {
    let client = client(&state.broker, &principal, &req.connection_id).await?;
    let views = introspect::get_materialized_views(&client, &req.schema)
        .await
        .map_err(db_err)?;
    Ok(Json(json!({ "materialized_views": views })))
}

async fn get_functions(
    Extension(state): Extension<Arc<AppState>>,
    Extension(CurrentPrincipal(principal)): Extension<CurrentPrincipal>,
    Json(req): Json<SchemaScope>,
) -> Result<Json<serde_json::Value>, RpcError> {
    let client = client(&state.broker, &principal, &req.connection_id).await?;
    let functions = introspect::get_functions(&client, &req.schema)
        .await
        .map_err(db_err)?;
    Ok(Json(json!({ "functions": functions })))
}

async fn get_procedures(
    Extension(state): Extension<Arc<AppState>>,
    Extension(CurrentPrincipal(principal)): Extension<CurrentPrincipal>,
    Json(req): Json<SchemaScope>,
) -> Result<Json<serde_json::Value>, RpcError> {
    let client = client(&state.broker, &principal, &req.connection_id).await?;
    let procedures = introspect::get_procedures(&client, &req.schema)
        .await
        .map_err(db_err)?;
    Ok(Json(json!({ "procedures": procedures })))
}

async fn get_function_info(
    Extension(state): Extension<Arc<AppState>>,
    Extension(CurrentPrincipal(principal)): Extension<CurrentPrincipal>,
    Json(req): Json<FunctionScope>,
) -> Result<Json<serde_json::Value>, RpcError> {
    let client = client(&state.broker, &principal, &req.connection_id).await?;
    let overloads = introspect::get_function_info(&client, &req.schema, &req.name)
        .await
        .map_err(db_err)?;
    if overloads.is_empty() {
        return Err(RpcError(GatewayError::not_found(format!(
            "function '{}.{}'",
            req.schema, req.name
        ))));
    }
    Ok(Json(json!({ "functions": overloads })))
}

async fn get_function_dependencies(
    Extension(state): Extension<Arc<AppState>>,
    Extension(CurrentPrincipal(principal)): Extension<CurrentPrincipal>,
    Json(req): Json<FunctionScope>,
) -> Result<Json<serde_json::Value>, RpcError> {
    let client = client(&state.broker, &principal, &req.connection_id).await?;
    let dependencies =
        introspect::get_function_dependencies(&client, &req.schema, &req.name)
            .await
            .map_err(db_err)?;
    Ok(Json(json!({ "dependencies": dependencies })))
}
