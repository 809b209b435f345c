//! Request middleware.

use crate::state::{AppState, CurrentPrincipal};
use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Resolve the principal once per request and stash it in extensions.
pub async fn resolve_principal(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let state = req
        .extensions()
        .get::<Arc<AppState>>()
        .cloned()
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

    let principal = state.principal_for(req.headers());
    req.extensions_mut().insert(CurrentPrincipal(principal));

    Ok(next.run(req).await)
}
