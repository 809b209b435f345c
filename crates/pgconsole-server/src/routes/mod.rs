//! HTTP routes.

pub mod auth;
pub mod connections;
pub mod query;
pub mod schema;
pub mod sessions;

use axum::Router;

/// The full API surface (auth + RPC).
pub fn router() -> Router {
    Router::new()
        .merge(auth::router())
        .merge(connections::router())
        .merge(query::router())
        .merge(schema::router())
        .merge(sessions::router())
}
