//! Backend listing and lifecycle statements.

use crate::client::PgClient;
use crate::error::AdapterError;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One row of `pg_stat_activity`, as shown to the console.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRow {
    pub pid: i32,
    pub user: Option<String>,
    pub application_name: Option<String>,
    pub client_addr: Option<String>,
    pub backend_start: Option<DateTime<Utc>>,
    pub state: Option<String>,
    pub query: Option<String>,
}

/// List backends on `database`, optionally restricted to one
/// `application_name` tag (a caller seeing only its own work).
pub async fn active_sessions(
    client: &PgClient,
    database: &str,
    application_name: Option<&str>,
) -> Result<Vec<SessionRow>, AdapterError> {
    let base = "SELECT pid, usename, application_name, client_addr::text, \
                backend_start, state, query \
                FROM pg_stat_activity WHERE datname = $1";

    let rows = match application_name {
        Some(tag) => {
            let sql = format!("{base} AND application_name = $2 ORDER BY backend_start");
            client.query(&sql, &[&database, &tag]).await?
        }
        None => {
            let sql = format!("{base} ORDER BY backend_start");
            client.query(&sql, &[&database]).await?
        }
    };

    Ok(rows
        .into_iter()
        .map(|row| SessionRow {
            pid: row.get(0),
            user: row.get(1),
            application_name: row.get(2),
            client_addr: row.get(3),
            backend_start: row.get(4),
            state: row.get(5),
            query: row.get(6),
        })
        .collect())
}

/// Ask the server to cancel the running statement on `pid`. Returns whether
/// the backend accepted the request.
pub async fn cancel_backend(client: &PgClient, pid: i32) -> Result<bool, AdapterError> {
    let row = client
        .query_one("SELECT pg_cancel_backend($1)", &[&pid])
        .await?;
    Ok(row.get(0))
}

/// Terminate the backend `pid` outright.
pub async fn terminate_backend(client: &PgClient, pid: i32) -> Result<bool, AdapterError> {
    let row = client
        .query_one("SELECT pg_terminate_backend($1)", &[&pid])
        .await?;
    Ok(row.get(0))
}
