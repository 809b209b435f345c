//! Client construction.
//!
//! Every request gets its own short-lived client: the acting user's email is
//! carried in `application_name` so database-side views can attribute work,
//! and the connection's lock/statement timeouts are applied as server-side
//! settings right after connect. Dropping the client aborts the connection
//! driver task, which closes the socket.

use crate::error::AdapterError;
use crate::quote::quote_literal;
use native_tls::{Certificate, Identity, TlsConnector};
use pgconsole_core::{ConnectionConfig, SslMode};
use postgres_native_tls::MakeTlsConnector;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_postgres::tls::MakeTlsConnect;
use tokio_postgres::{NoTls, Socket};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Concurrent client cap per configured connection.
const MAX_CLIENTS_PER_CONNECTION: usize = 32;

/// The `application_name` value identifying a user's clients.
pub fn application_name_tag(email: &str) -> String {
    format!("pgconsole:{email}")
}

/// A live client plus the task driving its socket.
pub struct PgClient {
    client: tokio_postgres::Client,
    driver: JoinHandle<()>,
    _permit: Option<tokio::sync::OwnedSemaphorePermit>,
}

impl PgClient {
    /// The backend process serving this client.
    pub async fn backend_pid(&self) -> Result<i32, AdapterError> {
        let row = self.client.query_one("SELECT pg_backend_pid()", &[]).await?;
        Ok(row.get(0))
    }
}

impl Deref for PgClient {
    type Target = tokio_postgres::Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

impl Drop for PgClient {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Manufactures clients for configured connections.
pub struct ClientFactory {
    limits: RwLock<HashMap<String, Arc<Semaphore>>>,
}

impl ClientFactory {
    pub fn new() -> Self {
        Self {
            limits: RwLock::new(HashMap::new()),
        }
    }

    /// Open a client for `conn`, tagged with `email`.
    pub async fn connect(
        &self,
        conn: &ConnectionConfig,
        email: &str,
    ) -> Result<PgClient, AdapterError> {
        let permit = self
            .limit_for(&conn.id)
            .await
            .acquire_owned()
            .await
            .ok();

        let mut config = tokio_postgres::Config::new();
        config
            .host(&conn.host)
            .port(conn.port)
            .dbname(&conn.database)
            .user(&conn.username)
            .application_name(&application_name_tag(email))
            .connect_timeout(CONNECT_TIMEOUT);
        if let Some(password) = &conn.password {
            config.password(password);
        }

        let mut client = match conn.ssl_mode {
            SslMode::Disable => {
                config.ssl_mode(tokio_postgres::config::SslMode::Disable);
                spawn_connected(&config, NoTls).await?
            }
            SslMode::Prefer => {
                config.ssl_mode(tokio_postgres::config::SslMode::Prefer);
                spawn_connected(&config, tls_connector(conn, false)?).await?
            }
            SslMode::Require => {
                config.ssl_mode(tokio_postgres::config::SslMode::Require);
                spawn_connected(&config, tls_connector(conn, false)?).await?
            }
            SslMode::VerifyFull => {
                config.ssl_mode(tokio_postgres::config::SslMode::Require);
                spawn_connected(&config, tls_connector(conn, true)?).await?
            }
        };
        client._permit = permit;

        apply_session_settings(&client, conn).await?;
        Ok(client)
    }

    async fn limit_for(&self, connection_id: &str) -> Arc<Semaphore> {
        if let Some(limit) = self.limits.read().await.get(connection_id) {
            return limit.clone();
        }
        let mut limits = self.limits.write().await;
        limits
            .entry(connection_id.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(MAX_CLIENTS_PER_CONNECTION)))
            .clone()
    }
}

impl Default for ClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

async fn spawn_connected<T>(
    config: &tokio_postgres::Config,
    tls: T,
) -> Result<PgClient, AdapterError>
where
    T: MakeTlsConnect<Socket>,
    T::Stream: Send + 'static,
{
    let (client, connection) = config.connect(tls).await.map_err(AdapterError::Connect)?;
    let driver = tokio::spawn(async move {
        if let Err(err) = connection.await {
            tracing::debug!(%err, "connection driver terminated");
        }
    });
    Ok(PgClient {
        client,
        driver,
        _permit: None,
    })
}

/// Build the TLS connector for a connection.
///
/// `verify` enables full certificate and hostname verification; without it
/// the session is encrypted but unauthenticated, matching libpq's `require`.
fn tls_connector(conn: &ConnectionConfig, verify: bool) -> Result<MakeTlsConnector, AdapterError> {
    let mut builder = TlsConnector::builder();

    if !verify {
        builder
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true);
    }

    if let Some(ca_path) = &conn.ssl_ca {
        let pem = std::fs::read(ca_path).map_err(|source| AdapterError::TlsFile {
            path: ca_path.clone(),
            source,
        })?;
        builder.add_root_certificate(Certificate::from_pem(&pem)?);
    }

    if let (Some(cert_path), Some(key_path)) = (&conn.ssl_cert, &conn.ssl_key) {
        let cert = std::fs::read(cert_path).map_err(|source| AdapterError::TlsFile {
            path: cert_path.clone(),
            source,
        })?;
        let key = std::fs::read(key_path).map_err(|source| AdapterError::TlsFile {
            path: key_path.clone(),
            source,
        })?;
        builder.identity(Identity::from_pkcs8(&cert, &key)?);
    }

    Ok(MakeTlsConnector::new(builder.build()?))
}

/// Apply the connection's lock/statement timeouts server-side.
async fn apply_session_settings(
    client: &PgClient,
    conn: &ConnectionConfig,
) -> Result<(), AdapterError> {
    let mut settings = Vec::new();
    if let Some(timeout) = &conn.statement_timeout {
        settings.push(format!("SET statement_timeout = {}", quote_literal(timeout)));
    }
    if let Some(timeout) = &conn.lock_timeout {
        settings.push(format!("SET lock_timeout = {}", quote_literal(timeout)));
    }
    if settings.is_empty() {
        return Ok(());
    }
    client.batch_execute(&settings.join("; ")).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_name_carries_the_email() {
        assert_eq!(
            application_name_tag("alice@example.com"),
            "pgconsole:alice@example.com"
        );
    }
}
