//! Adapter error type.

use pgconsole_core::GatewayError;

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The server could not be reached or refused the session.
    #[error("database connection failed: {0}")]
    Connect(tokio_postgres::Error),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("cannot read TLS material {path}: {source}")]
    TlsFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A query failed after the session was established.
    #[error("database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
}

impl From<AdapterError> for GatewayError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Connect(_) | AdapterError::Tls(_) | AdapterError::TlsFile { .. } => {
                GatewayError::unavailable(err.to_string())
            }
            AdapterError::Postgres(_) => GatewayError::internal(err.to_string()),
        }
    }
}
