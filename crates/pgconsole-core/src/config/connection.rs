//! Declared PostgreSQL endpoints.

use serde::{Deserialize, Serialize};

/// libpq-style SSL negotiation modes supported by the client factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    Prefer,
    Require,
    VerifyFull,
}

impl Default for SslMode {
    fn default() -> Self {
        SslMode::Prefer
    }
}

/// One configured connection. This is a named endpoint, not a live socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub id: String,
    pub name: String,
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub database: String,
    pub username: String,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub ssl_mode: SslMode,

    /// PEM file paths for verify-full / client-certificate setups.
    #[serde(default)]
    pub ssl_ca: Option<String>,
    #[serde(default)]
    pub ssl_cert: Option<String>,
    #[serde(default)]
    pub ssl_key: Option<String>,

    /// Label ids; each must exist in the labels section.
    #[serde(default)]
    pub labels: Vec<String>,

    /// Applied server-side at client construction, e.g. "3s" or "5000".
    #[serde(default)]
    pub lock_timeout: Option<String>,
    #[serde(default)]
    pub statement_timeout: Option<String>,

    /// Lazy connections are not probed at startup.
    #[serde(default)]
    pub lazy: bool,
}

fn default_port() -> u16 {
    5432
}
