//! PostgreSQL access for pgconsole.
//!
//! This crate manufactures the short-lived, per-request database clients the
//! broker runs queries on (tagged with the acting user's email in
//! `application_name`), probes server versions into a process-wide cache,
//! and hosts every catalog query behind the schema RPCs.

pub mod client;
pub mod error;
pub mod info;
pub mod introspect;
pub mod quote;
pub mod sessions;

pub use client::{application_name_tag, ClientFactory, PgClient};
pub use error::AdapterError;
pub use info::{ConnectionInfo, ConnectionInfoCache};
pub use quote::{quote_ident, quote_literal};
