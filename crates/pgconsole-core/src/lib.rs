//! Core types for the pgconsole gateway.
//!
//! This crate holds everything the other crates agree on: the policy file
//! model (loaded once at startup, immutable afterwards), the closed
//! permission enum, the plan/feature gate derived from license validation,
//! and the gateway-wide error taxonomy.

pub mod config;
pub mod error;
pub mod license;
pub mod permission;

pub use config::{
    AuthConfig, ConfigError, ConnectionConfig, ConnectionSelector, GroupConfig, IamRule,
    LabelConfig, Policy, ProviderConfig, ProviderType, RuleMember, SslMode, UserConfig,
};
pub use error::{ErrorCode, GatewayError};
pub use license::{Feature, LicenseError, LicenseValidator, Plan, PlanTier};
pub use permission::{Permission, PermissionSet};
