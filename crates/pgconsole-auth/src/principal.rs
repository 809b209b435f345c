//! The authenticated identity attached to a request.

use pgconsole_core::ProviderType;
use serde::Serialize;

/// The identity a request acts as.
///
/// Materialized per request from the session cookie, or the guest sentinel
/// when auth is disabled. Group membership is resolved from the policy at
/// materialization time.
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    pub email: String,
    pub display_name: String,

    /// Which identity provider authenticated this principal, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_provider: Option<ProviderType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,

    /// Group ids, resolved by email from the policy.
    pub groups: Vec<String>,
}

impl Principal {
    pub fn new(email: impl Into<String>) -> Self {
        let email = email.into();
        Self {
            display_name: email.clone(),
            email,
            identity_provider: None,
            avatar_url: None,
            groups: Vec::new(),
        }
    }

    /// The sentinel identity used when auth is not configured. Guests own
    /// the full permission set on every connection.
    pub fn guest() -> Self {
        Self {
            email: "guest".to_string(),
            display_name: "Guest".to_string(),
            identity_provider: None,
            avatar_url: None,
            groups: Vec::new(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_identity_provider(mut self, provider: ProviderType) -> Self {
        self.identity_provider = Some(provider);
        self
    }

    pub fn with_avatar_url(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }

    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = groups;
        self
    }
}
