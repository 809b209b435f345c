//! Authentication configuration.

use crate::license::Feature;
use serde::{Deserialize, Serialize};

/// Supported OIDC provider types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Google,
    Keycloak,
    Okta,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Google => "google",
            ProviderType::Keycloak => "keycloak",
            ProviderType::Okta => "okta",
        }
    }

    /// The plan feature that must be unlocked before this provider serves
    /// logins.
    pub fn required_feature(&self) -> Feature {
        match self {
            ProviderType::Google => Feature::SsoGoogle,
            ProviderType::Keycloak => Feature::SsoKeycloak,
            ProviderType::Okta => Feature::SsoOkta,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "google" => Some(ProviderType::Google),
            "keycloak" => Some(ProviderType::Keycloak),
            "okta" => Some(ProviderType::Okta),
            _ => None,
        }
    }
}

/// One configured OIDC provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub kind: ProviderType,
    pub client_id: String,
    pub client_secret: String,

    /// Required for keycloak and okta; ignored for google.
    #[serde(default)]
    pub issuer_url: Option<String>,
}

/// The auth section. Its absence turns the gateway into guest mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for session tokens; at least 32 characters.
    pub jwt_secret: String,

    /// Session lifetime, `^\d+[hdw]$`. Invalid values fall back to 7 days
    /// at token-issue time, with a warning.
    #[serde(default)]
    pub signin_expiry: Option<String>,

    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl AuthConfig {
    pub fn provider(&self, kind: ProviderType) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.kind == kind)
    }
}
