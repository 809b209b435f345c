//! OIDC login flow.
//!
//! The gateway runs the plain authorization-code flow: build an authorize
//! URL carrying a random state, verify the state on callback in constant
//! time, exchange the code, fetch userinfo, and map the email claim onto a
//! configured user. Every failure collapses into a small kind vocabulary
//! that the server turns into `/signin?error=<kind>` redirects.

use base64::Engine;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope,
    TokenResponse, TokenUrl,
};
use pgconsole_core::{ProviderConfig, ProviderType};
use rand::Rng;
use serde::Deserialize;
use subtle::ConstantTimeEq;

/// Login failure kinds, matching the signin redirect vocabulary.
#[derive(Debug, thiserror::Error)]
pub enum OidcError {
    #[error("provider is not configured")]
    NotConfigured,
    #[error("state mismatch")]
    InvalidState,
    #[error("authorization code missing from callback")]
    NoCode,
    #[error("code exchange failed: {0}")]
    TokenExchange(String),
    #[error("userinfo request failed: {0}")]
    Userinfo(String),
    #[error("userinfo carried no email claim")]
    NoEmail,
    #[error("user '{0}' is not configured")]
    UserNotAllowed(String),
    #[error("provider returned an error: {0}")]
    Provider(String),
}

impl OidcError {
    /// The `error=<kind>` value for the signin redirect.
    pub fn kind(&self) -> &'static str {
        match self {
            OidcError::NotConfigured => "not_configured",
            OidcError::InvalidState => "invalid_state",
            OidcError::NoCode => "no_code",
            OidcError::TokenExchange(_) => "token_failed",
            OidcError::Userinfo(_) => "userinfo_failed",
            OidcError::NoEmail => "no_email",
            OidcError::UserNotAllowed(_) => "user_not_allowed",
            OidcError::Provider(_) => "oauth_error",
        }
    }
}

/// Identity claims fetched from the provider's userinfo endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct OidcUserInfo {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

struct ProviderEndpoints {
    authorize: String,
    token: String,
    userinfo: String,
}

fn endpoints(provider: &ProviderConfig) -> ProviderEndpoints {
    match provider.kind {
        ProviderType::Google => ProviderEndpoints {
            authorize: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token: "https://oauth2.googleapis.com/token".to_string(),
            userinfo: "https://openidconnect.googleapis.com/v1/userinfo".to_string(),
        },
        ProviderType::Keycloak => {
            let issuer = provider
                .issuer_url
                .as_deref()
                .unwrap_or_default()
                .trim_end_matches('/');
            ProviderEndpoints {
                authorize: format!("{issuer}/protocol/openid-connect/auth"),
                token: format!("{issuer}/protocol/openid-connect/token"),
                userinfo: format!("{issuer}/protocol/openid-connect/userinfo"),
            }
        }
        ProviderType::Okta => {
            let issuer = provider
                .issuer_url
                .as_deref()
                .unwrap_or_default()
                .trim_end_matches('/');
            ProviderEndpoints {
                authorize: format!("{issuer}/v1/authorize"),
                token: format!("{issuer}/v1/token"),
                userinfo: format!("{issuer}/v1/userinfo"),
            }
        }
    }
}

/// Generate the random state nonce bound to one login attempt.
pub fn new_state() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Constant-time equality between the callback state and the cookie state.
pub fn states_match(returned: &str, saved: &str) -> bool {
    returned.as_bytes().ct_eq(saved.as_bytes()).into()
}

/// One provider's configured login flow.
pub struct OidcLogin {
    kind: ProviderType,
    client: BasicClient,
    userinfo_url: String,
    http: reqwest::Client,
}

impl OidcLogin {
    /// Build the flow for a configured provider. `external_url` is the
    /// normalized public base URL of the gateway.
    pub fn new(provider: &ProviderConfig, external_url: &str) -> Result<Self, OidcError> {
        let endpoints = endpoints(provider);
        let redirect = format!(
            "{external_url}/api/auth/{}/callback",
            provider.kind.as_str()
        );

        let auth_url = AuthUrl::new(endpoints.authorize)
            .map_err(|e| OidcError::Provider(e.to_string()))?;
        let token_url =
            TokenUrl::new(endpoints.token).map_err(|e| OidcError::Provider(e.to_string()))?;
        let redirect_url =
            RedirectUrl::new(redirect).map_err(|e| OidcError::Provider(e.to_string()))?;

        let client = BasicClient::new(
            ClientId::new(provider.client_id.clone()),
            Some(ClientSecret::new(provider.client_secret.clone())),
            auth_url,
            Some(token_url),
        )
        .set_redirect_uri(redirect_url);

        Ok(Self {
            kind: provider.kind,
            client,
            userinfo_url: endpoints.userinfo,
            http: reqwest::Client::new(),
        })
    }

    pub fn kind(&self) -> ProviderType {
        self.kind
    }

    /// The authorize URL and the state to persist in the short-lived cookie.
    pub fn authorize_redirect(&self) -> (String, String) {
        let state = new_state();
        let state_for_url = state.clone();
        let (url, _csrf) = self
            .client
            .authorize_url(move || CsrfToken::new(state_for_url))
            .add_scope(Scope::new("openid".to_string()))
            .add_scope(Scope::new("email".to_string()))
            .add_scope(Scope::new("profile".to_string()))
            .url();
        (url.to_string(), state)
    }

    /// Exchange the callback code and fetch the userinfo claims.
    ///
    /// The state check happens before any network traffic.
    pub async fn complete(
        &self,
        code: &str,
        returned_state: &str,
        saved_state: &str,
    ) -> Result<OidcUserInfo, OidcError> {
        if saved_state.is_empty() || !states_match(returned_state, saved_state) {
            return Err(OidcError::InvalidState);
        }
        if code.is_empty() {
            return Err(OidcError::NoCode);
        }

        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| OidcError::TokenExchange(e.to_string()))?;

        let response = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(token.access_token().secret())
            .send()
            .await
            .map_err(|e| OidcError::Userinfo(e.to_string()))?;
        if !response.status().is_success() {
            return Err(OidcError::Userinfo(format!(
                "userinfo endpoint returned {}",
                response.status()
            )));
        }

        let info: OidcUserInfo = response
            .json()
            .await
            .map_err(|e| OidcError::Userinfo(e.to_string()))?;
        if info.email.as_deref().unwrap_or("").is_empty() {
            return Err(OidcError::NoEmail);
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn google() -> ProviderConfig {
        ProviderConfig {
            kind: ProviderType::Google,
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            issuer_url: None,
        }
    }

    #[test]
    fn authorize_url_carries_state_and_scopes() {
        let login = OidcLogin::new(&google(), "https://console.example.com").unwrap();
        let (url, state) = login.authorize_redirect();
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth"));
        assert!(url.contains(&format!("state={state}")));
        assert!(url.contains("scope=openid+email+profile"));
        assert!(url.contains("redirect_uri="));
    }

    #[test]
    fn each_attempt_gets_a_fresh_state() {
        assert_ne!(new_state(), new_state());
        assert!(new_state().len() >= 42);
    }

    #[test]
    fn state_comparison_requires_exact_equality() {
        assert!(states_match("abc", "abc"));
        assert!(!states_match("abc", "abd"));
        assert!(!states_match("abc", "abcd"));
    }

    #[tokio::test]
    async fn mismatched_state_fails_before_any_network_call() {
        let login = OidcLogin::new(&google(), "https://console.example.com").unwrap();
        let err = login.complete("code", "returned", "saved").await.unwrap_err();
        assert_eq!(err.kind(), "invalid_state");
    }

    #[tokio::test]
    async fn missing_code_is_its_own_kind() {
        let login = OidcLogin::new(&google(), "https://console.example.com").unwrap();
        let err = login.complete("", "state", "state").await.unwrap_err();
        assert_eq!(err.kind(), "no_code");
    }

    #[test]
    fn keycloak_endpoints_derive_from_the_issuer() {
        let provider = ProviderConfig {
            kind: ProviderType::Keycloak,
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            issuer_url: Some("https://id.example.com/realms/main/".to_string()),
        };
        let eps = endpoints(&provider);
        assert_eq!(
            eps.authorize,
            "https://id.example.com/realms/main/protocol/openid-connect/auth"
        );
        assert_eq!(
            eps.userinfo,
            "https://id.example.com/realms/main/protocol/openid-connect/userinfo"
        );
    }
}
