//! Signed session tokens.

use crate::principal::Principal;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use pgconsole_core::ProviderType;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Seven days, the fallback session lifetime.
pub const DEFAULT_SIGNIN_EXPIRY_SECS: i64 = 7 * 24 * 60 * 60;

const ISSUER: &str = "pgconsole";

/// Claims carried by the session cookie.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    /// The user email.
    pub sub: String,

    /// Display name, omitted when it equals the email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Identity provider tag, omitted for password logins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idp: Option<ProviderType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,

    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// Parse the signin expiry grammar (`^\d+[hdw]$`) into seconds.
///
/// Values outside the grammar fall back to seven days with a warning; the
/// token is still issued.
pub fn parse_signin_expiry(raw: Option<&str>) -> i64 {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^(\d+)([hdw])$").unwrap());

    let Some(raw) = raw else {
        return DEFAULT_SIGNIN_EXPIRY_SECS;
    };
    let Some(caps) = re.captures(raw) else {
        tracing::warn!(value = raw, "signin_expiry does not match <n>[hdw], using 7 days");
        return DEFAULT_SIGNIN_EXPIRY_SECS;
    };
    let Ok(amount) = caps[1].parse::<i64>() else {
        tracing::warn!(value = raw, "signin_expiry amount overflows, using 7 days");
        return DEFAULT_SIGNIN_EXPIRY_SECS;
    };
    let unit = match &caps[2] {
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => 7 * 24 * 60 * 60,
    };
    amount.saturating_mul(unit)
}

/// Issues and verifies session tokens with a symmetric secret.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiry_secs: i64,
}

impl TokenService {
    pub fn new(secret: &str, signin_expiry: Option<&str>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expiry_secs: parse_signin_expiry(signin_expiry),
        }
    }

    /// The configured session lifetime in seconds; also the cookie max-age.
    pub fn expiry_secs(&self) -> i64 {
        self.expiry_secs
    }

    /// Sign a session token for the principal.
    pub fn create(&self, principal: &Principal) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            sub: principal.email.clone(),
            name: (principal.display_name != principal.email)
                .then(|| principal.display_name.clone()),
            idp: principal.identity_provider,
            avatar: principal.avatar_url.clone(),
            iss: ISSUER.to_string(),
            iat: now,
            exp: now + self.expiry_secs,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    /// Verify a token and materialize the principal it carries.
    ///
    /// Group membership is not stored in the token; the caller resolves it
    /// from the policy afterwards.
    pub fn verify(&self, token: &str) -> Option<Principal> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &validation).ok()?;
        let claims = data.claims;

        let mut principal = Principal::new(&claims.sub);
        if let Some(name) = claims.name {
            principal = principal.with_display_name(name);
        }
        if let Some(idp) = claims.idp {
            principal = principal.with_identity_provider(idp);
        }
        if let Some(avatar) = claims.avatar {
            principal = principal.with_avatar_url(avatar);
        }
        Some(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new("0123456789abcdef0123456789abcdef", Some("7d"))
    }

    #[test]
    fn round_trip_preserves_the_principal() {
        let principal = Principal::new("alice@example.com")
            .with_display_name("Alice")
            .with_identity_provider(ProviderType::Google)
            .with_avatar_url("https://img.example.com/a.png");
        let token = service().create(&principal).unwrap();
        let restored = service().verify(&token).unwrap();
        assert_eq!(restored.email, "alice@example.com");
        assert_eq!(restored.display_name, "Alice");
        assert_eq!(restored.identity_provider, Some(ProviderType::Google));
        assert_eq!(restored.avatar_url.as_deref(), Some("https://img.example.com/a.png"));
    }

    #[test]
    fn display_name_equal_to_email_is_not_stored() {
        let principal = Principal::new("bob@example.com");
        let token = service().create(&principal).unwrap();

        // Decode without the service to inspect the raw claims.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&["pgconsole"]);
        let data = jsonwebtoken::decode::<SessionClaims>(
            &token,
            &DecodingKey::from_secret(b"0123456789abcdef0123456789abcdef"),
            &validation,
        )
        .unwrap();
        assert_eq!(data.claims.name, None);

        let restored = service().verify(&token).unwrap();
        assert_eq!(restored.display_name, "bob@example.com");
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let principal = Principal::new("alice@example.com");
        let token = service().create(&principal).unwrap();
        let other = TokenService::new("ffffffffffffffffffffffffffffffff", None);
        assert!(other.verify(&token).is_none());
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        assert!(service().verify("not-a-token").is_none());
        assert!(service().verify("").is_none());
    }

    #[test]
    fn expiry_grammar() {
        assert_eq!(parse_signin_expiry(Some("12h")), 12 * 3600);
        assert_eq!(parse_signin_expiry(Some("7d")), 7 * 86400);
        assert_eq!(parse_signin_expiry(Some("2w")), 14 * 86400);
        assert_eq!(parse_signin_expiry(Some("7days")), DEFAULT_SIGNIN_EXPIRY_SECS);
        assert_eq!(parse_signin_expiry(Some("")), DEFAULT_SIGNIN_EXPIRY_SECS);
        assert_eq!(parse_signin_expiry(None), DEFAULT_SIGNIN_EXPIRY_SECS);
    }
}
