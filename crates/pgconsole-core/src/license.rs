//! Plan tiers, feature gating and license validation.
//!
//! License verification itself is opaque to the gateway: anything that can
//! turn a token into [`Plan`] claims implements [`LicenseValidator`]. The
//! shipped implementation decodes a signed JWT. A missing or invalid license
//! never prevents startup; the plan is clamped to `FREE` with a single seat.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// The plan tiers, in ascending order of entitlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlanTier {
    Free,
    Team,
    Enterprise,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "FREE",
            PlanTier::Team => "TEAM",
            PlanTier::Enterprise => "ENTERPRISE",
        }
    }
}

/// Gated features and the tier that unlocks each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Iam,
    SsoGoogle,
    SsoKeycloak,
    SsoOkta,
    AuditExport,
}

impl Feature {
    pub fn minimum_plan(&self) -> PlanTier {
        match self {
            Feature::Iam | Feature::SsoGoogle => PlanTier::Team,
            Feature::SsoKeycloak | Feature::SsoOkta | Feature::AuditExport => PlanTier::Enterprise,
        }
    }
}

/// The resolved plan for this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub tier: PlanTier,
    pub max_users: usize,
    pub expiry: Option<DateTime<Utc>>,
    pub email: Option<String>,
}

impl Plan {
    /// The clamp applied when no valid license is present.
    pub fn free() -> Self {
        Self {
            tier: PlanTier::Free,
            max_users: 1,
            expiry: None,
            email: None,
        }
    }

    pub fn permits(&self, feature: Feature) -> bool {
        self.tier >= feature.minimum_plan()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LicenseError {
    #[error("license token rejected: {0}")]
    Invalid(String),
    #[error("license is expired")]
    Expired,
}

/// Anything that can turn a license token into plan claims.
pub trait LicenseValidator: Send + Sync {
    fn validate(&self, token: &str) -> Result<Plan, LicenseError>;
}

#[derive(Debug, Deserialize)]
struct LicenseClaims {
    plan: PlanTier,
    max_users: usize,
    #[serde(default)]
    email: Option<String>,
    exp: i64,
}

/// Validates license tokens signed as JWTs.
pub struct JwtLicenseValidator {
    key: DecodingKey,
    algorithm: Algorithm,
}

impl JwtLicenseValidator {
    pub fn hs256(secret: &[u8]) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            algorithm: Algorithm::HS256,
        }
    }

    pub fn rs256(public_key_pem: &[u8]) -> Result<Self, LicenseError> {
        let key = DecodingKey::from_rsa_pem(public_key_pem)
            .map_err(|e| LicenseError::Invalid(e.to_string()))?;
        Ok(Self {
            key,
            algorithm: Algorithm::RS256,
        })
    }
}

impl LicenseValidator for JwtLicenseValidator {
    fn validate(&self, token: &str) -> Result<Plan, LicenseError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;
        let data = jsonwebtoken::decode::<LicenseClaims>(token, &self.key, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => LicenseError::Expired,
                _ => LicenseError::Invalid(e.to_string()),
            })?;
        let claims = data.claims;
        Ok(Plan {
            tier: claims.plan,
            max_users: claims.max_users,
            expiry: DateTime::from_timestamp(claims.exp, 0),
            email: claims.email,
        })
    }
}

/// Resolve the process plan from an optional license token.
///
/// Absence or rejection clamps to FREE with one seat; it is never fatal.
pub fn resolve_plan(token: Option<&str>, validator: &dyn LicenseValidator) -> Plan {
    match token {
        None => {
            tracing::info!("no license token configured, running on the FREE plan");
            Plan::free()
        }
        Some(token) => match validator.validate(token) {
            Ok(plan) => {
                tracing::info!(tier = plan.tier.as_str(), max_users = plan.max_users, "license accepted");
                plan
            }
            Err(err) => {
                tracing::warn!(%err, "license token rejected, clamping to the FREE plan");
                Plan::free()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::json;

    fn mint(secret: &[u8], plan: &str, max_users: usize, exp: i64) -> String {
        let claims = json!({ "plan": plan, "max_users": max_users, "exp": exp });
        jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(secret)).unwrap()
    }

    #[test]
    fn valid_token_resolves_its_tier() {
        let secret = b"unit-test-license-secret";
        let exp = Utc::now().timestamp() + 3600;
        let token = mint(secret, "TEAM", 25, exp);
        let validator = JwtLicenseValidator::hs256(secret);
        let plan = resolve_plan(Some(&token), &validator);
        assert_eq!(plan.tier, PlanTier::Team);
        assert_eq!(plan.max_users, 25);
    }

    #[test]
    fn missing_token_clamps_to_free() {
        let validator = JwtLicenseValidator::hs256(b"unused");
        let plan = resolve_plan(None, &validator);
        assert_eq!(plan.tier, PlanTier::Free);
        assert_eq!(plan.max_users, 1);
    }

    #[test]
    fn tampered_token_clamps_to_free() {
        let exp = Utc::now().timestamp() + 3600;
        let token = mint(b"one-secret", "ENTERPRISE", 500, exp);
        let validator = JwtLicenseValidator::hs256(b"another-secret");
        let plan = resolve_plan(Some(&token), &validator);
        assert_eq!(plan, Plan::free());
    }

    #[test]
    fn tiers_order_by_entitlement() {
        assert!(PlanTier::Enterprise > PlanTier::Team);
        assert!(Plan { tier: PlanTier::Team, max_users: 5, expiry: None, email: None }
            .permits(Feature::Iam));
        assert!(!Plan::free().permits(Feature::SsoGoogle));
        assert!(!Plan { tier: PlanTier::Team, max_users: 5, expiry: None, email: None }
            .permits(Feature::SsoOkta));
    }
}
