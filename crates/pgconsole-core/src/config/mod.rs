//! The declarative policy file.
//!
//! A single TOML document with sections `general`, `labels`, `connections`,
//! `auth`, `users`, `groups`, `ai` and `iam` is parsed and validated once at
//! startup. Any violation is a fatal error carrying one sentence that names
//! the offending field. Unknown fields are tolerated; after a successful
//! load the [`Policy`] is immutable for the process lifetime.

pub mod auth;
pub mod connection;
pub mod iam;
pub mod users;

pub use auth::{AuthConfig, ProviderConfig, ProviderType};
pub use connection::{ConnectionConfig, SslMode};
pub use iam::{ConnectionSelector, IamRule, RuleMember};
pub use users::{GroupConfig, LabelConfig, UserConfig};

use crate::license::Plan;
use crate::permission::{Permission, PermissionSet};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap())
}

fn color_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").unwrap())
}

/// Error raised while loading or validating the policy file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read policy file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse policy file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    /// One sentence naming the offending field.
    #[error("{0}")]
    Invalid(String),
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

#[derive(Debug, Default, Deserialize)]
struct GeneralSection {
    #[serde(default)]
    external_url: Option<String>,

    /// Audit log path; absent means audit records go to stdout.
    #[serde(default)]
    audit_log: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IamRuleSection {
    connection: String,
    #[serde(default)]
    permissions: Vec<String>,
    #[serde(default)]
    members: Vec<String>,
}

/// The raw document shape. Everything is revalidated into [`Policy`].
#[derive(Debug, Deserialize)]
struct PolicyDocument {
    #[serde(default)]
    general: GeneralSection,
    #[serde(default)]
    labels: Vec<LabelConfig>,
    #[serde(default)]
    connections: Vec<ConnectionConfig>,
    #[serde(default)]
    auth: Option<AuthConfig>,
    #[serde(default)]
    users: Vec<UserConfig>,
    #[serde(default)]
    groups: Vec<GroupConfig>,
    #[serde(default)]
    iam: Vec<IamRuleSection>,
}

/// The validated, immutable policy.
#[derive(Debug)]
pub struct Policy {
    external_url: Option<String>,
    audit_log: Option<String>,
    labels: Vec<LabelConfig>,
    connections: Vec<ConnectionConfig>,
    auth: Option<AuthConfig>,
    users: Vec<UserConfig>,
    groups: Vec<GroupConfig>,
    iam: Vec<IamRule>,
}

impl Policy {
    /// Load and validate the policy file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&raw).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    /// Parse and validate a policy document from TOML text.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let doc: PolicyDocument = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
        Self::from_document(doc)
    }

    fn from_document(doc: PolicyDocument) -> Result<Self, ConfigError> {
        let external_url = validate_external_url(&doc)?;
        validate_labels(&doc.labels)?;
        validate_connections(&doc.connections, &doc.labels)?;
        let users = validate_users(doc.users, doc.auth.is_some())?;
        validate_groups(&doc.groups)?;
        validate_auth(doc.auth.as_ref())?;
        let iam = validate_iam(&doc.iam, &doc.connections, &doc.groups)?;

        Ok(Self {
            external_url,
            audit_log: doc.general.audit_log,
            labels: doc.labels,
            connections: doc.connections,
            auth: doc.auth,
            users,
            groups: doc.groups,
            iam,
        })
    }

    /// Fatal when auth is enabled and more users are declared than the plan
    /// seats allow. Called once the license has been resolved.
    pub fn enforce_seat_limit(&self, plan: &Plan) -> Result<(), ConfigError> {
        if self.auth.is_some() && self.users.len() > plan.max_users {
            return Err(invalid(format!(
                "the license allows {} user(s) but {} are configured",
                plan.max_users,
                self.users.len()
            )));
        }
        Ok(())
    }

    pub fn auth_enabled(&self) -> bool {
        self.auth.is_some()
    }

    pub fn external_url(&self) -> Option<&str> {
        self.external_url.as_deref()
    }

    pub fn audit_log(&self) -> Option<&str> {
        self.audit_log.as_deref()
    }

    pub fn get_connections(&self) -> &[ConnectionConfig] {
        &self.connections
    }

    pub fn get_connection_by_id(&self, id: &str) -> Option<&ConnectionConfig> {
        self.connections.iter().find(|c| c.id == id)
    }

    pub fn get_auth_config(&self) -> Option<&AuthConfig> {
        self.auth.as_ref()
    }

    pub fn get_user_by_email(&self, email: &str) -> Option<&UserConfig> {
        self.users.iter().find(|u| u.email == email)
    }

    pub fn get_users(&self) -> &[UserConfig] {
        &self.users
    }

    /// Group ids the user belongs to, in declaration order.
    pub fn get_groups_for_user(&self, email: &str) -> Vec<String> {
        self.groups
            .iter()
            .filter(|g| g.has_member(email))
            .map(|g| g.id.clone())
            .collect()
    }

    pub fn get_iam_rules(&self) -> &[IamRule] {
        &self.iam
    }

    pub fn get_labels(&self) -> &[LabelConfig] {
        &self.labels
    }
}

fn validate_external_url(doc: &PolicyDocument) -> Result<Option<String>, ConfigError> {
    let has_providers = doc
        .auth
        .as_ref()
        .is_some_and(|a| !a.providers.is_empty());

    let Some(raw) = doc.general.external_url.as_deref() else {
        if has_providers {
            return Err(invalid(
                "general.external_url is required when auth providers are configured",
            ));
        }
        return Ok(None);
    };

    let normalized = raw.trim_end_matches('/').to_string();
    let parsed = url::Url::parse(&normalized)
        .map_err(|_| invalid(format!("general.external_url '{raw}' is not an absolute URL")))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(invalid(format!(
            "general.external_url '{raw}' must use http or https"
        )));
    }
    Ok(Some(normalized))
}

fn validate_labels(labels: &[LabelConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for label in labels {
        if !seen.insert(label.id.as_str()) {
            return Err(invalid(format!("duplicate label id '{}'", label.id)));
        }
        if !color_re().is_match(&label.color) {
            return Err(invalid(format!(
                "label '{}' color '{}' must be #rgb or #rrggbb",
                label.id, label.color
            )));
        }
    }
    Ok(())
}

fn validate_connections(
    connections: &[ConnectionConfig],
    labels: &[LabelConfig],
) -> Result<(), ConfigError> {
    let label_ids: HashSet<&str> = labels.iter().map(|l| l.id.as_str()).collect();
    let mut seen = HashSet::new();
    for conn in connections {
        if !seen.insert(conn.id.as_str()) {
            return Err(invalid(format!("duplicate connection id '{}'", conn.id)));
        }
        if conn.host.is_empty() {
            return Err(invalid(format!("connection '{}' host must not be empty", conn.id)));
        }
        if conn.database.is_empty() {
            return Err(invalid(format!(
                "connection '{}' database must not be empty",
                conn.id
            )));
        }
        if conn.username.is_empty() {
            return Err(invalid(format!(
                "connection '{}' username must not be empty",
                conn.id
            )));
        }
        for label in &conn.labels {
            if !label_ids.contains(label.as_str()) {
                return Err(invalid(format!(
                    "connection '{}' references unknown label '{label}'",
                    conn.id
                )));
            }
        }
    }
    Ok(())
}

fn validate_users(
    mut users: Vec<UserConfig>,
    auth_enabled: bool,
) -> Result<Vec<UserConfig>, ConfigError> {
    let mut seen = HashSet::new();
    for user in &users {
        if !email_re().is_match(&user.email) {
            return Err(invalid(format!(
                "user email '{}' is not a valid email address",
                user.email
            )));
        }
        if !seen.insert(user.email.clone()) {
            return Err(invalid(format!("duplicate user email '{}'", user.email)));
        }
    }

    if auth_enabled && users.is_empty() {
        return Err(invalid("auth requires at least one configured user"));
    }

    // At least one owner whenever users are declared.
    if !users.is_empty() && !users.iter().any(|u| u.owner) {
        tracing::warn!(
            email = %users[0].email,
            "no owner declared, promoting the first configured user"
        );
        users[0].owner = true;
    }

    Ok(users)
}

fn validate_groups(groups: &[GroupConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for group in groups {
        if !seen.insert(group.id.as_str()) {
            return Err(invalid(format!("duplicate group id '{}'", group.id)));
        }
        for member in &group.members {
            if !email_re().is_match(member) {
                return Err(invalid(format!(
                    "group '{}' member '{member}' is not a valid email address",
                    group.id
                )));
            }
        }
    }
    Ok(())
}

fn validate_auth(auth: Option<&AuthConfig>) -> Result<(), ConfigError> {
    let Some(auth) = auth else { return Ok(()) };

    if auth.jwt_secret.len() < 32 {
        return Err(invalid("auth.jwt_secret must be at least 32 characters"));
    }

    let mut seen = HashSet::new();
    for provider in &auth.providers {
        if !seen.insert(provider.kind) {
            return Err(invalid(format!(
                "auth provider '{}' is configured more than once",
                provider.kind.as_str()
            )));
        }
        if provider.client_id.is_empty() {
            return Err(invalid(format!(
                "auth provider '{}' client_id must not be empty",
                provider.kind.as_str()
            )));
        }
        if provider.client_secret.is_empty() {
            return Err(invalid(format!(
                "auth provider '{}' client_secret must not be empty",
                provider.kind.as_str()
            )));
        }
        if matches!(provider.kind, ProviderType::Keycloak | ProviderType::Okta)
            && provider.issuer_url.as_deref().unwrap_or("").is_empty()
        {
            return Err(invalid(format!(
                "auth provider '{}' requires issuer_url",
                provider.kind.as_str()
            )));
        }
    }
    Ok(())
}

fn validate_iam(
    rules: &[IamRuleSection],
    connections: &[ConnectionConfig],
    groups: &[GroupConfig],
) -> Result<Vec<IamRule>, ConfigError> {
    let connection_ids: HashSet<&str> = connections.iter().map(|c| c.id.as_str()).collect();
    let group_ids: HashSet<&str> = groups.iter().map(|g| g.id.as_str()).collect();

    let mut out = Vec::with_capacity(rules.len());
    for (index, rule) in rules.iter().enumerate() {
        let selector = if rule.connection == "*" {
            ConnectionSelector::Any
        } else if connection_ids.contains(rule.connection.as_str()) {
            ConnectionSelector::Id(rule.connection.clone())
        } else {
            return Err(invalid(format!(
                "iam rule #{} connection '{}' does not match any configured connection",
                index + 1,
                rule.connection
            )));
        };

        let mut permissions = PermissionSet::new();
        for name in &rule.permissions {
            if name == "*" {
                permissions = PermissionSet::full();
                continue;
            }
            let permission = Permission::from_str(name).map_err(|_| {
                invalid(format!(
                    "iam rule #{} permission '{name}' is not recognized",
                    index + 1
                ))
            })?;
            permissions.insert(permission);
        }

        let mut members = Vec::with_capacity(rule.members.len());
        for token in &rule.members {
            let member = RuleMember::parse(token).ok_or_else(|| {
                invalid(format!(
                    "iam rule #{} member '{token}' must be '*', 'user:<email>' or 'group:<id>'",
                    index + 1
                ))
            })?;
            if let RuleMember::Group(group) = &member {
                if !group_ids.contains(group.as_str()) {
                    return Err(invalid(format!(
                        "iam rule #{} member 'group:{group}' references unknown group",
                        index + 1
                    )));
                }
            }
            members.push(member);
        }

        out.push(IamRule {
            selector,
            permissions,
            members,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::license::PlanTier;
    use pretty_assertions::assert_eq;

    const MINIMAL: &str = r#"
        [[connections]]
        id = "prod"
        name = "Production"
        host = "db.internal"
        database = "app"
        username = "console"
    "#;

    fn governed() -> String {
        format!(
            r#"
            [general]
            external_url = "https://console.example.com/"

            [auth]
            jwt_secret = "0123456789abcdef0123456789abcdef"

            [[users]]
            email = "alice@example.com"
            password = "hunter2hunter2"

            [[users]]
            email = "bob@example.com"

            [[groups]]
            id = "readers"
            name = "Readers"
            members = ["alice@example.com"]

            {MINIMAL}

            [[iam]]
            connection = "prod"
            permissions = ["read"]
            members = ["group:readers"]
            "#
        )
    }

    #[test]
    fn minimal_policy_loads() {
        let policy = Policy::from_toml(MINIMAL).unwrap();
        assert!(!policy.auth_enabled());
        assert_eq!(policy.get_connections().len(), 1);
        assert!(policy.get_connection_by_id("prod").is_some());
        assert!(policy.get_connection_by_id("missing").is_none());
    }

    #[test]
    fn external_url_trailing_slash_is_normalized() {
        let policy = Policy::from_toml(&governed()).unwrap();
        assert_eq!(policy.external_url(), Some("https://console.example.com"));
    }

    #[test]
    fn first_user_is_promoted_to_owner() {
        let policy = Policy::from_toml(&governed()).unwrap();
        assert!(policy.get_user_by_email("alice@example.com").unwrap().owner);
        assert!(!policy.get_user_by_email("bob@example.com").unwrap().owner);
    }

    #[test]
    fn groups_resolve_by_email() {
        let policy = Policy::from_toml(&governed()).unwrap();
        assert_eq!(policy.get_groups_for_user("alice@example.com"), vec!["readers"]);
        assert!(policy.get_groups_for_user("bob@example.com").is_empty());
    }

    #[test]
    fn short_jwt_secret_is_fatal() {
        let raw = r#"
            [auth]
            jwt_secret = "too-short"

            [[users]]
            email = "alice@example.com"
        "#;
        let err = Policy::from_toml(raw).unwrap_err();
        assert!(err.to_string().contains("jwt_secret"));
    }

    #[test]
    fn auth_without_users_is_fatal() {
        let raw = r#"
            [auth]
            jwt_secret = "0123456789abcdef0123456789abcdef"
        "#;
        let err = Policy::from_toml(raw).unwrap_err();
        assert!(err.to_string().contains("at least one configured user"));
    }

    #[test]
    fn bad_label_color_is_fatal() {
        let raw = r#"
            [[labels]]
            id = "prod"
            name = "Production"
            color = "red"
        "#;
        let err = Policy::from_toml(raw).unwrap_err();
        assert!(err.to_string().contains("#rgb or #rrggbb"));
    }

    #[test]
    fn unknown_label_reference_is_fatal() {
        let raw = r#"
            [[connections]]
            id = "prod"
            name = "Production"
            host = "db.internal"
            database = "app"
            username = "console"
            labels = ["nope"]
        "#;
        let err = Policy::from_toml(raw).unwrap_err();
        assert!(err.to_string().contains("unknown label 'nope'"));
    }

    #[test]
    fn iam_star_expands_to_full_set() {
        let raw = format!(
            r#"
            {MINIMAL}

            [[iam]]
            connection = "*"
            permissions = ["*"]
            members = ["*"]
            "#
        );
        let policy = Policy::from_toml(&raw).unwrap();
        assert_eq!(policy.get_iam_rules()[0].permissions, PermissionSet::full());
        assert_eq!(policy.get_iam_rules()[0].selector, ConnectionSelector::Any);
    }

    #[test]
    fn iam_unknown_group_is_fatal() {
        let raw = format!(
            r#"
            {MINIMAL}

            [[iam]]
            connection = "prod"
            permissions = ["read"]
            members = ["group:nobody"]
            "#
        );
        let err = Policy::from_toml(&raw).unwrap_err();
        assert!(err.to_string().contains("unknown group"));
    }

    #[test]
    fn unknown_sections_are_tolerated() {
        let raw = format!(
            r#"
            {MINIMAL}

            [ai]
            provider = "none"
            "#
        );
        assert!(Policy::from_toml(&raw).is_ok());
    }

    #[test]
    fn seat_limit_is_enforced_when_auth_is_on() {
        let policy = Policy::from_toml(&governed()).unwrap();
        let plan = Plan {
            tier: PlanTier::Team,
            max_users: 1,
            expiry: None,
            email: None,
        };
        assert!(policy.enforce_seat_limit(&plan).is_err());
        assert!(policy.enforce_seat_limit(&Plan {
            max_users: 2,
            ..plan
        })
        .is_ok());
    }
}
