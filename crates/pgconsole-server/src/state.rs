//! Shared application state.

use crate::cookies::{extract_cookie, SESSION_COOKIE};
use axum::http::HeaderMap;
use pgconsole_audit::AuditSink;
use pgconsole_auth::{OidcLogin, Principal, TokenService};
use pgconsole_broker::QueryBroker;
use pgconsole_core::{Plan, Policy, ProviderType};
use pgconsole_iam::IamEvaluator;
use std::collections::HashMap;
use std::sync::Arc;

pub struct AppState {
    pub policy: Arc<Policy>,
    pub plan: Plan,
    pub broker: QueryBroker,
    pub audit: Arc<dyn AuditSink>,

    /// Absent when auth is disabled (guest mode).
    pub tokens: Option<TokenService>,
    pub oidc: HashMap<ProviderType, OidcLogin>,
}

impl AppState {
    pub fn init(policy: Arc<Policy>, plan: Plan) -> Self {
        let audit: Arc<dyn AuditSink> = Arc::from(pgconsole_audit::sink_for(policy.audit_log()));

        let tokens = policy
            .get_auth_config()
            .map(|auth| TokenService::new(&auth.jwt_secret, auth.signin_expiry.as_deref()));

        let mut oidc = HashMap::new();
        if let (Some(auth), Some(external_url)) = (policy.get_auth_config(), policy.external_url())
        {
            for provider in &auth.providers {
                match OidcLogin::new(provider, external_url) {
                    Ok(login) => {
                        oidc.insert(provider.kind, login);
                    }
                    Err(err) => {
                        tracing::warn!(
                            provider = provider.kind.as_str(),
                            %err,
                            "skipping misconfigured auth provider"
                        );
                    }
                }
            }
        }

        let iam = IamEvaluator::new(Arc::clone(&policy), plan.clone());
        let broker = QueryBroker::new(Arc::clone(&policy), iam, plan.clone(), Arc::clone(&audit));

        Self {
            policy,
            plan,
            broker,
            audit,
            tokens,
            oidc,
        }
    }

    pub fn auth_enabled(&self) -> bool {
        self.tokens.is_some()
    }

    /// Resolve the request's principal from the session cookie, or the
    /// guest sentinel when auth is disabled.
    pub fn principal_for(&self, headers: &HeaderMap) -> Option<Principal> {
        let Some(tokens) = &self.tokens else {
            return Some(Principal::guest());
        };
        let cookie = extract_cookie(headers, SESSION_COOKIE)?;
        let principal = tokens.verify(&cookie)?;
        // A token for a user that has since been removed is dead.
        self.policy.get_user_by_email(&principal.email)?;
        let groups = self.policy.get_groups_for_user(&principal.email);
        Some(principal.with_groups(groups))
    }
}

/// The request's resolved principal, stored in request extensions by the
/// auth middleware.
#[derive(Clone)]
pub struct CurrentPrincipal(pub Option<Principal>);
