//! IAM evaluation.
//!
//! Policy rules grant permission sets to members on connections; evaluation
//! is the union over every matching rule, so rule order never changes the
//! outcome. All checks run before any database work.

use pgconsole_auth::Principal;
use pgconsole_core::{GatewayError, Permission, PermissionSet, Plan, Policy};
use pgconsole_core::license::Feature;
use std::sync::Arc;

/// Evaluates the policy's IAM rules for a fixed plan.
#[derive(Clone)]
pub struct IamEvaluator {
    policy: Arc<Policy>,
    plan: Plan,
}

impl IamEvaluator {
    pub fn new(policy: Arc<Policy>, plan: Plan) -> Self {
        Self { policy, plan }
    }

    /// The permissions `email` holds on `connection_id`.
    ///
    /// Guests (auth disabled) and plans without IAM governance hold the full
    /// set; otherwise the union over every matching rule.
    pub fn permissions_for(&self, email: &str, connection_id: &str) -> PermissionSet {
        if !self.policy.auth_enabled() {
            return PermissionSet::full();
        }
        if !self.plan.permits(Feature::Iam) {
            return PermissionSet::full();
        }

        let groups = self.policy.get_groups_for_user(email);
        let mut granted = PermissionSet::new();
        for rule in self.policy.get_iam_rules() {
            if !rule.selector.matches(connection_id) {
                continue;
            }
            if rule.members.iter().any(|m| m.matches(email, &groups)) {
                granted.extend(&rule.permissions);
            }
        }
        granted
    }

    /// The configured connection ids the principal holds at least one
    /// permission on.
    pub fn accessible_connections(&self, email: &str) -> Vec<String> {
        self.policy
            .get_connections()
            .iter()
            .filter(|conn| !self.permissions_for(email, &conn.id).is_empty())
            .map(|conn| conn.id.clone())
            .collect()
    }

    /// Demand a single permission on a connection.
    pub fn require_permission(
        &self,
        principal: Option<&Principal>,
        connection_id: &str,
        permission: Permission,
    ) -> Result<(), GatewayError> {
        let required: PermissionSet = [permission].into_iter().collect();
        self.require_permissions(principal, connection_id, &required)
    }

    /// Demand a set of permissions, naming every one that is missing.
    pub fn require_permissions(
        &self,
        principal: Option<&Principal>,
        connection_id: &str,
        required: &PermissionSet,
    ) -> Result<(), GatewayError> {
        let principal = principal.ok_or_else(GatewayError::unauthenticated)?;
        let held = self.permissions_for(&principal.email, connection_id);
        let missing = held.missing(required);
        if !missing.is_empty() {
            return Err(GatewayError::permission_denied(&missing));
        }
        Ok(())
    }

    /// Demand at least one permission on the connection.
    ///
    /// An empty grant is reported exactly like a missing connection, so a
    /// caller cannot probe which connection ids exist.
    pub fn require_any_permission(
        &self,
        principal: Option<&Principal>,
        connection_id: &str,
    ) -> Result<PermissionSet, GatewayError> {
        let principal = principal.ok_or_else(GatewayError::unauthenticated)?;
        let held = self.permissions_for(&principal.email, connection_id);
        if held.is_empty() {
            return Err(GatewayError::not_found(format!(
                "connection '{connection_id}'"
            )));
        }
        Ok(held)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgconsole_core::license::PlanTier;
    use pgconsole_core::ErrorCode;
    use pretty_assertions::assert_eq;

    const POLICY: &str = r#"
        [auth]
        jwt_secret = "0123456789abcdef0123456789abcdef"

        [[users]]
        email = "alice@example.com"
        [[users]]
        email = "bob@example.com"
        [[users]]
        email = "carol@example.com"

        [[groups]]
        id = "readers"
        name = "Readers"
        members = ["alice@example.com", "bob@example.com"]

        [[connections]]
        id = "prod"
        name = "Production"
        host = "db.internal"
        database = "app"
        username = "console"

        [[connections]]
        id = "staging"
        name = "Staging"
        host = "db-staging.internal"
        database = "app"
        username = "console"

        [[iam]]
        connection = "prod"
        permissions = ["read"]
        members = ["group:readers"]

        [[iam]]
        connection = "prod"
        permissions = ["write", "explain"]
        members = ["user:alice@example.com"]

        [[iam]]
        connection = "*"
        permissions = ["explain"]
        members = ["user:bob@example.com"]
    "#;

    fn evaluator(tier: PlanTier) -> IamEvaluator {
        let policy = Arc::new(Policy::from_toml(POLICY).unwrap());
        let plan = Plan {
            tier,
            max_users: 100,
            expiry: None,
            email: None,
        };
        IamEvaluator::new(policy, plan)
    }

    fn perms(names: &[Permission]) -> PermissionSet {
        names.iter().copied().collect()
    }

    #[test]
    fn grants_union_over_matching_rules() {
        let iam = evaluator(PlanTier::Team);
        assert_eq!(
            iam.permissions_for("alice@example.com", "prod"),
            perms(&[Permission::Read, Permission::Write, Permission::Explain])
        );
        assert_eq!(
            iam.permissions_for("bob@example.com", "prod"),
            perms(&[Permission::Read, Permission::Explain])
        );
        assert_eq!(
            iam.permissions_for("bob@example.com", "staging"),
            perms(&[Permission::Explain])
        );
    }

    #[test]
    fn evaluation_is_deterministic() {
        let iam = evaluator(PlanTier::Team);
        assert_eq!(
            iam.permissions_for("alice@example.com", "prod"),
            iam.permissions_for("alice@example.com", "prod")
        );
    }

    #[test]
    fn unmatched_principal_gets_nothing() {
        let iam = evaluator(PlanTier::Team);
        assert!(iam.permissions_for("carol@example.com", "prod").is_empty());
        assert!(iam.permissions_for("nobody@example.com", "prod").is_empty());
    }

    #[test]
    fn free_plan_skips_iam_governance() {
        let iam = evaluator(PlanTier::Free);
        assert_eq!(
            iam.permissions_for("carol@example.com", "prod"),
            PermissionSet::full()
        );
    }

    #[test]
    fn guest_mode_grants_everything() {
        let policy = Arc::new(
            Policy::from_toml(
                r#"
                [[connections]]
                id = "prod"
                name = "Production"
                host = "db.internal"
                database = "app"
                username = "console"
                "#,
            )
            .unwrap(),
        );
        let iam = IamEvaluator::new(
            policy,
            Plan {
                tier: PlanTier::Enterprise,
                max_users: 100,
                expiry: None,
                email: None,
            },
        );
        assert_eq!(iam.permissions_for("guest", "prod"), PermissionSet::full());
    }

    #[test]
    fn accessible_connections_filters_by_any_grant() {
        let iam = evaluator(PlanTier::Team);
        assert_eq!(iam.accessible_connections("alice@example.com"), vec!["prod"]);
        assert_eq!(
            iam.accessible_connections("bob@example.com"),
            vec!["prod", "staging"]
        );
        assert!(iam.accessible_connections("carol@example.com").is_empty());
    }

    #[test]
    fn missing_principal_is_unauthenticated() {
        let iam = evaluator(PlanTier::Team);
        let err = iam
            .require_permission(None, "prod", Permission::Read)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthenticated);
    }

    #[test]
    fn denial_names_every_missing_permission() {
        let iam = evaluator(PlanTier::Team);
        let alice = Principal::new("alice@example.com");
        let required = perms(&[Permission::Read, Permission::Ddl, Permission::Admin]);
        let err = iam
            .require_permissions(Some(&alice), "prod", &required)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PermissionDenied);
        assert!(err.message.contains("ddl"));
        assert!(err.message.contains("admin"));
        assert!(!err.message.contains("read"));
    }

    #[test]
    fn zero_grant_connection_is_indistinguishable_from_missing() {
        let iam = evaluator(PlanTier::Team);
        let carol = Principal::new("carol@example.com");
        let on_real = iam.require_any_permission(Some(&carol), "prod").unwrap_err();
        let on_missing = iam.require_any_permission(Some(&carol), "prod2").unwrap_err();
        assert_eq!(on_real.code, ErrorCode::NotFound);
        assert_eq!(on_missing.code, ErrorCode::NotFound);
        // Only the id the caller supplied may differ.
        assert_eq!(
            on_real.message.replace("prod", "X"),
            on_missing.message.replace("prod2", "X")
        );
    }
}
