//! IAM rule model.
//!
//! Rules are kept in declaration order. Evaluation is a union over matching
//! rules, so order never changes the outcome; it only matters for reporting.

use crate::permission::PermissionSet;

/// Which connections a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionSelector {
    /// `*`
    Any,
    /// A single connection id.
    Id(String),
}

impl ConnectionSelector {
    pub fn matches(&self, connection_id: &str) -> bool {
        match self {
            ConnectionSelector::Any => true,
            ConnectionSelector::Id(id) => id == connection_id,
        }
    }
}

/// One member token: `*`, `user:<email>` or `group:<id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleMember {
    Everyone,
    User(String),
    Group(String),
}

impl RuleMember {
    /// Parse a member token. Returns `None` for anything outside the grammar.
    pub fn parse(token: &str) -> Option<Self> {
        if token == "*" {
            return Some(RuleMember::Everyone);
        }
        if let Some(email) = token.strip_prefix("user:") {
            return (!email.is_empty()).then(|| RuleMember::User(email.to_string()));
        }
        if let Some(group) = token.strip_prefix("group:") {
            return (!group.is_empty()).then(|| RuleMember::Group(group.to_string()));
        }
        None
    }

    /// Whether this member token matches the given principal.
    pub fn matches(&self, email: &str, groups: &[String]) -> bool {
        match self {
            RuleMember::Everyone => true,
            RuleMember::User(e) => e == email,
            RuleMember::Group(g) => groups.iter().any(|member_of| member_of == g),
        }
    }
}

/// A validated IAM rule.
#[derive(Debug, Clone)]
pub struct IamRule {
    pub selector: ConnectionSelector,
    pub permissions: PermissionSet,
    pub members: Vec<RuleMember>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_grammar() {
        assert_eq!(RuleMember::parse("*"), Some(RuleMember::Everyone));
        assert_eq!(
            RuleMember::parse("user:a@example.com"),
            Some(RuleMember::User("a@example.com".into()))
        );
        assert_eq!(
            RuleMember::parse("group:readers"),
            Some(RuleMember::Group("readers".into()))
        );
        assert_eq!(RuleMember::parse("role:nope"), None);
        assert_eq!(RuleMember::parse("user:"), None);
    }

    #[test]
    fn group_membership_matches_by_id() {
        let member = RuleMember::Group("readers".into());
        assert!(member.matches("a@example.com", &["readers".into()]));
        assert!(!member.matches("a@example.com", &["writers".into()]));
    }
}
