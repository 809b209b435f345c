//! The closed permission vocabulary.
//!
//! Permissions are disjoint, not hierarchical: a request that both reads and
//! performs administration requires `{read, admin}`, and `admin` does not
//! imply anything else.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A single grantable permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
    Ddl,
    Admin,
    Explain,
    Execute,
    Export,
}

impl Permission {
    /// Every permission, in canonical order.
    pub const ALL: [Permission; 7] = [
        Permission::Read,
        Permission::Write,
        Permission::Ddl,
        Permission::Admin,
        Permission::Explain,
        Permission::Execute,
        Permission::Export,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::Ddl => "ddl",
            Permission::Admin => "admin",
            Permission::Explain => "explain",
            Permission::Execute => "execute",
            Permission::Export => "export",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = UnknownPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Permission::Read),
            "write" => Ok(Permission::Write),
            "ddl" => Ok(Permission::Ddl),
            "admin" => Ok(Permission::Admin),
            "explain" => Ok(Permission::Explain),
            "execute" => Ok(Permission::Execute),
            "export" => Ok(Permission::Export),
            other => Err(UnknownPermission(other.to_string())),
        }
    }
}

/// Error for a permission name outside the closed set.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown permission '{0}'")]
pub struct UnknownPermission(pub String);

/// An unordered set of permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full set, as granted to guests and owners of ungoverned plans.
    pub fn full() -> Self {
        Self(Permission::ALL.into_iter().collect())
    }

    pub fn insert(&mut self, permission: Permission) {
        self.0.insert(permission);
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.0.iter().copied()
    }

    /// In-place union.
    pub fn extend(&mut self, other: &PermissionSet) {
        self.0.extend(other.iter());
    }

    /// The permissions in `required` that this set lacks.
    pub fn missing(&self, required: &PermissionSet) -> PermissionSet {
        PermissionSet(required.0.difference(&self.0).copied().collect())
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = Permission>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(Permission::as_str).collect();
        f.write_str(&names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissions_are_disjoint() {
        let mut set = PermissionSet::new();
        set.insert(Permission::Admin);
        assert!(!set.contains(Permission::Read));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn missing_reports_every_gap() {
        let held: PermissionSet = [Permission::Read].into_iter().collect();
        let required: PermissionSet = [Permission::Read, Permission::Ddl, Permission::Admin]
            .into_iter()
            .collect();
        let missing = held.missing(&required);
        assert_eq!(missing.to_string(), "ddl, admin");
    }

    #[test]
    fn full_set_has_all_seven() {
        assert_eq!(PermissionSet::full().len(), 7);
    }

    #[test]
    fn wire_names_are_lowercase() {
        let json = serde_json::to_string(&Permission::Ddl).unwrap();
        assert_eq!(json, "\"ddl\"");
    }
}
