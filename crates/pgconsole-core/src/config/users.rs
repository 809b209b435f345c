//! User, group and label declarations.

use serde::{Deserialize, Serialize};

/// One declared console user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub email: String,

    /// Absent means the user cannot log in with a password (OIDC only).
    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub owner: bool,
}

/// A named group of users, referenced from IAM rules by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    pub id: String,
    pub name: String,

    /// Member emails. Membership is by email string, never by reference.
    #[serde(default)]
    pub members: Vec<String>,
}

impl GroupConfig {
    pub fn has_member(&self, email: &str) -> bool {
        self.members.iter().any(|m| m == email)
    }
}

/// A connection label (display metadata only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    pub id: String,
    pub name: String,

    /// `#rgb` or `#rrggbb`.
    pub color: String,
}
