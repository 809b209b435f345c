//! Password verification.

use subtle::ConstantTimeEq;

/// Compare a supplied password against the configured one in constant time.
///
/// A user without a configured password can never log in this way.
pub fn verify_password(configured: Option<&str>, supplied: &str) -> bool {
    let Some(configured) = configured else {
        return false;
    };
    configured.as_bytes().ct_eq(supplied.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_password_is_accepted() {
        assert!(verify_password(Some("hunter2hunter2"), "hunter2hunter2"));
    }

    #[test]
    fn wrong_password_is_rejected() {
        assert!(!verify_password(Some("hunter2hunter2"), "hunter3hunter3"));
        assert!(!verify_password(Some("hunter2hunter2"), ""));
        assert!(!verify_password(Some("hunter2hunter2"), "hunter2hunter2x"));
    }

    #[test]
    fn user_without_password_cannot_log_in() {
        assert!(!verify_password(None, "anything"));
        assert!(!verify_password(None, ""));
    }
}
