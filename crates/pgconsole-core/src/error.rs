//! Gateway-wide error taxonomy.
//!
//! Every RPC-visible failure carries one of the closed status codes plus a
//! human-readable message. Authorization failures are raised before any
//! database work; database-side failures are delivered inside the result
//! stream instead (see the broker crate).

use crate::permission::PermissionSet;
use serde::Serialize;
use std::fmt;

/// Status codes exposed on the RPC surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// A required argument is missing or malformed.
    InvalidArgument,
    /// No principal could be resolved for the request.
    Unauthenticated,
    /// The principal lacks a permission the request needs.
    PermissionDenied,
    /// The target does not exist, or the caller may not learn whether it does.
    NotFound,
    /// The upstream database cannot be reached.
    Unavailable,
    /// An unexpected internal failure.
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "invalid_argument",
            ErrorCode::Unauthenticated => "unauthenticated",
            ErrorCode::PermissionDenied => "permission_denied",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Unavailable => "unavailable",
            ErrorCode::Internal => "internal",
        }
    }
}

/// An error suitable for returning to the client.
#[derive(Debug, Clone, thiserror::Error)]
pub struct GatewayError {
    pub code: ErrorCode,
    pub message: String,
}

impl GatewayError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unauthenticated() -> Self {
        Self::new(ErrorCode::Unauthenticated, "authentication required")
    }

    /// Names every missing permission so the client can explain the denial.
    pub fn permission_denied(missing: &PermissionSet) -> Self {
        Self::new(
            ErrorCode::PermissionDenied,
            format!("missing permission: {missing}"),
        )
    }

    pub fn not_found(what: impl fmt::Display) -> Self {
        Self::new(ErrorCode::NotFound, format!("{what} not found"))
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::Permission;

    #[test]
    fn denied_error_names_missing_permissions() {
        let missing: PermissionSet = [Permission::Ddl].into_iter().collect();
        let err = GatewayError::permission_denied(&missing);
        assert_eq!(err.code, ErrorCode::PermissionDenied);
        assert!(err.message.contains("ddl"));
    }

    #[test]
    fn not_found_reads_naturally() {
        let err = GatewayError::not_found("connection 'prod'");
        assert_eq!(err.to_string(), "not_found: connection 'prod' not found");
    }
}
