//! Identity and sessions.
//!
//! Authentication produces a [`Principal`]; a signed session token carries it
//! between requests. Password logins compare declared credentials in
//! constant time; OIDC logins run the code flow against Google, Keycloak or
//! Okta and map the userinfo email back onto a configured user.

pub mod oidc;
pub mod password;
pub mod principal;
pub mod token;

pub use oidc::{OidcError, OidcLogin, OidcUserInfo};
pub use password::verify_password;
pub use principal::Principal;
pub use token::{parse_signin_expiry, SessionClaims, TokenService, DEFAULT_SIGNIN_EXPIRY_SECS};
