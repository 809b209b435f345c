//! Session and OAuth-state cookies.

use axum::http::HeaderMap;

pub const SESSION_COOKIE: &str = "pgconsole_token";
pub const OAUTH_STATE_COOKIE: &str = "pgconsole_oauth_state";

/// Ten minutes, the window one OAuth round trip gets.
const OAUTH_STATE_MAX_AGE: i64 = 600;

fn secure_attribute() -> &'static str {
    // Local debug builds run over plain http.
    if cfg!(debug_assertions) { "" } else { "; Secure" }
}

pub fn session_cookie(token: &str, max_age_secs: i64) -> String {
    format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}{}",
        secure_attribute()
    )
}

pub fn clear_session_cookie() -> String {
    format!(
        "{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0{}",
        secure_attribute()
    )
}

pub fn oauth_state_cookie(state: &str) -> String {
    format!(
        "{OAUTH_STATE_COOKIE}={state}; Path=/; HttpOnly; SameSite=Lax; Max-Age={OAUTH_STATE_MAX_AGE}{}",
        secure_attribute()
    )
}

/// Cleared on the same response that consumes the state, success or failure.
pub fn clear_oauth_state_cookie() -> String {
    format!(
        "{OAUTH_STATE_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0{}",
        secure_attribute()
    )
}

/// Pull one cookie value out of the request headers.
pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    for cookie in header.split(';') {
        let cookie = cookie.trim();
        if let Some(value) = cookie.strip_prefix(&format!("{name}=")) {
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::COOKIE;

    #[test]
    fn session_cookie_carries_the_required_attributes() {
        let cookie = session_cookie("abc", 3600);
        assert!(cookie.starts_with("pgconsole_token=abc"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=3600"));
    }

    #[test]
    fn state_cookie_is_short_lived() {
        assert!(oauth_state_cookie("xyz").contains("Max-Age=600"));
        assert!(clear_oauth_state_cookie().contains("Max-Age=0"));
    }

    #[test]
    fn cookies_are_extracted_by_name() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            "other=1; pgconsole_token=tok123; x=y".parse().unwrap(),
        );
        assert_eq!(
            extract_cookie(&headers, SESSION_COOKIE).as_deref(),
            Some("tok123")
        );
        assert_eq!(extract_cookie(&headers, OAUTH_STATE_COOKIE), None);
    }
}
