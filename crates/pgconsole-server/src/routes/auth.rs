//! Authentication endpoints.

use crate::cookies::{
    clear_oauth_state_cookie, clear_session_cookie, extract_cookie, oauth_state_cookie,
    session_cookie, OAUTH_STATE_COOKIE,
};
use crate::error::RpcError;
use crate::state::{AppState, CurrentPrincipal};
use axum::{
    extract::{Extension, Path, Query},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use pgconsole_audit::AuditRecord;
use pgconsole_auth::{verify_password, OidcError, Principal};
use pgconsole_core::{ErrorCode, GatewayError, ProviderType};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub fn router() -> Router {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/session", get(session))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/providers", get(providers))
        .route("/api/auth/{provider}", get(oauth_start))
        .route("/api/auth/{provider}/callback", get(oauth_callback))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

async fn login(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, RpcError> {
    let Some(tokens) = &state.tokens else {
        return Err(GatewayError::invalid_argument("authentication is not enabled").into());
    };

    let user = state.policy.get_user_by_email(&req.email);
    let ok = user
        .map(|u| verify_password(u.password.as_deref(), &req.password))
        .unwrap_or(false);
    if !ok {
        return Err(GatewayError::new(
            ErrorCode::Unauthenticated,
            "invalid email or password",
        )
        .into());
    }

    let principal = Principal::new(&req.email)
        .with_groups(state.policy.get_groups_for_user(&req.email));
    let token = tokens
        .create(&principal)
        .map_err(|e| GatewayError::internal(e.to_string()))?;

    append_audit(&state, AuditRecord::login(&principal.email)).await;

    Ok((
        [(header::SET_COOKIE, session_cookie(&token, tokens.expiry_secs()))],
        Json(json!({ "principal": principal })),
    )
        .into_response())
}

async fn session(
    Extension(CurrentPrincipal(principal)): Extension<CurrentPrincipal>,
) -> Result<Json<serde_json::Value>, RpcError> {
    match principal {
        Some(principal) => Ok(Json(json!({ "principal": principal }))),
        None => Err(GatewayError::unauthenticated().into()),
    }
}

async fn logout(
    Extension(state): Extension<Arc<AppState>>,
    Extension(CurrentPrincipal(principal)): Extension<CurrentPrincipal>,
) -> Response {
    if let Some(principal) = &principal {
        append_audit(&state, AuditRecord::logout(&principal.email)).await;
    }
    (
        [(header::SET_COOKIE, clear_session_cookie())],
        Json(json!({ "ok": true })),
    )
        .into_response()
}

async fn providers(Extension(state): Extension<Arc<AppState>>) -> Json<serde_json::Value> {
    let providers: Vec<serde_json::Value> = state
        .policy
        .get_auth_config()
        .map(|auth| auth.providers.as_slice())
        .unwrap_or_default()
        .iter()
        .map(|provider| {
            let feature = provider.kind.required_feature();
            let permitted = state.plan.permits(feature);
            let mut entry = json!({
                "type": provider.kind.as_str(),
                "enabled": permitted,
            });
            if !permitted {
                entry["required_plan"] = json!(feature.minimum_plan().as_str());
            }
            entry
        })
        .collect();

    Json(json!({
        "auth_enabled": state.auth_enabled(),
        "providers": providers,
    }))
}

async fn oauth_start(
    Extension(state): Extension<Arc<AppState>>,
    Path(provider): Path<String>,
) -> Response {
    let Some(kind) = ProviderType::parse(&provider) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if !state.plan.permits(kind.required_feature()) {
        return RpcError(GatewayError::new(
            ErrorCode::PermissionDenied,
            format!(
                "{} sign-in requires the {} plan",
                kind.as_str(),
                kind.required_feature().minimum_plan().as_str()
            ),
        ))
        .into_response();
    }
    let Some(login) = state.oidc.get(&kind) else {
        return signin_error(OidcError::NotConfigured.kind());
    };

    let (url, oauth_state) = login.authorize_redirect();
    (
        [(header::SET_COOKIE, oauth_state_cookie(&oauth_state))],
        Redirect::temporary(&url),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

async fn oauth_callback(
    Extension(state): Extension<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(kind) = ProviderType::parse(&provider) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match complete_callback(&state, kind, query, &headers).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(provider = kind.as_str(), %err, "OAuth sign-in failed");
            signin_error(err.kind())
        }
    }
}

async fn complete_callback(
    state: &Arc<AppState>,
    kind: ProviderType,
    query: CallbackQuery,
    headers: &HeaderMap,
) -> Result<Response, OidcError> {
    if let Some(error) = query.error {
        return Err(OidcError::Provider(error));
    }
    if !state.plan.permits(kind.required_feature()) {
        return Err(OidcError::NotConfigured);
    }
    let login = state.oidc.get(&kind).ok_or(OidcError::NotConfigured)?;

    let saved_state = extract_cookie(headers, OAUTH_STATE_COOKIE).unwrap_or_default();
    let returned_state = query.state.unwrap_or_default();
    let code = query.code.unwrap_or_default();
    if code.is_empty() {
        return Err(OidcError::NoCode);
    }

    let info = login.complete(&code, &returned_state, &saved_state).await?;
    let email = info.email.unwrap_or_default();

    if state.policy.get_user_by_email(&email).is_none() {
        return Err(OidcError::UserNotAllowed(email));
    }

    let mut principal = Principal::new(&email)
        .with_identity_provider(kind)
        .with_groups(state.policy.get_groups_for_user(&email));
    if let Some(name) = info.name {
        principal = principal.with_display_name(name);
    }
    if let Some(picture) = info.picture {
        principal = principal.with_avatar_url(picture);
    }

    let tokens = state.tokens.as_ref().ok_or(OidcError::NotConfigured)?;
    let token = tokens
        .create(&principal)
        .map_err(|e| OidcError::Provider(e.to_string()))?;

    append_audit(state, AuditRecord::login(&principal.email)).await;

    Ok((
        [
            (header::SET_COOKIE, session_cookie(&token, tokens.expiry_secs())),
            (header::SET_COOKIE, clear_oauth_state_cookie()),
        ],
        Redirect::temporary("/"),
    )
        .into_response())
}

/// Redirect to the canonical signin page, clearing the state cookie on the
/// same response.
fn signin_error(kind: &str) -> Response {
    (
        [(header::SET_COOKIE, clear_oauth_state_cookie())],
        Redirect::temporary(&format!("/signin?error={}", urlencoding::encode(kind))),
    )
        .into_response()
}

async fn append_audit(state: &Arc<AppState>, record: AuditRecord) {
    if let Err(err) = state.audit.append(record).await {
        tracing::warn!(%err, "failed to append audit record");
    }
}
