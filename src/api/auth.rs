//! Authentication endpoints
//!
//! - GET /login - Login page linking into the provider's authorization flow
//! - GET /logout - Clear the session
//! - GET /auth/github/callback - OAuth redirect target
//!
//! The callback exchanges the code for a token, requires the expected scope,
//! checks organization membership, revokes the token, and only then
//! establishes the session.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, Uri},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use serde::Deserialize;

use crate::api::middleware::{found, request_host, ApiError, AppState};
use crate::services::{authorize_url, is_safe_url, AccessToken};

/// Where users land after logging in when no safe target was recorded
const DEFAULT_LANDING: &str = "/";

/// Build the public auth router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login))
        .route("/logout", get(logout))
        .route("/auth/github/callback", get(callback))
        .route("/auth/provider/callback", get(callback))
}

/// Query parameters the provider sends to the callback
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// GET /login
async fn login(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let url = authorize_url(&state.config.oauth).map_err(|e| {
        tracing::error!("Authorization URL is invalid: {}", e);
        ApiError::internal_error("Login is misconfigured")
    })?;
    Ok(Html(state.views.login(&url)?))
}

/// GET /logout
///
/// Safe to call without a session.
async fn logout(State(state): State<AppState>) -> Result<Response, ApiError> {
    let page = state
        .views
        .generic("Logged Out", "You have successfully been logged out.")?;
    let cookie = state.sessions.clear_cookie()?;
    Ok(([(header::SET_COOKIE, cookie)], Html(page)).into_response())
}

/// GET /auth/github/callback
async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, ApiError> {
    if let Some(error) = query.error {
        tracing::warn!(
            "Provider refused authorization: {} ({})",
            error,
            query.error_description.as_deref().unwrap_or("no description")
        );
        return Err(ApiError::unauthorized("Authorization was not granted"));
    }

    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::validation_error("Missing authorization code"))?;

    tracing::debug!("Requesting access token");
    let token = state.identity.exchange_code(&code).await.map_err(|e| {
        tracing::error!("Failed request for access token. Provider says: {}", e);
        ApiError::internal_error("Failed to obtain access token")
    })?;
    tracing::debug!("Received access token");

    let oauth = &state.config.oauth;
    if token.scope != oauth.required_scope {
        tracing::warn!(
            "Insufficient scope authorized ({:?}, expected {:?}); verify the provider API hasn't changed",
            token.scope,
            oauth.required_scope
        );
        revoke(&state, &token).await;
        return Err(ApiError::unauthorized("Insufficient scope"));
    }

    tracing::debug!("Requesting user organization info");
    let organizations = state.identity.organizations(&token.access_token).await;
    revoke(&state, &token).await;

    let organizations = organizations.map_err(|e| {
        tracing::error!("Failed request for user orgs. Provider says: {}", e);
        ApiError::internal_error("Failed to fetch organization membership")
    })?;

    if !organizations.iter().any(|org| org.login == oauth.org_name) {
        tracing::warn!(
            "Log in attempt from user who is not a member of {}",
            oauth.org_name
        );
        return Err(ApiError::unauthorized("Not a member of the required organization"));
    }

    let mut session = state.sessions.from_headers(&headers);
    let redirect_target = session.redirect_target.take();
    let valid_until = state
        .config
        .session
        .login_expiry()
        .and_then(|expiry| session.authenticate(Utc::now(), expiry))
        .ok_or_else(|| {
            tracing::error!(
                "Login expiry of {} minutes is out of range",
                state.config.session.login_expiry_minutes
            );
            ApiError::internal_error("Login is misconfigured")
        })?;
    tracing::debug!("Session valid until {}", valid_until);
    let cookie = state.sessions.set_cookie(&session)?;

    let host = request_host(&headers, &uri);
    let location = match redirect_target {
        Some(target) if is_safe_url(&host, &target) => target,
        Some(target) => {
            tracing::warn!("Ignoring unsafe post-login redirect to {}", target);
            DEFAULT_LANDING.to_string()
        }
        None => DEFAULT_LANDING.to_string(),
    };
    found(&location, Some(cookie))
}

/// Revoke the access token; failures are logged and otherwise ignored
async fn revoke(state: &AppState, token: &AccessToken) {
    tracing::debug!("Revoking provider access token");
    match state.identity.revoke_token(&token.access_token).await {
        Ok(status) => tracing::debug!("(Revocation returned {})", status),
        Err(e) => tracing::warn!("Token revocation failed: {}", e),
    }
}
