//! API middleware
//!
//! Contains:
//! - Application state shared by every handler
//! - The JSON error type
//! - The login-required guard wrapping protected routes

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::services::{
    authorize_url, http_client, DisplayClient, GitHubProvider, HttpDisplayClient,
    IdentityProvider, SessionCodec, SessionError,
};
use crate::views::{ViewError, Views};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: SessionCodec,
    pub identity: Arc<dyn IdentityProvider>,
    pub display: Arc<dyn DisplayClient>,
    pub views: Arc<Views>,
}

impl AppState {
    /// Build state with the HTTP-backed provider and display clients
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let client = http_client(&config.http)?;
        let identity = Arc::new(GitHubProvider::new(client.clone(), &config.oauth));
        let display = Arc::new(HttpDisplayClient::new(client, &config.screen));
        Ok(Self::with_clients(config, identity, display)?)
    }

    /// Build state around explicit clients
    pub fn with_clients(
        config: Config,
        identity: Arc<dyn IdentityProvider>,
        display: Arc<dyn DisplayClient>,
    ) -> Result<Self, ViewError> {
        Ok(Self {
            sessions: SessionCodec::from_config(&config.session),
            config: Arc::new(config),
            identity,
            display,
            views: Arc::new(Views::new()?),
        })
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new("SERVICE_UNAVAILABLE", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "SERVICE_UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<ViewError> for ApiError {
    fn from(e: ViewError) -> Self {
        tracing::error!("Page rendering failed: {}", e);
        Self::internal_error("Failed to render page")
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        tracing::error!("Session cookie could not be written: {}", e);
        Self::internal_error("Failed to store session")
    }
}

/// Host the client addressed, as `name` or `name:port`
pub fn request_host(headers: &HeaderMap, uri: &Uri) -> String {
    headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(String::from)
        .or_else(|| uri.authority().map(|a| a.to_string()))
        .unwrap_or_else(|| "localhost".to_string())
}

/// Absolute URL of the current request
pub fn request_url(headers: &HeaderMap, uri: &Uri) -> String {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|h| h.to_str().ok())
        .filter(|p| *p == "https")
        .unwrap_or("http");
    let path = uri.path_and_query().map_or("/", |p| p.as_str());
    format!("{}://{}{}", scheme, request_host(headers, uri), path)
}

/// 302 redirect, optionally setting the session cookie
pub fn found(location: &str, cookie: Option<HeaderValue>) -> Result<Response, ApiError> {
    let location = HeaderValue::from_str(location)
        .map_err(|_| ApiError::internal_error("Invalid redirect location"))?;
    let mut response = StatusCode::FOUND.into_response();
    response.headers_mut().insert(header::LOCATION, location);
    if let Some(cookie) = cookie {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    Ok(response)
}

/// Login-required guard
///
/// Passes the request through untouched when the session is authenticated
/// and unexpired. Otherwise remembers the requested URL in the session and
/// redirects to the identity provider.
pub async fn require_login(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let mut session = state.sessions.from_headers(request.headers());

    if session.is_logged_in(Utc::now()) {
        tracing::debug!("User session valid");
        return Ok(next.run(request).await);
    }

    tracing::debug!("Redirecting to identity provider");
    session.redirect_target = Some(request_url(request.headers(), request.uri()));
    let location = authorize_url(&state.config.oauth).map_err(|e| {
        tracing::error!("Authorization URL is invalid: {}", e);
        ApiError::internal_error("Login is misconfigured")
    })?;
    let cookie = state.sessions.set_cookie(&session)?;
    found(&location, Some(cookie))
}
