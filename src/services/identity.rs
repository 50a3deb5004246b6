//! Identity provider client
//!
//! Handles the provider side of the login handshake:
//! - building the authorization redirect
//! - exchanging the callback code for an access token
//! - listing the user's organizations
//! - revoking the token once the organization check is done
//!
//! Endpoints default to GitHub's and are configurable.

use async_trait::async_trait;
use axum::http::header;
use serde::Deserialize;
use url::Url;

use crate::config::OAuthConfig;

/// Access token returned by the code exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub access_token: String,
    /// Granted scope exactly as the provider reported it
    pub scope: String,
}

/// One organization the user belongs to
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Organization {
    pub login: String,
}

/// Errors talking to the identity provider
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Identity provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Identity provider returned status {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("No access token in provider response: {0}")]
    MissingToken(String),

    #[error("Unexpected provider response: {0}")]
    InvalidResponse(String),
}

/// Outbound calls made during the OAuth callback
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange an authorization code for an access token
    async fn exchange_code(&self, code: &str) -> Result<AccessToken, IdentityError>;

    /// Organizations of the user owning `access_token`
    async fn organizations(&self, access_token: &str) -> Result<Vec<Organization>, IdentityError>;

    /// Revoke `access_token`, returning the provider's status code
    async fn revoke_token(&self, access_token: &str) -> Result<u16, IdentityError>;
}

/// Authorization endpoint URL carrying the requested scope and client id
pub fn authorize_url(config: &OAuthConfig) -> Result<String, url::ParseError> {
    let mut url = Url::parse(&config.authorize_url)?;
    url.query_pairs_mut()
        .append_pair("scope", &config.requested_scope)
        .append_pair("client_id", &config.client_id);
    Ok(url.into())
}

/// Token endpoint body, success or failure
#[derive(Debug, Default, Deserialize)]
struct TokenExchangeBody {
    access_token: Option<String>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
}

impl TokenExchangeBody {
    fn provider_message(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.error_description.clone())
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "no message".to_string())
    }
}

/// Pull a human-readable message out of an error body
fn error_message(body: &str) -> String {
    serde_json::from_str::<TokenExchangeBody>(body)
        .map(|b| b.provider_message())
        .unwrap_or_else(|_| {
            if body.trim().is_empty() {
                "no message".to_string()
            } else {
                body.trim().to_string()
            }
        })
}

/// GitHub-compatible identity provider
pub struct GitHubProvider {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    token_url: String,
    api_url: String,
}

impl GitHubProvider {
    pub fn new(client: reqwest::Client, config: &OAuthConfig) -> Self {
        Self {
            client,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token_url: config.token_url.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl IdentityProvider for GitHubProvider {
    async fn exchange_code(&self, code: &str) -> Result<AccessToken, IdentityError> {
        let response = self
            .client
            .post(&self.token_url)
            .header(header::ACCEPT, "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
            ])
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let body: TokenExchangeBody = serde_json::from_str(&text).unwrap_or_default();

        if status != reqwest::StatusCode::OK {
            return Err(IdentityError::Upstream {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        match body.access_token.as_deref() {
            Some(token) if !token.is_empty() => Ok(AccessToken {
                access_token: token.to_string(),
                scope: body.scope.clone().unwrap_or_default(),
            }),
            _ => Err(IdentityError::MissingToken(body.provider_message())),
        }
    }

    async fn organizations(&self, access_token: &str) -> Result<Vec<Organization>, IdentityError> {
        let response = self
            .client
            .get(format!("{}/user/orgs", self.api_url))
            .header(header::ACCEPT, "application/json")
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if status != reqwest::StatusCode::OK {
            return Err(IdentityError::Upstream {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        serde_json::from_str(&text).map_err(|e| IdentityError::InvalidResponse(e.to_string()))
    }

    async fn revoke_token(&self, access_token: &str) -> Result<u16, IdentityError> {
        let response = self
            .client
            .delete(format!("{}/applications/{}/token", self.api_url, self.client_id))
            .header(header::ACCEPT, "application/json")
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .json(&serde_json::json!({ "access_token": access_token }))
            .send()
            .await?;

        Ok(response.status().as_u16())
    }
}
