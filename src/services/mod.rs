//! Services layer - Business logic
//!
//! This module contains the logic behind the HTTP handlers:
//! - Signed session cookies
//! - Open-redirect protection
//! - The identity provider client
//! - Message formatting and the display client

pub mod identity;
pub mod redirect;
pub mod screen;
pub mod session;

pub use identity::{authorize_url, AccessToken, GitHubProvider, IdentityError, IdentityProvider, Organization};
pub use redirect::is_safe_url;
pub use screen::{format_for_screen, DisplayClient, HttpDisplayClient, OutboundMessage, ScreenError};
pub use session::{SessionCodec, SessionError, SESSION_COOKIE_NAME};

use crate::config::HttpConfig;

/// Shared outbound HTTP client.
///
/// GitHub's API rejects requests without a User-Agent.
pub fn http_client(config: &HttpConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.timeout())
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
}
