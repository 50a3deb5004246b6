//! Signed session cookies
//!
//! The session is serialized to JSON, base64url encoded, and signed with
//! HMAC-SHA256 keyed by the configured session secret:
//!
//! ```text
//! display_relay_session=<base64url(json)>.<base64url(hmac(payload))>
//! ```
//!
//! A cookie that fails to decode or verify is treated as an empty session.

use axum::http::{header, HeaderMap, HeaderValue};
use data_encoding::BASE64URL_NOPAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::SessionConfig;
use crate::models::Session;

type HmacSha256 = Hmac<Sha256>;

/// Name of the session cookie
pub const SESSION_COOKIE_NAME: &str = "display_relay_session";

/// Errors from encoding or decoding a session cookie
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Malformed session cookie")]
    Malformed,

    #[error("Session cookie signature mismatch")]
    BadSignature,

    /// HMAC accepts keys of any length, so `new_from_slice` never produces
    /// this; it only carries the `KeyInit` error type.
    #[error("Invalid signing key: {0}")]
    InvalidKey(#[from] hmac::digest::InvalidLength),

    #[error("Session serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid cookie header: {0}")]
    InvalidHeader(#[from] header::InvalidHeaderValue),
}

/// Encodes, signs, and verifies session cookies
#[derive(Clone)]
pub struct SessionCodec {
    key: Vec<u8>,
    cookie_secure: bool,
}

impl SessionCodec {
    pub fn new(secret: &str, cookie_secure: bool) -> Self {
        Self {
            key: secret.as_bytes().to_vec(),
            cookie_secure,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(&config.secret, config.cookie_secure)
    }

    fn mac(&self) -> Result<HmacSha256, SessionError> {
        Ok(HmacSha256::new_from_slice(&self.key)?)
    }

    /// Serialize and sign a session into a cookie value
    pub fn encode(&self, session: &Session) -> Result<String, SessionError> {
        let payload = BASE64URL_NOPAD.encode(&serde_json::to_vec(session)?);
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = BASE64URL_NOPAD.encode(&mac.finalize().into_bytes());
        Ok(format!("{}.{}", payload, signature))
    }

    /// Verify and deserialize a cookie value
    pub fn decode(&self, value: &str) -> Result<Session, SessionError> {
        let (payload, signature) = value.split_once('.').ok_or(SessionError::Malformed)?;
        let signature = BASE64URL_NOPAD
            .decode(signature.as_bytes())
            .map_err(|_| SessionError::Malformed)?;

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| SessionError::BadSignature)?;

        let json = BASE64URL_NOPAD
            .decode(payload.as_bytes())
            .map_err(|_| SessionError::Malformed)?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// Read the session from request headers, falling back to an empty one
    pub fn from_headers(&self, headers: &HeaderMap) -> Session {
        let Some(value) = extract_session_cookie(headers) else {
            return Session::default();
        };
        match self.decode(&value) {
            Ok(session) => session,
            Err(e) => {
                tracing::debug!("Discarding session cookie: {}", e);
                Session::default()
            }
        }
    }

    /// `Set-Cookie` value storing `session`
    pub fn set_cookie(&self, session: &Session) -> Result<HeaderValue, SessionError> {
        let value = self.encode(session)?;
        let cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax{}",
            SESSION_COOKIE_NAME,
            value,
            self.secure_attribute()
        );
        Ok(HeaderValue::from_str(&cookie)?)
    }

    /// `Set-Cookie` value deleting the session
    pub fn clear_cookie(&self) -> Result<HeaderValue, SessionError> {
        let cookie = format!(
            "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0{}",
            SESSION_COOKIE_NAME,
            self.secure_attribute()
        );
        Ok(HeaderValue::from_str(&cookie)?)
    }

    fn secure_attribute(&self) -> &'static str {
        if self.cookie_secure {
            "; Secure"
        } else {
            ""
        }
    }
}

/// Find the session cookie among the request's `Cookie` headers
fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    let prefix = format!("{}=", SESSION_COOKIE_NAME);
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(str::trim)
        .find_map(|c| c.strip_prefix(prefix.as_str()))
        .filter(|v| !v.is_empty())
        .map(String::from)
}
