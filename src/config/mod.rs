//! Configuration management
//!
//! This module handles loading and parsing configuration for the display relay.
//! Configuration can be loaded from:
//! - config.yml file (optional)
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults. Credentials have
//! no defaults and are checked by [`Config::validate`] before the server starts.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config.yml";

/// Environment variable that points at an alternative configuration file
pub const CONFIG_PATH_ENV: &str = "DISPLAY_RELAY_CONFIG";

const REDACTED: &str = "[redacted]";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Identity provider (OAuth) configuration
    #[serde(default)]
    pub oauth: OAuthConfig,
    /// Session cookie configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// Display endpoint configuration
    #[serde(default)]
    pub screen: ScreenConfig,
    /// Outbound HTTP client configuration
    #[serde(default)]
    pub http: HttpConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Identity provider configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// OAuth application client id
    #[serde(default)]
    pub client_id: String,
    /// OAuth application client secret
    #[serde(default)]
    pub client_secret: String,
    /// Organization whose members may log in (case-sensitive)
    #[serde(default)]
    pub org_name: String,
    /// Authorization endpoint users are redirected to
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
    /// Endpoint exchanging an authorization code for an access token
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// REST API base URL (organization list, token revocation)
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Scope requested in the authorization redirect
    #[serde(default = "default_requested_scope")]
    pub requested_scope: String,
    /// Scope the token exchange must report, compared as an exact string
    #[serde(default = "default_required_scope")]
    pub required_scope: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            org_name: String::new(),
            authorize_url: default_authorize_url(),
            token_url: default_token_url(),
            api_url: default_api_url(),
            requested_scope: default_requested_scope(),
            required_scope: default_required_scope(),
        }
    }
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &REDACTED)
            .field("org_name", &self.org_name)
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .field("api_url", &self.api_url)
            .field("requested_scope", &self.requested_scope)
            .field("required_scope", &self.required_scope)
            .finish()
    }
}

fn default_authorize_url() -> String {
    "https://github.com/login/oauth/authorize".to_string()
}

fn default_token_url() -> String {
    "https://github.com/login/oauth/access_token".to_string()
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_requested_scope() -> String {
    "read:user".to_string()
}

fn default_required_scope() -> String {
    "user".to_string()
}

/// Session cookie configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Key used to sign the session cookie
    #[serde(default)]
    pub secret: String,
    /// Whether the cookie carries the `Secure` attribute
    #[serde(default = "default_cookie_secure")]
    pub cookie_secure: bool,
    /// How long a login stays valid, in minutes
    #[serde(default = "default_login_expiry_minutes")]
    pub login_expiry_minutes: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            cookie_secure: default_cookie_secure(),
            login_expiry_minutes: default_login_expiry_minutes(),
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &REDACTED)
            .field("cookie_secure", &self.cookie_secure)
            .field("login_expiry_minutes", &self.login_expiry_minutes)
            .finish()
    }
}

impl SessionConfig {
    /// Login expiry window as a duration, `None` when out of range
    pub fn login_expiry(&self) -> Option<Duration> {
        Duration::try_minutes(self.login_expiry_minutes)
    }
}

fn default_cookie_secure() -> bool {
    true
}

/// Longest accepted login window: one year
pub const MAX_LOGIN_EXPIRY_MINUTES: i64 = 365 * 24 * 60;

fn default_login_expiry_minutes() -> i64 {
    30
}

/// Display endpoint configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct ScreenConfig {
    /// URL messages are posted to
    #[serde(default)]
    pub url: String,
    /// Room identifier sent with every message
    #[serde(default)]
    pub room: String,
    /// Token sent in the Authorization header
    #[serde(default)]
    pub token: String,
    /// Authorization scheme placed before the token
    #[serde(default = "default_auth_scheme")]
    pub auth_scheme: String,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            room: String::new(),
            token: String::new(),
            auth_scheme: default_auth_scheme(),
        }
    }
}

impl fmt::Debug for ScreenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScreenConfig")
            .field("url", &self.url)
            .field("room", &self.room)
            .field("token", &REDACTED)
            .field("auth_scheme", &self.auth_scheme)
            .finish()
    }
}

fn default_auth_scheme() -> String {
    "Bearer".to_string()
}

/// Outbound HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Timeout applied to every outbound request, in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds)
    }
}

fn default_timeout_seconds() -> u64 {
    10
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    /// Level as a `tracing` filter directive.
    ///
    /// Accepts the `logging` module spellings (`WARNING`, `CRITICAL`) as well.
    pub fn filter_directive(&self) -> String {
        let level = self.level.trim().to_lowercase();
        match level.as_str() {
            "warning" => "warn".to_string(),
            "critical" | "fatal" => "error".to_string(),
            "" => default_log_level(),
            _ => level,
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist or is empty, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern `DISPLAY_RELAY_<SECTION>_<FIELD>`,
    /// e.g. `DISPLAY_RELAY_OAUTH_CLIENT_ID` or `DISPLAY_RELAY_SCREEN_URL`.
    pub fn load_with_env(path: &Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Resolve the config path from the environment, load it, and validate.
    pub fn from_env() -> anyhow::Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        let config = Self::load_with_env(&path)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let string_fields: [(&str, &mut String); 15] = [
            ("DISPLAY_RELAY_SERVER_HOST", &mut self.server.host),
            ("DISPLAY_RELAY_OAUTH_CLIENT_ID", &mut self.oauth.client_id),
            ("DISPLAY_RELAY_OAUTH_CLIENT_SECRET", &mut self.oauth.client_secret),
            ("DISPLAY_RELAY_OAUTH_ORG_NAME", &mut self.oauth.org_name),
            ("DISPLAY_RELAY_OAUTH_AUTHORIZE_URL", &mut self.oauth.authorize_url),
            ("DISPLAY_RELAY_OAUTH_TOKEN_URL", &mut self.oauth.token_url),
            ("DISPLAY_RELAY_OAUTH_API_URL", &mut self.oauth.api_url),
            ("DISPLAY_RELAY_OAUTH_REQUESTED_SCOPE", &mut self.oauth.requested_scope),
            ("DISPLAY_RELAY_OAUTH_REQUIRED_SCOPE", &mut self.oauth.required_scope),
            ("DISPLAY_RELAY_SESSION_SECRET", &mut self.session.secret),
            ("DISPLAY_RELAY_SCREEN_URL", &mut self.screen.url),
            ("DISPLAY_RELAY_SCREEN_ROOM", &mut self.screen.room),
            ("DISPLAY_RELAY_SCREEN_TOKEN", &mut self.screen.token),
            ("DISPLAY_RELAY_SCREEN_AUTH_SCHEME", &mut self.screen.auth_scheme),
            ("DISPLAY_RELAY_LOG_LEVEL", &mut self.logging.level),
        ];
        for (key, field) in string_fields {
            if let Some(value) = lookup(key) {
                *field = value;
            }
        }

        if let Some(port) = lookup("DISPLAY_RELAY_SERVER_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(secure) = lookup("DISPLAY_RELAY_SESSION_COOKIE_SECURE").and_then(|v| parse_bool(&v)) {
            self.session.cookie_secure = secure;
        }
        if let Some(minutes) = lookup("DISPLAY_RELAY_SESSION_LOGIN_EXPIRY_MINUTES").and_then(|v| v.parse().ok()) {
            self.session.login_expiry_minutes = minutes;
        }
        if let Some(seconds) = lookup("DISPLAY_RELAY_HTTP_TIMEOUT_SECONDS").and_then(|v| v.parse().ok()) {
            self.http.timeout_seconds = seconds;
        }
    }

    /// Check that every credential is present and numeric settings are usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("oauth.client_id", &self.oauth.client_id),
            ("oauth.client_secret", &self.oauth.client_secret),
            ("oauth.org_name", &self.oauth.org_name),
            ("session.secret", &self.session.secret),
            ("screen.url", &self.screen.url),
            ("screen.room", &self.screen.room),
            ("screen.token", &self.screen.token),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }

        if !(1..=MAX_LOGIN_EXPIRY_MINUTES).contains(&self.session.login_expiry_minutes) {
            return Err(ConfigError::ValidationError(format!(
                "session.login_expiry_minutes must be between 1 and {}",
                MAX_LOGIN_EXPIRY_MINUTES
            )));
        }
        if self.http.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "http.timeout_seconds must be positive".to_string(),
            ));
        }

        for (name, value) in [
            ("oauth.authorize_url", &self.oauth.authorize_url),
            ("oauth.token_url", &self.oauth.token_url),
            ("oauth.api_url", &self.oauth.api_url),
            ("screen.url", &self.screen.url),
        ] {
            url::Url::parse(value).map_err(|e| {
                ConfigError::ValidationError(format!("{} is not a valid URL: {}", name, e))
            })?;
        }

        Ok(())
    }
}

/// Parse a boolean the way operators tend to write them in env files
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}
