//! Router-level tests for the login gate and the message relay

use super::*;
use crate::config::Config;
use crate::models::Session;
use crate::services::{
    AccessToken, DisplayClient, IdentityError, IdentityProvider, Organization, OutboundMessage,
    ScreenError, SessionCodec, SESSION_COOKIE_NAME,
};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, Response, StatusCode},
};
use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

const HOST: &str = "relay.test";
const AUTHORIZE_PREFIX: &str =
    "https://github.com/login/oauth/authorize?scope=read%3Auser&client_id=client-123";

// ============================================================================
// Test doubles
// ============================================================================

/// Identity provider that counts every call
struct MockIdentity {
    scope: String,
    exchange_fails: bool,
    orgs: Result<Vec<&'static str>, u16>,
    revoke_fails: bool,
    exchanges: AtomicUsize,
    org_lookups: AtomicUsize,
    revocations: AtomicUsize,
    revoked: Mutex<Vec<String>>,
}

impl Default for MockIdentity {
    fn default() -> Self {
        Self {
            scope: "user".to_string(),
            exchange_fails: false,
            orgs: Ok(vec!["other-org", "harvard-lil"]),
            revoke_fails: false,
            exchanges: AtomicUsize::new(0),
            org_lookups: AtomicUsize::new(0),
            revocations: AtomicUsize::new(0),
            revoked: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl IdentityProvider for MockIdentity {
    async fn exchange_code(&self, code: &str) -> Result<AccessToken, IdentityError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        if self.exchange_fails {
            return Err(IdentityError::Upstream {
                status: 401,
                message: "Bad credentials".to_string(),
            });
        }
        Ok(AccessToken {
            access_token: format!("token-for-{}", code),
            scope: self.scope.clone(),
        })
    }

    async fn organizations(&self, _access_token: &str) -> Result<Vec<Organization>, IdentityError> {
        self.org_lookups.fetch_add(1, Ordering::SeqCst);
        match &self.orgs {
            Ok(logins) => Ok(logins
                .iter()
                .map(|login| Organization {
                    login: login.to_string(),
                })
                .collect()),
            Err(status) => Err(IdentityError::Upstream {
                status: *status,
                message: "Server Error".to_string(),
            }),
        }
    }

    async fn revoke_token(&self, access_token: &str) -> Result<u16, IdentityError> {
        self.revocations.fetch_add(1, Ordering::SeqCst);
        self.revoked.lock().unwrap().push(access_token.to_string());
        if self.revoke_fails {
            return Err(IdentityError::InvalidResponse("connection reset".to_string()));
        }
        Ok(204)
    }
}

/// Display client that records what it was asked to send
#[derive(Default)]
struct MockDisplay {
    fail_with: Option<u16>,
    sent: Mutex<Vec<OutboundMessage>>,
    calls: AtomicUsize,
}

#[async_trait]
impl DisplayClient for MockDisplay {
    async fn send(&self, message: &OutboundMessage) -> Result<(), ScreenError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(message.clone());
        match self.fail_with {
            Some(status) => Err(ScreenError::Status(status)),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn test_config() -> Config {
    let mut config = Config::default();
    config.oauth.client_id = "client-123".to_string();
    config.oauth.client_secret = "secret".to_string();
    config.oauth.org_name = "harvard-lil".to_string();
    config.session.secret = "test-session-secret".to_string();
    config.screen.url = "http://screen.invalid/messages".to_string();
    config.screen.room = "lobby".to_string();
    config.screen.token = "screen-token".to_string();
    config
}

fn authenticated_session() -> Session {
    let mut session = Session::default();
    session.authenticate(Utc::now(), Duration::minutes(30)).unwrap();
    session
}

struct Harness {
    state: AppState,
    identity: Arc<MockIdentity>,
    display: Arc<MockDisplay>,
}

impl Harness {
    fn new(identity: MockIdentity, display: MockDisplay) -> Self {
        Self::with_config(test_config(), identity, display)
    }

    fn with_config(config: Config, identity: MockIdentity, display: MockDisplay) -> Self {
        let identity = Arc::new(identity);
        let display = Arc::new(display);
        let state = AppState::with_clients(config, identity.clone(), display.clone())
            .expect("state");
        Self {
            state,
            identity,
            display,
        }
    }

    fn with_defaults() -> Self {
        Self::new(MockIdentity::default(), MockDisplay::default())
    }

    fn cookie_for(&self, session: &Session) -> String {
        format!(
            "{}={}",
            SESSION_COOKIE_NAME,
            self.state.sessions.encode(session).unwrap()
        )
    }

    fn logged_in_cookie(&self) -> String {
        self.cookie_for(&authenticated_session())
    }

    async fn send(&self, request: Request<Body>) -> Response<Body> {
        build_router(self.state.clone()).oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().uri(uri).header(header::HOST, HOST);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn post_json(&self, uri: &str, body: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::HOST, HOST)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap()).await
    }

    /// Decode the session a response stores in its Set-Cookie header
    fn session_from(&self, response: &Response<Body>) -> Option<Session> {
        let cookie = response.headers().get(header::SET_COOKIE)?.to_str().ok()?;
        let value = cookie
            .strip_prefix(&format!("{}=", SESSION_COOKIE_NAME))?
            .split(';')
            .next()?;
        self.state.sessions.decode(value).ok()
    }
}

fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
}

async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// ============================================================================
// Login gate
// ============================================================================

#[tokio::test]
async fn test_gate_redirects_anonymous_user_to_provider() {
    let harness = Harness::with_defaults();

    let response = harness.get("/", None).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), AUTHORIZE_PREFIX);
    let session = harness.session_from(&response).expect("session cookie");
    assert!(!session.authenticated);
    assert_eq!(session.redirect_target.as_deref(), Some("http://relay.test/"));
}

#[tokio::test]
async fn test_gate_passes_through_valid_session() {
    let harness = Harness::with_defaults();
    let cookie = harness.logged_in_cookie();

    let response = harness.get("/", Some(&cookie)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    assert!(body_text(response).await.contains("/transmit"));
}

#[tokio::test]
async fn test_gate_rejects_expired_session_even_when_flag_is_set() {
    let harness = Harness::with_defaults();
    let cookie = harness.cookie_for(&Session {
        authenticated: true,
        valid_until: Some(Utc::now() - Duration::minutes(1)),
        redirect_target: None,
    });

    let response = harness.get("/", Some(&cookie)).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(location(&response).starts_with(AUTHORIZE_PREFIX));
}

#[tokio::test]
async fn test_gate_rejects_forged_cookie() {
    let harness = Harness::with_defaults();
    let forged = SessionCodec::new("not-the-server-secret", true)
        .encode(&authenticated_session())
        .unwrap();

    let response = harness
        .get("/", Some(&format!("{}={}", SESSION_COOKIE_NAME, forged)))
        .await;

    assert_eq!(response.status(), StatusCode::FOUND);
}

#[tokio::test]
async fn test_gate_records_requested_path_and_query() {
    let harness = Harness::with_defaults();

    let response = harness.get("/?room=lobby", None).await;

    let session = harness.session_from(&response).unwrap();
    assert_eq!(
        session.redirect_target.as_deref(),
        Some("http://relay.test/?room=lobby")
    );
}

// ============================================================================
// Message relay
// ============================================================================

#[tokio::test]
async fn test_transmit_relays_formatted_message() {
    let harness = Harness::with_defaults();
    let cookie = harness.logged_in_cookie();

    let response = harness
        .post_json("/transmit", r#"{"message": "-- --\nmm"}"#, Some(&cookie))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!({ "status": "okay" }));

    let sent = harness.display.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].raw_text, "-- --\nmm");
    assert_eq!(sent[0].formatted_text, format!("-- --\nmm{}", "\n".repeat(7)));
    assert_eq!(sent[0].target_room, "lobby");
}

#[tokio::test]
async fn test_transmit_empty_message_is_rejected_without_sending() {
    let harness = Harness::with_defaults();
    let cookie = harness.logged_in_cookie();

    let response = harness
        .post_json("/transmit", r#"{"message": ""}"#, Some(&cookie))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(harness.display.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_transmit_missing_or_malformed_message_is_rejected() {
    let harness = Harness::with_defaults();
    let cookie = harness.logged_in_cookie();

    for body in [r#"{}"#, r#"{"message": null}"#, r#"{"message": 42}"#, "not json"] {
        let response = harness.post_json("/transmit", body, Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {}", body);
    }
    assert_eq!(harness.display.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_transmit_display_failure_is_service_unavailable() {
    let harness = Harness::new(
        MockIdentity::default(),
        MockDisplay {
            fail_with: Some(502),
            ..MockDisplay::default()
        },
    );
    let cookie = harness.logged_in_cookie();

    let response = harness
        .post_json("/transmit", r#"{"message": "... --- ...\nsos"}"#, Some(&cookie))
        .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
    // no retry
    assert_eq!(harness.display.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_transmit_requires_login() {
    let harness = Harness::with_defaults();

    let response = harness
        .post_json("/transmit", r#"{"message": "hi"}"#, None)
        .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(harness.display.calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// OAuth callback
// ============================================================================

#[tokio::test]
async fn test_callback_member_gets_authenticated_session() {
    let harness = Harness::with_defaults();
    let before = Utc::now();

    let response = harness.get("/auth/github/callback?code=abc", None).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/");

    let session = harness.session_from(&response).expect("session cookie");
    assert!(session.authenticated);
    assert!(session.redirect_target.is_none());
    let valid_until = session.valid_until.unwrap();
    assert!(valid_until >= before + Duration::minutes(30));
    assert!(valid_until <= Utc::now() + Duration::minutes(30));

    assert_eq!(harness.identity.exchanges.load(Ordering::SeqCst), 1);
    assert_eq!(harness.identity.org_lookups.load(Ordering::SeqCst), 1);
    assert_eq!(harness.identity.revocations.load(Ordering::SeqCst), 1);
    assert_eq!(*harness.identity.revoked.lock().unwrap(), vec!["token-for-abc"]);
}

#[tokio::test]
async fn test_callback_returns_to_recorded_same_host_target() {
    let harness = Harness::with_defaults();
    let mut pending = Session::default();
    pending.redirect_target = Some("http://relay.test/?room=lobby".to_string());
    let cookie = harness.cookie_for(&pending);

    let response = harness
        .get("/auth/github/callback?code=abc", Some(&cookie))
        .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "http://relay.test/?room=lobby");
}

#[tokio::test]
async fn test_callback_ignores_foreign_redirect_target() {
    let harness = Harness::with_defaults();
    for target in ["https://evil.example/", "//evil.example/", "javascript:alert(1)"] {
        let mut pending = Session::default();
        pending.redirect_target = Some(target.to_string());
        let cookie = harness.cookie_for(&pending);

        let response = harness
            .get("/auth/github/callback?code=abc", Some(&cookie))
            .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/", "target {}", target);
    }
}

#[tokio::test]
async fn test_callback_clears_prior_session_state() {
    let harness = Harness::with_defaults();
    let stale = Session {
        authenticated: true,
        valid_until: Some(Utc::now() - Duration::days(1)),
        redirect_target: Some("/".to_string()),
    };
    let cookie = harness.cookie_for(&stale);

    let response = harness
        .get("/auth/github/callback?code=abc", Some(&cookie))
        .await;

    let session = harness.session_from(&response).unwrap();
    assert!(session.is_logged_in(Utc::now()));
    assert!(session.redirect_target.is_none());
}

#[tokio::test]
async fn test_callback_with_out_of_range_expiry_is_server_error() {
    let mut config = test_config();
    config.session.login_expiry_minutes = 1_000_000_000_000;
    let harness = Harness::with_config(config, MockIdentity::default(), MockDisplay::default());

    let response = harness.get("/auth/github/callback?code=abc", None).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(harness.session_from(&response).is_none());
    assert_eq!(harness.identity.revocations.load(Ordering::SeqCst), 1);

    // the server keeps answering
    let response = harness.get("/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_callback_non_member_is_unauthorized() {
    let harness = Harness::new(
        MockIdentity {
            orgs: Ok(vec!["other-org", "Harvard-LIL"]),
            ..MockIdentity::default()
        },
        MockDisplay::default(),
    );

    let response = harness.get("/auth/github/callback?code=abc", None).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(harness.session_from(&response).is_none());
    assert_eq!(harness.identity.revocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_callback_wrong_scope_is_unauthorized() {
    let harness = Harness::new(
        MockIdentity {
            scope: "read:user,user:email".to_string(),
            ..MockIdentity::default()
        },
        MockDisplay::default(),
    );

    let response = harness.get("/auth/github/callback?code=abc", None).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(harness.session_from(&response).is_none());
    assert_eq!(harness.identity.org_lookups.load(Ordering::SeqCst), 0);
    assert_eq!(harness.identity.revocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_callback_failed_token_exchange_is_server_error() {
    let harness = Harness::new(
        MockIdentity {
            exchange_fails: true,
            ..MockIdentity::default()
        },
        MockDisplay::default(),
    );

    let response = harness.get("/auth/github/callback?code=abc", None).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(harness.identity.org_lookups.load(Ordering::SeqCst), 0);
    assert_eq!(harness.identity.revocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_callback_failed_org_lookup_still_revokes() {
    let harness = Harness::new(
        MockIdentity {
            orgs: Err(502),
            ..MockIdentity::default()
        },
        MockDisplay::default(),
    );

    let response = harness.get("/auth/github/callback?code=abc", None).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(harness.session_from(&response).is_none());
    assert_eq!(harness.identity.revocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_callback_revocation_failure_does_not_block_login() {
    let harness = Harness::new(
        MockIdentity {
            revoke_fails: true,
            ..MockIdentity::default()
        },
        MockDisplay::default(),
    );

    let response = harness.get("/auth/github/callback?code=abc", None).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(harness.session_from(&response).unwrap().authenticated);
    assert_eq!(harness.identity.revocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_callback_without_code_is_bad_request() {
    let harness = Harness::with_defaults();

    for uri in ["/auth/github/callback", "/auth/github/callback?code="] {
        let response = harness.get(uri, None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "uri {}", uri);
    }
    assert_eq!(harness.identity.exchanges.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_callback_denied_authorization_is_unauthorized() {
    let harness = Harness::with_defaults();

    let response = harness
        .get("/auth/github/callback?error=access_denied&error_description=denied", None)
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(harness.identity.exchanges.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_provider_callback_alias() {
    let harness = Harness::with_defaults();

    let response = harness.get("/auth/provider/callback?code=abc", None).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(harness.session_from(&response).unwrap().authenticated);
}

// ============================================================================
// Public pages
// ============================================================================

#[tokio::test]
async fn test_login_page_links_to_provider() {
    let harness = Harness::with_defaults();

    let response = harness.get("/login", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("client_id=client-123"));
}

#[tokio::test]
async fn test_logout_clears_session_and_is_idempotent() {
    let harness = Harness::with_defaults();
    let cookie = harness.logged_in_cookie();

    for cookie in [Some(cookie.as_str()), None] {
        let response = harness.get("/logout", cookie).await;
        assert_eq!(response.status(), StatusCode::OK);
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(set_cookie.starts_with(&format!("{}=;", SESSION_COOKIE_NAME)));
        assert!(set_cookie.contains("Max-Age=0"));
        assert!(body_text(response).await.contains("Logged Out"));
    }
}

#[tokio::test]
async fn test_health_is_public() {
    let harness = Harness::with_defaults();

    let response = harness.get("/health", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}
