//! Display screen relay
//!
//! Messages arrive as two lines (morse, then plain text) and are padded with
//! trailing newlines so they sit vertically centered on the screen, which
//! shows 8 lines of roughly 24 characters.

use async_trait::async_trait;
use axum::http::header;
use serde::Serialize;

use crate::config::ScreenConfig;

/// Upper length bounds (exclusive) and the newlines appended below each
const PADDING_BRACKETS: [(usize, usize); 7] = [
    (24, 7),
    (48, 6),
    (72, 5),
    (96, 4),
    (120, 3),
    (142, 2),
    (164, 1),
];

/// Number of trailing newlines for a message of `len` characters
pub fn trailing_newlines(len: usize) -> usize {
    PADDING_BRACKETS
        .iter()
        .find(|(limit, _)| len < *limit)
        .map_or(0, |(_, newlines)| *newlines)
}

/// Pad a message so it renders centered on the display.
///
/// Length is counted in characters, newline included. Messages of 164
/// characters or more are returned unchanged.
pub fn format_for_screen(message: &str) -> String {
    let newlines = trailing_newlines(message.chars().count());
    let mut formatted = String::with_capacity(message.len() + newlines);
    formatted.push_str(message);
    formatted.extend(std::iter::repeat('\n').take(newlines));
    formatted
}

/// A message on its way to the display endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    #[serde(skip)]
    pub raw_text: String,
    #[serde(rename = "message")]
    pub formatted_text: String,
    #[serde(rename = "room_name")]
    pub target_room: String,
}

impl OutboundMessage {
    pub fn new(raw_text: impl Into<String>, target_room: impl Into<String>) -> Self {
        let raw_text = raw_text.into();
        Self {
            formatted_text: format_for_screen(&raw_text),
            raw_text,
            target_room: target_room.into(),
        }
    }
}

/// Errors talking to the display endpoint
#[derive(Debug, thiserror::Error)]
pub enum ScreenError {
    #[error("Display endpoint unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Display endpoint returned status {0}")]
    Status(u16),
}

/// Sends formatted messages to the display
#[async_trait]
pub trait DisplayClient: Send + Sync {
    /// Deliver one message; no retries
    async fn send(&self, message: &OutboundMessage) -> Result<(), ScreenError>;
}

/// reqwest-based display client
pub struct HttpDisplayClient {
    client: reqwest::Client,
    url: String,
    authorization: String,
}

impl HttpDisplayClient {
    pub fn new(client: reqwest::Client, config: &ScreenConfig) -> Self {
        Self {
            client,
            url: config.url.clone(),
            authorization: format!("{} {}", config.auth_scheme, config.token),
        }
    }
}

#[async_trait]
impl DisplayClient for HttpDisplayClient {
    async fn send(&self, message: &OutboundMessage) -> Result<(), ScreenError> {
        let response = self
            .client
            .post(&self.url)
            .header(header::AUTHORIZATION, &self.authorization)
            .json(message)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScreenError::Status(status.as_u16()));
        }
        Ok(())
    }
}
