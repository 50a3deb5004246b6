//! Message relay endpoint
//!
//! POST /transmit - forward a message to the display (requires login)

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState};
use crate::services::OutboundMessage;

/// Request body for a transmission
#[derive(Debug, Deserialize)]
pub struct TransmitRequest {
    #[serde(default)]
    pub message: Option<String>,
}

/// Acknowledgement of a delivered message
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransmitResponse {
    pub status: String,
}

/// POST /transmit
///
/// Empty or missing messages are rejected before anything is sent.
pub async fn transmit(
    State(state): State<AppState>,
    body: Result<Json<TransmitRequest>, JsonRejection>,
) -> Result<Json<TransmitResponse>, ApiError> {
    let message = body
        .ok()
        .and_then(|Json(body)| body.message)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::validation_error("A non-empty message is required"))?;

    let outbound = OutboundMessage::new(message, state.config.screen.room.clone());
    state.display.send(&outbound).await.map_err(|e| {
        tracing::warn!("Communication with screen API failed: {}", e);
        ApiError::service_unavailable("The display could not be reached")
    })?;

    Ok(Json(TransmitResponse {
        status: "okay".to_string(),
    }))
}
