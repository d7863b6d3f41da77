// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers.

use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use relay_core::{
    AckOutcome, BackendIdentity, Destination, InboundMessage, LeasedDelivery, NackOutcome,
    RelayError, SendReceipt,
};
use relay_lease::LeaseRequest;

use crate::error::ApiError;
use crate::server::{GatewayState, HealthState};

/// Response body for GET /v1/health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
}

/// Request body for POST /v1/messages/lease. Omitted fields use configured defaults.
#[derive(Debug, Default, Deserialize)]
pub struct LeaseBody {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default, alias = "leaseSeconds")]
    pub lease_seconds: Option<u32>,
    /// Attach earlier messages of each leased message's conversation.
    #[serde(default, alias = "includeConversationHistory")]
    pub include_conversation_history: bool,
    #[serde(default, alias = "conversationHistoryLimit")]
    pub conversation_history_limit: Option<u32>,
}

/// One leased delivery as seen by a backend.
#[derive(Debug, Serialize)]
pub struct LeaseItem {
    pub delivery_id: String,
    pub lease_id: String,
    pub backend_bot_id: String,
    pub chat_bot_id: String,
    pub attempts: u32,
    pub message: InboundMessage,
    pub lease_expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_history: Option<Vec<InboundMessage>>,
}

impl From<LeasedDelivery> for LeaseItem {
    fn from(leased: LeasedDelivery) -> Self {
        let LeasedDelivery { delivery, message } = leased;
        Self {
            delivery_id: delivery.id,
            lease_id: delivery.lease_id.unwrap_or_default(),
            backend_bot_id: delivery.backend_bot_id,
            chat_bot_id: message.chat_bot_id.clone(),
            attempts: delivery.attempts,
            message,
            lease_expires_at: delivery.lease_expires_at,
            conversation_history: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LeaseResponse {
    pub messages: Vec<LeaseItem>,
}

#[derive(Debug, Deserialize)]
pub struct AckBody {
    #[serde(alias = "leaseId")]
    pub lease_id: String,
    #[serde(alias = "deliveryIds")]
    pub delivery_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct NackBody {
    #[serde(alias = "leaseId")]
    pub lease_id: String,
    #[serde(alias = "deliveryIds")]
    pub delivery_ids: Vec<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendBody {
    #[serde(alias = "chatBotId")]
    pub chat_bot_id: String,
    pub destination: Destination,
    pub content: String,
    #[serde(default, alias = "replyToId")]
    pub reply_to_id: Option<String>,
}

/// GET /v1/health
pub async fn get_health(State(health): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: health.start_time.elapsed().as_secs(),
    })
}

/// GET /metrics
///
/// Prometheus text format, or 404 when metrics are disabled.
pub async fn get_metrics(State(health): State<HealthState>) -> Response {
    match &health.prometheus_render {
        Some(render) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /v1/whoami
pub async fn get_whoami(Extension(identity): Extension<BackendIdentity>) -> Json<BackendIdentity> {
    Json(identity)
}

/// POST /v1/messages/lease
///
/// With `include_conversation_history`, every item carries up to
/// `conversation_history_limit` earlier messages of its channel or DM thread.
pub async fn post_lease(
    State(state): State<GatewayState>,
    Extension(identity): Extension<BackendIdentity>,
    body: Result<Json<LeaseBody>, JsonRejection>,
) -> Result<Json<LeaseResponse>, ApiError> {
    let Json(body) = body?;
    let history_limit = state.lease.history_limit(body.conversation_history_limit)?;
    let leased = state
        .lease
        .lease(
            &identity.id,
            LeaseRequest {
                limit: body.limit,
                lease_seconds: body.lease_seconds,
            },
        )
        .await?;

    let mut messages: Vec<LeaseItem> = leased.into_iter().map(LeaseItem::from).collect();
    if body.include_conversation_history {
        for item in &mut messages {
            let history = state
                .lease
                .conversation_history(&item.message, history_limit)
                .await?;
            item.conversation_history = Some(history);
        }
    }

    Ok(Json(LeaseResponse { messages }))
}

/// POST /v1/messages/ack
pub async fn post_ack(
    State(state): State<GatewayState>,
    Extension(identity): Extension<BackendIdentity>,
    body: Result<Json<AckBody>, JsonRejection>,
) -> Result<Json<AckOutcome>, ApiError> {
    let Json(body) = body?;
    let outcome = state
        .lease
        .ack(&identity.id, &body.lease_id, &body.delivery_ids)
        .await?;
    Ok(Json(outcome))
}

/// POST /v1/messages/nack
pub async fn post_nack(
    State(state): State<GatewayState>,
    Extension(identity): Extension<BackendIdentity>,
    body: Result<Json<NackBody>, JsonRejection>,
) -> Result<Json<NackOutcome>, ApiError> {
    let Json(body) = body?;
    let outcome = state
        .lease
        .nack(
            &identity.id,
            &body.lease_id,
            &body.delivery_ids,
            body.reason.as_deref(),
        )
        .await?;
    Ok(Json(outcome))
}

/// POST /v1/messages/send
///
/// Validates the request completely before the chat platform is contacted.
/// Platform failures are surfaced, never retried here.
pub async fn post_send(
    State(state): State<GatewayState>,
    Extension(identity): Extension<BackendIdentity>,
    body: Result<Json<SendBody>, JsonRejection>,
) -> Result<Json<SendReceipt>, ApiError> {
    let Json(body) = body?;

    if body.content.trim().is_empty() {
        return Err(RelayError::validation("content must not be empty").into());
    }
    if body.destination.id.trim().is_empty() {
        return Err(RelayError::validation(format!(
            "destination id is required for {} destinations",
            body.destination.kind
        ))
        .into());
    }
    let channel = state
        .channels
        .get(&body.chat_bot_id)
        .ok_or_else(|| RelayError::UnknownChatBot {
            id: body.chat_bot_id.clone(),
        })?;

    let receipt = channel
        .send_text(&body.destination, &body.content, body.reply_to_id.as_deref())
        .await?;

    info!(
        backend = identity.id.as_str(),
        chat_bot = body.chat_bot_id.as_str(),
        destination = %body.destination.kind,
        remote_message_id = receipt.remote_message_id.as_str(),
        "message sent"
    );
    Ok(Json(receipt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_body_accepts_empty_object_and_camel_case() {
        let body: LeaseBody = serde_json::from_str("{}").unwrap();
        assert!(body.limit.is_none() && body.lease_seconds.is_none());
        assert!(!body.include_conversation_history);
        assert!(body.conversation_history_limit.is_none());

        let body: LeaseBody = serde_json::from_str(r#"{"limit":10,"leaseSeconds":300}"#).unwrap();
        assert_eq!(body.limit, Some(10));
        assert_eq!(body.lease_seconds, Some(300));
    }

    #[test]
    fn send_body_requires_destination() {
        let err = serde_json::from_str::<SendBody>(r#"{"chat_bot_id":"A","content":"x"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn health_response_serializes() {
        let json = serde_json::to_string(&HealthResponse {
            status: "ok",
            version: "0.1.0",
            uptime_secs: 42,
        })
        .unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"uptime_secs\":42"));
    }
}
