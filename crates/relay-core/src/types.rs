// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the store, the lease protocol, and the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Channel,
    Storage,
    Observability,
}

/// Routing scope tier a route is declared at.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ScopeType {
    DmUser,
    Channel,
    Guild,
}

/// Where a chat message was observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageScope {
    pub is_dm: bool,
    pub guild_id: Option<String>,
    pub channel_id: Option<String>,
    pub author_id: String,
    pub author_name: String,
}

/// A chat event as produced by an ingestion client, before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub chat_bot_id: String,
    pub platform_message_id: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub scope: MessageScope,
}

impl RawEvent {
    /// Key that identifies a chat event across reconnect replays.
    pub fn dedupe_key(&self) -> String {
        dedupe_key(&self.chat_bot_id, &self.platform_message_id)
    }
}

/// Builds the dedupe key for a (chat bot, platform message) pair.
pub fn dedupe_key(chat_bot_id: &str, platform_message_id: &str) -> String {
    format!("{chat_bot_id}:{platform_message_id}")
}

/// A persisted inbound message. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub chat_bot_id: String,
    pub platform_message_id: String,
    #[serde(skip)]
    pub dedupe_key: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    #[serde(rename = "source")]
    pub scope: MessageScope,
    #[serde(skip)]
    pub created_at: String,
}

/// Queue state of a single delivery.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Pending,
    Leased,
    /// Terminal.
    Acked,
}

/// One (message, backend) assignment tracked by the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: String,
    pub message_id: String,
    pub backend_bot_id: String,
    pub state: DeliveryState,
    /// Present only while `leased`.
    pub lease_id: Option<String>,
    /// Present only while `leased`.
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub acked_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A delivery that was just claimed, together with its message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeasedDelivery {
    pub delivery: Delivery,
    pub message: InboundMessage,
}

/// Why an individual id in an ack or nack batch was not applied.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// No such delivery for the calling backend.
    Unknown,
    /// The delivery is pending; nobody holds a lease on it.
    NotLeased,
    AlreadyAcked,
    /// The delivery is leased under a different lease id.
    LeaseMismatch,
    /// The lease id matches but the lease has run out.
    LeaseExpired,
}

/// A single rejected id in an ack or nack batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub delivery_id: String,
    pub reason: RejectReason,
}

/// Result of an ack batch. Never fails as a whole because of a stale id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckOutcome {
    pub acked: Vec<String>,
    pub rejected: Vec<Rejection>,
}

/// Result of a nack batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NackOutcome {
    pub nacked: Vec<String>,
    pub rejected: Vec<Rejection>,
}

/// Kind of outbound destination.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DestinationType {
    /// Direct message to a user id.
    Dm,
    Channel,
}

/// Outbound destination on the chat platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    #[serde(rename = "type")]
    pub kind: DestinationType,
    pub id: String,
}

/// What the chat platform returned for a sent message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub remote_message_id: String,
    pub channel_id: String,
}

/// An authenticated backend consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendIdentity {
    pub id: String,
    pub name: String,
}
