// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait: the durable delivery store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::RelayError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{AckOutcome, InboundMessage, LeasedDelivery, NackOutcome, RawEvent};

/// Durable messages and their per-backend deliveries.
///
/// Every state transition is a conditional write scoped to one row, so
/// concurrent callers for different backends never contend and two callers
/// for the same backend never claim the same pending delivery. Operations
/// take `now` explicitly; expiry is always judged against the caller's clock.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection setup).
    async fn initialize(&self) -> Result<(), RelayError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), RelayError>;

    /// Persists an inbound message. Idempotent on the dedupe key: returns the
    /// existing row and `false` when the key is already recorded.
    async fn create_message(&self, event: &RawEvent)
    -> Result<(InboundMessage, bool), RelayError>;

    /// Creates a pending delivery. Returns `false` when the (message, backend)
    /// pair already has one.
    async fn create_delivery(
        &self,
        message_id: &str,
        backend_bot_id: &str,
    ) -> Result<bool, RelayError>;

    /// Leases up to `limit` pending deliveries for a backend, oldest message first.
    async fn claim_pending(
        &self,
        backend_bot_id: &str,
        limit: u32,
        lease_secs: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<LeasedDelivery>, RelayError>;

    /// Marks deliveries acked when they hold the exact live lease.
    async fn ack_deliveries(
        &self,
        backend_bot_id: &str,
        lease_id: &str,
        delivery_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<AckOutcome, RelayError>;

    /// Returns leased deliveries to pending early, bumping their attempt counter.
    async fn nack_deliveries(
        &self,
        backend_bot_id: &str,
        lease_id: &str,
        delivery_ids: &[String],
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<NackOutcome, RelayError>;

    /// Returns every lease with `lease_expires_at < now` to pending.
    async fn reap_expired(&self, now: DateTime<Utc>) -> Result<u64, RelayError>;

    /// Up to `limit` earlier messages from the same conversation as `anchor`,
    /// oldest first.
    async fn recent_messages(
        &self,
        anchor: &InboundMessage,
        limit: u32,
    ) -> Result<Vec<InboundMessage>, RelayError>;
}
