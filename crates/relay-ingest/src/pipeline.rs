// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The ingestion pipeline.
//!
//! Each event is recorded once per dedupe key, routed to at most one backend,
//! and queued as a single pending delivery. Events that match no route are
//! still stored but produce no delivery.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info};

use relay_core::{Notifier, RawEvent, RelayError, StorageAdapter};
use relay_router::RoutingTable;

/// What ingesting one event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub message_id: String,
    /// `false` when the dedupe key was already recorded.
    pub created: bool,
    /// The routed backend and whether a new delivery row was written for it.
    pub delivery: Option<(String, bool)>,
}

/// Store, router, and nudge sink wired together.
#[derive(Clone)]
pub struct IngestPipeline {
    store: Arc<dyn StorageAdapter>,
    router: Arc<RoutingTable>,
    notifier: Arc<dyn Notifier>,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<dyn StorageAdapter>,
        router: Arc<RoutingTable>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            router,
            notifier,
        }
    }

    /// Records `event` and queues it for its routed backend.
    ///
    /// A replayed event still gets its delivery created if an earlier attempt
    /// stopped between the two writes. The backend is nudged for every new
    /// message that routes somewhere, and for a replay only when it repaired
    /// a missing delivery.
    pub async fn ingest(&self, event: RawEvent) -> Result<IngestOutcome, RelayError> {
        let (message, created) = self.store.create_message(&event).await?;
        if created {
            counter!("relay_messages_ingested_total", "chat_bot" => event.chat_bot_id.clone())
                .increment(1);
        } else {
            debug!(
                dedupe_key = message.dedupe_key.as_str(),
                "duplicate event, message already recorded"
            );
        }

        let Some(decision) = self.router.route(&event.chat_bot_id, &event.scope) else {
            info!(
                chat_bot = event.chat_bot_id.as_str(),
                message_id = message.id.as_str(),
                "no route matched; message stored without delivery"
            );
            return Ok(IngestOutcome {
                message_id: message.id,
                created,
                delivery: None,
            });
        };

        let backend = decision.backend_bot_id;
        let delivery_created = self.store.create_delivery(&message.id, &backend).await?;
        if delivery_created {
            counter!("relay_deliveries_created_total", "backend" => backend.clone()).increment(1);
            debug!(
                message_id = message.id.as_str(),
                backend = backend.as_str(),
                tier = %decision.tier,
                "delivery queued"
            );
        }

        if created || delivery_created {
            self.notifier.notify(&backend);
        }

        Ok(IngestOutcome {
            message_id: message.id,
            created,
            delivery: Some((backend, delivery_created)),
        })
    }
}
