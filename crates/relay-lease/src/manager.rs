// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lease/ack/nack request handling for one authenticated backend at a time.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info};

use relay_config::model::LeaseConfig;
use relay_core::{
    AckOutcome, InboundMessage, LeasedDelivery, NackOutcome, RelayError, Rejection,
    StorageAdapter,
};

use crate::clock::{Clock, SystemClock};

/// Optional knobs of a lease request. `None` falls back to configured defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeaseRequest {
    pub limit: Option<u32>,
    pub lease_seconds: Option<u32>,
}

/// History size used when a lease request asks for context without a limit.
pub const DEFAULT_HISTORY_LIMIT: u32 = 20;
/// Largest history a single leased message may carry.
pub const MAX_HISTORY_LIMIT: u32 = 100;

/// Applies request policy on top of a [`StorageAdapter`].
///
/// Every operation is scoped to the backend passed in; the caller is expected
/// to have authenticated it.
#[derive(Clone)]
pub struct LeaseManager {
    store: Arc<dyn StorageAdapter>,
    config: LeaseConfig,
    clock: Arc<dyn Clock>,
}

impl LeaseManager {
    pub fn new(store: Arc<dyn StorageAdapter>, config: LeaseConfig) -> Self {
        Self {
            store,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the wall clock, for tests that drive lease expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &LeaseConfig {
        &self.config
    }

    /// Claims pending deliveries for `backend_bot_id`, oldest message first.
    pub async fn lease(
        &self,
        backend_bot_id: &str,
        request: LeaseRequest,
    ) -> Result<Vec<LeasedDelivery>, RelayError> {
        let (limit, lease_secs) = self.resolve(request)?;
        let leased = self
            .store
            .claim_pending(backend_bot_id, limit, lease_secs, self.clock.now())
            .await?;

        if !leased.is_empty() {
            counter!("relay_deliveries_leased_total").increment(leased.len() as u64);
            debug!(
                backend = backend_bot_id,
                count = leased.len(),
                lease_secs,
                "deliveries leased"
            );
        }
        Ok(leased)
    }

    /// Acks deliveries held under `lease_id`. Stale ids are rejected per item.
    pub async fn ack(
        &self,
        backend_bot_id: &str,
        lease_id: &str,
        delivery_ids: &[String],
    ) -> Result<AckOutcome, RelayError> {
        check_batch(lease_id, delivery_ids)?;
        let outcome = self
            .store
            .ack_deliveries(backend_bot_id, lease_id, delivery_ids, self.clock.now())
            .await?;

        counter!("relay_deliveries_acked_total").increment(outcome.acked.len() as u64);
        record_rejections(&outcome.rejected);
        debug!(
            backend = backend_bot_id,
            acked = outcome.acked.len(),
            rejected = outcome.rejected.len(),
            "ack processed"
        );
        Ok(outcome)
    }

    /// Releases deliveries held under `lease_id` back to pending.
    pub async fn nack(
        &self,
        backend_bot_id: &str,
        lease_id: &str,
        delivery_ids: &[String],
        reason: Option<&str>,
    ) -> Result<NackOutcome, RelayError> {
        check_batch(lease_id, delivery_ids)?;
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        let outcome = self
            .store
            .nack_deliveries(
                backend_bot_id,
                lease_id,
                delivery_ids,
                reason,
                self.clock.now(),
            )
            .await?;

        counter!("relay_deliveries_nacked_total").increment(outcome.nacked.len() as u64);
        record_rejections(&outcome.rejected);
        debug!(
            backend = backend_bot_id,
            nacked = outcome.nacked.len(),
            rejected = outcome.rejected.len(),
            "nack processed"
        );
        Ok(outcome)
    }

    /// Checks a requested conversation history size against the allowed range.
    pub fn history_limit(&self, requested: Option<u32>) -> Result<u32, RelayError> {
        let limit = requested.unwrap_or(DEFAULT_HISTORY_LIMIT);
        if limit == 0 || limit > MAX_HISTORY_LIMIT {
            return Err(RelayError::validation(format!(
                "conversation_history_limit must be between 1 and {MAX_HISTORY_LIMIT}, got {limit}"
            )));
        }
        Ok(limit)
    }

    /// Earlier messages from the conversation of a leased message, oldest first.
    pub async fn conversation_history(
        &self,
        message: &InboundMessage,
        limit: u32,
    ) -> Result<Vec<InboundMessage>, RelayError> {
        self.store.recent_messages(message, limit).await
    }

    /// Returns every expired lease to pending. Used by the reaper.
    pub async fn reap(&self) -> Result<u64, RelayError> {
        let reaped = self.store.reap_expired(self.clock.now()).await?;
        if reaped > 0 {
            counter!("relay_leases_reaped_total").increment(reaped);
            info!(count = reaped, "expired leases returned to pending");
        }
        Ok(reaped)
    }

    fn resolve(&self, request: LeaseRequest) -> Result<(u32, u32), RelayError> {
        let limit = request.limit.unwrap_or(self.config.default_limit);
        if limit == 0 || limit > self.config.max_limit {
            return Err(RelayError::validation(format!(
                "limit must be between 1 and {}, got {limit}",
                self.config.max_limit
            )));
        }

        let lease_secs = request
            .lease_seconds
            .unwrap_or(self.config.default_lease_secs);
        if lease_secs == 0 || lease_secs > self.config.max_lease_secs {
            return Err(RelayError::validation(format!(
                "lease_seconds must be between 1 and {}, got {lease_secs}",
                self.config.max_lease_secs
            )));
        }

        Ok((limit, lease_secs))
    }
}

fn check_batch(lease_id: &str, delivery_ids: &[String]) -> Result<(), RelayError> {
    if lease_id.trim().is_empty() {
        return Err(RelayError::validation("lease_id must not be empty"));
    }
    if delivery_ids.is_empty() {
        return Err(RelayError::validation("delivery_ids must not be empty"));
    }
    if delivery_ids.iter().any(|id| id.trim().is_empty()) {
        return Err(RelayError::validation("delivery_ids must not contain empty ids"));
    }
    Ok(())
}

fn record_rejections(rejected: &[Rejection]) {
    for r in rejected {
        counter!("relay_ack_rejections_total", "reason" => r.reason.to_string()).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use relay_config::model::StorageConfig;
    use relay_core::{MessageScope, RawEvent, RejectReason};
    use relay_storage::SqliteStorage;

    use crate::clock::ManualClock;

    struct Fixture {
        manager: LeaseManager,
        store: Arc<SqliteStorage>,
        clock: Arc<ManualClock>,
        _dir: tempfile::TempDir,
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStorage::new(StorageConfig {
            database_path: dir.path().join("lease.db").display().to_string(),
            wal_mode: true,
        }));
        store.initialize().await.unwrap();
        let clock = Arc::new(ManualClock::new(start()));
        let manager = LeaseManager::new(store.clone(), LeaseConfig::default())
            .with_clock(clock.clone());
        Fixture {
            manager,
            store,
            clock,
            _dir: dir,
        }
    }

    async fn enqueue(store: &SqliteStorage, msg_id: &str, backend: &str) -> String {
        let (message, _) = store
            .create_message(&RawEvent {
                chat_bot_id: "A".into(),
                platform_message_id: msg_id.into(),
                timestamp: start(),
                content: "hi".into(),
                scope: MessageScope {
                    is_dm: true,
                    guild_id: None,
                    channel_id: Some("dm-1".into()),
                    author_id: "U1".into(),
                    author_name: "user one".into(),
                },
            })
            .await
            .unwrap();
        store.create_delivery(&message.id, backend).await.unwrap();
        message.id
    }

    #[tokio::test]
    async fn limit_and_lease_seconds_are_bounded() {
        let f = fixture().await;
        for request in [
            LeaseRequest {
                limit: Some(0),
                lease_seconds: None,
            },
            LeaseRequest {
                limit: Some(101),
                lease_seconds: None,
            },
            LeaseRequest {
                limit: None,
                lease_seconds: Some(0),
            },
            LeaseRequest {
                limit: None,
                lease_seconds: Some(3601),
            },
        ] {
            let err = f.manager.lease("B1", request).await.unwrap_err();
            assert!(matches!(err, RelayError::Validation { .. }), "{request:?}");
        }
    }

    #[tokio::test]
    async fn defaults_apply_when_request_is_empty() {
        let f = fixture().await;
        enqueue(&f.store, "1", "B1").await;

        let leased = f.manager.lease("B1", LeaseRequest::default()).await.unwrap();
        assert_eq!(leased.len(), 1);
        assert_eq!(
            leased[0].delivery.lease_expires_at,
            Some(start() + Duration::seconds(300))
        );
    }

    #[tokio::test]
    async fn empty_ack_batch_is_a_validation_error() {
        let f = fixture().await;
        let err = f.manager.ack("B1", "lease", &[]).await.unwrap_err();
        assert!(matches!(err, RelayError::Validation { .. }));
        let err = f
            .manager
            .nack("B1", "", &["d1".to_string()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Validation { .. }));
    }

    #[tokio::test]
    async fn lease_ack_then_nothing_left() {
        let f = fixture().await;
        let message_id = enqueue(&f.store, "1", "B1").await;

        let leased = f
            .manager
            .lease(
                "B1",
                LeaseRequest {
                    limit: Some(10),
                    lease_seconds: Some(300),
                },
            )
            .await
            .unwrap();
        assert_eq!(leased.len(), 1);
        assert_eq!(leased[0].message.id, message_id);
        assert_eq!(leased[0].message.content, "hi");

        let lease_id = leased[0].delivery.lease_id.clone().unwrap();
        let ids = vec![leased[0].delivery.id.clone()];
        let outcome = f.manager.ack("B1", &lease_id, &ids).await.unwrap();
        assert_eq!(outcome.acked, ids);
        assert!(outcome.rejected.is_empty());

        let again = f.manager.lease("B1", LeaseRequest::default()).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn expired_lease_is_reaped_and_reissued() {
        let f = fixture().await;
        enqueue(&f.store, "1", "B1").await;

        let first = f
            .manager
            .lease(
                "B1",
                LeaseRequest {
                    limit: Some(10),
                    lease_seconds: Some(300),
                },
            )
            .await
            .unwrap();
        let old_lease = first[0].delivery.lease_id.clone().unwrap();
        let ids = vec![first[0].delivery.id.clone()];

        f.clock.advance(Duration::seconds(301));

        let late = f.manager.ack("B1", &old_lease, &ids).await.unwrap();
        assert!(late.acked.is_empty());
        assert_eq!(late.rejected[0].reason, RejectReason::LeaseExpired);

        assert_eq!(f.manager.reap().await.unwrap(), 1);

        let second = f.manager.lease("B1", LeaseRequest::default()).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].delivery.id, ids[0]);
        assert_eq!(second[0].delivery.attempts, 1);
        assert_ne!(second[0].delivery.lease_id.as_deref(), Some(old_lease.as_str()));
    }

    #[tokio::test]
    async fn nack_releases_with_reason() {
        let f = fixture().await;
        enqueue(&f.store, "1", "B1").await;

        let leased = f.manager.lease("B1", LeaseRequest::default()).await.unwrap();
        let lease_id = leased[0].delivery.lease_id.clone().unwrap();
        let ids = vec![leased[0].delivery.id.clone()];

        let outcome = f
            .manager
            .nack("B1", &lease_id, &ids, Some("  downstream busy "))
            .await
            .unwrap();
        assert_eq!(outcome.nacked, ids);

        let again = f.manager.lease("B1", LeaseRequest::default()).await.unwrap();
        assert_eq!(again[0].delivery.attempts, 1);
        assert_eq!(again[0].delivery.last_error.as_deref(), Some("downstream busy"));
    }

    #[tokio::test]
    async fn history_limit_is_bounded() {
        let f = fixture().await;
        assert_eq!(f.manager.history_limit(None).unwrap(), DEFAULT_HISTORY_LIMIT);
        assert_eq!(f.manager.history_limit(Some(5)).unwrap(), 5);
        for bad in [0, MAX_HISTORY_LIMIT + 1] {
            let err = f.manager.history_limit(Some(bad)).unwrap_err();
            assert!(matches!(err, RelayError::Validation { .. }), "{bad}");
        }
    }

    #[tokio::test]
    async fn history_comes_from_the_leased_conversation() {
        let f = fixture().await;
        enqueue(&f.store, "1", "B1").await;
        let leased = f.manager.lease("B1", LeaseRequest::default()).await.unwrap();
        let lease_id = leased[0].delivery.lease_id.clone().unwrap();
        f.manager
            .ack("B1", &lease_id, &[leased[0].delivery.id.clone()])
            .await
            .unwrap();

        f.clock.set(start() + Duration::minutes(1));
        enqueue(&f.store, "2", "B1").await;
        let leased = f.manager.lease("B1", LeaseRequest::default()).await.unwrap();
        assert_eq!(leased.len(), 1);

        let history = f
            .manager
            .conversation_history(&leased[0].message, 20)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].platform_message_id, "1");
    }

    #[tokio::test]
    async fn other_backend_sees_nothing_and_cannot_ack() {
        let f = fixture().await;
        enqueue(&f.store, "1", "B1").await;

        assert!(f.manager.lease("B2", LeaseRequest::default()).await.unwrap().is_empty());

        let leased = f.manager.lease("B1", LeaseRequest::default()).await.unwrap();
        let lease_id = leased[0].delivery.lease_id.clone().unwrap();
        let ids = vec![leased[0].delivery.id.clone()];

        let outcome = f.manager.ack("B2", &lease_id, &ids).await.unwrap();
        assert!(outcome.acked.is_empty());
        assert_eq!(outcome.rejected[0].reason, RejectReason::Unknown);
    }
}
