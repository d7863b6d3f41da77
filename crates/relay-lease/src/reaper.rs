// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background task returning expired leases to pending.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::manager::LeaseManager;

/// Spawns the reaper loop. It ticks every `interval` until `cancel` fires.
///
/// A failed sweep is logged and retried on the next tick.
pub fn spawn_reaper(
    manager: LeaseManager,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_secs = interval.as_secs(), "lease reaper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = manager.reap().await {
                        warn!(error = %e, "lease reaper sweep failed");
                    }
                }
                _ = cancel.cancelled() => {
                    info!("lease reaper shutting down");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use relay_config::model::{LeaseConfig, StorageConfig};
    use relay_core::{MessageScope, RawEvent, StorageAdapter};
    use relay_storage::SqliteStorage;

    use crate::clock::ManualClock;
    use crate::manager::LeaseRequest;

    #[tokio::test]
    async fn reaper_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStorage::new(StorageConfig {
            database_path: dir.path().join("reaper.db").display().to_string(),
            wal_mode: true,
        }));
        store.initialize().await.unwrap();
        let manager = LeaseManager::new(store, LeaseConfig::default());

        let cancel = CancellationToken::new();
        let handle = spawn_reaper(manager, Duration::from_millis(10), cancel.clone());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("reaper should exit promptly")
            .expect("reaper task should not panic");
    }

    #[tokio::test]
    async fn reaper_reclaims_without_any_client_request() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStorage::new(StorageConfig {
            database_path: dir.path().join("reaper.db").display().to_string(),
            wal_mode: true,
        }));
        store.initialize().await.unwrap();

        let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let manager =
            LeaseManager::new(store.clone(), LeaseConfig::default()).with_clock(clock.clone());

        let (message, _) = store
            .create_message(&RawEvent {
                chat_bot_id: "A".into(),
                platform_message_id: "1".into(),
                timestamp: start,
                content: "hi".into(),
                scope: MessageScope {
                    is_dm: true,
                    guild_id: None,
                    channel_id: None,
                    author_id: "U1".into(),
                    author_name: "u1".into(),
                },
            })
            .await
            .unwrap();
        store.create_delivery(&message.id, "B1").await.unwrap();

        let request = LeaseRequest {
            limit: Some(10),
            lease_seconds: Some(30),
        };
        assert_eq!(manager.lease("B1", request).await.unwrap().len(), 1);
        clock.advance(chrono::Duration::seconds(31));

        let cancel = CancellationToken::new();
        let handle = spawn_reaper(manager.clone(), Duration::from_millis(10), cancel.clone());

        let mut reclaimed = Vec::new();
        for _ in 0..200 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            reclaimed = manager.lease("B1", request).await.unwrap();
            if !reclaimed.is_empty() {
                break;
            }
        }
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].delivery.attempts, 1);
    }
}
