// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use relay_config::model::StorageConfig;
use relay_core::{
    AckOutcome, AdapterType, HealthStatus, InboundMessage, LeasedDelivery, NackOutcome,
    PluginAdapter, RawEvent, RelayError, StorageAdapter,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed delivery store.
///
/// The database is opened on [`StorageAdapter::initialize`]; every other
/// operation fails with a storage error until then.
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a store for the configured path without opening it.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// The underlying database, for callers that need typed queries
    /// beyond the adapter trait.
    pub fn database(&self) -> Result<&Database, RelayError> {
        self.db.get().ok_or_else(|| RelayError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    async fn checkpoint(db: &Database) -> Result<(), RelayError> {
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, RelayError> {
        let Some(db) = self.db.get() else {
            return Ok(HealthStatus::Unhealthy("not initialized".into()));
        };
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RelayError> {
        if let Some(db) = self.db.get() {
            Self::checkpoint(db).await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), RelayError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| RelayError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), RelayError> {
        Self::checkpoint(self.database()?).await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    async fn create_message(
        &self,
        event: &RawEvent,
    ) -> Result<(InboundMessage, bool), RelayError> {
        queries::messages::create_message(self.database()?, event).await
    }

    async fn create_delivery(
        &self,
        message_id: &str,
        backend_bot_id: &str,
    ) -> Result<bool, RelayError> {
        queries::deliveries::create_delivery(self.database()?, message_id, backend_bot_id).await
    }

    async fn claim_pending(
        &self,
        backend_bot_id: &str,
        limit: u32,
        lease_secs: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<LeasedDelivery>, RelayError> {
        queries::deliveries::claim_pending(self.database()?, backend_bot_id, limit, lease_secs, now)
            .await
    }

    async fn ack_deliveries(
        &self,
        backend_bot_id: &str,
        lease_id: &str,
        delivery_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<AckOutcome, RelayError> {
        queries::deliveries::ack_deliveries(
            self.database()?,
            backend_bot_id,
            lease_id,
            delivery_ids,
            now,
        )
        .await
    }

    async fn nack_deliveries(
        &self,
        backend_bot_id: &str,
        lease_id: &str,
        delivery_ids: &[String],
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<NackOutcome, RelayError> {
        queries::deliveries::nack_deliveries(
            self.database()?,
            backend_bot_id,
            lease_id,
            delivery_ids,
            reason,
            now,
        )
        .await
    }

    async fn reap_expired(&self, now: DateTime<Utc>) -> Result<u64, RelayError> {
        queries::deliveries::reap_expired(self.database()?, now).await
    }

    async fn recent_messages(
        &self,
        anchor: &InboundMessage,
        limit: u32,
    ) -> Result<Vec<InboundMessage>, RelayError> {
        queries::messages::recent_messages(self.database()?, anchor, limit).await
    }
}
