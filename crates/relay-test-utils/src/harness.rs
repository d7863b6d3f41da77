// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end queue tests.
//!
//! `TestHarness` wires the SQLite store, routing table, lease manager and
//! ingest pipeline together over a temp database, with a [`ManualClock`] so
//! tests can step past lease expiry without sleeping.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use relay_config::RelayConfig;
use relay_core::{ChannelAdapter, MessageScope, RawEvent, RelayError, StorageAdapter};
use relay_ingest::{IngestOutcome, IngestPipeline};
use relay_lease::{LeaseManager, ManualClock};
use relay_router::RoutingTable;
use relay_storage::SqliteStorage;

use crate::mock_channel::MockChannel;
use crate::recording::RecordingNotifier;

/// Chat bot `A`; backends `B1` (key `key-b1`) and `B2` (key `key-b2`);
/// DMs from user `U1` on `A` route to `B1`.
pub const DEFAULT_CONFIG: &str = r#"
[[chat_bots]]
id = "A"
name = "Chat A"
token = "test-token"
allow_all_channels = true

[[backend_bots]]
id = "B1"
name = "Backend One"
api_key = "key-b1"

[[backend_bots]]
id = "B2"
api_key = "key-b2"

[[routes]]
chat_bot_id = "A"
scope_type = "dm_user"
scope_id = "U1"
backend_bot_id = "B1"
"#;

/// Builder for [`TestHarness`].
pub struct TestHarnessBuilder {
    config_toml: String,
    start: DateTime<Utc>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            config_toml: DEFAULT_CONFIG.to_string(),
            start: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().unwrap_or_else(Utc::now),
        }
    }

    /// Replace the relay configuration. `[storage]` is overridden with a temp database.
    pub fn with_config(mut self, toml: &str) -> Self {
        self.config_toml = toml.to_string();
        self
    }

    /// Initial reading of the manual clock.
    pub fn with_start_time(mut self, start: DateTime<Utc>) -> Self {
        self.start = start;
        self
    }

    pub async fn build(self) -> Result<TestHarness, RelayError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| RelayError::Storage { source: e.into() })?;

        let mut config = relay_config::load_and_validate_str(&self.config_toml)
            .map_err(|errors| RelayError::Config(joined(&errors)))?;
        config.storage.database_path = temp_dir.path().join("test.db").display().to_string();
        config.storage.wal_mode = true;

        let routing = Arc::new(
            RoutingTable::from_config(&config)
                .map_err(|errors| RelayError::Config(joined(&errors)))?,
        );

        let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
        storage.initialize().await?;

        let clock = Arc::new(ManualClock::new(self.start));
        let lease = LeaseManager::new(storage.clone(), config.lease.clone()).with_clock(clock.clone());
        let notifier = Arc::new(RecordingNotifier::new());
        let pipeline = IngestPipeline::new(storage.clone(), routing.clone(), notifier.clone());

        let chat_bot_id = config
            .chat_bots
            .first()
            .map(|b| b.id.clone())
            .unwrap_or_else(|| "A".to_string());
        let channel = Arc::new(MockChannel::new(chat_bot_id));

        Ok(TestHarness {
            config,
            storage,
            routing,
            clock,
            lease,
            pipeline,
            notifier,
            channel,
            _temp_dir: temp_dir,
        })
    }
}

fn joined(errors: &[relay_config::ConfigError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// An assembled relay core with mock edges.
pub struct TestHarness {
    pub config: RelayConfig,
    /// SQLite store (temp DB, removed on drop).
    pub storage: Arc<SqliteStorage>,
    pub routing: Arc<RoutingTable>,
    pub clock: Arc<ManualClock>,
    pub lease: LeaseManager,
    pub pipeline: IngestPipeline,
    pub notifier: Arc<RecordingNotifier>,
    /// Channel adapter for the first configured chat bot.
    pub channel: Arc<MockChannel>,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Harness with [`DEFAULT_CONFIG`].
    pub async fn new() -> Result<Self, RelayError> {
        Self::builder().build().await
    }

    /// Step the manual clock forward.
    pub fn advance_secs(&self, secs: i64) {
        self.clock.advance(Duration::seconds(secs));
    }

    /// A DM from `author_id` to the harness chat bot, stamped now.
    pub fn dm_event(&self, author_id: &str, platform_message_id: &str, content: &str) -> RawEvent {
        RawEvent {
            chat_bot_id: self.channel.chat_bot_id().to_string(),
            platform_message_id: platform_message_id.to_string(),
            timestamp: relay_lease::Clock::now(self.clock.as_ref()),
            content: content.to_string(),
            scope: MessageScope {
                is_dm: true,
                guild_id: None,
                channel_id: Some(format!("dm-{author_id}")),
                author_id: author_id.to_string(),
                author_name: author_id.to_lowercase(),
            },
        }
    }

    /// A guild channel message, stamped now.
    pub fn channel_event(
        &self,
        guild_id: &str,
        channel_id: &str,
        author_id: &str,
        platform_message_id: &str,
        content: &str,
    ) -> RawEvent {
        RawEvent {
            chat_bot_id: self.channel.chat_bot_id().to_string(),
            platform_message_id: platform_message_id.to_string(),
            timestamp: relay_lease::Clock::now(self.clock.as_ref()),
            content: content.to_string(),
            scope: MessageScope {
                is_dm: false,
                guild_id: Some(guild_id.to_string()),
                channel_id: Some(channel_id.to_string()),
                author_id: author_id.to_string(),
                author_name: author_id.to_lowercase(),
            },
        }
    }

    pub async fn ingest(&self, event: RawEvent) -> Result<IngestOutcome, RelayError> {
        self.pipeline.ingest(event).await
    }

    /// Channel adapters keyed by chat bot id, as the gateway expects them.
    pub fn channels(&self) -> HashMap<String, Arc<dyn ChannelAdapter>> {
        let mut map: HashMap<String, Arc<dyn ChannelAdapter>> = HashMap::new();
        map.insert(
            self.channel.chat_bot_id().to_string(),
            self.channel.clone() as Arc<dyn ChannelAdapter>,
        );
        map
    }
}
