// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `relay serve` command implementation.
//!
//! Opens the SQLite store, builds the routing table, starts the nudge
//! dispatcher, lease reaper, one ingestion loop per chat bot, and the HTTP
//! gateway. Everything stops on the shared [`CancellationToken`], after
//! which the dispatcher is drained and the store checkpointed.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use relay_config::{ConfigError, RelayConfig};
use relay_core::{ChannelAdapter, RawEvent, RelayError, StorageAdapter};
use relay_gateway::{BackendCredentials, GatewayState, HealthState};
use relay_ingest::IngestPipeline;
use relay_lease::{LeaseManager, spawn_reaper};
use relay_router::RoutingTable;
use relay_storage::SqliteStorage;
use relay_webhook::{NudgeDispatcher, retry_delay, targets_from_config};

#[cfg(feature = "discord")]
use relay_discord::DiscordChannel;

type MetricsRender = Option<Arc<dyn Fn() -> String + Send + Sync>>;

/// Attempts per event before a storage failure drops it.
const INGEST_ATTEMPTS: u32 = 5;
const INGEST_RETRY_BASE_MS: u64 = 200;
const INGEST_RETRY_MAX_MS: u64 = 5_000;

/// Loads configuration (one file, or the XDG hierarchy) and checks it,
/// including routing ambiguity and dangling references.
pub fn load_checked_config(path: Option<&Path>) -> Result<RelayConfig, Vec<ConfigError>> {
    let config = match path {
        Some(path) => relay_config::load_and_validate_path(path)?,
        None => relay_config::load_and_validate()?,
    };
    RoutingTable::from_config(&config)?;
    Ok(config)
}

/// A running relay.
pub struct RelayService {
    cancel: CancellationToken,
    local_addr: SocketAddr,
    storage: Arc<SqliteStorage>,
    dispatcher: NudgeDispatcher,
    channels: Vec<Arc<dyn ChannelAdapter>>,
    tasks: Vec<JoinHandle<()>>,
    server: JoinHandle<Result<(), RelayError>>,
}

impl RelayService {
    /// Starts every component on already-connected `channels` and a bound
    /// `listener`. Returns once the gateway is accepting requests.
    pub async fn start(
        config: &RelayConfig,
        channels: Vec<Arc<dyn ChannelAdapter>>,
        listener: TcpListener,
        prometheus_render: MetricsRender,
        cancel: CancellationToken,
    ) -> Result<Self, RelayError> {
        let routing = RoutingTable::from_config(config).map_err(|errors| {
            RelayError::Config(
                errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        })?;

        let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
        storage.initialize().await?;
        info!(path = config.storage.database_path.as_str(), "delivery store opened");

        let dispatcher = NudgeDispatcher::new(targets_from_config(config))?;
        let pipeline = IngestPipeline::new(
            storage.clone(),
            Arc::new(routing),
            Arc::new(dispatcher.clone()),
        );
        let lease = LeaseManager::new(storage.clone(), config.lease.clone());

        let mut tasks = Vec::with_capacity(channels.len() + 1);
        tasks.push(spawn_reaper(
            lease.clone(),
            Duration::from_secs(config.lease.reaper_interval_secs),
            cancel.clone(),
        ));
        for channel in &channels {
            tasks.push(spawn_ingest_loop(
                channel.clone(),
                pipeline.clone(),
                cancel.clone(),
            ));
        }

        let channel_map: HashMap<String, Arc<dyn ChannelAdapter>> = channels
            .iter()
            .map(|c| (c.chat_bot_id().to_string(), c.clone()))
            .collect();
        let state = GatewayState {
            lease,
            channels: Arc::new(channel_map),
            credentials: Arc::new(BackendCredentials::from_config(config)),
            health: HealthState::new(prometheus_render),
        };

        let local_addr = listener.local_addr().map_err(|e| RelayError::Transport {
            message: format!("listener has no local address: {e}"),
            source: Some(Box::new(e)),
        })?;
        let server = tokio::spawn(relay_gateway::serve(listener, state, cancel.clone()));
        info!(
            addr = %local_addr,
            chat_bots = channels.len(),
            nudge_targets = dispatcher.configured_backends().len(),
            "relay started"
        );

        Ok(Self {
            cancel,
            local_addr,
            storage,
            dispatcher,
            channels,
            tasks,
            server,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Waits for the gateway to stop, then tears everything else down.
    pub async fn wait(self) -> Result<(), RelayError> {
        let served = match self.server.await {
            Ok(result) => result,
            Err(e) => Err(RelayError::Internal(format!("gateway task failed: {e}"))),
        };
        self.cancel.cancel();

        for task in self.tasks {
            join_logged(task, "background").await;
        }
        self.dispatcher.shutdown().await;
        for channel in &self.channels {
            if let Err(e) = channel.shutdown().await {
                warn!(chat_bot = channel.chat_bot_id(), error = %e, "channel shutdown failed");
            }
        }
        self.storage.close().await?;
        info!("relay stopped");
        served
    }
}

/// Feeds one chat bot's events into the pipeline until cancelled.
fn spawn_ingest_loop(
    channel: Arc<dyn ChannelAdapter>,
    pipeline: IngestPipeline,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let chat_bot = channel.chat_bot_id().to_string();
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = channel.receive() => event,
            };
            match event {
                Ok(event) => {
                    let platform_id = event.platform_message_id.clone();
                    if let Err(e) = ingest_with_retry(&pipeline, event, &cancel).await {
                        error!(
                            chat_bot = chat_bot.as_str(),
                            platform_message_id = platform_id.as_str(),
                            error = %e,
                            "failed to ingest message, event dropped"
                        );
                    }
                }
                Err(e) => {
                    warn!(chat_bot = chat_bot.as_str(), error = %e, "channel receive ended");
                    break;
                }
            }
        }
        debug!(chat_bot = chat_bot.as_str(), "ingest loop stopped");
    })
}

/// Ingests one event, retrying storage failures with exponential backoff.
///
/// Ingestion is idempotent on the dedupe key, so a retry after a partial
/// write only fills in what is missing. Stops retrying once `cancel` fires.
async fn ingest_with_retry(
    pipeline: &IngestPipeline,
    event: RawEvent,
    cancel: &CancellationToken,
) -> Result<(), RelayError> {
    let mut attempt = 1;
    loop {
        let err = match pipeline.ingest(event.clone()).await {
            Ok(_) => return Ok(()),
            Err(e @ RelayError::Storage { .. }) if attempt < INGEST_ATTEMPTS => e,
            Err(e) => return Err(e),
        };
        let delay = retry_delay(attempt, INGEST_RETRY_BASE_MS, INGEST_RETRY_MAX_MS);
        warn!(
            platform_message_id = event.platform_message_id.as_str(),
            attempt,
            retry_in_ms = delay.as_millis() as u64,
            error = %err,
            "ingest failed, retrying"
        );
        tokio::select! {
            _ = cancel.cancelled() => return Err(err),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}

/// Awaits a spawned task, logging instead of discarding a panic.
async fn join_logged(task: JoinHandle<()>, name: &str) {
    if let Err(e) = task.await {
        if e.is_panic() {
            error!(task = name, error = %e, "task panicked");
        } else {
            debug!(task = name, "task cancelled");
        }
    }
}

/// Runs the `relay serve` command until SIGINT/SIGTERM.
pub async fn run_serve(config: RelayConfig) -> Result<(), RelayError> {
    init_tracing(&config.server.log_level);
    info!(version = env!("CARGO_PKG_VERSION"), "starting relay serve");

    let cancel = crate::shutdown::install_signal_handler();

    #[cfg(feature = "prometheus")]
    let prometheus_render: MetricsRender = if config.prometheus.enabled {
        match relay_prometheus::PrometheusAdapter::new() {
            Ok(adapter) => {
                let handle = adapter.handle().clone();
                Some(Arc::new(move || handle.render()) as Arc<dyn Fn() -> String + Send + Sync>)
            }
            Err(e) => {
                warn!(error = %e, "prometheus initialization failed, continuing without metrics");
                None
            }
        }
    } else {
        debug!("prometheus metrics disabled by configuration");
        None
    };
    #[cfg(not(feature = "prometheus"))]
    let prometheus_render: MetricsRender = None;

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| RelayError::Transport {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    let channels = connect_channels(&config).await?;
    let monitor = tokio::spawn(memory_monitor(cancel.clone()));

    let service =
        RelayService::start(&config, channels, listener, prometheus_render, cancel.clone())
            .await?;
    let result = service.wait().await;

    cancel.cancel();
    join_logged(monitor, "memory_monitor").await;
    result
}

#[cfg(feature = "discord")]
async fn connect_channels(config: &RelayConfig) -> Result<Vec<Arc<dyn ChannelAdapter>>, RelayError> {
    let mut channels: Vec<Arc<dyn ChannelAdapter>> = Vec::new();
    for bot in &config.chat_bots {
        if !bot.enabled {
            info!(chat_bot = bot.id.as_str(), "chat bot disabled, not starting");
            continue;
        }
        let mut channel = DiscordChannel::new(bot.clone())?;
        channel.connect().await?;
        channels.push(Arc::new(channel));
    }
    Ok(channels)
}

#[cfg(not(feature = "discord"))]
async fn connect_channels(config: &RelayConfig) -> Result<Vec<Arc<dyn ChannelAdapter>>, RelayError> {
    if config.chat_bots.iter().any(|b| b.enabled) {
        warn!("chat bots configured but the discord feature is not compiled in");
    }
    Ok(Vec::new())
}

/// Periodically exports allocator and RSS figures as gauges.
#[cfg(all(not(target_env = "msvc"), feature = "prometheus"))]
async fn memory_monitor(cancel: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(15));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let _ = tikv_jemalloc_ctl::epoch::advance();
                let allocated = tikv_jemalloc_ctl::stats::allocated::read().unwrap_or(0);
                let resident = tikv_jemalloc_ctl::stats::resident::read().unwrap_or(0);
                let rss = read_rss_bytes().unwrap_or(0);

                relay_prometheus::set_memory_heap(allocated as f64);
                relay_prometheus::set_memory_resident(resident as f64);
                relay_prometheus::set_memory_rss(rss as f64);
                debug!(allocated, resident, rss, "memory sample");
            }
            _ = cancel.cancelled() => break,
        }
    }
}

#[cfg(not(all(not(target_env = "msvc"), feature = "prometheus")))]
async fn memory_monitor(cancel: CancellationToken) {
    cancel.cancelled().await;
}

/// Process RSS in bytes from /proc/self/statm. Linux only.
#[cfg(all(not(target_env = "msvc"), feature = "prometheus"))]
fn read_rss_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
        let pages = statm.split_whitespace().nth(1)?.parse::<u64>().ok()?;
        Some(pages * 4096)
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("relay={log_level},warn")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
