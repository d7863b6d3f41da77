// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the relay.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;
use std::fmt;

use relay_core::ScopeType;
use serde::{Deserialize, Serialize};

/// Top-level relay configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// HTTP listener and client defaults.
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Lease protocol bounds and reaper cadence.
    #[serde(default)]
    pub lease: LeaseConfig,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Chat platform bots the relay listens through.
    #[serde(default)]
    pub chat_bots: Vec<ChatBotConfig>,

    /// Backend consumers that lease deliveries.
    #[serde(default)]
    pub backend_bots: Vec<BackendBotConfig>,

    /// Per-chat-bot fallback routes.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Scoped routing rules.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

impl RelayConfig {
    /// Looks up a chat bot by id.
    pub fn chat_bot(&self, id: &str) -> Option<&ChatBotConfig> {
        self.chat_bots.iter().find(|b| b.id == id)
    }

    /// Looks up a backend bot by id.
    pub fn backend_bot(&self, id: &str) -> Option<&BackendBotConfig> {
        self.backend_bots.iter().find(|b| b.id == id)
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the API listens on.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URL the client CLI talks to. Derived from bind address and port when unset.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl ServerConfig {
    /// The URL a client on this host should use.
    pub fn effective_base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.bind_address, self.port),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            base_url: None,
            log_level: default_log_level(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("relay").join("relay.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("relay.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Lease request bounds and reaper cadence.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LeaseConfig {
    /// Batch size used when a lease request omits `limit`.
    #[serde(default = "default_lease_limit")]
    pub default_limit: u32,

    #[serde(default = "default_max_lease_limit")]
    pub max_limit: u32,

    /// Lease duration used when a lease request omits `lease_seconds`.
    #[serde(default = "default_lease_secs")]
    pub default_lease_secs: u32,

    #[serde(default = "default_max_lease_secs")]
    pub max_lease_secs: u32,

    /// How often expired leases are returned to pending.
    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            default_limit: default_lease_limit(),
            max_limit: default_max_lease_limit(),
            default_lease_secs: default_lease_secs(),
            max_lease_secs: default_max_lease_secs(),
            reaper_interval_secs: default_reaper_interval_secs(),
        }
    }
}

fn default_lease_limit() -> u32 {
    50
}

fn default_max_lease_limit() -> u32 {
    100
}

fn default_lease_secs() -> u32 {
    300
}

fn default_max_lease_secs() -> u32 {
    3600
}

fn default_reaper_interval_secs() -> u64 {
    5
}

/// Prometheus metrics exporter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    /// Serve `/metrics` from the API listener.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// A chat platform bot.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChatBotConfig {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    /// Inline bot token. Prefer `token_env`.
    #[serde(default)]
    pub token: Option<String>,

    /// Environment variable holding the bot token.
    #[serde(default)]
    pub token_env: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Accept guild messages from every channel, ignoring the allowlist.
    #[serde(default)]
    pub allow_all_channels: bool,

    /// Guild channel ids messages are accepted from. DMs are always accepted.
    #[serde(default)]
    pub channel_allowlist: Vec<String>,
}

impl ChatBotConfig {
    /// Resolves the bot token from the inline value or the named env var.
    pub fn resolve_token(&self) -> Option<String> {
        resolve_secret(self.token.as_deref(), self.token_env.as_deref())
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Whether a guild channel passes the allowlist.
    pub fn allows_channel(&self, channel_id: &str) -> bool {
        self.allow_all_channels || self.channel_allowlist.iter().any(|c| c == channel_id)
    }
}

impl fmt::Debug for ChatBotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatBotConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("token_env", &self.token_env)
            .field("enabled", &self.enabled)
            .field("allow_all_channels", &self.allow_all_channels)
            .field("channel_allowlist", &self.channel_allowlist)
            .finish()
    }
}

/// A backend consumer identity.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendBotConfig {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    /// Inline bearer credential. Prefer `api_key_env`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the bearer credential.
    #[serde(default)]
    pub api_key_env: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Optional push endpoint for "messages available" nudges.
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

impl BackendBotConfig {
    /// Resolves the API key from the inline value or the named env var.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret(self.api_key.as_deref(), self.api_key_env.as_deref())
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

impl fmt::Debug for BackendBotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendBotConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_key_env", &self.api_key_env)
            .field("enabled", &self.enabled)
            .field("webhook", &self.webhook)
            .finish()
    }
}

/// Webhook nudge endpoint for a backend.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    pub url: String,

    /// Inline signing secret. Prefer `secret_env`.
    #[serde(default)]
    pub secret: Option<String>,

    /// Environment variable holding the signing secret.
    #[serde(default)]
    pub secret_env: Option<String>,

    /// Coalesce nudges for this backend arriving within this window. 0 disables.
    #[serde(default)]
    pub debounce_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Retries after the first attempt before the nudge is dropped.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
}

impl WebhookConfig {
    /// Resolves the signing secret from the inline value or the named env var.
    pub fn resolve_secret(&self) -> Option<String> {
        resolve_secret(self.secret.as_deref(), self.secret_env.as_deref())
    }
}

impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("url", &self.url)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("secret_env", &self.secret_env)
            .field("debounce_ms", &self.debounce_ms)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("max_retries", &self.max_retries)
            .field("retry_base_ms", &self.retry_base_ms)
            .field("retry_max_ms", &self.retry_max_ms)
            .finish()
    }
}

fn default_request_timeout_ms() -> u64 {
    3000
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_base_ms() -> u64 {
    1000
}

fn default_retry_max_ms() -> u64 {
    30_000
}

/// Fallback routes applied when no scoped route matches.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    /// chat bot id -> backend bot id.
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
}

/// A scoped routing rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    pub chat_bot_id: String,
    pub scope_type: ScopeType,
    pub scope_id: String,
    pub backend_bot_id: String,
}

/// Inline value wins; otherwise read the env var. Empty strings count as unset.
fn resolve_secret(inline: Option<&str>, env_name: Option<&str>) -> Option<String> {
    if let Some(value) = inline.filter(|v| !v.is_empty()) {
        return Some(value.to_string());
    }
    env_name
        .and_then(|name| std::env::var(name).ok())
        .filter(|v| !v.is_empty())
}
