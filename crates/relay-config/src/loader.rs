// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./relay.toml` > `~/.config/relay/relay.toml` > `/etc/relay/relay.toml`
//! with environment variable overrides via the `RELAY_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::RelayConfig;

/// System-wide config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/relay/relay.toml";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "relay.toml";

/// Per-user config file under the XDG config dir.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("relay").join("relay.toml"))
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/relay/relay.toml` (system-wide)
/// 3. `~/.config/relay/relay.toml` (user XDG config)
/// 4. `./relay.toml` (local directory)
/// 5. `RELAY_*` environment variables
pub fn load_config() -> Result<RelayConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<RelayConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RelayConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<RelayConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RelayConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The Figment used for hierarchy loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(RelayConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_FILE))
        .merge(env_provider())
}

/// Environment provider with explicit section mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `RELAY_SERVER_BIND_ADDRESS` must map to `server.bind_address`,
/// not `server.bind.address`. Only the first matching section prefix is rewritten.
pub(crate) fn env_provider() -> Env {
    Env::prefixed("RELAY_")
        .ignore(&["API_KEY", "BASE_URL"])
        .map(|key| map_env_key(key.as_str()).into())
}

/// Section prefixes recognised in `RELAY_*` variable names.
const ENV_SECTIONS: &[&str] = &["server", "storage", "lease", "prometheus"];

fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
