// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints serde attributes cannot express: bot id
//! uniqueness, resolvable credentials, webhook URL shape, retry and lease
//! bounds. Routing references and precedence conflicts are checked when the
//! routing table is built.

use std::collections::{HashMap, HashSet};

use crate::diagnostic::ConfigError;
use crate::model::{RelayConfig, WebhookConfig};

/// Validate a deserialized configuration.
///
/// Collects every error instead of stopping at the first.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.trim().is_empty() {
        errors.push(invalid("server.bind_address must not be empty"));
    } else {
        let addr = config.server.bind_address.trim();
        let is_valid_ip = addr.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = addr
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(invalid(format!(
                "server.bind_address `{addr}` is not a valid IP address or hostname"
            )));
        }
    }

    if let Some(base_url) = &config.server.base_url
        && !is_http_url(base_url)
    {
        errors.push(invalid(format!(
            "server.base_url `{base_url}` must be an http(s) URL with a host"
        )));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(invalid("storage.database_path must not be empty"));
    }

    validate_lease(config, &mut errors);
    validate_chat_bots(config, &mut errors);
    validate_backend_bots(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_lease(config: &RelayConfig, errors: &mut Vec<ConfigError>) {
    let lease = &config.lease;
    if lease.default_limit == 0 || lease.default_limit > lease.max_limit {
        errors.push(invalid(format!(
            "lease.default_limit must be between 1 and lease.max_limit ({}), got {}",
            lease.max_limit, lease.default_limit
        )));
    }
    if lease.default_lease_secs == 0 || lease.default_lease_secs > lease.max_lease_secs {
        errors.push(invalid(format!(
            "lease.default_lease_secs must be between 1 and lease.max_lease_secs ({}), got {}",
            lease.max_lease_secs, lease.default_lease_secs
        )));
    }
    if lease.reaper_interval_secs == 0 {
        errors.push(invalid("lease.reaper_interval_secs must be greater than 0"));
    }
}

fn validate_chat_bots(config: &RelayConfig, errors: &mut Vec<ConfigError>) {
    let mut seen = HashSet::new();
    for (i, bot) in config.chat_bots.iter().enumerate() {
        if bot.id.trim().is_empty() {
            errors.push(invalid(format!("chat_bots[{i}].id must not be empty")));
            continue;
        }
        if !seen.insert(bot.id.as_str()) {
            errors.push(invalid(format!(
                "duplicate chat bot id `{}` in [[chat_bots]] array",
                bot.id
            )));
        }
        if bot.enabled && bot.resolve_token().is_none() {
            errors.push(invalid(format!(
                "chat bot `{}` is enabled but has no token (set `token` or `token_env`)",
                bot.id
            )));
        }
    }
}

fn validate_backend_bots(config: &RelayConfig, errors: &mut Vec<ConfigError>) {
    let mut seen = HashSet::new();
    let mut keys: HashMap<String, &str> = HashMap::new();

    for (i, bot) in config.backend_bots.iter().enumerate() {
        if bot.id.trim().is_empty() {
            errors.push(invalid(format!("backend_bots[{i}].id must not be empty")));
            continue;
        }
        if !seen.insert(bot.id.as_str()) {
            errors.push(invalid(format!(
                "duplicate backend bot id `{}` in [[backend_bots]] array",
                bot.id
            )));
        }

        if bot.enabled {
            match bot.resolve_api_key() {
                None => errors.push(invalid(format!(
                    "backend bot `{}` is enabled but has no api key (set `api_key` or `api_key_env`)",
                    bot.id
                ))),
                Some(key) => {
                    if let Some(other) = keys.insert(key, bot.id.as_str()) {
                        errors.push(invalid(format!(
                            "backend bots `{other}` and `{}` share the same api key",
                            bot.id
                        )));
                    }
                }
            }
        }

        if let Some(hook) = &bot.webhook {
            validate_webhook(&bot.id, hook, bot.enabled, errors);
        }
    }
}

fn validate_webhook(
    backend_id: &str,
    hook: &WebhookConfig,
    enabled: bool,
    errors: &mut Vec<ConfigError>,
) {
    let prefix = format!("backend bot `{backend_id}` webhook");

    if !is_http_url(&hook.url) {
        errors.push(invalid(format!(
            "{prefix} url `{}` must be an http(s) URL with a host",
            hook.url
        )));
    }
    if enabled && hook.resolve_secret().is_none() {
        errors.push(invalid(format!(
            "{prefix} has no secret (set `secret` or `secret_env`)"
        )));
    }
    if hook.request_timeout_ms == 0 {
        errors.push(invalid(format!(
            "{prefix} request_timeout_ms must be greater than 0"
        )));
    }
    if hook.retry_base_ms == 0 {
        errors.push(invalid(format!("{prefix} retry_base_ms must be greater than 0")));
    }
    if hook.retry_max_ms < hook.retry_base_ms {
        errors.push(invalid(format!(
            "{prefix} retry_max_ms ({}) must be at least retry_base_ms ({})",
            hook.retry_max_ms, hook.retry_base_ms
        )));
    }
}

fn is_http_url(raw: &str) -> bool {
    url::Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}
