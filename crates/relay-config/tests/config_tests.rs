// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the relay configuration system.

use relay_config::diagnostic::ConfigError;
use relay_config::model::RelayConfig;
use relay_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};
use relay_core::ScopeType;

const FULL_CONFIG: &str = r#"
[server]
bind_address = "0.0.0.0"
port = 9090
log_level = "debug"

[storage]
database_path = "/tmp/relay-test.db"
wal_mode = false

[lease]
default_limit = 10
max_limit = 20
default_lease_secs = 60
max_lease_secs = 600
reaper_interval_secs = 2

[prometheus]
enabled = false

[[chat_bots]]
id = "discord-main"
name = "Main"
token = "bot-token"
channel_allowlist = ["c1", "c2"]

[[backend_bots]]
id = "support"
api_key = "support-key"

[backend_bots.webhook]
url = "https://support.example.com/nudge"
secret = "hook-secret"
debounce_ms = 250

[[backend_bots]]
id = "ops"
api_key = "ops-key"

[routing.defaults]
discord-main = "support"

[[routes]]
chat_bot_id = "discord-main"
scope_type = "channel"
scope_id = "c2"
backend_bot_id = "ops"
"#;

#[test]
fn full_config_deserializes_and_validates() {
    let config = load_and_validate_str(FULL_CONFIG).expect("full config should validate");

    assert_eq!(config.server.bind_address, "0.0.0.0");
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.server.log_level, "debug");
    assert_eq!(config.storage.database_path, "/tmp/relay-test.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.lease.max_limit, 20);
    assert_eq!(config.lease.reaper_interval_secs, 2);
    assert!(!config.prometheus.enabled);

    let chat = config.chat_bot("discord-main").expect("chat bot");
    assert_eq!(chat.display_name(), "Main");
    assert_eq!(chat.channel_allowlist, vec!["c1", "c2"]);
    assert!(chat.enabled);

    let support = config.backend_bot("support").expect("backend");
    let hook = support.webhook.as_ref().expect("webhook");
    assert_eq!(hook.debounce_ms, 250);
    assert_eq!(hook.max_retries, 5);
    assert!(config.backend_bot("ops").unwrap().webhook.is_none());

    assert_eq!(
        config.routing.defaults.get("discord-main").map(String::as_str),
        Some("support")
    );
    assert_eq!(config.routes.len(), 1);
    assert_eq!(config.routes[0].scope_type, ScopeType::Channel);
}

#[test]
fn missing_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty config is valid");
    assert_eq!(config.server.port, 8080);
    assert!(config.chat_bots.is_empty());
    assert!(config.backend_bots.is_empty());
    assert!(config.routes.is_empty());
}

#[test]
fn unknown_key_suggests_correction() {
    let toml = r#"
[server]
bind_adress = "0.0.0.0"
"#;
    let errors = load_and_validate_str(toml).expect_err("unknown key must fail");
    let found = errors.iter().any(|e| {
        matches!(
            e,
            ConfigError::UnknownKey { key, suggestion, .. }
                if key == "bind_adress" && suggestion.as_deref() == Some("bind_address")
        )
    });
    assert!(found, "expected suggestion, got {errors:?}");
}

#[test]
fn unknown_key_in_backend_bot_array_is_rejected() {
    let toml = r#"
[[backend_bots]]
id = "b1"
api_kee = "x"
"#;
    let errors = load_and_validate_str(toml).expect_err("unknown key must fail");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::UnknownKey { key, .. } if key == "api_kee"))
    );
}

#[test]
fn invalid_scope_type_is_rejected() {
    let toml = r#"
[[routes]]
chat_bot_id = "a"
scope_type = "thread"
scope_id = "t1"
backend_bot_id = "b1"
"#;
    assert!(load_config_from_str(toml).is_err());
}

#[test]
fn invalid_type_reports_key() {
    let toml = r#"
[server]
port = "eighty"
"#;
    let errors = load_and_validate_str(toml).expect_err("wrong type must fail");
    assert!(errors.iter().any(|e| e.to_string().contains("port")));
}

#[test]
fn validation_errors_are_collected() {
    let toml = r#"
[storage]
database_path = ""

[lease]
reaper_interval_secs = 0
"#;
    let errors = load_and_validate_str(toml).expect_err("two problems");
    assert_eq!(errors.len(), 2, "{errors:?}");
}

#[test]
fn load_from_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relay.toml");
    std::fs::write(&path, FULL_CONFIG).unwrap();

    let config = load_and_validate_path(&path).expect("file should load");
    assert_eq!(config.server.port, 9090);
}

#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let errors = load_and_validate_str("[server]\nprot = 1\n").unwrap_err();
    let handler = GraphicalReportHandler::new();
    let mut out = String::new();
    let diagnostic: &dyn Diagnostic = &errors[0];
    handler.render_report(&mut out, diagnostic).unwrap();
    assert!(out.contains("prot"));
}

#[test]
fn serialized_defaults_round_trip_through_figment() {
    use figment::{Figment, providers::Serialized};

    let config: RelayConfig = Figment::new()
        .merge(Serialized::defaults(RelayConfig::default()))
        .merge(("server.port", 7000))
        .extract()
        .expect("defaults plus override");
    assert_eq!(config.server.port, 7000);
    assert_eq!(config.lease.default_limit, 50);
}
