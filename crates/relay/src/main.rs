// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relay - bridges chat bots to backend bots through a leased delivery queue.
//!
//! This is the binary entry point: the service (`serve`), configuration
//! checking, and the backend client commands.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde_json::Value;

use relay::client::{ClientError, RelayClient, resolve_credentials};
use relay_config::RelayConfig;
use relay_core::{Destination, DestinationType, ExitClass};

/// Relay - bridges chat bots to backend bots.
#[derive(Parser, Debug)]
#[command(name = "relay", version, about, long_about = None)]
struct Cli {
    /// Load this config file instead of the XDG hierarchy.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the relay service.
    Serve,
    /// Inspect relay configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
    /// Show which backend bot the api key belongs to.
    Whoami(ClientArgs),
    /// Lease pending messages.
    Lease {
        #[command(flatten)]
        client: ClientArgs,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        lease_seconds: Option<u32>,
        /// Attach earlier messages of each leased message's conversation.
        #[arg(long)]
        include_history: bool,
        /// Maximum conversation history messages per leased message (1-100).
        #[arg(long, requires = "include_history")]
        history_limit: Option<u32>,
    },
    /// Acknowledge leased deliveries.
    Ack {
        #[command(flatten)]
        client: ClientArgs,
        #[arg(long)]
        lease_id: String,
        #[arg(required = true)]
        delivery_ids: Vec<String>,
    },
    /// Release leased deliveries back to the queue.
    Nack {
        #[command(flatten)]
        client: ClientArgs,
        #[arg(long)]
        lease_id: String,
        #[arg(long)]
        reason: Option<String>,
        #[arg(required = true)]
        delivery_ids: Vec<String>,
    },
    /// Send a message through a chat bot.
    Send {
        #[command(flatten)]
        client: ClientArgs,
        #[arg(long)]
        chat_bot_id: String,
        #[arg(long, conflicts_with = "channel_id", required_unless_present = "channel_id")]
        dm_user_id: Option<String>,
        #[arg(long)]
        channel_id: Option<String>,
        #[arg(long)]
        content: String,
        #[arg(long)]
        reply_to: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Load and validate configuration and routing without starting.
    Check,
}

#[derive(Args, Debug)]
struct ClientArgs {
    #[arg(long, env = "RELAY_BASE_URL")]
    base_url: Option<String>,
    #[arg(long, env = "RELAY_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    /// Backend bot whose configured key to use.
    #[arg(long)]
    backend_id: Option<String>,
    /// Request timeout in seconds.
    #[arg(long, default_value_t = 10)]
    timeout: u64,
    /// Pretty-print JSON output.
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let class = run(cli).await;
    std::process::exit(class.code());
}

async fn run(cli: Cli) -> ExitClass {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve => {
            let config = match relay::load_checked_config(config_path) {
                Ok(config) => config,
                Err(errors) => {
                    relay_config::render_errors(&errors);
                    return ExitClass::Usage;
                }
            };
            match relay::run_serve(config).await {
                Ok(()) => ExitClass::Success,
                Err(e) => {
                    eprintln!("error: {e}");
                    e.exit_class()
                }
            }
        }
        Commands::Config {
            action: ConfigCommands::Check,
        } => match relay::load_checked_config(config_path) {
            Ok(config) => {
                println!(
                    "configuration ok: {} chat bot(s), {} backend bot(s), {} route(s)",
                    config.chat_bots.len(),
                    config.backend_bots.len(),
                    config.routes.len()
                );
                ExitClass::Success
            }
            Err(errors) => {
                relay_config::render_errors(&errors);
                ExitClass::Usage
            }
        },
        Commands::Whoami(args) => {
            run_client(&args, config_path, |c| async move { c.whoami().await }).await
        }
        Commands::Lease {
            client,
            limit,
            lease_seconds,
            include_history,
            history_limit,
        } => {
            run_client(&client, config_path, |c| async move {
                c.lease_with_history(limit, lease_seconds, include_history, history_limit)
                    .await
            })
            .await
        }
        Commands::Ack {
            client,
            lease_id,
            delivery_ids,
        } => {
            run_client(&client, config_path, |c| async move {
                c.ack(&lease_id, &delivery_ids).await
            })
            .await
        }
        Commands::Nack {
            client,
            lease_id,
            reason,
            delivery_ids,
        } => {
            run_client(&client, config_path, |c| async move {
                c.nack(&lease_id, &delivery_ids, reason.as_deref()).await
            })
            .await
        }
        Commands::Send {
            client,
            chat_bot_id,
            dm_user_id,
            channel_id,
            content,
            reply_to,
        } => {
            let destination = match destination_from_flags(dm_user_id, channel_id) {
                Some(d) => d,
                None => {
                    eprintln!("error: pass exactly one of --dm-user-id or --channel-id");
                    return ExitClass::Usage;
                }
            };
            run_client(&client, config_path, |c| async move {
                c.send(&chat_bot_id, &destination, &content, reply_to.as_deref())
                    .await
            })
            .await
        }
    }
}

fn destination_from_flags(dm_user_id: Option<String>, channel_id: Option<String>) -> Option<Destination> {
    match (dm_user_id, channel_id) {
        (Some(id), None) => Some(Destination {
            kind: DestinationType::Dm,
            id,
        }),
        (None, Some(id)) => Some(Destination {
            kind: DestinationType::Channel,
            id,
        }),
        _ => None,
    }
}

/// Config is only read when a flag or env var left something unset.
fn client_config(args: &ClientArgs, path: Option<&Path>) -> Result<Option<RelayConfig>, ClientError> {
    if args.base_url.is_some() && args.api_key.is_some() {
        return Ok(None);
    }
    let loaded = match path {
        Some(path) => relay_config::load_config_from_path(path),
        None => relay_config::load_config(),
    };
    loaded
        .map(Some)
        .map_err(|e| ClientError::Usage(format!("failed to load config: {e}")))
}

async fn run_client<F, Fut>(args: &ClientArgs, config_path: Option<&Path>, call: F) -> ExitClass
where
    F: FnOnce(RelayClient) -> Fut,
    Fut: std::future::Future<Output = Result<Value, ClientError>>,
{
    let result = async {
        let config = client_config(args, config_path)?;
        let (base_url, api_key) = resolve_credentials(
            args.base_url.clone(),
            args.api_key.clone(),
            args.backend_id.as_deref(),
            config.as_ref(),
        )?;
        let client = RelayClient::new(&base_url, &api_key, Duration::from_secs(args.timeout))?;
        call(client).await
    }
    .await;

    match result {
        Ok(body) => {
            println!("{}", render_json(&body, args.pretty));
            ExitClass::Success
        }
        Err(ClientError::Http { status, body }) => {
            eprintln!("{}", render_json(&serde_json::json!({ "status": status, "body": body }), args.pretty));
            ExitClass::from_http_status(status)
        }
        Err(e) => {
            let class = e.exit_class();
            eprintln!("error: {e}");
            class
        }
    }
}

fn render_json(value: &Value, pretty: bool) -> String {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    rendered.unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn ack_requires_ids() {
        assert!(Cli::try_parse_from(["relay", "ack", "--lease-id", "l"]).is_err());
        let cli = Cli::try_parse_from(["relay", "ack", "--lease-id", "l", "d1", "d2"]).unwrap();
        match cli.command {
            Commands::Ack { delivery_ids, .. } => assert_eq!(delivery_ids, vec!["d1", "d2"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn history_limit_needs_include_history() {
        assert!(Cli::try_parse_from(["relay", "lease", "--history-limit", "5"]).is_err());
        let cli = Cli::try_parse_from([
            "relay",
            "lease",
            "--include-history",
            "--history-limit",
            "5",
        ])
        .unwrap();
        match cli.command {
            Commands::Lease {
                include_history,
                history_limit,
                ..
            } => {
                assert!(include_history);
                assert_eq!(history_limit, Some(5));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn send_needs_exactly_one_destination() {
        assert!(
            Cli::try_parse_from(["relay", "send", "--chat-bot-id", "A", "--content", "x"]).is_err()
        );
        assert!(
            Cli::try_parse_from([
                "relay", "send", "--chat-bot-id", "A", "--content", "x", "--dm-user-id", "U",
                "--channel-id", "C",
            ])
            .is_err()
        );
        assert!(
            Cli::try_parse_from([
                "relay", "send", "--chat-bot-id", "A", "--content", "x", "--channel-id", "C",
            ])
            .is_ok()
        );
    }

    #[test]
    fn global_config_flag_parses_after_subcommand() {
        let cli = Cli::try_parse_from(["relay", "config", "check", "--config", "/tmp/r.toml"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some(Path::new("/tmp/r.toml")));
    }

    #[test]
    fn destination_flags_map_to_kinds() {
        let dm = destination_from_flags(Some("U1".into()), None).unwrap();
        assert_eq!(dm.kind, DestinationType::Dm);
        let ch = destination_from_flags(None, Some("C1".into())).unwrap();
        assert_eq!(ch.kind, DestinationType::Channel);
        assert!(destination_from_flags(None, None).is_none());
    }
}
