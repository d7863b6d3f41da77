// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Discord channel adapter for the relay.
//!
//! Implements [`ChannelAdapter`] over the Discord gateway via serenity.
//! Inbound messages pass the bot/allowlist filter and are handed to
//! `receive()` as [`RawEvent`]s; `send_text()` posts to a user DM or a
//! guild channel.

pub mod handler;

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serenity::all::{
    ChannelId, Client, Context, CreateMessage, EventHandler, GatewayIntents, Http, HttpError,
    Message, MessageId, Ready, ShardManager, UserId,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use relay_config::model::ChatBotConfig;
use relay_core::{
    AdapterType, ChannelAdapter, Destination, DestinationType, HealthStatus, PluginAdapter,
    RawEvent, RelayError, SendReceipt,
};

use crate::handler::{IncomingMessage, should_ingest};

/// Discord error codes that mean the target itself is unusable.
const DESTINATION_ERROR_CODES: &[isize] = &[
    10003, // unknown channel
    10008, // unknown message (reply target)
    10013, // unknown user
    50001, // missing access
    50007, // cannot send messages to this user
    50013, // missing permissions
];

/// serenity event handler forwarding accepted messages into the adapter.
struct Forwarder {
    config: ChatBotConfig,
    tx: mpsc::Sender<RawEvent>,
    self_id: Arc<OnceLock<String>>,
}

#[serenity::async_trait]
impl EventHandler for Forwarder {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        let _ = self.self_id.set(ready.user.id.to_string());
        info!(
            chat_bot = self.config.id.as_str(),
            user = ready.user.name.as_str(),
            "discord bot connected"
        );
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        let incoming = IncomingMessage::from_message(&msg);
        if !should_ingest(&incoming, &self.config, self.self_id.get().map(String::as_str)) {
            debug!(
                chat_bot = self.config.id.as_str(),
                channel = incoming.channel_id.as_str(),
                "ignoring message"
            );
            return;
        }
        if self
            .tx
            .send(incoming.into_raw_event(&self.config.id))
            .await
            .is_err()
        {
            warn!(chat_bot = self.config.id.as_str(), "inbound channel closed, dropping message");
        }
    }
}

/// One Discord bot connection.
pub struct DiscordChannel {
    config: ChatBotConfig,
    token: String,
    http: Arc<Http>,
    inbound_tx: mpsc::Sender<RawEvent>,
    inbound_rx: tokio::sync::Mutex<mpsc::Receiver<RawEvent>>,
    shard_manager: Option<Arc<ShardManager>>,
    client_handle: Option<tokio::task::JoinHandle<()>>,
}

impl DiscordChannel {
    /// Requires a resolvable, non-empty bot token.
    pub fn new(config: ChatBotConfig) -> Result<Self, RelayError> {
        let token = config
            .resolve_token()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                RelayError::Config(format!("chat bot `{}` has no bot token", config.id))
            })?;

        let http = Arc::new(Http::new(&token));
        let (inbound_tx, inbound_rx) = mpsc::channel(256);

        Ok(Self {
            config,
            token,
            http,
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            shard_manager: None,
            client_handle: None,
        })
    }

    async fn resolve_channel(&self, destination: &Destination) -> Result<ChannelId, RelayError> {
        let raw = parse_snowflake(&destination.id)?;
        match destination.kind {
            DestinationType::Channel => Ok(ChannelId::new(raw)),
            DestinationType::Dm => {
                let dm = UserId::new(raw)
                    .create_dm_channel(&self.http)
                    .await
                    .map_err(map_send_error)?;
                Ok(dm.id)
            }
        }
    }
}

/// Discord ids are non-zero unsigned snowflakes.
fn parse_snowflake(id: &str) -> Result<u64, RelayError> {
    match id.trim().parse::<u64>() {
        Ok(n) if n != 0 => Ok(n),
        _ => Err(RelayError::DestinationInvalid {
            message: format!("`{id}` is not a discord id"),
        }),
    }
}

/// Whether Discord's answer blames the destination rather than the transport.
fn is_destination_rejection(status: u16, code: isize) -> bool {
    DESTINATION_ERROR_CODES.contains(&code) || matches!(status, 403 | 404)
}

fn map_send_error(err: serenity::Error) -> RelayError {
    if let serenity::Error::Http(HttpError::UnsuccessfulRequest(resp)) = &err
        && is_destination_rejection(resp.status_code.as_u16(), resp.error.code)
    {
        return RelayError::DestinationInvalid {
            message: resp.error.message.clone(),
        };
    }
    RelayError::transport(format!("discord request failed: {err}"))
}

#[async_trait]
impl PluginAdapter for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, RelayError> {
        match self.http.get_current_user().await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!("discord unreachable: {e}"))),
        }
    }

    async fn shutdown(&self) -> Result<(), RelayError> {
        if let Some(shards) = &self.shard_manager {
            shards.shutdown_all().await;
        }
        if let Some(handle) = &self.client_handle {
            handle.abort();
        }
        debug!(chat_bot = self.config.id.as_str(), "discord channel shut down");
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for DiscordChannel {
    fn chat_bot_id(&self) -> &str {
        &self.config.id
    }

    async fn connect(&mut self) -> Result<(), RelayError> {
        if self.client_handle.is_some() {
            return Ok(());
        }

        let intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT;

        let forwarder = Forwarder {
            config: self.config.clone(),
            tx: self.inbound_tx.clone(),
            self_id: Arc::new(OnceLock::new()),
        };

        let mut client = Client::builder(&self.token, intents)
            .event_handler(forwarder)
            .await
            .map_err(|e| {
                RelayError::transport(format!(
                    "failed to build discord client for `{}`: {e}",
                    self.config.id
                ))
            })?;

        self.shard_manager = Some(client.shard_manager.clone());
        let chat_bot = self.config.id.clone();
        info!(chat_bot = chat_bot.as_str(), "starting discord gateway");

        self.client_handle = Some(tokio::spawn(async move {
            if let Err(e) = client.start().await {
                error!(chat_bot = chat_bot.as_str(), error = %e, "discord client stopped with error");
            }
        }));
        Ok(())
    }

    async fn send_text(
        &self,
        destination: &Destination,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<SendReceipt, RelayError> {
        let channel_id = self.resolve_channel(destination).await?;

        let mut builder = CreateMessage::new().content(content);
        if let Some(reply_to) = reply_to {
            let message_id = MessageId::new(parse_snowflake(reply_to)?);
            builder = builder.reference_message((channel_id, message_id));
        }

        let sent = channel_id
            .send_message(&self.http, builder)
            .await
            .map_err(map_send_error)?;

        Ok(SendReceipt {
            remote_message_id: sent.id.to_string(),
            channel_id: sent.channel_id.to_string(),
        })
    }

    async fn receive(&self) -> Result<RawEvent, RelayError> {
        let mut rx = self.inbound_rx.lock().await;
        rx.recv()
            .await
            .ok_or_else(|| RelayError::transport("discord inbound channel closed"))
    }
}
