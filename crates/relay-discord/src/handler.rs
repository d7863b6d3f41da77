// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound filtering and conversion of Discord messages into [`RawEvent`]s.

use chrono::{DateTime, Utc};
use serenity::all::Message;

use relay_config::model::ChatBotConfig;
use relay_core::{MessageScope, RawEvent};

/// The parts of a Discord message the relay cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub message_id: String,
    pub author_id: String,
    pub author_name: String,
    pub author_is_bot: bool,
    pub guild_id: Option<String>,
    pub channel_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn from_message(msg: &Message) -> Self {
        let timestamp = DateTime::parse_from_rfc3339(&msg.timestamp.to_string())
            .map(|t| t.with_timezone(&Utc))
            .ok()
            .or_else(|| DateTime::from_timestamp(msg.timestamp.unix_timestamp(), 0))
            .unwrap_or_else(Utc::now);

        Self {
            message_id: msg.id.to_string(),
            author_id: msg.author.id.to_string(),
            author_name: msg.author.name.clone(),
            author_is_bot: msg.author.bot,
            guild_id: msg.guild_id.map(|g| g.to_string()),
            channel_id: msg.channel_id.to_string(),
            content: msg.content.clone(),
            timestamp,
        }
    }

    /// Messages outside a guild are direct messages.
    pub fn is_dm(&self) -> bool {
        self.guild_id.is_none()
    }

    pub fn into_raw_event(self, chat_bot_id: &str) -> RawEvent {
        let is_dm = self.is_dm();
        RawEvent {
            chat_bot_id: chat_bot_id.to_string(),
            platform_message_id: self.message_id,
            timestamp: self.timestamp,
            content: self.content,
            scope: MessageScope {
                is_dm,
                guild_id: self.guild_id,
                channel_id: Some(self.channel_id),
                author_id: self.author_id,
                author_name: self.author_name,
            },
        }
    }
}

/// Whether a message should be ingested for this chat bot.
///
/// Bot-authored messages (this bot's own included) are dropped. DMs always
/// pass; guild messages must come from an allowed channel.
pub fn should_ingest(msg: &IncomingMessage, config: &ChatBotConfig, self_id: Option<&str>) -> bool {
    if msg.author_is_bot || self_id.is_some_and(|id| id == msg.author_id) {
        return false;
    }
    msg.is_dm() || config.allows_channel(&msg.channel_id)
}
