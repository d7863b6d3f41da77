// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel adapter trait for chat platform integrations.

use async_trait::async_trait;

use crate::error::RelayError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Destination, RawEvent, SendReceipt};

/// One chat bot connection: the ingestion client and the send path.
///
/// `send_text` reports [`RelayError::DestinationInvalid`] when the platform
/// rejects the target and [`RelayError::Transport`] for everything else.
#[async_trait]
pub trait ChannelAdapter: PluginAdapter {
    /// The configured chat bot id this adapter speaks for.
    fn chat_bot_id(&self) -> &str;

    /// Establishes a connection to the chat platform.
    async fn connect(&mut self) -> Result<(), RelayError>;

    /// Sends a text message. Never retried internally.
    async fn send_text(
        &self,
        destination: &Destination,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<SendReceipt, RelayError>;

    /// Receives the next inbound event from the platform.
    async fn receive(&self) -> Result<RawEvent, RelayError>;
}
