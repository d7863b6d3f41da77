// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock channel adapter for deterministic testing.
//!
//! Events injected with [`MockChannel::inject`] come back from `receive()`;
//! texts passed to `send_text()` are captured for assertions.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use relay_core::{
    AdapterType, ChannelAdapter, Destination, DestinationType, HealthStatus, PluginAdapter,
    RawEvent, RelayError, SendReceipt,
};

/// A text captured by [`MockChannel::send_text`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentText {
    pub destination: Destination,
    pub content: String,
    pub reply_to: Option<String>,
}

/// A mock chat bot connection.
pub struct MockChannel {
    chat_bot_id: String,
    inbound: Mutex<VecDeque<RawEvent>>,
    notify: Notify,
    sent: Mutex<Vec<SentText>>,
    next_failure: Mutex<Option<RelayError>>,
}

impl MockChannel {
    pub fn new(chat_bot_id: impl Into<String>) -> Self {
        Self {
            chat_bot_id: chat_bot_id.into(),
            inbound: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            sent: Mutex::new(Vec::new()),
            next_failure: Mutex::new(None),
        }
    }

    /// Queue an inbound event for `receive()`.
    pub async fn inject(&self, event: RawEvent) {
        self.inbound.lock().await.push_back(event);
        self.notify.notify_one();
    }

    pub async fn sent(&self) -> Vec<SentText> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Make the next `send_text()` fail with `error` instead of sending.
    pub async fn fail_next_send(&self, error: RelayError) {
        *self.next_failure.lock().await = Some(error);
    }
}

#[async_trait]
impl PluginAdapter for MockChannel {
    fn name(&self) -> &str {
        "mock-channel"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, RelayError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RelayError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for MockChannel {
    fn chat_bot_id(&self) -> &str {
        &self.chat_bot_id
    }

    async fn connect(&mut self) -> Result<(), RelayError> {
        Ok(())
    }

    async fn send_text(
        &self,
        destination: &Destination,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<SendReceipt, RelayError> {
        if let Some(err) = self.next_failure.lock().await.take() {
            return Err(err);
        }

        self.sent.lock().await.push(SentText {
            destination: destination.clone(),
            content: content.to_string(),
            reply_to: reply_to.map(String::from),
        });

        let channel_id = match destination.kind {
            DestinationType::Channel => destination.id.clone(),
            DestinationType::Dm => format!("dm-{}", destination.id),
        };
        Ok(SendReceipt {
            remote_message_id: format!("mock-msg-{}", uuid::Uuid::new_v4()),
            channel_id,
        })
    }

    async fn receive(&self) -> Result<RawEvent, RelayError> {
        loop {
            if let Some(event) = self.inbound.lock().await.pop_front() {
                return Ok(event);
            }
            self.notify.notified().await;
        }
    }
}
