// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the chat relay.
//!
//! This crate provides the error type, exit classes, domain types, and the
//! adapter traits used throughout the workspace. The store, the channel
//! adapters, and the nudge dispatcher all implement traits defined here.

pub mod error;
pub mod exit;
pub mod traits;
pub mod types;

pub use error::RelayError;
pub use exit::ExitClass;
pub use types::{
    AckOutcome, AdapterType, BackendIdentity, Delivery, DeliveryState, Destination,
    DestinationType, HealthStatus, InboundMessage, LeasedDelivery, MessageScope, NackOutcome,
    RawEvent, RejectReason, Rejection, ScopeType, SendReceipt, dedupe_key,
};

pub use traits::{ChannelAdapter, NoopNotifier, Notifier, PluginAdapter, StorageAdapter};
