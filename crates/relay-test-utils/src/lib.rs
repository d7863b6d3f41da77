// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for relay integration tests.
//!
//! Provides mock adapters and a harness wiring the real store, router, lease
//! manager and ingest pipeline over a temp SQLite database.
//!
//! # Components
//!
//! - [`TestHarness`] - assembled relay core with a manual clock
//! - [`MockChannel`] - channel adapter with injectable events and captured sends
//! - [`RecordingNotifier`] - notifier that remembers every nudge

pub mod harness;
pub mod mock_channel;
pub mod recording;

pub use harness::{DEFAULT_CONFIG, TestHarness, TestHarnessBuilder};
pub use mock_channel::{MockChannel, SentText};
pub use recording::RecordingNotifier;
