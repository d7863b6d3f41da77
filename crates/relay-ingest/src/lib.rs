// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns raw chat events into stored messages and pending deliveries.

pub mod pipeline;

pub use pipeline::{IngestOutcome, IngestPipeline};
