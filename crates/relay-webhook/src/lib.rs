// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook nudges: payload-free, signed hints that a backend has pending work.
//!
//! The [`NudgeDispatcher`] is the per-process registry of nudge targets and
//! their in-flight tasks. It implements [`relay_core::Notifier`] so the
//! ingestion pipeline can hand it backend ids without awaiting any I/O.
//! Receivers verify requests with [`NudgeVerifier`].

pub mod backoff;
pub mod dispatcher;
pub mod signing;

pub use backoff::retry_delay;
pub use dispatcher::{NudgeDispatcher, NudgeOutcome, NudgeTarget, WebhookTarget, targets_from_config};
pub use signing::{
    NONCE_HEADER, NudgeVerifier, SIGNATURE_HEADER, SignedNudge, TIMESTAMP_HEADER,
    VerificationError,
};
