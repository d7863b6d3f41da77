// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lease protocol over the delivery store.
//!
//! [`LeaseManager`] applies request policy (limit and lease length bounds,
//! non-empty id lists) and records metrics; the store does the conditional
//! writes. [`spawn_reaper`] returns expired leases to pending on a timer.

pub mod clock;
pub mod manager;
pub mod reaper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use manager::{LeaseManager, LeaseRequest};
pub use reaper::spawn_reaper;
