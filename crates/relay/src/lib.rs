// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Service assembly and the backend client behind the `relay` binary.

pub mod client;
pub mod serve;
pub mod shutdown;

pub use client::{ClientError, RelayClient};
pub use serve::{RelayService, load_checked_config, run_serve};
