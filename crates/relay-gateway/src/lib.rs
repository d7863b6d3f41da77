// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP API for backend bots.
//!
//! Every route except `/v1/health` and `/metrics` requires a bearer api key
//! that maps to exactly one enabled backend bot. Errors are JSON bodies of the
//! form `{"error": ..., "code": ...}`.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;

pub use auth::BackendCredentials;
pub use error::ApiError;
pub use server::{GatewayState, HealthState, build_router, serve};
