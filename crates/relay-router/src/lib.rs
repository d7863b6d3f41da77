// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! First-match routing of inbound chat messages to backend bots.
//!
//! [`RoutingTable`] is built once from configuration, rejecting ambiguous or
//! dangling routes, and then answers [`RoutingTable::route`] as a pure lookup
//! in strict precedence order `dm_user > channel > guild > default`.

pub mod router;

pub use router::{RouteDecision, RouteTier, RoutingTable};
