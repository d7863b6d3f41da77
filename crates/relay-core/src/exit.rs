// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process exit classes shared by the server binary and the backend client.

use strum::Display;

/// Stable exit status classes surfaced to CLIs and orchestration wrappers.
///
/// The four failure classes are disjoint and keep the same numeric value
/// across every command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ExitClass {
    Success,
    /// Bad arguments, invalid configuration, or a rejected request.
    Usage,
    /// Missing or invalid credential.
    Auth,
    /// Network or transport failure.
    Network,
    /// Server-side failure.
    Server,
}

impl ExitClass {
    /// Numeric process exit code.
    pub fn code(self) -> i32 {
        match self {
            ExitClass::Success => 0,
            ExitClass::Usage => 2,
            ExitClass::Auth => 10,
            ExitClass::Network => 20,
            ExitClass::Server => 30,
        }
    }

    /// Classify an HTTP status returned by the relay API.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            200..=299 => ExitClass::Success,
            401 | 403 => ExitClass::Auth,
            500..=599 => ExitClass::Server,
            _ => ExitClass::Usage,
        }
    }
}
