// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hint sink for "this backend has pending work".

/// Receives best-effort hints that a backend has pending deliveries.
///
/// Implementations must return immediately; any I/O happens in the background.
pub trait Notifier: Send + Sync {
    fn notify(&self, backend_bot_id: &str);
}

/// Notifier that drops every hint.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _backend_bot_id: &str) {}
}
