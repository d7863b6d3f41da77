// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Mutex;

use relay_core::Notifier;

/// Notifier that records backend ids in call order.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    nudges: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nudges(&self) -> Vec<String> {
        self.nudges.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.nudges.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, backend_bot_id: &str) {
        self.nudges
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(backend_bot_id.to_string());
    }
}
