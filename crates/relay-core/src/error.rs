// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the relay.

use thiserror::Error;

use crate::exit::ExitClass;

/// The primary error type used across all relay adapter traits and core operations.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Configuration errors (ambiguous routing, missing credentials, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, migration).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A request was malformed and rejected before touching any state.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Missing or unknown bearer credential.
    #[error("unauthorized")]
    Unauthorized,

    /// A send request named a chat bot that is not configured or not enabled.
    #[error("chat bot `{id}` not found or not enabled")]
    UnknownChatBot { id: String },

    /// The chat platform rejected the destination (unknown user, channel, or reply target).
    #[error("destination invalid: {message}")]
    DestinationInvalid { message: String },

    /// Network or remote-side failure while talking to an external system.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Shorthand for a [`RelayError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Shorthand for a [`RelayError::Transport`] without an underlying source.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Machine-readable error code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::Config(_) => "config_error",
            RelayError::Validation { .. } => "validation_error",
            RelayError::Unauthorized => "unauthorized",
            RelayError::UnknownChatBot { .. } => "unknown_chat_bot",
            RelayError::DestinationInvalid { .. } => "destination_invalid",
            RelayError::Transport { .. } | RelayError::Timeout { .. } => "transport_error",
            RelayError::Storage { .. } | RelayError::Internal(_) => "internal_error",
        }
    }

    /// The exit class a CLI or orchestration wrapper reports for this error.
    pub fn exit_class(&self) -> ExitClass {
        match self {
            RelayError::Config(_)
            | RelayError::Validation { .. }
            | RelayError::UnknownChatBot { .. }
            | RelayError::DestinationInvalid { .. } => ExitClass::Usage,
            RelayError::Unauthorized => ExitClass::Auth,
            RelayError::Transport { .. } | RelayError::Timeout { .. } => ExitClass::Network,
            RelayError::Storage { .. } | RelayError::Internal(_) => ExitClass::Server,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_maps_to_a_non_success_exit_class() {
        let errors = vec![
            RelayError::Config("bad".into()),
            RelayError::Storage {
                source: Box::new(std::io::Error::other("disk")),
            },
            RelayError::validation("limit out of range"),
            RelayError::Unauthorized,
            RelayError::UnknownChatBot { id: "a".into() },
            RelayError::DestinationInvalid {
                message: "no such channel".into(),
            },
            RelayError::transport("connection reset"),
            RelayError::Timeout {
                duration: std::time::Duration::from_secs(3),
            },
            RelayError::Internal("boom".into()),
        ];

        for err in &errors {
            assert_ne!(err.exit_class(), ExitClass::Success, "{err}");
        }
    }

    #[test]
    fn exit_classes_follow_error_taxonomy() {
        assert_eq!(RelayError::Unauthorized.exit_class(), ExitClass::Auth);
        assert_eq!(
            RelayError::validation("x").exit_class(),
            ExitClass::Usage
        );
        assert_eq!(
            RelayError::transport("x").exit_class(),
            ExitClass::Network
        );
        assert_eq!(
            RelayError::Internal("x".into()).exit_class(),
            ExitClass::Server
        );
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(RelayError::Unauthorized.code(), "unauthorized");
        assert_eq!(
            RelayError::UnknownChatBot { id: "x".into() }.code(),
            "unknown_chat_bot"
        );
        assert_eq!(RelayError::transport("x").code(), "transport_error");
    }
}
