// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping of [`RelayError`] onto HTTP responses.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use relay_core::RelayError;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

/// A [`RelayError`] rendered as a JSON HTTP response.
#[derive(Debug)]
pub struct ApiError(pub RelayError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            RelayError::Validation { .. } | RelayError::DestinationInvalid { .. } => {
                StatusCode::BAD_REQUEST
            }
            RelayError::Unauthorized => StatusCode::UNAUTHORIZED,
            RelayError::UnknownChatBot { .. } => StatusCode::NOT_FOUND,
            RelayError::Transport { .. } | RelayError::Timeout { .. } => StatusCode::BAD_GATEWAY,
            RelayError::Config(_) | RelayError::Storage { .. } | RelayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(RelayError::validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = if status.is_server_error() && !matches!(status, StatusCode::BAD_GATEWAY) {
            tracing::error!(error = %self.0, "request failed");
            "internal server error".to_string()
        } else {
            self.0.to_string()
        };
        let body = ErrorResponse {
            error,
            code: self.0.code(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_class() {
        let cases = [
            (RelayError::validation("x"), StatusCode::BAD_REQUEST),
            (RelayError::Unauthorized, StatusCode::UNAUTHORIZED),
            (
                RelayError::UnknownChatBot { id: "a".into() },
                StatusCode::NOT_FOUND,
            ),
            (
                RelayError::DestinationInvalid {
                    message: "no such user".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (RelayError::transport("down"), StatusCode::BAD_GATEWAY),
            (
                RelayError::Internal("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let resp = ApiError(RelayError::Internal("db path /secret".into())).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
