// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer authentication for backend bots.
//!
//! Keys are held only as SHA-256 digests. A presented token is hashed and
//! looked up; the matching backend identity is attached to the request.

use std::collections::HashMap;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use relay_config::RelayConfig;
use relay_core::{BackendIdentity, RelayError};

use crate::error::ApiError;

type KeyDigest = [u8; 32];

fn digest(token: &str) -> KeyDigest {
    Sha256::digest(token.as_bytes()).into()
}

/// Api-key digests of every enabled backend bot.
#[derive(Clone, Default)]
pub struct BackendCredentials {
    by_digest: HashMap<KeyDigest, BackendIdentity>,
}

impl std::fmt::Debug for BackendCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendCredentials")
            .field("backends", &self.by_digest.len())
            .finish()
    }
}

impl BackendCredentials {
    /// Disabled backends and backends without a resolvable key get no credential.
    pub fn from_config(config: &RelayConfig) -> Self {
        let mut creds = Self::default();
        for bot in config.backend_bots.iter().filter(|b| b.enabled) {
            if let Some(key) = bot.resolve_api_key() {
                creds.insert(
                    &key,
                    BackendIdentity {
                        id: bot.id.clone(),
                        name: bot.display_name().to_string(),
                    },
                );
            }
        }
        creds
    }

    pub fn insert(&mut self, api_key: &str, identity: BackendIdentity) {
        self.by_digest.insert(digest(api_key), identity);
    }

    pub fn authenticate(&self, token: &str) -> Option<&BackendIdentity> {
        if token.is_empty() {
            return None;
        }
        self.by_digest.get(&digest(token))
    }

    pub fn len(&self) -> usize {
        self.by_digest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_digest.is_empty()
    }
}

/// Pulls the token out of an `Authorization: Bearer <token>` header value.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|t| !t.is_empty())
}

/// Rejects the request with 401 unless it carries a known backend api key.
pub async fn auth_middleware(
    State(creds): State<Arc<BackendCredentials>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .and_then(|token| creds.authenticate(token))
        .cloned();

    let Some(identity) = identity else {
        tracing::debug!(path = %request.uri().path(), "rejected unauthenticated request");
        return Err(ApiError(RelayError::Unauthorized));
    };

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}
