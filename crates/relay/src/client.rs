// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the relay API, used by the backend CLI commands.
//!
//! Responses are passed through as JSON values. Failures carry enough to
//! pick the process exit class.

use std::time::Duration;

use reqwest::Method;
use serde_json::{Value, json};
use thiserror::Error;

use relay_config::RelayConfig;
use relay_core::{Destination, ExitClass};

#[derive(Debug, Error)]
pub enum ClientError {
    /// Missing or contradictory client settings.
    #[error("{0}")]
    Usage(String),

    #[error("network error: {0}")]
    Network(String),

    /// The relay answered with a non-success status.
    #[error("relay returned HTTP {status}: {body}")]
    Http { status: u16, body: Value },
}

impl ClientError {
    pub fn exit_class(&self) -> ExitClass {
        match self {
            ClientError::Usage(_) => ExitClass::Usage,
            ClientError::Network(_) => ExitClass::Network,
            ClientError::Http { status, .. } => ExitClass::from_http_status(*status),
        }
    }
}

/// Picks the base URL and api key: explicit values first, then the config
/// file's `server.base_url` and the selected backend's key.
///
/// Without `backend_id` the key of the only enabled backend is used.
pub fn resolve_credentials(
    base_url: Option<String>,
    api_key: Option<String>,
    backend_id: Option<&str>,
    config: Option<&RelayConfig>,
) -> Result<(String, String), ClientError> {
    let base_url = base_url
        .or_else(|| config.map(|c| c.server.effective_base_url()))
        .ok_or_else(|| ClientError::Usage("no base url: pass --base-url or set RELAY_BASE_URL".into()))?;

    let api_key = match api_key.filter(|k| !k.is_empty()) {
        Some(key) => key,
        None => {
            let config = config.ok_or_else(|| {
                ClientError::Usage("no api key: pass --api-key or set RELAY_API_KEY".into())
            })?;
            let bot = match backend_id {
                Some(id) => config
                    .backend_bot(id)
                    .ok_or_else(|| ClientError::Usage(format!("backend bot `{id}` is not configured")))?,
                None => {
                    let enabled: Vec<_> = config.backend_bots.iter().filter(|b| b.enabled).collect();
                    match enabled.as_slice() {
                        [only] => *only,
                        [] => {
                            return Err(ClientError::Usage(
                                "no api key: pass --api-key or configure a backend bot".into(),
                            ));
                        }
                        _ => {
                            return Err(ClientError::Usage(
                                "several backend bots configured: pass --backend-id".into(),
                            ));
                        }
                    }
                }
            };
            bot.resolve_api_key().ok_or_else(|| {
                ClientError::Usage(format!("backend bot `{}` has no api key", bot.id))
            })?
        }
    };

    Ok((base_url.trim_end_matches('/').to_string(), api_key))
}

/// Authenticated client for one backend bot.
pub struct RelayClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl RelayClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("relay-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::Usage(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub async fn whoami(&self) -> Result<Value, ClientError> {
        self.request(Method::GET, "/v1/whoami", None).await
    }

    pub async fn lease(
        &self,
        limit: Option<u32>,
        lease_seconds: Option<u32>,
    ) -> Result<Value, ClientError> {
        self.lease_with_history(limit, lease_seconds, false, None).await
    }

    /// Lease, optionally asking for each message's earlier conversation.
    pub async fn lease_with_history(
        &self,
        limit: Option<u32>,
        lease_seconds: Option<u32>,
        include_history: bool,
        history_limit: Option<u32>,
    ) -> Result<Value, ClientError> {
        let mut body = serde_json::Map::new();
        if let Some(limit) = limit {
            body.insert("limit".into(), json!(limit));
        }
        if let Some(secs) = lease_seconds {
            body.insert("lease_seconds".into(), json!(secs));
        }
        if include_history {
            body.insert("include_conversation_history".into(), json!(true));
        }
        if let Some(history_limit) = history_limit {
            body.insert("conversation_history_limit".into(), json!(history_limit));
        }
        self.request(Method::POST, "/v1/messages/lease", Some(Value::Object(body)))
            .await
    }

    pub async fn ack(&self, lease_id: &str, delivery_ids: &[String]) -> Result<Value, ClientError> {
        let body = json!({ "lease_id": lease_id, "delivery_ids": delivery_ids });
        self.request(Method::POST, "/v1/messages/ack", Some(body)).await
    }

    pub async fn nack(
        &self,
        lease_id: &str,
        delivery_ids: &[String],
        reason: Option<&str>,
    ) -> Result<Value, ClientError> {
        let body = json!({ "lease_id": lease_id, "delivery_ids": delivery_ids, "reason": reason });
        self.request(Method::POST, "/v1/messages/nack", Some(body)).await
    }

    pub async fn send(
        &self,
        chat_bot_id: &str,
        destination: &Destination,
        content: &str,
        reply_to_id: Option<&str>,
    ) -> Result<Value, ClientError> {
        let body = json!({
            "chat_bot_id": chat_bot_id,
            "destination": destination,
            "content": content,
            "reply_to_id": reply_to_id,
        });
        self.request(Method::POST, "/v1/messages/send", Some(body)).await
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.request(method, &url).bearer_auth(&self.api_key);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Network(format!("{url}: {e}")))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::Network(format!("{url}: {e}")))?;

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        if status.is_success() {
            Ok(body)
        } else {
            Err(ClientError::Http {
                status: status.as_u16(),
                body,
            })
        }
    }
}
