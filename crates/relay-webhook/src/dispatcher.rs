// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-process nudge registry.
//!
//! At most one task runs per backend. A `notify` that arrives while that task
//! is debouncing joins the request about to be sent; one that arrives while a
//! request is in flight schedules exactly one follow-up. Tasks are tracked so
//! shutdown can cancel their timers and wait for them.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use metrics::counter;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use relay_config::model::{BackendBotConfig, RelayConfig};
use relay_core::{Notifier, RelayError};

use crate::backoff::retry_delay;
use crate::signing::SignedNudge;

/// Endpoint settings for an HTTP webhook nudge.
#[derive(Clone, PartialEq, Eq)]
pub struct WebhookTarget {
    pub url: String,
    pub secret: String,
    pub debounce: Duration,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
}

impl std::fmt::Debug for WebhookTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookTarget")
            .field("url", &self.url)
            .field("secret", &"[REDACTED]")
            .field("debounce", &self.debounce)
            .field("request_timeout", &self.request_timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// How a backend is nudged. Each kind is started the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NudgeTarget {
    Webhook(WebhookTarget),
}

/// Final result of one nudge, after retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NudgeOutcome {
    Delivered,
    /// The endpoint answered with a non-retryable status.
    Rejected,
    /// Every retry failed.
    Exhausted,
    /// Shutdown or reconciliation stopped the task.
    Cancelled,
}

impl NudgeOutcome {
    /// Metric label value.
    pub fn as_str(&self) -> &'static str {
        match self {
            NudgeOutcome::Delivered => "delivered",
            NudgeOutcome::Rejected => "rejected",
            NudgeOutcome::Exhausted => "exhausted",
            NudgeOutcome::Cancelled => "cancelled",
        }
    }
}

impl NudgeTarget {
    /// Builds the target for a backend, if it is enabled and has a usable webhook.
    pub fn from_config(bot: &BackendBotConfig) -> Option<Self> {
        if !bot.enabled {
            return None;
        }
        let hook = bot.webhook.as_ref()?;
        let secret = hook.resolve_secret()?;
        Some(NudgeTarget::Webhook(WebhookTarget {
            url: hook.url.clone(),
            secret,
            debounce: Duration::from_millis(hook.debounce_ms),
            request_timeout: Duration::from_millis(hook.request_timeout_ms),
            max_retries: hook.max_retries,
            retry_base_ms: hook.retry_base_ms,
            retry_max_ms: hook.retry_max_ms,
        }))
    }

    fn debounce(&self) -> Duration {
        match self {
            NudgeTarget::Webhook(hook) => hook.debounce,
        }
    }

    /// Runs one nudge for `backend_bot_id` to completion.
    pub async fn start(
        &self,
        client: &reqwest::Client,
        backend_bot_id: &str,
        cancel: &CancellationToken,
    ) -> NudgeOutcome {
        match self {
            NudgeTarget::Webhook(hook) => send_webhook(client, hook, backend_bot_id, cancel).await,
        }
    }
}

/// Targets for every enabled backend with a webhook.
pub fn targets_from_config(config: &RelayConfig) -> HashMap<String, NudgeTarget> {
    config
        .backend_bots
        .iter()
        .filter_map(|bot| NudgeTarget::from_config(bot).map(|t| (bot.id.clone(), t)))
        .collect()
}

#[derive(Debug)]
struct Slot {
    /// Another request is owed once the current one finishes.
    pending: bool,
    generation: u64,
    cancel: CancellationToken,
}

struct Inner {
    client: reqwest::Client,
    targets: DashMap<String, Arc<NudgeTarget>>,
    slots: DashMap<String, Slot>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    generation: AtomicU64,
}

/// Registry of nudge targets and their running tasks.
#[derive(Clone)]
pub struct NudgeDispatcher {
    inner: Arc<Inner>,
}

impl NudgeDispatcher {
    pub fn new(targets: HashMap<String, NudgeTarget>) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RelayError::Transport {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        let dispatcher = Self {
            inner: Arc::new(Inner {
                client,
                targets: DashMap::new(),
                slots: DashMap::new(),
                tracker: TaskTracker::new(),
                cancel: CancellationToken::new(),
                generation: AtomicU64::new(0),
            }),
        };
        dispatcher.reconcile(targets);
        Ok(dispatcher)
    }

    /// Replaces the configured targets.
    ///
    /// Tasks of backends that are no longer present are cancelled, including
    /// any retry they were waiting on.
    pub fn reconcile(&self, targets: HashMap<String, NudgeTarget>) {
        let inner = &self.inner;
        inner.targets.retain(|id, _| targets.contains_key(id));
        inner.slots.retain(|id, slot| {
            let keep = targets.contains_key(id);
            if !keep {
                slot.cancel.cancel();
                debug!(backend = id.as_str(), "nudge task cancelled by reconcile");
            }
            keep
        });
        for (id, target) in targets {
            inner.targets.insert(id, Arc::new(target));
        }
        info!(targets = inner.targets.len(), "nudge targets reconciled");
    }

    /// Backends that currently have a nudge target.
    pub fn configured_backends(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.targets.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Whether a nudge task is currently running for `backend_bot_id`.
    pub fn is_active(&self, backend_bot_id: &str) -> bool {
        self.inner.slots.contains_key(backend_bot_id)
    }

    /// Cancels every timer and waits for running tasks to finish.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        self.inner.slots.clear();
        info!("nudge dispatcher drained");
    }

    fn trigger(&self, backend_bot_id: &str) {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() || !inner.targets.contains_key(backend_bot_id) {
            return;
        }

        let mut created = None;
        inner
            .slots
            .entry(backend_bot_id.to_string())
            .and_modify(|slot| slot.pending = true)
            .or_insert_with(|| {
                let slot = Slot {
                    pending: false,
                    generation: inner.generation.fetch_add(1, Ordering::Relaxed),
                    cancel: inner.cancel.child_token(),
                };
                created = Some((slot.generation, slot.cancel.clone()));
                slot
            });
        let Some((generation, cancel)) = created else {
            return;
        };

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(backend = backend_bot_id, "no async runtime; nudge dropped");
            inner.slots.remove(backend_bot_id);
            return;
        };

        let this = self.clone();
        let backend = backend_bot_id.to_string();
        inner.tracker.spawn_on(
            async move { this.run(backend, generation, cancel).await },
            &handle,
        );
    }

    async fn run(self, backend: String, generation: u64, cancel: CancellationToken) {
        let slots = &self.inner.slots;
        loop {
            let Some(target) = self.inner.targets.get(&backend).map(|t| Arc::clone(t.value()))
            else {
                break;
            };

            let debounce = target.debounce();
            if !debounce.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(debounce) => {}
                    _ = cancel.cancelled() => {
                        record(&backend, NudgeOutcome::Cancelled);
                        break;
                    }
                }
            }

            // Notifies up to this point are served by the request below.
            if let Some(mut slot) = slots.get_mut(&backend)
                && slot.generation == generation
            {
                slot.pending = false;
            }

            let outcome = target.start(&self.inner.client, &backend, &cancel).await;
            record(&backend, outcome);
            if outcome == NudgeOutcome::Cancelled {
                break;
            }

            // Done unless a notify arrived while the request was running.
            if slots
                .remove_if(&backend, |_, s| s.generation == generation && !s.pending)
                .is_some()
            {
                return;
            }
            match slots.get_mut(&backend) {
                Some(mut slot) if slot.generation == generation => slot.pending = false,
                _ => return,
            }
            debug!(backend = backend.as_str(), "coalesced follow-up nudge");
        }

        slots.remove_if(&backend, |_, s| s.generation == generation);
    }
}

impl Notifier for NudgeDispatcher {
    fn notify(&self, backend_bot_id: &str) {
        self.trigger(backend_bot_id);
    }
}

fn record(backend: &str, outcome: NudgeOutcome) {
    counter!("relay_nudges_total", "outcome" => outcome.as_str()).increment(1);
    debug!(backend, outcome = outcome.as_str(), "nudge finished");
}

enum AttemptError {
    Retryable(String),
    Permanent(StatusCode),
}

async fn send_webhook(
    client: &reqwest::Client,
    hook: &WebhookTarget,
    backend_bot_id: &str,
    cancel: &CancellationToken,
) -> NudgeOutcome {
    let mut retries = 0u32;
    loop {
        let attempt = tokio::select! {
            biased;
            _ = cancel.cancelled() => return NudgeOutcome::Cancelled,
            result = post_once(client, hook, backend_bot_id) => result,
        };

        match attempt {
            Ok(()) => return NudgeOutcome::Delivered,
            Err(AttemptError::Permanent(status)) => {
                warn!(
                    backend = backend_bot_id,
                    status = status.as_u16(),
                    "webhook rejected nudge; dropping"
                );
                return NudgeOutcome::Rejected;
            }
            Err(AttemptError::Retryable(reason)) => {
                if retries >= hook.max_retries {
                    warn!(
                        backend = backend_bot_id,
                        retries,
                        reason = reason.as_str(),
                        "nudge retries exhausted; dropping"
                    );
                    return NudgeOutcome::Exhausted;
                }
                retries += 1;
                let delay = retry_delay(retries, hook.retry_base_ms, hook.retry_max_ms);
                debug!(
                    backend = backend_bot_id,
                    retry = retries,
                    delay_ms = delay.as_millis() as u64,
                    reason = reason.as_str(),
                    "nudge failed, backing off"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return NudgeOutcome::Cancelled,
                }
            }
        }
    }
}

async fn post_once(
    client: &reqwest::Client,
    hook: &WebhookTarget,
    backend_bot_id: &str,
) -> Result<(), AttemptError> {
    let nudge = SignedNudge::new(backend_bot_id, hook.secret.as_bytes(), Utc::now())
        .map_err(|e| AttemptError::Retryable(e.to_string()))?;

    let mut request = client
        .post(&hook.url)
        .timeout(hook.request_timeout)
        .header(reqwest::header::CONTENT_TYPE, "application/json");
    for (name, value) in nudge.headers() {
        request = request.header(name, value);
    }

    match request.body(nudge.body).send().await {
        Ok(resp) => {
            let status = resp.status();
            if status.is_success() {
                Ok(())
            } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                Err(AttemptError::Retryable(format!("status {status}")))
            } else {
                Err(AttemptError::Permanent(status))
            }
        }
        Err(e) if e.is_timeout() => Err(AttemptError::Retryable("timeout".into())),
        Err(e) => Err(AttemptError::Retryable(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_config::model::WebhookConfig;

    fn bot(id: &str, enabled: bool, webhook: Option<WebhookConfig>) -> BackendBotConfig {
        BackendBotConfig {
            id: id.into(),
            name: None,
            api_key: Some(format!("{id}-key")),
            api_key_env: None,
            enabled,
            webhook,
        }
    }

    fn hook(secret: Option<&str>) -> WebhookConfig {
        WebhookConfig {
            url: "https://example.com/nudge".into(),
            secret: secret.map(String::from),
            secret_env: None,
            debounce_ms: 250,
            request_timeout_ms: 3000,
            max_retries: 5,
            retry_base_ms: 1000,
            retry_max_ms: 30_000,
        }
    }

    #[test]
    fn only_enabled_backends_with_signed_webhooks_become_targets() {
        let mut config = RelayConfig::default();
        config.backend_bots = vec![
            bot("hooked", true, Some(hook(Some("s")))),
            bot("disabled", false, Some(hook(Some("s")))),
            bot("polling", true, None),
            bot("unsigned", true, Some(hook(None))),
        ];

        let targets = targets_from_config(&config);
        assert_eq!(targets.len(), 1);
        let NudgeTarget::Webhook(target) = &targets["hooked"];
        assert_eq!(target.debounce, Duration::from_millis(250));
        assert_eq!(target.request_timeout, Duration::from_secs(3));
    }

    #[test]
    fn webhook_target_debug_redacts_secret() {
        let Some(NudgeTarget::Webhook(target)) =
            NudgeTarget::from_config(&bot("b", true, Some(hook(Some("topsecret")))))
        else {
            panic!("expected a webhook target");
        };
        let rendered = format!("{target:?}");
        assert!(!rendered.contains("topsecret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn notify_outside_a_runtime_is_dropped() {
        let mut targets = HashMap::new();
        targets.insert(
            "b".to_string(),
            NudgeTarget::from_config(&bot("b", true, Some(hook(Some("s"))))).unwrap(),
        );
        let dispatcher = NudgeDispatcher::new(targets).unwrap();
        dispatcher.notify("b");
        assert!(!dispatcher.is_active("b"));
    }
}
