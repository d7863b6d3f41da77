// SPDX-FileCopyrightText: 2026 Relay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use relay_core::{ChannelAdapter, RelayError};
use relay_lease::LeaseManager;

use crate::auth::{BackendCredentials, auth_middleware};
use crate::handlers;

/// State for the unauthenticated health and metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    pub start_time: std::time::Instant,
    /// Renders Prometheus text when metrics are enabled.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

impl HealthState {
    pub fn new(prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>) -> Self {
        Self {
            start_time: std::time::Instant::now(),
            prometheus_render,
        }
    }
}

/// Shared state for authenticated handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub lease: LeaseManager,
    /// Connected chat bots keyed by id. Disabled bots are absent.
    pub channels: Arc<HashMap<String, Arc<dyn ChannelAdapter>>>,
    pub credentials: Arc<BackendCredentials>,
    pub health: HealthState,
}

/// Builds the full route table.
///
/// - GET /v1/health, GET /metrics (public)
/// - GET /v1/whoami, POST /v1/messages/{lease,ack,nack,send} (bearer auth)
pub fn build_router(state: GatewayState) -> Router {
    let public_routes = Router::new()
        .route("/v1/health", get(handlers::get_health))
        .route("/metrics", get(handlers::get_metrics))
        .with_state(state.health.clone());

    let api_routes = Router::new()
        .route("/v1/whoami", get(handlers::get_whoami))
        .route("/v1/messages/lease", post(handlers::post_lease))
        .route("/v1/messages/ack", post(handlers::post_ack))
        .route("/v1/messages/nack", post(handlers::post_nack))
        .route("/v1/messages/send", post(handlers::post_send))
        .route_layer(axum_middleware::from_fn_with_state(
            state.credentials.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
}

/// Serves on an already-bound listener until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), RelayError> {
    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| RelayError::Transport {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })
}
