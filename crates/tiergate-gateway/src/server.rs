// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    routing::{get, post},
};
use tiergate_core::TiergateError;
use tiergate_router::TierRouter;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub router: Arc<TierRouter>,
    /// Process start time for uptime calculation.
    pub start_time: Instant,
}

impl GatewayState {
    pub fn new(router: Arc<TierRouter>) -> Self {
        Self {
            router,
            start_time: Instant::now(),
        }
    }
}

/// Builds the application with every route and layer.
///
/// - GET /health, GET /v1/models
/// - POST /, POST /v1/messages, POST /v1/chat/completions
pub fn app(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route("/v1/models", get(handlers::get_models))
        .route("/", post(handlers::post_root))
        .route("/v1/messages", post(handlers::post_messages))
        .route("/v1/chat/completions", post(handlers::post_chat_completions))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Binds `host:port` and serves until `shutdown` resolves.
pub async fn serve(
    host: &str,
    port: u16,
    state: GatewayState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), TiergateError> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| TiergateError::transport(format!("failed to bind gateway to {addr}: {e}"), e))?;

    tracing::info!("Gateway server listening on {addr}");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| TiergateError::transport("gateway server error", e))
}
