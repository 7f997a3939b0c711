// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::action::action_handler;
use super::caption::caption_handler;
use super::handlers::health_handler;
use crate::inference::VlmService;

#[derive(Clone)]
pub struct AppState {
    pub service: VlmService,
}

impl AppState {
    pub fn new(service: VlmService) -> Self {
        Self { service }
    }
}

pub fn create_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_handler))
        // Single image caption
        .route("/caption", post(caption_handler))
        // Multi-frame action description
        .route("/action", post(action_handler))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(
    addr: SocketAddr,
    state: AppState,
    max_body_bytes: usize,
) -> anyhow::Result<()> {
    let app = create_router(state, max_body_bytes);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
