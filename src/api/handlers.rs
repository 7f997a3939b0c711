// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::api::http_server::AppState;
use crate::version;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
    pub device: String,
    pub precision: String,
    pub version: String,
}

/// GET /health - Loaded model and where it runs
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let placement = state.service.placement();
    Json(HealthResponse {
        status: "ok".to_string(),
        model: state.service.model_name(),
        device: placement.device.as_str().to_string(),
        precision: placement.precision.as_str().to_string(),
        version: version::VERSION.to_string(),
    })
}
