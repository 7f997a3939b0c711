// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Action endpoint handler

use axum::{extract::State, Json};
use axum_extra::extract::Multipart;
use std::time::Instant;
use tracing::info;

use super::request::ActionRequest;
use crate::api::caption::CaptionResponse;
use crate::api::errors::ApiErrorResponse;
use crate::api::http_server::AppState;
use crate::api::upload::UploadForm;

/// POST /action - Describe the action across an ordered frame sequence
///
/// Multipart fields: `files` (repeated), `prompt`, `num_frames`, `frame_jump`.
pub async fn action_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<CaptionResponse>, ApiErrorResponse> {
    let start = Instant::now();
    let form = UploadForm::read(multipart).await?;
    let request = ActionRequest::from_form(&form)?;
    let frame_count = request.frames.len();

    let caption = state
        .service
        .action(request.frames, request.prompt, request.sampling)
        .await?;

    info!(
        "Action described over {} frames in {}ms",
        frame_count,
        start.elapsed().as_millis()
    );
    Ok(Json(CaptionResponse::new(caption)))
}
