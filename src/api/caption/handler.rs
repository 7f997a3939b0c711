// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption endpoint handler

use axum::{extract::State, Json};
use axum_extra::extract::Multipart;
use std::time::Instant;
use tracing::info;

use super::request::CaptionRequest;
use super::response::CaptionResponse;
use crate::api::errors::ApiErrorResponse;
use crate::api::http_server::AppState;
use crate::api::upload::UploadForm;

/// POST /caption - Describe a single image
///
/// Multipart fields: `file` (required) and `prompt` (optional).
pub async fn caption_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<CaptionResponse>, ApiErrorResponse> {
    let start = Instant::now();
    let form = UploadForm::read(multipart).await?;
    let request = CaptionRequest::from_form(&form)?;

    let caption = state.service.caption(request.image, request.prompt).await?;

    info!(
        "Caption generated in {}ms ({} chars)",
        start.elapsed().as_millis(),
        caption.len()
    );
    Ok(Json(CaptionResponse::new(caption)))
}
