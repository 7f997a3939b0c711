// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption request parsing and validation

use image::RgbImage;

use crate::api::errors::ApiError;
use crate::api::upload::UploadForm;
use crate::inference::{VlmError, DEFAULT_CAPTION_PROMPT};
use crate::vision::image_utils::decode_image_bytes;

/// Decoded caption request
#[derive(Debug, Clone)]
pub struct CaptionRequest {
    pub image: RgbImage,
    pub prompt: String,
}

impl CaptionRequest {
    /// Validate the form and decode its `file` part
    pub fn from_form(form: &UploadForm) -> Result<Self, ApiError> {
        let mut files = form.files_named("file");
        let upload = files
            .next()
            .ok_or_else(|| ApiError::validation("file", "file is required"))?;
        if files.next().is_some() {
            return Err(ApiError::validation("file", "exactly one file is accepted"));
        }

        let (image, info) = decode_image_bytes(&upload.data)
            .map_err(|e| ApiError::validation("file", VlmError::from(e).to_string()))?;
        tracing::debug!(
            "Caption upload {}x{} {:?} ({} bytes)",
            info.width,
            info.height,
            info.format,
            info.size_bytes
        );

        Ok(Self {
            image,
            prompt: form.prompt_or(DEFAULT_CAPTION_PROMPT)?,
        })
    }
}
