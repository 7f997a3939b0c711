// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Action request parsing and validation

use image::RgbImage;

use crate::api::errors::ApiError;
use crate::api::upload::UploadForm;
use crate::inference::{FrameSampling, VlmError, DEFAULT_ACTION_PROMPT};
use crate::vision::image_utils::decode_image_bytes;

/// Decoded action request
///
/// `frames` may be empty here; the service rejects that before any model call.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub frames: Vec<RgbImage>,
    pub prompt: String,
    pub sampling: FrameSampling,
}

impl ActionRequest {
    pub fn from_form(form: &UploadForm) -> Result<Self, ApiError> {
        let defaults = FrameSampling::default();
        let sampling = FrameSampling {
            num_frames: form.integer_or("num_frames", defaults.num_frames)?,
            frame_jump: form.integer_or("frame_jump", defaults.frame_jump)?,
        };

        // `files` and `file` parts both count, in upload order
        let frames = form
            .files
            .iter()
            .enumerate()
            .map(|(index, upload)| {
                decode_image_bytes(&upload.data)
                    .map(|(image, _)| image)
                    .map_err(|e| {
                        ApiError::validation(
                            &upload.field,
                            format!("frame {}: {}", index + 1, VlmError::from(e)),
                        )
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            frames,
            prompt: form.prompt_or(DEFAULT_ACTION_PROMPT)?,
            sampling,
        })
    }
}
