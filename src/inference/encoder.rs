// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Multimodal encoding: rendered prompt + image into model-ready inputs
//!
//! The rendered prompt is split at its single image placeholder. Both halves
//! are tokenized without special tokens (the chat template already added
//! them) and the reserved image marker is spliced in between.

use image::RgbImage;
use tracing::debug;

use super::error::VlmError;
use super::model::{VisionLanguageModel, IMAGE_PLACEHOLDER, IMAGE_TOKEN_INDEX};
use super::placement::PlacedTensor;

/// Token sequence, mask and image tensor for one generation call
#[derive(Debug, Clone)]
pub struct EncodedInput {
    /// `pre ++ [IMAGE_TOKEN_INDEX] ++ post`
    pub input_ids: Vec<i64>,
    /// All ones, same length as `input_ids`
    pub attention_mask: Vec<i64>,
    /// Index of the image marker in `input_ids`
    pub image_position: usize,
    pub pixel_values: PlacedTensor,
}

impl EncodedInput {
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }
}

/// Split `rendered_prompt` on its only placeholder
pub fn split_on_placeholder(rendered_prompt: &str) -> Result<(&str, &str), VlmError> {
    let found = rendered_prompt.matches(IMAGE_PLACEHOLDER).count();
    if found != 1 {
        return Err(VlmError::PlaceholderCount { found });
    }
    rendered_prompt
        .split_once(IMAGE_PLACEHOLDER)
        .ok_or(VlmError::PlaceholderCount { found: 0 })
}

pub fn encode(
    model: &dyn VisionLanguageModel,
    rendered_prompt: &str,
    image: &RgbImage,
) -> Result<EncodedInput, VlmError> {
    let (pre, post) = split_on_placeholder(rendered_prompt)?;

    let pre_ids = model
        .encode_text(pre)
        .map_err(|e| VlmError::Tokenizer(format!("{:#}", e)))?;
    let post_ids = model
        .encode_text(post)
        .map_err(|e| VlmError::Tokenizer(format!("{:#}", e)))?;

    let image_position = pre_ids.len();
    let mut input_ids = Vec::with_capacity(pre_ids.len() + 1 + post_ids.len());
    input_ids.extend_from_slice(&pre_ids);
    input_ids.push(IMAGE_TOKEN_INDEX);
    input_ids.extend_from_slice(&post_ids);

    let attention_mask = vec![1; input_ids.len()];

    let pixels = model
        .preprocess_image(image)
        .map_err(VlmError::from_model_error)?;

    // Placement is queried per call, never cached
    let placement = model.placement();
    let pixel_values = PlacedTensor::place(pixels, placement);

    debug!(
        "Encoded input: {} pre + 1 image + {} post tokens, pixel_values {:?} on {}",
        pre_ids.len(),
        post_ids.len(),
        pixel_values.shape(),
        placement
    );

    Ok(EncodedInput {
        input_ids,
        attention_mask,
        image_position,
        pixel_values,
    })
}
