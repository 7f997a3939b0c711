// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Contract between the caption/action pipeline and a vision-language model
//!
//! The pipeline only needs the operations below: chat templating, plain
//! tokenization, the model's own image preprocessing, a placement query and
//! greedy generation. Backends live under `crate::vision`.

use anyhow::Result;
use image::RgbImage;
use ndarray::Array4;

use super::placement::{ComputePlacement, PlacedTensor};

/// Reserved id marking the image position in a token sequence
///
/// Negative, so it can never collide with a vocabulary id.
pub const IMAGE_TOKEN_INDEX: i64 = -200;

/// Literal image placeholder expected in rendered prompts
pub const IMAGE_PLACEHOLDER: &str = "<image>";

/// One chat turn handed to the chat template
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait VisionLanguageModel: Send + Sync {
    /// Name reported in logs and `/health`
    fn model_name(&self) -> String;

    /// Render chat messages with the model's chat template
    fn apply_chat_template(
        &self,
        messages: &[ChatMessage],
        add_generation_prompt: bool,
    ) -> Result<String>;

    /// Tokenize text without adding special tokens
    fn encode_text(&self, text: &str) -> Result<Vec<i64>>;

    /// Decode ids back to text
    fn decode(&self, ids: &[i64], skip_special_tokens: bool) -> Result<String>;

    /// Run the model's image processor, producing an f32 NCHW tensor
    fn preprocess_image(&self, image: &RgbImage) -> Result<Array4<f32>>;

    /// Where the model parameters currently live
    fn placement(&self) -> ComputePlacement;

    /// Greedy generation over `input_ids`, which hold exactly one
    /// `IMAGE_TOKEN_INDEX` entry; returns only the newly generated ids
    fn generate(
        &self,
        input_ids: &[i64],
        attention_mask: &[i64],
        pixel_values: &PlacedTensor,
        max_new_tokens: usize,
    ) -> Result<Vec<i64>>;
}
