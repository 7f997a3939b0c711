// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Prompt construction for single images and composited frame sequences

use tracing::debug;

use super::error::VlmError;
use super::model::{ChatMessage, VisionLanguageModel, IMAGE_PLACEHOLDER};

/// Default instruction for `/caption`
pub const DEFAULT_CAPTION_PROMPT: &str = "Describe in one sentence";

/// Default instruction for `/action`
pub const DEFAULT_ACTION_PROMPT: &str = "Describe what you see in this image.";

/// Wrap the caller's instruction for `frame_count` frames
///
/// The instruction is embedded verbatim in both variants.
pub fn build(instruction: &str, frame_count: usize) -> Result<String, VlmError> {
    match frame_count {
        0 => Err(VlmError::EmptyFrames),
        1 => Ok(format!("Describe what you see in this image. {}", instruction)),
        n => Ok(format!(
            "You are shown {n} consecutive frames of a video, combined left to right into one \
             image and labeled 1 to {n} in order. Answer with a single concise, unambiguous \
             statement about the sequence as a whole. {instruction}"
        )),
    }
}

/// Render the one-turn user message through the model's chat template
pub fn render(model: &dyn VisionLanguageModel, instruction_text: &str) -> Result<String, VlmError> {
    let messages = [ChatMessage::user(format!(
        "{}\n{}",
        IMAGE_PLACEHOLDER, instruction_text
    ))];

    let rendered = model
        .apply_chat_template(&messages, true)
        .map_err(|e| VlmError::Template(format!("{:#}", e)))?;

    debug!("Rendered prompt ({} chars)", rendered.len());
    Ok(rendered)
}
