// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Generation with a fixed new-token budget and clean decoding

use std::time::Instant;
use tracing::{debug, info, warn};

use super::encoder::EncodedInput;
use super::error::VlmError;
use super::model::VisionLanguageModel;

/// Default budget for single-image captions
pub const DEFAULT_CAPTION_MAX_NEW_TOKENS: usize = 32;

/// Default budget for multi-frame action descriptions
pub const DEFAULT_ACTION_MAX_NEW_TOKENS: usize = 128;

#[derive(Debug, Clone, Copy)]
pub struct InferenceRunner {
    max_new_tokens: usize,
}

impl InferenceRunner {
    pub fn new(max_new_tokens: usize) -> Self {
        Self {
            max_new_tokens: max_new_tokens.max(1),
        }
    }

    pub fn max_new_tokens(&self) -> usize {
        self.max_new_tokens
    }

    /// Generate, decode without special tokens and trim
    ///
    /// One complete string or an error; nothing partial is returned.
    pub fn generate(
        &self,
        model: &dyn VisionLanguageModel,
        encoded: &EncodedInput,
    ) -> Result<String, VlmError> {
        let start = Instant::now();

        let placement = model.placement();
        let pixel_values = if encoded.pixel_values.placement() == placement {
            encoded.pixel_values.clone()
        } else {
            warn!(
                "Model placement changed since encoding ({} -> {}), re-casting image tensor",
                encoded.pixel_values.placement(),
                placement
            );
            encoded.pixel_values.clone().to_placement(placement)
        };

        let mut generated = model
            .generate(
                &encoded.input_ids,
                &encoded.attention_mask,
                &pixel_values,
                self.max_new_tokens,
            )
            .map_err(VlmError::from_model_error)?;

        if generated.len() > self.max_new_tokens {
            warn!(
                "Model returned {} tokens for a budget of {}, truncating",
                generated.len(),
                self.max_new_tokens
            );
            generated.truncate(self.max_new_tokens);
        }
        debug!("Generated token ids: {:?}", generated);

        let text = model
            .decode(&generated, true)
            .map_err(|e| VlmError::Tokenizer(format!("{:#}", e)))?;
        let text = text.trim().to_string();

        info!(
            "Generation complete: {} tokens, {} chars, {}ms",
            generated.len(),
            text.len(),
            start.elapsed().as_millis()
        );

        Ok(text)
    }
}

impl Default for InferenceRunner {
    fn default() -> Self {
        Self::new(DEFAULT_CAPTION_MAX_NEW_TOKENS)
    }
}
