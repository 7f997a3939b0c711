// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! FastVLM-0.5B model wrapper
//!
//! Combines:
//! - Tokenizer and chat template
//! - CLIP-style image processor
//! - Vision encoder (image features)
//! - Token embedding + merged decoder (text generation)

use anyhow::{Context, Result};
use image::RgbImage;
use ndarray::Array4;
use std::sync::Arc;
use std::time::Instant;
use tokenizers::Tokenizer;
use tracing::{info, warn};

use super::config::{load_eos_token_ids, Component, FastVlmConfig, TextConfig};
use super::decoder::TextDecoder;
use super::encoder::VisionEncoder;
use super::preprocessing::FastVlmImageProcessor;
use crate::inference::chat_template::ChatTemplate;
use crate::inference::model::{ChatMessage, VisionLanguageModel};
use crate::inference::placement::{ComputePlacement, PlacedTensor};

/// Tokens tried when the configs declare no EOS id
const FALLBACK_EOS_TOKENS: &[&str] = &["<|im_end|>", "<|endoftext|>"];

#[derive(Clone)]
pub struct FastVlmModel {
    name: String,
    tokenizer: Arc<Tokenizer>,
    chat_template: ChatTemplate,
    processor: FastVlmImageProcessor,
    vision: VisionEncoder,
    decoder: TextDecoder,
}

impl std::fmt::Debug for FastVlmModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastVlmModel")
            .field("name", &self.name)
            .field("chat_template", &self.chat_template.as_str())
            .field("vision", &self.vision)
            .field("decoder", &self.decoder)
            .finish_non_exhaustive()
    }
}

impl FastVlmModel {
    /// Load every component from `config.model_dir`
    ///
    /// Fails with the missing path when the directory is incomplete.
    pub fn load(config: &FastVlmConfig) -> Result<Self> {
        let start = Instant::now();
        config.validate()?;
        info!("Loading FastVLM from {}", config.model_dir.display());

        let tokenizer = Tokenizer::from_file(config.file("tokenizer.json"))
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        info!("Loaded tokenizer with {} tokens", tokenizer.get_vocab_size(true));

        let chat_template = ChatTemplate::from_tokenizer_config(config.file("tokenizer_config.json"))
            .context("Failed to load chat template")?;
        let processor = FastVlmImageProcessor::from_file(config.file("preprocessor_config.json"))?;
        let text_config = TextConfig::from_file(&config.file("config.json"))?;

        let mut eos_token_ids = load_eos_token_ids(
            &config.file("generation_config.json"),
            &config.file("config.json"),
        )?;
        if eos_token_ids.is_empty() {
            eos_token_ids = FALLBACK_EOS_TOKENS
                .iter()
                .filter_map(|t| tokenizer.token_to_id(t))
                .map(i64::from)
                .collect();
            warn!("No eos_token_id in configs, using tokenizer ids {:?}", eos_token_ids);
        }

        let vision = VisionEncoder::new(&config.onnx_path(Component::VisionEncoder), config.intra_threads)?;
        let decoder = TextDecoder::new(
            &config.onnx_path(Component::EmbedTokens),
            &config.onnx_path(Component::Decoder),
            text_config,
            eos_token_ids,
            config.intra_threads,
            config.repetition_penalty,
        )?;

        if vision.placement().device != decoder.device() {
            warn!(
                "Vision encoder on {} but decoder on {}",
                vision.placement().device.as_str(),
                decoder.device().as_str()
            );
        }

        let name = config
            .model_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "fastvlm".to_string());

        info!(
            "FastVLM pipeline ready ({}, {}) in {}ms",
            name,
            vision.placement(),
            start.elapsed().as_millis()
        );

        Ok(Self {
            name,
            tokenizer: Arc::new(tokenizer),
            chat_template,
            processor,
            vision,
            decoder,
        })
    }
}

impl VisionLanguageModel for FastVlmModel {
    fn model_name(&self) -> String {
        self.name.clone()
    }

    fn apply_chat_template(
        &self,
        messages: &[ChatMessage],
        add_generation_prompt: bool,
    ) -> Result<String> {
        self.chat_template.render(messages, add_generation_prompt)
    }

    fn encode_text(&self, text: &str) -> Result<Vec<i64>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| anyhow::anyhow!("Failed to encode text: {}", e))?;
        Ok(encoding.get_ids().iter().map(|&id| i64::from(id)).collect())
    }

    fn decode(&self, ids: &[i64], skip_special_tokens: bool) -> Result<String> {
        let ids: Vec<u32> = ids
            .iter()
            .filter_map(|&id| u32::try_from(id).ok())
            .collect();
        self.tokenizer
            .decode(&ids, skip_special_tokens)
            .map_err(|e| anyhow::anyhow!("Decoding failed: {}", e))
    }

    fn preprocess_image(&self, image: &RgbImage) -> Result<Array4<f32>> {
        self.processor.preprocess(image)
    }

    fn placement(&self) -> ComputePlacement {
        self.vision.placement()
    }

    fn generate(
        &self,
        input_ids: &[i64],
        attention_mask: &[i64],
        pixel_values: &PlacedTensor,
        max_new_tokens: usize,
    ) -> Result<Vec<i64>> {
        let features = self.vision.encode(pixel_values)?;
        self.decoder
            .generate(input_ids, attention_mask, &features, max_new_tokens)
    }
}
