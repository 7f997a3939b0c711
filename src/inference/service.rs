// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption and action pipelines on top of a loaded vision-language model

use image::RgbImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use super::encoder;
use super::error::VlmError;
use super::model::VisionLanguageModel;
use super::placement::ComputePlacement;
use super::prompt;
use super::runner::{InferenceRunner, DEFAULT_ACTION_MAX_NEW_TOKENS, DEFAULT_CAPTION_MAX_NEW_TOKENS};
use crate::vision::compositor::{FrameCompositor, FrameSequence};

/// Sampling hints accepted by `/action`
///
/// Logged for diagnostics; frames are used exactly as uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSampling {
    pub num_frames: u32,
    pub frame_jump: u32,
}

impl Default for FrameSampling {
    fn default() -> Self {
        Self {
            num_frames: 1,
            frame_jump: 1,
        }
    }
}

#[derive(Clone)]
pub struct VlmService {
    model: Arc<dyn VisionLanguageModel>,
    compositor: Arc<FrameCompositor>,
    caption_runner: InferenceRunner,
    action_runner: InferenceRunner,
}

impl std::fmt::Debug for VlmService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VlmService")
            .field("model", &self.model.model_name())
            .field("caption_runner", &self.caption_runner)
            .field("action_runner", &self.action_runner)
            .finish_non_exhaustive()
    }
}

impl VlmService {
    pub fn new(model: Arc<dyn VisionLanguageModel>, compositor: FrameCompositor) -> Self {
        Self {
            model,
            compositor: Arc::new(compositor),
            caption_runner: InferenceRunner::new(DEFAULT_CAPTION_MAX_NEW_TOKENS),
            action_runner: InferenceRunner::new(DEFAULT_ACTION_MAX_NEW_TOKENS),
        }
    }

    pub fn with_token_budgets(mut self, caption: usize, action: usize) -> Self {
        self.caption_runner = InferenceRunner::new(caption);
        self.action_runner = InferenceRunner::new(action);
        self
    }

    pub fn model_name(&self) -> String {
        self.model.model_name()
    }

    pub fn placement(&self) -> ComputePlacement {
        self.model.placement()
    }

    /// Caption one image
    pub async fn caption(&self, image: RgbImage, instruction: String) -> Result<String, VlmError> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || {
            let frames = FrameSequence::single(image);
            service.run_pipeline(&frames, &instruction, service.caption_runner)
        })
        .await
        .map_err(join_error)?
    }

    /// Describe the action across an ordered frame sequence
    pub async fn action(
        &self,
        frames: Vec<RgbImage>,
        instruction: String,
        sampling: FrameSampling,
    ) -> Result<String, VlmError> {
        // Rejected here so an empty upload never reaches the model
        let frames = FrameSequence::new(frames)?;

        info!(
            "Action request: {} frames (num_frames={}, frame_jump={})",
            frames.len(),
            sampling.num_frames,
            sampling.frame_jump
        );

        let service = self.clone();
        tokio::task::spawn_blocking(move || {
            service.run_pipeline(&frames, &instruction, service.action_runner)
        })
        .await
        .map_err(join_error)?
    }

    /// compose -> build -> render -> encode -> generate
    fn run_pipeline(
        &self,
        frames: &FrameSequence,
        instruction: &str,
        runner: InferenceRunner,
    ) -> Result<String, VlmError> {
        let start = Instant::now();

        let composite = self.compositor.compose(frames)?;
        let instruction_text = prompt::build(instruction, frames.len())?;
        let rendered = prompt::render(self.model.as_ref(), &instruction_text)?;
        debug!("Rendered prompt: {:?}", rendered);

        let encoded = encoder::encode(self.model.as_ref(), &rendered, &composite)?;
        let text = runner.generate(self.model.as_ref(), &encoded)?;

        info!(
            "Pipeline finished for {} frame(s), {} input tokens, {}ms",
            frames.len(),
            encoded.len(),
            start.elapsed().as_millis()
        );
        Ok(text)
    }
}

fn join_error(err: tokio::task::JoinError) -> VlmError {
    error!("Inference task failed: {}", err);
    VlmError::Model(format!("inference task failed: {}", err))
}
