// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error type shared by the caption/action pipeline

use thiserror::Error;

use crate::vision::image_utils::ImageError;

#[derive(Debug, Error)]
pub enum VlmError {
    #[error("Invalid image: {0}")]
    Image(#[from] ImageError),

    #[error("At least one frame is required")]
    EmptyFrames,

    #[error("Frame {index} has invalid dimensions {width}x{height}")]
    InvalidFrame { index: usize, width: u32, height: u32 },

    #[error("Composite of {width}x{height} exceeds the {max_width} px width or {max_pixels} px area limit")]
    CompositeTooLarge {
        width: u64,
        height: u32,
        max_width: u64,
        max_pixels: u64,
    },

    #[error("Rendered prompt must contain exactly one image placeholder, found {found}")]
    PlaceholderCount { found: usize },

    #[error("Chat template rendering failed: {0}")]
    Template(String),

    #[error("Tokenization failed: {0}")]
    Tokenizer(String),

    #[error("Compute resources exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Model execution failed: {0}")]
    Model(String),
}

impl VlmError {
    /// True when the failure was caused by the caller's data rather than the service
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            VlmError::Image(_)
                | VlmError::EmptyFrames
                | VlmError::InvalidFrame { .. }
                | VlmError::CompositeTooLarge { .. }
        )
    }

    /// Classify a backend failure, separating allocation failures from other errors
    pub fn from_model_error(err: anyhow::Error) -> Self {
        let message = format!("{:#}", err);
        let lowered = message.to_lowercase();
        if lowered.contains("out of memory")
            || lowered.contains("failed to allocate")
            || lowered.contains("cudaerrormemoryallocation")
            || lowered.contains("bad_alloc")
        {
            VlmError::ResourceExhausted(message)
        } else {
            VlmError::Model(message)
        }
    }
}
