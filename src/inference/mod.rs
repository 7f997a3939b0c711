// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption/action pipeline: prompt building, multimodal encoding and generation
pub mod chat_template;
pub mod encoder;
pub mod error;
pub mod model;
pub mod placement;
pub mod prompt;
pub mod runner;
pub mod service;

// Re-export main types for convenience
pub use chat_template::ChatTemplate;
pub use encoder::{encode, EncodedInput};
pub use error::VlmError;
pub use model::{ChatMessage, VisionLanguageModel, IMAGE_PLACEHOLDER, IMAGE_TOKEN_INDEX};
pub use placement::{ComputeDevice, ComputePlacement, PlacedTensor, Precision, TensorData};
pub use prompt::{DEFAULT_ACTION_PROMPT, DEFAULT_CAPTION_PROMPT};
pub use runner::{InferenceRunner, DEFAULT_ACTION_MAX_NEW_TOKENS, DEFAULT_CAPTION_MAX_NEW_TOKENS};
pub use service::{FrameSampling, VlmService};
