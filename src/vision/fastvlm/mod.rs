// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! FastVLM-0.5B on ONNX Runtime
//!
//! Components:
//! - `config` - Model directory layout, dtype variants, JSON configs
//! - `preprocessing` - Image processor for the vision encoder
//! - `session` - Session construction (CUDA with CPU fallback)
//! - `encoder` - Vision encoder producing image features
//! - `decoder` - Token embedding and KV-cached greedy decoding
//! - `model` - Combined pipeline implementing `VisionLanguageModel`
//! - `download` - Hugging Face Hub fetch

pub mod config;
pub mod decoder;
pub mod download;
pub mod encoder;
pub mod model;
pub mod preprocessing;
pub mod session;

pub use config::{ComponentVariants, FastVlmConfig, DEFAULT_MODEL_DIR, DEFAULT_MODEL_REPO};
pub use download::download_model;
pub use model::FastVlmModel;
pub use preprocessing::FastVlmImageProcessor;
