// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image handling and the FastVLM backend
//!
//! This module provides:
//! - Upload decoding and format detection
//! - Frame composition with ordinal labels
//! - FastVLM-0.5B running on ONNX Runtime (CUDA when available, CPU otherwise)

pub mod compositor;
pub mod fastvlm;
pub mod image_utils;
pub mod label;

pub use compositor::{FrameCompositor, FrameSequence};
pub use fastvlm::{FastVlmConfig, FastVlmModel};
pub use image_utils::{decode_image_bytes, detect_format, ImageError, ImageInfo};
pub use label::LabelFont;
