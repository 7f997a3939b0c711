// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Node configuration from command line flags and environment variables
//!
//! Every flag has an environment fallback; a `.env` file is loaded first.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::inference::runner::{DEFAULT_ACTION_MAX_NEW_TOKENS, DEFAULT_CAPTION_MAX_NEW_TOKENS};
use crate::vision::fastvlm::config::{ComponentVariants, FastVlmConfig, DEFAULT_MODEL_DIR, DEFAULT_MODEL_REPO};
use crate::vision::label::DEFAULT_LABEL_SIZE;

/// Default request body limit (64 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// FastVLM caption/action node
#[derive(Parser, Debug, Clone)]
#[command(name = "fastvlm-node")]
#[command(version)]
#[command(about = "HTTP captioning and action description with FastVLM-0.5B", long_about = None)]
pub struct Config {
    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// HTTP port
    #[arg(long, env = "API_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Directory holding the ONNX export
    #[arg(long, env = "MODEL_DIR", default_value = DEFAULT_MODEL_DIR)]
    pub model_dir: PathBuf,

    /// Hugging Face repository used by --download
    #[arg(long, env = "MODEL_REPO", default_value = DEFAULT_MODEL_REPO)]
    pub model_repo: String,

    /// ONNX dtype variant for every graph (fp32, fp16, q4, int8, ...)
    #[arg(long, env = "MODEL_VARIANT", default_value = "")]
    pub model_variant: String,

    /// Variant override for the vision encoder
    #[arg(long, env = "VISION_VARIANT")]
    pub vision_variant: Option<String>,

    /// Variant override for the token embedding graph
    #[arg(long, env = "EMBED_VARIANT")]
    pub embed_variant: Option<String>,

    /// Variant override for the merged decoder
    #[arg(long, env = "DECODER_VARIANT")]
    pub decoder_variant: Option<String>,

    /// Fetch missing model files before loading
    #[arg(long, env = "MODEL_DOWNLOAD")]
    pub download: bool,

    /// ONNX Runtime intra-op threads
    #[arg(long, env = "INTRA_THREADS", default_value_t = 4)]
    pub intra_threads: usize,

    /// New-token budget for /caption
    #[arg(long, env = "CAPTION_MAX_NEW_TOKENS", default_value_t = DEFAULT_CAPTION_MAX_NEW_TOKENS)]
    pub caption_max_new_tokens: usize,

    /// New-token budget for /action
    #[arg(long, env = "ACTION_MAX_NEW_TOKENS", default_value_t = DEFAULT_ACTION_MAX_NEW_TOKENS)]
    pub action_max_new_tokens: usize,

    /// Repetition penalty applied during greedy decoding (1.0 disables)
    #[arg(long, env = "REPETITION_PENALTY", default_value_t = 1.0)]
    pub repetition_penalty: f32,

    /// TrueType font for frame labels
    #[arg(long, env = "LABEL_FONT")]
    pub label_font: Option<PathBuf>,

    /// Frame label pixel height
    #[arg(long, env = "LABEL_FONT_SIZE", default_value_t = DEFAULT_LABEL_SIZE)]
    pub label_font_size: f32,

    /// Maximum request body size in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,
}

impl Config {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid listen address {}:{}: {}", self.host, self.port, e))
    }

    pub fn model_config(&self) -> FastVlmConfig {
        FastVlmConfig {
            model_dir: self.model_dir.clone(),
            variants: ComponentVariants {
                default: self.model_variant.clone(),
                vision_encoder: self.vision_variant.clone(),
                embed_tokens: self.embed_variant.clone(),
                decoder: self.decoder_variant.clone(),
            },
            intra_threads: self.intra_threads.max(1),
            repetition_penalty: if self.repetition_penalty > 0.0 {
                self.repetition_penalty
            } else {
                1.0
            },
        }
    }
}
