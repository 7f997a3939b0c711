// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! FastVLM model directory layout and JSON configs

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Default Hugging Face repository for the ONNX export
pub const DEFAULT_MODEL_REPO: &str = "onnx-community/FastVLM-0.5B-ONNX";

/// Default local model directory
pub const DEFAULT_MODEL_DIR: &str = "./models/fastvlm-0.5b-onnx";

/// Non-ONNX files every model directory must contain
pub const SUPPORT_FILES: &[&str] = &[
    "config.json",
    "generation_config.json",
    "preprocessor_config.json",
    "tokenizer.json",
    "tokenizer_config.json",
];

/// The three ONNX graphs of the export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    VisionEncoder,
    EmbedTokens,
    Decoder,
}

impl Component {
    pub const ALL: [Component; 3] = [Self::VisionEncoder, Self::EmbedTokens, Self::Decoder];

    pub fn stem(&self) -> &'static str {
        match self {
            Self::VisionEncoder => "vision_encoder",
            Self::EmbedTokens => "embed_tokens",
            Self::Decoder => "decoder_model_merged",
        }
    }
}

/// Normalize a dtype variant ("fp16", "_q4", "fp32", "") into a file suffix
pub fn variant_suffix(variant: &str) -> String {
    let v = variant.trim().trim_start_matches('_').to_lowercase();
    match v.as_str() {
        "" | "fp32" | "f32" | "float32" => String::new(),
        other => format!("_{}", other),
    }
}

/// Per-component dtype variants; each falls back to `default`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentVariants {
    pub default: String,
    pub vision_encoder: Option<String>,
    pub embed_tokens: Option<String>,
    pub decoder: Option<String>,
}

impl ComponentVariants {
    pub fn uniform(variant: impl Into<String>) -> Self {
        Self {
            default: variant.into(),
            ..Default::default()
        }
    }

    pub fn for_component(&self, component: Component) -> &str {
        let specific = match component {
            Component::VisionEncoder => &self.vision_encoder,
            Component::EmbedTokens => &self.embed_tokens,
            Component::Decoder => &self.decoder,
        };
        specific.as_deref().unwrap_or(&self.default)
    }

    /// Relative path of `component`'s graph, e.g. `onnx/vision_encoder_q4.onnx`
    pub fn onnx_file(&self, component: Component) -> String {
        format!(
            "onnx/{}{}.onnx",
            component.stem(),
            variant_suffix(self.for_component(component))
        )
    }
}

/// Runtime configuration of the FastVLM backend
#[derive(Debug, Clone)]
pub struct FastVlmConfig {
    pub model_dir: PathBuf,
    pub variants: ComponentVariants,
    pub intra_threads: usize,
    /// 1.0 disables the penalty
    pub repetition_penalty: f32,
}

impl Default for FastVlmConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            variants: ComponentVariants::default(),
            intra_threads: 4,
            repetition_penalty: 1.0,
        }
    }
}

impl FastVlmConfig {
    pub fn onnx_path(&self, component: Component) -> PathBuf {
        self.model_dir.join(self.variants.onnx_file(component))
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.model_dir.join(name)
    }

    /// Fail with the first missing path
    pub fn validate(&self) -> Result<()> {
        if !self.model_dir.is_dir() {
            anyhow::bail!("Model directory not found: {}", self.model_dir.display());
        }
        for component in Component::ALL {
            let path = self.onnx_path(component);
            if !path.exists() {
                anyhow::bail!("Model file not found: {}", path.display());
            }
        }
        for name in SUPPORT_FILES {
            let path = self.file(name);
            if !path.exists() {
                anyhow::bail!("Model file not found: {}", path.display());
            }
        }
        Ok(())
    }
}

/// Decoder geometry needed to size the KV cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextConfig {
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub num_key_value_heads: usize,
    pub head_dim: usize,
}

#[derive(Deserialize)]
struct RawTextConfig {
    hidden_size: usize,
    num_hidden_layers: usize,
    num_attention_heads: usize,
    num_key_value_heads: Option<usize>,
    head_dim: Option<usize>,
}

impl TextConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let value: Value = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Self::from_value(&value).with_context(|| format!("Invalid text config in {}", path.display()))
    }

    /// Accepts both a nested `text_config` and a flat config
    pub fn from_value(value: &Value) -> Result<Self> {
        let section = value.get("text_config").unwrap_or(value);
        let raw: RawTextConfig = serde_json::from_value(section.clone())?;

        if raw.num_attention_heads == 0 {
            anyhow::bail!("num_attention_heads must be positive");
        }
        let num_key_value_heads = raw.num_key_value_heads.unwrap_or(raw.num_attention_heads);
        let head_dim = raw
            .head_dim
            .unwrap_or(raw.hidden_size / raw.num_attention_heads);

        Ok(Self {
            hidden_size: raw.hidden_size,
            num_hidden_layers: raw.num_hidden_layers,
            num_attention_heads: raw.num_attention_heads,
            num_key_value_heads,
            head_dim,
        })
    }
}

/// An id field that may be a single integer or a list
fn token_ids(value: Option<&Value>) -> Vec<i64> {
    match value {
        Some(Value::Number(n)) => n.as_i64().into_iter().collect(),
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_i64).collect(),
        _ => Vec::new(),
    }
}

/// EOS ids from `generation_config.json`, falling back to `config.json`
pub fn load_eos_token_ids(generation_config: &Path, model_config: &Path) -> Result<Vec<i64>> {
    for path in [generation_config, model_config] {
        if !path.exists() {
            continue;
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let value: Value = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        let ids = token_ids(value.get("eos_token_id"));
        if !ids.is_empty() {
            return Ok(ids);
        }
    }
    Ok(Vec::new())
}
