// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Chat template rendering for model-specific prompt formatting
//!
//! Models ship their prompt format as a Jinja template in
//! `tokenizer_config.json`. That template is rendered with minijinja; models
//! without one fall back to the ChatML layout used by Qwen2 decoders.

use anyhow::{Context, Result};
use minijinja::{context, Environment, Error as JinjaError, ErrorKind};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

use super::model::ChatMessage;

/// System prompt Qwen2 templates insert when the conversation has none
const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

#[derive(Debug, Clone, PartialEq)]
pub enum ChatTemplate {
    /// Built-in "<|im_start|>role\n...<|im_end|>" layout
    ChatMl,
    /// Jinja source taken from the tokenizer config
    Jinja {
        source: String,
        bos_token: String,
        eos_token: String,
    },
}

impl ChatTemplate {
    /// Load the template declared in a `tokenizer_config.json`
    ///
    /// A missing file or a config without `chat_template` yields ChatML.
    pub fn from_tokenizer_config<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(
                "Tokenizer config not found at {}, using ChatML template",
                path.display()
            );
            return Ok(Self::ChatMl);
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Value = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        Ok(Self::from_config_value(&config))
    }

    pub fn from_config_value(config: &Value) -> Self {
        let source = match config.get("chat_template") {
            Some(Value::String(s)) => Some(s.clone()),
            // Newer configs carry a list of named templates
            Some(Value::Array(named)) => named
                .iter()
                .find(|t| t.get("name").and_then(Value::as_str) == Some("default"))
                .or_else(|| named.first())
                .and_then(|t| t.get("template"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        };

        match source {
            Some(source) => {
                debug!("Using chat template from tokenizer config ({} chars)", source.len());
                Self::Jinja {
                    source,
                    bos_token: special_token(config, "bos_token"),
                    eos_token: special_token(config, "eos_token"),
                }
            }
            None => {
                warn!("Tokenizer config has no chat_template, using ChatML template");
                Self::ChatMl
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChatMl => "chatml",
            Self::Jinja { .. } => "jinja",
        }
    }

    /// Format a conversation using this template
    pub fn render(&self, messages: &[ChatMessage], add_generation_prompt: bool) -> Result<String> {
        match self {
            Self::ChatMl => Ok(format_chatml(messages, add_generation_prompt)),
            Self::Jinja {
                source,
                bos_token,
                eos_token,
            } => render_jinja(source, bos_token, eos_token, messages, add_generation_prompt),
        }
    }
}

impl Default for ChatTemplate {
    fn default() -> Self {
        Self::ChatMl
    }
}

/// `bos_token` / `eos_token` are either a plain string or an AddedToken object
fn special_token(config: &Value, key: &str) -> String {
    match config.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(obj)) => obj
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

fn format_chatml(messages: &[ChatMessage], add_generation_prompt: bool) -> String {
    let mut prompt = String::new();

    if !messages.iter().any(|m| m.role == "system") {
        prompt.push_str(&format!(
            "<|im_start|>system\n{}<|im_end|>\n",
            DEFAULT_SYSTEM_PROMPT
        ));
    }

    for message in messages {
        prompt.push_str(&format!(
            "<|im_start|>{}\n{}<|im_end|>\n",
            message.role, message.content
        ));
    }

    if add_generation_prompt {
        prompt.push_str("<|im_start|>assistant\n");
    }
    prompt
}

fn render_jinja(
    source: &str,
    bos_token: &str,
    eos_token: &str,
    messages: &[ChatMessage],
    add_generation_prompt: bool,
) -> Result<String> {
    // Same whitespace handling as transformers' template sandbox
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.add_function("raise_exception", |message: String| -> Result<String, JinjaError> {
        Err(JinjaError::new(ErrorKind::InvalidOperation, message))
    });

    let template = env
        .template_from_str(source)
        .context("Failed to compile chat template")?;

    template
        .render(context! {
            messages => messages,
            add_generation_prompt => add_generation_prompt,
            bos_token => bos_token,
            eos_token => eos_token,
        })
        .context("Failed to render chat template")
}
