// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! FastVLM language decoder (Qwen2) with token embedding and KV cache
//!
//! Two graphs are involved: `embed_tokens` turns ids into embeddings and
//! `decoder_model_merged` runs one step over embeddings plus the cached
//! keys/values of every layer. Image features are spliced into the prompt
//! embeddings at the image marker before the first step.

use anyhow::{Context, Result};
use ndarray::{concatenate, s, Array1, Array2, Array3, ArrayD, Axis, Ix3, IxDyn};
use ort::session::{Session, SessionInputValue};
use ort::value::Value;
use std::borrow::Cow;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::config::TextConfig;
use super::session::{build_session, extract_tensor, has_input, input_names, input_precision, to_value};
use crate::inference::model::IMAGE_TOKEN_INDEX;
use crate::inference::placement::{ComputeDevice, Precision, TensorData};

const PAST_PREFIX: &str = "past_key_values.";
const PRESENT_PREFIX: &str = "present.";

/// Greedy choice over `logits` with an optional repetition penalty
///
/// Ties resolve to the lowest id. A penalty of 1.0 is plain argmax.
pub fn select_next_token(logits: &[f32], seen: &HashSet<i64>, penalty: f32) -> Option<i64> {
    let mut best: Option<(usize, f32)> = None;
    for (id, &raw) in logits.iter().enumerate() {
        let score = if penalty != 1.0 && seen.contains(&(id as i64)) {
            if raw > 0.0 {
                raw / penalty
            } else {
                raw * penalty
            }
        } else {
            raw
        };
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((id, score)),
        }
    }
    best.map(|(id, _)| id as i64)
}

/// Replace the marker row at `position` with `features`, widening the mask
pub fn splice_image_features(
    text_embeds: &Array3<f32>,
    attention_mask: &[i64],
    position: usize,
    features: &Array3<f32>,
) -> Result<(Array3<f32>, Vec<i64>)> {
    let seq_len = text_embeds.shape()[1];
    if position >= seq_len || attention_mask.len() != seq_len {
        anyhow::bail!(
            "Image position {} invalid for {} embeddings and {} mask entries",
            position,
            seq_len,
            attention_mask.len()
        );
    }
    if features.shape()[2] != text_embeds.shape()[2] {
        anyhow::bail!(
            "Image feature width {} does not match embedding width {}",
            features.shape()[2],
            text_embeds.shape()[2]
        );
    }

    let pre = text_embeds.slice(s![.., ..position, ..]);
    let post = text_embeds.slice(s![.., position + 1.., ..]);
    let embeds = concatenate(Axis(1), &[pre, features.view(), post])
        .context("Failed to splice image features")?;

    let image_tokens = features.shape()[1];
    let mut mask = Vec::with_capacity(seq_len - 1 + image_tokens);
    mask.extend_from_slice(&attention_mask[..position]);
    mask.extend(std::iter::repeat(1).take(image_tokens));
    mask.extend_from_slice(&attention_mask[position + 1..]);

    Ok((embeds, mask))
}

#[derive(Clone)]
pub struct TextDecoder {
    embed_session: Arc<Mutex<Session>>,
    decoder_session: Arc<Mutex<Session>>,
    text_config: TextConfig,
    embeds_precision: Precision,
    kv_precision: Precision,
    past_inputs: Vec<String>,
    has_position_ids: bool,
    has_cache_branch: bool,
    eos_token_ids: Vec<i64>,
    repetition_penalty: f32,
    device: ComputeDevice,
}

impl std::fmt::Debug for TextDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextDecoder")
            .field("text_config", &self.text_config)
            .field("kv_precision", &self.kv_precision)
            .field("past_inputs", &self.past_inputs.len())
            .field("eos_token_ids", &self.eos_token_ids)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl TextDecoder {
    pub fn new(
        embed_path: &Path,
        decoder_path: &Path,
        text_config: TextConfig,
        eos_token_ids: Vec<i64>,
        intra_threads: usize,
        repetition_penalty: f32,
    ) -> Result<Self> {
        let (embed_session, _) = build_session(embed_path, intra_threads)
            .context("Failed to load embed_tokens")?;
        let (decoder_session, device) = build_session(decoder_path, intra_threads)
            .context("Failed to load decoder")?;

        let names = input_names(&decoder_session);
        debug!("Decoder inputs: {:?}", names);

        let past_inputs: Vec<String> = names
            .iter()
            .filter(|name| name.starts_with(PAST_PREFIX))
            .cloned()
            .collect();
        if past_inputs.len() != 2 * text_config.num_hidden_layers {
            warn!(
                "Decoder declares {} cache inputs, config expects {} layers",
                past_inputs.len(),
                text_config.num_hidden_layers
            );
        }

        let embeds_precision = input_precision(&decoder_session, "inputs_embeds");
        let kv_precision = past_inputs
            .first()
            .map(|name| input_precision(&decoder_session, name))
            .unwrap_or(embeds_precision);
        let has_position_ids = has_input(&decoder_session, "position_ids");
        let has_cache_branch = has_input(&decoder_session, "use_cache_branch");

        if eos_token_ids.is_empty() {
            warn!("No EOS token ids configured, generation stops only at the token budget");
        }

        info!(
            "Decoder loaded: {} layers, {} kv heads x {}, cache {}, device {}",
            text_config.num_hidden_layers,
            text_config.num_key_value_heads,
            text_config.head_dim,
            kv_precision.as_str(),
            device.as_str()
        );

        Ok(Self {
            embed_session: Arc::new(Mutex::new(embed_session)),
            decoder_session: Arc::new(Mutex::new(decoder_session)),
            text_config,
            embeds_precision,
            kv_precision,
            past_inputs,
            has_position_ids,
            has_cache_branch,
            eos_token_ids,
            repetition_penalty,
            device,
        })
    }

    pub fn device(&self) -> ComputeDevice {
        self.device
    }

    pub fn eos_token_ids(&self) -> &[i64] {
        &self.eos_token_ids
    }

    /// Greedy generation; returns only the new ids, EOS excluded
    pub fn generate(
        &self,
        input_ids: &[i64],
        attention_mask: &[i64],
        image_features: &Array3<f32>,
        max_new_tokens: usize,
    ) -> Result<Vec<i64>> {
        let start = Instant::now();
        let markers: Vec<usize> = input_ids
            .iter()
            .enumerate()
            .filter(|(_, &id)| id == IMAGE_TOKEN_INDEX)
            .map(|(i, _)| i)
            .collect();
        let position = match markers.as_slice() {
            [only] => *only,
            other => anyhow::bail!("Expected one image marker, found {}", other.len()),
        };

        let lookup: Vec<i64> = input_ids
            .iter()
            .map(|&id| if id == IMAGE_TOKEN_INDEX { 0 } else { id })
            .collect();
        let text_embeds = self.embed_tokens(&lookup)?;
        let (mut embeds, mut mask) =
            splice_image_features(&text_embeds, attention_mask, position, image_features)?;

        debug!(
            "Prefill: {} text tokens + {} image tokens",
            input_ids.len() - 1,
            image_features.shape()[1]
        );

        let mut seen: HashSet<i64> = input_ids.iter().copied().filter(|&id| id >= 0).collect();
        let mut past = self.empty_past();
        let mut past_len = 0usize;
        let mut generated = Vec::with_capacity(max_new_tokens);

        while generated.len() < max_new_tokens {
            let step_len = embeds.shape()[1];
            let (logits, present) = self.forward(embeds, &mask, past, past_len)?;
            past = present;
            past_len += step_len;

            let next = select_next_token(&logits, &seen, self.repetition_penalty)
                .context("Decoder returned empty logits")?;
            if self.eos_token_ids.contains(&next) {
                debug!("EOS {} after {} tokens", next, generated.len());
                break;
            }
            generated.push(next);
            seen.insert(next);

            if generated.len() == max_new_tokens {
                break;
            }
            embeds = self.embed_tokens(&[next])?;
            mask.push(1);
        }

        info!(
            "Decoded {} new tokens in {}ms",
            generated.len(),
            start.elapsed().as_millis()
        );
        Ok(generated)
    }

    fn embed_tokens(&self, ids: &[i64]) -> Result<Array3<f32>> {
        let ids_array = Array2::from_shape_vec((1, ids.len()), ids.to_vec())
            .context("Failed to shape input ids")?;
        let ids_value = Value::from_array(ids_array).context("Failed to create input_ids tensor")?;

        let mut session = self
            .embed_session
            .lock()
            .map_err(|_| anyhow::anyhow!("embed_tokens session lock poisoned"))?;
        let outputs = session
            .run(ort::inputs!["input_ids" => ids_value])
            .context("embed_tokens inference failed")?;

        let embeds = extract_tensor(&outputs[0])?.to_f32();
        embeds
            .into_dimensionality::<Ix3>()
            .context("Unexpected embedding rank")
    }

    fn empty_past(&self) -> Vec<TensorData> {
        let shape = IxDyn(&[
            1,
            self.text_config.num_key_value_heads,
            0,
            self.text_config.head_dim,
        ]);
        self.past_inputs
            .iter()
            .map(|_| TensorData::F32(ArrayD::zeros(shape.clone())).cast(self.kv_precision))
            .collect()
    }

    /// One decoder step; returns last-position logits and the updated cache
    fn forward(
        &self,
        embeds: Array3<f32>,
        mask: &[i64],
        past: Vec<TensorData>,
        past_len: usize,
    ) -> Result<(Vec<f32>, Vec<TensorData>)> {
        let seq_len = embeds.shape()[1];
        let mut inputs: Vec<(Cow<'static, str>, SessionInputValue<'static>)> =
            Vec::with_capacity(self.past_inputs.len() + 4);

        let embeds = TensorData::F32(embeds.into_dyn()).cast(self.embeds_precision);
        inputs.push(("inputs_embeds".into(), to_value(embeds)?.into()));

        let mask_array = Array2::from_shape_vec((1, mask.len()), mask.to_vec())
            .context("Failed to shape attention mask")?;
        inputs.push((
            "attention_mask".into(),
            Value::from_array(mask_array)
                .context("Failed to create attention_mask tensor")?
                .into_dyn()
                .into(),
        ));

        if self.has_position_ids {
            let positions: Vec<i64> = (past_len..past_len + seq_len).map(|p| p as i64).collect();
            let positions = Array2::from_shape_vec((1, seq_len), positions)
                .context("Failed to shape position ids")?;
            inputs.push((
                "position_ids".into(),
                Value::from_array(positions)
                    .context("Failed to create position_ids tensor")?
                    .into_dyn()
                    .into(),
            ));
        }

        if self.has_cache_branch {
            let branch = Array1::from_elem(1, past_len > 0);
            inputs.push((
                "use_cache_branch".into(),
                Value::from_array(branch)
                    .context("Failed to create use_cache_branch tensor")?
                    .into_dyn()
                    .into(),
            ));
        }

        for (name, tensor) in self.past_inputs.iter().zip(past) {
            inputs.push((Cow::Owned(name.clone()), to_value(tensor)?.into()));
        }

        let mut session = self
            .decoder_session
            .lock()
            .map_err(|_| anyhow::anyhow!("Decoder session lock poisoned"))?;
        let outputs = session.run(inputs).context("Decoder inference failed")?;

        let logits_value = outputs.get("logits").unwrap_or(&outputs[0]);
        let logits = extract_tensor(logits_value)?.to_f32();
        let logits = logits
            .into_dimensionality::<Ix3>()
            .context("Unexpected logits rank")?;
        let last = logits.shape()[1].checked_sub(1).context("Decoder returned no positions")?;
        let last_logits = logits.slice(s![0, last, ..]).to_vec();

        let mut present = Vec::with_capacity(self.past_inputs.len());
        for name in &self.past_inputs {
            let present_name = name.replacen(PAST_PREFIX, PRESENT_PREFIX, 1);
            let value = outputs
                .get(present_name.as_str())
                .with_context(|| format!("Decoder output {} missing", present_name))?;
            present.push(extract_tensor(value)?);
        }

        Ok((last_logits, present))
    }
}
