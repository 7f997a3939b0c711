// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Shared fixtures: a scripted vision-language model and multipart bodies
#![allow(dead_code)]

use anyhow::Result;
use fastvlm_node::api::{create_router, AppState};
use fastvlm_node::config::DEFAULT_MAX_BODY_BYTES;
use fastvlm_node::inference::chat_template::ChatTemplate;
use fastvlm_node::inference::{
    ChatMessage, ComputeDevice, ComputePlacement, PlacedTensor, Precision, VisionLanguageModel,
    VlmService,
};
use fastvlm_node::vision::{FrameCompositor, LabelFont};
use image::{ImageFormat, Rgb, RgbImage};
use ndarray::Array4;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

pub const BOUNDARY: &str = "fastvlm-test-boundary";

/// What the model saw for one `generate` call
#[derive(Debug, Clone)]
pub struct GenerateCall {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub pixel_shape: Vec<usize>,
    pub placement: ComputePlacement,
    pub max_new_tokens: usize,
}

/// Deterministic stand-in for FastVLM
///
/// Tokenizes one id per byte, records inputs and answers with `reply`.
pub struct ScriptedModel {
    reply: String,
    reply_tokens: usize,
    failure: Option<String>,
    placement: ComputePlacement,
    pub messages: Mutex<Vec<Vec<ChatMessage>>>,
    pub images: Mutex<Vec<RgbImage>>,
    pub calls: Mutex<Vec<GenerateCall>>,
}

impl ScriptedModel {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            reply_tokens: 5,
            failure: None,
            placement: ComputePlacement::CPU_F32,
            messages: Mutex::new(Vec::new()),
            images: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::replying("")
        }
    }

    pub fn on_cuda_f16(mut self) -> Self {
        self.placement = ComputePlacement::new(ComputeDevice::Cuda, Precision::F16);
        self
    }

    pub fn with_reply_tokens(mut self, n: usize) -> Self {
        self.reply_tokens = n;
        self
    }

    pub fn generate_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_call(&self) -> GenerateCall {
        self.calls.lock().unwrap().last().cloned().unwrap()
    }

    pub fn last_user_message(&self) -> String {
        let messages = self.messages.lock().unwrap();
        messages.last().unwrap()[0].content.clone()
    }

    pub fn last_image(&self) -> RgbImage {
        self.images.lock().unwrap().last().cloned().unwrap()
    }
}

impl VisionLanguageModel for ScriptedModel {
    fn model_name(&self) -> String {
        "scripted-vlm".to_string()
    }

    fn apply_chat_template(
        &self,
        messages: &[ChatMessage],
        add_generation_prompt: bool,
    ) -> Result<String> {
        self.messages.lock().unwrap().push(messages.to_vec());
        ChatTemplate::ChatMl.render(messages, add_generation_prompt)
    }

    fn encode_text(&self, text: &str) -> Result<Vec<i64>> {
        Ok(text.bytes().map(i64::from).collect())
    }

    fn decode(&self, ids: &[i64], skip_special_tokens: bool) -> Result<String> {
        let words: Vec<&str> = self.reply.split_whitespace().take(ids.len()).collect();
        let mut text = format!(" {} ", words.join(" "));
        if !skip_special_tokens {
            text.push_str("<|im_end|>");
        }
        Ok(text)
    }

    fn preprocess_image(&self, image: &RgbImage) -> Result<Array4<f32>> {
        self.images.lock().unwrap().push(image.clone());
        Ok(Array4::zeros((1, 3, 8, 8)))
    }

    fn placement(&self) -> ComputePlacement {
        self.placement
    }

    fn generate(
        &self,
        input_ids: &[i64],
        attention_mask: &[i64],
        pixel_values: &PlacedTensor,
        max_new_tokens: usize,
    ) -> Result<Vec<i64>> {
        self.calls.lock().unwrap().push(GenerateCall {
            input_ids: input_ids.to_vec(),
            attention_mask: attention_mask.to_vec(),
            pixel_shape: pixel_values.shape().to_vec(),
            placement: pixel_values.placement(),
            max_new_tokens,
        });
        if let Some(message) = &self.failure {
            anyhow::bail!("{}", message);
        }
        Ok((0..self.reply_tokens as i64).map(|i| 100 + i).collect())
    }
}

pub fn test_service(model: Arc<ScriptedModel>) -> VlmService {
    VlmService::new(model, FrameCompositor::new(LabelFont::builtin()))
}

pub fn test_router(model: Arc<ScriptedModel>) -> axum::Router {
    create_router(AppState::new(test_service(model)), DEFAULT_MAX_BODY_BYTES)
}

pub fn solid_image(width: u32, height: u32, shade: u8) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([shade, shade, shade]))
}

pub fn encode_image(image: &RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

pub fn png(width: u32, height: u32, shade: u8) -> Vec<u8> {
    encode_image(&solid_image(width, height, shade), ImageFormat::Png)
}

/// One multipart part
pub enum Part {
    File { name: &'static str, data: Vec<u8> },
    Text { name: &'static str, value: String },
}

impl Part {
    pub fn file(name: &'static str, data: Vec<u8>) -> Self {
        Part::File { name, data }
    }

    pub fn text(name: &'static str, value: &str) -> Self {
        Part::Text {
            name,
            value: value.to_string(),
        }
    }
}

pub fn multipart_body(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for (i, part) in parts.iter().enumerate() {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File { name, data } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"frame{}.png\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name, i
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_request(uri: &str, parts: &[Part]) -> axum::http::Request<axum::body::Body> {
    axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(axum::body::Body::from(multipart_body(parts)))
        .unwrap()
}

pub async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
