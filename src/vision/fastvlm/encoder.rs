// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! FastVLM vision encoder (FastViTHD + projector)
//!
//! Maps `pixel_values` [1, 3, 1024, 1024] to image features [1, 256, 896]
//! already projected into the decoder embedding space.

use anyhow::{Context, Result};
use ndarray::{Array3, Ix3};
use ort::session::Session;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::session::{build_session, extract_tensor, input_precision, to_value};
use crate::inference::placement::{ComputeDevice, ComputePlacement, PlacedTensor, Precision};

#[derive(Clone)]
pub struct VisionEncoder {
    session: Arc<Mutex<Session>>,
    input_name: String,
    output_name: String,
    device: ComputeDevice,
    precision: Precision,
}

impl std::fmt::Debug for VisionEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionEncoder")
            .field("input_name", &self.input_name)
            .field("output_name", &self.output_name)
            .field("device", &self.device)
            .field("precision", &self.precision)
            .finish_non_exhaustive()
    }
}

impl VisionEncoder {
    pub fn new(model_path: &Path, intra_threads: usize) -> Result<Self> {
        let (session, device) = build_session(model_path, intra_threads)
            .context("Failed to load vision encoder")?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "pixel_values".to_string());
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .unwrap_or_else(|| "image_features".to_string());
        let precision = input_precision(&session, &input_name);

        info!(
            "Vision encoder loaded ({} -> {}, {}/{})",
            input_name,
            output_name,
            device.as_str(),
            precision.as_str()
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            output_name,
            device,
            precision,
        })
    }

    pub fn placement(&self) -> ComputePlacement {
        ComputePlacement::new(self.device, self.precision)
    }

    /// Encode preprocessed pixels into image features [1, tokens, hidden]
    pub fn encode(&self, pixel_values: &PlacedTensor) -> Result<Array3<f32>> {
        let shape = pixel_values.shape();
        if shape.len() != 4 || shape[0] != 1 || shape[1] != 3 {
            anyhow::bail!("Invalid pixel_values shape: {:?}, expected [1, 3, H, W]", shape);
        }

        let data = if pixel_values.data().precision() == self.precision {
            pixel_values.data().clone()
        } else {
            debug!(
                "Casting pixel_values from {} to {}",
                pixel_values.data().precision().as_str(),
                self.precision.as_str()
            );
            pixel_values.data().clone().cast(self.precision)
        };
        let input = to_value(data)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("Vision encoder session lock poisoned"))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .context("Vision encoder inference failed")?;

        let output = outputs
            .get(self.output_name.as_str())
            .context("Vision encoder produced no image features")?;
        let features = extract_tensor(output)?.to_f32();
        debug!("Image features shape: {:?}", features.shape());

        let features = match features.ndim() {
            2 => features.insert_axis(ndarray::Axis(0)),
            _ => features,
        };
        features
            .into_dimensionality::<Ix3>()
            .context("Unexpected image feature rank")
    }
}
