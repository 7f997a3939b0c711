// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ONNX Runtime session construction and tensor conversion helpers

use anyhow::{Context, Result};
use half::f16;
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::tensor::TensorElementType;
use ort::value::{DynValue, Value, ValueType};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::inference::placement::{ComputeDevice, Precision, TensorData};

/// Load `model_path`, trying CUDA first and falling back to CPU
///
/// Returns the session and the device whose provider was registered.
pub fn build_session(model_path: &Path, intra_threads: usize) -> Result<(Session, ComputeDevice)> {
    if !model_path.exists() {
        anyhow::bail!("Model file not found: {}", model_path.display());
    }

    info!("Loading ONNX graph {}", model_path.display());

    let cuda_result = Session::builder()
        .context("Failed to create session builder")?
        .with_execution_providers([CUDAExecutionProvider::default().build().error_on_failure()])
        .context("Failed to set CUDA execution provider")
        .and_then(|b| {
            b.with_optimization_level(GraphOptimizationLevel::Level3)
                .context("Failed to set optimization level")
        })
        .and_then(|b| {
            b.with_intra_threads(intra_threads)
                .context("Failed to set intra threads")
        })
        .and_then(|b| {
            b.commit_from_file(model_path)
                .with_context(|| format!("Failed to load {}", model_path.display()))
        });

    match cuda_result {
        Ok(session) => {
            info!("CUDA execution provider active for {}", file_name(model_path));
            Ok((session, ComputeDevice::Cuda))
        }
        Err(e) => {
            warn!("CUDA execution provider unavailable: {:#}", e);
            warn!("Falling back to CPU for {}", file_name(model_path));
            let session = Session::builder()
                .context("Failed to create session builder")?
                .with_execution_providers([CPUExecutionProvider::default().build()])
                .context("Failed to set CPU execution provider")?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .context("Failed to set optimization level")?
                .with_intra_threads(intra_threads)
                .context("Failed to set intra threads")?
                .commit_from_file(model_path)
                .with_context(|| format!("Failed to load ONNX model from {}", model_path.display()))?;
            Ok((session, ComputeDevice::Cpu))
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Element precision declared for input `name`; f32 when unknown
pub fn input_precision(session: &Session, name: &str) -> Precision {
    let ty = session
        .inputs
        .iter()
        .find(|input| input.name == name)
        .and_then(|input| match &input.input_type {
            ValueType::Tensor { ty, .. } => Some(*ty),
            _ => None,
        });
    let precision = match ty {
        Some(TensorElementType::Float16) => Precision::F16,
        _ => Precision::F32,
    };
    debug!("Input {} declared as {:?} -> {}", name, ty, precision.as_str());
    precision
}

pub fn has_input(session: &Session, name: &str) -> bool {
    session.inputs.iter().any(|input| input.name == name)
}

pub fn input_names(session: &Session) -> Vec<String> {
    session.inputs.iter().map(|input| input.name.clone()).collect()
}

/// Wrap host tensor data as an ONNX value
pub fn to_value(data: TensorData) -> Result<DynValue> {
    Ok(match data {
        TensorData::F32(array) => Value::from_array(array)
            .context("Failed to create f32 tensor")?
            .into_dyn(),
        TensorData::F16(array) => Value::from_array(array)
            .context("Failed to create f16 tensor")?
            .into_dyn(),
    })
}

/// Copy an f32 or f16 output tensor back to the host
pub fn extract_tensor(value: &DynValue) -> Result<TensorData> {
    if let Ok(view) = value.try_extract_array::<f32>() {
        return Ok(TensorData::F32(view.to_owned()));
    }
    let view = value
        .try_extract_array::<f16>()
        .context("Output tensor is neither f32 nor f16")?;
    Ok(TensorData::F16(view.to_owned()))
}
