// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Compute placement of model parameters and host tensors cast to match it
//!
//! The placement is a property of the loaded model, read at call time. Tensors
//! produced on the host in f32 are cast to the model precision before the
//! runtime copies them to the model device.

use half::f16;
use ndarray::{Array4, ArrayD};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    Cuda,
    Cpu,
}

impl ComputeDevice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cuda => "cuda",
            Self::Cpu => "cpu",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    F32,
    F16,
}

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::F16 => "f16",
        }
    }
}

/// Device and numeric precision currently hosting the model parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ComputePlacement {
    pub device: ComputeDevice,
    pub precision: Precision,
}

impl ComputePlacement {
    pub const CPU_F32: Self = Self {
        device: ComputeDevice::Cpu,
        precision: Precision::F32,
    };

    pub fn new(device: ComputeDevice, precision: Precision) -> Self {
        Self { device, precision }
    }
}

impl fmt::Display for ComputePlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device.as_str(), self.precision.as_str())
    }
}

/// Host tensor storage in one of the supported precisions
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(ArrayD<f32>),
    F16(ArrayD<f16>),
}

impl TensorData {
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::F32(a) => a.shape(),
            Self::F16(a) => a.shape(),
        }
    }

    pub fn precision(&self) -> Precision {
        match self {
            Self::F32(_) => Precision::F32,
            Self::F16(_) => Precision::F16,
        }
    }

    /// Cast to `precision`, returning `self` untouched when it already matches
    pub fn cast(self, precision: Precision) -> Self {
        match (self, precision) {
            (Self::F32(a), Precision::F16) => Self::F16(a.mapv(f16::from_f32)),
            (Self::F16(a), Precision::F32) => Self::F32(a.mapv(f16::to_f32)),
            (same, _) => same,
        }
    }

    pub fn to_f32(&self) -> ArrayD<f32> {
        match self {
            Self::F32(a) => a.clone(),
            Self::F16(a) => a.mapv(f16::to_f32),
        }
    }
}

/// A tensor that has been prepared for a specific compute placement
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedTensor {
    data: TensorData,
    placement: ComputePlacement,
}

impl PlacedTensor {
    pub fn place(array: Array4<f32>, placement: ComputePlacement) -> Self {
        let data = TensorData::F32(array.into_dyn()).cast(placement.precision);
        Self { data, placement }
    }

    /// Move to another placement, casting the storage if the precision differs
    pub fn to_placement(self, placement: ComputePlacement) -> Self {
        Self {
            data: self.data.cast(placement.precision),
            placement,
        }
    }

    pub fn placement(&self) -> ComputePlacement {
        self.placement
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }
}
