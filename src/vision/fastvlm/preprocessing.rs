// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image preprocessing for the FastVLM vision encoder
//!
//! Reads `preprocessor_config.json` (CLIP-style image processor):
//! 1. Resize so the shortest edge matches `size.shortest_edge`
//! 2. Center crop to `crop_size`
//! 3. Rescale by `rescale_factor`, optionally normalize by mean/std
//! 4. Emit an NCHW tensor [1, 3, H, W]

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::Array4;
use serde::Deserialize;
use std::borrow::Cow;
use std::path::Path;
use tracing::debug;

/// FastVLM-0.5B input resolution
pub const FASTVLM_INPUT_SIZE: u32 = 1024;

/// Largest intermediate image produced by the resize step
pub const MAX_RESIZE_PIXELS: u64 = 4096 * 4096;

/// Extra output pixels kept on each side when cropping before resize
const CROP_MARGIN: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ResizeTarget {
    ShortestEdge { shortest_edge: u32 },
    Exact { height: u32, width: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CropSize {
    pub height: u32,
    pub width: u32,
}

fn default_true() -> bool {
    true
}

fn default_resize() -> ResizeTarget {
    ResizeTarget::ShortestEdge {
        shortest_edge: FASTVLM_INPUT_SIZE,
    }
}

fn default_crop() -> CropSize {
    CropSize {
        height: FASTVLM_INPUT_SIZE,
        width: FASTVLM_INPUT_SIZE,
    }
}

fn default_resample() -> u8 {
    3
}

fn default_rescale_factor() -> f32 {
    1.0 / 255.0
}

fn default_mean() -> [f32; 3] {
    [0.0; 3]
}

fn default_std() -> [f32; 3] {
    [1.0; 3]
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FastVlmImageProcessor {
    #[serde(default = "default_true")]
    pub do_resize: bool,
    #[serde(default = "default_resize")]
    pub size: ResizeTarget,
    /// PIL resampling code (0 nearest, 1 lanczos, 2 bilinear, 3 bicubic)
    #[serde(default = "default_resample")]
    pub resample: u8,
    #[serde(default = "default_true")]
    pub do_center_crop: bool,
    #[serde(default = "default_crop")]
    pub crop_size: CropSize,
    #[serde(default = "default_true")]
    pub do_rescale: bool,
    #[serde(default = "default_rescale_factor")]
    pub rescale_factor: f32,
    #[serde(default)]
    pub do_normalize: bool,
    #[serde(default = "default_mean")]
    pub image_mean: [f32; 3],
    #[serde(default = "default_std")]
    pub image_std: [f32; 3],
}

impl Default for FastVlmImageProcessor {
    fn default() -> Self {
        Self {
            do_resize: true,
            size: default_resize(),
            resample: default_resample(),
            do_center_crop: true,
            crop_size: default_crop(),
            do_rescale: true,
            rescale_factor: default_rescale_factor(),
            do_normalize: false,
            image_mean: default_mean(),
            image_std: default_std(),
        }
    }
}

impl FastVlmImageProcessor {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn filter(&self) -> FilterType {
        match self.resample {
            0 => FilterType::Nearest,
            1 => FilterType::Lanczos3,
            2 => FilterType::Triangle,
            _ => FilterType::CatmullRom,
        }
    }

    /// Output spatial size (height, width) for an input of `width` x `height`
    pub fn output_size(&self, width: u32, height: u32) -> (u32, u32) {
        let (w, h) = self.resized_dims(width, height);
        if self.do_center_crop {
            (self.crop_size.height, self.crop_size.width)
        } else {
            (h, w)
        }
    }

    fn resized_dims(&self, width: u32, height: u32) -> (u32, u32) {
        let (w, h) = self.resized_dims_u64(width, height);
        (
            u32::try_from(w).unwrap_or(u32::MAX),
            u32::try_from(h).unwrap_or(u32::MAX),
        )
    }

    fn resized_dims_u64(&self, width: u32, height: u32) -> (u64, u64) {
        let (width, height) = (u64::from(width), u64::from(height));
        if !self.do_resize || width == 0 || height == 0 {
            return (width, height);
        }
        match self.size {
            ResizeTarget::Exact { height: h, width: w } => (u64::from(w), u64::from(h)),
            ResizeTarget::ShortestEdge { shortest_edge } => {
                let edge = u64::from(shortest_edge);
                if width <= height {
                    (edge, (edge * height / width).max(1))
                } else {
                    ((edge * width / height).max(1), edge)
                }
            }
        }
    }

    /// Source image whose resize stays within `MAX_RESIZE_PIXELS`
    ///
    /// With shortest-edge resize and center crop, an overlong axis is cropped
    /// around its center to what the final crop can see before resizing.
    fn bounded_source<'a>(&self, image: &'a RgbImage) -> Result<Cow<'a, RgbImage>> {
        let (width, height) = image.dimensions();
        let (new_w, new_h) = self.resized_dims_u64(width, height);
        if new_w.saturating_mul(new_h) <= MAX_RESIZE_PIXELS {
            return Ok(Cow::Borrowed(image));
        }

        let ResizeTarget::ShortestEdge { shortest_edge } = self.size else {
            anyhow::bail!("Resize of {}x{} to {}x{} exceeds the pixel limit", width, height, new_w, new_h);
        };
        if !self.do_center_crop {
            anyhow::bail!("Resize of {}x{} to {}x{} exceeds the pixel limit", width, height, new_w, new_h);
        }

        // Source pixels per output pixel, plus filter support on each side
        let short = u64::from(width.min(height));
        let keep = |crop: u32, full: u32| -> u32 {
            let needed = (u64::from(crop) + 2 * CROP_MARGIN) * short / u64::from(shortest_edge) + 1;
            u32::try_from(needed).map_or(full, |n| n.min(full))
        };
        let (keep_w, keep_h) = if width > height {
            (keep(self.crop_size.width, width), height)
        } else {
            (width, keep(self.crop_size.height, height))
        };

        let x = (width - keep_w) / 2;
        let y = (height - keep_h) / 2;
        debug!(
            "Cropping {}x{} source to {}x{} before resize",
            width, height, keep_w, keep_h
        );
        let cropped = imageops::crop_imm(image, x, y, keep_w, keep_h).to_image();

        let (w, h) = self.resized_dims_u64(keep_w, keep_h);
        if w.saturating_mul(h) > MAX_RESIZE_PIXELS {
            anyhow::bail!("Resize of {}x{} to {}x{} exceeds the pixel limit", keep_w, keep_h, w, h);
        }
        Ok(Cow::Owned(cropped))
    }

    pub fn preprocess(&self, image: &RgbImage) -> Result<Array4<f32>> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            anyhow::bail!("Cannot preprocess an empty {}x{} image", width, height);
        }

        let source = self.bounded_source(image)?;
        let (new_w, new_h) = self.resized_dims(source.width(), source.height());
        let resized = if (new_w, new_h) == source.dimensions() {
            source.into_owned()
        } else {
            imageops::resize(source.as_ref(), new_w, new_h, self.filter())
        };

        let cropped = if self.do_center_crop {
            center_crop(&resized, self.crop_size.width, self.crop_size.height)
        } else {
            resized
        };

        let (out_w, out_h) = cropped.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, out_h as usize, out_w as usize));
        let scale = if self.do_rescale { self.rescale_factor } else { 1.0 };

        for (x, y, pixel) in cropped.enumerate_pixels() {
            for c in 0..3 {
                let mut value = pixel[c] as f32 * scale;
                if self.do_normalize {
                    value = (value - self.image_mean[c]) / self.image_std[c];
                }
                tensor[[0, c, y as usize, x as usize]] = value;
            }
        }

        debug!(
            "Preprocessed {}x{} -> {:?} (resize {}x{})",
            width,
            height,
            tensor.shape(),
            new_w,
            new_h
        );
        Ok(tensor)
    }
}

/// Center crop to `width` x `height`, zero padding any side that is too small
fn center_crop(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    if (w, h) == (width, height) {
        return image.clone();
    }

    let mut out = RgbImage::from_pixel(width, height, Rgb([0, 0, 0]));
    let src_x = w.saturating_sub(width) / 2;
    let src_y = h.saturating_sub(height) / 2;
    let copy_w = w.min(width);
    let copy_h = h.min(height);
    let view = imageops::crop_imm(image, src_x, src_y, copy_w, copy_h).to_image();

    let dst_x = width.saturating_sub(w) / 2;
    let dst_y = height.saturating_sub(h) / 2;
    imageops::replace(&mut out, &view, dst_x as i64, dst_y as i64);
    out
}
