// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Side-by-side composition of a frame sequence into one labeled image

use image::imageops::{self, FilterType};
use image::RgbImage;
use std::borrow::Cow;
use std::time::Instant;
use tracing::{debug, info};

use super::label::{LabelFont, LABEL_OFFSET};
use crate::inference::error::VlmError;

/// Ordered, non-empty list of frames
#[derive(Debug, Clone)]
pub struct FrameSequence {
    frames: Vec<RgbImage>,
}

impl FrameSequence {
    pub fn new(frames: Vec<RgbImage>) -> Result<Self, VlmError> {
        if frames.is_empty() {
            return Err(VlmError::EmptyFrames);
        }
        Ok(Self { frames })
    }

    pub fn single(frame: RgbImage) -> Self {
        Self {
            frames: vec![frame],
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[RgbImage] {
        &self.frames
    }
}

/// Widest composite accepted
pub const MAX_COMPOSITE_WIDTH: u64 = 16_384;

/// Largest composite area accepted
pub const MAX_COMPOSITE_PIXELS: u64 = 64 * 1024 * 1024;

/// Width of a frame scaled to `target_height` with its aspect ratio
///
/// `height` must be non-zero.
pub fn scaled_width(width: u32, height: u32, target_height: u32) -> u64 {
    let numerator = u64::from(target_height) * u64::from(width);
    let height = u64::from(height);
    ((numerator + height / 2) / height).max(1)
}

#[derive(Debug)]
pub struct FrameCompositor {
    label_font: LabelFont,
}

impl FrameCompositor {
    pub fn new(label_font: LabelFont) -> Self {
        Self { label_font }
    }

    pub fn label_font(&self) -> &LabelFont {
        &self.label_font
    }

    /// Compose `frames` into a single image
    ///
    /// A single frame is returned borrowed and untouched. Several frames are
    /// scaled to the tallest height, labeled 1..=N and pasted left to right.
    pub fn compose<'a>(&self, frames: &'a FrameSequence) -> Result<Cow<'a, RgbImage>, VlmError> {
        for (index, frame) in frames.frames().iter().enumerate() {
            if frame.width() == 0 || frame.height() == 0 {
                return Err(VlmError::InvalidFrame {
                    index,
                    width: frame.width(),
                    height: frame.height(),
                });
            }
        }

        if let [only] = frames.frames() {
            debug!("Single frame {}x{}, no composition", only.width(), only.height());
            return Ok(Cow::Borrowed(only));
        }

        let start = Instant::now();
        let max_height = frames
            .frames()
            .iter()
            .map(RgbImage::height)
            .max()
            .unwrap_or(1);

        let widths: Vec<u64> = frames
            .frames()
            .iter()
            .map(|f| scaled_width(f.width(), f.height(), max_height))
            .collect();
        let total_width = checked_composite_width(&widths, max_height)?;

        let mut tiles = Vec::with_capacity(frames.len());
        for (index, (frame, &width)) in frames.frames().iter().zip(&widths).enumerate() {
            // Bounded by the composite check above
            let width = width as u32;
            let mut tile = if frame.dimensions() == (width, max_height) {
                frame.clone()
            } else {
                imageops::resize(frame, width, max_height, FilterType::Lanczos3)
            };
            self.label_font.draw(
                &mut tile,
                &(index + 1).to_string(),
                LABEL_OFFSET.0,
                LABEL_OFFSET.1,
            );
            tiles.push(tile);
        }

        let mut canvas = RgbImage::new(total_width, max_height);
        let mut x_offset: i64 = 0;
        for tile in &tiles {
            imageops::replace(&mut canvas, tile, x_offset, 0);
            x_offset += tile.width() as i64;
        }

        info!(
            "Composited {} frames into {}x{} in {}ms",
            frames.len(),
            total_width,
            max_height,
            start.elapsed().as_millis()
        );

        Ok(Cow::Owned(canvas))
    }
}

/// Sum of tile widths if the composite stays within the size limits
fn checked_composite_width(widths: &[u64], height: u32) -> Result<u32, VlmError> {
    let too_large = |width: u64| VlmError::CompositeTooLarge {
        width,
        height,
        max_width: MAX_COMPOSITE_WIDTH,
        max_pixels: MAX_COMPOSITE_PIXELS,
    };

    let total = widths
        .iter()
        .try_fold(0u64, |acc, &w| acc.checked_add(w))
        .ok_or_else(|| too_large(u64::MAX))?;
    let pixels = total.checked_mul(u64::from(height));
    if total > MAX_COMPOSITE_WIDTH || pixels.map_or(true, |p| p > MAX_COMPOSITE_PIXELS) {
        return Err(too_large(total));
    }
    u32::try_from(total).map_err(|_| too_large(total))
}

impl Default for FrameCompositor {
    fn default() -> Self {
        Self::new(LabelFont::default())
    }
}
