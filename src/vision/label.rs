// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Ordinal labels stamped onto composited frames
//!
//! A scalable TrueType font is used when one can be loaded. Otherwise a
//! built-in 5x7 bitmap digit font is drawn with filled rectangles, so
//! labelling never fails.

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Label color (pure red)
pub const LABEL_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Label origin inside each frame
pub const LABEL_OFFSET: (i32, i32) = (10, 10);

/// Default label pixel height
pub const DEFAULT_LABEL_SIZE: f32 = 48.0;

/// Bold system fonts tried after the configured one
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

const BITMAP_COLS: i32 = 5;
const BITMAP_ROWS: i32 = 7;

/// Rows of the 5x7 digit glyphs, most significant of the low 5 bits on the left
const BITMAP_DIGITS: [[u8; 7]; 10] = [
    [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
    [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
    [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
    [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
    [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
    [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
    [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
    [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
    [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
    [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
];

enum Glyphs {
    Scalable { font: FontVec, source: PathBuf },
    Bitmap,
}

pub struct LabelFont {
    glyphs: Glyphs,
    size: f32,
}

impl std::fmt::Debug for LabelFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match &self.glyphs {
            Glyphs::Scalable { source, .. } => source.display().to_string(),
            Glyphs::Bitmap => "builtin".to_string(),
        };
        f.debug_struct("LabelFont")
            .field("source", &source)
            .field("size", &self.size)
            .finish()
    }
}

impl LabelFont {
    /// Load `preferred`, then the system candidates, then the bitmap font
    pub fn load(preferred: Option<&Path>) -> Self {
        let candidates = preferred
            .map(Path::to_path_buf)
            .into_iter()
            .chain(SYSTEM_FONT_CANDIDATES.iter().map(PathBuf::from));

        for path in candidates {
            if !path.exists() {
                continue;
            }
            match read_font(&path) {
                Ok(font) => {
                    info!("Label font loaded from {}", path.display());
                    return Self {
                        glyphs: Glyphs::Scalable { font, source: path },
                        size: DEFAULT_LABEL_SIZE,
                    };
                }
                Err(e) => warn!("Skipping label font {}: {}", path.display(), e),
            }
        }

        warn!("No scalable label font available, using built-in bitmap digits");
        Self::builtin()
    }

    pub fn builtin() -> Self {
        Self {
            glyphs: Glyphs::Bitmap,
            size: DEFAULT_LABEL_SIZE,
        }
    }

    pub fn with_size(mut self, size: f32) -> Self {
        self.size = if size.is_finite() && size >= 1.0 {
            size
        } else {
            DEFAULT_LABEL_SIZE
        };
        self
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    pub fn is_scalable(&self) -> bool {
        matches!(self.glyphs, Glyphs::Scalable { .. })
    }

    /// Pixel height actually used on a canvas of `canvas_height`
    pub fn effective_size(&self, canvas_height: u32) -> f32 {
        let room = canvas_height as f32 - 2.0 * LABEL_OFFSET.1 as f32;
        self.size.min(room.max(canvas_height as f32 / 2.0)).max(1.0)
    }

    /// Stamp `text` at (`x`, `y`); parts outside the canvas are clipped
    pub fn draw(&self, canvas: &mut RgbImage, text: &str, x: i32, y: i32) {
        let size = self.effective_size(canvas.height());
        match &self.glyphs {
            Glyphs::Scalable { font, .. } => {
                draw_text_mut(canvas, LABEL_COLOR, x, y, PxScale::from(size), font, text);
            }
            Glyphs::Bitmap => draw_bitmap(canvas, text, x, y, size),
        }
    }
}

impl Default for LabelFont {
    fn default() -> Self {
        Self::load(None)
    }
}

fn read_font(path: &Path) -> anyhow::Result<FontVec> {
    let bytes = std::fs::read(path)?;
    FontVec::try_from_vec(bytes).map_err(|e| anyhow::anyhow!("invalid font: {}", e))
}

fn draw_bitmap(canvas: &mut RgbImage, text: &str, x: i32, y: i32, size: f32) {
    let cell = ((size / BITMAP_ROWS as f32).round() as i32).max(1);
    let advance = (BITMAP_COLS + 1) * cell;

    debug!("Drawing bitmap label '{}' with {}px cells", text, cell);

    for (i, ch) in text.chars().enumerate() {
        let Some(digit) = ch.to_digit(10) else {
            continue;
        };
        let origin_x = x + i as i32 * advance;
        for (row, bits) in BITMAP_DIGITS[digit as usize].iter().enumerate() {
            for col in 0..BITMAP_COLS {
                if bits & (1 << (BITMAP_COLS - 1 - col)) == 0 {
                    continue;
                }
                let rect = Rect::at(origin_x + col * cell, y + row as i32 * cell)
                    .of_size(cell as u32, cell as u32);
                draw_filled_rect_mut(canvas, rect, LABEL_COLOR);
            }
        }
    }
}
