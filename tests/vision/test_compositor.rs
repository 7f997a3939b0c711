// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Frame compositor tests against the public API

use fastvlm_node::vision::compositor::{scaled_width, MAX_COMPOSITE_WIDTH};
use fastvlm_node::vision::{FrameCompositor, FrameSequence, LabelFont};
use fastvlm_node::VlmError;
use image::RgbImage;
use std::borrow::Cow;

use crate::common::solid_image;

fn compositor() -> FrameCompositor {
    FrameCompositor::new(LabelFont::builtin().with_size(14.0))
}

/// Mean gray level of a column band, skipping the label corner
fn band_level(image: &RgbImage, x_start: u32, x_end: u32) -> f64 {
    let mut sum = 0u64;
    let mut count = 0u64;
    for x in x_start..x_end {
        for y in (image.height() / 2)..image.height() {
            sum += image.get_pixel(x, y)[1] as u64;
            count += 1;
        }
    }
    sum as f64 / count as f64
}

#[test]
fn test_three_frames_keep_order_and_brightness() {
    let frames = FrameSequence::new(vec![
        solid_image(80, 60, 40),
        solid_image(80, 60, 120),
        solid_image(80, 60, 220),
    ])
    .unwrap();

    let composite = compositor().compose(&frames).unwrap();
    assert_eq!(composite.dimensions(), (240, 60));

    let levels: Vec<f64> = (0..3)
        .map(|i| band_level(&composite, i * 80, (i + 1) * 80))
        .collect();
    assert!(levels[0] < levels[1] && levels[1] < levels[2]);
    assert!((levels[0] - 40.0).abs() < 1.0);
    assert!((levels[2] - 220.0).abs() < 1.0);
}

#[test]
fn test_each_frame_labeled_in_red() {
    let frames = FrameSequence::new(vec![
        solid_image(60, 60, 0),
        solid_image(60, 60, 0),
        solid_image(60, 60, 0),
    ])
    .unwrap();
    let composite = compositor().compose(&frames).unwrap();

    for i in 0..3u32 {
        let x0 = i * 60;
        let labeled = (x0 + 10..x0 + 30)
            .flat_map(|x| (10..30).map(move |y| (x, y)))
            .any(|(x, y)| {
                let p = composite.get_pixel(x, y);
                p[0] > 200 && p[1] < 50 && p[2] < 50
            });
        assert!(labeled, "frame {} has no red label", i + 1);
    }
}

#[test]
fn test_labels_differ_between_frames() {
    let frames = FrameSequence::new(vec![solid_image(60, 60, 0), solid_image(60, 60, 0)]).unwrap();
    let composite = compositor().compose(&frames).unwrap();

    let corner = |x0: u32| -> Vec<u8> {
        (0..40)
            .flat_map(|y| (0..40).map(move |x| (x0 + x, y)))
            .map(|(x, y)| composite.get_pixel(x, y)[0])
            .collect()
    };
    assert_ne!(corner(0), corner(60));
}

#[test]
fn test_mixed_heights_match_tallest() {
    let frames = FrameSequence::new(vec![solid_image(120, 30, 10), solid_image(50, 90, 10)]).unwrap();
    let composite = compositor().compose(&frames).unwrap();

    assert_eq!(composite.height(), 90);
    assert_eq!(u64::from(composite.width()), scaled_width(120, 30, 90) + 50);
    assert_eq!(scaled_width(120, 30, 90), 360);
}

#[test]
fn test_aspect_ratio_within_rounding() {
    for (w, h) in [(333u32, 77u32), (17, 101), (640, 479)] {
        let target = 480;
        let scaled = scaled_width(w, h, target);
        let expected = w as f64 * target as f64 / h as f64;
        assert!((scaled as f64 - expected).abs() <= 0.5 + f64::EPSILON);
    }
}

#[test]
fn test_single_frame_untouched() {
    let frame = solid_image(33, 21, 77);
    let frames = FrameSequence::single(frame.clone());
    let composite = compositor().compose(&frames).unwrap();

    assert!(matches!(composite, Cow::Borrowed(_)));
    assert_eq!(*composite, frame);
}

#[test]
fn test_empty_sequence_rejected() {
    assert!(matches!(
        FrameSequence::new(Vec::new()),
        Err(VlmError::EmptyFrames)
    ));
}

#[test]
fn test_extreme_aspect_ratios_fail_without_allocating() {
    let frames = FrameSequence::new(vec![
        solid_image(1, 4000, 0),
        solid_image(4000, 1, 0),
        solid_image(4000, 1, 0),
    ])
    .unwrap();

    match compositor().compose(&frames) {
        Err(VlmError::CompositeTooLarge { width, max_width, .. }) => {
            assert!(width > MAX_COMPOSITE_WIDTH);
            assert_eq!(max_width, MAX_COMPOSITE_WIDTH);
        }
        other => panic!("expected CompositeTooLarge, got {:?}", other.map(|c| c.dimensions())),
    }
}
