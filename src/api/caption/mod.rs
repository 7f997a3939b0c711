// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption API endpoint module
//!
//! Provides POST /caption for describing a single uploaded image.

pub mod handler;
pub mod request;
pub mod response;

pub use handler::caption_handler;
pub use request::CaptionRequest;
pub use response::CaptionResponse;
