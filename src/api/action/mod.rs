// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Action API endpoint module
//!
//! Provides POST /action for describing what happens across ordered frames.

pub mod handler;
pub mod request;

pub use handler::action_handler;
pub use request::ActionRequest;
