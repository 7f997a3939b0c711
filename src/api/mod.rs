// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod action;
pub mod caption;
pub mod errors;
pub mod handlers;
pub mod http_server;
pub mod upload;

pub use action::{action_handler, ActionRequest};
pub use caption::{caption_handler, CaptionRequest, CaptionResponse};
pub use errors::{ApiError, ApiErrorResponse, ErrorResponse};
pub use handlers::{health_handler, HealthResponse};
pub use http_server::{create_router, start_server, AppState};
pub use upload::{UploadForm, UploadedFile};
