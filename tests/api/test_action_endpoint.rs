// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! POST /action tests

use axum::http::StatusCode;
use std::sync::Arc;
use tower::ServiceExt;

use crate::common::{json_body, multipart_request, png, test_router, Part, ScriptedModel};

#[tokio::test]
async fn test_action_composites_frames() {
    let model = Arc::new(ScriptedModel::replying("A ball rolls to the right"));
    let app = test_router(model.clone());

    let response = app
        .oneshot(multipart_request(
            "/action",
            &[
                Part::file("files", png(100, 50, 10)),
                Part::file("files", png(40, 100, 20)),
                Part::file("files", png(60, 60, 30)),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        serde_json::json!({"caption": "A ball rolls to the right"})
    );

    // 200 + 40 + 100 wide at the tallest frame's height
    assert_eq!(model.last_image().dimensions(), (340, 100));
    assert_eq!(model.generate_count(), 1);
    assert_eq!(model.last_call().max_new_tokens, 128);

    let message = model.last_user_message();
    assert!(message.contains("3 consecutive frames"));
    assert!(message.ends_with("Describe what you see in this image."));
}

#[tokio::test]
async fn test_action_single_frame_uses_single_image_wording() {
    let model = Arc::new(ScriptedModel::replying("A dog sits"));
    let app = test_router(model.clone());

    let response = app
        .oneshot(multipart_request(
            "/action",
            &[
                Part::file("file", png(30, 20, 10)),
                Part::text("prompt", "What is the dog doing?"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(model.last_image().dimensions(), (30, 20));
    let message = model.last_user_message();
    assert!(!message.contains("consecutive frames"));
    assert!(message.ends_with("What is the dog doing?"));
}

#[tokio::test]
async fn test_action_accepts_sampling_fields() {
    let model = Arc::new(ScriptedModel::replying("ok"));
    let app = test_router(model.clone());

    let response = app
        .oneshot(multipart_request(
            "/action",
            &[
                Part::text("num_frames", "8"),
                Part::text("frame_jump", "3"),
                Part::file("files", png(10, 10, 0)),
                Part::file("files", png(10, 10, 255)),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    // Sampling hints do not drop or add frames
    assert_eq!(model.last_image().dimensions(), (20, 10));
}

#[tokio::test]
async fn test_action_non_integer_sampling_is_400() {
    let model = Arc::new(ScriptedModel::replying("unused"));
    let app = test_router(model.clone());

    let response = app
        .oneshot(multipart_request(
            "/action",
            &[
                Part::text("frame_jump", "every other"),
                Part::file("files", png(10, 10, 0)),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["details"]["field"], "frame_jump");
    assert_eq!(model.generate_count(), 0);
}

#[tokio::test]
async fn test_action_zero_frames_rejected_before_model() {
    let model = Arc::new(ScriptedModel::replying("unused"));
    let app = test_router(model.clone());

    let response = app
        .oneshot(multipart_request(
            "/action",
            &[Part::text("prompt", "What happens?")],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(model.generate_count(), 0);
    assert!(model.images.lock().unwrap().is_empty());
    assert!(model.messages.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_action_one_bad_frame_fails_whole_request() {
    let model = Arc::new(ScriptedModel::replying("unused"));
    let app = test_router(model.clone());

    let response = app
        .oneshot(multipart_request(
            "/action",
            &[
                Part::file("files", png(10, 10, 0)),
                Part::file("files", b"\x89PNG but truncated".to_vec()),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(model.generate_count(), 0);
}

#[tokio::test]
async fn test_action_bad_frame_reports_files_field() {
    let model = Arc::new(ScriptedModel::replying("unused"));
    let app = test_router(model.clone());

    let response = app
        .oneshot(multipart_request(
            "/action",
            &[Part::file("files", b"not an image".to_vec())],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error_type"], "validation_error");
    assert_eq!(body["details"]["field"], "files");
}

#[tokio::test]
async fn test_action_oversized_composite_rejected_before_model() {
    let model = Arc::new(ScriptedModel::replying("unused"));
    let app = test_router(model.clone());

    // Each wide strip scales to 16M px wide at the tall frame's height
    let response = app
        .oneshot(multipart_request(
            "/action",
            &[
                Part::file("files", png(1, 4000, 0)),
                Part::file("files", png(4000, 1, 0)),
                Part::file("files", png(4000, 1, 0)),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error_type"], "validation_error");
    assert_eq!(body["details"]["field"], "files");
    assert_eq!(model.generate_count(), 0);
    assert!(model.images.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_action_prompt_with_placeholder_is_400() {
    let model = Arc::new(ScriptedModel::replying("unused"));
    let app = test_router(model.clone());

    let response = app
        .oneshot(multipart_request(
            "/action",
            &[
                Part::file("files", png(10, 10, 0)),
                Part::text("prompt", "What happens in <image>?"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["details"]["field"], "prompt");
    assert_eq!(model.generate_count(), 0);
}
