// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! POST /caption tests
//!
//! Drive the full router with a scripted model and check:
//! - Default and custom prompts reach the chat template
//! - One image marker per request, mask matches ids
//! - Upload errors are 400 and never reach the model
//! - Runtime failures map to 500 / 503

use axum::http::StatusCode;
use fastvlm_node::inference::{Precision, IMAGE_PLACEHOLDER, IMAGE_TOKEN_INDEX};
use image::ImageFormat;
use std::sync::Arc;
use tower::ServiceExt;

use crate::common::{
    encode_image, json_body, multipart_request, png, solid_image, test_router, Part,
    ScriptedModel,
};

#[tokio::test]
async fn test_caption_default_prompt() {
    let model = Arc::new(ScriptedModel::replying("A grey square on a table"));
    let app = test_router(model.clone());

    let response = app
        .oneshot(multipart_request("/caption", &[Part::file("file", png(64, 48, 120))]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body, serde_json::json!({"caption": "A grey square on a table"}));

    let message = model.last_user_message();
    assert!(message.starts_with(IMAGE_PLACEHOLDER));
    assert!(message.ends_with("Describe in one sentence"));
}

#[tokio::test]
async fn test_caption_custom_prompt_and_single_marker() {
    let model = Arc::new(ScriptedModel::replying("Red"));
    let app = test_router(model.clone());

    let response = app
        .oneshot(multipart_request(
            "/caption",
            &[
                Part::text("prompt", "What color is the ball?"),
                Part::file("file", png(32, 32, 200)),
            ],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(model.last_user_message().ends_with("What color is the ball?"));
    let call = model.last_call();
    assert_eq!(
        call.input_ids
            .iter()
            .filter(|&&id| id == IMAGE_TOKEN_INDEX)
            .count(),
        1
    );
    assert_eq!(call.attention_mask.len(), call.input_ids.len());
    assert!(call.attention_mask.iter().all(|&m| m == 1));
    assert_eq!(call.max_new_tokens, 32);
}

#[tokio::test]
async fn test_caption_passes_image_unchanged() {
    let model = Arc::new(ScriptedModel::replying("ok"));
    let app = test_router(model.clone());
    let jpeg = encode_image(&solid_image(40, 30, 90), ImageFormat::Jpeg);

    let response = app
        .oneshot(multipart_request("/caption", &[Part::file("file", jpeg)]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(model.last_image().dimensions(), (40, 30));
}

#[tokio::test]
async fn test_caption_respects_token_budget() {
    let model = Arc::new(
        ScriptedModel::replying(&"word ".repeat(100)).with_reply_tokens(80),
    );
    let app = test_router(model.clone());

    let response = app
        .oneshot(multipart_request("/caption", &[Part::file("file", png(16, 16, 0))]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let caption = body["caption"].as_str().unwrap();
    assert!(caption.split_whitespace().count() <= 32);
    assert!(!caption.contains("<|im_end|>"));
}

#[tokio::test]
async fn test_caption_casts_pixels_to_model_precision() {
    let model = Arc::new(ScriptedModel::replying("ok").on_cuda_f16());
    let app = test_router(model.clone());

    let response = app
        .oneshot(multipart_request("/caption", &[Part::file("file", png(16, 16, 0))]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(model.last_call().placement.precision, Precision::F16);
}

#[tokio::test]
async fn test_caption_missing_file() {
    let model = Arc::new(ScriptedModel::replying("unused"));
    let app = test_router(model.clone());

    let response = app
        .oneshot(multipart_request("/caption", &[Part::text("prompt", "hi")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error_type"], "validation_error");
    assert_eq!(body["details"]["field"], "file");
    assert_eq!(model.generate_count(), 0);
}

#[tokio::test]
async fn test_caption_rejects_non_image() {
    let model = Arc::new(ScriptedModel::replying("unused"));
    let app = test_router(model.clone());

    let response = app
        .oneshot(multipart_request(
            "/caption",
            &[Part::file("file", b"definitely not an image".to_vec())],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["details"]["field"], "file");
    assert_eq!(model.generate_count(), 0);
}

#[tokio::test]
async fn test_caption_prompt_with_placeholder_is_400() {
    let model = Arc::new(ScriptedModel::replying("unused"));
    let app = test_router(model.clone());

    let prompt = format!("What is in this {}?", IMAGE_PLACEHOLDER);
    let response = app
        .oneshot(multipart_request(
            "/caption",
            &[
                Part::file("file", png(16, 16, 0)),
                Part::text("prompt", &prompt),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error_type"], "validation_error");
    assert_eq!(body["details"]["field"], "prompt");
    assert_eq!(model.generate_count(), 0);
}

#[tokio::test]
async fn test_caption_rejects_oversized_dimensions() {
    let model = Arc::new(ScriptedModel::replying("unused"));
    let app = test_router(model.clone());

    let response = app
        .oneshot(multipart_request(
            "/caption",
            &[Part::file("file", png(1, 8193, 0))],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["details"]["field"], "file");
    assert_eq!(model.generate_count(), 0);
}

#[tokio::test]
async fn test_caption_out_of_memory_is_503() {
    let model = Arc::new(ScriptedModel::failing(
        "CUDA error: out of memory while allocating 2 GiB",
    ));
    let app = test_router(model);

    let response = app
        .oneshot(multipart_request("/caption", &[Part::file("file", png(16, 16, 0))]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["error_type"], "service_unavailable");
}

#[tokio::test]
async fn test_caption_runtime_failure_is_500() {
    let model = Arc::new(ScriptedModel::failing("shape mismatch in decoder"));
    let app = test_router(model);

    let response = app
        .oneshot(multipart_request("/caption", &[Part::file("file", png(16, 16, 0))]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["error_type"], "internal_error");
}

#[tokio::test]
async fn test_concurrent_captions_are_independent() {
    let model = Arc::new(ScriptedModel::replying("same answer"));
    let app = test_router(model.clone());

    let first = app
        .clone()
        .oneshot(multipart_request("/caption", &[Part::file("file", png(20, 10, 0))]));
    let second = app.oneshot(multipart_request(
        "/caption",
        &[
            Part::text("prompt", "Second request"),
            Part::file("file", png(10, 20, 255)),
        ],
    ));
    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.unwrap().status(), StatusCode::OK);
    assert_eq!(second.unwrap().status(), StatusCode::OK);
    assert_eq!(model.generate_count(), 2);

    let mut sizes: Vec<(u32, u32)> = model
        .images
        .lock()
        .unwrap()
        .iter()
        .map(|i| i.dimensions())
        .collect();
    sizes.sort();
    assert_eq!(sizes, vec![(10, 20), (20, 10)]);
}
