// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! GET /health and routing tests

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use fastvlm_node::version;
use std::sync::Arc;
use tower::ServiceExt;

use crate::common::{json_body, test_router, ScriptedModel};

#[tokio::test]
async fn test_health_reports_model_and_placement() {
    let app = test_router(Arc::new(ScriptedModel::replying("ok").on_cuda_f16()));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["model"], "scripted-vlm");
    assert_eq!(body["device"], "cuda");
    assert_eq!(body["precision"], "f16");
    assert_eq!(body["version"], version::VERSION);
}

#[tokio::test]
async fn test_cors_preflight_allowed() {
    let app = test_router(Arc::new(ScriptedModel::replying("ok")));

    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/caption")
                .header("origin", "http://example.com")
                .header("access-control-request-method", "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "*"
    );
}

#[tokio::test]
async fn test_caption_requires_post() {
    let app = test_router(Arc::new(ScriptedModel::replying("ok")));

    let response = app
        .oneshot(Request::builder().uri("/caption").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_caption_without_multipart_is_rejected() {
    let app = test_router(Arc::new(ScriptedModel::replying("ok")));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/caption")
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}
