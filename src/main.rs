// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use clap::Parser;
use fastvlm_node::{
    api::{start_server, AppState},
    config::Config,
    inference::VlmService,
    version,
    vision::{fastvlm::download_model, FastVlmModel, FrameCompositor, LabelFont},
};
use std::{env, sync::Arc};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::parse();
    info!("Starting {} ({})", version::get_version_string(), version::VERSION);

    let model_config = config.model_config();
    if config.download {
        let repo = config.model_repo.clone();
        let target = model_config.clone();
        tokio::task::spawn_blocking(move || download_model(&repo, &target))
            .await
            .context("Model download task panicked")??;
    }

    let model = tokio::task::spawn_blocking(move || FastVlmModel::load(&model_config))
        .await
        .context("Model loading task panicked")??;

    let label_font = LabelFont::load(config.label_font.as_deref()).with_size(config.label_font_size);
    info!(
        "Frame labels use {} font at {}px",
        if label_font.is_scalable() { "scalable" } else { "bitmap" },
        label_font.size()
    );

    let service = VlmService::new(Arc::new(model), FrameCompositor::new(label_font))
        .with_token_budgets(config.caption_max_new_tokens, config.action_max_new_tokens);

    let addr = config.socket_addr()?;
    start_server(addr, AppState::new(service), config.max_body_bytes).await?;

    info!("Server stopped");
    Ok(())
}
