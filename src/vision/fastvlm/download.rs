// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Fetch the FastVLM ONNX export from the Hugging Face Hub

use anyhow::{Context, Result};
use hf_hub::api::sync::Api;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

use super::config::{Component, FastVlmConfig, SUPPORT_FILES};

/// Repository-relative files needed for `config`, external weights excluded
pub fn required_files(config: &FastVlmConfig) -> Vec<String> {
    SUPPORT_FILES
        .iter()
        .map(|name| name.to_string())
        .chain(Component::ALL.iter().map(|&c| config.variants.onnx_file(c)))
        .collect()
}

/// `.onnx_data` companions present in the repository listing
pub fn external_data_files(onnx_files: &[String], listing: &HashSet<String>) -> Vec<String> {
    onnx_files
        .iter()
        .filter(|f| f.ends_with(".onnx"))
        .flat_map(|f| [format!("{}_data", f), format!("{}.data", f)])
        .filter(|f| listing.contains(f))
        .collect()
}

/// Download into the HF cache and copy into `config.model_dir`
///
/// Files already present locally are left untouched.
pub fn download_model(repo_id: &str, config: &FastVlmConfig) -> Result<()> {
    let api = Api::new().context("Failed to initialise Hugging Face API client")?;
    let repo = api.model(repo_id.to_string());

    let listing: HashSet<String> = repo
        .info()
        .with_context(|| format!("Failed to list {} on Hugging Face", repo_id))?
        .siblings
        .into_iter()
        .map(|s| s.rfilename)
        .collect();
    debug!("{} lists {} files", repo_id, listing.len());

    let mut files = required_files(config);
    let extra = external_data_files(&files, &listing);
    files.extend(extra);

    for name in &files {
        if !listing.contains(name) {
            anyhow::bail!("{} has no file {}", repo_id, name);
        }
    }

    for name in &files {
        let target = config.model_dir.join(name);
        if target.exists() {
            debug!("Already present: {}", target.display());
            continue;
        }
        info!("Downloading {} from {}", name, repo_id);
        let cached = repo
            .get(name)
            .with_context(|| format!("Failed to download {} from Hugging Face", name))?;
        copy_to_target(&cached, &target)?;
    }

    info!("Model files ready in {}", config.model_dir.display());
    Ok(())
}

fn copy_to_target(source: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::copy(source, target).with_context(|| {
        format!("Failed to copy {} to {}", source.display(), target.display())
    })?;
    Ok(())
}
