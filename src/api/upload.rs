// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Multipart form collection shared by the caption and action endpoints

use axum::body::Bytes;
use axum_extra::extract::Multipart;
use std::collections::HashMap;
use tracing::debug;

use crate::api::errors::ApiError;
use crate::inference::IMAGE_PLACEHOLDER;

/// Field names carrying image bytes
pub const FILE_FIELDS: &[&str] = &["file", "files"];

/// One uploaded image part
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub filename: Option<String>,
    pub data: Bytes,
}

/// Every part of a multipart body, files in arrival order
#[derive(Debug, Clone, Default)]
pub struct UploadForm {
    pub files: Vec<UploadedFile>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::InvalidRequest(format!("Malformed multipart body: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if FILE_FIELDS.contains(&name.as_str()) {
                let filename = field.file_name().map(|f| f.to_string());
                let data = field.bytes().await.map_err(|e| {
                    ApiError::InvalidRequest(format!("Failed to read {}: {}", name, e))
                })?;
                debug!("Received {} ({:?}, {} bytes)", name, filename, data.len());
                form.files.push(UploadedFile {
                    field: name,
                    filename,
                    data,
                });
            } else {
                let value = field.text().await.map_err(|e| {
                    ApiError::InvalidRequest(format!("Failed to read {}: {}", name, e))
                })?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    /// Text field verbatim, `default` only when the field is absent
    pub fn text_or(&self, name: &str, default: &str) -> String {
        self.fields
            .get(name)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    /// `prompt` field, rejecting text that would add a second image placeholder
    pub fn prompt_or(&self, default: &str) -> Result<String, ApiError> {
        let prompt = self.text_or("prompt", default);
        if prompt.contains(IMAGE_PLACEHOLDER) {
            return Err(ApiError::validation(
                "prompt",
                format!("prompt must not contain the reserved {} token", IMAGE_PLACEHOLDER),
            ));
        }
        Ok(prompt)
    }

    /// Integer field, `default` when absent
    pub fn integer_or(&self, name: &str, default: u32) -> Result<u32, ApiError> {
        match self.fields.get(name) {
            None => Ok(default),
            Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
                ApiError::validation(
                    name,
                    format!("{} must be a non-negative integer, got '{}'", name, raw),
                )
            }),
        }
    }

    /// Files uploaded under `field`, in arrival order
    pub fn files_named<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a UploadedFile> + 'a {
        self.files.iter().filter(move |f| f.field == field)
    }
}
