//! Per-file column schema from the `<campaign>_<template>.metadata` sidecar.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Deserialize;

use crate::error::{PickerError, PickerResult};

/// Media type value meaning "attach no media payload".
pub const NO_MEDIA: &str = "none";

/// Sidecar JSON as written by the upload producer.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    #[serde(default = "default_media_type")]
    pub media_type: String,
    pub columns: Vec<String>,
}

fn default_media_type() -> String {
    NO_MEDIA.into()
}

/// Semantic meaning of one CSV column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Recipient,
    Parameter,
    MediaField(String),
}

impl Role {
    fn from_name(name: &str) -> Self {
        match name {
            "recipient" => Role::Recipient,
            "parameter" => Role::Parameter,
            other => Role::MediaField(other.to_string()),
        }
    }
}

/// Metadata resolved once per file into typed roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSchema {
    /// `None` when the metadata says `"none"`.
    pub media_type: Option<String>,
    /// Role of each column; index 0 is kept for alignment but never read.
    pub roles: Vec<Role>,
}

impl FileSchema {
    pub fn from_metadata(metadata: FileMetadata) -> Self {
        let media_type = (metadata.media_type != NO_MEDIA).then_some(metadata.media_type);
        let roles = metadata.columns.iter().map(|c| Role::from_name(c)).collect();
        Self { media_type, roles }
    }

    pub fn sidecar_path(upload_dir: &Path, campaign_id: &str, template_id: &str) -> PathBuf {
        upload_dir.join(format!("{campaign_id}_{template_id}.metadata"))
    }

    pub async fn load(upload_dir: &Path, campaign_id: &str, template_id: &str) -> PickerResult<Self> {
        let path = Self::sidecar_path(upload_dir, campaign_id, template_id);
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PickerError::MetadataNotFound { path });
            }
            Err(e) => return Err(PickerError::Io(e)),
        };
        let metadata: FileMetadata = serde_json::from_slice(&content)
            .map_err(|source| PickerError::MetadataParse { path, source })?;
        Ok(Self::from_metadata(metadata))
    }

    /// Role of column `idx`, or `None` past the declared columns.
    pub fn role(&self, idx: usize) -> Option<&Role> {
        self.roles.get(idx)
    }
}

/// Schemas already loaded this cycle, keyed by `(campaign, template)`.
///
/// Missing entries are loaded from disk on first use. The dispatcher owns one
/// cache and clears it at the start of every cycle so edited sidecars apply to
/// the next scan.
#[derive(Debug, Default)]
pub struct SchemaCache {
    entries: Mutex<HashMap<(String, String), Arc<FileSchema>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_load(
        &self,
        upload_dir: &Path,
        campaign_id: &str,
        template_id: &str,
    ) -> PickerResult<Arc<FileSchema>> {
        let key = (campaign_id.to_string(), template_id.to_string());
        let cached = self.lock().get(&key).cloned();
        if let Some(schema) = cached {
            return Ok(schema);
        }

        // Two files racing on the same key both load; the later insert wins
        // and the schemas are identical anyway.
        let schema = Arc::new(FileSchema::load(upload_dir, campaign_id, template_id).await?);
        self.lock().insert(key, Arc::clone(&schema));
        tracing::debug!(campaign = campaign_id, template = template_id, "metadata loaded");
        Ok(schema)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), Arc<FileSchema>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
