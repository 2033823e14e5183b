//! Picker configuration, loaded from a TOML file with camelCase keys.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PickerError, PickerResult};

/// Where mapped batches are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertMode {
    /// Flat CSV export files, one per batch.
    Csv,
    /// Bulk insert into the record table.
    Database,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickerConfig {
    #[serde(default = "default_upload_path")]
    pub upload_path: PathBuf,
    #[serde(default = "default_archive_path")]
    pub archive_path: PathBuf,
    #[serde(default = "default_export_path")]
    pub export_path: PathBuf,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Lines dropped from the start of each file's first batch.
    #[serde(default)]
    pub skip_count: usize,
    #[serde(default = "default_insert_mode")]
    pub insert_mode: InsertMode,
    #[serde(default)]
    pub parallel_pick: bool,
    /// Upper bound on files ingested at once when `parallel_pick` is set.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Keep sibling files running when one file of a parallel cycle fails.
    #[serde(default = "default_true")]
    pub isolate_failures: bool,
    /// Stop the scheduler on the first failed cycle.
    #[serde(default)]
    pub halt_on_error: bool,
    /// Seconds between the end of one cycle and the start of the next.
    #[serde(default = "default_delay")]
    pub delay: u64,
    #[serde(default = "default_charset")]
    pub charset: String,
}

fn default_upload_path() -> PathBuf { PathBuf::from("./upload") }
fn default_archive_path() -> PathBuf { PathBuf::from("./archive") }
fn default_export_path() -> PathBuf { PathBuf::from("./export") }
fn default_database_path() -> PathBuf { PathBuf::from("./campaign.sqlite") }
fn default_batch_size() -> usize { 1000 }
fn default_insert_mode() -> InsertMode { InsertMode::Database }
fn default_max_concurrency() -> usize { 4 }
fn default_true() -> bool { true }
fn default_delay() -> u64 { 10 }
fn default_charset() -> String { "utf-8".into() }

impl Default for PickerConfig {
    fn default() -> Self {
        Self {
            upload_path: default_upload_path(),
            archive_path: default_archive_path(),
            export_path: default_export_path(),
            database_path: default_database_path(),
            batch_size: default_batch_size(),
            skip_count: 0,
            insert_mode: default_insert_mode(),
            parallel_pick: false,
            max_concurrency: default_max_concurrency(),
            isolate_failures: true,
            halt_on_error: false,
            delay: default_delay(),
            charset: default_charset(),
        }
    }
}

impl PickerConfig {
    /// Read and validate a config file.
    pub fn load_from(path: &Path) -> PickerResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PickerError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> PickerResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| PickerError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PickerResult<()> {
        if self.batch_size == 0 {
            return Err(PickerError::Config("batchSize must be at least 1".into()));
        }
        if self.max_concurrency == 0 {
            return Err(PickerError::Config("maxConcurrency must be at least 1".into()));
        }
        self.encoding()?;
        Ok(())
    }

    /// Character set of the upload files.
    pub fn encoding(&self) -> PickerResult<&'static encoding_rs::Encoding> {
        encoding_rs::Encoding::for_label(self.charset.as_bytes())
            .ok_or_else(|| PickerError::Config(format!("unknown charset: {}", self.charset)))
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay)
    }
}
