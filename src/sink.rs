//! Insertion sinks: where mapped batches go.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use csv_async::AsyncWriterBuilder;
use tokio::fs::File;

use crate::error::SinkError;
use crate::record::CanonicalRecord;

/// Persists one batch of records.
///
/// In parallel mode several files call `insert` at the same time, so
/// implementations must accept concurrent calls. A returned error aborts the
/// calling file without archiving it.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn insert(&self, records: &[CanonicalRecord]) -> Result<(), SinkError>;
}

/// Column order of the export files.
pub const EXPORT_HEADER: [&str; 12] = [
    "recipient",
    "campaignId",
    "templateId",
    "mediaId",
    "media",
    "parameters",
    "activeStartHour",
    "activeStartMinute",
    "activeEndHour",
    "activeEndMinute",
    "activeOnWeekends",
    "timezone",
];

/// Writes every batch to its own CSV file for a bulk loader to pick up.
///
/// Files are named `records_<utc timestamp>_<sequence>.csv`; media and
/// parameters are JSON-encoded cells.
pub struct CsvExportSink {
    dir: PathBuf,
    sequence: AtomicU64,
}

impl CsvExportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn next_path(&self) -> PathBuf {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S%3f");
        self.dir.join(format!("records_{stamp}_{seq:06}.csv"))
    }
}

fn export_row(record: &CanonicalRecord) -> Result<[String; 12], SinkError> {
    let media = match &record.media {
        Some(media) => serde_json::to_string(media)?,
        None => String::new(),
    };
    Ok([
        record.recipient.clone().unwrap_or_default(),
        record.campaign_id.clone(),
        record.template_id.clone(),
        record.media_id.clone().unwrap_or_default(),
        media,
        serde_json::to_string(&record.parameters)?,
        record.active_start_hour.to_string(),
        record.active_start_minute.to_string(),
        record.active_end_hour.to_string(),
        record.active_end_minute.to_string(),
        record.active_on_weekends.to_string(),
        record.timezone.clone(),
    ])
}

#[async_trait]
impl RecordSink for CsvExportSink {
    async fn insert(&self, records: &[CanonicalRecord]) -> Result<(), SinkError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.next_path();
        let file = File::create(&path).await?;
        let mut writer = AsyncWriterBuilder::new().create_writer(file);

        writer.write_record(&EXPORT_HEADER).await?;
        for record in records {
            writer.write_record(&export_row(record)?).await?;
        }
        writer.flush().await?;

        tracing::debug!(path = %path.display(), records = records.len(), "batch exported");
        Ok(())
    }
}
