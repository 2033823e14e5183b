//! Drives one upload file from name parsing to archive.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::batch::BatchAssembler;
use crate::campaign::CampaignLookup;
use crate::config::PickerConfig;
use crate::error::{PickerError, PickerResult};
use crate::filename::SourceFileName;
use crate::io::LineReader;
use crate::schema::SchemaCache;
use crate::sink::RecordSink;

/// Outcome of one fully ingested and archived file.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub file_name: String,
    /// Batches handed to the sink.
    pub batches: u64,
    pub records: u64,
    pub elapsed: Duration,
}

/// Per-file ingestion settings, taken from [`PickerConfig`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub upload_path: PathBuf,
    pub archive_path: PathBuf,
    pub batch_size: usize,
    pub skip_count: usize,
    pub charset: &'static encoding_rs::Encoding,
}

impl PipelineSettings {
    pub fn from_config(config: &PickerConfig) -> PickerResult<Self> {
        Ok(Self {
            upload_path: config.upload_path.clone(),
            archive_path: config.archive_path.clone(),
            batch_size: config.batch_size,
            skip_count: config.skip_count,
            charset: config.encoding()?,
        })
    }
}

/// Reads, maps and stores one file batch by batch, then archives it.
///
/// Records of a batch are written before the next batch is read, so a failure
/// leaves every earlier batch stored and the file in the upload directory.
/// The next cycle re-reads it from the first line: delivery is at-least-once.
#[derive(Clone)]
pub struct FilePipeline {
    settings: Arc<PipelineSettings>,
    sink: Arc<dyn RecordSink>,
    campaigns: Arc<dyn CampaignLookup>,
}

impl FilePipeline {
    pub fn new(
        settings: PipelineSettings,
        sink: Arc<dyn RecordSink>,
        campaigns: Arc<dyn CampaignLookup>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            sink,
            campaigns,
        }
    }

    /// Ingest `file_name` from the upload directory and archive it.
    pub async fn process_file(&self, file_name: &str, schemas: &SchemaCache) -> PickerResult<FileReport> {
        let started = Instant::now();
        let name = SourceFileName::parse(file_name)?;
        tracing::trace!(
            file = file_name,
            campaign = %name.campaign_id,
            template = %name.template_id,
            "file name parsed"
        );

        let campaign = self
            .campaigns
            .campaign(&name.campaign_id)
            .await
            .map_err(PickerError::CampaignLookup)?
            .ok_or_else(|| PickerError::CampaignNotFound(name.campaign_id.clone()))?;
        let schema = schemas
            .get_or_load(&self.settings.upload_path, &name.campaign_id, &name.template_id)
            .await?;

        let path = self.settings.upload_path.join(file_name);
        let reader = LineReader::open(&path, self.settings.charset).await?;
        let mut assembler =
            BatchAssembler::new(reader, self.settings.batch_size, self.settings.skip_count);

        let mut report = FileReport {
            file_name: file_name.to_string(),
            batches: 0,
            records: 0,
            elapsed: Duration::ZERO,
        };

        while let Some(batch) = assembler.next_batch().await? {
            if !batch.is_empty() {
                let batch_started = Instant::now();
                let rows = assembler.parse_rows(&batch.text).await?;
                let records = BatchAssembler::assemble(&rows, &schema, &name, &campaign);
                if !records.is_empty() {
                    self.sink.insert(&records).await?;
                    report.batches += 1;
                    report.records += records.len() as u64;
                }
                tracing::debug!(
                    file = file_name,
                    batch = batch.number,
                    records = records.len(),
                    elapsed_ms = batch_started.elapsed().as_millis() as u64,
                    "batch stored"
                );
            }

            if batch.more {
                // Let other files and timers run between batches.
                tokio::task::yield_now().await;
            }
        }

        self.archive(file_name).await?;
        report.elapsed = started.elapsed();
        tracing::info!(
            file = file_name,
            batches = report.batches,
            records = report.records,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "file ingested"
        );
        Ok(report)
    }

    async fn archive(&self, file_name: &str) -> PickerResult<()> {
        let from = self.settings.upload_path.join(file_name);
        let to = self.settings.archive_path.join(file_name);
        if let Err(source) = tokio::fs::rename(&from, &to).await {
            return Err(PickerError::Archive { from, to, source });
        }
        tracing::debug!(file = file_name, "archived");
        Ok(())
    }

    pub fn upload_path(&self) -> &Path {
        &self.settings.upload_path
    }
}
