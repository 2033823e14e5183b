//! One scan of the upload directory per cycle.

use futures::stream::{self, StreamExt};

use crate::config::PickerConfig;
use crate::error::{PickerError, PickerResult};
use crate::filename::is_csv;
use crate::pipeline::{FilePipeline, FileReport};
use crate::schema::SchemaCache;

/// How many files a cycle picks and how failures spread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickMode {
    /// The first file, in name order, that ingests cleanly. Files that fail
    /// are passed over for the rest of the cycle.
    Single,
    /// Every file, at most `max_concurrency` at a time.
    Parallel {
        max_concurrency: usize,
        /// When `false`, the first failing file ends the cycle with its error.
        isolate_failures: bool,
    },
}

impl PickMode {
    pub fn from_config(config: &PickerConfig) -> Self {
        if config.parallel_pick {
            PickMode::Parallel {
                max_concurrency: config.max_concurrency.max(1),
                isolate_failures: config.isolate_failures,
            }
        } else {
            PickMode::Single
        }
    }
}

/// A file that stays in the upload directory after a failed attempt.
#[derive(Debug)]
pub struct FileFailure {
    pub file_name: String,
    pub error: PickerError,
}

#[derive(Debug, Default)]
pub struct CycleReport {
    /// Candidate files seen in the upload directory.
    pub discovered: usize,
    /// Files ingested and archived.
    pub processed: usize,
    /// Files that failed and stay in the upload directory.
    pub failed: usize,
    pub files: Vec<FileReport>,
    pub failures: Vec<FileFailure>,
}

impl CycleReport {
    fn fail(&mut self, file_name: &str, error: PickerError) {
        tracing::warn!(file = file_name, error = %error, "file failed, left in upload directory");
        self.failures.push(FileFailure {
            file_name: file_name.to_string(),
            error,
        });
    }

    /// The first failure's error, if any file failed.
    pub fn into_first_error(self) -> Option<PickerError> {
        self.failures.into_iter().next().map(|f| f.error)
    }
}

pub struct Dispatcher {
    pipeline: FilePipeline,
    mode: PickMode,
    schemas: SchemaCache,
}

impl Dispatcher {
    pub fn new(pipeline: FilePipeline, mode: PickMode) -> Self {
        Self {
            pipeline,
            mode,
            schemas: SchemaCache::new(),
        }
    }

    /// Upload files ending in `.csv`, in name order.
    pub async fn candidates(&self) -> PickerResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(self.pipeline.upload_path()).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str().filter(|n| is_csv(n)) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Run one cycle.
    ///
    /// Single mode moves past failing files to the next candidate; the cycle
    /// is an error only when every attempted file failed. In parallel mode
    /// without isolation the first failing file is the cycle's error.
    /// Otherwise failures are listed in the report.
    pub async fn run_cycle(&self) -> PickerResult<CycleReport> {
        self.schemas.clear();
        let files = self.candidates().await?;
        let mut report = CycleReport {
            discovered: files.len(),
            ..Default::default()
        };

        match self.mode {
            PickMode::Single => {
                for file in &files {
                    match self.pipeline.process_file(file, &self.schemas).await {
                        Ok(file_report) => {
                            report.files.push(file_report);
                            break;
                        }
                        Err(e) => report.fail(file, e),
                    }
                }
                if report.files.is_empty() && !report.failures.is_empty() {
                    return Err(report.failures.remove(0).error);
                }
            }
            PickMode::Parallel {
                max_concurrency,
                isolate_failures,
            } => {
                let mut results = stream::iter(files.iter())
                    .map(|file| async move {
                        (file, self.pipeline.process_file(file, &self.schemas).await)
                    })
                    .buffer_unordered(max_concurrency);

                while let Some((file, result)) = results.next().await {
                    match result {
                        Ok(file_report) => report.files.push(file_report),
                        Err(e) if isolate_failures => report.fail(file, e),
                        // Dropping `results` abandons the files still in flight.
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        report.processed = report.files.len();
        report.failed = report.failures.len();
        tracing::info!(
            discovered = report.discovered,
            failed = report.failed,
            "{} files processed",
            report.processed
        );
        Ok(report)
    }
}
