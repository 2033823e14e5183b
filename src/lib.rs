//! Campaign upload picker: streams recipient CSV files into scheduling records.
//!
//! - Upload files are named `<timestamp>_<campaign>_<template>_<name>.csv` and
//!   described by a `<campaign>_<template>.metadata` JSON sidecar.
//! - Each file is read line by line and cut into batches of `batchSize` lines;
//!   a batch is parsed, mapped and stored before the next one is read.
//! - Fully stored files are moved to the archive directory.
//!
//! Data shape:
//! - Sidecar: `{ "mediaType"?: string, "columns": [role, ...] }`, column 0 unused
//! - Output: [`CanonicalRecord`], handed to a [`RecordSink`] one batch at a time
mod batch;
mod campaign;
mod codec;
mod config;
mod dispatch;
mod error;
mod filename;
mod io;
mod pipeline;
mod record;
mod scheduler;
mod schema;
mod sink;
mod store;

pub use crate::batch::{BatchAssembler, CycleTracker, RawBatch};
pub use crate::campaign::{Campaign, CampaignLookup};
pub use crate::config::{InsertMode, PickerConfig};
pub use crate::dispatch::{CycleReport, Dispatcher, FileFailure, PickMode};
pub use crate::error::{PickerError, PickerResult, SinkError};
pub use crate::filename::{is_csv, SourceFileName};
pub use crate::io::LineReader;
pub use crate::pipeline::{FilePipeline, FileReport, PipelineSettings};
pub use crate::record::{map_row, CanonicalRecord, Media, RowFragment};
pub use crate::scheduler::{Scheduler, SchedulerStats};
pub use crate::schema::{FileMetadata, FileSchema, Role, SchemaCache, NO_MEDIA};
pub use crate::sink::{CsvExportSink, RecordSink, EXPORT_HEADER};
pub use crate::store::SqliteStore;

use std::sync::Arc;

/// Wire a scheduler from config: the store serves campaign lookups, and
/// records go to the store or to CSV exports depending on `insertMode`.
pub fn build_scheduler(config: &PickerConfig, store: SqliteStore) -> PickerResult<Scheduler> {
    config.validate()?;
    let sink: Arc<dyn RecordSink> = match config.insert_mode {
        InsertMode::Database => Arc::new(store.clone()),
        InsertMode::Csv => Arc::new(CsvExportSink::new(config.export_path.clone())),
    };
    let pipeline = FilePipeline::new(PipelineSettings::from_config(config)?, sink, Arc::new(store));
    let dispatcher = Dispatcher::new(pipeline, PickMode::from_config(config));
    Ok(Scheduler::new(dispatcher, config.delay(), config.halt_on_error))
}
