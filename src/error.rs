use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while picking and ingesting one upload file.
///
/// Every variant aborts the remaining batches of the file it occurred in.
#[derive(Debug, Error)]
pub enum PickerError {
    #[error("cannot open {path}: {source}")]
    ReaderOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("metadata file not found: {path}")]
    MetadataNotFound { path: PathBuf },
    #[error("malformed metadata in {path}: {source}")]
    MetadataParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("campaign lookup failed: {0}")]
    CampaignLookup(#[source] SinkError),
    #[error("campaign not found: {0}")]
    CampaignNotFound(String),
    #[error("file name does not match <timestamp>_<campaign>_<template>_<name>.csv: {0}")]
    InvalidFileName(String),
    #[error("cannot parse row near line {line}: {source}")]
    RowParse {
        line: u64,
        #[source]
        source: csv_async::Error,
    },
    #[error("sink write failed: {0}")]
    SinkWrite(#[from] SinkError),
    #[error("cannot archive {from} to {to}: {source}")]
    Archive {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type PickerResult<T> = std::result::Result<T, PickerError>;

/// Errors returned by insertion sinks and campaign lookups.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Csv(#[from] csv_async::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}
