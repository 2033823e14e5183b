#![allow(dead_code)]

use async_trait::async_trait;
use campaign_ingest::{
    Campaign, CampaignLookup, CanonicalRecord, Dispatcher, FilePipeline, PickMode,
    PipelineSettings, RecordSink, SinkError,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub fn campaign(id: &str) -> Campaign {
    Campaign {
        id: id.into(),
        active_start_hour: 9,
        active_start_minute: 0,
        active_end_hour: 21,
        active_end_minute: 30,
        active_on_weekends: false,
        timezone: "Asia/Singapore".into(),
    }
}

#[derive(Default)]
pub struct Campaigns(pub HashMap<String, Campaign>);

impl Campaigns {
    pub fn with(ids: &[&str]) -> Arc<Self> {
        Arc::new(Self(ids.iter().map(|id| (id.to_string(), campaign(id))).collect()))
    }
}

#[async_trait]
impl CampaignLookup for Campaigns {
    async fn campaign(&self, id: &str) -> Result<Option<Campaign>, SinkError> {
        Ok(self.0.get(id).cloned())
    }
}

/// Records every batch; can fail on the n-th call (1-based) or cancel a token
/// once a number of calls has been made.
#[derive(Default)]
pub struct RecordingSink {
    pub batches: Mutex<Vec<Vec<CanonicalRecord>>>,
    pub fail_on_call: Option<usize>,
    pub cancel_after: Option<(usize, CancellationToken)>,
}

impl RecordingSink {
    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().iter().map(Vec::len).collect()
    }

    pub fn all_records(&self) -> Vec<CanonicalRecord> {
        self.batches.lock().unwrap().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl RecordSink for RecordingSink {
    async fn insert(&self, records: &[CanonicalRecord]) -> Result<(), SinkError> {
        let calls = {
            let mut batches = self.batches.lock().unwrap();
            batches.push(records.to_vec());
            batches.len()
        };
        if self.fail_on_call == Some(calls) {
            return Err(SinkError::Other(format!("injected failure on call {calls}")));
        }
        if let Some((after, token)) = &self.cancel_after {
            if calls >= *after {
                token.cancel();
            }
        }
        Ok(())
    }
}

/// Upload and archive directories inside one temp dir.
pub struct Dirs {
    pub root: tempfile::TempDir,
    pub upload: PathBuf,
    pub archive: PathBuf,
}

impl Dirs {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let upload = root.path().join("upload");
        let archive = root.path().join("archive");
        std::fs::create_dir_all(&upload).unwrap();
        std::fs::create_dir_all(&archive).unwrap();
        Self { root, upload, archive }
    }

    pub fn settings(&self, batch_size: usize, skip_count: usize) -> PipelineSettings {
        PipelineSettings {
            upload_path: self.upload.clone(),
            archive_path: self.archive.clone(),
            batch_size,
            skip_count,
            charset: encoding_rs::UTF_8,
        }
    }

    pub fn write_metadata(&self, campaign: &str, template: &str, json: &str) {
        std::fs::write(self.upload.join(format!("{campaign}_{template}.metadata")), json).unwrap();
    }

    /// `lines` rows of `<i>,555-<i>,P<i>`.
    pub fn write_upload(&self, name: &str, lines: usize) -> PathBuf {
        let mut content = String::new();
        for i in 0..lines {
            content.push_str(&format!("{i},555-{i:05},P{i}\n"));
        }
        let path = self.upload.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn uploaded(&self, name: &str) -> bool {
        self.upload.join(name).exists()
    }

    pub fn archived(&self, name: &str) -> bool {
        self.archive.join(name).exists()
    }
}

pub const BASIC_METADATA: &str = r#"{"columns":["id","recipient","parameter"]}"#;

pub fn dispatcher(
    settings: PipelineSettings,
    sink: Arc<dyn RecordSink>,
    campaigns: Arc<dyn CampaignLookup>,
    mode: PickMode,
) -> Dispatcher {
    Dispatcher::new(FilePipeline::new(settings, sink, campaigns), mode)
}

