mod common;

use std::sync::Arc;

use campaign_ingest::{FilePipeline, PickMode, PickerError, SchemaCache};
use common::{dispatcher, Campaigns, Dirs, RecordingSink, BASIC_METADATA};

const FILE: &str = "20240101_camp1_tmpl1_recipients.csv";

async fn ingest(lines: usize, batch_size: usize, skip: usize) -> (Arc<RecordingSink>, Dirs) {
    let dirs = Dirs::new();
    dirs.write_metadata("camp1", "tmpl1", BASIC_METADATA);
    dirs.write_upload(FILE, lines);
    let sink = Arc::new(RecordingSink::default());
    let pipeline = FilePipeline::new(
        dirs.settings(batch_size, skip),
        sink.clone(),
        Campaigns::with(&["camp1"]),
    );
    pipeline.process_file(FILE, &SchemaCache::new()).await.unwrap();
    (sink, dirs)
}

#[tokio::test]
async fn exact_multiple_makes_full_batches_only() {
    let (sink, dirs) = ingest(3000, 1000, 0).await;
    assert_eq!(sink.sizes(), vec![1000, 1000, 1000]);
    assert!(dirs.archived(FILE));
}

#[tokio::test]
async fn remainder_goes_to_last_batch() {
    let (sink, _dirs) = ingest(2500, 1000, 0).await;
    assert_eq!(sink.sizes(), vec![1000, 1000, 500]);

    let (sink, _dirs) = ingest(7, 3, 0).await;
    assert_eq!(sink.sizes(), vec![3, 3, 1]);
    assert!(sink.sizes().iter().all(|&n| n <= 3));
}

#[tokio::test]
async fn skip_count_only_trims_first_batch() {
    let (sink, _dirs) = ingest(10, 4, 2).await;
    assert_eq!(sink.sizes(), vec![2, 4, 2]);

    let records = sink.all_records();
    assert_eq!(records[0].recipient.as_deref(), Some("555-00002"));
    assert_eq!(records[2].recipient.as_deref(), Some("555-00004"));
    assert_eq!(records.len(), 8);
}

#[tokio::test]
async fn rows_keep_file_order_and_campaign_window() {
    let (sink, _dirs) = ingest(5, 2, 0).await;
    let records = sink.all_records();
    let params: Vec<_> = records.iter().map(|r| r.parameters[0].clone()).collect();
    assert_eq!(params, vec!["P0", "P1", "P2", "P3", "P4"]);
    for r in &records {
        assert_eq!(r.campaign_id, "camp1");
        assert_eq!(r.template_id, "tmpl1");
        assert_eq!(r.media_id, None);
        assert_eq!(r.media, None);
        assert_eq!(r.active_end_minute, 30);
        assert_eq!(r.timezone, "Asia/Singapore");
    }
}

#[tokio::test]
async fn media_type_none_drops_media_columns() {
    let dirs = Dirs::new();
    dirs.write_metadata(
        "camp1",
        "tmpl1",
        r#"{"mediaType":"none","columns":["id","recipient","url","parameter"]}"#,
    );
    std::fs::write(dirs.upload.join(FILE), "0,555-0100,http://img,A\n").unwrap();
    let sink = Arc::new(RecordingSink::default());
    let pipeline = FilePipeline::new(dirs.settings(10, 0), sink.clone(), Campaigns::with(&["camp1"]));
    pipeline.process_file(FILE, &SchemaCache::new()).await.unwrap();

    let record = &sink.all_records()[0];
    assert_eq!(record.media, None);
    assert_eq!(record.parameters, vec!["A"]);
    let json = serde_json::to_value(record).unwrap();
    assert!(!json.to_string().contains("http://img"));
}

#[tokio::test]
async fn sink_failure_leaves_file_in_place() {
    let dirs = Dirs::new();
    dirs.write_metadata("camp1", "tmpl1", BASIC_METADATA);
    dirs.write_upload(FILE, 2500);
    let sink = Arc::new(RecordingSink::failing_on(2));
    let pipeline = FilePipeline::new(dirs.settings(1000, 0), sink.clone(), Campaigns::with(&["camp1"]));

    let err = pipeline.process_file(FILE, &SchemaCache::new()).await.unwrap_err();
    assert!(matches!(err, PickerError::SinkWrite(_)));
    assert_eq!(sink.calls(), 2);
    assert!(dirs.uploaded(FILE));
    assert!(!dirs.archived(FILE));
}

#[tokio::test]
async fn unknown_campaign_ingests_nothing() {
    let dirs = Dirs::new();
    dirs.write_metadata("camp1", "tmpl1", BASIC_METADATA);
    dirs.write_upload(FILE, 3);
    let sink = Arc::new(RecordingSink::default());
    let pipeline = FilePipeline::new(dirs.settings(10, 0), sink.clone(), Campaigns::with(&["other"]));

    let err = pipeline.process_file(FILE, &SchemaCache::new()).await.unwrap_err();
    assert!(matches!(err, PickerError::CampaignNotFound(id) if id == "camp1"));
    assert_eq!(sink.calls(), 0);
    assert!(dirs.uploaded(FILE));
}

#[tokio::test]
async fn missing_metadata_ingests_nothing() {
    let dirs = Dirs::new();
    dirs.write_upload(FILE, 3);
    let sink = Arc::new(RecordingSink::default());
    let pipeline = FilePipeline::new(dirs.settings(10, 0), sink.clone(), Campaigns::with(&["camp1"]));

    let err = pipeline.process_file(FILE, &SchemaCache::new()).await.unwrap_err();
    assert!(matches!(err, PickerError::MetadataNotFound { .. }));
    assert_eq!(sink.calls(), 0);
}

#[tokio::test]
async fn missing_archive_dir_is_archive_error_after_insert() {
    let dirs = Dirs::new();
    dirs.write_metadata("camp1", "tmpl1", BASIC_METADATA);
    dirs.write_upload(FILE, 3);
    std::fs::remove_dir(&dirs.archive).unwrap();
    let sink = Arc::new(RecordingSink::default());
    let pipeline = FilePipeline::new(dirs.settings(10, 0), sink.clone(), Campaigns::with(&["camp1"]));

    let err = pipeline.process_file(FILE, &SchemaCache::new()).await.unwrap_err();
    assert!(matches!(err, PickerError::Archive { .. }));
    // records are already stored: a retry will insert them again
    assert_eq!(sink.calls(), 1);
    assert!(dirs.uploaded(FILE));
}

#[tokio::test]
async fn windows_1252_upload_is_decoded() {
    let dirs = Dirs::new();
    dirs.write_metadata("camp1", "tmpl1", BASIC_METADATA);
    std::fs::write(dirs.upload.join(FILE), b"0,555-0100,Caf\xe9\n").unwrap();
    let mut settings = dirs.settings(10, 0);
    settings.charset = encoding_rs::WINDOWS_1252;
    let sink = Arc::new(RecordingSink::default());
    let pipeline = FilePipeline::new(settings, sink.clone(), Campaigns::with(&["camp1"]));
    pipeline.process_file(FILE, &SchemaCache::new()).await.unwrap();

    assert_eq!(sink.all_records()[0].parameters, vec!["Café"]);
}

#[tokio::test]
async fn single_mode_takes_first_csv_by_name() {
    let dirs = Dirs::new();
    dirs.write_metadata("camp1", "tmpl1", BASIC_METADATA);
    dirs.write_upload("20240102_camp1_tmpl1_b.csv", 2);
    dirs.write_upload("20240101_camp1_tmpl1_a.csv", 3);
    std::fs::write(dirs.upload.join("notes.txt"), "ignore me").unwrap();
    let sink = Arc::new(RecordingSink::default());
    let d = dispatcher(dirs.settings(10, 0), sink.clone(), Campaigns::with(&["camp1"]), PickMode::Single);

    let report = d.run_cycle().await.unwrap();
    assert_eq!(report.discovered, 2);
    assert_eq!(report.processed, 1);
    assert!(dirs.archived("20240101_camp1_tmpl1_a.csv"));
    assert!(dirs.uploaded("20240102_camp1_tmpl1_b.csv"));
    assert_eq!(sink.sizes(), vec![3]);

    let report = d.run_cycle().await.unwrap();
    assert_eq!(report.processed, 1);
    let report = d.run_cycle().await.unwrap();
    assert_eq!(report.discovered, 0);
    assert_eq!(report.processed, 0);
}

#[tokio::test]
async fn single_mode_passes_over_failing_file() {
    let dirs = Dirs::new();
    dirs.write_metadata("camp1", "tmpl1", BASIC_METADATA);
    dirs.write_upload("20240101_nocamp_tmpl1_bad.csv", 5);
    dirs.write_upload("20240102_camp1_tmpl1_good.csv", 5);
    let sink = Arc::new(RecordingSink::default());
    let d = dispatcher(dirs.settings(10, 0), sink.clone(), Campaigns::with(&["camp1"]), PickMode::Single);

    let report = d.run_cycle().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].file_name, "20240101_nocamp_tmpl1_bad.csv");
    assert!(dirs.archived("20240102_camp1_tmpl1_good.csv"));
    assert_eq!(sink.sizes(), vec![5]);

    // only the failing file is left: the cycle itself fails
    let err = d.run_cycle().await.unwrap_err();
    assert!(matches!(err, PickerError::CampaignNotFound(id) if id == "nocamp"));
    assert!(dirs.uploaded("20240101_nocamp_tmpl1_bad.csv"));
}

#[tokio::test]
async fn parallel_mode_processes_every_file() {
    let dirs = Dirs::new();
    dirs.write_metadata("camp1", "tmpl1", BASIC_METADATA);
    for i in 0..6 {
        dirs.write_upload(&format!("2024010{i}_camp1_tmpl1_f{i}.csv"), 25);
    }
    let sink = Arc::new(RecordingSink::default());
    let mode = PickMode::Parallel {
        max_concurrency: 2,
        isolate_failures: true,
    };
    let d = dispatcher(dirs.settings(10, 0), sink.clone(), Campaigns::with(&["camp1"]), mode);

    let report = d.run_cycle().await.unwrap();
    assert_eq!(report.processed, 6);
    assert_eq!(report.failed, 0);
    assert_eq!(sink.calls(), 18);
    assert_eq!(sink.all_records().len(), 150);
}

#[tokio::test]
async fn parallel_isolation_keeps_sibling_files_going() {
    let dirs = Dirs::new();
    dirs.write_metadata("camp1", "tmpl1", BASIC_METADATA);
    dirs.write_upload("20240101_camp1_tmpl1_good.csv", 5);
    dirs.write_upload("20240101_nocamp_tmpl1_bad.csv", 5);
    let sink = Arc::new(RecordingSink::default());
    let mode = PickMode::Parallel {
        max_concurrency: 4,
        isolate_failures: true,
    };
    let d = dispatcher(dirs.settings(10, 0), sink.clone(), Campaigns::with(&["camp1"]), mode);

    let report = d.run_cycle().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 1);
    assert!(dirs.archived("20240101_camp1_tmpl1_good.csv"));
    assert!(dirs.uploaded("20240101_nocamp_tmpl1_bad.csv"));
}

#[tokio::test]
async fn parallel_without_isolation_fails_the_cycle() {
    let dirs = Dirs::new();
    dirs.write_metadata("camp1", "tmpl1", BASIC_METADATA);
    dirs.write_upload("20240101_nocamp_tmpl1_bad.csv", 5);
    let sink = Arc::new(RecordingSink::default());
    let mode = PickMode::Parallel {
        max_concurrency: 4,
        isolate_failures: false,
    };
    let d = dispatcher(dirs.settings(10, 0), sink, Campaigns::with(&["camp1"]), mode);

    let err = d.run_cycle().await.unwrap_err();
    assert!(matches!(err, PickerError::CampaignNotFound(_)));
}

#[tokio::test]
async fn malformed_file_name_is_rejected() {
    let dirs = Dirs::new();
    dirs.write_upload("recipients.csv", 2);
    let sink = Arc::new(RecordingSink::default());
    let d = dispatcher(dirs.settings(10, 0), sink.clone(), Campaigns::with(&["camp1"]), PickMode::Single);

    let err = d.run_cycle().await.unwrap_err();
    assert!(matches!(err, PickerError::InvalidFileName(_)));
    assert_eq!(sink.calls(), 0);
}
