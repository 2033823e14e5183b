use std::time::Instant;

use csv_async::{AsyncReaderBuilder, StringRecord};

use crate::campaign::Campaign;
use crate::error::{PickerError, PickerResult};
use crate::filename::SourceFileName;
use crate::io::LineReader;
use crate::record::{map_row, CanonicalRecord};
use crate::schema::FileSchema;

/// Raw text of one batch, ready for parsing.
#[derive(Debug, Default)]
pub struct RawBatch {
    /// Sequence number within the file, starting at 1.
    pub number: u64,
    /// Lines pulled from the reader, skipped lines included.
    pub lines_pulled: usize,
    /// Newline-joined lines that were not skipped.
    pub text: String,
    /// `false` once the reader hit end of file while filling this batch.
    pub more: bool,
}

impl RawBatch {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Diagnostics for the batch currently being assembled. Never persisted.
#[derive(Debug, Clone, Copy)]
pub struct CycleTracker {
    pub batch_number: u64,
    pub started: Instant,
}

impl CycleTracker {
    fn first() -> Self {
        Self {
            batch_number: 1,
            started: Instant::now(),
        }
    }

    fn next(self) -> Self {
        Self {
            batch_number: self.batch_number + 1,
            started: Instant::now(),
        }
    }
}

/// Cuts a file's line stream into bounded batches.
///
/// `skip_count` only applies to the first batch; it is reset to zero at the
/// first batch boundary.
pub struct BatchAssembler {
    reader: LineReader,
    batch_size: usize,
    skip_count: usize,
    tracker: CycleTracker,
    /// File lines preceding the text of the latest batch, skipped lines included.
    text_start: u64,
    done: bool,
}

impl BatchAssembler {
    pub fn new(reader: LineReader, batch_size: usize, skip_count: usize) -> Self {
        Self {
            reader,
            batch_size: batch_size.max(1),
            skip_count,
            tracker: CycleTracker::first(),
            text_start: 0,
            done: false,
        }
    }

    /// Pull up to `batch_size` lines. Returns `None` once a previous batch
    /// reached end of file.
    pub async fn next_batch(&mut self) -> PickerResult<Option<RawBatch>> {
        if self.done {
            return Ok(None);
        }

        let mut batch = RawBatch {
            number: self.tracker.batch_number,
            more: true,
            ..Default::default()
        };
        let start = self.reader.lines_read();

        while batch.lines_pulled < self.batch_size {
            let Some(line) = self.reader.next_line().await? else {
                batch.more = false;
                break;
            };
            if batch.lines_pulled >= self.skip_count {
                batch.text.push_str(&line);
                batch.text.push('\n');
            }
            batch.lines_pulled += 1;
        }

        tracing::debug!(
            file = %self.reader.path().display(),
            batch = batch.number,
            lines = batch.lines_pulled,
            elapsed_ms = self.tracker.started.elapsed().as_millis() as u64,
            "batch read"
        );

        self.text_start = start + batch.lines_pulled.min(self.skip_count) as u64;
        self.done = !batch.more;
        self.skip_count = 0;
        self.tracker = self.tracker.next();
        Ok(Some(batch))
    }

    /// Parse batch text as header-less CSV rows of any width.
    pub async fn parse_rows(&self, text: &str) -> PickerResult<Vec<StringRecord>> {
        let mut rdr = AsyncReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .create_reader(text.as_bytes());

        let mut rows = Vec::new();
        let mut record = StringRecord::new();
        loop {
            let more = rdr.read_record(&mut record).await.map_err(|source| {
                let offset = source.position().map(|p| p.line()).unwrap_or(0);
                PickerError::RowParse {
                    line: self.file_line(offset),
                    source,
                }
            })?;
            if !more {
                break;
            }
            rows.push(record.clone());
        }
        Ok(rows)
    }

    /// File line number of line `offset` (1-based) in the latest batch text.
    fn file_line(&self, offset: u64) -> u64 {
        self.text_start + offset
    }

    /// Map parsed rows and merge in the campaign window.
    pub fn assemble(
        rows: &[StringRecord],
        schema: &FileSchema,
        name: &SourceFileName,
        campaign: &Campaign,
    ) -> Vec<CanonicalRecord> {
        rows.iter()
            .map(|row| {
                CanonicalRecord::new(
                    map_row(row.iter(), schema),
                    &name.campaign_id,
                    &name.template_id,
                    campaign,
                )
            })
            .collect()
    }
}
