use crate::codec::CharsetLineCodec;
use crate::error::{PickerError, PickerResult};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncRead, BufReader};
use tokio_util::codec::FramedRead;

/// Forward-only line source over one upload file.
///
/// Holds at most one decoded line plus the read buffer, whatever the file size.
/// Once [`LineReader::next_line`] returns `None` it keeps returning `None`.
pub struct LineReader {
    path: PathBuf,
    lines: FramedRead<Box<dyn AsyncRead + Unpin + Send>, CharsetLineCodec>,
    lines_read: u64,
    exhausted: bool,
}

impl LineReader {
    pub async fn open(path: &Path, charset: &'static encoding_rs::Encoding) -> PickerResult<Self> {
        let file = File::open(path)
            .await
            .map_err(|source| PickerError::ReaderOpen {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::from_reader(path, file, charset))
    }

    /// Wrap any async byte source, e.g. an in-memory buffer in tests.
    pub fn from_reader<R>(path: &Path, raw: R, charset: &'static encoding_rs::Encoding) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        // 64 KiB keeps syscalls low without holding much of a large file
        let buffered: Box<dyn AsyncRead + Unpin + Send> =
            Box::new(BufReader::with_capacity(1 << 16, raw));
        Self {
            path: path.to_path_buf(),
            lines: FramedRead::new(buffered, CharsetLineCodec::new(charset)),
            lines_read: 0,
            exhausted: false,
        }
    }

    /// The next line without its terminator, or `None` at end of file.
    pub async fn next_line(&mut self) -> PickerResult<Option<String>> {
        if self.exhausted {
            return Ok(None);
        }
        match self.lines.next().await {
            Some(Ok(line)) => {
                self.lines_read += 1;
                Ok(Some(line))
            }
            Some(Err(e)) => {
                self.exhausted = true;
                Err(PickerError::Io(e))
            }
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
