//! Batched WAL writer with size-triggered segment rotation

use crate::config::WalConfig;
use crate::utils::{Clock, FileSystem, SegmentFile};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Segment file names carry the open instant at millisecond precision,
/// so lexicographic order is chronological order.
const SEGMENT_NAME_FORMAT: &str = "%Y%m%d-%H%M%S-%3f";

/// WAL failures. Each variant names the failing segment operation; the
/// display text is what the client sees when a mutation cannot be
/// logged.
#[derive(Debug, thiserror::Error)]
pub enum WalError {
    #[error("failed to create wal directory {}: {source}", path.display())]
    CreateDirectory { path: PathBuf, source: io::Error },
    #[error("failed to open wal segment file {}: {source}", path.display())]
    OpenSegment { path: PathBuf, source: io::Error },
    #[error("failed to write to wal segment file {}: {source}", path.display())]
    WriteSegment { path: PathBuf, source: io::Error },
    #[error("short write to wal segment file {}: {written} of {expected} bytes", path.display())]
    ShortWrite {
        path: PathBuf,
        written: usize,
        expected: usize,
    },
    #[error("failed to sync wal segment file {}: {source}", path.display())]
    SyncSegment { path: PathBuf, source: io::Error },
    #[error("failed to close wal segment file {}: {source}", path.display())]
    CloseSegment { path: PathBuf, source: io::Error },
}

struct OpenSegment {
    file: Box<dyn SegmentFile>,
    path: PathBuf,
}

/// Append-only batched log.
///
/// Records accumulate in an in-memory buffer, one `\n` per record gap.
/// The buffer reaches disk when the batch hits the configured record
/// count or when the owner drives a periodic flush. A flush that grows
/// the segment past the size limit closes it; the next flush opens a
/// freshly timestamped one.
///
/// The WAL is not internally synchronized. The storage coordinator
/// serializes all access.
pub struct Wal {
    buf: Vec<u8>,
    batch_count: usize,
    segment: Option<OpenSegment>,
    segment_bytes: u64,
    flushing_batch_size: usize,
    max_segment_size: u64,
    data_directory: PathBuf,
    fs: Arc<dyn FileSystem>,
    clock: Arc<dyn Clock>,
}

impl Wal {
    /// Create a WAL over the given directory, creating it if missing.
    pub fn new(
        config: &WalConfig,
        fs: Arc<dyn FileSystem>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, WalError> {
        fs.create_dir_all(&config.data_directory)
            .map_err(|source| WalError::CreateDirectory {
                path: config.data_directory.clone(),
                source,
            })?;

        Ok(Self {
            buf: Vec::with_capacity(4096),
            batch_count: 0,
            segment: None,
            segment_bytes: 0,
            flushing_batch_size: config.flushing_batch_size,
            max_segment_size: config.max_segment_size,
            data_directory: config.data_directory.clone(),
            fs,
            clock,
        })
    }

    /// Append one record to the batch. Reaching the batch size limit
    /// flushes synchronously and returns the flush's result.
    pub fn write(&mut self, record: &str) -> Result<(), WalError> {
        if !self.buf.is_empty() {
            self.buf.push(b'\n');
        }
        self.buf.extend_from_slice(record.as_bytes());
        self.batch_count += 1;

        if self.batch_count >= self.flushing_batch_size {
            return self.flush();
        }

        Ok(())
    }

    /// Force the buffered batch to durable storage. A no-op when the
    /// batch is empty.
    pub fn flush(&mut self) -> Result<(), WalError> {
        if self.batch_count == 0 {
            return Ok(());
        }

        if self.segment.is_none() {
            self.open_segment()?;
        }
        let segment = self.segment.as_mut().expect("segment just opened");

        // Keep one separator per record gap within the file as well:
        // a batch appended to a non-empty segment needs a leading
        // newline. Records never start with '\n', so the guard keeps a
        // failed flush from stacking separators on retry.
        if self.segment_bytes > 0 && !self.buf.starts_with(b"\n") {
            self.buf.insert(0, b'\n');
        }

        let written = segment
            .file
            .write(&self.buf)
            .map_err(|source| WalError::WriteSegment {
                path: segment.path.clone(),
                source,
            })?;
        if written < self.buf.len() {
            return Err(WalError::ShortWrite {
                path: segment.path.clone(),
                written,
                expected: self.buf.len(),
            });
        }

        segment
            .file
            .sync()
            .map_err(|source| WalError::SyncSegment {
                path: segment.path.clone(),
                source,
            })?;

        self.buf.clear();
        self.batch_count = 0;
        self.segment_bytes += written as u64;

        if self.segment_bytes >= self.max_segment_size {
            let segment = self.segment.take().expect("segment is open");
            debug!(segment = %segment.path.display(), bytes = self.segment_bytes, "rotating wal segment");
            segment
                .file
                .close()
                .map_err(|source| WalError::CloseSegment {
                    path: segment.path,
                    source,
                })?;
            self.segment_bytes = 0;
        }

        Ok(())
    }

    fn open_segment(&mut self) -> Result<(), WalError> {
        let name = self.clock.now().format(SEGMENT_NAME_FORMAT).to_string();
        let path = self.data_directory.join(name);

        let file = self
            .fs
            .open_segment(&path)
            .map_err(|source| WalError::OpenSegment {
                path: path.clone(),
                source,
            })?;

        info!(segment = %path.display(), "opened wal segment");
        self.segment = Some(OpenSegment { file, path });
        self.segment_bytes = 0;
        Ok(())
    }
}
