//! Injectable filesystem for WAL segments

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// An open WAL segment.
///
/// `write` reports how many bytes it accepted so callers can detect
/// short writes; `close` consumes the handle.
pub trait SegmentFile: Send + Sync {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    fn sync(&mut self) -> io::Result<()>;
    fn close(self: Box<Self>) -> io::Result<()>;
}

/// Filesystem operations the WAL needs.
pub trait FileSystem: Send + Sync {
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Open a segment for appending, creating it if missing. Existing
    /// contents are never truncated.
    fn open_segment(&self, path: &Path) -> io::Result<Box<dyn SegmentFile>>;
}

/// Filesystem backed by the real OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn open_segment(&self, path: &Path) -> io::Result<Box<dyn SegmentFile>> {
        let mut options = OpenOptions::new();
        options.append(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o644);
        }
        let file = options.open(path)?;
        Ok(Box::new(OsSegmentFile { file }))
    }
}

struct OsSegmentFile {
    file: File,
}

impl SegmentFile for OsSegmentFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        // std reports close errors nowhere; dropping the handle is all
        // the OS backing can do.
        Ok(())
    }
}
