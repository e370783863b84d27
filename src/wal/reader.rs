//! WAL replay for startup recovery

use crate::engine::InMemoryEngine;
use crate::protocol::{self, Command};
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};

/// Counters from one replay pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub segments: usize,
    pub records_applied: usize,
    pub records_skipped: usize,
}

/// Replay every segment under `data_directory` into the engine, oldest
/// first. Runs before the server accepts connections.
///
/// Records that fail to parse (a torn tail write, for instance) are
/// skipped with a warning; an unreadable segment aborts startup, since
/// silently dropping a whole segment would lose acknowledged writes.
pub fn replay(data_directory: &Path, engine: &InMemoryEngine) -> io::Result<ReplayStats> {
    let mut stats = ReplayStats::default();

    if !data_directory.exists() {
        info!(dir = %data_directory.display(), "wal directory missing, nothing to replay");
        return Ok(stats);
    }

    // Segment names are open-time timestamps, so name order is
    // chronological order.
    let mut segments = Vec::new();
    for entry in std::fs::read_dir(data_directory)? {
        let path = entry?.path();
        if path.is_file() {
            segments.push(path);
        }
    }
    segments.sort();

    for segment in &segments {
        let contents = std::fs::read_to_string(segment)?;
        stats.segments += 1;
        debug!(segment = %segment.display(), bytes = contents.len(), "replaying wal segment");

        for record in contents.split('\n').filter(|r| !r.is_empty()) {
            match protocol::parse(record) {
                Ok(Command::Set { key, value }) => {
                    engine.set(&key, &value);
                    stats.records_applied += 1;
                }
                Ok(Command::Del { key }) => {
                    engine.del(&key);
                    stats.records_applied += 1;
                }
                Ok(Command::Get { .. }) => {
                    warn!(segment = %segment.display(), record, "read command in wal, skipping");
                    stats.records_skipped += 1;
                }
                Err(err) => {
                    warn!(segment = %segment.display(), record, %err, "malformed wal record, skipping");
                    stats.records_skipped += 1;
                }
            }
        }
    }

    info!(
        segments = stats.segments,
        applied = stats.records_applied,
        skipped = stats.records_skipped,
        "wal replay complete"
    );
    Ok(stats)
}
