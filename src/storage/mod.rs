//! Storage coordinator
//!
//! Sequences command execution against the WAL and the engine. Reads
//! take the shared side of the coordinator lock; mutations take the
//! exclusive side, append to the WAL, and only then touch the engine,
//! so the WAL byte stream and the engine agree on mutation order.

use crate::engine::InMemoryEngine;
use crate::protocol::Command;
use crate::wal::{Wal, WalError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Outcome of one executed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecResult {
    /// Mutation appended to the WAL and applied to the engine.
    Ok,
    /// Key present; carries its value.
    Value(String),
    /// Key absent.
    NotFound,
}

/// Execution failures. The display text is the reply the client sees.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error(transparent)]
    Wal(#[from] WalError),
}

/// Coordinates the engine and the WAL under one lock family.
pub struct Storage {
    engine: Arc<InMemoryEngine>,
    wal: Arc<RwLock<Wal>>,
    flush_interval: Duration,
    shutdown: CancellationToken,
}

impl Storage {
    pub fn new(
        engine: Arc<InMemoryEngine>,
        wal: Wal,
        flush_interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            engine,
            wal: Arc::new(RwLock::new(wal)),
            flush_interval,
            shutdown,
        }
    }

    /// Spawn the periodic flusher. It drives a locked WAL flush every
    /// `flush_interval` until the shutdown token fires, and exits
    /// without a flush of its own; [`Storage::shutdown`] owns the
    /// final one.
    pub fn run(&self) {
        let wal = Arc::clone(&self.wal);
        let token = self.shutdown.clone();
        let interval = self.flush_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("wal flusher stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(err) = wal.write().await.flush() {
                            error!(%err, "periodic wal flush failed");
                        }
                    }
                }
            }
        });
    }

    /// Execute one command.
    pub async fn exec(&self, cmd: Command) -> Result<ExecResult, StorageError> {
        match cmd {
            Command::Get { key } => {
                let _shared = self.wal.read().await;
                Ok(match self.engine.get(&key) {
                    Some(value) => ExecResult::Value(value),
                    None => ExecResult::NotFound,
                })
            }
            mutation => {
                let record = mutation.render();
                let mut wal = self.wal.write().await;
                wal.write(&record)?;
                match mutation {
                    Command::Set { key, value } => self.engine.set(&key, &value),
                    Command::Del { key } => self.engine.del(&key),
                    Command::Get { .. } => {} // handled above
                }
                Ok(ExecResult::Ok)
            }
        }
    }

    /// Cancel the flusher and flush whatever batch is still buffered.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        if let Err(err) = self.wal.write().await.flush() {
            error!(%err, "final wal flush failed");
        }
    }
}
