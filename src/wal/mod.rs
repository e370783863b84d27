//! Write-ahead log: batched writer and startup replay

pub mod reader;
pub mod writer;

pub use reader::{replay, ReplayStats};
pub use writer::{Wal, WalError};
