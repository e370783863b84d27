//! tidekv - a small TCP key/value store with a batched write-ahead log
//!
//! Clients speak a line-delimited text protocol (SET/GET/DEL) over TCP
//! after a short HELLO/HI handshake. Mutations are appended to a batched
//! WAL before they touch the in-memory engine, so acknowledged writes
//! survive a crash up to the configured batch window.

pub mod config;
pub mod engine;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod utils;
pub mod wal;

pub use config::Config;

/// tidekv version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
