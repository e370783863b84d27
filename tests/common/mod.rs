//! Shared harness: a full server on an ephemeral port plus a test client

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tidekv::config::Config;
use tidekv::engine::InMemoryEngine;
use tidekv::server::{SessionHandler, TcpServer};
use tidekv::storage::Storage;
use tidekv::utils::{OsFileSystem, SystemClock};
use tidekv::wal::{self, Wal};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

pub struct Harness {
    pub addr: SocketAddr,
    pub storage: Arc<Storage>,
    pub shutdown: CancellationToken,
    _wal_dir: Option<TempDir>,
}

/// Start a server with a fresh WAL directory. `mutate` tweaks the
/// defaults; the periodic flush is effectively disabled so tests
/// control flush timing through batch sizes and explicit shutdown.
pub async fn start_server(mutate: impl FnOnce(&mut Config)) -> Harness {
    let wal_dir = TempDir::new().unwrap();
    let harness = start_server_in(wal_dir.path(), mutate).await;
    Harness {
        _wal_dir: Some(wal_dir),
        ..harness
    }
}

/// Start a server over an existing WAL directory (replay included).
pub async fn start_server_in(wal_dir: &Path, mutate: impl FnOnce(&mut Config)) -> Harness {
    let mut config = Config::default();
    config.wal.data_directory = wal_dir.to_path_buf();
    config.wal.flushing_batch_timeout = Duration::from_secs(600);
    mutate(&mut config);

    let engine = Arc::new(InMemoryEngine::new());
    wal::replay(&config.wal.data_directory, &engine).unwrap();

    let wal = Wal::new(&config.wal, Arc::new(OsFileSystem), Arc::new(SystemClock)).unwrap();
    let shutdown = CancellationToken::new();
    let storage = Arc::new(Storage::new(
        engine,
        wal,
        config.wal.flushing_batch_timeout,
        shutdown.clone(),
    ));
    storage.run();

    let handler = SessionHandler::new(Arc::clone(&storage), &config);
    let server = TcpServer::bind(
        &config.network.address,
        config.network.max_connections,
        handler,
        shutdown.clone(),
    )
    .await
    .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    Harness {
        addr,
        storage,
        shutdown,
        _wal_dir: None,
    }
}

pub struct Client {
    stream: BufReader<TcpStream>,
}

impl Client {
    /// Connect and complete the HELLO/HI handshake.
    pub async fn connect(addr: SocketAddr) -> Self {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"HELLO").await.unwrap();
        let mut reply = [0u8; 2];
        stream.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"HI", "handshake reply");
        Self {
            stream: BufReader::new(stream),
        }
    }

    /// Send one command line, return the reply without its newline.
    pub async fn request(&mut self, line: &str) -> String {
        self.stream.write_all(line.as_bytes()).await.unwrap();
        self.stream.write_all(b"\n").await.unwrap();
        self.read_reply().await
    }

    pub async fn read_reply(&mut self) -> String {
        let mut reply = String::new();
        self.stream.read_line(&mut reply).await.unwrap();
        reply.trim_end_matches('\n').to_string()
    }

    /// Half-close and drain whatever the server still sends.
    pub async fn close(mut self) -> Vec<u8> {
        self.stream.shutdown().await.unwrap();
        let mut rest = Vec::new();
        self.stream.read_to_end(&mut rest).await.unwrap();
        rest
    }

    /// Everything the server sends until it closes the connection.
    pub async fn drain(mut self) -> Vec<u8> {
        let mut rest = Vec::new();
        self.stream.read_to_end(&mut rest).await.unwrap();
        rest
    }
}

/// Segment files under a WAL directory, in name (= chronological) order.
pub fn segments(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.is_file())
        .collect();
    paths.sort();
    paths
}
