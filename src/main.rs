use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tidekv::config::{EngineType, LoggingConfig};
use tidekv::engine::InMemoryEngine;
use tidekv::server::{SessionHandler, TcpServer};
use tidekv::storage::Storage;
use tidekv::utils::{OsFileSystem, SystemClock};
use tidekv::wal::{self, Wal};
use tidekv::Config;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// tidekv server
#[derive(Parser)]
#[command(name = "tidekv", version, about = "Small TCP key/value store with a batched WAL")]
struct Cli {
    /// Path to the YAML configuration file; defaults apply when absent
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    init_tracing(&config.logging)?;
    info!(version = tidekv::VERSION, "starting tidekv");

    let engine = match config.engine.kind {
        EngineType::InMemory => Arc::new(InMemoryEngine::new()),
    };

    // Bring the engine up to date before anyone can connect.
    wal::replay(&config.wal.data_directory, &engine).context("wal replay failed")?;

    let wal = Wal::new(
        &config.wal,
        Arc::new(OsFileSystem),
        Arc::new(SystemClock),
    )?;

    let shutdown = CancellationToken::new();
    let storage = Arc::new(Storage::new(
        Arc::clone(&engine),
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
    .await?;

    let mut server_task = tokio::spawn(server.run());
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
            shutdown.cancel();
        }
        _ = &mut server_task => {}
    }

    storage.shutdown().await;
    info!("tidekv stopped");
    Ok(())
}

fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    let level = match config.level.as_str() {
        "debug" => LevelFilter::DEBUG,
        "warn" | "warning" => LevelFilter::WARN,
        // tracing has no panic/fatal levels; error is the closest
        "error" | "panic" | "fatal" => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    if config.output == "stderr" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.output)
            .with_context(|| format!("failed to open log file {}", config.output))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(Arc::new(file))
            .init();
    }
    Ok(())
}
