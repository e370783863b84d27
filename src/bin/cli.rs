//! Interactive tidekv client
//!
//! A thin line-oriented REPL over the server's transport: one command
//! in, one reply line out.

use anyhow::Context;
use clap::Parser;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// tidekv client
#[derive(Parser)]
#[command(name = "tidekv-cli", version, about = "Interactive tidekv client")]
struct Cli {
    /// Server address, host:port
    #[arg(long, default_value = "127.0.0.1:3223")]
    address: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut stream = TcpStream::connect(&cli.address)
        .await
        .with_context(|| format!("failed to connect to {}", cli.address))?;

    // Handshake runs under a one-second deadline in both directions.
    timeout(HANDSHAKE_TIMEOUT, stream.write_all(b"HELLO"))
        .await
        .context("handshake send timed out")??;
    let mut reply = [0u8; 2];
    timeout(HANDSHAKE_TIMEOUT, stream.read_exact(&mut reply))
        .await
        .context("handshake reply timed out")??;
    anyhow::ensure!(&reply == b"HI", "unexpected handshake reply");

    println!("Connected to {}", cli.address);
    println!("Supported commands: SET/GET/DEL");
    println!("  SET key value");
    println!("  GET key");
    println!("  DEL key");

    let (read_half, mut write_half) = stream.into_split();
    let mut replies = BufReader::new(read_half);
    let mut queries = BufReader::new(tokio::io::stdin()).lines();

    let mut reply_line = String::new();
    while let Some(query) = queries.next_line().await? {
        if query.trim().is_empty() {
            continue;
        }

        write_half.write_all(query.as_bytes()).await?;
        write_half.write_all(b"\n").await?;

        reply_line.clear();
        let n = replies.read_line(&mut reply_line).await?;
        if n == 0 {
            println!("server closed the connection");
            break;
        }
        print!("{reply_line}");
        if reply_line == "BYE" {
            break;
        }
    }

    Ok(())
}
