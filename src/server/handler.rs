//! Per-connection session handler
//!
//! A session runs handshake -> command loop -> termination. Replies are
//! one line per request; parse and storage errors become the reply body
//! and keep the session open, while overflow, timeouts and I/O errors
//! end it.

use crate::config::Config;
use crate::protocol::Interpreter;
use crate::storage::{ExecResult, Storage};
use bytes::BytesMut;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Greeting the client must send, verbatim.
pub const HANDSHAKE_REQUEST: &[u8] = b"HELLO";
/// Reply the server answers the greeting with.
pub const HANDSHAKE_REPLY: &[u8] = b"HI";
/// Parting bytes on server-initiated close. No trailing newline.
pub const GOODBYE: &[u8] = b"BYE";

/// Session failures. `MessageTooLong`'s display text is the reply body
/// sent before the session closes.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("handshake failed: {0}")]
    Handshake(&'static str),
    #[error("message too long")]
    MessageTooLong,
    #[error("idle timeout")]
    IdleTimeout,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Handles accepted connections. One instance is shared by every
/// session; per-connection state lives on the handler's stack.
pub struct SessionHandler {
    storage: Arc<Storage>,
    interpreter: Interpreter,
    max_message_size: usize,
    idle_timeout: Duration,
}

impl SessionHandler {
    pub fn new(storage: Arc<Storage>, config: &Config) -> Self {
        Self {
            storage,
            interpreter: Interpreter::new(),
            max_message_size: config.network.max_message_size,
            idle_timeout: config.network.idle_timeout,
        }
    }

    /// Drive one connection to completion. Never returns an error; all
    /// failure modes end in a logged close.
    pub async fn handle(&self, mut stream: TcpStream, remote: SocketAddr) {
        info!(%remote, "accepted connection");

        match self.serve(&mut stream, remote).await {
            Ok(()) => info!(%remote, "closed connection"),
            Err(err) => warn!(%remote, %err, "session ended"),
        }

        // Best-effort goodbye; the peer may already be gone.
        let _ = stream.write_all(GOODBYE).await;
        let _ = stream.shutdown().await;
    }

    async fn serve(&self, stream: &mut TcpStream, remote: SocketAddr) -> Result<(), SessionError> {
        self.handshake(stream).await?;
        debug!(%remote, "handshake complete");

        let mut lines = LineReader::new(self.max_message_size);
        loop {
            let line = match lines.next_line(stream, self.idle_timeout).await {
                Ok(Some(line)) => line,
                Ok(None) => return Ok(()),
                Err(err @ SessionError::MessageTooLong) => {
                    let _ = stream.write_all(format!("error: {err}\n").as_bytes()).await;
                    return Err(err);
                }
                Err(err) => return Err(err),
            };

            debug!(%remote, query = %line, "received query");
            let reply = self.execute(&line).await;
            debug!(%remote, reply = %reply, "sending reply");

            stream.write_all(reply.as_bytes()).await?;
            stream.write_all(b"\n").await?;
        }
    }

    /// Exchange `HELLO` for `HI`. Anything else aborts the session.
    async fn handshake(&self, stream: &mut TcpStream) -> Result<(), SessionError> {
        let mut greeting = [0u8; 8];
        let n = timeout(self.idle_timeout, stream.read(&mut greeting))
            .await
            .map_err(|_| SessionError::IdleTimeout)??;
        if &greeting[..n] != HANDSHAKE_REQUEST {
            return Err(SessionError::Handshake("unexpected greeting"));
        }

        let written = stream.write(HANDSHAKE_REPLY).await?;
        if written != HANDSHAKE_REPLY.len() {
            return Err(SessionError::Handshake("short handshake reply"));
        }
        Ok(())
    }

    async fn execute(&self, query: &str) -> String {
        match self.interpreter.interpret(query) {
            Err(err) => err.to_string(),
            Ok(cmd) => match self.storage.exec(cmd).await {
                Ok(ExecResult::Ok) => "ok".to_string(),
                Ok(ExecResult::Value(value)) => format!("val: {value}"),
                Ok(ExecResult::NotFound) => "none".to_string(),
                Err(err) => err.to_string(),
            },
        }
    }
}

/// Newline-delimited reader with a per-message byte cap and an idle
/// deadline refreshed on every successful socket read.
struct LineReader {
    buf: BytesMut,
    max_message_size: usize,
}

impl LineReader {
    fn new(max_message_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(1024),
            max_message_size,
        }
    }

    /// Next line without its terminator, `None` on clean EOF.
    async fn next_line<S>(
        &mut self,
        stream: &mut S,
        idle_timeout: Duration,
    ) -> Result<Option<String>, SessionError>
    where
        S: AsyncRead + Unpin,
    {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                if pos > self.max_message_size {
                    return Err(SessionError::MessageTooLong);
                }
                let line = self.buf.split_to(pos + 1);
                return Ok(Some(Self::decode(&line[..pos])));
            }
            if self.buf.len() > self.max_message_size {
                return Err(SessionError::MessageTooLong);
            }

            let mut chunk = [0u8; 1024];
            let n = timeout(idle_timeout, stream.read(&mut chunk))
                .await
                .map_err(|_| SessionError::IdleTimeout)??;
            if n == 0 {
                // EOF. A final unterminated line is still a message.
                if self.buf.is_empty() {
                    return Ok(None);
                }
                let line = self.buf.split_to(self.buf.len());
                return Ok(Some(Self::decode(&line)));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    fn decode(raw: &[u8]) -> String {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        String::from_utf8_lossy(raw).into_owned()
    }
}
