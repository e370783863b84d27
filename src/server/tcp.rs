//! TCP listener with a bounded-concurrency accept loop

use crate::server::SessionHandler;
use futures::FutureExt;
use std::io;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to listen on {address}: {source}")]
    ListenFailed { address: String, source: io::Error },
}

/// TCP server for tidekv.
///
/// A semaphore of `max_connections` permits gates the accept loop: a
/// slot is reserved before `accept`, travels into the session task and
/// frees itself when the session ends, so the `(N+1)`-th client waits
/// in the listen backlog.
pub struct TcpServer {
    listener: TcpListener,
    handler: Arc<SessionHandler>,
    gate: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl TcpServer {
    /// Bind the listener. A bind failure is fatal to the process.
    pub async fn bind(
        address: &str,
        max_connections: usize,
        handler: SessionHandler,
        shutdown: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener =
            TcpListener::bind(address)
                .await
                .map_err(|source| ServerError::ListenFailed {
                    address: address.to_string(),
                    source,
                })?;

        if let Ok(local) = listener.local_addr() {
            info!(address = %local, max_connections, "tcp server listening");
        }

        Ok(Self {
            listener,
            handler: Arc::new(handler),
            gate: Arc::new(Semaphore::new(max_connections)),
            shutdown,
        })
    }

    /// Address the listener actually bound (port 0 resolves here).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept sessions until the shutdown token fires. Active sessions
    /// drain on their own by hitting EOF or their idle deadline.
    pub async fn run(self) {
        loop {
            let permit = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                permit = Arc::clone(&self.gate).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let (stream, remote) = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        error!(%err, "failed to accept connection");
                        drop(permit);
                        continue;
                    }
                },
            };

            if let Err(err) = stream.set_nodelay(true) {
                warn!(%remote, %err, "failed to set TCP_NODELAY");
            }

            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                let session = AssertUnwindSafe(handler.handle(stream, remote)).catch_unwind();
                if let Err(panic) = session.await {
                    error!(%remote, panic = panic_message(&panic), "session panicked");
                }
                drop(permit);
            });
        }

        info!("tcp server stopped");
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
