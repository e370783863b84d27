//! TCP server: bounded acceptor and per-connection sessions

pub mod handler;
pub mod tcp;

pub use handler::SessionHandler;
pub use tcp::{ServerError, TcpServer};
