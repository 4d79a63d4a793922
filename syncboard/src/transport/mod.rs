//! Transport layer for the real-time channel.
//!
//! A [`Connector`] opens one message-oriented duplex [`Link`] per board
//! session. Concrete implementations:
//! - [`websocket::WsConnector`] for a real server over WebSocket
//! - [`loopback::LoopbackConnector`] with in-process channels for tests
//!
//! Links carry UTF-8 text frames only; envelope encoding happens above this
//! layer.

pub mod loopback;
pub mod websocket;

use std::future::Future;

use tokio::sync::mpsc;

/// Capacity of the inbound frame queue of a link.
pub const INBOUND_CAPACITY: usize = 256;

/// Errors that can occur while opening or using a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The operation timed out before completing.
    #[error("transport operation timed out")]
    Timeout,

    /// The server could not be reached at the given address.
    #[error("server at {0} is unreachable")]
    Unreachable(String),

    /// The server answered the upgrade with a non-success status.
    #[error("upgrade rejected with HTTP {0}")]
    Rejected(u16),

    /// An underlying I/O or protocol error occurred.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An open duplex connection.
///
/// Dropping `outbound` (and every clone of it) closes the connection. When
/// the remote side goes away, `inbound` yields `None`.
#[derive(Debug)]
pub struct Link {
    /// Frames to send to the server.
    pub outbound: mpsc::UnboundedSender<String>,
    /// Frames received from the server, in arrival order.
    pub inbound: mpsc::Receiver<String>,
}

/// Opens links to a real-time endpoint.
pub trait Connector: Send + Sync + 'static {
    /// Opens a connection to `url`.
    ///
    /// Resolves once the connection is ready to carry frames. Timeouts are
    /// applied by the caller.
    fn open(&self, url: &str) -> impl Future<Output = Result<Link, TransportError>> + Send;
}
