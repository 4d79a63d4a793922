//! Loopback transport for testing.
//!
//! [`LoopbackConnector`] opens links backed by in-process [`tokio::sync::mpsc`]
//! channels. The server end of every successful open is handed to the test
//! as a [`ServerPeer`], which can push frames to the client, read what the
//! client sent, or drop to simulate the server closing the connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use tokio::sync::mpsc;

use super::{Connector, INBOUND_CAPACITY, Link, TransportError};

/// Server side of a loopback link.
#[derive(Debug)]
pub struct ServerPeer {
    /// URL the client opened.
    pub url: String,
    /// Frames to deliver to the client.
    pub to_client: mpsc::Sender<String>,
    /// Frames the client sent.
    pub from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerPeer {
    /// Pushes a frame to the client.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] if the client dropped the link.
    pub async fn push(&self, frame: impl Into<String>) -> Result<(), TransportError> {
        self.to_client
            .send(frame.into())
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Receives the next frame the client sent, or `None` once the client
    /// closed its side.
    pub async fn next_frame(&mut self) -> Option<String> {
        self.from_client.recv().await
    }
}

/// In-process connector.
///
/// Cloning shares the peer queue, failure budget and open counter.
#[derive(Debug, Clone)]
pub struct LoopbackConnector {
    peers: mpsc::UnboundedSender<ServerPeer>,
    fail_next: Arc<AtomicU32>,
    opens: Arc<AtomicUsize>,
}

impl LoopbackConnector {
    /// Creates a connector and the receiver on which server ends of newly
    /// opened links arrive.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerPeer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                peers: tx,
                fail_next: Arc::new(AtomicU32::new(0)),
                opens: Arc::new(AtomicUsize::new(0)),
            },
            rx,
        )
    }

    /// Makes the next `n` opens fail with [`TransportError::Unreachable`].
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Number of opens attempted so far, failed ones included.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl Connector for LoopbackConnector {
    async fn open(&self, url: &str) -> Result<Link, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::Unreachable(url.to_string()));
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::channel(INBOUND_CAPACITY);
        let peer = ServerPeer {
            url: url.to_string(),
            to_client: in_tx,
            from_client: out_rx,
        };
        self.peers
            .send(peer)
            .map_err(|_| TransportError::Unreachable(url.to_string()))?;

        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
