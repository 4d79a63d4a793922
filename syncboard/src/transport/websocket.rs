//! WebSocket transport.
//!
//! Opens the connection with `tokio-tungstenite`, splits the stream, and
//! spawns two pump tasks: one forwarding text frames from the socket into the
//! link's inbound queue, one writing the link's outbound frames to the socket.
//! Either side ending tears the other down.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::{Connector, INBOUND_CAPACITY, Link, TransportError};

/// Type alias for the write half of a WebSocket connection.
type WsSender = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Type alias for the read half of a WebSocket connection.
type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Production connector over `ws://` / `wss://`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    async fn open(&self, url: &str) -> Result<Link, TransportError> {
        let (ws_stream, _response) = connect_async(url).await.map_err(|e| {
            tracing::warn!(url, err = %e, "WebSocket connect failed");
            map_ws_connect_error(url, e)
        })?;

        let (ws_sender, ws_reader) = ws_stream.split();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::channel(INBOUND_CAPACITY);

        tokio::spawn(reader_loop(ws_reader, in_tx));
        tokio::spawn(writer_loop(ws_sender, out_rx));

        tracing::debug!(url, "WebSocket connected");
        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// Forwards text frames to the link until the socket or the link closes.
///
/// Binary frames are not part of the protocol and are skipped.
async fn reader_loop(mut ws_reader: WsReader, tx: mpsc::Sender<String>) {
    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                if tx.send(text.as_str().to_owned()).await.is_err() {
                    // Link dropped by the owner.
                    break;
                }
            }
            Ok(Message::Close(frame)) => {
                tracing::info!(?frame, "WebSocket closed by server");
                break;
            }
            Ok(Message::Binary(data)) => {
                tracing::debug!(len = data.len(), "ignoring binary frame");
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
            Err(e) => {
                tracing::warn!(err = %e, "WebSocket read error");
                break;
            }
        }
    }
    tracing::debug!("WebSocket reader exiting");
}

/// Writes outbound frames until every sender is dropped, then closes.
async fn writer_loop(mut ws_sender: WsSender, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(text) = rx.recv().await {
        if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
            tracing::warn!(err = %e, "WebSocket send failed");
            return;
        }
    }
    let _ = ws_sender.send(Message::Close(None)).await;
    let _ = ws_sender.close().await;
    tracing::debug!("WebSocket writer exiting");
}

/// Map a `tokio_tungstenite` connection error to a [`TransportError`].
fn map_ws_connect_error(url: &str, err: tokio_tungstenite::tungstenite::Error) -> TransportError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::ConnectionRefused
                || io_err.kind() == std::io::ErrorKind::AddrNotAvailable
            {
                TransportError::Unreachable(url.to_string())
            } else {
                TransportError::Io(io_err)
            }
        }
        WsError::Http(response) => TransportError::Rejected(response.status().as_u16()),
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::ConnectionClosed,
        other => TransportError::Io(std::io::Error::other(format!(
            "WebSocket connection error: {other}"
        ))),
    }
}
