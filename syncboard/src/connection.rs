//! Connection lifecycle for the real-time channel.
//!
//! A [`ConnectionManager`] owns at most one session, bound to a
//! `(board, user)` pair. It opens the transport through a [`Connector`],
//! decodes inbound frames and hands them to the [`EventDispatcher`], and
//! recovers from unexpected closure with exponential backoff.
//!
//! ```text
//! Idle ──connect──▶ Connecting ──ok──▶ Connected
//!                      │  ▲                │
//!                 fail │  │ timer          │ closed
//!                      ▼  │                ▼
//!                 Disconnected ◀───────────┘
//! ```
//!
//! Every teardown bumps a generation counter; tasks and timers belonging to
//! an older generation notice the mismatch and do nothing. After
//! `max_attempts` failed reconnects the manager stays disconnected until
//! the next explicit [`connect`](ConnectionManager::connect).

use std::sync::Arc;

use parking_lot::Mutex;
use syncboard_proto::codec::{decode_event, encode_command};
use syncboard_proto::event::ClientCommand;
use syncboard_proto::model::{BoardId, UserId};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use url::Url;

use crate::config::ReconnectConfig;
use crate::dispatch::EventDispatcher;
use crate::presence::PresenceTracker;
use crate::transport::{Connector, TransportError};

/// Connection state as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No session requested.
    Idle,
    /// Opening the transport after an explicit connect.
    Connecting,
    /// Transport open; events flow.
    Connected,
    /// Waiting for, or running, reconnect attempt `attempt` of `max`.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
        /// Attempts allowed before giving up.
        max: u32,
    },
    /// Gave up reconnecting; waiting for an explicit connect.
    Disconnected,
}

/// Errors from [`ConnectionManager::connect`].
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Another connection attempt has not finished yet.
    #[error("a connection attempt is already in flight")]
    InFlight,

    /// The transport could not be opened.
    #[error("failed to open transport: {0}")]
    Open(#[from] TransportError),

    /// The transport did not open within the connect timeout.
    #[error("connection attempt timed out")]
    Timeout,

    /// The attempt was superseded by a disconnect or another connect.
    #[error("connection attempt was cancelled")]
    Cancelled,

    /// The configured endpoint cannot be turned into a session URL.
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    board_id: BoardId,
    user_id: UserId,
    url: Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug)]
struct ConnState {
    generation: u64,
    phase: Phase,
    target: Option<Target>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    reader: Option<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
}

impl ConnState {
    /// Drops the transport and cancels every task of the current
    /// generation.
    fn teardown(&mut self) {
        self.generation += 1;
        self.outbound = None;
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct Inner<C> {
    connector: C,
    ws_url: String,
    policy: ReconnectConfig,
    dispatcher: EventDispatcher,
    presence: Arc<PresenceTracker>,
    state: Mutex<ConnState>,
    status: watch::Sender<ConnectionStatus>,
}

/// Owns the real-time session. Cheap to clone; clones share the session.
pub struct ConnectionManager<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for ConnectionManager<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> std::fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("ws_url", &self.inner.ws_url)
            .field("status", &*self.inner.status.borrow())
            .finish_non_exhaustive()
    }
}

impl<C> ConnectionManager<C> {
    /// Closes the session and forgets the target. Always safe to call.
    pub fn disconnect(&self) {
        {
            let mut state = self.inner.state.lock();
            state.teardown();
            state.target = None;
            state.phase = Phase::Idle;
        }
        self.inner.presence.clear();
        self.inner.status.send_replace(ConnectionStatus::Idle);
        tracing::info!("disconnected");
    }
}

impl<C: Connector> ConnectionManager<C> {
    /// Creates an idle manager.
    ///
    /// `ws_url` is the endpoint base; sessions connect to
    /// `{ws_url}/ws?board_id=..&user_id=..`.
    #[must_use]
    pub fn new(
        connector: C,
        ws_url: impl Into<String>,
        policy: ReconnectConfig,
        dispatcher: EventDispatcher,
        presence: Arc<PresenceTracker>,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Idle);
        Self {
            inner: Arc::new(Inner {
                connector,
                ws_url: ws_url.into(),
                policy,
                dispatcher,
                presence,
                state: Mutex::new(ConnState {
                    generation: 0,
                    phase: Phase::Idle,
                    target: None,
                    outbound: None,
                    reader: None,
                    timer: None,
                }),
                status,
            }),
        }
    }

    /// Opens a session for `(board_id, user_id)`.
    ///
    /// Returns immediately if that pair is already connected. Any other
    /// session (or pending reconnect) is torn down first. A failed attempt
    /// returns the error and keeps retrying in the background with backoff.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::InFlight`] if another attempt has not finished
    /// - [`ConnectionError::InvalidUrl`] if no session URL can be built
    /// - [`ConnectionError::Open`] / [`ConnectionError::Timeout`] if the
    ///   transport did not open
    /// - [`ConnectionError::Cancelled`] if a disconnect or another connect
    ///   superseded this one
    pub async fn connect(&self, board_id: BoardId, user_id: UserId) -> Result<(), ConnectionError> {
        let url = session_url(&self.inner.ws_url, &board_id, &user_id)?;
        let generation = {
            let mut state = self.inner.state.lock();
            if state.phase == Phase::Connecting {
                return Err(ConnectionError::InFlight);
            }
            let same_pair = state
                .target
                .as_ref()
                .is_some_and(|t| t.board_id == board_id && t.user_id == user_id);
            if same_pair && state.phase == Phase::Connected {
                tracing::debug!(%board_id, %user_id, "already connected");
                return Ok(());
            }
            if state.target.is_some() {
                tracing::info!("tearing down previous session");
            }
            state.teardown();
            state.target = Some(Target {
                board_id,
                user_id,
                url,
            });
            state.phase = Phase::Connecting;
            state.generation
        };
        self.inner.presence.clear();
        self.inner.status.send_replace(ConnectionStatus::Connecting);
        self.inner.open_session(generation, 0).await
    }

    /// Sends a command if connected. Returns `false` when the command was
    /// dropped; nothing is buffered.
    pub fn send(&self, command: &ClientCommand) -> bool {
        let frame = match encode_command(command) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(err = %e, "failed to encode command");
                return false;
            }
        };
        let state = self.inner.state.lock();
        match (&state.phase, &state.outbound) {
            (Phase::Connected, Some(outbound)) => outbound.send(frame).is_ok(),
            _ => {
                tracing::warn!(
                    event_type = %command.event_type(),
                    "not connected, dropping outbound message"
                );
                false
            }
        }
    }

    /// Sends the local cursor, at most once per throttle interval.
    ///
    /// Returns `true` if the update was sent.
    pub fn send_cursor(&self, x: f64, y: f64) -> bool {
        if !self.is_connected() || !self.inner.presence.try_claim_cursor_slot() {
            return false;
        }
        self.send(&ClientCommand::PresenceCursor { x, y })
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    /// Returns `true` while the transport is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().phase == Phase::Connected
    }

    /// Receiver that observes every status change.
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    /// The `(board, user)` pair the manager is bound to, connected or not.
    #[must_use]
    pub fn session(&self) -> Option<(BoardId, UserId)> {
        self.inner
            .state
            .lock()
            .target
            .as_ref()
            .map(|t| (t.board_id.clone(), t.user_id.clone()))
    }

    /// The dispatcher inbound events are delivered to.
    #[must_use]
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.inner.dispatcher
    }
}

impl<C: Connector> Inner<C> {
    /// Opens the transport for the current target. `attempt` is 0 for an
    /// explicit connect and the reconnect attempt number otherwise.
    async fn open_session(self: &Arc<Self>, generation: u64, attempt: u32) -> Result<(), ConnectionError> {
        let url = {
            let state = self.state.lock();
            match &state.target {
                Some(target) if state.generation == generation => target.url.clone(),
                _ => return Err(ConnectionError::Cancelled),
            }
        };

        let opened = tokio::time::timeout(
            self.policy.connect_timeout,
            self.connector.open(url.as_str()),
        )
        .await;
        let result = match opened {
            Ok(Ok(link)) => Ok(link),
            Ok(Err(e)) => Err(ConnectionError::Open(e)),
            Err(_) => Err(ConnectionError::Timeout),
        };

        let (outcome, status) = {
            let mut state = self.state.lock();
            if state.generation != generation {
                tracing::debug!("connection attempt superseded");
                return Err(ConnectionError::Cancelled);
            }
            match result {
                Ok(link) => {
                    state.phase = Phase::Connected;
                    state.outbound = Some(link.outbound);
                    state.timer = None;
                    state.reader = Some(tokio::spawn(read_loop(
                        Arc::clone(self),
                        generation,
                        link.inbound,
                    )));
                    tracing::info!(url = %url, attempt, "connected");
                    (Ok(()), ConnectionStatus::Connected)
                }
                Err(e) => {
                    tracing::warn!(url = %url, attempt, err = %e, "connection attempt failed");
                    let status = self.schedule_reconnect(&mut state, attempt.saturating_add(1));
                    (Err(e), status)
                }
            }
        };
        self.status.send_replace(status);
        outcome
    }

    /// Schedules reconnect attempt `attempt`, or gives up past the bound.
    fn schedule_reconnect(self: &Arc<Self>, state: &mut ConnState, attempt: u32) -> ConnectionStatus {
        state.outbound = None;
        if attempt > self.policy.max_attempts {
            state.phase = Phase::Disconnected;
            state.timer = None;
            tracing::warn!(
                attempts = self.policy.max_attempts,
                "giving up reconnecting"
            );
            return ConnectionStatus::Disconnected;
        }

        let delay = self.policy.delay_for(attempt);
        state.phase = Phase::Disconnected;
        let generation = state.generation;
        let inner = Arc::clone(self);
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.retry(generation, attempt).await;
        }));
        tracing::info!(attempt, delay_ms = delay.as_millis(), "reconnect scheduled");
        ConnectionStatus::Reconnecting {
            attempt,
            max: self.policy.max_attempts,
        }
    }

    /// Runs a timer-driven reconnect attempt.
    async fn retry(self: &Arc<Self>, generation: u64, attempt: u32) {
        {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            state.phase = Phase::Connecting;
        }
        tracing::debug!(attempt, "reconnecting");
        // Failures schedule the next attempt themselves.
        let _ = self.open_session(generation, attempt).await;
    }

    /// The reader of `generation` saw the transport close.
    fn connection_lost(self: &Arc<Self>, generation: u64) {
        let status = {
            let mut state = self.state.lock();
            if state.generation != generation || state.phase != Phase::Connected {
                return;
            }
            state.reader = None;
            tracing::warn!("connection lost");
            self.schedule_reconnect(&mut state, 1)
        };
        self.presence.clear();
        self.status.send_replace(status);
    }
}

/// Decodes and dispatches inbound frames until the link closes.
async fn read_loop<C: Connector>(
    inner: Arc<Inner<C>>,
    generation: u64,
    mut inbound: mpsc::Receiver<String>,
) {
    while let Some(frame) = inbound.recv().await {
        if inner.state.lock().generation != generation {
            return;
        }
        match decode_event(&frame) {
            Ok(event) => {
                tracing::trace!(event_type = %event.event_type(), "inbound event");
                inner.dispatcher.dispatch(&event);
            }
            Err(e) => {
                tracing::warn!(err = %e, "dropping malformed inbound message");
            }
        }
    }
    inner.connection_lost(generation);
}

/// Builds `{base}/ws?board_id=..&user_id=..`.
fn session_url(base: &str, board_id: &BoardId, user_id: &UserId) -> Result<Url, ConnectionError> {
    let invalid = |reason: &dyn std::fmt::Display| ConnectionError::InvalidUrl(format!("{base}: {reason}"));
    let mut url = Url::parse(base).map_err(|e| invalid(&e))?;
    url.path_segments_mut()
        .map_err(|()| invalid(&"cannot be a base"))?
        .pop_if_empty()
        .push("ws");
    url.query_pairs_mut()
        .clear()
        .append_pair("board_id", board_id.as_str())
        .append_pair("user_id", user_id.as_str());
    Ok(url)
}
