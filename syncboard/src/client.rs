//! High-level client tying the pieces together.
//!
//! A [`BoardClient`] owns one store, one presence tracker, one dispatcher
//! and one connection manager for a single local user. Opening a different
//! board tears the previous board's state down before connecting.

use std::sync::Arc;

use parking_lot::Mutex;
use syncboard_proto::model::{BoardId, Notification, UserId};
use tokio::sync::{broadcast, watch};

use crate::actions::BoardActions;
use crate::api::{BoardApi, PersistenceError, RestClient};
use crate::config::ClientConfig;
use crate::connection::{ConnectionError, ConnectionManager, ConnectionStatus};
use crate::dispatch::EventDispatcher;
use crate::presence::{PresenceSnapshot, PresenceTracker};
use crate::store::StoreHandle;
use crate::sync::{NOTIFICATION_CAPACITY, ServerFault, SyncBinding};
use crate::transport::Connector;
use crate::transport::websocket::WsConnector;

/// Errors surfaced by [`BoardClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The real-time connection could not be established.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// A REST call failed.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// No user id is configured.
    #[error("no user id configured")]
    MissingUser,
}

/// Real-time board client for one local user.
pub struct BoardClient<C, A> {
    user_id: UserId,
    store: StoreHandle,
    presence: Arc<PresenceTracker>,
    connection: ConnectionManager<C>,
    actions: BoardActions<A>,
    api: Arc<A>,
    notifications: broadcast::Sender<Notification>,
    last_error: Arc<Mutex<Option<ServerFault>>>,
    binding: Option<SyncBinding>,
}

impl<C, A> std::fmt::Debug for BoardClient<C, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoardClient")
            .field("user_id", &self.user_id)
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

impl BoardClient<WsConnector, RestClient> {
    /// Builds a WebSocket + HTTP client from resolved configuration.
    ///
    /// # Errors
    ///
    /// [`ClientError::MissingUser`] if no user id is configured, or
    /// [`ClientError::Persistence`] if the HTTP client cannot be built.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let user_id = config.user_id.clone().ok_or(ClientError::MissingUser)?;
        let api = RestClient::new(&config.api_url, &user_id, config.sync.request_timeout)?;
        Ok(Self::new(config, WsConnector, api, user_id))
    }
}

impl<C: Connector, A: BoardApi> BoardClient<C, A> {
    /// Assembles a client from explicit collaborators.
    #[must_use]
    pub fn new(config: &ClientConfig, connector: C, api: A, user_id: UserId) -> Self {
        let store = StoreHandle::new();
        let presence = Arc::new(PresenceTracker::new(config.sync.cursor_throttle));
        let dispatcher = EventDispatcher::new();
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let last_error = Arc::new(Mutex::new(None));

        let binding = SyncBinding::attach(
            &dispatcher,
            &store,
            &presence,
            notifications.clone(),
            Arc::clone(&last_error),
        );
        let connection = ConnectionManager::new(
            connector,
            config.ws_url.clone(),
            config.reconnect,
            dispatcher,
            Arc::clone(&presence),
        );
        let api = Arc::new(api);
        let actions = BoardActions::new(
            store.clone(),
            Arc::clone(&api),
            user_id.clone(),
            config.sync.rollback_on_rejection,
        );

        Self {
            user_id,
            store,
            presence,
            connection,
            actions,
            api,
            notifications,
            last_error,
            binding: Some(binding),
        }
    }

    /// Connects to `board_id`. The server answers with a `board.sync`
    /// snapshot that populates the store.
    ///
    /// Switching from another board drops that board's state first.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connection`] if the connection could not be
    /// opened; reconnects continue in the background.
    pub async fn open_board(&self, board_id: BoardId) -> Result<(), ClientError> {
        let switching = self
            .connection
            .session()
            .is_some_and(|(current, _)| current != board_id)
            || self.store.board_id().is_some_and(|current| current != board_id);
        if switching {
            tracing::info!(%board_id, "switching boards");
            self.store.teardown();
        }
        self.connection
            .connect(board_id, self.user_id.clone())
            .await?;
        Ok(())
    }

    /// Replaces the local board with a snapshot fetched over REST.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Persistence`] if the fetch failed.
    pub async fn resync(&self, board_id: &BoardId) -> Result<(), ClientError> {
        let board = self.api.get_board(board_id).await?;
        self.store.sync_board(board);
        Ok(())
    }

    /// Disconnects and drops the board.
    pub fn close(&self) {
        self.connection.disconnect();
        self.store.teardown();
    }

    /// Sends the local cursor position (throttled).
    pub fn move_cursor(&self, x: f64, y: f64) -> bool {
        self.connection.send_cursor(x, y)
    }

    /// The local user.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// The board store.
    #[must_use]
    pub const fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// Optimistic local actions.
    #[must_use]
    pub const fn actions(&self) -> &BoardActions<A> {
        &self.actions
    }

    /// The connection manager.
    #[must_use]
    pub const fn connection(&self) -> &ConnectionManager<C> {
        &self.connection
    }

    /// Current presence.
    #[must_use]
    pub fn presence(&self) -> PresenceSnapshot {
        self.presence.snapshot()
    }

    /// Connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    /// Observes connection status changes.
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection.subscribe_status()
    }

    /// Receives notifications pushed from now on.
    #[must_use]
    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// The last `error` event the server sent.
    #[must_use]
    pub fn last_error(&self) -> Option<ServerFault> {
        self.last_error.lock().clone()
    }
}

impl<C, A> Drop for BoardClient<C, A> {
    fn drop(&mut self) {
        self.connection.disconnect();
        if let Some(binding) = self.binding.take() {
            binding.detach();
        }
    }
}
