//! Routes dispatched events into the store, the presence tracker and the
//! notification feed.
//!
//! Remote events are applied to memory only; nothing here calls the REST
//! API. Mutation events also confirm the matching pending local op, if
//! any.

use std::sync::Arc;

use parking_lot::Mutex;
use syncboard_proto::event::{EventType, ServerEvent};
use syncboard_proto::model::{ColumnPatch, Notification, TaskPatch};
use tokio::sync::broadcast;

use crate::dispatch::{EventDispatcher, Subscription};
use crate::presence::PresenceTracker;
use crate::store::{Outcome, PendingOp, StoreHandle};

/// Capacity of the notification broadcast channel.
pub const NOTIFICATION_CAPACITY: usize = 64;

/// Event types that mutate the board.
pub const BOARD_EVENTS: [EventType; 9] = [
    EventType::BoardSync,
    EventType::TaskCreated,
    EventType::TaskUpdated,
    EventType::TaskMoved,
    EventType::TaskDeleted,
    EventType::ColumnCreated,
    EventType::ColumnUpdated,
    EventType::ColumnMoved,
    EventType::ColumnDeleted,
];

/// An `error` event reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerFault {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// Handler registrations connecting a dispatcher to client state.
#[derive(Debug)]
pub struct SyncBinding {
    subscriptions: Vec<Subscription>,
}

impl SyncBinding {
    /// Registers the handlers.
    ///
    /// Notifications are forwarded to `notifications`; the most recent
    /// server error is kept in `last_error`.
    #[must_use]
    pub fn attach(
        dispatcher: &EventDispatcher,
        store: &StoreHandle,
        presence: &Arc<PresenceTracker>,
        notifications: broadcast::Sender<Notification>,
        last_error: Arc<Mutex<Option<ServerFault>>>,
    ) -> Self {
        let mut subscriptions = Vec::new();

        for event_type in BOARD_EVENTS {
            let store = store.clone();
            subscriptions.push(dispatcher.subscribe(event_type, move |event| {
                apply_event(&store, event);
            }));
        }

        let tracker = Arc::clone(presence);
        subscriptions.push(
            dispatcher.subscribe(EventType::PresenceJoined, move |event| {
                if let ServerEvent::PresenceJoined { user } = event {
                    tracker.joined(user.clone());
                }
            }),
        );
        let tracker = Arc::clone(presence);
        subscriptions.push(dispatcher.subscribe(EventType::PresenceLeft, move |event| {
            if let ServerEvent::PresenceLeft { user_id } = event {
                tracker.left(user_id);
            }
        }));
        let tracker = Arc::clone(presence);
        subscriptions.push(
            dispatcher.subscribe(EventType::PresenceCursors, move |event| {
                if let ServerEvent::PresenceCursors { cursors } = event {
                    tracker.cursors_moved(cursors);
                }
            }),
        );

        subscriptions.push(
            dispatcher.subscribe(EventType::NotificationPush, move |event| {
                if let ServerEvent::NotificationPush { notification } = event {
                    tracing::info!(kind = %notification.kind, title = %notification.title, "notification");
                    // No receivers is fine.
                    let _ = notifications.send(notification.clone());
                }
            }),
        );

        subscriptions.push(dispatcher.subscribe(EventType::Error, move |event| {
            if let ServerEvent::Error { code, message } = event {
                tracing::warn!(%code, %message, "server reported an error");
                *last_error.lock() = Some(ServerFault {
                    code: code.clone(),
                    message: message.clone(),
                });
            }
        }));

        Self { subscriptions }
    }

    /// Number of handlers this binding registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Removes every handler this binding registered.
    pub fn detach(self) {
        for subscription in self.subscriptions {
            subscription.unsubscribe();
        }
    }
}

/// Applies a board event to the store and confirms the pending local op it
/// corresponds to.
pub fn apply_event(store: &StoreHandle, event: &ServerEvent) -> Outcome {
    let outcome = match event {
        ServerEvent::BoardSync { board } => {
            store.sync_board(board.clone());
            Outcome::Applied
        }
        ServerEvent::TaskCreated { task, .. } => store.add_task(task.clone()),
        ServerEvent::TaskUpdated { task, .. } => {
            store.update_task(&task.id, &TaskPatch::from_task(task))
        }
        ServerEvent::TaskMoved {
            task,
            from_column_id,
            ..
        } => store.move_task(&task.id, from_column_id, &task.column_id, task.position),
        ServerEvent::TaskDeleted { task_id, .. } => store.remove_task(task_id),
        ServerEvent::ColumnCreated { column, .. } => store.add_column(column.clone()),
        ServerEvent::ColumnUpdated { column, .. } => {
            store.update_column(&column.id, &ColumnPatch::from_column(column))
        }
        ServerEvent::ColumnMoved { column, .. } => store.move_column(&column.id, column.position),
        ServerEvent::ColumnDeleted { column_id, .. } => store.remove_column(column_id),
        _ => return Outcome::Ignored,
    };

    if let Some((kind, entity)) = PendingOp::confirmation_key(event) {
        store.confirm(kind, &entity);
    }
    tracing::debug!(
        event_type = %event.event_type(),
        origin = ?event.origin(),
        ?outcome,
        "board event applied"
    );
    outcome
}
