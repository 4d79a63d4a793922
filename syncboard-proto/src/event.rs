//! Event envelopes exchanged over the real-time channel.
//!
//! Every frame is a UTF-8 JSON object `{"type": "<kind>", "payload": {..}}`.
//! Inbound frames decode into [`ServerEvent`], outbound frames are built from
//! [`ClientCommand`]. Both are adjacently tagged so the envelope shape falls
//! out of serde directly.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{
    Board, Column, ColumnId, ColumnPatch, Notification, Task, TaskId, TaskPatch, User, UserId,
};

/// Every event type known to the protocol, in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Full board snapshot.
    BoardSync,
    /// A task was created.
    TaskCreated,
    /// A task's content changed.
    TaskUpdated,
    /// A task changed column and/or position.
    TaskMoved,
    /// A task was deleted.
    TaskDeleted,
    /// A column was created.
    ColumnCreated,
    /// A column's display fields changed.
    ColumnUpdated,
    /// A column changed position.
    ColumnMoved,
    /// A column was deleted.
    ColumnDeleted,
    /// A user opened the board.
    PresenceJoined,
    /// A user left the board.
    PresenceLeft,
    /// Cursor positions of other users.
    PresenceCursors,
    /// A notification for the current user.
    NotificationPush,
    /// Server-side error report.
    Error,
    /// Request to create a task.
    TaskCreate,
    /// Request to update a task.
    TaskUpdate,
    /// Request to move a task.
    TaskMove,
    /// Request to delete a task.
    TaskDelete,
    /// Request to create a column.
    ColumnCreate,
    /// Request to update a column.
    ColumnUpdate,
    /// Request to move a column.
    ColumnMove,
    /// Request to delete a column.
    ColumnDelete,
    /// Local cursor position.
    PresenceCursor,
}

impl EventType {
    /// All variants, inbound first.
    pub const ALL: [Self; 23] = [
        Self::BoardSync,
        Self::TaskCreated,
        Self::TaskUpdated,
        Self::TaskMoved,
        Self::TaskDeleted,
        Self::ColumnCreated,
        Self::ColumnUpdated,
        Self::ColumnMoved,
        Self::ColumnDeleted,
        Self::PresenceJoined,
        Self::PresenceLeft,
        Self::PresenceCursors,
        Self::NotificationPush,
        Self::Error,
        Self::TaskCreate,
        Self::TaskUpdate,
        Self::TaskMove,
        Self::TaskDelete,
        Self::ColumnCreate,
        Self::ColumnUpdate,
        Self::ColumnMove,
        Self::ColumnDelete,
        Self::PresenceCursor,
    ];

    /// The `type` string used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BoardSync => "board.sync",
            Self::TaskCreated => "task.created",
            Self::TaskUpdated => "task.updated",
            Self::TaskMoved => "task.moved",
            Self::TaskDeleted => "task.deleted",
            Self::ColumnCreated => "column.created",
            Self::ColumnUpdated => "column.updated",
            Self::ColumnMoved => "column.moved",
            Self::ColumnDeleted => "column.deleted",
            Self::PresenceJoined => "presence.joined",
            Self::PresenceLeft => "presence.left",
            Self::PresenceCursors => "presence.cursors",
            Self::NotificationPush => "notification.push",
            Self::Error => "error",
            Self::TaskCreate => "task.create",
            Self::TaskUpdate => "task.update",
            Self::TaskMove => "task.move",
            Self::TaskDelete => "task.delete",
            Self::ColumnCreate => "column.create",
            Self::ColumnUpdate => "column.update",
            Self::ColumnMove => "column.move",
            Self::ColumnDelete => "column.delete",
            Self::PresenceCursor => "presence.cursor",
        }
    }

    /// Parses a wire `type` string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Returns `true` for types the server sends to clients.
    #[must_use]
    pub const fn is_inbound(self) -> bool {
        matches!(
            self,
            Self::BoardSync
                | Self::TaskCreated
                | Self::TaskUpdated
                | Self::TaskMoved
                | Self::TaskDeleted
                | Self::ColumnCreated
                | Self::ColumnUpdated
                | Self::ColumnMoved
                | Self::ColumnDeleted
                | Self::PresenceJoined
                | Self::PresenceLeft
                | Self::PresenceCursors
                | Self::NotificationPush
                | Self::Error
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remote cursor, as carried by `presence.cursors`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    /// Cursor owner.
    pub user_id: UserId,
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

/// Events pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerEvent {
    /// Authoritative full snapshot; replaces local state wholesale.
    #[serde(rename = "board.sync")]
    BoardSync {
        /// The board with nested columns and tasks.
        board: Board,
    },
    /// A task was created.
    #[serde(rename = "task.created")]
    TaskCreated {
        /// The new task, carrying its column and position.
        task: Task,
        /// Originating user.
        user_id: UserId,
    },
    /// A task's content fields changed.
    #[serde(rename = "task.updated")]
    TaskUpdated {
        /// The task after the update.
        task: Task,
        /// Originating user.
        user_id: UserId,
    },
    /// A task moved; `task` carries the destination column and position.
    #[serde(rename = "task.moved")]
    TaskMoved {
        /// The task after the move.
        task: Task,
        /// Column the task left.
        from_column_id: ColumnId,
        /// Originating user.
        user_id: UserId,
    },
    /// A task was deleted.
    #[serde(rename = "task.deleted")]
    TaskDeleted {
        /// Deleted task.
        task_id: TaskId,
        /// Originating user.
        user_id: UserId,
    },
    /// A column was created.
    #[serde(rename = "column.created")]
    ColumnCreated {
        /// The new column.
        column: Column,
        /// Originating user.
        user_id: UserId,
    },
    /// A column's display fields changed.
    #[serde(rename = "column.updated")]
    ColumnUpdated {
        /// The column after the update.
        column: Column,
        /// Originating user.
        user_id: UserId,
    },
    /// A column moved; `column.position` is the new position.
    #[serde(rename = "column.moved")]
    ColumnMoved {
        /// The column after the move.
        column: Column,
        /// Originating user.
        user_id: UserId,
    },
    /// A column was deleted along with its tasks.
    #[serde(rename = "column.deleted")]
    ColumnDeleted {
        /// Deleted column.
        column_id: ColumnId,
        /// Originating user.
        user_id: UserId,
    },
    /// A user opened the board.
    #[serde(rename = "presence.joined")]
    PresenceJoined {
        /// The user who joined.
        user: User,
    },
    /// A user left the board.
    #[serde(rename = "presence.left")]
    PresenceLeft {
        /// The user who left.
        user_id: UserId,
    },
    /// Cursor positions of other users.
    #[serde(rename = "presence.cursors")]
    PresenceCursors {
        /// One entry per moved cursor.
        cursors: Vec<Cursor>,
    },
    /// A notification addressed to the current user.
    #[serde(rename = "notification.push")]
    NotificationPush {
        /// The notification.
        notification: Notification,
    },
    /// The server rejected something or hit an internal error.
    #[serde(rename = "error")]
    Error {
        /// Machine-readable code.
        code: String,
        /// Human-readable message.
        message: String,
    },
}

impl ServerEvent {
    /// The event's wire type.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::BoardSync { .. } => EventType::BoardSync,
            Self::TaskCreated { .. } => EventType::TaskCreated,
            Self::TaskUpdated { .. } => EventType::TaskUpdated,
            Self::TaskMoved { .. } => EventType::TaskMoved,
            Self::TaskDeleted { .. } => EventType::TaskDeleted,
            Self::ColumnCreated { .. } => EventType::ColumnCreated,
            Self::ColumnUpdated { .. } => EventType::ColumnUpdated,
            Self::ColumnMoved { .. } => EventType::ColumnMoved,
            Self::ColumnDeleted { .. } => EventType::ColumnDeleted,
            Self::PresenceJoined { .. } => EventType::PresenceJoined,
            Self::PresenceLeft { .. } => EventType::PresenceLeft,
            Self::PresenceCursors { .. } => EventType::PresenceCursors,
            Self::NotificationPush { .. } => EventType::NotificationPush,
            Self::Error { .. } => EventType::Error,
        }
    }

    /// The user whose action produced this event, for mutation events.
    #[must_use]
    pub const fn origin(&self) -> Option<&UserId> {
        match self {
            Self::TaskCreated { user_id, .. }
            | Self::TaskUpdated { user_id, .. }
            | Self::TaskMoved { user_id, .. }
            | Self::TaskDeleted { user_id, .. }
            | Self::ColumnCreated { user_id, .. }
            | Self::ColumnUpdated { user_id, .. }
            | Self::ColumnMoved { user_id, .. }
            | Self::ColumnDeleted { user_id, .. } => Some(user_id),
            _ => None,
        }
    }
}

/// Commands a client sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientCommand {
    /// Create a task at the end of a column.
    #[serde(rename = "task.create")]
    TaskCreate {
        /// Target column.
        column_id: ColumnId,
        /// Title.
        title: String,
        /// Optional description.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    /// Update a task's content.
    #[serde(rename = "task.update")]
    TaskUpdate {
        /// Task to update.
        task_id: TaskId,
        /// Fields to change.
        changes: TaskPatch,
    },
    /// Move a task.
    #[serde(rename = "task.move")]
    TaskMove {
        /// Task to move.
        task_id: TaskId,
        /// Destination column.
        column_id: ColumnId,
        /// Destination position (clamped by the receiver).
        position: u32,
    },
    /// Delete a task.
    #[serde(rename = "task.delete")]
    TaskDelete {
        /// Task to delete.
        task_id: TaskId,
    },
    /// Create a column.
    #[serde(rename = "column.create")]
    ColumnCreate {
        /// Display name.
        name: String,
        /// Desired position.
        position: u32,
        /// Optional color.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
    },
    /// Update a column's display fields.
    #[serde(rename = "column.update")]
    ColumnUpdate {
        /// Column to update.
        column_id: ColumnId,
        /// Fields to change.
        changes: ColumnPatch,
    },
    /// Move a column.
    #[serde(rename = "column.move")]
    ColumnMove {
        /// Column to move.
        column_id: ColumnId,
        /// Destination position (clamped by the receiver).
        position: u32,
    },
    /// Delete a column.
    #[serde(rename = "column.delete")]
    ColumnDelete {
        /// Column to delete.
        column_id: ColumnId,
    },
    /// Local cursor position.
    #[serde(rename = "presence.cursor")]
    PresenceCursor {
        /// Horizontal coordinate.
        x: f64,
        /// Vertical coordinate.
        y: f64,
    },
}

impl ClientCommand {
    /// The command's wire type.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::TaskCreate { .. } => EventType::TaskCreate,
            Self::TaskUpdate { .. } => EventType::TaskUpdate,
            Self::TaskMove { .. } => EventType::TaskMove,
            Self::TaskDelete { .. } => EventType::TaskDelete,
            Self::ColumnCreate { .. } => EventType::ColumnCreate,
            Self::ColumnUpdate { .. } => EventType::ColumnUpdate,
            Self::ColumnMove { .. } => EventType::ColumnMove,
            Self::ColumnDelete { .. } => EventType::ColumnDelete,
            Self::PresenceCursor { .. } => EventType::PresenceCursor,
        }
    }
}
