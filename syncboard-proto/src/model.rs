//! Board, column, and task model shared by the client and the hub.
//!
//! Entities mirror the JSON shapes the server sends: a [`Board`] owns its
//! [`Column`]s, each column owns its [`Task`]s, and both carry a dense,
//! zero-based `position` that defines sibling order.
//!
//! Partial updates travel as patches ([`TaskPatch`], [`ColumnPatch`],
//! [`BoardPatch`]). Patches never touch structural fields (owning column,
//! position); structure only changes through insert/move/remove.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps an identifier received from the server.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as sent on the wire.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Identifier of a board.
    BoardId
);
string_id!(
    /// Identifier of a column.
    ColumnId
);
string_id!(
    /// Identifier of a task.
    TaskId
);
string_id!(
    /// Identifier of a user, as yielded by the identity provider.
    UserId
);
string_id!(
    /// Identifier of the team that owns a board.
    TeamId
);

/// Task priority, ordered from least to most pressing.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Can wait.
    Low,
    /// Normal work.
    #[default]
    Medium,
    /// Should be picked up soon.
    High,
    /// Drop everything.
    Urgent,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Urgent => write!(f, "urgent"),
        }
    }
}

/// A unit of work living in exactly one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier.
    pub id: TaskId,
    /// Owning column.
    pub column_id: ColumnId,
    /// Short title shown on the card.
    pub title: String,
    /// Optional long-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Dense zero-based position within the owning column.
    pub position: u32,
    /// Priority of the task.
    #[serde(default)]
    pub priority: Priority,
    /// Due date as formatted by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    /// Assigned user, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<UserId>,
    /// User who created the task, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,
    /// Creation instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Last modification instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Creates a task with default metadata. Mostly useful for tests and
    /// for the hub when it materializes a `task.create` command.
    pub fn new(
        id: impl Into<TaskId>,
        column_id: impl Into<ColumnId>,
        title: impl Into<String>,
        position: u32,
    ) -> Self {
        Self {
            id: id.into(),
            column_id: column_id.into(),
            title: title.into(),
            description: None,
            position,
            priority: Priority::default(),
            due_date: None,
            assigned_to: None,
            created_by: None,
            created_at: None,
            updated_at: None,
        }
    }
}

/// An ordered container of tasks within a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column identifier.
    pub id: ColumnId,
    /// Owning board. Columns nested in a `board.sync` snapshot omit it;
    /// `Board::normalize` fills it in from the parent.
    #[serde(default)]
    pub board_id: BoardId,
    /// Display name.
    pub name: String,
    /// Dense zero-based position among the board's columns.
    pub position: u32,
    /// Display color (CSS color string).
    #[serde(default)]
    pub color: String,
    /// Tasks ordered by position. Absent in column-only events.
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Creation instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Last modification instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Column {
    /// Creates an empty column.
    pub fn new(
        id: impl Into<ColumnId>,
        board_id: impl Into<BoardId>,
        name: impl Into<String>,
        position: u32,
    ) -> Self {
        Self {
            id: id.into(),
            board_id: board_id.into(),
            name: name.into(),
            position,
            color: String::new(),
            tasks: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }
}

/// A named collection of ordered columns belonging to a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    /// Board identifier.
    pub id: BoardId,
    /// Owning team. Omitted by some `board.sync` payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<TeamId>,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// User who created the board, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,
    /// Columns ordered by position.
    #[serde(default)]
    pub columns: Vec<Column>,
    /// Creation instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Last modification instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Board {
    /// Creates an empty board.
    pub fn new(id: impl Into<BoardId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            team_id: None,
            name: name.into(),
            description: None,
            created_by: None,
            columns: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }
}

/// A user as carried by presence events and the users endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User identifier.
    pub id: UserId,
    /// Email address.
    #[serde(default)]
    pub email: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Avatar image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl User {
    /// Creates a user that only carries an identity.
    pub fn with_id(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            email: String::new(),
            name: String::new(),
            avatar_url: None,
        }
    }
}

/// A server-pushed notification addressed to the current user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Notification identifier.
    pub id: String,
    /// Recipient.
    pub user_id: UserId,
    /// Notification kind, e.g. `task_assigned`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Headline.
    pub title: String,
    /// Optional body text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Free-form structured data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Whether the user has read it.
    #[serde(default)]
    pub read: bool,
    /// Creation instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Partial update for a task's content fields.
///
/// `Some(None)` on a double-option field clears it; `None` leaves it alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    /// New title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description, or `Some(None)` to clear.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "double_option"
    )]
    pub description: Option<Option<String>>,
    /// New priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// New due date, or `Some(None)` to clear.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "double_option"
    )]
    pub due_date: Option<Option<String>>,
    /// New assignee, or `Some(None)` to unassign.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "double_option"
    )]
    pub assigned_to: Option<Option<UserId>>,
}

impl TaskPatch {
    /// A patch carrying every content field of `task`.
    ///
    /// Used when the server sends a whole task in `task.updated`.
    #[must_use]
    pub fn from_task(task: &Task) -> Self {
        Self {
            title: Some(task.title.clone()),
            description: Some(task.description.clone()),
            priority: Some(task.priority),
            due_date: Some(task.due_date.clone()),
            assigned_to: Some(task.assigned_to.clone()),
        }
    }

    /// Returns `true` if the patch sets no field.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
            && self.assigned_to.is_none()
    }

    /// Captures the current values of the fields this patch would touch,
    /// producing the patch that undoes it.
    #[must_use]
    pub fn inverse_for(&self, task: &Task) -> Self {
        Self {
            title: self.title.as_ref().map(|_| task.title.clone()),
            description: self.description.as_ref().map(|_| task.description.clone()),
            priority: self.priority.map(|_| task.priority),
            due_date: self.due_date.as_ref().map(|_| task.due_date.clone()),
            assigned_to: self.assigned_to.as_ref().map(|_| task.assigned_to.clone()),
        }
    }

    /// Merges the set fields into `task`.
    pub fn apply(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            task.description.clone_from(description);
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(due_date) = &self.due_date {
            task.due_date.clone_from(due_date);
        }
        if let Some(assigned_to) = &self.assigned_to {
            task.assigned_to.clone_from(assigned_to);
        }
    }
}

/// Partial update for a column's display fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnPatch {
    /// New name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl ColumnPatch {
    /// A patch carrying every display field of `column`.
    #[must_use]
    pub fn from_column(column: &Column) -> Self {
        Self {
            name: Some(column.name.clone()),
            color: Some(column.color.clone()),
        }
    }

    /// Produces the patch that undoes this one on `column`.
    #[must_use]
    pub fn inverse_for(&self, column: &Column) -> Self {
        Self {
            name: self.name.as_ref().map(|_| column.name.clone()),
            color: self.color.as_ref().map(|_| column.color.clone()),
        }
    }

    /// Merges the set fields into `column`.
    pub fn apply(&self, column: &mut Column) {
        if let Some(name) = &self.name {
            column.name.clone_from(name);
        }
        if let Some(color) = &self.color {
            column.color.clone_from(color);
        }
    }
}

/// Partial update for board metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardPatch {
    /// New name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New description, or `Some(None)` to clear.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "double_option"
    )]
    pub description: Option<Option<String>>,
}

impl BoardPatch {
    /// Produces the patch that undoes this one on `board`.
    #[must_use]
    pub fn inverse_for(&self, board: &Board) -> Self {
        Self {
            name: self.name.as_ref().map(|_| board.name.clone()),
            description: self.description.as_ref().map(|_| board.description.clone()),
        }
    }

    /// Merges the set fields into `board`.
    pub fn apply(&self, board: &mut Board) {
        if let Some(name) = &self.name {
            board.name.clone_from(name);
        }
        if let Some(description) = &self.description {
            board.description.clone_from(description);
        }
    }
}

/// Serde helpers distinguishing "absent" from "explicitly null".
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S, T>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}
