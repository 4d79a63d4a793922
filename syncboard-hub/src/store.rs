//! In-memory board data served by the hub.
//!
//! Every mutation goes through [`BoardStore`] and yields a [`Change`]: the
//! event the board's room should hear about. Callers decide whether to
//! publish it; the REST handlers and the WebSocket command handler always
//! do.

use std::collections::HashMap;

use chrono::Utc;
use serde::Deserialize;
use syncboard_proto::board::StateError;
use syncboard_proto::event::ServerEvent;
use syncboard_proto::model::{
    Board, BoardId, BoardPatch, Column, ColumnId, ColumnPatch, Priority, Task, TaskId, TaskPatch,
    TeamId, UserId,
};
use tokio::sync::RwLock;

/// Errors returned by hub operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// No board with this id.
    #[error("board not found: {0}")]
    BoardNotFound(BoardId),
    /// No column with this id.
    #[error("column not found: {0}")]
    ColumnNotFound(ColumnId),
    /// No task with this id.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    /// The request is well-formed but not acceptable.
    #[error("{0}")]
    Validation(String),
}

impl HubError {
    /// Machine-readable code sent to clients.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BoardNotFound(_) | Self::ColumnNotFound(_) | Self::TaskNotFound(_) => {
                "NOT_FOUND"
            }
            Self::Validation(_) => "VALIDATION_ERROR",
        }
    }
}

impl From<StateError> for HubError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::ColumnNotFound(id) => Self::ColumnNotFound(id),
            StateError::TaskNotFound(id) => Self::TaskNotFound(id),
        }
    }
}

/// A committed mutation and the room it concerns.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// Board whose room should receive the event.
    pub board_id: BoardId,
    /// Event describing the mutation.
    pub event: ServerEvent,
}

/// Body of a board creation request.
#[derive(Debug, Clone, Deserialize)]
pub struct BoardDraft {
    /// Owning team.
    pub team_id: TeamId,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Body of a column creation request.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnDraft {
    /// Owning board.
    pub board_id: BoardId,
    /// Display name.
    pub name: String,
    /// Desired position; appends when absent.
    #[serde(default)]
    pub position: Option<u32>,
    /// Display color.
    #[serde(default)]
    pub color: Option<String>,
}

/// Body of a task creation request. The task is appended to its column.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskDraft {
    /// Target column.
    pub column_id: ColumnId,
    /// Title.
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<UserId>,
}

impl TaskDraft {
    /// A draft with only a title.
    pub fn titled(column_id: impl Into<ColumnId>, title: impl Into<String>) -> Self {
        Self {
            column_id: column_id.into(),
            title: title.into(),
            description: None,
            priority: None,
            due_date: None,
            assigned_to: None,
        }
    }
}

/// Column color used when a creation request carries none.
const DEFAULT_COLUMN_COLOR: &str = "#6b7280";

fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// Thread-safe collection of boards keyed by id.
#[derive(Default)]
pub struct BoardStore {
    boards: RwLock<HashMap<BoardId, Board>>,
}

impl BoardStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts (or replaces) a board, normalizing its positions.
    pub async fn insert(&self, mut board: Board) {
        board.normalize();
        self.boards.write().await.insert(board.id.clone(), board);
    }

    /// Returns a snapshot of the board.
    pub async fn get(&self, id: &BoardId) -> Option<Board> {
        self.boards.read().await.get(id).cloned()
    }

    /// Boards owned by `team_id`, sorted by name.
    pub async fn list_team(&self, team_id: &TeamId) -> Vec<Board> {
        let mut boards: Vec<Board> = self
            .boards
            .read()
            .await
            .values()
            .filter(|board| board.team_id.as_ref() == Some(team_id))
            .cloned()
            .collect();
        boards.sort_by(|a, b| a.name.cmp(&b.name));
        boards
    }

    /// Number of boards held.
    pub async fn len(&self) -> usize {
        self.boards.read().await.len()
    }

    /// Returns `true` if no boards are held.
    pub async fn is_empty(&self) -> bool {
        self.boards.read().await.is_empty()
    }

    /// Creates an empty board.
    ///
    /// # Errors
    ///
    /// [`HubError::Validation`] if the name is blank.
    pub async fn create_board(&self, draft: BoardDraft, user: &UserId) -> Result<Board, HubError> {
        let name = required(draft.name, "board name")?;
        let now = Utc::now();
        let mut board = Board::new(new_id(), name);
        board.team_id = Some(draft.team_id);
        board.description = draft.description;
        board.created_by = Some(user.clone());
        board.created_at = Some(now);
        board.updated_at = Some(now);
        self.boards
            .write()
            .await
            .insert(board.id.clone(), board.clone());
        Ok(board)
    }

    /// Updates board metadata. The room receives a fresh snapshot.
    ///
    /// # Errors
    ///
    /// [`HubError::BoardNotFound`] if the board does not exist.
    pub async fn update_board(
        &self,
        id: &BoardId,
        patch: &BoardPatch,
    ) -> Result<(Board, Change), HubError> {
        let mut boards = self.boards.write().await;
        let board = boards
            .get_mut(id)
            .ok_or_else(|| HubError::BoardNotFound(id.clone()))?;
        board.update_meta(patch);
        board.updated_at = Some(Utc::now());
        let snapshot = board.clone();
        drop(boards);
        let change = Change {
            board_id: id.clone(),
            event: ServerEvent::BoardSync {
                board: snapshot.clone(),
            },
        };
        Ok((snapshot, change))
    }

    /// Deletes a board with all its columns and tasks.
    ///
    /// # Errors
    ///
    /// [`HubError::BoardNotFound`] if the board does not exist.
    pub async fn delete_board(&self, id: &BoardId) -> Result<Board, HubError> {
        self.boards
            .write()
            .await
            .remove(id)
            .ok_or_else(|| HubError::BoardNotFound(id.clone()))
    }

    /// Creates a column at the requested position (clamped), or at the end.
    ///
    /// # Errors
    ///
    /// [`HubError::Validation`] for a blank name, [`HubError::BoardNotFound`]
    /// if the board does not exist.
    pub async fn create_column(
        &self,
        draft: ColumnDraft,
        user: &UserId,
    ) -> Result<(Column, Change), HubError> {
        let name = required(draft.name, "column name")?;
        let mut boards = self.boards.write().await;
        let board = boards
            .get_mut(&draft.board_id)
            .ok_or_else(|| HubError::BoardNotFound(draft.board_id.clone()))?;

        let now = Utc::now();
        let appended = syncboard_proto::order::to_position(board.columns.len());
        let mut column = Column::new(new_id(), board.id.clone(), name, draft.position.unwrap_or(appended));
        column.color = draft
            .color
            .unwrap_or_else(|| DEFAULT_COLUMN_COLOR.to_string());
        column.created_at = Some(now);
        column.updated_at = Some(now);

        let column_id = column.id.clone();
        board.insert_column(column);
        let column = column_event_copy(board, &column_id)?;
        let change = Change {
            board_id: board.id.clone(),
            event: ServerEvent::ColumnCreated {
                column: column.clone(),
                user_id: user.clone(),
            },
        };
        Ok((column, change))
    }

    /// Updates a column's display fields.
    ///
    /// # Errors
    ///
    /// [`HubError::ColumnNotFound`] if no board holds the column.
    pub async fn update_column(
        &self,
        id: &ColumnId,
        patch: &ColumnPatch,
        user: &UserId,
    ) -> Result<(Column, Change), HubError> {
        let mut boards = self.boards.write().await;
        let board = board_with_column(&mut boards, id)?;
        board.update_column(id, patch)?;
        touch_column(board, id);
        let column = column_event_copy(board, id)?;
        let change = Change {
            board_id: board.id.clone(),
            event: ServerEvent::ColumnUpdated {
                column: column.clone(),
                user_id: user.clone(),
            },
        };
        Ok((column, change))
    }

    /// Moves a column to `position` (clamped).
    ///
    /// # Errors
    ///
    /// [`HubError::ColumnNotFound`] if no board holds the column.
    pub async fn move_column(
        &self,
        id: &ColumnId,
        position: u32,
        user: &UserId,
    ) -> Result<(Column, Change), HubError> {
        let mut boards = self.boards.write().await;
        let board = board_with_column(&mut boards, id)?;
        board.move_column(id, position)?;
        let column = column_event_copy(board, id)?;
        let change = Change {
            board_id: board.id.clone(),
            event: ServerEvent::ColumnMoved {
                column: column.clone(),
                user_id: user.clone(),
            },
        };
        Ok((column, change))
    }

    /// Deletes a column and its tasks.
    ///
    /// # Errors
    ///
    /// [`HubError::ColumnNotFound`] if no board holds the column.
    pub async fn delete_column(&self, id: &ColumnId, user: &UserId) -> Result<Change, HubError> {
        let mut boards = self.boards.write().await;
        let board = board_with_column(&mut boards, id)?;
        board.remove_column(id)?;
        Ok(Change {
            board_id: board.id.clone(),
            event: ServerEvent::ColumnDeleted {
                column_id: id.clone(),
                user_id: user.clone(),
            },
        })
    }

    /// Appends a task to its column.
    ///
    /// # Errors
    ///
    /// [`HubError::Validation`] for a blank title, [`HubError::ColumnNotFound`]
    /// if no board holds the column.
    pub async fn create_task(
        &self,
        draft: TaskDraft,
        user: &UserId,
    ) -> Result<(Task, Change), HubError> {
        let title = required(draft.title, "task title")?;
        let mut boards = self.boards.write().await;
        let board = board_with_column(&mut boards, &draft.column_id)?;

        let position = board
            .column(&draft.column_id)
            .map_or(0, |column| syncboard_proto::order::to_position(column.tasks.len()));
        let now = Utc::now();
        let mut task = Task::new(new_id(), draft.column_id, title, position);
        task.description = draft.description;
        task.priority = draft.priority.unwrap_or_default();
        task.due_date = draft.due_date;
        task.assigned_to = draft.assigned_to;
        task.created_by = Some(user.clone());
        task.created_at = Some(now);
        task.updated_at = Some(now);

        let task_id = task.id.clone();
        board.insert_task(task)?;
        let task = task_copy(board, &task_id)?;
        let change = Change {
            board_id: board.id.clone(),
            event: ServerEvent::TaskCreated {
                task: task.clone(),
                user_id: user.clone(),
            },
        };
        Ok((task, change))
    }

    /// Updates a task's content fields.
    ///
    /// # Errors
    ///
    /// [`HubError::TaskNotFound`] if no board holds the task.
    pub async fn update_task(
        &self,
        id: &TaskId,
        patch: &TaskPatch,
        user: &UserId,
    ) -> Result<(Task, Change), HubError> {
        let mut boards = self.boards.write().await;
        let board = board_with_task(&mut boards, id)?;
        board.update_task(id, patch)?;
        if let Some((ci, ti)) = board.locate_task(id) {
            board.columns[ci].tasks[ti].updated_at = Some(Utc::now());
        }
        let task = task_copy(board, id)?;
        let change = Change {
            board_id: board.id.clone(),
            event: ServerEvent::TaskUpdated {
                task: task.clone(),
                user_id: user.clone(),
            },
        };
        Ok((task, change))
    }

    /// Moves a task to `position` (clamped) in `column_id`, which must be on
    /// the same board.
    ///
    /// # Errors
    ///
    /// [`HubError::TaskNotFound`] or [`HubError::ColumnNotFound`].
    pub async fn move_task(
        &self,
        id: &TaskId,
        column_id: &ColumnId,
        position: u32,
        user: &UserId,
    ) -> Result<(Task, Change), HubError> {
        let mut boards = self.boards.write().await;
        let board = board_with_task(&mut boards, id)?;
        let from = board
            .locate_task(id)
            .map(|(ci, _)| board.columns[ci].id.clone())
            .ok_or_else(|| HubError::TaskNotFound(id.clone()))?;
        let previous = board.move_task(id, &from, column_id, position)?;
        let task = task_copy(board, id)?;
        let change = Change {
            board_id: board.id.clone(),
            event: ServerEvent::TaskMoved {
                task: task.clone(),
                from_column_id: previous.column_id,
                user_id: user.clone(),
            },
        };
        Ok((task, change))
    }

    /// Deletes a task.
    ///
    /// # Errors
    ///
    /// [`HubError::TaskNotFound`] if no board holds the task.
    pub async fn delete_task(&self, id: &TaskId, user: &UserId) -> Result<Change, HubError> {
        let mut boards = self.boards.write().await;
        let board = board_with_task(&mut boards, id)?;
        board.remove_task(id)?;
        Ok(Change {
            board_id: board.id.clone(),
            event: ServerEvent::TaskDeleted {
                task_id: id.clone(),
                user_id: user.clone(),
            },
        })
    }
}

fn required(value: String, what: &str) -> Result<String, HubError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(HubError::Validation(format!("{what} must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn board_with_column<'a>(
    boards: &'a mut HashMap<BoardId, Board>,
    id: &ColumnId,
) -> Result<&'a mut Board, HubError> {
    boards
        .values_mut()
        .find(|board| board.column(id).is_some())
        .ok_or_else(|| HubError::ColumnNotFound(id.clone()))
}

fn board_with_task<'a>(
    boards: &'a mut HashMap<BoardId, Board>,
    id: &TaskId,
) -> Result<&'a mut Board, HubError> {
    boards
        .values_mut()
        .find(|board| board.locate_task(id).is_some())
        .ok_or_else(|| HubError::TaskNotFound(id.clone()))
}

fn touch_column(board: &mut Board, id: &ColumnId) {
    if let Some(column) = board.columns.iter_mut().find(|column| &column.id == id) {
        column.updated_at = Some(Utc::now());
    }
}

/// Column as carried by column events: without its tasks.
fn column_event_copy(board: &Board, id: &ColumnId) -> Result<Column, HubError> {
    let column = board
        .column(id)
        .ok_or_else(|| HubError::ColumnNotFound(id.clone()))?;
    Ok(Column {
        tasks: Vec::new(),
        ..column.clone()
    })
}

fn task_copy(board: &Board, id: &TaskId) -> Result<Task, HubError> {
    board
        .task(id)
        .cloned()
        .ok_or_else(|| HubError::TaskNotFound(id.clone()))
}

/// A small board for trying the client against a fresh hub.
#[must_use]
pub fn demo_board() -> Board {
    let mut board = Board::new("demo", "Demo board");
    board.team_id = Some(TeamId::new("demo-team"));
    board.description = Some("Seeded by syncboard-hub --seed-demo".to_string());

    let columns = [
        ("todo", "To Do", "#6b7280"),
        ("doing", "In Progress", "#3b82f6"),
        ("done", "Done", "#10b981"),
    ];
    for (position, (id, name, color)) in (0u32..).zip(columns) {
        let mut column = Column::new(id, "demo", name, position);
        column.color = color.to_string();
        board.columns.push(column);
    }

    let tasks = [
        ("todo", "Write the onboarding guide", Priority::Medium),
        ("todo", "Triage bug reports", Priority::High),
        ("doing", "Ship drag-and-drop", Priority::Urgent),
        ("done", "Set up the hub", Priority::Low),
    ];
    for (index, (column_id, title, priority)) in tasks.into_iter().enumerate() {
        let Some(column) = board.columns.iter_mut().find(|c| c.id.as_str() == column_id) else {
            continue;
        };
        let position = syncboard_proto::order::to_position(column.tasks.len());
        let mut task = Task::new(format!("task-{}", index + 1), column_id, title, position);
        task.priority = priority;
        column.tasks.push(task);
    }
    board
}
