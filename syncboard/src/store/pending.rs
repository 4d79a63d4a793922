//! Optimistic local operations and their inverses.

use syncboard_proto::board::{StateError, TaskSlot};
use syncboard_proto::event::ServerEvent;
use syncboard_proto::model::{
    Board, BoardId, BoardPatch, Column, ColumnId, ColumnPatch, Task, TaskId, TaskPatch,
};
use uuid::Uuid;

/// Identifier of a pending local op.
pub type OpId = Uuid;

/// Kind of a locally initiated mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    UpdateTask,
    MoveTask,
    DeleteTask,
    UpdateColumn,
    MoveColumn,
    DeleteColumn,
    UpdateBoard,
}

/// Entity a pending op touches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Task(TaskId),
    Column(ColumnId),
    Board(BoardId),
}

/// A mutation the local user initiated.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalOp {
    UpdateTask { task_id: TaskId, patch: TaskPatch },
    MoveTask {
        task_id: TaskId,
        to_column: ColumnId,
        position: u32,
    },
    DeleteTask { task_id: TaskId },
    UpdateColumn {
        column_id: ColumnId,
        patch: ColumnPatch,
    },
    MoveColumn { column_id: ColumnId, position: u32 },
    DeleteColumn { column_id: ColumnId },
    UpdateBoard { patch: BoardPatch },
}

impl LocalOp {
    /// The op's kind.
    #[must_use]
    pub const fn kind(&self) -> OpKind {
        match self {
            Self::UpdateTask { .. } => OpKind::UpdateTask,
            Self::MoveTask { .. } => OpKind::MoveTask,
            Self::DeleteTask { .. } => OpKind::DeleteTask,
            Self::UpdateColumn { .. } => OpKind::UpdateColumn,
            Self::MoveColumn { .. } => OpKind::MoveColumn,
            Self::DeleteColumn { .. } => OpKind::DeleteColumn,
            Self::UpdateBoard { .. } => OpKind::UpdateBoard,
        }
    }
}

/// State needed to undo an applied local op.
#[derive(Debug, Clone, PartialEq)]
pub enum Inverse {
    UpdateTask { task_id: TaskId, patch: TaskPatch },
    MoveTask { task_id: TaskId, slot: TaskSlot },
    RestoreTask { task: Task },
    UpdateColumn {
        column_id: ColumnId,
        patch: ColumnPatch,
    },
    MoveColumn { column_id: ColumnId, position: u32 },
    RestoreColumn { column: Column },
    UpdateBoard { patch: BoardPatch },
}

impl Inverse {
    /// Undoes the op on `board`.
    ///
    /// # Errors
    ///
    /// A [`StateError`] if the entities the undo needs are gone, e.g. a
    /// remote user deleted the column a task should return to.
    pub fn apply(&self, board: &mut Board) -> Result<(), StateError> {
        match self {
            Self::UpdateTask { task_id, patch } => board.update_task(task_id, patch),
            Self::MoveTask { task_id, slot } => {
                let (ci, _) = board
                    .locate_task(task_id)
                    .ok_or_else(|| StateError::TaskNotFound(task_id.clone()))?;
                let current = board.columns[ci].id.clone();
                board
                    .move_task(task_id, &current, &slot.column_id, slot.position)
                    .map(|_| ())
            }
            Self::RestoreTask { task } => board.insert_task(task.clone()),
            Self::UpdateColumn { column_id, patch } => board.update_column(column_id, patch),
            Self::MoveColumn {
                column_id,
                position,
            } => board.move_column(column_id, *position).map(|_| ()),
            Self::RestoreColumn { column } => {
                board.insert_column(column.clone());
                Ok(())
            }
            Self::UpdateBoard { patch } => {
                board.update_meta(patch);
                Ok(())
            }
        }
    }
}

/// A local op awaiting confirmation by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOp {
    /// Time-ordered id assigned when the op was applied.
    pub op_id: OpId,
    /// What was done.
    pub kind: OpKind,
    /// To what.
    pub entity: EntityRef,
    /// How to undo it.
    pub inverse: Inverse,
}

impl PendingOp {
    /// The `(kind, entity)` key an authoritative event confirms, if any.
    ///
    /// Creations are not applied optimistically and therefore confirm
    /// nothing.
    #[must_use]
    pub fn confirmation_key(event: &ServerEvent) -> Option<(OpKind, EntityRef)> {
        let key = match event {
            ServerEvent::TaskUpdated { task, .. } => {
                (OpKind::UpdateTask, EntityRef::Task(task.id.clone()))
            }
            ServerEvent::TaskMoved { task, .. } => {
                (OpKind::MoveTask, EntityRef::Task(task.id.clone()))
            }
            ServerEvent::TaskDeleted { task_id, .. } => {
                (OpKind::DeleteTask, EntityRef::Task(task_id.clone()))
            }
            ServerEvent::ColumnUpdated { column, .. } => {
                (OpKind::UpdateColumn, EntityRef::Column(column.id.clone()))
            }
            ServerEvent::ColumnMoved { column, .. } => {
                (OpKind::MoveColumn, EntityRef::Column(column.id.clone()))
            }
            ServerEvent::ColumnDeleted { column_id, .. } => {
                (OpKind::DeleteColumn, EntityRef::Column(column_id.clone()))
            }
            _ => return None,
        };
        Some(key)
    }
}

/// Applies `op` to `board` and returns the pending entry describing it.
pub(super) fn apply(board: &mut Board, op: LocalOp) -> Result<PendingOp, StateError> {
    let kind = op.kind();
    let (entity, inverse) = match op {
        LocalOp::UpdateTask { task_id, patch } => {
            let task = board
                .task(&task_id)
                .ok_or_else(|| StateError::TaskNotFound(task_id.clone()))?;
            let undo = patch.inverse_for(task);
            board.update_task(&task_id, &patch)?;
            (
                EntityRef::Task(task_id.clone()),
                Inverse::UpdateTask {
                    task_id,
                    patch: undo,
                },
            )
        }
        LocalOp::MoveTask {
            task_id,
            to_column,
            position,
        } => {
            let (ci, _) = board
                .locate_task(&task_id)
                .ok_or_else(|| StateError::TaskNotFound(task_id.clone()))?;
            let from = board.columns[ci].id.clone();
            let slot = board.move_task(&task_id, &from, &to_column, position)?;
            (
                EntityRef::Task(task_id.clone()),
                Inverse::MoveTask { task_id, slot },
            )
        }
        LocalOp::DeleteTask { task_id } => {
            let task = board.remove_task(&task_id)?;
            (EntityRef::Task(task_id), Inverse::RestoreTask { task })
        }
        LocalOp::UpdateColumn { column_id, patch } => {
            let column = board
                .column(&column_id)
                .ok_or_else(|| StateError::ColumnNotFound(column_id.clone()))?;
            let undo = patch.inverse_for(column);
            board.update_column(&column_id, &patch)?;
            (
                EntityRef::Column(column_id.clone()),
                Inverse::UpdateColumn {
                    column_id,
                    patch: undo,
                },
            )
        }
        LocalOp::MoveColumn {
            column_id,
            position,
        } => {
            let previous = board.move_column(&column_id, position)?;
            (
                EntityRef::Column(column_id.clone()),
                Inverse::MoveColumn {
                    column_id,
                    position: previous,
                },
            )
        }
        LocalOp::DeleteColumn { column_id } => {
            let column = board.remove_column(&column_id)?;
            (
                EntityRef::Column(column_id),
                Inverse::RestoreColumn { column },
            )
        }
        LocalOp::UpdateBoard { patch } => {
            let undo = patch.inverse_for(board);
            board.update_meta(&patch);
            (
                EntityRef::Board(board.id.clone()),
                Inverse::UpdateBoard { patch: undo },
            )
        }
    };
    Ok(PendingOp {
        op_id: Uuid::now_v7(),
        kind,
        entity,
        inverse,
    })
}
