//! Local user actions: optimistic store mutation followed by REST
//! persistence.
//!
//! Moves, updates and deletes are applied to the store first and recorded
//! as pending; the REST call runs afterwards. If it fails the pending op is
//! rejected, which rolls the change back when `rollback_on_rejection` is
//! set, and the error is returned to the caller. The server's broadcast of
//! the same change later confirms the op.
//!
//! Creations are not optimistic: the server assigns the id, so the entity is
//! inserted from the REST response.

use std::future::Future;
use std::sync::Arc;

use syncboard_proto::model::{
    BoardPatch, Column, ColumnId, ColumnPatch, Task, TaskId, TaskPatch, UserId,
};
use syncboard_proto::order::{self, DropTarget};

use crate::api::{BoardApi, NewColumn, NewTask, PersistenceError};
use crate::store::{LocalOp, Outcome, StoreHandle};

/// Entry point for mutations initiated by the local user.
#[derive(Debug)]
pub struct BoardActions<A> {
    store: StoreHandle,
    api: Arc<A>,
    user_id: UserId,
    rollback_on_rejection: bool,
}

impl<A> Clone for BoardActions<A> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            api: Arc::clone(&self.api),
            user_id: self.user_id.clone(),
            rollback_on_rejection: self.rollback_on_rejection,
        }
    }
}

impl<A: BoardApi> BoardActions<A> {
    /// Creates the action layer for `user_id` over `store`.
    #[must_use]
    pub const fn new(
        store: StoreHandle,
        api: Arc<A>,
        user_id: UserId,
        rollback_on_rejection: bool,
    ) -> Self {
        Self {
            store,
            api,
            user_id,
            rollback_on_rejection,
        }
    }

    /// The REST collaborator.
    #[must_use]
    pub fn api(&self) -> &A {
        &self.api
    }

    // -----------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------

    /// Moves a task to `position` (clamped) in `to_column`.
    ///
    /// Returns [`Outcome::Ignored`] without calling the server if the task
    /// or column is unknown locally.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the server rejected the move; the
    /// local change has been handled per the rollback setting by then.
    pub async fn move_task(
        &self,
        task_id: &TaskId,
        to_column: &ColumnId,
        position: u32,
    ) -> Result<Outcome, PersistenceError> {
        let op = LocalOp::MoveTask {
            task_id: task_id.clone(),
            to_column: to_column.clone(),
            position,
        };
        self.optimistic(op, self.api.move_task(task_id, to_column, position))
            .await
    }

    /// Moves a task to wherever a drop on `target` in `to_column` lands.
    ///
    /// # Errors
    ///
    /// See [`move_task`](Self::move_task).
    pub async fn drop_task(
        &self,
        task_id: &TaskId,
        to_column: &ColumnId,
        target: DropTarget<'_, TaskId>,
    ) -> Result<Outcome, PersistenceError> {
        let position = self
            .store
            .with_board(|board| {
                board
                    .column(to_column)
                    .map(|column| order::resolve_drop_position(&column.tasks, target))
            })
            .flatten();
        let Some(position) = position else {
            tracing::debug!(%to_column, "drop onto unknown column ignored");
            return Ok(Outcome::Ignored);
        };
        self.move_task(task_id, to_column, position).await
    }

    /// Updates a task's content fields.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the server rejected the update.
    pub async fn update_task(
        &self,
        task_id: &TaskId,
        patch: TaskPatch,
    ) -> Result<Outcome, PersistenceError> {
        let call = self.api.update_task(task_id, &patch);
        let op = LocalOp::UpdateTask {
            task_id: task_id.clone(),
            patch: patch.clone(),
        };
        self.optimistic(op, call).await
    }

    /// Deletes a task.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the server rejected the delete.
    pub async fn delete_task(&self, task_id: &TaskId) -> Result<Outcome, PersistenceError> {
        let op = LocalOp::DeleteTask {
            task_id: task_id.clone(),
        };
        self.optimistic(op, self.api.delete_task(task_id)).await
    }

    /// Creates a task at the end of `column_id` and inserts the server's
    /// copy into the store.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the server rejected the create.
    pub async fn create_task(
        &self,
        column_id: &ColumnId,
        title: impl Into<String>,
        description: Option<String>,
    ) -> Result<Task, PersistenceError> {
        let mut request = NewTask::titled(column_id.clone(), title, self.user_id.clone());
        request.description = description;
        let task = self.api.create_task(&request).await?;
        self.store.add_task(task.clone());
        Ok(task)
    }

    // -----------------------------------------------------------------
    // Columns
    // -----------------------------------------------------------------

    /// Moves a column to `position` (clamped).
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the server rejected the move.
    pub async fn move_column(
        &self,
        column_id: &ColumnId,
        position: u32,
    ) -> Result<Outcome, PersistenceError> {
        let op = LocalOp::MoveColumn {
            column_id: column_id.clone(),
            position,
        };
        self.optimistic(op, self.api.move_column(column_id, position))
            .await
    }

    /// Moves a column to wherever a drop on `target` lands.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the server rejected the move.
    pub async fn drop_column(
        &self,
        column_id: &ColumnId,
        target: DropTarget<'_, ColumnId>,
    ) -> Result<Outcome, PersistenceError> {
        let Some(position) = self
            .store
            .with_board(|board| order::resolve_drop_position(&board.columns, target))
        else {
            return Ok(Outcome::Ignored);
        };
        self.move_column(column_id, position).await
    }

    /// Updates a column's display fields.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the server rejected the update.
    pub async fn update_column(
        &self,
        column_id: &ColumnId,
        patch: ColumnPatch,
    ) -> Result<Outcome, PersistenceError> {
        let call = self.api.update_column(column_id, &patch);
        let op = LocalOp::UpdateColumn {
            column_id: column_id.clone(),
            patch: patch.clone(),
        };
        self.optimistic(op, call).await
    }

    /// Deletes a column with its tasks.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the server rejected the delete.
    pub async fn delete_column(&self, column_id: &ColumnId) -> Result<Outcome, PersistenceError> {
        let op = LocalOp::DeleteColumn {
            column_id: column_id.clone(),
        };
        self.optimistic(op, self.api.delete_column(column_id)).await
    }

    /// Appends a column to the loaded board and inserts the server's copy.
    ///
    /// Returns `None` without calling the server when no board is loaded.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the server rejected the create.
    pub async fn create_column(
        &self,
        name: impl Into<String>,
        color: Option<String>,
    ) -> Result<Option<Column>, PersistenceError> {
        let Some((board_id, len)) = self
            .store
            .with_board(|board| (board.id.clone(), board.columns.len()))
        else {
            return Ok(None);
        };
        let request = NewColumn {
            board_id,
            name: name.into(),
            position: Some(order::to_position(len)),
            color,
        };
        let column = self.api.create_column(&request).await?;
        self.store.add_column(column.clone());
        Ok(Some(column))
    }

    // -----------------------------------------------------------------
    // Board
    // -----------------------------------------------------------------

    /// Updates the loaded board's metadata.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the server rejected the update.
    pub async fn update_board(&self, patch: BoardPatch) -> Result<Outcome, PersistenceError> {
        let Some(board_id) = self.store.board_id() else {
            return Ok(Outcome::Ignored);
        };
        let call = self.api.update_board(&board_id, &patch);
        self.optimistic(LocalOp::UpdateBoard { patch: patch.clone() }, call)
            .await
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    /// Applies `op` locally, then awaits `persist`.
    ///
    /// `persist` is lazy; nothing reaches the server when the local op is
    /// ignored.
    async fn optimistic(
        &self,
        op: LocalOp,
        persist: impl Future<Output = Result<(), PersistenceError>>,
    ) -> Result<Outcome, PersistenceError> {
        let Some(op_id) = self.store.apply_local(op) else {
            return Ok(Outcome::Ignored);
        };
        match persist.await {
            Ok(()) => Ok(Outcome::Applied),
            Err(e) => {
                tracing::warn!(%op_id, err = %e, "persisting local change failed");
                self.store.reject(op_id, self.rollback_on_rejection);
                Err(e)
            }
        }
    }
}
