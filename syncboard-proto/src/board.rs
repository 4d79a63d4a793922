//! Structural operations on a [`Board`] that keep positions dense.
//!
//! Every method either applies completely or returns a [`StateError`]
//! without touching the board. Column positions are `0..n` and each
//! column's task positions are `0..m` after every successful call.

use crate::model::{Board, BoardPatch, Column, ColumnId, ColumnPatch, Task, TaskId, TaskPatch};
use crate::order;

/// An operation referenced an entity that is not on the board.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// No column with this id.
    #[error("column not found: {0}")]
    ColumnNotFound(ColumnId),
    /// No task with this id.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
}

/// Where a task sat before it was moved or removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSlot {
    /// Column that held the task.
    pub column_id: ColumnId,
    /// Position within that column.
    pub position: u32,
}

impl Board {
    /// Sorts columns and tasks by position, renumbers both levels densely,
    /// and makes every task's `column_id` agree with its container.
    ///
    /// Applied to every snapshot before it becomes the live board.
    pub fn normalize(&mut self) {
        order::normalize(&mut self.columns);
        for column in &mut self.columns {
            column.board_id.clone_from(&self.id);
            order::normalize(&mut column.tasks);
            for task in &mut column.tasks {
                task.column_id.clone_from(&column.id);
            }
        }
    }

    /// Returns `true` if every sibling sequence is densely numbered.
    #[must_use]
    pub fn is_dense(&self) -> bool {
        order::is_dense(&self.columns)
            && self
                .columns
                .iter()
                .all(|column| order::is_dense(&column.tasks))
    }

    /// Looks up a column.
    #[must_use]
    pub fn column(&self, id: &ColumnId) -> Option<&Column> {
        self.columns.iter().find(|column| &column.id == id)
    }

    fn column_index(&self, id: &ColumnId) -> Result<usize, StateError> {
        order::index_of(&self.columns, id).ok_or_else(|| StateError::ColumnNotFound(id.clone()))
    }

    /// Returns `(column index, task index)` of the task, wherever it is.
    #[must_use]
    pub fn locate_task(&self, id: &TaskId) -> Option<(usize, usize)> {
        self.columns.iter().enumerate().find_map(|(ci, column)| {
            order::index_of(&column.tasks, id).map(|ti| (ci, ti))
        })
    }

    /// Looks up a task in any column.
    #[must_use]
    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.locate_task(id)
            .map(|(ci, ti)| &self.columns[ci].tasks[ti])
    }

    /// Total number of tasks across all columns.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.columns.iter().map(|column| column.tasks.len()).sum()
    }

    /// Inserts a column at its carried position (clamped).
    ///
    /// If a column with the same id already exists it is replaced in place
    /// of being duplicated; its tasks are kept when the incoming column
    /// carries none (column events omit tasks).
    pub fn insert_column(&mut self, mut column: Column) {
        if let Some(existing) = order::remove(&mut self.columns, &column.id)
            && column.tasks.is_empty()
        {
            column.tasks = existing.tasks;
        }
        column.board_id.clone_from(&self.id);
        order::normalize(&mut column.tasks);
        for task in &mut column.tasks {
            task.column_id.clone_from(&column.id);
        }
        let position = column.position;
        order::insert_at(&mut self.columns, column, position);
    }

    /// Inserts a task into its carried column at its carried position
    /// (clamped). An existing task with the same id is removed first.
    ///
    /// # Errors
    ///
    /// [`StateError::ColumnNotFound`] if the task's column is not on the board.
    pub fn insert_task(&mut self, task: Task) -> Result<(), StateError> {
        let target = self.column_index(&task.column_id)?;
        if let Some((ci, _)) = self.locate_task(&task.id) {
            order::remove(&mut self.columns[ci].tasks, &task.id);
        }
        let position = task.position;
        order::insert_at(&mut self.columns[target].tasks, task, position);
        Ok(())
    }

    /// Merges a patch into a task.
    ///
    /// # Errors
    ///
    /// [`StateError::TaskNotFound`] if the task is not on the board.
    pub fn update_task(&mut self, id: &TaskId, patch: &TaskPatch) -> Result<(), StateError> {
        let (ci, ti) = self
            .locate_task(id)
            .ok_or_else(|| StateError::TaskNotFound(id.clone()))?;
        patch.apply(&mut self.columns[ci].tasks[ti]);
        Ok(())
    }

    /// Merges a patch into a column.
    ///
    /// # Errors
    ///
    /// [`StateError::ColumnNotFound`] if the column is not on the board.
    pub fn update_column(&mut self, id: &ColumnId, patch: &ColumnPatch) -> Result<(), StateError> {
        let ci = self.column_index(id)?;
        patch.apply(&mut self.columns[ci]);
        Ok(())
    }

    /// Merges a patch into the board metadata.
    pub fn update_meta(&mut self, patch: &BoardPatch) {
        patch.apply(self);
    }

    /// Moves a task to `position` in column `to`, renumbering the source and
    /// destination columns. Works for same-column reorders too.
    ///
    /// The task is looked up in `from` first; if it is not there (an earlier
    /// delivery or an optimistic local move already relocated it) it is
    /// taken from whichever column currently holds it, so replays converge.
    ///
    /// Returns where the task was before the move.
    ///
    /// # Errors
    ///
    /// [`StateError::ColumnNotFound`] if `to` does not exist, or
    /// [`StateError::TaskNotFound`] if the task is nowhere on the board.
    pub fn move_task(
        &mut self,
        id: &TaskId,
        from: &ColumnId,
        to: &ColumnId,
        position: u32,
    ) -> Result<TaskSlot, StateError> {
        let target = self.column_index(to)?;
        let source = match self.column_index(from) {
            Ok(ci) if order::index_of(&self.columns[ci].tasks, id).is_some() => ci,
            _ => {
                self.locate_task(id)
                    .ok_or_else(|| StateError::TaskNotFound(id.clone()))?
                    .0
            }
        };

        let ti = order::index_of(&self.columns[source].tasks, id)
            .ok_or_else(|| StateError::TaskNotFound(id.clone()))?;
        let previous = TaskSlot {
            column_id: self.columns[source].id.clone(),
            position: self.columns[source].tasks[ti].position,
        };

        if source == target {
            order::reorder(&mut self.columns[source].tasks, id, position);
        } else {
            let mut task = self.columns[source].tasks.remove(ti);
            order::renumber(&mut self.columns[source].tasks);
            task.column_id.clone_from(&self.columns[target].id);
            order::insert_at(&mut self.columns[target].tasks, task, position);
        }
        Ok(previous)
    }

    /// Moves a column to `position`, renumbering all columns.
    ///
    /// Returns the column's previous position.
    ///
    /// # Errors
    ///
    /// [`StateError::ColumnNotFound`] if the column is not on the board.
    pub fn move_column(&mut self, id: &ColumnId, position: u32) -> Result<u32, StateError> {
        let ci = self.column_index(id)?;
        let previous = self.columns[ci].position;
        order::reorder(&mut self.columns, id, position);
        Ok(previous)
    }

    /// Removes a task and renumbers its former column.
    ///
    /// Returns the removed task with its position as it was before removal.
    ///
    /// # Errors
    ///
    /// [`StateError::TaskNotFound`] if the task is not on the board.
    pub fn remove_task(&mut self, id: &TaskId) -> Result<Task, StateError> {
        let (ci, _) = self
            .locate_task(id)
            .ok_or_else(|| StateError::TaskNotFound(id.clone()))?;
        order::remove(&mut self.columns[ci].tasks, id)
            .ok_or_else(|| StateError::TaskNotFound(id.clone()))
    }

    /// Removes a column (and its tasks) and renumbers the survivors.
    ///
    /// # Errors
    ///
    /// [`StateError::ColumnNotFound`] if the column is not on the board.
    pub fn remove_column(&mut self, id: &ColumnId) -> Result<Column, StateError> {
        order::remove(&mut self.columns, id).ok_or_else(|| StateError::ColumnNotFound(id.clone()))
    }
}
