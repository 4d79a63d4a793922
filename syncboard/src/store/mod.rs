//! In-memory board state shared by the event handlers and local actions.
//!
//! One [`StoreHandle`] exists per client. Remote events and local optimistic
//! actions call the same operations and converge to the same shape because
//! every structural change renumbers positions densely.
//!
//! Mutations referencing an unknown entity are silent no-ops reported as
//! [`Outcome::Ignored`]. Readers take the lock for the duration of a query
//! and therefore never observe a half-applied mutation.
//!
//! Local mutations go through [`StoreHandle::apply_local`], which records a
//! [`PendingOp`] carrying the inverse of the change. The op is confirmed by
//! the matching server event or reverted with [`StoreHandle::reject`] when
//! the backing REST call fails.

mod pending;

use std::sync::Arc;

use parking_lot::RwLock;
use syncboard_proto::model::{
    Board, BoardId, BoardPatch, Column, ColumnId, ColumnPatch, Task, TaskId, TaskPatch,
};
use tokio::sync::watch;

pub use pending::{EntityRef, Inverse, LocalOp, OpId, OpKind, PendingOp};
pub use syncboard_proto::board::StateError;

/// Most unconfirmed local ops kept. Past this the oldest are dropped; they
/// were persisted already and only their echo is missing.
pub const MAX_PENDING_OPS: usize = 256;

/// Result of a store mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The board changed.
    Applied,
    /// Nothing to do: no board loaded, or an unknown id was referenced.
    Ignored,
}

impl Outcome {
    /// Returns `true` for [`Outcome::Applied`].
    #[must_use]
    pub const fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

#[derive(Debug, Default)]
struct BoardStore {
    board: Option<Board>,
    pending: Vec<PendingOp>,
}

/// Shared handle to the board store. Cheap to clone.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    inner: Arc<RwLock<BoardStore>>,
    revision: Arc<watch::Sender<u64>>,
}

impl Default for StoreHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreHandle {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(RwLock::new(BoardStore::default())),
            revision: Arc::new(revision),
        }
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    /// Copy of the current board.
    #[must_use]
    pub fn board(&self) -> Option<Board> {
        self.inner.read().board.clone()
    }

    /// Runs `f` against the current board without cloning it.
    pub fn with_board<R>(&self, f: impl FnOnce(&Board) -> R) -> Option<R> {
        self.inner.read().board.as_ref().map(f)
    }

    /// Id of the loaded board.
    #[must_use]
    pub fn board_id(&self) -> Option<BoardId> {
        self.with_board(|board| board.id.clone())
    }

    /// Copy of a column, tasks included.
    #[must_use]
    pub fn column(&self, id: &ColumnId) -> Option<Column> {
        self.with_board(|board| board.column(id).cloned()).flatten()
    }

    /// Copy of a task.
    #[must_use]
    pub fn task(&self, id: &TaskId) -> Option<Task> {
        self.with_board(|board| board.task(id).cloned()).flatten()
    }

    /// Column and position currently holding a task.
    #[must_use]
    pub fn locate_task(&self, id: &TaskId) -> Option<(ColumnId, u32)> {
        self.with_board(|board| {
            board
                .task(id)
                .map(|task| (task.column_id.clone(), task.position))
        })
        .flatten()
    }

    /// Local operations awaiting confirmation, oldest first.
    #[must_use]
    pub fn pending_ops(&self) -> Vec<PendingOp> {
        self.inner.read().pending.clone()
    }

    /// Number of applied mutations since creation.
    #[must_use]
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Receiver that changes after every applied mutation.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    // -----------------------------------------------------------------
    // Wholesale replacement
    // -----------------------------------------------------------------

    /// Replaces local state with an authoritative snapshot.
    ///
    /// The snapshot is normalized on the way in, and every pending local
    /// op is dropped since the snapshot already reflects the server's view.
    pub fn sync_board(&self, mut board: Board) {
        board.normalize();
        {
            let mut store = self.inner.write();
            if !store.pending.is_empty() {
                tracing::debug!(
                    dropped = store.pending.len(),
                    "snapshot supersedes pending ops"
                );
            }
            store.pending.clear();
            tracing::info!(
                board_id = %board.id,
                columns = board.columns.len(),
                tasks = board.task_count(),
                "board synced"
            );
            store.board = Some(board);
        }
        self.bump();
    }

    /// Drops the board and every pending op. Used when switching boards.
    pub fn teardown(&self) {
        {
            let mut store = self.inner.write();
            store.board = None;
            store.pending.clear();
        }
        self.bump();
    }

    // -----------------------------------------------------------------
    // Entity operations
    // -----------------------------------------------------------------

    /// Inserts a column at its carried position; an existing column with
    /// the same id is replaced.
    pub fn add_column(&self, column: Column) -> Outcome {
        self.mutate("add_column", |board| {
            board.insert_column(column);
            Ok(())
        })
    }

    /// Inserts a task at its carried position; an existing task with the
    /// same id is replaced.
    pub fn add_task(&self, task: Task) -> Outcome {
        self.mutate("add_task", |board| board.insert_task(task))
    }

    /// Merges content fields into a task.
    pub fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Outcome {
        self.mutate("update_task", |board| board.update_task(id, patch))
    }

    /// Merges display fields into a column.
    pub fn update_column(&self, id: &ColumnId, patch: &ColumnPatch) -> Outcome {
        self.mutate("update_column", |board| board.update_column(id, patch))
    }

    /// Merges board metadata.
    pub fn update_board(&self, patch: &BoardPatch) -> Outcome {
        self.mutate("update_board", |board| {
            board.update_meta(patch);
            Ok(())
        })
    }

    /// Moves a task; see [`Board::move_task`] for the lookup rules.
    pub fn move_task(&self, id: &TaskId, from: &ColumnId, to: &ColumnId, position: u32) -> Outcome {
        self.mutate("move_task", |board| {
            board.move_task(id, from, to, position).map(|_| ())
        })
    }

    /// Moves a column.
    pub fn move_column(&self, id: &ColumnId, position: u32) -> Outcome {
        self.mutate("move_column", |board| {
            board.move_column(id, position).map(|_| ())
        })
    }

    /// Deletes a task.
    pub fn remove_task(&self, id: &TaskId) -> Outcome {
        self.mutate("remove_task", |board| board.remove_task(id).map(|_| ()))
    }

    /// Deletes a column and its tasks.
    pub fn remove_column(&self, id: &ColumnId) -> Outcome {
        self.mutate("remove_column", |board| board.remove_column(id).map(|_| ()))
    }

    // -----------------------------------------------------------------
    // Pending-op log
    // -----------------------------------------------------------------

    /// Applies a local mutation optimistically and records it as pending.
    ///
    /// Returns the op id, or `None` if the mutation referenced an unknown
    /// entity (nothing is recorded then).
    pub fn apply_local(&self, op: LocalOp) -> Option<OpId> {
        let recorded = {
            let mut store = self.inner.write();
            let BoardStore { board, pending } = &mut *store;
            let Some(board) = board.as_mut() else {
                tracing::debug!(op = ?op.kind(), "no board loaded, local op ignored");
                return None;
            };
            match pending::apply(board, op) {
                Ok(entry) => {
                    let id = entry.op_id;
                    tracing::debug!(op_id = %id, kind = ?entry.kind, "local op applied");
                    pending.push(entry);
                    if pending.len() > MAX_PENDING_OPS {
                        let overflow = pending.len() - MAX_PENDING_OPS;
                        pending.drain(..overflow);
                        tracing::debug!(dropped = overflow, "pending log full, oldest ops dropped");
                    }
                    Some(id)
                }
                Err(e) => {
                    tracing::debug!(err = %e, "local op ignored");
                    None
                }
            }
        };
        if recorded.is_some() {
            self.bump();
        }
        recorded
    }

    /// Clears the oldest pending op matching `kind` on `entity`.
    ///
    /// Returns `true` if one was found.
    pub fn confirm(&self, kind: OpKind, entity: &EntityRef) -> bool {
        let mut store = self.inner.write();
        let Some(index) = store
            .pending
            .iter()
            .position(|op| op.kind == kind && &op.entity == entity)
        else {
            return false;
        };
        let op = store.pending.remove(index);
        tracing::debug!(op_id = %op.op_id, ?kind, "pending op confirmed");
        true
    }

    /// Handles a rejected local op: removes it from the log and, when
    /// `rollback` is set, applies its inverse.
    ///
    /// Returns [`Outcome::Ignored`] if the op is no longer pending (already
    /// confirmed or superseded by a snapshot) or the inverse no longer
    /// applies.
    pub fn reject(&self, op_id: OpId, rollback: bool) -> Outcome {
        let outcome = {
            let mut store = self.inner.write();
            let BoardStore { board, pending } = &mut *store;
            let Some(index) = pending.iter().position(|op| op.op_id == op_id) else {
                tracing::debug!(%op_id, "rejected op no longer pending");
                return Outcome::Ignored;
            };
            let op = pending.remove(index);
            if !rollback {
                tracing::info!(%op_id, kind = ?op.kind, "op rejected, keeping local state");
                return Outcome::Ignored;
            }
            let Some(board) = board.as_mut() else {
                return Outcome::Ignored;
            };
            match op.inverse.apply(board) {
                Ok(()) => {
                    tracing::info!(%op_id, kind = ?op.kind, "op rejected, rolled back");
                    Outcome::Applied
                }
                Err(e) => {
                    tracing::warn!(%op_id, err = %e, "rollback no longer applies");
                    Outcome::Ignored
                }
            }
        };
        if outcome.is_applied() {
            self.bump();
        }
        outcome
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn mutate(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut Board) -> Result<(), StateError>,
    ) -> Outcome {
        let result = {
            let mut store = self.inner.write();
            match store.board.as_mut() {
                Some(board) => f(board),
                None => {
                    tracing::debug!(op, "no board loaded, ignored");
                    return Outcome::Ignored;
                }
            }
        };
        match result {
            Ok(()) => {
                self.bump();
                Outcome::Applied
            }
            Err(e) => {
                tracing::debug!(op, err = %e, "ignored");
                Outcome::Ignored
            }
        }
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}
