//! Ephemeral awareness of who else is on the board and where their
//! cursors are.
//!
//! Both maps are held behind `Arc` and replaced copy-on-write, so a
//! [`PresenceSnapshot`] handed to a reader stays valid and unchanged while
//! later updates land. Nothing here is persisted; a local disconnect clears
//! everything.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use syncboard_proto::event::Cursor;
use syncboard_proto::model::{User, UserId};
use tokio::time::Instant;

/// A cursor coordinate in board space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorPoint {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

/// Point-in-time view of presence.
#[derive(Debug, Clone, Default)]
pub struct PresenceSnapshot {
    /// Users currently on the board.
    pub users: Arc<HashMap<UserId, User>>,
    /// Last known cursor per user.
    pub cursors: Arc<HashMap<UserId, CursorPoint>>,
}

impl PresenceSnapshot {
    /// Returns `true` when nobody is present and no cursor is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.cursors.is_empty()
    }
}

/// Tracks remote users and cursors for the current session.
#[derive(Debug)]
pub struct PresenceTracker {
    state: Mutex<PresenceSnapshot>,
    cursor_throttle: Duration,
    last_cursor_sent: Mutex<Option<Instant>>,
}

impl PresenceTracker {
    /// Creates an empty tracker that allows one outbound cursor update per
    /// `cursor_throttle`.
    #[must_use]
    pub fn new(cursor_throttle: Duration) -> Self {
        Self {
            state: Mutex::new(PresenceSnapshot::default()),
            cursor_throttle,
            last_cursor_sent: Mutex::new(None),
        }
    }

    /// A user joined; they have no cursor until one arrives.
    pub fn joined(&self, user: User) {
        let mut state = self.state.lock();
        tracing::debug!(user_id = %user.id, "presence joined");
        Arc::make_mut(&mut state.users).insert(user.id.clone(), user);
    }

    /// A user left; drops both their entry and their cursor.
    pub fn left(&self, user_id: &UserId) {
        let mut state = self.state.lock();
        tracing::debug!(%user_id, "presence left");
        if state.users.contains_key(user_id) {
            Arc::make_mut(&mut state.users).remove(user_id);
        }
        if state.cursors.contains_key(user_id) {
            Arc::make_mut(&mut state.cursors).remove(user_id);
        }
    }

    /// Upserts each cursor; the latest value per user wins.
    pub fn cursors_moved(&self, cursors: &[Cursor]) {
        if cursors.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        let map = Arc::make_mut(&mut state.cursors);
        for cursor in cursors {
            map.insert(
                cursor.user_id.clone(),
                CursorPoint {
                    x: cursor.x,
                    y: cursor.y,
                },
            );
        }
    }

    /// Forgets everyone. Called on every local disconnect.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        *state = PresenceSnapshot::default();
        *self.last_cursor_sent.lock() = None;
    }

    /// Current users and cursors.
    #[must_use]
    pub fn snapshot(&self) -> PresenceSnapshot {
        self.state.lock().clone()
    }

    /// Number of users present.
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.state.lock().users.len()
    }

    /// Last known cursor of `user_id`.
    #[must_use]
    pub fn cursor(&self, user_id: &UserId) -> Option<CursorPoint> {
        self.state.lock().cursors.get(user_id).copied()
    }

    /// Claims the outbound cursor slot. Returns `false` if an update was
    /// sent less than the throttle interval ago.
    pub fn try_claim_cursor_slot(&self) -> bool {
        let now = Instant::now();
        let mut last = self.last_cursor_sent.lock();
        match *last {
            Some(at) if now.duration_since(at) < self.cursor_throttle => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}
