//! Board rooms: who is connected to which board.
//!
//! Each WebSocket connection joins the room of the board it opened. A user
//! may hold several connections to the same board (tabs, reconnects racing
//! the old socket); presence is tracked per user, so `presence.joined` is
//! only announced for a user's first connection and `presence.left` only
//! for their last.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use syncboard_proto::codec;
use syncboard_proto::event::{Cursor, ServerEvent};
use syncboard_proto::model::{BoardId, User, UserId};
use tokio::sync::{RwLock, mpsc};

/// Identifies one WebSocket connection.
pub type ConnectionId = u64;

struct Member {
    connection: ConnectionId,
    user: User,
    sender: mpsc::UnboundedSender<Message>,
}

/// Result of joining a room.
#[derive(Debug)]
pub struct Joined {
    /// The new connection's id.
    pub connection: ConnectionId,
    /// Other users already present, one entry per user.
    pub present: Vec<User>,
    /// `true` if the user had no other connection to this board.
    pub first_for_user: bool,
}

/// Result of leaving a room.
#[derive(Debug, PartialEq, Eq)]
pub struct Left {
    /// The user that owned the connection.
    pub user_id: UserId,
    /// `true` if that was the user's last connection to this board.
    pub last_for_user: bool,
}

/// In-memory directory of board rooms.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<BoardId, Vec<Member>>>,
    next_connection: AtomicU64,
}

impl RoomRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection to the board's room.
    pub async fn join(
        &self,
        board_id: &BoardId,
        user: User,
        sender: mpsc::UnboundedSender<Message>,
    ) -> Joined {
        let connection = self.next_connection.fetch_add(1, Ordering::Relaxed) + 1;
        let mut rooms = self.rooms.write().await;
        let members = rooms.entry(board_id.clone()).or_default();

        let mut present: Vec<User> = Vec::new();
        for member in members.iter() {
            if member.user.id != user.id && !present.iter().any(|u| u.id == member.user.id) {
                present.push(member.user.clone());
            }
        }
        let first_for_user = !members.iter().any(|member| member.user.id == user.id);

        members.push(Member {
            connection,
            user,
            sender,
        });
        drop(rooms);

        Joined {
            connection,
            present,
            first_for_user,
        }
    }

    /// Removes a connection. Returns `None` if it was not registered.
    pub async fn leave(&self, board_id: &BoardId, connection: ConnectionId) -> Option<Left> {
        let mut rooms = self.rooms.write().await;
        let members = rooms.get_mut(board_id)?;
        let index = members
            .iter()
            .position(|member| member.connection == connection)?;
        let member = members.remove(index);
        let last_for_user = !members
            .iter()
            .any(|other| other.user.id == member.user.id);
        if members.is_empty() {
            rooms.remove(board_id);
        }
        drop(rooms);

        Some(Left {
            user_id: member.user.id,
            last_for_user,
        })
    }

    /// Number of connections in the board's room.
    pub async fn connection_count(&self, board_id: &BoardId) -> usize {
        self.rooms.read().await.get(board_id).map_or(0, Vec::len)
    }

    /// Sends `event` to every connection in the room except `except`.
    ///
    /// Returns how many connections the event was queued for.
    pub async fn broadcast(
        &self,
        board_id: &BoardId,
        event: &ServerEvent,
        except: Option<ConnectionId>,
    ) -> usize {
        let text = match codec::encode_event(event) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode event for broadcast");
                return 0;
            }
        };

        let rooms = self.rooms.read().await;
        let Some(members) = rooms.get(board_id) else {
            return 0;
        };
        let mut delivered = 0;
        for member in members {
            if Some(member.connection) == except {
                continue;
            }
            if member
                .sender
                .send(Message::Text(text.clone().into()))
                .is_ok()
            {
                delivered += 1;
            }
        }
        drop(rooms);

        tracing::debug!(
            board_id = %board_id,
            event_type = %event.event_type(),
            delivered,
            "event broadcast"
        );
        delivered
    }

    /// Sends `event` to a single connection in the room.
    pub async fn send_to(
        &self,
        board_id: &BoardId,
        connection: ConnectionId,
        event: &ServerEvent,
    ) -> bool {
        let rooms = self.rooms.read().await;
        rooms
            .get(board_id)
            .and_then(|members| members.iter().find(|m| m.connection == connection))
            .is_some_and(|member| send_event(&member.sender, event))
    }

    /// Builds the cursor a connection's user just reported.
    pub async fn cursor(
        &self,
        board_id: &BoardId,
        connection: ConnectionId,
        x: f64,
        y: f64,
    ) -> Option<Cursor> {
        let rooms = self.rooms.read().await;
        let member = rooms
            .get(board_id)?
            .iter()
            .find(|member| member.connection == connection)?;
        Some(Cursor {
            user_id: member.user.id.clone(),
            x,
            y,
        })
    }

    /// Sends a Close frame to every connection in every room.
    pub async fn close_all(&self) {
        let rooms = self.rooms.read().await;
        for (board_id, members) in rooms.iter() {
            for member in members {
                tracing::info!(
                    board_id = %board_id,
                    user_id = %member.user.id,
                    "sending close frame"
                );
                let _ = member.sender.send(Message::Close(None));
            }
        }
    }
}

/// Sends one event directly on a connection's channel.
pub fn send_event(sender: &mpsc::UnboundedSender<Message>, event: &ServerEvent) -> bool {
    match codec::encode_event(event) {
        Ok(text) => sender.send(Message::Text(text.into())).is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode event");
            false
        }
    }
}
