//! Hub server core: shared state, WebSocket session handling, and startup.
//!
//! A client opens `/ws?board_id=..&user_id=..`. The hub answers with a
//! `board.sync` snapshot, exchanges presence with the rest of the room, and
//! then applies the client's commands, broadcasting the resulting events to
//! everyone on the board (the sender included, so it can confirm its own
//! optimistic changes).

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use syncboard_proto::codec;
use syncboard_proto::event::{ClientCommand, ServerEvent};
use syncboard_proto::model::{BoardId, User, UserId};
use tokio::sync::mpsc;

use crate::rest;
use crate::rooms::{self, ConnectionId, RoomRegistry};
use crate::store::{BoardStore, Change, ColumnDraft, HubError, TaskDraft};

/// Shared hub state: board data plus the rooms watching it.
#[derive(Default)]
pub struct HubState {
    /// Board data.
    pub boards: BoardStore,
    /// Connected clients per board.
    pub rooms: RoomRegistry,
}

impl HubState {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Broadcasts a committed change to its board's room.
    pub async fn publish(&self, change: &Change) -> usize {
        self.rooms
            .broadcast(&change.board_id, &change.event, None)
            .await
    }

    /// Sends a Close frame to every connected client.
    ///
    /// Clients see the session drop and start reconnecting. Useful for
    /// graceful shutdown and testing.
    pub async fn close_all_connections(&self) {
        self.rooms.close_all().await;
    }
}

/// Query string of the WebSocket endpoint.
#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    /// Board to join.
    pub board_id: BoardId,
    /// Identity of the connecting user.
    pub user_id: UserId,
}

/// Handles an upgraded WebSocket connection for one `(board, user)` session.
///
/// The connection lifecycle:
/// 1. Join the board's room.
/// 2. Send `board.sync`, then a `presence.joined` for every other user
///    already present.
/// 3. Announce the newcomer to the room.
/// 4. Apply commands until the socket closes.
/// 5. Leave the room, announcing `presence.left` if that was the user's
///    last connection.
pub async fn handle_socket(socket: WebSocket, state: Arc<HubState>, session: SessionQuery) {
    let SessionQuery { board_id, user_id } = session;
    let (mut ws_sender, mut ws_receiver) = socket.split();

    if state.boards.get(&board_id).await.is_none() {
        tracing::warn!(board_id = %board_id, user_id = %user_id, "session for unknown board");
        let err = ServerEvent::Error {
            code: "NOT_FOUND".to_string(),
            message: format!("board not found: {board_id}"),
        };
        if let Ok(text) = codec::encode_event(&err) {
            let _ = ws_sender.send(Message::Text(text.into())).await;
        }
        let _ = ws_sender.send(Message::Close(None)).await;
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let user = User::with_id(user_id.clone());
    let joined = state.rooms.join(&board_id, user.clone(), tx.clone()).await;
    let connection = joined.connection;

    // Taken after joining so no committed change can fall between the
    // snapshot and the room's broadcasts.
    let Some(board) = state.boards.get(&board_id).await else {
        state.rooms.leave(&board_id, connection).await;
        return;
    };
    rooms::send_event(&tx, &ServerEvent::BoardSync { board });
    for other in joined.present {
        rooms::send_event(&tx, &ServerEvent::PresenceJoined { user: other });
    }
    if joined.first_for_user {
        state
            .rooms
            .broadcast(
                &board_id,
                &ServerEvent::PresenceJoined { user },
                Some(connection),
            )
            .await;
    }
    drop(tx);

    tracing::info!(board_id = %board_id, user_id = %user_id, connection, "client joined");

    // Writer task: forwards queued frames to the socket.
    let writer_user = user_id.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(user_id = %writer_user, "WebSocket write failed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    // Reader task: applies commands from this client.
    let reader_state = Arc::clone(&state);
    let reader_board = board_id.clone();
    let reader_user = user_id.clone();
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_text(&reader_state, &reader_board, &reader_user, connection, text.as_str())
                        .await;
                }
                Message::Close(_) => {
                    tracing::info!(user_id = %reader_user, "received close frame");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    if let Some(left) = state.rooms.leave(&board_id, connection).await
        && left.last_for_user
    {
        state
            .rooms
            .broadcast(
                &board_id,
                &ServerEvent::PresenceLeft {
                    user_id: left.user_id,
                },
                None,
            )
            .await;
    }
    tracing::info!(board_id = %board_id, user_id = %user_id, connection, "client left");
}

/// Decodes and applies one text frame.
async fn handle_text(
    state: &HubState,
    board_id: &BoardId,
    user_id: &UserId,
    connection: ConnectionId,
    text: &str,
) {
    let command = match codec::decode_command(text) {
        Ok(command) => command,
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "failed to decode command");
            return;
        }
    };

    if let ClientCommand::PresenceCursor { x, y } = command {
        if let Some(cursor) = state.rooms.cursor(board_id, connection, x, y).await {
            let event = ServerEvent::PresenceCursors {
                cursors: vec![cursor],
            };
            state.rooms.broadcast(board_id, &event, Some(connection)).await;
        }
        return;
    }

    let event_type = command.event_type();
    match apply_command(state, board_id, user_id, command).await {
        Ok(change) => {
            state.publish(&change).await;
        }
        Err(e) => {
            tracing::debug!(user_id = %user_id, %event_type, error = %e, "command rejected");
            let err = ServerEvent::Error {
                code: e.code().to_string(),
                message: e.to_string(),
            };
            state.rooms.send_to(board_id, connection, &err).await;
        }
    }
}

/// Applies a board command on behalf of `user_id`.
async fn apply_command(
    state: &HubState,
    board_id: &BoardId,
    user_id: &UserId,
    command: ClientCommand,
) -> Result<Change, HubError> {
    let boards = &state.boards;
    match command {
        ClientCommand::TaskCreate {
            column_id,
            title,
            description,
        } => {
            let mut draft = TaskDraft::titled(column_id, title);
            draft.description = description;
            boards.create_task(draft, user_id).await.map(|(_, c)| c)
        }
        ClientCommand::TaskUpdate { task_id, changes } => boards
            .update_task(&task_id, &changes, user_id)
            .await
            .map(|(_, c)| c),
        ClientCommand::TaskMove {
            task_id,
            column_id,
            position,
        } => boards
            .move_task(&task_id, &column_id, position, user_id)
            .await
            .map(|(_, c)| c),
        ClientCommand::TaskDelete { task_id } => boards.delete_task(&task_id, user_id).await,
        ClientCommand::ColumnCreate {
            name,
            position,
            color,
        } => {
            let draft = ColumnDraft {
                board_id: board_id.clone(),
                name,
                position: Some(position),
                color,
            };
            boards.create_column(draft, user_id).await.map(|(_, c)| c)
        }
        ClientCommand::ColumnUpdate { column_id, changes } => boards
            .update_column(&column_id, &changes, user_id)
            .await
            .map(|(_, c)| c),
        ClientCommand::ColumnMove {
            column_id,
            position,
        } => boards
            .move_column(&column_id, position, user_id)
            .await
            .map(|(_, c)| c),
        ClientCommand::ColumnDelete { column_id } => {
            boards.delete_column(&column_id, user_id).await
        }
        ClientCommand::PresenceCursor { .. } => Err(HubError::Validation(
            "cursor updates are not board commands".to_string(),
        )),
    }
}

/// Builds the hub's router: `/ws` plus the REST API under `/api/v1`.
pub fn router(state: Arc<HubState>) -> axum::Router {
    axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .nest("/api/v1", rest::routes())
        .with_state(state)
}

/// Starts the hub on the given address and returns the bound address and a
/// join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(HubState::new())).await
}

/// Starts the hub with pre-populated state.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<HubState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "hub server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket session.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(session): Query<SessionQuery>,
    State(state): State<Arc<HubState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncboard_proto::model::{Board, Column, Task};
    use tokio_tungstenite::tungstenite;

    type Client =
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

    async fn start_test_server() -> (std::net::SocketAddr, Arc<HubState>) {
        let state = Arc::new(HubState::new());
        let mut board = Board::new("b1", "Board");
        let mut todo = Column::new("todo", "b1", "To Do", 0);
        todo.tasks.push(Task::new("t1", "todo", "one", 0));
        todo.tasks.push(Task::new("t2", "todo", "two", 1));
        board.columns.push(todo);
        board.columns.push(Column::new("done", "b1", "Done", 1));
        state.boards.insert(board).await;

        let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
            .await
            .unwrap();
        (addr, state)
    }

    async fn connect(addr: std::net::SocketAddr, board: &str, user: &str) -> Client {
        let url = format!("ws://{addr}/ws?board_id={board}&user_id={user}");
        let (ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        ws
    }

    async fn recv(ws: &mut Client) -> ServerEvent {
        loop {
            let msg = ws.next().await.unwrap().unwrap();
            if let tungstenite::Message::Text(text) = msg {
                return codec::decode_event(text.as_str()).unwrap();
            }
        }
    }

    async fn send(ws: &mut Client, command: &ClientCommand) {
        let text = codec::encode_command(command).unwrap();
        ws.send(tungstenite::Message::Text(text.into())).await.unwrap();
    }

    #[tokio::test]
    async fn newcomer_receives_snapshot() {
        let (addr, _state) = start_test_server().await;
        let mut alice = connect(addr, "b1", "alice").await;
        match recv(&mut alice).await {
            ServerEvent::BoardSync { board } => {
                assert_eq!(board.columns.len(), 2);
                assert_eq!(board.task_count(), 2);
            }
            other => panic!("expected board.sync, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_board_gets_error() {
        let (addr, _state) = start_test_server().await;
        let mut ws = connect(addr, "missing", "alice").await;
        match recv(&mut ws).await {
            ServerEvent::Error { code, .. } => assert_eq!(code, "NOT_FOUND"),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn presence_is_exchanged() {
        let (addr, _state) = start_test_server().await;
        let mut alice = connect(addr, "b1", "alice").await;
        recv(&mut alice).await;

        let mut bob = connect(addr, "b1", "bob").await;
        assert!(matches!(recv(&mut bob).await, ServerEvent::BoardSync { .. }));
        match recv(&mut bob).await {
            ServerEvent::PresenceJoined { user } => assert_eq!(user.id, UserId::new("alice")),
            other => panic!("expected presence.joined, got {other:?}"),
        }
        match recv(&mut alice).await {
            ServerEvent::PresenceJoined { user } => assert_eq!(user.id, UserId::new("bob")),
            other => panic!("expected presence.joined, got {other:?}"),
        }

        drop(bob);
        match recv(&mut alice).await {
            ServerEvent::PresenceLeft { user_id } => assert_eq!(user_id, UserId::new("bob")),
            other => panic!("expected presence.left, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn move_command_is_broadcast_to_everyone() {
        let (addr, state) = start_test_server().await;
        let mut alice = connect(addr, "b1", "alice").await;
        recv(&mut alice).await;
        let mut bob = connect(addr, "b1", "bob").await;
        recv(&mut bob).await;
        recv(&mut bob).await; // alice's presence
        recv(&mut alice).await; // bob's presence

        send(
            &mut alice,
            &ClientCommand::TaskMove {
                task_id: "t1".into(),
                column_id: "done".into(),
                position: 0,
            },
        )
        .await;

        for ws in [&mut alice, &mut bob] {
            match recv(ws).await {
                ServerEvent::TaskMoved {
                    task,
                    from_column_id,
                    user_id,
                } => {
                    assert_eq!(task.column_id.as_str(), "done");
                    assert_eq!(from_column_id.as_str(), "todo");
                    assert_eq!(user_id, UserId::new("alice"));
                }
                other => panic!("expected task.moved, got {other:?}"),
            }
        }
        let board = state.boards.get(&"b1".into()).await.unwrap();
        assert_eq!(board.column(&"todo".into()).unwrap().tasks.len(), 1);
    }

    #[tokio::test]
    async fn cursor_goes_to_others_only() {
        let (addr, _state) = start_test_server().await;
        let mut alice = connect(addr, "b1", "alice").await;
        recv(&mut alice).await;
        let mut bob = connect(addr, "b1", "bob").await;
        recv(&mut bob).await;
        recv(&mut bob).await;
        recv(&mut alice).await;

        send(&mut alice, &ClientCommand::PresenceCursor { x: 1.0, y: 2.0 }).await;
        match recv(&mut bob).await {
            ServerEvent::PresenceCursors { cursors } => {
                assert_eq!(cursors.len(), 1);
                assert_eq!(cursors[0].user_id, UserId::new("alice"));
            }
            other => panic!("expected presence.cursors, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejected_command_reports_error_to_sender() {
        let (addr, _state) = start_test_server().await;
        let mut alice = connect(addr, "b1", "alice").await;
        recv(&mut alice).await;
        send(
            &mut alice,
            &ClientCommand::TaskDelete {
                task_id: "nope".into(),
            },
        )
        .await;
        match recv(&mut alice).await {
            ServerEvent::Error { code, .. } => assert_eq!(code, "NOT_FOUND"),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_all_disconnects_clients() {
        let (addr, state) = start_test_server().await;
        let mut alice = connect(addr, "b1", "alice").await;
        recv(&mut alice).await;
        state.close_all_connections().await;
        loop {
            match alice.next().await {
                Some(Ok(tungstenite::Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    }
}
