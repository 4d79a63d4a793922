// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Integration tests: two clients on one board converge through the hub.
//!
//! Every client talks to a real in-process hub over WebSocket and HTTP.
//! Mutations go through the REST API and come back to every client as
//! events; the test only asserts on what the clients' stores end up
//! holding.

use std::sync::Arc;
use std::time::Duration;

use syncboard::api::RestClient;
use syncboard::client::BoardClient;
use syncboard::config::ClientConfig;
use syncboard::connection::ConnectionStatus;
use syncboard::transport::websocket::WsConnector;
use syncboard_hub::server::{self, HubState};
use syncboard_hub::store::demo_board;
use syncboard_proto::model::{ColumnId, TaskId, TaskPatch, UserId};
use syncboard_proto::order::DropTarget;

type Client = BoardClient<WsConnector, RestClient>;

const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Helpers
// =============================================================================

async fn start_hub() -> (String, Arc<HubState>) {
    let state = Arc::new(HubState::new());
    state.boards.insert(demo_board()).await;
    let (addr, _handle) = server::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("hub starts");
    (addr.to_string(), state)
}

fn client(addr: &str, user: &str) -> Client {
    let config = ClientConfig {
        ws_url: format!("ws://{addr}"),
        api_url: format!("http://{addr}"),
        user_id: Some(UserId::new(user)),
        ..ClientConfig::default()
    };
    BoardClient::from_config(&config).expect("client builds")
}

/// Polls `check` until it holds or `WAIT` elapses.
async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn open(client: &Client) {
    client.open_board("demo".into()).await.expect("connects");
    eventually("board snapshot", || client.store().board().is_some()).await;
}

fn task_order(client: &Client, column: &str) -> Vec<String> {
    client
        .store()
        .column(&ColumnId::new(column))
        .map(|c| c.tasks.iter().map(|t| t.id.to_string()).collect())
        .unwrap_or_default()
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn snapshot_populates_store() {
    let (addr, _state) = start_hub().await;
    let alice = client(&addr, "alice");
    open(&alice).await;

    assert_eq!(alice.status(), ConnectionStatus::Connected);
    let board = alice.store().board().unwrap();
    assert_eq!(board.columns.len(), 3);
    assert!(board.is_dense());
    assert_eq!(task_order(&alice, "todo"), ["task-1", "task-2"]);
}

#[tokio::test]
async fn move_by_one_client_reaches_the_other() {
    let (addr, state) = start_hub().await;
    let alice = client(&addr, "alice");
    let bob = client(&addr, "bob");
    open(&alice).await;
    open(&bob).await;

    let outcome = alice
        .actions()
        .move_task(&"task-1".into(), &"doing".into(), 0)
        .await
        .unwrap();
    assert!(outcome.is_applied());
    assert_eq!(task_order(&alice, "doing"), ["task-1", "task-3"]);

    eventually("bob sees the move", || {
        task_order(&bob, "doing") == ["task-1", "task-3"]
    })
    .await;
    assert_eq!(task_order(&bob, "todo"), ["task-2"]);
    assert!(bob.store().board().unwrap().is_dense());

    eventually("alice's move is confirmed", || {
        alice.store().pending_ops().is_empty()
    })
    .await;
    let hub_board = state.boards.get(&"demo".into()).await.unwrap();
    assert_eq!(alice.store().board().unwrap().columns, hub_board.columns);
}

#[tokio::test]
async fn drop_onto_sibling_takes_its_slot() {
    let (addr, _state) = start_hub().await;
    let alice = client(&addr, "alice");
    let bob = client(&addr, "bob");
    open(&alice).await;
    open(&bob).await;

    let target = TaskId::new("task-1");
    alice
        .actions()
        .drop_task(&"task-2".into(), &"todo".into(), DropTarget::Sibling(&target))
        .await
        .unwrap();
    assert_eq!(task_order(&alice, "todo"), ["task-2", "task-1"]);

    eventually("bob sees the reorder", || {
        task_order(&bob, "todo") == ["task-2", "task-1"]
    })
    .await;
}

#[tokio::test]
async fn column_reorder_converges() {
    let (addr, _state) = start_hub().await;
    let alice = client(&addr, "alice");
    let bob = client(&addr, "bob");
    open(&alice).await;
    open(&bob).await;

    bob.actions()
        .move_column(&"done".into(), 0)
        .await
        .unwrap();

    eventually("alice sees the column move", || {
        alice
            .store()
            .board()
            .is_some_and(|b| b.columns[0].id.as_str() == "done")
    })
    .await;
    let board = alice.store().board().unwrap();
    let positions: Vec<u32> = board.columns.iter().map(|c| c.position).collect();
    assert_eq!(positions, [0, 1, 2]);
}

#[tokio::test]
async fn creates_updates_and_deletes_propagate() {
    let (addr, _state) = start_hub().await;
    let alice = client(&addr, "alice");
    let bob = client(&addr, "bob");
    open(&alice).await;
    open(&bob).await;

    let task = alice
        .actions()
        .create_task(&"done".into(), "Write release notes", None)
        .await
        .unwrap();
    eventually("bob sees the new task", || bob.store().task(&task.id).is_some()).await;

    bob.actions()
        .update_task(
            &task.id,
            TaskPatch {
                title: Some("Write the release notes".into()),
                ..TaskPatch::default()
            },
        )
        .await
        .unwrap();
    eventually("alice sees the new title", || {
        alice
            .store()
            .task(&task.id)
            .is_some_and(|t| t.title == "Write the release notes")
    })
    .await;

    alice.actions().delete_task(&task.id).await.unwrap();
    eventually("bob sees the delete", || bob.store().task(&task.id).is_none()).await;

    let column = bob
        .actions()
        .create_column("Review", Some("#f59e0b".into()))
        .await
        .unwrap()
        .unwrap();
    eventually("alice sees the new column", || {
        alice.store().column(&column.id).is_some()
    })
    .await;
    assert_eq!(alice.store().column(&column.id).unwrap().position, 3);
}

#[tokio::test]
async fn presence_and_cursors_flow_between_clients() {
    let (addr, _state) = start_hub().await;
    let alice = client(&addr, "alice");
    let bob = client(&addr, "bob");
    open(&alice).await;
    open(&bob).await;

    eventually("alice sees bob", || alice.presence().users.len() == 1).await;
    eventually("bob sees alice", || bob.presence().users.len() == 1).await;

    assert!(alice.move_cursor(120.0, 48.5));
    eventually("bob sees alice's cursor", || {
        bob.presence()
            .cursors
            .get(&UserId::new("alice"))
            .is_some_and(|c| (c.x - 120.0).abs() < f64::EPSILON)
    })
    .await;

    alice.close();
    eventually("bob sees alice leave", || bob.presence().is_empty()).await;
}

#[tokio::test]
async fn rest_resync_matches_live_state() {
    let (addr, _state) = start_hub().await;
    let alice = client(&addr, "alice");
    open(&alice).await;
    alice
        .actions()
        .move_task(&"task-4".into(), &"todo".into(), 0)
        .await
        .unwrap();

    let live = alice.store().board().unwrap();
    alice.resync(&"demo".into()).await.unwrap();
    assert_eq!(alice.store().board().unwrap().columns, live.columns);
    assert!(alice.store().pending_ops().is_empty());
}
