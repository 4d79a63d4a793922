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

//! Integration tests: optimistic local changes against a real hub.
//!
//! Rejections are produced by changing the hub's store directly without
//! publishing, so the client still believes in an entity the server no
//! longer has.

use std::sync::Arc;
use std::time::Duration;

use syncboard::api::{PersistenceError, RestClient};
use syncboard::client::BoardClient;
use syncboard::config::{ClientConfig, SyncConfig};
use syncboard::transport::websocket::WsConnector;
use syncboard_hub::server::{self, HubState};
use syncboard_hub::store::demo_board;
use syncboard_proto::model::{ColumnId, ColumnPatch, TaskId, UserId};

type Client = BoardClient<WsConnector, RestClient>;

const WAIT: Duration = Duration::from_secs(5);

async fn start_hub() -> (String, Arc<HubState>) {
    let state = Arc::new(HubState::new());
    state.boards.insert(demo_board()).await;
    let (addr, _handle) = server::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("hub starts");
    (addr.to_string(), state)
}

fn client(addr: &str, user: &str, rollback: bool) -> Client {
    let config = ClientConfig {
        ws_url: format!("ws://{addr}"),
        api_url: format!("http://{addr}"),
        user_id: Some(UserId::new(user)),
        sync: SyncConfig {
            rollback_on_rejection: rollback,
            ..SyncConfig::default()
        },
        ..ClientConfig::default()
    };
    BoardClient::from_config(&config).expect("client builds")
}

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

/// Removes a task on the hub without telling anyone.
async fn delete_quietly(state: &HubState, task: &str) {
    let _unpublished = state
        .boards
        .delete_task(&task.into(), &UserId::new("admin"))
        .await
        .unwrap();
}

#[tokio::test]
async fn rejected_move_rolls_back() {
    let (addr, state) = start_hub().await;
    let alice = client(&addr, "alice", true);
    open(&alice).await;
    let before = alice.store().board().unwrap();

    delete_quietly(&state, "task-1").await;
    let err = alice
        .actions()
        .move_task(&"task-1".into(), &"done".into(), 0)
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(404));
    assert!(matches!(err, PersistenceError::Status { ref code, .. } if code == "NOT_FOUND"));
    assert_eq!(alice.store().board().unwrap().columns, before.columns);
    assert!(alice.store().pending_ops().is_empty());
}

#[tokio::test]
async fn rejected_move_is_kept_without_rollback() {
    let (addr, state) = start_hub().await;
    let alice = client(&addr, "alice", false);
    open(&alice).await;

    delete_quietly(&state, "task-1").await;
    let result = alice
        .actions()
        .move_task(&"task-1".into(), &"done".into(), 0)
        .await;

    assert!(result.is_err());
    assert_eq!(
        alice.store().locate_task(&TaskId::new("task-1")),
        Some((ColumnId::new("done"), 0))
    );
    assert!(alice.store().pending_ops().is_empty());
    assert!(alice.store().board().unwrap().is_dense());
}

#[tokio::test]
async fn rejected_column_rename_restores_name() {
    let (addr, state) = start_hub().await;
    let alice = client(&addr, "alice", true);
    open(&alice).await;
    let original = alice.store().column(&"doing".into()).unwrap().name;

    let _unpublished = state
        .boards
        .delete_column(&"doing".into(), &UserId::new("admin"))
        .await
        .unwrap();
    let result = alice
        .actions()
        .update_column(
            &"doing".into(),
            ColumnPatch {
                name: Some("Blocked".into()),
                ..ColumnPatch::default()
            },
        )
        .await;

    assert!(result.is_err());
    assert_eq!(alice.store().column(&"doing".into()).unwrap().name, original);
}

#[tokio::test]
async fn rejected_delete_restores_task_in_place() {
    let (addr, state) = start_hub().await;
    let alice = client(&addr, "alice", true);
    open(&alice).await;

    // The hub loses task-2's column, so deleting task-2 there fails.
    let _unpublished = state
        .boards
        .delete_column(&"todo".into(), &UserId::new("admin"))
        .await
        .unwrap();
    let result = alice.actions().delete_task(&"task-2".into()).await;

    assert!(result.is_err());
    assert_eq!(
        alice.store().locate_task(&TaskId::new("task-2")),
        Some((ColumnId::new("todo"), 1))
    );
}

#[tokio::test]
async fn accepted_move_is_confirmed_by_echo() {
    let (addr, state) = start_hub().await;
    let alice = client(&addr, "alice", true);
    open(&alice).await;

    alice
        .actions()
        .move_task(&"task-2".into(), &"done".into(), 1)
        .await
        .unwrap();
    eventually("echo confirms the move", || {
        alice.store().pending_ops().is_empty()
    })
    .await;

    let hub_board = state.boards.get(&"demo".into()).await.unwrap();
    assert_eq!(alice.store().board().unwrap().columns, hub_board.columns);
}

#[tokio::test]
async fn empty_title_is_refused_by_the_server() {
    let (addr, _state) = start_hub().await;
    let alice = client(&addr, "alice", true);
    open(&alice).await;
    let before = alice.store().column(&"todo".into()).unwrap().tasks.len();

    let err = alice
        .actions()
        .create_task(&"todo".into(), "", None)
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(400));
    assert_eq!(alice.store().column(&"todo".into()).unwrap().tasks.len(), before);
}

#[tokio::test]
async fn concurrent_moves_converge_on_last_write() {
    let (addr, state) = start_hub().await;
    let alice = client(&addr, "alice", true);
    let bob = client(&addr, "bob", true);
    open(&alice).await;
    open(&bob).await;

    let task = TaskId::new("task-1");
    let (doing, done) = (ColumnId::new("doing"), ColumnId::new("done"));
    let (a, b) = tokio::join!(
        alice.actions().move_task(&task, &doing, 0),
        bob.actions().move_task(&task, &done, 0),
    );
    a.unwrap();
    b.unwrap();

    let expected = state.boards.get(&"demo".into()).await.unwrap().columns;
    eventually("both clients match the hub", || {
        alice.store().pending_ops().is_empty()
            && bob.store().pending_ops().is_empty()
            && alice.store().board().unwrap().columns == expected
            && bob.store().board().unwrap().columns == expected
    })
    .await;
}
