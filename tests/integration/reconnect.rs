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

//! Integration tests: a client recovers from dropped sessions.
//!
//! ## Disconnect simulation
//!
//! Aborting the hub's `JoinHandle` does not close existing WebSocket
//! connections (they run on independently spawned tasks). Instead a **TCP
//! proxy** sits between the client and the hub. `sever()` aborts every
//! proxied connection, which drops both TCP streams and makes the client
//! see the session end, while the proxy keeps accepting new connections so
//! the reconnect can succeed.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use syncboard::api::RestClient;
use syncboard::client::BoardClient;
use syncboard::config::{ClientConfig, ReconnectConfig};
use syncboard::connection::ConnectionStatus;
use syncboard::transport::websocket::WsConnector;
use syncboard_hub::server::{self, HubState};
use syncboard_hub::store::demo_board;
use syncboard_proto::event::EventType;
use syncboard_proto::model::{ColumnId, UserId};
use tokio::sync::watch;

type Client = BoardClient<WsConnector, RestClient>;

const WAIT: Duration = Duration::from_secs(10);

// =============================================================================
// TCP Proxy helper
// =============================================================================

/// Forwards a client-facing port to the hub. `sever()` kills every live
/// connection but keeps accepting new ones.
struct TcpProxy {
    /// Address clients should connect to.
    client_addr: String,
    accept_handle: tokio::task::JoinHandle<()>,
    conn_handles: Arc<Mutex<Vec<tokio::task::JoinHandle<()>>>>,
}

impl TcpProxy {
    async fn new(backend_addr: &str) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client_addr = listener.local_addr().unwrap().to_string();
        let backend = backend_addr.to_string();
        let conn_handles: Arc<Mutex<Vec<tokio::task::JoinHandle<()>>>> =
            Arc::new(Mutex::new(Vec::new()));
        let conn_handles_clone = Arc::clone(&conn_handles);

        let accept_handle = tokio::spawn(async move {
            while let Ok((mut client_stream, _)) = listener.accept().await {
                let backend = backend.clone();
                let conn_handle = tokio::spawn(async move {
                    let Ok(mut backend_stream) = tokio::net::TcpStream::connect(&backend).await
                    else {
                        return;
                    };
                    // No sub-tasks, so aborting this task drops both streams.
                    let _ = tokio::io::copy_bidirectional(&mut client_stream, &mut backend_stream)
                        .await;
                });
                conn_handles_clone.lock().push(conn_handle);
            }
        });

        Self {
            client_addr,
            accept_handle,
            conn_handles,
        }
    }

    /// Drops every proxied connection.
    fn sever(&self) {
        for handle in self.conn_handles.lock().drain(..) {
            handle.abort();
        }
    }
}

impl Drop for TcpProxy {
    fn drop(&mut self) {
        self.accept_handle.abort();
        self.sever();
    }
}

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

fn client(ws_addr: &str, api_addr: &str, user: &str) -> Client {
    let config = ClientConfig {
        ws_url: format!("ws://{ws_addr}"),
        api_url: format!("http://{api_addr}"),
        user_id: Some(UserId::new(user)),
        reconnect: ReconnectConfig {
            base_delay: Duration::from_millis(300),
            max_attempts: 5,
            connect_timeout: Duration::from_secs(2),
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

async fn wait_for_status(
    rx: &mut watch::Receiver<ConnectionStatus>,
    what: &str,
    matches: impl Fn(ConnectionStatus) -> bool,
) {
    tokio::time::timeout(WAIT, rx.wait_for(|status| matches(*status)))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
        .unwrap();
}

/// Counts `board.sync` events delivered to the client.
fn count_syncs(client: &Client) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    // The subscription lives as long as the dispatcher.
    let _subscription = client
        .connection()
        .dispatcher()
        .subscribe(EventType::BoardSync, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    count
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn dropped_session_reconnects_and_resyncs_once() {
    let (hub_addr, _state) = start_hub().await;
    let proxy = TcpProxy::new(&hub_addr).await;
    let alice = client(&proxy.client_addr, &hub_addr, "alice");
    let syncs = count_syncs(&alice);
    let mut status = alice.subscribe_status();

    alice.open_board("demo".into()).await.unwrap();
    eventually("first snapshot", || syncs.load(Ordering::SeqCst) == 1).await;

    proxy.sever();
    wait_for_status(&mut status, "reconnecting", |s| {
        matches!(s, ConnectionStatus::Reconnecting { attempt: 1, .. })
    })
    .await;
    assert!(alice.store().board().is_some(), "board survives the drop");

    wait_for_status(&mut status, "connected again", |s| {
        s == ConnectionStatus::Connected
    })
    .await;
    eventually("second snapshot", || syncs.load(Ordering::SeqCst) == 2).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(syncs.load(Ordering::SeqCst), 2, "exactly one resync");
}

#[tokio::test]
async fn presence_is_cleared_on_drop_and_rebuilt_after() {
    let (hub_addr, _state) = start_hub().await;
    let proxy = TcpProxy::new(&hub_addr).await;
    let alice = client(&proxy.client_addr, &hub_addr, "alice");
    let bob = client(&hub_addr, &hub_addr, "bob");
    let mut status = alice.subscribe_status();

    bob.open_board("demo".into()).await.unwrap();
    alice.open_board("demo".into()).await.unwrap();
    eventually("alice sees bob", || alice.presence().users.len() == 1).await;

    proxy.sever();
    wait_for_status(&mut status, "reconnecting", |s| {
        matches!(s, ConnectionStatus::Reconnecting { .. })
    })
    .await;
    assert!(alice.presence().is_empty());

    eventually("bob sees alice leave", || bob.presence().users.is_empty()).await;
    eventually("alice sees bob again", || alice.presence().users.len() == 1).await;
    eventually("bob sees alice again", || bob.presence().users.len() == 1).await;
}

#[tokio::test]
async fn changes_missed_while_offline_arrive_with_resync() {
    let (hub_addr, state) = start_hub().await;
    let proxy = TcpProxy::new(&hub_addr).await;
    let alice = client(&proxy.client_addr, &hub_addr, "alice");
    let mut status = alice.subscribe_status();

    alice.open_board("demo".into()).await.unwrap();
    eventually("snapshot", || alice.store().board().is_some()).await;

    proxy.sever();
    wait_for_status(&mut status, "reconnecting", |s| {
        matches!(s, ConnectionStatus::Reconnecting { .. })
    })
    .await;

    // Nobody is connected to hear about this one.
    let (_, change) = state
        .boards
        .move_task(&"task-1".into(), &"done".into(), 0, &"bob".into())
        .await
        .unwrap();
    state.publish(&change).await;

    eventually("alice catches up", || {
        alice
            .store()
            .locate_task(&"task-1".into())
            .is_some_and(|(column, position)| column == ColumnId::new("done") && position == 0)
    })
    .await;
    let hub_board = state.boards.get(&"demo".into()).await.unwrap();
    assert_eq!(alice.store().board().unwrap().columns, hub_board.columns);
}

#[tokio::test]
async fn hub_closing_sessions_triggers_reconnect() {
    let (hub_addr, state) = start_hub().await;
    let alice = client(&hub_addr, &hub_addr, "alice");
    let mut status = alice.subscribe_status();

    alice.open_board("demo".into()).await.unwrap();
    wait_for_status(&mut status, "connected", |s| s == ConnectionStatus::Connected).await;

    state.close_all_connections().await;
    wait_for_status(&mut status, "reconnecting", |s| {
        matches!(s, ConnectionStatus::Reconnecting { .. })
    })
    .await;
    wait_for_status(&mut status, "connected again", |s| {
        s == ConnectionStatus::Connected
    })
    .await;
}

#[tokio::test]
async fn explicit_disconnect_does_not_reconnect() {
    let (hub_addr, _state) = start_hub().await;
    let alice = client(&hub_addr, &hub_addr, "alice");
    alice.open_board("demo".into()).await.unwrap();
    eventually("snapshot", || alice.store().board().is_some()).await;

    alice.close();
    assert_eq!(alice.status(), ConnectionStatus::Idle);
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(alice.status(), ConnectionStatus::Idle);
    assert!(alice.store().board().is_none());
}

#[tokio::test]
async fn unreachable_hub_gives_up_after_bounded_attempts() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let config = ClientConfig {
        ws_url: format!("ws://{dead_addr}"),
        api_url: format!("http://{dead_addr}"),
        user_id: Some(UserId::new("alice")),
        reconnect: ReconnectConfig {
            base_delay: Duration::from_millis(10),
            max_attempts: 3,
            connect_timeout: Duration::from_secs(1),
        },
        ..ClientConfig::default()
    };
    let alice = BoardClient::from_config(&config).unwrap();
    let mut status = alice.subscribe_status();

    assert!(alice.open_board("demo".into()).await.is_err());
    wait_for_status(&mut status, "giving up", |s| s == ConnectionStatus::Disconnected).await;
}
