//! `SyncBoard`: command-line board watcher.
//!
//! Connects to a board, keeps a local copy synchronized over the real-time
//! channel, and prints it whenever it changes. Configuration via CLI flags,
//! environment variables, or config file
//! (`~/.config/syncboard/config.toml`).
//!
//! ```bash
//! # Watch a board on a local hub
//! cargo run --bin syncboard -- --board b1 --user alice
//!
//! # Move a task onto another task's slot in column c2
//! cargo run --bin syncboard -- --board b1 --user alice \
//!     move-task t1 --to-column c2 --onto t7
//!
//! # Or via environment variables
//! SYNCBOARD_BOARD=b1 SYNCBOARD_USER=alice cargo run --bin syncboard
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use syncboard::api::RestClient;
use syncboard::client::BoardClient;
use syncboard::config::{CliArgs, ClientConfig, Command};
use syncboard::connection::ConnectionStatus;
use syncboard::store::Outcome;
use syncboard::transport::websocket::WsConnector;
use syncboard_proto::model::{Board, BoardId, ColumnId, TaskId};
use syncboard_proto::order::DropTarget;
use tokio::sync::broadcast;
use tracing_appender::non_blocking::WorkerGuard;

type Client = BoardClient<WsConnector, RestClient>;

/// How long a one-shot command waits for the initial snapshot.
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let Some((board_id, user_id)) = config.session() else {
        eprintln!("error: both --board and --user (or SYNCBOARD_BOARD / SYNCBOARD_USER) are required");
        return ExitCode::FAILURE;
    };
    let client = match BoardClient::from_config(&config) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(%board_id, %user_id, ws_url = %config.ws_url, "syncboard starting");

    let result = match cli.command.unwrap_or(Command::Watch) {
        Command::Watch => watch(&client, board_id).await,
        Command::MoveTask {
            task,
            to_column,
            onto,
        } => move_task(&client, board_id, task.into(), to_column.into(), onto.map(TaskId::new)).await,
        Command::MoveColumn { column, position } => {
            move_column(&client, board_id, column.into(), position).await
        }
    };

    client.close();
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing subscriber.
///
/// Logs go to stderr, or to `file_path` through a non-blocking writer when
/// given. Returns the [`WorkerGuard`] of the file writer, which must be
/// held until shutdown so buffered entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let Some(log_path) = file_path else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(env_filter)
            .init();
        return None;
    };

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Prints the board on every change until Ctrl-C.
async fn watch(client: &Client, board_id: BoardId) -> Result<(), String> {
    let mut revision = client.store().subscribe();
    let mut status = client.subscribe_status();
    let mut notifications = client.subscribe_notifications();

    if let Err(e) = client.open_board(board_id).await {
        // Reconnects continue in the background.
        tracing::warn!(err = %e, "initial connect failed");
        println!("! {e}");
    }

    loop {
        tokio::select! {
            changed = revision.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                if let Some(board) = client.store().board() {
                    println!("{}", render_board(&board));
                    let presence = client.presence();
                    if !presence.users.is_empty() {
                        println!("  online: {}", presence.users.len());
                    }
                }
            }
            changed = status.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let current = *status.borrow_and_update();
                println!("* {}", describe_status(current));
            }
            received = notifications.recv() => {
                match received {
                    Ok(notification) => println!("@ {}", notification.title),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "notification feed lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                return Ok(());
            }
        }
    }
}

async fn move_task(
    client: &Client,
    board_id: BoardId,
    task: TaskId,
    to_column: ColumnId,
    onto: Option<TaskId>,
) -> Result<(), String> {
    await_snapshot(client, board_id).await?;
    let target = onto.as_ref().map_or(DropTarget::Container, DropTarget::Sibling);
    let outcome = client
        .actions()
        .drop_task(&task, &to_column, target)
        .await
        .map_err(|e| e.to_string())?;
    report(outcome, &format!("task {task}"))?;
    if let Some((column, position)) = client.store().locate_task(&task) {
        println!("task {task} is now at {column}[{position}]");
    }
    Ok(())
}

async fn move_column(
    client: &Client,
    board_id: BoardId,
    column: ColumnId,
    position: u32,
) -> Result<(), String> {
    await_snapshot(client, board_id).await?;
    let outcome = client
        .actions()
        .move_column(&column, position)
        .await
        .map_err(|e| e.to_string())?;
    report(outcome, &format!("column {column}"))?;
    if let Some(column) = client.store().column(&column) {
        println!("column {} is now at position {}", column.id, column.position);
    }
    Ok(())
}

/// Connects and waits until the server's snapshot has been applied.
async fn await_snapshot(client: &Client, board_id: BoardId) -> Result<(), String> {
    let mut revision = client.store().subscribe();
    client
        .open_board(board_id.clone())
        .await
        .map_err(|e| e.to_string())?;
    let loaded = tokio::time::timeout(SNAPSHOT_TIMEOUT, async {
        while client.store().board_id().as_ref() != Some(&board_id) {
            if revision.changed().await.is_err() {
                break;
            }
        }
    })
    .await;
    match loaded {
        Ok(()) if client.store().board_id().is_some() => Ok(()),
        _ => Err(format!("no snapshot of board {board_id} received")),
    }
}

fn report(outcome: Outcome, what: &str) -> Result<(), String> {
    match outcome {
        Outcome::Applied => Ok(()),
        Outcome::Ignored => Err(format!("{what} is not on this board")),
    }
}

fn describe_status(status: ConnectionStatus) -> String {
    match status {
        ConnectionStatus::Idle => "idle".to_string(),
        ConnectionStatus::Connecting => "connecting".to_string(),
        ConnectionStatus::Connected => "connected".to_string(),
        ConnectionStatus::Reconnecting { attempt, max } => {
            format!("reconnecting (attempt {attempt}/{max})")
        }
        ConnectionStatus::Disconnected => "disconnected, giving up".to_string(),
    }
}

fn render_board(board: &Board) -> String {
    use std::fmt::Write;

    let mut out = format!("== {} ({}) ==\n", board.name, board.id);
    for column in &board.columns {
        let _ = writeln!(out, "[{}] {} ({})", column.position, column.name, column.id);
        for task in &column.tasks {
            let _ = write!(out, "    {}. {} ({}) [{}]", task.position, task.title, task.id, task.priority);
            if let Some(assignee) = &task.assigned_to {
                let _ = write!(out, " @{assignee}");
            }
            out.push('\n');
        }
    }
    out
}
