//! Client settings: endpoints, session identity, reconnect policy and
//! local sync tuning.
//!
//! Values resolve flag first, then `SYNCBOARD_*` environment variable, then
//! `~/.config/syncboard/config.toml`, then the built-in default. The
//! per-user file may be absent; a file named with `--config` may not.

use std::path::{Path, PathBuf};
use std::time::Duration;

use syncboard_proto::model::{BoardId, UserId};

/// Transport base URL used when nothing else is configured.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8080";

/// REST base URL used when nothing else is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:8080";

/// Failure to load the client's config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// On-disk layout
// ---------------------------------------------------------------------------

/// Root of `config.toml`.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    session: SessionFileConfig,
    reconnect: ReconnectFileConfig,
    sync: SyncFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    ws_url: Option<String>,
    api_url: Option<String>,
}

/// `[session]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionFileConfig {
    board_id: Option<String>,
    user_id: Option<String>,
}

/// `[reconnect]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ReconnectFileConfig {
    base_delay_ms: Option<u64>,
    max_attempts: Option<u32>,
    connect_timeout_secs: Option<u64>,
}

/// `[sync]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SyncFileConfig {
    rollback_on_rejection: Option<bool>,
    cursor_throttle_ms: Option<u64>,
    request_timeout_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Resolved settings
// ---------------------------------------------------------------------------

/// Reconnect policy for the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt; doubles per attempt.
    pub base_delay: Duration,
    /// Attempts made before giving up until the next explicit connect.
    pub max_attempts: u32,
    /// Upper bound on a single transport open.
    pub connect_timeout: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_attempts: 5,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ReconnectConfig {
    /// Delay before reconnect attempt `attempt` (1-based):
    /// `base_delay * 2^(attempt - 1)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// Local mutation and presence tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Revert an optimistic change when its REST call fails.
    pub rollback_on_rejection: bool,
    /// Minimum spacing between outbound cursor updates.
    pub cursor_throttle: Duration,
    /// Timeout for a single REST request.
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            rollback_on_rejection: true,
            cursor_throttle: Duration::from_millis(50),
            request_timeout: Duration::from_secs(15),
        }
    }
}

/// Settings a [`BoardClient`](crate::client::BoardClient) is built from.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Server --
    /// Base URL of the real-time endpoint (`ws://` or `wss://`).
    pub ws_url: String,
    /// Base URL of the REST API.
    pub api_url: String,

    // -- Session --
    /// Board to open.
    pub board_id: Option<BoardId>,
    /// Identity of the local user.
    pub user_id: Option<UserId>,

    /// Reconnect policy.
    pub reconnect: ReconnectConfig,
    /// Optimistic mutation and presence settings.
    pub sync: SyncConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            board_id: None,
            user_id: None,
            reconnect: ReconnectConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an
    /// error. Otherwise the default path is tried and silently ignored if
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI (including env) > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            ws_url: cli
                .ws_url
                .clone()
                .or_else(|| file.server.ws_url.clone())
                .unwrap_or(defaults.ws_url),
            api_url: cli
                .api_url
                .clone()
                .or_else(|| file.server.api_url.clone())
                .unwrap_or(defaults.api_url),
            board_id: cli
                .board
                .clone()
                .or_else(|| file.session.board_id.clone())
                .map(BoardId::new),
            user_id: cli
                .user
                .clone()
                .or_else(|| file.session.user_id.clone())
                .map(UserId::new),
            reconnect: ReconnectConfig {
                base_delay: file
                    .reconnect
                    .base_delay_ms
                    .map_or(defaults.reconnect.base_delay, Duration::from_millis),
                max_attempts: file
                    .reconnect
                    .max_attempts
                    .unwrap_or(defaults.reconnect.max_attempts),
                connect_timeout: file
                    .reconnect
                    .connect_timeout_secs
                    .map_or(defaults.reconnect.connect_timeout, Duration::from_secs),
            },
            sync: SyncConfig {
                rollback_on_rejection: file
                    .sync
                    .rollback_on_rejection
                    .unwrap_or(defaults.sync.rollback_on_rejection),
                cursor_throttle: file
                    .sync
                    .cursor_throttle_ms
                    .map_or(defaults.sync.cursor_throttle, Duration::from_millis),
                request_timeout: file
                    .sync
                    .request_timeout_secs
                    .map_or(defaults.sync.request_timeout, Duration::from_secs),
            },
        }
    }

    /// The `(board, user)` pair to open, if both are configured.
    #[must_use]
    pub fn session(&self) -> Option<(BoardId, UserId)> {
        let board_id = self.board_id.clone()?;
        let user_id = self.user_id.clone()?;
        if board_id.as_str().is_empty() || user_id.as_str().is_empty() {
            return None;
        }
        Some((board_id, user_id))
    }
}

/// Command line of the `syncboard` binary.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Real-time sync client for collaborative kanban boards")]
pub struct CliArgs {
    /// Base URL of the real-time endpoint.
    #[arg(long, env = "SYNCBOARD_WS_URL")]
    pub ws_url: Option<String>,

    /// Base URL of the REST API.
    #[arg(long, env = "SYNCBOARD_API_URL")]
    pub api_url: Option<String>,

    /// Board to open.
    #[arg(long, env = "SYNCBOARD_BOARD")]
    pub board: Option<String>,

    /// Your user id.
    #[arg(long, env = "SYNCBOARD_USER")]
    pub user: Option<String>,

    /// Path to config file (default: `~/.config/syncboard/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "SYNCBOARD_LOG")]
    pub log_level: String,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// What to do once connected (default: watch).
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Client subcommands.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Connect and print the board whenever it changes.
    Watch,
    /// Move a task to another column (or reorder within one).
    MoveTask {
        /// Task to move.
        task: String,
        /// Destination column.
        #[arg(long)]
        to_column: String,
        /// Drop onto this task, taking its place; appends when omitted.
        #[arg(long)]
        onto: Option<String>,
    },
    /// Move a column to a new position.
    MoveColumn {
        /// Column to move.
        column: String,
        /// Destination position (clamped).
        #[arg(long)]
        position: u32,
    },
}

// ---------------------------------------------------------------------------
// File loading
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and a missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("syncboard").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.ws_url, "ws://localhost:8080");
        assert_eq!(config.api_url, "http://localhost:8080");
        assert_eq!(config.reconnect.base_delay, Duration::from_millis(1000));
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.connect_timeout, Duration::from_secs(10));
        assert!(config.sync.rollback_on_rejection);
        assert_eq!(config.sync.cursor_throttle, Duration::from_millis(50));
        assert_eq!(config.sync.request_timeout, Duration::from_secs(15));
        assert!(config.session().is_none());
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let reconnect = ReconnectConfig::default();
        assert_eq!(reconnect.delay_for(1), Duration::from_secs(1));
        assert_eq!(reconnect.delay_for(2), Duration::from_secs(2));
        assert_eq!(reconnect.delay_for(3), Duration::from_secs(4));
        assert_eq!(reconnect.delay_for(5), Duration::from_secs(16));
    }

    #[test]
    fn backoff_saturates() {
        let reconnect = ReconnectConfig::default();
        assert_eq!(
            reconnect.delay_for(200),
            Duration::from_secs(u64::from(u32::MAX))
        );
    }

    #[test]
    fn toml_parsing_full() {
        let toml_str = r#"
[server]
ws_url = "wss://boards.example.com"
api_url = "https://boards.example.com"

[session]
board_id = "b-42"
user_id = "alice"

[reconnect]
base_delay_ms = 250
max_attempts = 8
connect_timeout_secs = 3

[sync]
rollback_on_rejection = false
cursor_throttle_ms = 100
request_timeout_secs = 30
"#;
        let file: ConfigFile = toml::from_str(toml_str).unwrap();
        let cli = CliArgs::default();
        let config = ClientConfig::resolve(&cli, &file);

        assert_eq!(config.ws_url, "wss://boards.example.com");
        assert_eq!(config.api_url, "https://boards.example.com");
        assert_eq!(
            config.session(),
            Some((BoardId::new("b-42"), UserId::new("alice")))
        );
        assert_eq!(config.reconnect.base_delay, Duration::from_millis(250));
        assert_eq!(config.reconnect.max_attempts, 8);
        assert_eq!(config.reconnect.connect_timeout, Duration::from_secs(3));
        assert!(!config.sync.rollback_on_rejection);
        assert_eq!(config.sync.cursor_throttle, Duration::from_millis(100));
        assert_eq!(config.sync.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn toml_parsing_partial() {
        let toml_str = r#"
[reconnect]
max_attempts = 2
"#;
        let file: ConfigFile = toml::from_str(toml_str).unwrap();
        let config = ClientConfig::resolve(&CliArgs::default(), &file);

        assert_eq!(config.reconnect.max_attempts, 2);
        assert_eq!(config.reconnect.base_delay, Duration::from_millis(1000));
        assert_eq!(config.ws_url, DEFAULT_WS_URL);
    }

    #[test]
    fn cli_overrides_file() {
        let toml_str = r#"
[server]
ws_url = "ws://file:9000"

[session]
user_id = "file-user"
"#;
        let file: ConfigFile = toml::from_str(toml_str).unwrap();
        let cli = CliArgs {
            ws_url: Some("ws://cli:9000".to_string()),
            board: Some("b1".to_string()),
            ..Default::default()
        };
        let config = ClientConfig::resolve(&cli, &file);

        assert_eq!(config.ws_url, "ws://cli:9000");
        assert_eq!(
            config.session(),
            Some((BoardId::new("b1"), UserId::new("file-user")))
        );
    }

    #[test]
    fn empty_ids_are_not_a_session() {
        let config = ClientConfig {
            board_id: Some(BoardId::new("")),
            user_id: Some(UserId::new("u1")),
            ..Default::default()
        };
        assert!(config.session().is_none());
    }

    #[test]
    fn subcommands_parse() {
        let cli = CliArgs::try_parse_from([
            "syncboard",
            "--board",
            "b1",
            "--user",
            "u1",
            "move-task",
            "t1",
            "--to-column",
            "done",
            "--onto",
            "t9",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Some(Command::MoveTask {
                task: "t1".into(),
                to_column: "done".into(),
                onto: Some("t9".into()),
            })
        );

        let cli = CliArgs::try_parse_from(["syncboard", "move-column", "c1", "--position", "0"])
            .unwrap();
        assert_eq!(
            cli.command,
            Some(Command::MoveColumn {
                column: "c1".into(),
                position: 0,
            })
        );
    }

    #[test]
    fn explicit_missing_config_file_returns_error() {
        let result = load_config_file(Some(Path::new("/nonexistent/config.toml")));
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let dir = std::env::temp_dir().join(format!("syncboard-cfg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.toml");
        std::fs::write(&path, "[server\nws_url = ").unwrap();
        let result = load_config_file(Some(&path));
        assert!(matches!(result, Err(ConfigError::ParseToml(_))));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
