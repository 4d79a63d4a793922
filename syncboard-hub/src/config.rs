//! Hub settings.
//!
//! Each value is taken from the first source that sets it: command line,
//! environment (through clap's `env`), `~/.config/syncboard-hub/config.toml`,
//! then the built-in default.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;

const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_LOG_LEVEL: &str = "info";

/// Failure to load the hub's config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists (or was named explicitly) but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that was read.
        path: PathBuf,
        /// I/O failure.
        source: std::io::Error,
    },

    /// The file is not valid TOML for the hub.
    #[error("invalid hub config {}: {source}", path.display())]
    Parse {
        /// File that was parsed.
        path: PathBuf,
        /// TOML failure.
        source: toml::de::Error,
    },
}

/// On-disk layout.
///
/// ```toml
/// [server]
/// bind_addr = "0.0.0.0:8080"
/// seed_demo = true
///
/// [log]
/// level = "debug"
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileSettings {
    server: FileServer,
    log: FileLog,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileServer {
    bind_addr: Option<String>,
    seed_demo: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileLog {
    level: Option<String>,
}

/// Command line of `syncboard-hub`.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "In-memory SyncBoard server for local development")]
pub struct HubCliArgs {
    /// Listen address, e.g. `0.0.0.0:8080`.
    #[arg(short, long, env = "SYNCBOARD_HUB_ADDR")]
    pub bind: Option<String>,

    /// Config file to use instead of the per-user one.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Create the `demo` board on startup.
    #[arg(long)]
    pub seed_demo: bool,

    /// Tracing filter, e.g. `debug` or `syncboard_hub=trace`.
    #[arg(long, env = "SYNCBOARD_HUB_LOG")]
    pub log_level: Option<String>,
}

/// Settings the hub runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Listen address.
    pub bind_addr: String,
    /// Whether the demo board is created on startup.
    pub seed_demo: bool,
    /// Tracing filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND.to_owned(),
            seed_demo: false,
            log_level: DEFAULT_LOG_LEVEL.to_owned(),
        }
    }
}

impl HubConfig {
    /// Reads the config file (if any) and layers `cli` over it.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] if an explicitly named file is missing, or if any
    /// file that exists cannot be read or parsed.
    pub fn load(cli: &HubCliArgs) -> Result<Self, ConfigError> {
        let settings = match &cli.config {
            Some(path) => read_settings(path)?,
            None => default_path()
                .map(|path| read_optional(&path))
                .transpose()?
                .flatten()
                .unwrap_or_default(),
        };
        Ok(Self::layer(cli, settings))
    }

    fn layer(cli: &HubCliArgs, settings: FileSettings) -> Self {
        let FileSettings { server, log } = settings;
        Self {
            bind_addr: cli
                .bind
                .clone()
                .or(server.bind_addr)
                .unwrap_or_else(|| DEFAULT_BIND.to_owned()),
            seed_demo: cli.seed_demo || server.seed_demo.unwrap_or(false),
            log_level: cli
                .log_level
                .clone()
                .or(log.level)
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_owned()),
        }
    }
}

fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("syncboard-hub").join("config.toml"))
}

/// Like [`read_settings`], but a missing file is `Ok(None)`.
fn read_optional(path: &Path) -> Result<Option<FileSettings>, ConfigError> {
    match read_settings(path) {
        Ok(settings) => Ok(Some(settings)),
        Err(ConfigError::Read { source, .. }) if source.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn read_settings(path: &Path) -> Result<FileSettings, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
