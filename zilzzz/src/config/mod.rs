//! Configuration system for the `Zilzzz` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/zilzzz/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use chrono::FixedOffset;
use zilzzz_proto::task::MAX_TASK_TEXT_LENGTH;

use crate::clock::LocalZone;
use crate::notify::DEFAULT_TITLE;

/// Errors that can occur when loading configuration.
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

    /// The store URL is not a `ws://` or `wss://` URL.
    #[error("invalid store URL {url}: {reason}")]
    InvalidStoreUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    store: StoreFileConfig,
    tasks: TasksFileConfig,
    notifications: NotificationsFileConfig,
    display: DisplayFileConfig,
}

/// `[store]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StoreFileConfig {
    url: Option<String>,
    owner_id: Option<String>,
    connect_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
}

/// `[tasks]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct TasksFileConfig {
    max_text_len: Option<usize>,
}

/// `[notifications]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct NotificationsFileConfig {
    enabled: Option<bool>,
    title: Option<String>,
    sound: Option<bool>,
}

/// `[display]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct DisplayFileConfig {
    utc_offset_minutes: Option<i32>,
    due_format: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Store --
    /// Store server WebSocket URL.
    pub store_url: String,
    /// Owner id to sign in as.
    pub owner_id: Option<String>,
    /// Timeout for connecting to the store server.
    pub connect_timeout: Duration,
    /// Timeout for each store request.
    pub request_timeout: Duration,

    // -- Tasks --
    /// Maximum task text length in characters.
    pub max_text_len: usize,

    // -- Notifications --
    /// Whether desktop reminders are shown.
    pub notifications_enabled: bool,
    /// Reminder title.
    pub notification_title: String,
    /// Whether reminders play a sound.
    pub notification_sound: bool,

    // -- Display --
    /// Fixed offset for local times; `None` follows the machine's zone.
    pub utc_offset: Option<FixedOffset>,
    /// Due date display format string (chrono).
    pub due_format: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            store_url: "ws://127.0.0.1:9400/ws".to_string(),
            owner_id: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            max_text_len: MAX_TASK_TEXT_LENGTH,
            notifications_enabled: true,
            notification_title: DEFAULT_TITLE.to_string(),
            notification_sound: true,
            utc_offset: None,
            due_format: "%d %b %H:%M".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an
    /// error. If no `--config` is given, the default path
    /// (`~/.config/zilzzz/config.toml`) is tried and silently ignored if
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, or if the resolved store URL is not a WebSocket URL.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        let config = Self::resolve(cli, &file);
        validate_store_url(&config.store_url)?;
        Ok(config)
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            store_url: cli
                .store_url
                .clone()
                .or_else(|| file.store.url.clone())
                .unwrap_or(defaults.store_url),
            owner_id: cli.owner.clone().or_else(|| file.store.owner_id.clone()),
            connect_timeout: file
                .store
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            request_timeout: file
                .store
                .request_timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
            max_text_len: file.tasks.max_text_len.unwrap_or(defaults.max_text_len),
            notifications_enabled: file
                .notifications
                .enabled
                .unwrap_or(defaults.notifications_enabled),
            notification_title: file
                .notifications
                .title
                .clone()
                .unwrap_or(defaults.notification_title),
            notification_sound: file
                .notifications
                .sound
                .unwrap_or(defaults.notification_sound),
            utc_offset: file.display.utc_offset_minutes.and_then(offset_from_minutes),
            due_format: file
                .display
                .due_format
                .clone()
                .unwrap_or(defaults.due_format),
        }
    }

    /// Zone used for local times: the configured offset, else the
    /// machine's zone rules.
    #[must_use]
    pub fn zone(&self) -> LocalZone {
        self.utc_offset.map_or(LocalZone::System, LocalZone::Fixed)
    }
}

/// What the client binary should do.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    /// Interactive command loop (the default).
    Shell,
    /// Print the current tasks once and exit.
    List {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Reminder tasks synced through a store server")]
pub struct CliArgs {
    /// WebSocket URL of the store server.
    #[arg(long, env = "ZILZZZ_STORE_URL")]
    pub store_url: Option<String>,

    /// Owner id to sign in as.
    #[arg(long, env = "ZILZZZ_OWNER")]
    pub owner: Option<String>,

    /// Path to config file (default: `~/.config/zilzzz/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "ZILZZZ_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/zilzzz.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// What to do (default: `shell`).
    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn offset_from_minutes(minutes: i32) -> Option<FixedOffset> {
    let offset = minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt);
    if offset.is_none() {
        tracing::warn!(minutes, "utc_offset_minutes out of range, using the local zone");
    }
    offset
}

fn validate_store_url(raw: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidStoreUrl {
        url: raw.to_string(),
        reason,
    };
    let parsed = url::Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(invalid(format!("unsupported scheme {other}"))),
    }
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("zilzzz").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.store_url, "ws://127.0.0.1:9400/ws");
        assert!(config.owner_id.is_none());
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.max_text_len, 500);
        assert!(config.notifications_enabled);
        assert_eq!(config.notification_title, "Zilzzz Reminder");
        assert!(config.notification_sound);
        assert!(config.utc_offset.is_none());
        assert_eq!(config.due_format, "%d %b %H:%M");
    }

    #[test]
    fn toml_parsing_full() {
        let toml_str = r#"
[store]
url = "wss://tasks.example.com/ws"
owner_id = "alice"
connect_timeout_secs = 3
request_timeout_secs = 4

[tasks]
max_text_len = 120

[notifications]
enabled = false
title = "Heads up"
sound = false

[display]
utc_offset_minutes = 330
due_format = "%Y-%m-%d %H:%M"
"#;
        let file: ConfigFile = toml::from_str(toml_str).unwrap();
        let config = ClientConfig::resolve(&CliArgs::default(), &file);

        assert_eq!(config.store_url, "wss://tasks.example.com/ws");
        assert_eq!(config.owner_id.as_deref(), Some("alice"));
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.request_timeout, Duration::from_secs(4));
        assert_eq!(config.max_text_len, 120);
        assert!(!config.notifications_enabled);
        assert_eq!(config.notification_title, "Heads up");
        assert!(!config.notification_sound);
        assert_eq!(config.utc_offset, FixedOffset::east_opt(330 * 60));
        assert_eq!(
            config.zone(),
            LocalZone::Fixed(FixedOffset::east_opt(330 * 60).unwrap())
        );
        assert_eq!(config.due_format, "%Y-%m-%d %H:%M");
    }

    #[test]
    fn toml_parsing_partial() {
        let file: ConfigFile = toml::from_str("[store]\nowner_id = \"bob\"\n").unwrap();
        let config = ClientConfig::resolve(&CliArgs::default(), &file);
        assert_eq!(config.owner_id.as_deref(), Some("bob"));
        assert_eq!(config.store_url, "ws://127.0.0.1:9400/ws");
        assert!(config.notifications_enabled);
    }

    #[test]
    fn out_of_range_offset_falls_back_to_local() {
        let file: ConfigFile =
            toml::from_str("[display]\nutc_offset_minutes = 100000\n").unwrap();
        let config = ClientConfig::resolve(&CliArgs::default(), &file);
        assert!(config.utc_offset.is_none());
        assert_eq!(config.zone(), LocalZone::System);
    }

    #[test]
    fn cli_overrides_file() {
        let toml_str = r#"
[store]
url = "ws://file:9400/ws"
owner_id = "file-owner"
"#;
        let file: ConfigFile = toml::from_str(toml_str).unwrap();
        let cli = CliArgs {
            store_url: Some("ws://cli:9400/ws".to_string()),
            owner: None,
            ..Default::default()
        };
        let config = ClientConfig::resolve(&cli, &file);
        assert_eq!(config.store_url, "ws://cli:9400/ws");
        assert_eq!(config.owner_id.as_deref(), Some("file-owner"));
    }

    #[test]
    fn store_url_must_be_websocket() {
        assert!(validate_store_url("ws://127.0.0.1:9400/ws").is_ok());
        assert!(validate_store_url("wss://example.com/ws").is_ok());
        assert!(matches!(
            validate_store_url("http://example.com"),
            Err(ConfigError::InvalidStoreUrl { .. })
        ));
        assert!(matches!(
            validate_store_url("not a url"),
            Err(ConfigError::InvalidStoreUrl { .. })
        ));
    }

    #[test]
    fn subcommands_parse() {
        let cli = CliArgs::try_parse_from(["zilzzz", "list", "--json"]).unwrap();
        assert_eq!(cli.command, Some(CliCommand::List { json: true }));
        let cli = CliArgs::try_parse_from(["zilzzz"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        assert!(load_config_file(None).is_ok());
    }

    #[test]
    fn explicit_missing_config_file_returns_error() {
        let result = load_config_file(Some(std::path::Path::new("/nonexistent/config.toml")));
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }
}
