//! Store server settings.
//!
//! Each setting comes from the first source that has it: command line (or
//! its environment variable), then the TOML file, then the built-in default.
//! The file lives at `~/.config/zilzzz-store/config.toml` unless `--config`
//! names another one:
//!
//! ```toml
//! [listen]
//! addr = "127.0.0.1:9400"
//!
//! [storage]
//! data_file = "/var/lib/zilzzz/tasks.json"
//!
//! [logging]
//! level = "debug"
//! ```
//!
//! Resolved settings are checked before the server starts: the listen
//! address must parse, and a data file's directory must already exist.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Default listen address.
pub const DEFAULT_ADDR: &str = "0.0.0.0:9400";

/// Default log filter.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Why the store settings could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The settings file could not be read.
    #[error("cannot read {path}: {source}")]
    ReadFile {
        /// File that was read.
        path: PathBuf,
        /// I/O failure.
        source: std::io::Error,
    },

    /// The settings file is not valid TOML for this schema.
    #[error("invalid settings file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// The listen address is not `host:port`.
    #[error("invalid listen address {addr:?}: {source}")]
    InvalidAddr {
        /// Address as given.
        addr: String,
        /// Parse failure.
        source: std::net::AddrParseError,
    },

    /// The data file's directory does not exist.
    #[error("data file directory {0} does not exist")]
    MissingDataDir(PathBuf),
}

/// Settings as written in the TOML file; every key is optional.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SettingsFile {
    listen: ListenSection,
    storage: StorageSection,
    logging: LoggingSection,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ListenSection {
    addr: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StorageSection {
    data_file: Option<PathBuf>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct LoggingSection {
    level: Option<String>,
}

/// Command line of `zilzzz-store`.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Zilzzz task store server")]
pub struct StoreCliArgs {
    /// Address to listen on, as `host:port`.
    #[arg(short, long, env = "ZILZZZ_STORE_ADDR")]
    pub bind: Option<String>,

    /// Settings file (default: `~/.config/zilzzz-store/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// JSON file tasks are loaded from and saved to. Without it tasks live
    /// in memory only.
    #[arg(long, env = "ZILZZZ_STORE_DATA_FILE")]
    pub data_file: Option<PathBuf>,

    /// Log filter, e.g. `info` or `zilzzz_store=debug`.
    #[arg(long, env = "ZILZZZ_STORE_LOG")]
    pub log_level: Option<String>,
}

/// Settings the store server runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Listen address.
    pub bind_addr: SocketAddr,
    /// Persistence file, if any.
    pub data_file: Option<PathBuf>,
    /// Log filter.
    pub log_level: String,
}

impl StoreConfig {
    /// Reads the settings file and merges it under the command line.
    ///
    /// An explicit `--config` must exist; the default file may be absent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or if
    /// the merged settings are unusable.
    pub fn load(cli: &StoreCliArgs) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => read_settings(path)?,
            None => match default_settings_path() {
                Some(path) => read_settings(&path).or_else(|e| match e {
                    ConfigError::ReadFile { ref source, .. }
                        if source.kind() == std::io::ErrorKind::NotFound =>
                    {
                        Ok(SettingsFile::default())
                    }
                    other => Err(other),
                })?,
                None => SettingsFile::default(),
            },
        };
        Self::merge(cli, file)
    }

    fn merge(cli: &StoreCliArgs, file: SettingsFile) -> Result<Self, ConfigError> {
        let addr = cli
            .bind
            .clone()
            .or(file.listen.addr)
            .unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let bind_addr = addr
            .parse()
            .map_err(|source| ConfigError::InvalidAddr { addr, source })?;

        let data_file = cli.data_file.clone().or(file.storage.data_file);
        let missing_dir = data_file
            .as_deref()
            .and_then(Path::parent)
            .filter(|dir| !dir.as_os_str().is_empty() && !dir.is_dir());
        if let Some(dir) = missing_dir {
            return Err(ConfigError::MissingDataDir(dir.to_path_buf()));
        }

        let log_level = cli
            .log_level
            .clone()
            .or(file.logging.level)
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        Ok(Self {
            bind_addr,
            data_file,
            log_level,
        })
    }
}

fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("zilzzz-store").join("config.toml"))
}

fn read_settings(path: &Path) -> Result<SettingsFile, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&contents)?)
}
