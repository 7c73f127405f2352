//! Configuration for the `questlog` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/questlog/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;

use questlog_proto::ids::{IdError, SyncId};
use questlog_proto::schedule::{self, ResetSchedule, ScheduleError};

use crate::app::TrackerSettings;
use crate::session::DEFAULT_MAX_ENTITIES;

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

    /// `[schedule]` values out of range.
    #[error("invalid reset schedule: {0}")]
    Schedule(#[from] ScheduleError),

    /// `weekly_reset_day` is not a weekday name.
    #[error("invalid weekly_reset_day: {0}")]
    Weekday(String),

    /// A configured sync id is malformed.
    #[error("invalid sync_id: {0}")]
    SyncId(#[from] IdError),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    sync: SyncFileConfig,
    tracker: TrackerFileConfig,
    schedule: ScheduleFileConfig,
}

/// `[sync]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SyncFileConfig {
    server_url: Option<String>,
    sync_id: Option<String>,
}

/// `[tracker]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct TrackerFileConfig {
    max_entities: Option<usize>,
}

/// `[schedule]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ScheduleFileConfig {
    utc_offset_hours: Option<i32>,
    cutover_hour: Option<u32>,
    weekly_reset_day: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Sync --
    /// Base URL of the sync server. `None` keeps records in memory only.
    pub server_url: Option<String>,
    /// Sync id overriding the remembered one.
    pub sync_id: Option<String>,

    // -- Tracker --
    /// Maximum number of entities per record.
    pub max_entities: usize,

    // -- Schedule --
    /// Whole-hour offset of the reset zone from UTC.
    pub utc_offset_hours: i32,
    /// Local hour of the daily cutover.
    pub cutover_hour: u32,
    /// Day of the weekly reset, e.g. `mon`.
    pub weekly_reset_day: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            sync_id: None,
            max_entities: DEFAULT_MAX_ENTITIES,
            utc_offset_hours: 9,
            cutover_hour: 6,
            weekly_reset_day: "mon".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or either file cannot be parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, file))
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            server_url: cli.server_url.clone().or(file.sync.server_url),
            sync_id: cli.sync_id.clone().or(file.sync.sync_id),
            max_entities: file
                .tracker
                .max_entities
                .unwrap_or(defaults.max_entities),
            utc_offset_hours: file
                .schedule
                .utc_offset_hours
                .unwrap_or(defaults.utc_offset_hours),
            cutover_hour: file
                .schedule
                .cutover_hour
                .unwrap_or(defaults.cutover_hour),
            weekly_reset_day: file
                .schedule
                .weekly_reset_day
                .unwrap_or(defaults.weekly_reset_day),
        }
    }

    /// Reset schedule described by the `[schedule]` values.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Weekday`] or [`ConfigError::Schedule`].
    pub fn schedule(&self) -> Result<ResetSchedule, ConfigError> {
        let day = schedule::parse_weekday(&self.weekly_reset_day).map_err(ConfigError::Weekday)?;
        Ok(ResetSchedule::new(
            self.utc_offset_hours,
            self.cutover_hour,
            day,
        )?)
    }

    /// Validated tracker settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an invalid schedule or sync id.
    pub fn tracker_settings(&self) -> Result<TrackerSettings, ConfigError> {
        Ok(TrackerSettings {
            schedule: self.schedule()?,
            max_entities: self.max_entities,
            sync_id: self.sync_id.as_deref().map(SyncId::parse).transpose()?,
        })
    }
}

/// Global options shared by every subcommand.
#[derive(clap::Args, Debug, Default)]
pub struct CliArgs {
    /// Base URL of the sync server.
    #[arg(long, global = true, env = "QUESTLOG_SERVER")]
    pub server_url: Option<String>,

    /// Use this sync id instead of the remembered one.
    #[arg(long, global = true, env = "QUESTLOG_SYNC_ID")]
    pub sync_id: Option<String>,

    /// Path to config file (default: `~/.config/questlog/config.toml`).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info", env = "QUESTLOG_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/questlog.log`).
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

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
        config_dir.join("questlog").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
