//! Configuration for the sync server.
//!
//! Priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/questlog-sync/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;

/// Errors that can occur when loading server configuration.
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
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SyncConfigFile {
    server: ServerFileConfig,
}

/// `[server]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    database: Option<PathBuf>,
    allowed_origins: Option<Vec<String>>,
    max_payload_size: Option<usize>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the sync server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "questlog sync server")]
pub struct SyncCliArgs {
    /// Address to bind the server to.
    #[arg(short, long, env = "QUESTLOG_SYNC_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/questlog-sync/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// `SQLite` database file, or `:memory:`.
    #[arg(long, env = "QUESTLOG_SYNC_DB")]
    pub database: Option<PathBuf>,

    /// Origin allowed to call the API from a browser. Repeatable.
    #[arg(long = "allow-origin")]
    pub allowed_origins: Vec<String>,

    /// Maximum request body size in bytes.
    #[arg(long)]
    pub max_payload_size: Option<usize>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "QUESTLOG_SYNC_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved sync server configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Address to bind the server to (e.g., `0.0.0.0:9100`).
    pub bind_addr: String,
    /// Database location.
    pub database: PathBuf,
    /// CORS allow-list. `*` mirrors any origin.
    pub allowed_origins: Vec<String>,
    /// Maximum allowed request body in bytes.
    pub max_payload_size: usize,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9100".to_string(),
            database: default_database_path(),
            allowed_origins: Vec::new(),
            max_payload_size: 256 * 1024,
            log_level: "info".to_string(),
        }
    }
}

impl SyncConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// An explicit `--config` that does not exist is an error; a missing
    /// default file is treated as empty.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &SyncCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, file))
    }

    /// Priority: CLI > file > default. Origins given on the command line
    /// replace the file's list rather than extending it.
    fn resolve(cli: &SyncCliArgs, file: SyncConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or(file.server.bind_addr)
                .unwrap_or(defaults.bind_addr),
            database: cli
                .database
                .clone()
                .or(file.server.database)
                .unwrap_or(defaults.database),
            allowed_origins: if cli.allowed_origins.is_empty() {
                file.server
                    .allowed_origins
                    .unwrap_or(defaults.allowed_origins)
            } else {
                cli.allowed_origins.clone()
            },
            max_payload_size: cli
                .max_payload_size
                .or(file.server.max_payload_size)
                .unwrap_or(defaults.max_payload_size),
            log_level: cli.log_level.clone(),
        }
    }
}

/// `<data dir>/questlog-sync/records.db`, or `./questlog-records.db` when no
/// data directory is known.
fn default_database_path() -> PathBuf {
    dirs::data_dir().map_or_else(
        || PathBuf::from("questlog-records.db"),
        |d| d.join("questlog-sync").join("records.db"),
    )
}

fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<SyncConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(SyncConfigFile::default());
        };
        config_dir.join("questlog-sync").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SyncConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
