//! Configuration for the `chatvault` tool.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/chatvault/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::{Path, PathBuf};

use crate::crypto::keys::DEFAULT_TOKEN_BYTES;
use crate::session::DEFAULT_KEY_PREFIX;

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
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    storage: StorageFileConfig,
    registry: RegistryFileConfig,
    log: LogFileConfig,
}

/// `[storage]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StorageFileConfig {
    data_dir: Option<PathBuf>,
    key_prefix: Option<String>,
}

/// `[registry]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RegistryFileConfig {
    warning_buffer: Option<usize>,
}

/// `[log]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct LogFileConfig {
    level: Option<String>,
    file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultConfig {
    /// Directory holding the durable key file.
    pub data_dir: PathBuf,
    /// Prefix for durable session key entries.
    pub key_prefix: String,
    /// Capacity of the key warning channel.
    pub warning_buffer: usize,
    /// Log filter directive (trace, debug, info, warn, error).
    pub log_level: String,
    /// Log file; stderr when unset.
    pub log_file: Option<PathBuf>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            warning_buffer: 16,
            log_level: "warn".to_string(),
            log_file: None,
        }
    }
}

impl VaultConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path
    /// (`~/.config/chatvault/config.toml`) is tried and silently ignored if
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `VaultConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            data_dir: cli
                .data_dir
                .clone()
                .or_else(|| file.storage.data_dir.clone())
                .unwrap_or(defaults.data_dir),
            key_prefix: cli
                .key_prefix
                .clone()
                .or_else(|| file.storage.key_prefix.clone())
                .unwrap_or(defaults.key_prefix),
            warning_buffer: file
                .registry
                .warning_buffer
                .unwrap_or(defaults.warning_buffer),
            log_level: cli
                .log_level
                .clone()
                .or_else(|| file.log.level.clone())
                .unwrap_or(defaults.log_level),
            log_file: cli.log_file.clone().or_else(|| file.log.file.clone()),
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Session encryption for case chat messages")]
pub struct CliArgs {
    /// Path to config file (default: `~/.config/chatvault/config.toml`).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the session key file.
    #[arg(long, env = "CHATVAULT_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Prefix for stored session key entries (default: `chat_key_`).
    #[arg(long, env = "CHATVAULT_KEY_PREFIX", global = true)]
    pub key_prefix: Option<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, env = "CHATVAULT_LOG", global = true)]
    pub log_level: Option<String>,

    /// Path to log file (default: stderr).
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Operation to run.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Operations offered by the `chatvault` binary.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print a freshly generated, exported session key.
    Keygen,

    /// Print a random hex token.
    Token {
        /// Token size in bytes.
        #[arg(long, default_value_t = DEFAULT_TOKEN_BYTES)]
        bytes: usize,
    },

    /// Seal a message for a session and print the envelope JSON.
    Seal {
        /// Chat session id.
        #[arg(long)]
        session: String,
        /// Message body.
        #[arg(long)]
        text: String,
        /// Sender role.
        #[arg(long)]
        sender: Option<String>,
        /// Sender identifier.
        #[arg(long)]
        sender_id: Option<String>,
        /// Sender display name.
        #[arg(long)]
        sender_name: Option<String>,
        /// Message classification tag.
        #[arg(long = "type")]
        kind: Option<String>,
    },

    /// Open an envelope (file or stdin) and print the message JSON.
    Open {
        /// Chat session id.
        #[arg(long)]
        session: String,
        /// Envelope file; stdin when omitted.
        #[arg(long)]
        envelope: Option<PathBuf>,
    },

    /// Remove a session's key from memory and storage.
    Clear {
        /// Chat session id.
        #[arg(long)]
        session: String,
    },
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("chatvault")
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
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
    let path = config_dir.join("chatvault").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
