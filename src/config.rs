//! Configuration module for the fileline server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::protocol::framing::DEFAULT_MAX_LINE;
use crate::transfer::DEFAULT_CHUNK_SIZE;

/// Command-line arguments for the file server
#[derive(Parser, Debug)]
#[command(name = "fileline-server")]
#[command(author = "fileline authors")]
#[command(version = "0.1.0")]
#[command(about = "A line-framed file server with length-prefixed uploads", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1:5101)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Directory GET paths are resolved against
    #[arg(short = 'r', long)]
    pub root: Option<PathBuf>,

    /// Directory uploads are written to (created if missing)
    #[arg(short = 'u', long)]
    pub upload_dir: Option<PathBuf>,

    /// Append-only request/response log file
    #[arg(long)]
    pub access_log: Option<PathBuf>,

    /// Transfer chunk size in bytes
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Maximum simultaneous connections (0 = unlimited)
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Seconds to wait for the request line (0 = wait forever)
    #[arg(long)]
    pub request_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Connection cap, 0 for none
    #[serde(default)]
    pub max_connections: usize,
    /// Request line timeout in seconds, 0 for none
    #[serde(default)]
    pub request_timeout_secs: u64,
    /// Longest accepted request line in bytes
    #[serde(default = "default_max_line")]
    pub max_line_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_connections: 0,
            request_timeout_secs: 0,
            max_line_length: default_max_line(),
        }
    }
}

/// File-related configuration
#[derive(Debug, Deserialize)]
pub struct FilesConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            upload_dir: default_upload_dir(),
            chunk_size: default_chunk_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Access log path
    #[serde(default = "default_access_log")]
    pub access_log: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            access_log: default_access_log(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:5101".to_string()
}

fn default_max_line() -> usize {
    DEFAULT_MAX_LINE
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploaded")
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_access_log() -> PathBuf {
    PathBuf::from("log.txt")
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub root: PathBuf,
    pub upload_dir: PathBuf,
    pub access_log: PathBuf,
    pub chunk_size: usize,
    pub max_line_length: usize,
    pub max_connections: Option<usize>,
    pub request_timeout: Option<Duration>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::merge(CliArgs::empty(), TomlConfig::default())
    }
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let config = Self::merge(cli, toml_config);
        config.validate()?;
        Ok(config)
    }

    /// Merge CLI args over TOML values.
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        let max_connections = cli
            .max_connections
            .unwrap_or(toml_config.server.max_connections);
        let request_timeout = cli
            .request_timeout
            .unwrap_or(toml_config.server.request_timeout_secs);

        Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            root: cli.root.unwrap_or(toml_config.files.root),
            upload_dir: cli.upload_dir.unwrap_or(toml_config.files.upload_dir),
            access_log: cli.access_log.unwrap_or(toml_config.logging.access_log),
            chunk_size: cli.chunk_size.unwrap_or(toml_config.files.chunk_size),
            max_line_length: toml_config.server.max_line_length,
            max_connections: (max_connections > 0).then_some(max_connections),
            request_timeout: (request_timeout > 0).then(|| Duration::from_secs(request_timeout)),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        }
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::Invalid("listen address must not be empty"));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk size must be > 0"));
        }
        if self.max_line_length == 0 {
            return Err(ConfigError::Invalid("max line length must be > 0"));
        }
        Ok(())
    }
}

impl CliArgs {
    fn empty() -> Self {
        Self {
            config: None,
            listen: None,
            root: None,
            upload_dir: None,
            access_log: None,
            chunk_size: None,
            max_connections: None,
            request_timeout: None,
            log_level: default_log_level(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {1}", .0.display())]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{}': {1}", .0.display())]
    TomlParse(PathBuf, #[source] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}
