//! Configuration module for the ftp-relay server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use thiserror::Error;

/// Smallest listen backlog the server will use.
pub const MIN_BACKLOG: u32 = 5;

/// Wire protocol served on the listening socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolType {
    /// FTP-style command/response protocol
    #[default]
    Ftp,
    /// One-way compressed JSON message ingestion
    Ingest,
}

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "ftp-relay")]
#[command(author = "ftp-relay authors")]
#[command(version = "0.1.0")]
#[command(about = "A single-threaded FTP-style command server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1:2000)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Protocol to serve
    #[arg(short = 'p', long, value_enum)]
    pub protocol: Option<ProtocolType>,

    /// Listen backlog (at least 5)
    #[arg(long)]
    pub backlog: Option<u32>,

    /// Maximum number of simultaneous peers
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Bytes taken per read; each read is handled as one frame
    #[arg(long)]
    pub read_size: Option<usize>,

    /// zlib compression level for responses (0-9)
    #[arg(long)]
    pub compression_level: Option<u32>,

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
    pub codec: CodecConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default)]
    pub protocol: ProtocolType,
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_read_size")]
    pub read_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            protocol: ProtocolType::default(),
            backlog: default_backlog(),
            max_connections: default_max_connections(),
            read_size: default_read_size(),
        }
    }
}

/// Frame codec configuration
#[derive(Debug, Deserialize)]
pub struct CodecConfig {
    /// zlib compression level
    #[serde(default = "default_level")]
    pub level: u32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:2000".to_string()
}

fn default_backlog() -> u32 {
    MIN_BACKLOG
}

fn default_max_connections() -> usize {
    1024
}

fn default_read_size() -> usize {
    1024
}

fn default_level() -> u32 {
    crate::runtime::codec::DEFAULT_LEVEL
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub protocol: ProtocolType,
    pub backlog: u32,
    pub max_connections: usize,
    pub read_size: usize,
    pub compression_level: u32,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        let toml = TomlConfig::default();
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 2000)),
            protocol: toml.server.protocol,
            backlog: toml.server.backlog,
            max_connections: toml.server.max_connections,
            read_size: toml.server.read_size,
            compression_level: toml.codec.level,
            log_level: toml.logging.level,
        }
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

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args over TOML config.
    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let listen = cli.listen.unwrap_or(toml_config.server.listen);

        Ok(Config {
            listen: resolve_listen(&listen)?,
            protocol: cli.protocol.unwrap_or(toml_config.server.protocol),
            backlog: cli
                .backlog
                .unwrap_or(toml_config.server.backlog)
                .max(MIN_BACKLOG),
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections)
                .max(1),
            read_size: cli
                .read_size
                .unwrap_or(toml_config.server.read_size)
                .max(1),
            compression_level: cli
                .compression_level
                .unwrap_or(toml_config.codec.level)
                .min(9),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }
}

/// Resolve `host:port` to the first matching socket address.
fn resolve_listen(listen: &str) -> Result<SocketAddr, ConfigError> {
    listen
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ConfigError::InvalidListen(listen.to_string()))
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
    #[error("Invalid listen address '{0}': expected host:port")]
    InvalidListen(String),
}
