//! Configuration surface
//!
//! Parsed once at startup from a YAML file and immutable afterwards.
//! Sizes accept B/KB/MB/GB/TB suffixes, durations accept ms/s/m/h.

use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub network: NetworkConfig,
    pub logging: LoggingConfig,
    pub wal: WalConfig,
}

/// Engine selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineType {
    InMemory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    #[serde(rename = "type")]
    pub kind: EngineType,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Bind address, `host:port`.
    pub address: String,
    /// Concurrent session cap.
    pub max_connections: usize,
    /// Max bytes per command line.
    #[serde(deserialize_with = "de_size")]
    pub max_message_size: usize,
    /// Per-connection inactivity deadline.
    #[serde(deserialize_with = "de_duration")]
    pub idle_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// debug / info / warning / error / panic / fatal
    pub level: String,
    /// Log file path, or the literal `stderr`.
    pub output: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WalConfig {
    /// Records per forced flush.
    pub flushing_batch_size: usize,
    /// Periodic flush interval.
    #[serde(deserialize_with = "de_duration")]
    pub flushing_batch_timeout: Duration,
    /// Rotate the segment once it reaches this many bytes.
    #[serde(deserialize_with = "de_size_u64")]
    pub max_segment_size: u64,
    /// Directory for segment files.
    pub data_directory: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineType::InMemory,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:0".to_string(),
            max_connections: 5,
            max_message_size: 4 * 1024,
            idle_timeout: Duration::from_secs(5 * 60),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: "stderr".to_string(),
        }
    }
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            flushing_batch_size: 100,
            flushing_batch_timeout: Duration::from_millis(10),
            max_segment_size: 10 * 1024 * 1024,
            data_directory: PathBuf::from("wal"),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file, or use the defaults when no
    /// path was given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config: Config = match path {
            Some(path) => serde_yaml::from_str(&std::fs::read_to_string(path)?)?,
            None => Config::default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        const LEVELS: [&str; 7] = ["debug", "info", "warn", "warning", "error", "panic", "fatal"];
        if !LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "unknown logging level: {}",
                self.logging.level
            )));
        }
        if self.network.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "network.max_connections must be greater than 0".to_string(),
            ));
        }
        if self.network.max_message_size == 0 {
            return Err(ConfigError::Invalid(
                "network.max_message_size must be greater than 0".to_string(),
            ));
        }
        if self.wal.flushing_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "wal.flushing_batch_size must be greater than 0".to_string(),
            ));
        }
        if self.wal.max_segment_size == 0 {
            return Err(ConfigError::Invalid(
                "wal.max_segment_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse a byte size with an optional B/KB/MB/GB/TB suffix (1024-based).
fn parse_size(input: &str) -> Result<u64, String> {
    let trimmed = input.trim();
    let upper = trimmed.to_ascii_uppercase();

    let (number, multiplier) = if let Some(n) = upper.strip_suffix("TB") {
        (n, 1u64 << 40)
    } else if let Some(n) = upper.strip_suffix("GB") {
        (n, 1 << 30)
    } else if let Some(n) = upper.strip_suffix("MB") {
        (n, 1 << 20)
    } else if let Some(n) = upper.strip_suffix("KB") {
        (n, 1 << 10)
    } else if let Some(n) = upper.strip_suffix('B') {
        (n, 1)
    } else {
        (upper.as_str(), 1)
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid size: {trimmed}"))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size overflows: {trimmed}"))
}

/// Parse a duration with an ms/s/m/h suffix.
fn parse_duration(input: &str) -> Result<Duration, String> {
    let trimmed = input.trim();

    let (number, unit_millis) = if let Some(n) = trimmed.strip_suffix("ms") {
        (n, 1u64)
    } else if let Some(n) = trimmed.strip_suffix('s') {
        (n, 1000)
    } else if let Some(n) = trimmed.strip_suffix('m') {
        (n, 60 * 1000)
    } else if let Some(n) = trimmed.strip_suffix('h') {
        (n, 60 * 60 * 1000)
    } else {
        return Err(format!("duration needs a ms/s/m/h unit: {trimmed}"));
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration: {trimmed}"))?;
    Ok(Duration::from_millis(value * unit_millis))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SizeOrInt {
    Int(u64),
    Size(String),
}

fn de_size_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match SizeOrInt::deserialize(deserializer)? {
        SizeOrInt::Int(n) => Ok(n),
        SizeOrInt::Size(s) => parse_size(&s).map_err(serde::de::Error::custom),
    }
}

fn de_size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    de_size_u64(deserializer).map(|n| n as usize)
}

fn de_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}
