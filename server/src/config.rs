//! Server configuration.
//!
//! Loaded from a TOML file; every section and field has a default so an
//! empty file (or no file at all) yields a runnable server on port 9001.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Default RESP listener port.
pub const DEFAULT_PORT: u16 = 9001;

/// Server configuration loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// RESP listener
    #[serde(default)]
    pub listener: ListenerConfig,

    /// Cache and disk-tier configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Connection handling
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// RESP listener configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenerConfig {
    /// Address to listen on
    #[serde(default = "default_listen_address")]
    pub address: SocketAddr,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: default_listen_address(),
        }
    }
}

/// Cache tier configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Hot (L1) level capacity in entries
    #[serde(default = "default_hot_capacity")]
    pub hot_capacity: usize,

    /// Warm (L2) level capacity in entries
    #[serde(default = "default_warm_capacity")]
    pub warm_capacity: usize,

    /// Directory for the disk tier (spilled values and the index file)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Maximum value size (e.g., "16MB"). Commands carrying a larger bulk
    /// string are rejected as protocol errors.
    #[serde(
        default = "default_max_value_size",
        deserialize_with = "deserialize_size"
    )]
    pub max_value_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            hot_capacity: default_hot_capacity(),
            warm_capacity: default_warm_capacity(),
            data_dir: default_data_dir(),
            max_value_size: default_max_value_size(),
        }
    }
}

/// Connection handling configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Maximum concurrent client connections; further accepts are dropped
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level filter (overridden by RUST_LOG when set)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: "pretty", "json", or "compact"
    #[serde(default)]
    pub format: LogFormat,

    /// Include timestamps in log lines
    #[serde(default = "default_true")]
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            timestamps: true,
        }
    }
}

// Default value functions

fn default_listen_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))
}

fn default_hot_capacity() -> usize {
    10_000
}

fn default_warm_capacity() -> usize {
    50_000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./blinkdb_data")
}

fn default_max_value_size() -> usize {
    16 * 1024 * 1024
}

fn default_max_connections() -> usize {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// Deserialize a size string like "64MB" or a plain byte count.
fn deserialize_size<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SizeValue {
        Number(usize),
        String(String),
    }

    match SizeValue::deserialize(deserializer)? {
        SizeValue::Number(n) => Ok(n),
        SizeValue::String(s) => parse_size(&s).map_err(D::Error::custom),
    }
}

/// Parse a size string like "64MB", "4GB", "512" into bytes.
pub fn parse_size(s: &str) -> Result<usize, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| c.is_alphabetic()) {
        Some(idx) => (&s[..idx], s[idx..].to_uppercase()),
        None => (s, String::new()),
    };

    let num: usize = num_str
        .trim()
        .parse()
        .map_err(|_| format!("invalid number: {}", num_str))?;

    let multiplier: usize = match suffix.as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1024,
        "M" | "MB" | "MIB" => 1024 * 1024,
        "G" | "GB" | "GIB" => 1024 * 1024 * 1024,
        _ => return Err(format!("unknown size suffix: {}", suffix)),
    };

    num.checked_mul(multiplier)
        .ok_or_else(|| "size overflow".to_string())
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.cache.max_value_size == 0 {
            return Err("max_value_size must be non-zero".into());
        }
        if self.server.max_connections == 0 {
            return Err("max_connections must be non-zero".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("1K").unwrap(), 1024);
        assert_eq!(parse_size("64MB").unwrap(), 64 * 1024 * 1024);
        assert_eq!(parse_size("4GB").unwrap(), 4 * 1024 * 1024 * 1024);
        assert!(parse_size("").is_err());
        assert!(parse_size("12XB").is_err());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.listener.address.port(), DEFAULT_PORT);
        assert_eq!(config.cache.hot_capacity, 10_000);
        assert_eq!(config.cache.warm_capacity, 50_000);
        assert_eq!(config.cache.max_value_size, 16 * 1024 * 1024);
        assert_eq!(config.server.max_connections, 10_000);
        assert_eq!(config.logging.level, "info");
        config.validate().unwrap();
    }

    #[test]
    fn test_full_config_parses() {
        let config: Config = toml::from_str(
            r#"
            [listener]
            address = "127.0.0.1:7000"

            [cache]
            hot_capacity = 4
            warm_capacity = 8
            data_dir = "/tmp/blinkdb"
            max_value_size = "1MB"

            [server]
            max_connections = 64

            [logging]
            level = "debug"
            format = "json"
            timestamps = false
            "#,
        )
        .unwrap();
        assert_eq!(config.listener.address.port(), 7000);
        assert_eq!(config.cache.hot_capacity, 4);
        assert_eq!(config.cache.max_value_size, 1024 * 1024);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(!config.logging.timestamps);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<Config, _> = toml::from_str("[cache]\nbogus = 1\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_max_value_size_rejected() {
        let config: Config = toml::from_str("[cache]\nmax_value_size = 0\n").unwrap();
        assert!(config.validate().is_err());
    }
}
