use log::{debug, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ExportError, Result};
use crate::sender::DEFAULT_JAR_SIZE;

/// Setting holding the Graphite endpoint URI
pub const URI_KEY: &str = "Metrics.Graphite.Uri";

/// Setting holding the export interval in whole seconds
pub const INTERVAL_KEY: &str = "Metrics.Graphite.Interval.Seconds";

/// Optional setting overriding the pickle frame size
pub const BATCH_SIZE_KEY: &str = "Metrics.Graphite.Pickle.BatchSize";

/// Table holding sender tuning, see `SenderOptions`
pub const SENDER_SECTION: &str = "metrics.graphite.sender";

/// String-keyed access to application settings
pub trait SettingsLookup {
    /// Get the raw value of a setting, if present
    fn get(&self, key: &str) -> Option<String>;

    /// Sender tuning carried by these settings, before `BATCH_SIZE_KEY` is applied
    fn sender_options(&self) -> SenderOptions {
        SenderOptions::default()
    }
}

impl SettingsLookup for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// Tuning for senders
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SenderOptions {
    /// Connect timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Write timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Maximum samples per pickle frame
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Upper bound on UDP datagram payloads
    #[serde(default = "default_max_datagram_size")]
    pub max_datagram_size: usize,
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_batch_size() -> usize {
    DEFAULT_JAR_SIZE
}

/// Stays under a typical 1500 byte Ethernet MTU
fn default_max_datagram_size() -> usize {
    1_400
}

impl Default for SenderOptions {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_timeout_ms(),
            write_timeout_ms: default_timeout_ms(),
            batch_size: default_batch_size(),
            max_datagram_size: default_max_datagram_size(),
        }
    }
}

impl SenderOptions {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Read the optional sender settings, keeping defaults for anything absent or invalid
    ///
    /// `BATCH_SIZE_KEY` takes precedence over a batch size in the sender table.
    pub fn from_settings(settings: &dyn SettingsLookup) -> Self {
        let mut options = settings.sender_options();

        if let Some(raw) = settings.get(BATCH_SIZE_KEY).filter(|v| !v.trim().is_empty()) {
            match raw.trim().parse::<usize>() {
                Ok(size) if size > 0 => options.batch_size = size,
                _ => warn!(
                    "Ignoring {} = '{}': must be an integer > 0, using {}",
                    BATCH_SIZE_KEY, raw, options.batch_size
                ),
            }
        }

        options
    }
}

/// Logging level
#[derive(Debug, Clone, PartialEq)]
pub enum LogLevel {
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level
    Info,
    /// Debug level
    Debug,
    /// Trace level
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl FromStr for LogLevel {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(ExportError::ConfigurationInvalid(format!(
                "unknown log level '{}'",
                other
            ))),
        }
    }
}

/// Source of configuration
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// File path (TOML format)
    File(PathBuf),
    /// Environment variables with a prefix
    Environment(String),
    /// TOML string
    Toml(String),
}

/// Settings backed by the `config` crate
///
/// Dotted keys such as `Metrics.Graphite.Uri` are resolved as paths into
/// nested tables, so a TOML file would carry:
///
/// ```toml
/// [metrics.graphite]
/// uri = "net.udp://graphite.local:2003"
/// interval.seconds = 10
/// ```
pub struct ConfigSettings {
    config: config::Config,
}

impl ConfigSettings {
    pub fn new(config: config::Config) -> Self {
        Self { config }
    }

    /// Merge the given sources in order; later sources win
    pub fn load(sources: Vec<ConfigSource>) -> Result<Self> {
        let mut builder = config::Config::builder();

        for source in sources {
            match source {
                ConfigSource::File(path) => {
                    if !path.exists() {
                        warn!("Configuration file not found: {}", path.display());
                        continue;
                    }

                    debug!("Loading TOML configuration from file: {}", path.display());
                    builder = builder.add_source(
                        config::File::from(path.as_path()).format(config::FileFormat::Toml),
                    );
                }
                ConfigSource::Environment(prefix) => {
                    debug!("Loading configuration from environment with prefix: {}", prefix);
                    builder = builder.add_source(
                        config::Environment::with_prefix(&prefix)
                            .separator("__")
                            .try_parsing(true),
                    );
                }
                ConfigSource::Toml(toml_str) => {
                    debug!("Loading configuration from TOML string");
                    builder = builder
                        .add_source(config::File::from_str(&toml_str, config::FileFormat::Toml));
                }
            }
        }

        let config = builder
            .build()
            .map_err(|e| ExportError::ConfigurationInvalid(format!("Failed to build configuration: {}", e)))?;

        Ok(Self { config })
    }
}

impl SettingsLookup for ConfigSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.config
            .get_string(key)
            .or_else(|_| self.config.get_string(&key.to_lowercase()))
            .ok()
    }

    fn sender_options(&self) -> SenderOptions {
        match self.config.get::<SenderOptions>(SENDER_SECTION) {
            Ok(options) => options,
            Err(config::ConfigError::NotFound(_)) => SenderOptions::default(),
            Err(e) => {
                warn!("Ignoring [{}]: {}", SENDER_SECTION, e);
                SenderOptions::default()
            }
        }
    }
}
