//! Application configuration loading and validation.
//!
//! Two file shapes are accepted. The Home Assistant add-on supervisor writes
//! `/data/options.json` with only the user-facing options:
//!
//! ```json
//! { "mqtt_user": "mqtt", "mqtt_password": "secret",
//!   "devices": [ { "name": "Router", "ip": "192.168.1.1" } ] }
//! ```
//!
//! Standalone installs use TOML, which may additionally carry the `logger`,
//! `transport`, `scan` and `discovery` sections. Files ending in `.json` are
//! parsed as JSON, everything else as TOML. The configuration is loaded once
//! at startup and never changes afterwards.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use validator::Validate;

use self::{
    logger::LoggerConfig,
    scan::{DeviceEntry, DiscoveryConfig, ScanConfig},
};

pub mod logger;
pub mod scan;

pub const CONFIG_ENV: &str = "IOT_CHECKER_CONFIG";

const DEFAULT_PATHS: [&str; 2] = ["/data/options.json", "/etc/iot-checker/config.toml"];

#[doc(hidden)]
pub fn early_timestamp() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

/// Timestamped stdout lines for use before the tracing subscriber exists.
#[macro_export]
macro_rules! print_info {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            console::style($crate::config::early_timestamp()).dim(),
            console::style("INFO").green(),
            format_args!($($arg)*)
        );
    };
}

#[macro_export]
macro_rules! print_warn {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            console::style($crate::config::early_timestamp()).dim(),
            console::style("WARN").yellow(),
            format_args!($($arg)*)
        );
    };
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            console::style($crate::config::early_timestamp()).dim(),
            console::style("ERROR").red(),
            format_args!($($arg)*)
        );
    };
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error while reading configuration: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error while reading configuration: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type TransportConfig = iot_checker_mqtt::Config;

#[derive(Serialize, Deserialize, Debug, Validate, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// Broker username. Empty is the same as absent.
    pub mqtt_user: Option<String>,

    #[serde(skip_serializing)]
    pub mqtt_password: Option<String>,

    /// Devices to watch. Malformed entries are skipped, not rejected.
    pub devices: Vec<DeviceEntry>,

    #[validate(nested)]
    pub logger: LoggerConfig,

    #[validate(nested)]
    pub transport: TransportConfig,

    #[validate(nested)]
    pub scan: ScanConfig,

    #[validate(nested)]
    pub discovery: DiscoveryConfig,
}

impl Config {
    /// Locates and loads the configuration file.
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path()?;
        Self::load(&config_path)
    }

    /// `$IOT_CHECKER_CONFIG`, then `/data/options.json`, then
    /// `/etc/iot-checker/config.toml`.
    fn get_config_path() -> Result<PathBuf, ConfigError> {
        let from_env = std::env::var(CONFIG_ENV).ok();
        let path = resolve_config_path(from_env.as_deref(), &DEFAULT_PATHS)?;
        print_info!("Using config: {}", path.display());
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        print_info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::Config(format!(
                "File not found: {}",
                path.display()
            )));
        }

        let raw = fs::read_to_string(path)?;
        let config = Self::parse(&raw, is_json(path))?;

        config
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        print_info!("Successfully loaded config from: {}", path.display());
        Ok(config)
    }

    fn parse(raw: &str, json: bool) -> Result<Config, ConfigError> {
        if json {
            serde_json::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))
        } else {
            toml::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))
        }
    }

    /// Broker settings with the top-level credentials filled in.
    ///
    /// `mqtt_user`/`mqtt_password` take precedence over anything set in the
    /// `transport` section; empty strings count as unset.
    pub fn broker_config(&self) -> TransportConfig {
        let mut transport = self.transport.clone();
        if let Some(user) = non_empty(&self.mqtt_user) {
            transport.username = Some(user.to_string());
        }
        if let Some(pass) = non_empty(&self.mqtt_password) {
            transport.password = Some(pass.to_string());
        }
        transport
    }

    /// One-line broker description for the startup log. Names the user,
    /// never the password.
    pub fn broker_summary(&self) -> String {
        let broker = self.broker_config();
        let user = non_empty(&broker.username).unwrap_or("<anonymous>");
        format!("{}:{} as {}", broker.host, broker.port, user)
    }

    /// True when the broker session would be anonymous.
    pub fn credentials_missing(&self) -> bool {
        self.broker_config().credentials().is_none()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

fn resolve_config_path(from_env: Option<&str>, candidates: &[&str]) -> Result<PathBuf, ConfigError> {
    if let Some(path) = from_env.filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }

    candidates
        .iter()
        .map(Path::new)
        .find(|p| p.exists())
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            ConfigError::Config(format!(
                "No configuration file found. Set {CONFIG_ENV} or create one of: {}",
                candidates.join(", ")
            ))
        })
}
