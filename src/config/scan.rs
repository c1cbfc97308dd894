//! Probing schedule, discovery metadata and device entries.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// How and how often devices are probed.
///
/// ```toml
/// [scan]
/// interval = 60        # seconds between the end of one cycle and the next
/// probe_timeout = 1    # seconds to wait for each echo reply
/// probe_count = 1
/// concurrency = 50
/// ping_command = "ping"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ScanConfig {
    #[validate(range(
        min = 1,
        max = 86400,
        message = "Scan interval must be between 1 second and 1 day"
    ))]
    pub interval: u64,

    #[validate(range(
        min = 1,
        max = 60,
        message = "Probe timeout must be between 1 and 60 seconds"
    ))]
    pub probe_timeout: u64,

    #[validate(range(min = 1, max = 10, message = "Probe count must be between 1 and 10"))]
    pub probe_count: u32,

    /// Maximum number of probes in flight.
    #[validate(range(
        min = 1,
        max = 1024,
        message = "Concurrency must be between 1 and 1024"
    ))]
    pub concurrency: usize,

    /// Extra time, in milliseconds, granted to the probe process on top of
    /// its own timeout before it is killed.
    #[validate(range(max = 10000, message = "Probe grace must not exceed 10000 ms"))]
    pub probe_grace_ms: u64,

    #[validate(custom(function = "validate_command"))]
    pub ping_command: String,
}

fn validate_command(command: &str) -> Result<(), ValidationError> {
    if command.trim().is_empty() {
        let mut err = ValidationError::new("empty_command");
        err.message = Some("Ping command must not be empty".into());
        return Err(err);
    }
    Ok(())
}

impl ScanConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout)
    }

    /// Hard bound on a single probe: every echo may use its full timeout,
    /// plus the grace period.
    pub fn probe_deadline(&self) -> Duration {
        self.probe_timeout() * self.probe_count + Duration::from_millis(self.probe_grace_ms)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            interval: 60,
            probe_timeout: 1,
            probe_count: 1,
            concurrency: 50,
            probe_grace_ms: 500,
            ping_command: "ping".to_string(),
        }
    }
}

/// Home Assistant MQTT discovery settings.
///
/// `base_topic` also roots the state topics, so changing it moves every
/// `<base_topic>/<slug>/state` as well.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DiscoveryConfig {
    #[validate(custom(function = "validate_topic_level"))]
    pub prefix: String,

    #[validate(custom(function = "validate_topic_level"))]
    pub base_topic: String,

    /// Prepended to each device name to form the entity name.
    pub name_prefix: String,

    #[validate(length(min = 1, message = "Device name must not be empty"))]
    pub device_name: String,

    pub manufacturer: String,
    pub model: String,
}

/// A single, non-empty topic level without wildcards or separators.
fn validate_topic_level(level: &str) -> Result<(), ValidationError> {
    if level.is_empty() || level.contains(['/', '+', '#']) {
        let mut err = ValidationError::new("invalid_topic_level");
        err.message = Some(format!("Invalid topic level: '{level}'").into());
        return Err(err);
    }
    Ok(())
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            prefix: "homeassistant".to_string(),
            base_topic: "iot_checker".to_string(),
            name_prefix: "IoT ".to_string(),
            device_name: "IoT Network Checker".to_string(),
            manufacturer: "IoT Checker".to_string(),
            model: "Ping Checker".to_string(),
        }
    }
}

/// A device as written in the configuration file.
///
/// Both fields are optional so that one bad entry does not make the whole file
/// unreadable; entries are validated when the device list is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    #[serde(default)]
    pub name: Option<String>,

    /// IPv4/IPv6 literal or hostname.
    #[serde(default)]
    pub ip: Option<String>,
}

impl DeviceEntry {
    pub fn new(name: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ip: Some(ip.into()),
        }
    }
}
