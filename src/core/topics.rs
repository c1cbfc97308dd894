//! MQTT topic layout.

use crate::config::scan::DiscoveryConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    prefix: String,
    base: String,
}

impl Topics {
    pub fn new(prefix: impl Into<String>, base: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            base: base.into(),
        }
    }

    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self::new(config.prefix.clone(), config.base_topic.clone())
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// `<base>/<slug>/state`
    pub fn state(&self, slug: &str) -> String {
        format!("{}/{}/state", self.base, slug)
    }

    /// `<prefix>/binary_sensor/<base>/<slug>/config`
    pub fn discovery(&self, slug: &str) -> String {
        format!("{}/binary_sensor/{}/{}/config", self.prefix, self.base, slug)
    }

    /// `<base>_<slug>`
    pub fn unique_id(&self, slug: &str) -> String {
        format!("{}_{}", self.base, slug)
    }

    /// Shared identifier grouping all sensors under one HA device.
    pub fn device_identifier(&self) -> String {
        format!("{}_addon", self.base)
    }
}

impl Default for Topics {
    fn default() -> Self {
        Self::from_config(&DiscoveryConfig::default())
    }
}
