//! Validated devices and their reachability status.

use std::fmt;

use tracing::warn;

use super::slug::slugify;
use crate::config::scan::DeviceEntry;

/// A device that passed validation. Immutable for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    name: String,
    address: String,
    slug: String,
}

/// Why a configuration entry was not turned into a [`Device`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidDevice {
    #[error("missing or empty name")]
    MissingName,

    #[error("missing or empty ip")]
    MissingAddress,

    #[error("name has no characters usable in a topic")]
    EmptySlug,
}

impl Device {
    /// Validates a raw entry. Surrounding whitespace is trimmed from both
    /// fields.
    pub fn from_entry(entry: &DeviceEntry) -> Result<Self, InvalidDevice> {
        let name = entry
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or(InvalidDevice::MissingName)?;
        let address = entry
            .ip
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .ok_or(InvalidDevice::MissingAddress)?;

        let slug = slugify(name);
        if slug.is_empty() {
            return Err(InvalidDevice::EmptySlug);
        }

        Ok(Self {
            name: name.to_string(),
            address: address.to_string(),
            slug,
        })
    }

    /// Builds the device list, skipping and logging every invalid entry once.
    pub fn from_entries(entries: &[DeviceEntry]) -> Vec<Device> {
        entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| match Device::from_entry(entry) {
                Ok(device) => Some(device),
                Err(reason) => {
                    warn!(
                        index,
                        name = entry.name.as_deref().unwrap_or(""),
                        ip = entry.ip.as_deref().unwrap_or(""),
                        "Skipping device entry: {reason}"
                    );
                    None
                }
            })
            .collect()
    }

    /// Display name as configured, trimmed.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Host name or IP address handed to the prober.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Topic-safe form of the name. See [`slugify`].
    pub fn slug(&self) -> &str {
        &self.slug
    }
}

/// Result of the most recent probe of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceStatus {
    Online,
    Offline,
}

impl DeviceStatus {
    /// Wire form, also the Home Assistant `payload_on`/`payload_off` values.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Online => "online",
            DeviceStatus::Offline => "offline",
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, DeviceStatus::Online)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
