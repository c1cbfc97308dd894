//! Broker connection configuration.
//!
//! Every field has a default, so an empty `[transport]` table (or none at all)
//! yields a client pointed at the Home Assistant add-on broker
//! (`core-mosquitto:1883`). Constraints are declared with `validator`
//! attributes and checked by [`MqttManager::from_config`](crate::MqttManager::from_config).
//!
//! ```toml
//! [transport]
//! host = "mqtt.home.lan"
//! port = 1883
//! client_id = "iot_checker"
//! keep_alive = 60
//! reconnect_delay = 1
//! max_reconnect_delay = 60
//! reconnect_backoff_multiplier = 1.5
//! max_reconnect_attempts = 0  # unlimited
//! ```

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::backoff::Backoff;

#[derive(Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    /// Broker hostname or IP address. Resolved at connect time.
    #[validate(length(
        min = 1,
        max = 255,
        message = "Host must be between 1 and 255 characters"
    ))]
    pub host: String,

    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    /// MQTT client identifier. Empty generates a random UUID at build time.
    #[validate(length(max = 36, message = "Client ID must not exceed 36 characters"))]
    pub client_id: String,

    /// Keep-alive interval in seconds.
    #[validate(range(
        min = 5,
        max = 3600,
        message = "Keep alive must be between 5 and 3600 seconds"
    ))]
    pub keep_alive: u64,

    pub clean_session: bool,

    /// Maximum number of unacknowledged QoS 1/2 publishes.
    #[validate(range(
        min = 1,
        max = 1000,
        message = "Max inflight must be between 1 and 1000"
    ))]
    pub max_inflight: u16,

    /// Maximum packet size in bytes, applied to both directions.
    #[validate(range(
        min = 64,
        max = 1048576,
        message = "Max packet size must be between 64 bytes and 1 MiB"
    ))]
    pub max_packet_size: Option<u32>,

    /// Capacity of the client request queue.
    ///
    /// Publishes issued while the broker is unreachable wait here; once the
    /// queue is full further publishes are dropped until the link recovers.
    #[validate(range(
        min = 1,
        max = 10000,
        message = "Request channel capacity must be between 1 and 10000"
    ))]
    pub request_channel_capacity: usize,

    /// Initial reconnect delay in seconds.
    #[validate(range(
        min = 1,
        max = 60,
        message = "Reconnect delay must be between 1 and 60 seconds"
    ))]
    pub reconnect_delay: u64,

    /// Ceiling for the reconnect delay in seconds.
    #[validate(range(
        min = 1,
        max = 3600,
        message = "Max reconnect delay must be between 1 and 3600 seconds"
    ))]
    pub max_reconnect_delay: u64,

    /// Growth factor applied to the delay after each failed attempt.
    #[validate(range(
        min = 1.0,
        max = 10.0,
        message = "Reconnect backoff multiplier must be between 1.0 and 10.0"
    ))]
    pub reconnect_backoff_multiplier: f64,

    /// Give up after this many consecutive failures. `0` retries forever.
    pub max_reconnect_attempts: u32,

    /// Broker username. Credentials are only sent when both parts are set.
    pub username: Option<String>,

    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl Config {
    /// Username/password pair, if both are present and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }

    /// Reconnect schedule described by this configuration.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_secs(self.reconnect_delay),
            Duration::from_secs(self.max_reconnect_delay),
            self.reconnect_backoff_multiplier,
        )
        .with_max_attempts(self.max_reconnect_attempts)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "core-mosquitto".to_string(),
            port: 1883,
            client_id: "iot_checker".to_string(),
            keep_alive: 60,
            clean_session: true,
            max_inflight: 100,
            max_packet_size: None,
            request_channel_capacity: 512,
            reconnect_delay: 1,
            max_reconnect_delay: 60,
            reconnect_backoff_multiplier: 1.5,
            max_reconnect_attempts: 0,
            username: None,
            password: None,
        }
    }
}

// Hand-written so the password never lands in a debug log.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("keep_alive", &self.keep_alive)
            .field("clean_session", &self.clean_session)
            .field("max_inflight", &self.max_inflight)
            .field("max_packet_size", &self.max_packet_size)
            .field("request_channel_capacity", &self.request_channel_capacity)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("max_reconnect_delay", &self.max_reconnect_delay)
            .field(
                "reconnect_backoff_multiplier",
                &self.reconnect_backoff_multiplier,
            )
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Topic, QoS and retain flag of a single outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct EndpointMetadata {
    #[validate(range(max = 2, message = "Invalid QoS value, must be 0, 1, or 2"))]
    pub qos: u8,

    /// Concrete publish topic (no wildcards).
    #[validate(length(min = 1, message = "Topic must not be empty"))]
    pub topic: String,

    pub retain: bool,
}

impl EndpointMetadata {
    /// QoS 1 retained message on `topic`.
    pub fn retained(topic: impl Into<String>) -> Self {
        Self {
            qos: 1,
            topic: topic.into(),
            retain: true,
        }
    }
}
