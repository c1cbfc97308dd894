//! # iot-checker-mqtt: MQTT session with reconnect backoff and connect hooks
//!
//! A thin layer over `rumqttc` for a long-running publisher that must keep
//! working while the broker comes and goes:
//!
//! - a **connection kernel** that polls the event loop, classifies failures
//!   (authorization, configuration, transient) and retries on an exponential
//!   schedule without ever giving up by default
//! - **session hooks**: every successful connect is delivered exactly once to
//!   each registered [`SessionHandler`]
//! - a **publisher** with two paths: fire-and-forget publishes are refused
//!   while no session is up, so an outage never fills the request queue, and
//!   `publish_wait` awaits queue space for messages that must not be lost
//!
//! ```ignore
//! use std::sync::Arc;
//! use iot_checker_mqtt::{Config, EndpointMetadata, MqttManager};
//!
//! let manager = MqttManager::from_config(Config::default())?;
//! let publisher = manager.publisher();
//! let hook = Arc::new(Announce::new(manager.publisher()));
//! let instance = manager.with_handler(hook).build_and_start().await?;
//!
//! publisher.publish(&EndpointMetadata::retained("iot_checker/router/state"), "online")?;
//!
//! instance.shutdown().await;
//! ```
//!
//! ## Reconnect schedule
//!
//! ```text
//! Attempt 1: wait 1.0s
//! Attempt 2: wait 1.5s
//! Attempt 3: wait 2.25s
//! ...
//! Attempt 11+: wait 60s (capped)
//! ```
//!
//! All four numbers are configurable through [`Config`]; a non-zero
//! `max_reconnect_attempts` turns the schedule into a give-up policy.

pub mod backoff;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod manager;
pub mod publisher;
pub mod state;
pub mod supervisor;

pub use backoff::{Backoff, BackoffError};
pub use client::ClientBuilder;
pub use config::{Config, EndpointMetadata};
pub use connection::ConnectionKernel;
pub use error::TransferError;
pub use manager::{MqttInstance, MqttManager};
pub use publisher::Publisher;
pub use state::{ConnectionState, SessionEvent};
pub use supervisor::{SessionHandler, Supervisor};

pub type Result<T> = std::result::Result<T, TransferError>;
