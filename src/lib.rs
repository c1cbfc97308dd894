//! iot-checker: LAN device presence monitor for Home Assistant.
//!
//! Every configured device is pinged on a fixed interval and its `online` or
//! `offline` state is published to MQTT as a retained message. Each device is
//! announced once per broker session through Home Assistant MQTT discovery as
//! a `binary_sensor` with device class `connectivity`.
//!
//! ## Modules
//!
//! * `config`: configuration structures, loading (JSON add-on options or
//!   TOML), validation via the `validator` crate, and defaults.
//!
//! * `core`: the runtime:
//!   - device normalization and slugs
//!   - the ping prober and the concurrent scanner
//!   - state tracking and change logging
//!   - discovery registration and the scan executor
//!
//! * `logger`: `tracing` initialization with console output (compact,
//!   pretty, JSON) and optional systemd journald integration.
//!
//! The MQTT session itself lives in the `iot_checker_mqtt` crate.

pub mod config;
pub mod core;
pub mod logger;
