//! Logging configuration.
//!
//! ```toml
//! [logger]
//! level = "info"          # overridden by RUST_LOG when set
//!
//! [logger.console]
//! format = "compact"      # compact | pretty | json
//! ansi_colors = true
//!
//! [logger.journald]
//! enabled = false
//! identifier = "iot-checker"
//! ```

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggerConfig {
    /// trace, debug, info, warn or error (case-insensitive).
    #[validate(custom(function = "validate_log_level"))]
    pub level: String,

    #[validate(nested)]
    pub console: Option<ConsoleConfig>,

    #[validate(nested)]
    pub journald: Option<JournaldConfig>,
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => {
            let mut err = ValidationError::new("invalid_log_level");
            err.message = Some(format!("Invalid log level: {level}").into());
            Err(err)
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            level: "info".to_string(),
            console: Some(ConsoleConfig::default()),
            journald: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub format: LogFormat,

    /// Include the module path of each event.
    pub show_target: bool,
    pub show_thread_ids: bool,

    /// Emit span close events with timings.
    pub show_spans: bool,

    /// Disable when stdout is captured by a supervisor that does not render
    /// escape codes (the Home Assistant add-on log viewer does).
    pub ansi_colors: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        ConsoleConfig {
            enabled: true,
            format: LogFormat::default(),
            show_target: false,
            show_thread_ids: false,
            show_spans: false,
            ansi_colors: true,
        }
    }
}

/// systemd journald output, for installs outside the add-on container.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JournaldConfig {
    #[serde(default)]
    pub enabled: bool,

    #[validate(length(min = 1))]
    #[serde(default = "default_identifier")]
    pub identifier: String,
}

fn default_identifier() -> String {
    "iot-checker".to_string()
}

impl Default for JournaldConfig {
    fn default() -> Self {
        JournaldConfig {
            enabled: false,
            identifier: default_identifier(),
        }
    }
}
