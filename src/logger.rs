//! Global `tracing` subscriber setup.
//!
//! The console layer writes to stdout, which is what the Home Assistant
//! add-on log viewer captures. `RUST_LOG`, when set, replaces the configured
//! level for every layer.

use std::io;

use thiserror::Error;
use tracing_subscriber::{fmt, fmt::format::FmtSpan, prelude::*, EnvFilter, Layer, Registry};
use validator::{Validate, ValidationErrors};

use crate::{
    config::logger::{ConsoleConfig, LogFormat, LoggerConfig},
    print_info, print_warn,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Logger configuration validation error: {0}")]
    ValidationError(#[from] ValidationErrors),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to install global subscriber: {0}")]
    InitializationError(String),

    #[error("No logging layers were configured or successfully initialized")]
    NoLayersConfigured,

    /// Journald was requested but unavailable and there is no console to fall
    /// back on.
    #[error("Failed to initialize journald logger and console output is disabled")]
    JournaldUnavailable,
}

pub struct LoggerManager {
    config: LoggerConfig,
}

impl LoggerManager {
    pub fn new(config: LoggerConfig) -> Result<Self, LoggerError> {
        config.validate()?;
        Ok(LoggerManager { config })
    }

    /// Installs the global subscriber. Call once, before the first event.
    pub fn init(&self) -> Result<(), LoggerError> {
        let layers = self.build_layers()?;
        tracing_subscriber::registry()
            .with(layers)
            .try_init()
            .map_err(|e| LoggerError::InitializationError(e.to_string()))
    }

    fn build_layers(&self) -> Result<Vec<BoxedLayer>, LoggerError> {
        let mut layers = Vec::new();
        let console_enabled = self.config.console.as_ref().is_some_and(|c| c.enabled);

        if let Some(console) = self.config.console.as_ref().filter(|c| c.enabled) {
            layers.push(console_layer(console, self.filter()));
        }

        if let Some(journald) = self.config.journald.as_ref().filter(|j| j.enabled) {
            match tracing_journald::layer() {
                Ok(layer) => {
                    let layer = layer.with_syslog_identifier(journald.identifier.clone());
                    layers.push(layer.with_filter(self.filter()).boxed());
                    print_info!(
                        "Journald logger initialized with identifier: {}",
                        journald.identifier
                    );
                }
                Err(e) => {
                    print_warn!("Failed to initialize journald logger: {}", e);
                    if !console_enabled {
                        return Err(LoggerError::JournaldUnavailable);
                    }
                }
            }
        }

        if layers.is_empty() {
            return Err(LoggerError::NoLayersConfigured);
        }
        Ok(layers)
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.config.level))
    }
}

fn console_layer(config: &ConsoleConfig, filter: EnvFilter) -> BoxedLayer {
    let spans = if config.show_spans {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let base = fmt::layer()
        .with_target(config.show_target)
        .with_thread_ids(config.show_thread_ids)
        .with_span_events(spans)
        .with_ansi(config.ansi_colors)
        .with_writer(io::stdout);

    match config.format {
        LogFormat::Json => base.json().with_filter(filter).boxed(),
        LogFormat::Pretty => base.pretty().with_filter(filter).boxed(),
        LogFormat::Compact => base.compact().with_filter(filter).boxed(),
    }
}
