//! Host reachability probing.
//!
//! [`Prober`] is the seam between the scanner and the operating system. The
//! production implementation shells out to `ping`; tests substitute their own.
//! A probe never fails: every problem is reported as
//! [`Reachability::Unreachable`] with a reason.

use std::{process::Stdio, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::trace;

use crate::config::scan::ScanConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reachability {
    Reachable,
    Unreachable { reason: Option<String> },
}

impl Reachability {
    pub fn is_reachable(&self) -> bool {
        matches!(self, Reachability::Reachable)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Reachability::Reachable => None,
            Reachability::Unreachable { reason } => reason.as_deref(),
        }
    }
}

#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, address: &str) -> Reachability;
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("failed waiting for probe process: {0}")]
    Wait(std::io::Error),

    /// Non-zero exit. For `ping` this means no reply (1) or an error (2).
    #[error("exit status {0}")]
    Exit(i32),

    #[error("terminated by signal")]
    Signal,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Rejected before spawning so it cannot be read as a command-line option.
    #[error("invalid address '{0}'")]
    InvalidAddress(String),
}

/// Runs `<command> -c <count> -W <timeout> <address>`.
#[derive(Debug, Clone)]
pub struct PingProber {
    command: String,
    count: u32,
    timeout: Duration,
    deadline: Duration,
}

impl PingProber {
    /// Creates a new `PingProber`.
    ///
    /// # Arguments
    ///
    /// * `command` - Executable to run, normally `ping`.
    /// * `count` - Echo requests per probe, at least one.
    /// * `timeout` - Per-reply wait passed as `-W`.
    /// * `deadline` - Hard limit on the whole child process.
    pub fn new(command: impl Into<String>, count: u32, timeout: Duration, deadline: Duration) -> Self {
        Self {
            command: command.into(),
            count: count.max(1),
            timeout,
            deadline,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(
            config.ping_command.clone(),
            config.probe_count,
            config.probe_timeout(),
            config.probe_deadline(),
        )
    }

    async fn run(&self, address: &str) -> Result<(), ProbeError> {
        if address.starts_with('-') || address.chars().any(char::is_whitespace) {
            return Err(ProbeError::InvalidAddress(address.to_string()));
        }

        let mut child = Command::new(&self.command)
            .arg("-c")
            .arg(self.count.to_string())
            .arg("-W")
            .arg(self.timeout.as_secs().max(1).to_string())
            .arg(address)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProbeError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        let status = match tokio::time::timeout(self.deadline, child.wait()).await {
            Ok(waited) => waited.map_err(ProbeError::Wait)?,
            Err(_) => {
                // kill_on_drop would reap it too; kill now so it is gone
                // before the next cycle starts.
                let _ = child.kill().await;
                return Err(ProbeError::Timeout(self.deadline));
            }
        };

        if status.success() {
            return Ok(());
        }
        match status.code() {
            Some(code) => Err(ProbeError::Exit(code)),
            None => Err(ProbeError::Signal),
        }
    }
}

#[async_trait]
impl Prober for PingProber {
    async fn probe(&self, address: &str) -> Reachability {
        match self.run(address).await {
            Ok(()) => Reachability::Reachable,
            Err(e) => {
                trace!(address, error = %e, "Probe failed");
                Reachability::Unreachable {
                    reason: Some(e.to_string()),
                }
            }
        }
    }
}
