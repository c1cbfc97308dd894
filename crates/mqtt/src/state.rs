//! Connection state and session events.
//!
//! [`ConnectionState`] is the level-triggered view of the link, broadcast on a
//! watch channel (latest value wins). [`SessionEvent`] is the edge-triggered
//! view: one event per CONNACK and one per loss, delivered in order over an
//! mpsc channel so connect hooks never miss a session.

use std::fmt;

/// Current state of the broker connection.
///
/// ```text
/// Connecting ──(CONNACK)──> Connected
///     ▲                         │
///     │                  (poll error)
///     │                         ▼
/// Reconnecting(secs) <── Disconnected(reason)
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Waiting for the event loop to establish TCP and receive CONNACK.
    Connecting,

    /// CONNACK accepted; publishes reach the broker.
    Connected,

    /// Link lost or refused. The string is the root-cause message.
    Disconnected(String),

    /// Sleeping for the given number of seconds before the next attempt.
    Reconnecting(f64),
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnected(_) => "Disconnected",
            ConnectionState::Reconnecting(_) => "Reconnecting",
        }
    }

    /// Reason for `Disconnected`, delay for `Reconnecting`, empty otherwise.
    pub fn details(&self) -> String {
        match self {
            ConnectionState::Connecting | ConnectionState::Connected => String::new(),
            ConnectionState::Disconnected(reason) => reason.clone(),
            ConnectionState::Reconnecting(seconds) => format!("in {seconds:.1} seconds"),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting(_)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())?;
        let details = self.details();
        if !details.is_empty() {
            write!(f, " ({details})")?;
        }
        Ok(())
    }
}

/// Edge event emitted by the connection kernel.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A CONNACK was accepted. `session` counts successful connects from 1.
    Connected { session: u64 },

    /// An established session ended.
    Lost { session: u64, reason: String },
}
