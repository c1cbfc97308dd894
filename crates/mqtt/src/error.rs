//! Error type for the MQTT session layer.
//!
//! Variants fall into three groups:
//!
//! **Setup** (caught at startup): `InvalidMetadata`, `ClientSetup`, `ConfigError`.
//!
//! **Publishing** (per message): `NotConnected`, `ClientTransfer`.
//!
//! **Connection** (handled inside the kernel, surfaced for logging):
//! `ClientConnection`, `RetriesPolicy`.
//!
//! None of the connection errors escape as a process failure; the kernel logs
//! them and keeps retrying.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    /// Topic or QoS of an outgoing message is unusable.
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    /// The client could not be constructed from the configuration.
    #[error("Client setup error: {0}")]
    ClientSetup(String),

    /// Broker configuration failed validation.
    #[error("Configuration error: {0}")]
    ConfigError(#[from] validator::ValidationErrors),

    /// The request could not be queued for the event loop.
    ///
    /// `try_publish` returns this when the request channel is full, which is
    /// the normal outcome of publishing during a long broker outage.
    #[error("Client transfer error: {0}")]
    ClientTransfer(#[from] rumqttc::ClientError),

    /// Broker unreachable, refused the CONNECT, or dropped the link.
    ///
    /// Boxed to keep the enum small.
    #[error("Client connection error: {0}")]
    ClientConnection(#[from] Box<rumqttc::ConnectionError>),

    /// A fire-and-forget publish was dropped because no session is up.
    #[error("Not connected to broker ({0})")]
    NotConnected(String),

    /// An explicit reconnect attempt limit was exhausted.
    #[error("Retry policy error: {0}")]
    RetriesPolicy(#[from] super::backoff::BackoffError),
}

impl From<rumqttc::ConnectionError> for TransferError {
    fn from(err: rumqttc::ConnectionError) -> Self {
        TransferError::ClientConnection(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_error_display() {
        let err = TransferError::InvalidMetadata("QoS must be 0-2".into());
        assert_eq!(err.to_string(), "Invalid metadata: QoS must be 0-2");
    }

    #[test]
    fn test_transfer_error_from_connection_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: TransferError = rumqttc::ConnectionError::Io(io_err).into();
        assert!(matches!(err, TransferError::ClientConnection(_)));
        assert!(err.to_string().contains("refused"));
    }

    #[test]
    fn test_not_connected_display() {
        let err = TransferError::NotConnected("Reconnecting".into());
        assert_eq!(err.to_string(), "Not connected to broker (Reconnecting)");
    }

    #[test]
    fn test_transfer_error_from_backoff() {
        let err: TransferError = crate::backoff::BackoffError::MaxAttemptLimitError(3).into();
        assert_eq!(
            err.to_string(),
            "Retry policy error: Maximum number of attempts exceeded: 3"
        );
    }
}
