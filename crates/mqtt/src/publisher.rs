//! Publishing over the shared client request queue.
//!
//! Two paths with different guarantees:
//!
//! - [`Publisher::publish`] is fire-and-forget. It goes through
//!   `AsyncClient::try_publish` and is refused outright while no session is
//!   up, so periodic messages never pile up in the queue during an outage.
//! - [`Publisher::publish_wait`] awaits room in the queue. Use it for messages
//!   that must not be lost once a session exists, such as connect-time
//!   registrations.

use rumqttc::{AsyncClient, QoS};
use tokio::sync::watch;
use tracing::trace;
use validator::Validate;

use super::{config::EndpointMetadata, error::TransferError, state::ConnectionState};

#[derive(Clone)]
pub struct Publisher {
    client: AsyncClient,
    state: watch::Receiver<ConnectionState>,
}

impl Publisher {
    /// Creates a publisher on `client` that consults `state` before every
    /// fire-and-forget publish.
    pub fn new(client: AsyncClient, state: watch::Receiver<ConnectionState>) -> Self {
        Self { client, state }
    }

    /// Queues `payload` for `metadata.topic` without waiting.
    ///
    /// # Errors
    /// - `NotConnected` while the session is down; the message is dropped
    /// - `ClientTransfer` when the request queue is full
    /// - `InvalidMetadata` for an empty topic or a QoS above 2
    pub fn publish(
        &self,
        metadata: &EndpointMetadata,
        payload: impl Into<Vec<u8>>,
    ) -> Result<(), TransferError> {
        let qos = prepare(metadata)?;
        {
            let state = self.state.borrow();
            if !state.is_connected() {
                return Err(TransferError::NotConnected(state.as_str().to_string()));
            }
        }
        let payload = payload.into();

        trace!(
            topic = %metadata.topic,
            bytes = payload.len(),
            retain = metadata.retain,
            "Queueing publish"
        );
        self.client
            .try_publish(metadata.topic.as_str(), qos, metadata.retain, payload)?;
        Ok(())
    }

    /// Queues `payload`, waiting for room in the request queue if necessary.
    ///
    /// Does not check the session state. Fails only when the metadata is
    /// invalid or the event loop is gone.
    pub async fn publish_wait(
        &self,
        metadata: &EndpointMetadata,
        payload: impl Into<Vec<u8>>,
    ) -> Result<(), TransferError> {
        let qos = prepare(metadata)?;
        let payload = payload.into();

        trace!(
            topic = %metadata.topic,
            bytes = payload.len(),
            retain = metadata.retain,
            "Queueing publish (waiting for space)"
        );
        self.client
            .publish(metadata.topic.as_str(), qos, metadata.retain, payload)
            .await?;
        Ok(())
    }
}

fn prepare(metadata: &EndpointMetadata) -> Result<QoS, TransferError> {
    metadata
        .validate()
        .map_err(|e| TransferError::InvalidMetadata(e.to_string()))?;
    qos_from_u8(metadata.qos)
}

fn qos_from_u8(qos: u8) -> Result<QoS, TransferError> {
    match qos {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(TransferError::InvalidMetadata(format!(
            "QoS must be 0, 1 or 2, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rumqttc::MqttOptions;

    use super::*;

    fn publisher(
        cap: usize,
        state: ConnectionState,
    ) -> (Publisher, rumqttc::EventLoop, watch::Sender<ConnectionState>) {
        let (client, event_loop) = AsyncClient::new(MqttOptions::new("test", "127.0.0.1", 9), cap);
        let (state_tx, state_rx) = watch::channel(state);
        (Publisher::new(client, state_rx), event_loop, state_tx)
    }

    #[test]
    fn test_qos_mapping() {
        assert_eq!(qos_from_u8(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(qos_from_u8(1).unwrap(), QoS::AtLeastOnce);
        assert_eq!(qos_from_u8(2).unwrap(), QoS::ExactlyOnce);
        assert!(matches!(
            qos_from_u8(3),
            Err(TransferError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_publish_is_queued_while_connected() {
        let (publisher, _event_loop, _state) = publisher(4, ConnectionState::Connected);
        let metadata = EndpointMetadata::retained("iot_checker/router/state");
        assert!(publisher.publish(&metadata, "online").is_ok());
        assert!(publisher.publish(&metadata, "offline").is_ok());
    }

    #[test]
    fn test_publish_is_refused_while_disconnected() {
        let (publisher, _event_loop, state) = publisher(4, ConnectionState::Connecting);
        let metadata = EndpointMetadata::retained("iot_checker/router/state");

        let result = publisher.publish(&metadata, "online");
        assert!(matches!(result, Err(TransferError::NotConnected(_))));

        state.send_replace(ConnectionState::Reconnecting(1.5));
        assert!(matches!(
            publisher.publish(&metadata, "online"),
            Err(TransferError::NotConnected(_))
        ));

        state.send_replace(ConnectionState::Connected);
        assert!(publisher.publish(&metadata, "online").is_ok());
    }

    #[test]
    fn test_outage_leaves_queue_free() {
        let (publisher, _event_loop, state) = publisher(2, ConnectionState::Disconnected("down".into()));
        let metadata = EndpointMetadata::retained("a/b");

        for _ in 0..10 {
            assert!(publisher.publish(&metadata, "offline").is_err());
        }

        state.send_replace(ConnectionState::Connected);
        assert!(publisher.publish(&metadata, "first").is_ok());
        assert!(publisher.publish(&metadata, "second").is_ok());
    }

    #[test]
    fn test_full_queue_rejects_instead_of_blocking() {
        let (publisher, _event_loop, _state) = publisher(1, ConnectionState::Connected);
        let metadata = EndpointMetadata::retained("a/b");

        assert!(publisher.publish(&metadata, "first").is_ok());
        let second = publisher.publish(&metadata, "second");
        assert!(matches!(second, Err(TransferError::ClientTransfer(_))));
    }

    #[test]
    fn test_empty_topic_is_rejected() {
        let (publisher, _event_loop, _state) = publisher(4, ConnectionState::Connected);
        let result = publisher.publish(&EndpointMetadata::retained(""), "x");
        assert!(matches!(result, Err(TransferError::InvalidMetadata(_))));
    }

    #[tokio::test]
    async fn test_publish_wait_ignores_session_state() {
        let (publisher, _event_loop, _state) = publisher(4, ConnectionState::Connecting);
        let metadata = EndpointMetadata::retained("homeassistant/binary_sensor/x/config");
        assert!(publisher.publish_wait(&metadata, "{}").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_wait_blocks_on_full_queue() {
        let (publisher, event_loop, _state) = publisher(1, ConnectionState::Connected);
        let metadata = EndpointMetadata::retained("a/b");
        assert!(publisher.publish(&metadata, "backlog").is_ok());

        let waiting =
            tokio::time::timeout(Duration::from_secs(5), publisher.publish_wait(&metadata, "x"))
                .await;
        assert!(waiting.is_err(), "publish_wait returned while the queue was full");

        // Without an event loop there is nobody left to make room.
        drop(event_loop);
        let result = publisher.publish_wait(&metadata, "x").await;
        assert!(matches!(result, Err(TransferError::ClientTransfer(_))));
    }

    #[tokio::test]
    async fn test_publish_wait_validates_metadata() {
        let (publisher, _event_loop, _state) = publisher(4, ConnectionState::Connected);
        let bad = EndpointMetadata {
            qos: 5,
            topic: "a/b".into(),
            retain: false,
        };
        let result = publisher.publish_wait(&bad, "x").await;
        assert!(matches!(result, Err(TransferError::InvalidMetadata(_))));
    }
}
