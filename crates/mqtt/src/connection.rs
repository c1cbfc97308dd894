//! Connection kernel: drives the rumqttc event loop and owns reconnection.
//!
//! ```text
//! MqttManager ──spawn──> ConnectionKernel::run
//!                          │  poll() ──> CONNACK ──> SessionEvent::Connected
//!                          │         └─> error   ──> classify, log, SessionEvent::Lost,
//!                          │                         backoff sleep, poll again
//!                          └─ cancel ──> DISCONNECT (bounded flush) ──> return
//! ```
//!
//! No connection error terminates the process. Credentials the broker rejects
//! are logged as an authorization failure and retried on the normal schedule,
//! so fixing them on the broker side recovers without a restart.

use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, Outgoing, Packet,
};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::{
    backoff::Backoff,
    error::TransferError,
    state::{ConnectionState, SessionEvent},
};

/// Upper bound on how long shutdown waits for DISCONNECT to reach the socket.
const DISCONNECT_FLUSH: Duration = Duration::from_secs(2);

pub struct ConnectionKernel {
    client: AsyncClient,
    event_loop: EventLoop,
    backoff: Backoff,
    cancel: CancellationToken,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: Option<mpsc::UnboundedSender<SessionEvent>>,

    /// Successful connects so far.
    session: u64,
    connected: bool,
}

impl ConnectionKernel {
    pub fn new(
        client: AsyncClient,
        event_loop: EventLoop,
        backoff: Backoff,
        cancel: CancellationToken,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        Self {
            client,
            event_loop,
            backoff,
            cancel,
            state_tx,
            events_tx: None,
            session: 0,
            connected: false,
        }
    }

    /// Routes session events to `tx`. Must be called before [`run`](Self::run)
    /// for the first connect to be observed.
    pub fn with_session_events(mut self, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        self.events_tx = Some(tx);
        self
    }

    /// Publishes state changes on `tx` instead of a private channel, so
    /// receivers can exist before the kernel does.
    pub fn with_state(mut self, tx: watch::Sender<ConnectionState>) -> Self {
        self.state_tx = tx;
        self
    }

    fn update_state(&self, state: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state.clone();
                true
            }
        });
        if changed {
            debug!(state = %state, "Connection state changed");
        }
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.events_tx {
            if tx.send(event).is_err() {
                trace!("Session event receiver dropped");
            }
        }
    }

    /// Runs until cancelled, until every client handle is dropped, or until an
    /// explicit attempt limit is exhausted (the only `Err` case).
    pub async fn run(mut self) -> Result<(), TransferError> {
        self.update_state(ConnectionState::Connecting);
        info!("Starting connection event loop...");

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    info!("Shutdown signal received, disconnecting from broker");
                    self.disconnect().await;
                    self.update_state(ConnectionState::Disconnected("shutdown".into()));
                    return Ok(());
                }

                polled = self.event_loop.poll() => match polled {
                    Ok(event) => self.handle_event(event),
                    Err(err) => {
                        if !self.recover(err).await? {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Handles a poll error. Returns `Ok(false)` when the kernel should stop.
    async fn recover(&mut self, err: ConnectionError) -> Result<bool, TransferError> {
        let reason = get_error_message(&err);
        let disposition = classify_connection_error(&err);

        match disposition {
            Disposition::Closed => {
                info!("All client handles dropped, stopping connection kernel");
                self.mark_lost(reason.clone());
                self.update_state(ConnectionState::Disconnected(reason));
                return Ok(false);
            }
            Disposition::Unauthorized => error!(
                reason = %reason,
                "Broker rejected the connection: not authorized. Check mqtt_user and mqtt_password"
            ),
            Disposition::Misconfigured => {
                error!(reason = %reason, "Broker connection failed due to configuration")
            }
            Disposition::Transient => {
                if self.connected {
                    warn!(reason = %reason, "Connection to broker lost");
                } else {
                    warn!(reason = %reason, "Failed to connect to broker");
                }
            }
        }

        self.mark_lost(reason.clone());
        self.update_state(ConnectionState::Disconnected(reason));

        let delay = match self.backoff.next_sleep() {
            Ok(delay) => delay,
            Err(e) => {
                error!("Giving up on broker connection: {e}");
                self.update_state(ConnectionState::Disconnected(e.to_string()));
                return Err(e.into());
            }
        };

        info!(
            attempt = self.backoff.attempt(),
            "Reconnecting in {:.1} seconds",
            delay.as_secs_f64()
        );
        self.update_state(ConnectionState::Reconnecting(delay.as_secs_f64()));

        tokio::select! {
            _ = self.cancel.cancelled() => {
                // Nothing to flush, the link is already down.
                self.update_state(ConnectionState::Disconnected("shutdown".into()));
                return Ok(false);
            }
            _ = tokio::time::sleep(delay) => {}
        }

        self.update_state(ConnectionState::Connecting);
        Ok(true)
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code == ConnectReturnCode::Success {
                    self.session += 1;
                    self.connected = true;
                    self.backoff.reset();
                    info!(session = self.session, "Connected to MQTT broker");
                    self.update_state(ConnectionState::Connected);
                    self.emit(SessionEvent::Connected {
                        session: self.session,
                    });
                }
            }
            Event::Incoming(Packet::Disconnect) => {
                warn!("Disconnected by broker");
                self.mark_lost("Disconnected by broker".into());
                self.update_state(ConnectionState::Disconnected(
                    "Disconnected by broker".into(),
                ));
            }
            Event::Incoming(packet) => trace!("Incoming packet: {packet:?}"),
            Event::Outgoing(outgoing) => trace!("Outgoing packet: {outgoing:?}"),
        }
    }

    fn mark_lost(&mut self, reason: String) {
        if self.connected {
            self.connected = false;
            self.emit(SessionEvent::Lost {
                session: self.session,
                reason,
            });
        }
    }

    /// Best effort: queue DISCONNECT and keep polling until it has been
    /// written or the flush window closes.
    async fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        if let Err(e) = self.client.try_disconnect() {
            warn!("Error sending disconnect packet: {e}");
            return;
        }

        let event_loop = &mut self.event_loop;
        let flush = async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                    Ok(_) => continue,
                    Err(_) => break,
                }
            }
        };

        if tokio::time::timeout(DISCONNECT_FLUSH, flush).await.is_err() {
            debug!("Disconnect flush window elapsed");
        }
        self.mark_lost("shutdown".into());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    /// Broker refused the credentials.
    Unauthorized,
    /// Will keep failing until someone changes the setup.
    Misconfigured,
    Transient,
    /// Every `AsyncClient` handle is gone; nothing can publish anymore.
    Closed,
}

pub(crate) fn classify_connection_error(err: &ConnectionError) -> Disposition {
    use Disposition::*;

    match err {
        ConnectionError::ConnectionRefused(code) => match code {
            ConnectReturnCode::BadUserNamePassword | ConnectReturnCode::NotAuthorized => {
                Unauthorized
            }
            ConnectReturnCode::RefusedProtocolVersion | ConnectReturnCode::BadClientId => {
                Misconfigured
            }
            _ => Transient,
        },

        ConnectionError::RequestsDone => Closed,

        ConnectionError::Tls(_) => Misconfigured,

        ConnectionError::Io(e) => match e.kind() {
            std::io::ErrorKind::AddrInUse
            | std::io::ErrorKind::PermissionDenied
            | std::io::ErrorKind::InvalidInput => Misconfigured,
            _ => Transient,
        },

        // Timeouts, protocol hiccups, unexpected packets: retry.
        _ => Transient,
    }
}

/// Innermost message of an error chain, without surrounding quotes.
pub(crate) fn get_error_message(e: &dyn std::error::Error) -> String {
    let mut current = e;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string().trim_matches('"').to_string()
}
