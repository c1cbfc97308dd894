//! Assembly of client, kernel and supervisor.
//!
//! ```ignore
//! let manager = MqttManager::from_config(config)?;
//! let registrar = Arc::new(MyHook::new(manager.publisher()));
//! let publisher = manager.publisher();
//! let instance = manager.with_handler(registrar).build_and_start().await?;
//!
//! publisher.publish(&EndpointMetadata::retained("a/b"), "on")?;
//! instance.shutdown().await;
//! ```
//!
//! `build_and_start` returns as soon as the background tasks are spawned; it
//! does not wait for the broker. Until the first CONNACK, fire-and-forget
//! publishes are refused and only `publish_wait` messages are queued.

use std::{sync::Arc, time::Duration};

use rumqttc::{AsyncClient, EventLoop};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    client::ClientBuilder,
    config::Config,
    connection::ConnectionKernel,
    error::TransferError,
    publisher::Publisher,
    state::ConnectionState,
    supervisor::{SessionHandler, Supervisor},
};

/// How long `shutdown` waits for the kernel to flush DISCONNECT and exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

pub struct MqttManager {
    config: Config,
    client: AsyncClient,
    event_loop: EventLoop,
    handlers: Vec<Arc<dyn SessionHandler>>,
    cancel_token: CancellationToken,
    state_tx: watch::Sender<ConnectionState>,
}

impl MqttManager {
    /// Validates `config` and creates the client. Nothing is dialled yet.
    pub fn from_config(config: Config) -> Result<Self, TransferError> {
        let (client, event_loop) = ClientBuilder::from_config(&config)?.build()?;
        Ok(Self {
            config,
            client,
            event_loop,
            handlers: Vec::new(),
            cancel_token: CancellationToken::new(),
            state_tx: watch::channel(ConnectionState::Connecting).0,
        })
    }

    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, TransferError> {
        Self::from_config(Config {
            host: host.into(),
            port,
            ..Default::default()
        })
    }

    /// Publisher bound to this manager's client and connection state. Usable
    /// before the kernel starts, so session handlers can be built with one.
    pub fn publisher(&self) -> Publisher {
        Publisher::new(self.client.clone(), self.state_tx.subscribe())
    }

    /// Registers a hook that runs on every successful connect.
    pub fn with_handler(mut self, handler: Arc<dyn SessionHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Spawns the supervisor and the connection kernel.
    pub async fn build_and_start(self) -> Result<MqttInstance, TransferError> {
        info!(
            host = %self.config.host,
            port = self.config.port,
            client_id = %self.config.client_id,
            handlers = self.handlers.len(),
            "Starting MQTT session"
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let mut supervisor = Supervisor::new(events_rx, self.cancel_token.clone());
        for handler in self.handlers {
            supervisor.register(handler);
        }

        let kernel = ConnectionKernel::new(
            self.client.clone(),
            self.event_loop,
            self.config.backoff(),
            self.cancel_token.clone(),
        )
        .with_session_events(events_tx)
        .with_state(self.state_tx.clone());
        let state_rx = self.state_tx.subscribe();

        // Handlers are in place before the first poll.
        let supervisor_task = supervisor.spawn();
        let kernel_task = tokio::spawn(async move {
            if let Err(e) = kernel.run().await {
                error!("MQTT connection kernel stopped: {e}");
            }
        });

        Ok(MqttInstance {
            state_rx,
            cancel_token: self.cancel_token,
            kernel_task,
            supervisor_task,
        })
    }
}

/// Running MQTT session returned by [`MqttManager::build_and_start`].
pub struct MqttInstance {
    state_rx: watch::Receiver<ConnectionState>,
    cancel_token: CancellationToken,
    kernel_task: JoinHandle<()>,
    supervisor_task: JoinHandle<()>,
}

impl MqttInstance {
    pub fn is_connected(&self) -> bool {
        self.state_rx.borrow().is_connected()
    }

    /// Stops the session. The kernel sends DISCONNECT if connected; each
    /// background task gets at most the grace period to exit.
    pub async fn shutdown(self) {
        self.cancel_token.cancel();

        match tokio::time::timeout(SHUTDOWN_GRACE, self.kernel_task).await {
            Ok(Ok(())) => debug!("Connection kernel stopped"),
            Ok(Err(e)) => warn!("Connection kernel task failed: {e}"),
            Err(_) => warn!("Connection kernel did not stop within {SHUTDOWN_GRACE:?}"),
        }

        // A handler may be parked in `publish_wait`.
        let supervisor = self.supervisor_task.abort_handle();
        match tokio::time::timeout(SHUTDOWN_GRACE, self.supervisor_task).await {
            Ok(Ok(())) => debug!("Supervisor stopped"),
            Ok(Err(e)) => warn!("Supervisor task failed: {e}"),
            Err(_) => {
                warn!("Supervisor did not stop within {SHUTDOWN_GRACE:?}, aborting");
                supervisor.abort();
            }
        }
        info!("MQTT session closed");
    }
}
