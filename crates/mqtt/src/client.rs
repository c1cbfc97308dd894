//! Builder for the rumqttc client/event-loop pair.
//!
//! ```ignore
//! let (client, event_loop) = ClientBuilder::from_config(&config)?.build()?;
//! ```
//!
//! The client half is cheap to clone and is what publishers hold; the event
//! loop must be driven by exactly one task (the connection kernel).

use std::time::Duration;

use rumqttc::{AsyncClient, EventLoop, MqttOptions};
use tracing::debug;
use validator::Validate;

use super::{config::Config, error::TransferError};

pub struct ClientBuilder {
    opts: MqttOptions,

    /// Request queue capacity. Bounds how many publishes can wait while the
    /// broker is unreachable.
    cap: usize,
}

impl ClientBuilder {
    pub fn new(
        client_id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        cap: usize,
    ) -> Result<Self, TransferError> {
        if cap == 0 {
            return Err(TransferError::ClientSetup(
                "request channel capacity must be at least 1".into(),
            ));
        }
        Ok(Self {
            opts: MqttOptions::new(client_id, host, port),
            cap,
        })
    }

    /// Builds from a validated [`Config`].
    ///
    /// An empty `client_id` is replaced by a random UUID. Credentials are
    /// applied only when both username and password are non-empty; otherwise
    /// the session is anonymous.
    pub fn from_config(config: &Config) -> Result<Self, TransferError> {
        config.validate()?;

        let client_id = if config.client_id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            config.client_id.clone()
        };

        let mut builder = Self::new(
            client_id,
            config.host.clone(),
            config.port,
            config.request_channel_capacity,
        )?
        .keep_alive(config.keep_alive)
        .clean_session(config.clean_session)
        .max_inflight(config.max_inflight);

        if let Some(size) = config.max_packet_size {
            builder = builder.max_packet_size(size as usize, size as usize);
        }

        match config.credentials() {
            Some((user, pass)) => {
                debug!(user, "Using broker credentials");
                builder = builder.credentials(user, pass);
            }
            None => debug!("No broker credentials configured, connecting anonymously"),
        }

        Ok(builder)
    }

    pub fn keep_alive(mut self, secs: u64) -> Self {
        self.opts.set_keep_alive(Duration::from_secs(secs));
        self
    }

    pub fn max_packet_size(mut self, incoming: usize, outgoing: usize) -> Self {
        self.opts.set_max_packet_size(incoming, outgoing);
        self
    }

    pub fn clean_session(mut self, clean: bool) -> Self {
        self.opts.set_clean_session(clean);
        self
    }

    /// Sets CONNECT credentials. Sent in clear text over plain TCP.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.opts.set_credentials(username, password);
        self
    }

    pub fn max_inflight(mut self, max: u16) -> Self {
        self.opts.set_inflight(max);
        self
    }

    /// Consumes the builder. Nothing touches the network until the returned
    /// event loop is polled.
    pub fn build(self) -> Result<(AsyncClient, EventLoop), TransferError> {
        Ok(AsyncClient::new(self.opts, self.cap))
    }

    /// Broker address the client will dial.
    pub fn broker_address(&self) -> (String, u16) {
        self.opts.broker_address()
    }

    pub fn has_credentials(&self) -> bool {
        self.opts.credentials().is_some()
    }
}
