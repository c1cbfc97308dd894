//! Periodic scan-and-publish loop.
//!
//! One cycle probes every device, feeds the results through the
//! [`StateTracker`] and hands the resulting messages to the [`Publisher`].
//! The next cycle starts `interval` after the previous one finished. The loop
//! never waits for the broker: state publishes only enqueue, and while the
//! session is down they are dropped rather than queued.

use std::sync::Arc;

use iot_checker_mqtt::TransferError;
use tokio::time::{sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{device::Device, scanner::Scanner, tracker::PublishAction, tracker::StateTracker};

/// Destination for outgoing messages.
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    /// Fire-and-forget. May drop the message when the broker is unavailable.
    async fn publish(&self, action: &PublishAction) -> Result<(), TransferError>;

    /// Waits until the message is queued. Defaults to [`Publisher::publish`].
    async fn publish_wait(&self, action: &PublishAction) -> Result<(), TransferError> {
        self.publish(action).await
    }
}

#[async_trait::async_trait]
impl Publisher for iot_checker_mqtt::Publisher {
    async fn publish(&self, action: &PublishAction) -> Result<(), TransferError> {
        iot_checker_mqtt::Publisher::publish(self, &action.metadata(), action.payload.clone())
    }

    async fn publish_wait(&self, action: &PublishAction) -> Result<(), TransferError> {
        iot_checker_mqtt::Publisher::publish_wait(self, &action.metadata(), action.payload.clone())
            .await
    }
}

/// Dropping a state message while disconnected, or on a full queue, is
/// expected during an outage and only worth a debug line.
pub(crate) fn log_publish_error(topic: &str, err: &TransferError) {
    match err {
        TransferError::NotConnected(_) | TransferError::ClientTransfer(_) => {
            debug!(topic, "Publish dropped: {err}")
        }
        _ => warn!(topic, "Publish failed: {err}"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleSummary {
    pub online: usize,
    pub offline: usize,
    /// Messages accepted by the publisher.
    pub published: usize,
    pub duration: Duration,
}

/// Periodic scan-and-publish loop over a fixed device list.
pub struct Executor {
    devices: Arc<[Device]>,
    scanner: Scanner,
    tracker: StateTracker,
    publisher: Arc<dyn Publisher>,
    interval: Duration,
}

impl Executor {
    /// Creates a new `Executor`.
    ///
    /// # Arguments
    ///
    /// * `devices` - Validated devices, probed in this order every cycle.
    /// * `scanner` - Probes all devices concurrently.
    /// * `tracker` - Remembers the last status and builds the state messages.
    /// * `publisher` - Destination for the state messages.
    /// * `interval` - Pause between the end of one cycle and the next.
    pub fn new(
        devices: Arc<[Device]>,
        scanner: Scanner,
        tracker: StateTracker,
        publisher: Arc<dyn Publisher>,
        interval: Duration,
    ) -> Self {
        Self {
            devices,
            scanner,
            tracker,
            publisher,
            interval,
        }
    }

    /// Probes every device once and publishes one state message per device.
    /// Publish failures are logged and never abort the cycle.
    pub async fn run_cycle(&mut self) -> CycleSummary {
        let start = Instant::now();

        let results = self.scanner.scan(&self.devices).await;
        let online = results.iter().filter(|r| r.status.is_online()).count();

        for result in &results {
            if let Some(error) = &result.error {
                debug!(device = %result.name, address = %result.address, "Unreachable: {error}");
            }
        }

        let mut published = 0;
        for action in self.tracker.apply(&results) {
            match self.publisher.publish(&action).await {
                Ok(()) => published += 1,
                Err(e) => log_publish_error(&action.topic, &e),
            }
        }

        CycleSummary {
            online,
            offline: results.len() - online,
            published,
            duration: start.elapsed(),
        }
    }

    /// Runs cycles until `cancel` fires. Cancellation is observed between
    /// cycles and during the pause; a cycle in progress is finished first.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            devices = self.devices.len(),
            "Monitoring started (interval: {}s)",
            self.interval.as_secs()
        );

        while !cancel.is_cancelled() {
            let summary = self.run_cycle().await;
            info!(
                online = summary.online,
                offline = summary.offline,
                published = summary.published,
                "Cycle finished in {:.2}s",
                summary.duration.as_secs_f64()
            );

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(self.interval) => {}
            }
        }

        info!("Monitoring stopped");
    }
}
