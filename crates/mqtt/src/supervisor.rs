//! Session event dispatch.
//!
//! The kernel reports every CONNACK and every loss as a [`SessionEvent`]. The
//! supervisor owns the receiving end and fans each event out to the registered
//! [`SessionHandler`]s in registration order. Handlers are registered before
//! the kernel is spawned, so the first connect is always delivered.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::state::SessionEvent;

/// Hook invoked on session boundaries.
///
/// Implementations run on the supervisor task; a slow handler delays later
/// events but never the connection kernel.
#[async_trait]
pub trait SessionHandler: Send + Sync {
    /// Called once per successful connect. `session` counts from 1.
    async fn on_connected(&self, session: u64);

    async fn on_lost(&self, _session: u64, _reason: &str) {}
}

pub struct Supervisor {
    events: mpsc::UnboundedReceiver<SessionEvent>,
    handlers: Vec<Arc<dyn SessionHandler>>,
    cancel: CancellationToken,
}

impl Supervisor {
    pub fn new(events: mpsc::UnboundedReceiver<SessionEvent>, cancel: CancellationToken) -> Self {
        Self {
            events,
            handlers: Vec::new(),
            cancel,
        }
    }

    pub fn register(&mut self, handler: Arc<dyn SessionHandler>) {
        self.handlers.push(handler);
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Dispatches events until cancelled or until the kernel drops its sender.
    /// Cancellation also interrupts a handler that is still running.
    pub async fn run(mut self) {
        debug!(handlers = self.handlers.len(), "Supervisor started");

        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = self.events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.dispatch(event) => {}
            }
        }

        debug!("Supervisor stopped");
    }

    async fn dispatch(&self, event: SessionEvent) {
        match event {
            SessionEvent::Connected { session } => {
                if session > 1 {
                    info!(session, "Reconnected to broker, running connect hooks");
                }
                for handler in &self.handlers {
                    handler.on_connected(session).await;
                }
            }
            SessionEvent::Lost { session, reason } => {
                debug!(session, reason = %reason, "Session lost");
                for handler in &self.handlers {
                    handler.on_lost(session, &reason).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicU64, Ordering},
        time::Duration,
    };

    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct CountingHandler {
        connects: AtomicU64,
        losses: AtomicU64,
        sessions: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl SessionHandler for CountingHandler {
        async fn on_connected(&self, session: u64) {
            self.connects.fetch_add(1, Ordering::SeqCst);
            self.sessions.lock().await.push(session);
        }

        async fn on_lost(&self, _session: u64, _reason: &str) {
            self.losses.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_every_connect_triggers_exactly_one_call() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = Arc::new(CountingHandler::default());
        let mut supervisor = Supervisor::new(rx, CancellationToken::new());
        supervisor.register(handler.clone());
        let task = supervisor.spawn();

        // Flapping broker: three sessions, two losses.
        tx.send(SessionEvent::Connected { session: 1 }).unwrap();
        tx.send(SessionEvent::Lost {
            session: 1,
            reason: "reset".into(),
        })
        .unwrap();
        tx.send(SessionEvent::Connected { session: 2 }).unwrap();
        tx.send(SessionEvent::Lost {
            session: 2,
            reason: "timeout".into(),
        })
        .unwrap();
        tx.send(SessionEvent::Connected { session: 3 }).unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(handler.connects.load(Ordering::SeqCst), 3);
        assert_eq!(handler.losses.load(Ordering::SeqCst), 2);
        assert_eq!(*handler.sessions.lock().await, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_event_sent_before_spawn_is_delivered() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(SessionEvent::Connected { session: 1 }).unwrap();
        drop(tx);

        let handler = Arc::new(CountingHandler::default());
        let mut supervisor = Supervisor::new(rx, CancellationToken::new());
        supervisor.register(handler.clone());
        supervisor.run().await;

        assert_eq!(handler.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_handlers_are_called() {
        let (tx, rx) = mpsc::unbounded_channel();
        let first = Arc::new(CountingHandler::default());
        let second = Arc::new(CountingHandler::default());
        let mut supervisor = Supervisor::new(rx, CancellationToken::new());
        supervisor.register(first.clone());
        supervisor.register(second.clone());

        tx.send(SessionEvent::Connected { session: 1 }).unwrap();
        drop(tx);
        supervisor.run().await;

        assert_eq!(first.connects.load(Ordering::SeqCst), 1);
        assert_eq!(second.connects.load(Ordering::SeqCst), 1);
    }

    struct StuckHandler;

    #[async_trait]
    impl SessionHandler for StuckHandler {
        async fn on_connected(&self, _session: u64) {
            std::future::pending::<()>().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_running_handler() {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let mut supervisor = Supervisor::new(rx, cancel.clone());
        supervisor.register(Arc::new(StuckHandler));
        let task = supervisor.spawn();

        tx.send(SessionEvent::Connected { session: 1 }).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), task).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_supervisor_stops_on_cancel() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = Supervisor::new(rx, cancel.clone()).spawn();

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), task).await;
        assert!(result.is_ok());
    }
}
