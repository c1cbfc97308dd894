//! Concurrent probing of all devices.
//!
//! One task per device on a [`JoinSet`], gated by a semaphore so at most
//! `concurrency` probes run at once. `scan` returns only after every task has
//! finished (or been cut off at its deadline), and yields exactly one result
//! per device, in input order.

use std::{sync::Arc, time::Duration};

use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, error};

use super::{
    device::{Device, DeviceStatus},
    prober::{Prober, Reachability},
};

/// Outcome of probing one device during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub name: String,
    pub address: String,
    pub status: DeviceStatus,
    /// Why the device is offline, when the prober could tell.
    pub error: Option<String>,
}

impl ScanResult {
    fn new(device: &Device, status: DeviceStatus, error: Option<String>) -> Self {
        Self {
            name: device.name().to_string(),
            address: device.address().to_string(),
            status,
            error,
        }
    }

    fn from_reachability(device: &Device, reachability: Reachability) -> Self {
        match reachability {
            Reachability::Reachable => Self::new(device, DeviceStatus::Online, None),
            Reachability::Unreachable { reason } => Self::new(device, DeviceStatus::Offline, reason),
        }
    }
}

/// Probes a device list concurrently with a bounded number of probes in
/// flight.
pub struct Scanner {
    prober: Arc<dyn Prober>,
    permits: Arc<Semaphore>,
    deadline: Duration,
}

impl Scanner {
    /// Creates a new `Scanner`.
    ///
    /// # Arguments
    ///
    /// * `prober` - Checks a single address.
    /// * `concurrency` - Maximum number of probes running at once. Zero is
    ///   treated as one.
    /// * `deadline` - Bounds each individual probe, independent of the
    ///   prober's own timeout handling. A probe cut off here counts as offline.
    pub fn new(prober: Arc<dyn Prober>, concurrency: usize, deadline: Duration) -> Self {
        Self {
            prober,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            deadline,
        }
    }

    /// Probes every device and returns one result per device, in the order
    /// of `devices`.
    pub async fn scan(&self, devices: &[Device]) -> Vec<ScanResult> {
        let mut tasks = JoinSet::new();

        for (index, device) in devices.iter().cloned().enumerate() {
            let prober = self.prober.clone();
            let permits = self.permits.clone();
            let deadline = self.deadline;

            tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = permits.acquire_owned().await.ok();
                let reachability =
                    match tokio::time::timeout(deadline, prober.probe(device.address())).await {
                        Ok(reachability) => reachability,
                        Err(_) => Reachability::Unreachable {
                            reason: Some(format!("probe deadline of {deadline:?} exceeded")),
                        },
                    };
                debug!(
                    device = device.name(),
                    address = device.address(),
                    reachable = reachability.is_reachable(),
                    "Probe finished"
                );
                (index, ScanResult::from_reachability(&device, reachability))
            });
        }

        let mut slots: Vec<Option<ScanResult>> = vec![None; devices.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => error!("Probe task failed: {e}"),
            }
        }

        // A slot is only empty if its task panicked.
        slots
            .into_iter()
            .zip(devices)
            .map(|(slot, device)| {
                slot.unwrap_or_else(|| {
                    ScanResult::new(
                        device,
                        DeviceStatus::Offline,
                        Some("probe task failed".to_string()),
                    )
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;

    use super::*;
    use crate::config::scan::DeviceEntry;

    fn devices(list: &[(&str, &str)]) -> Vec<Device> {
        list.iter()
            .map(|(name, ip)| Device::from_entry(&DeviceEntry::new(*name, *ip)).unwrap())
            .collect()
    }

    /// Reachable iff the address is in `up`.
    struct FixedProber {
        up: HashSet<String>,
    }

    #[async_trait]
    impl Prober for FixedProber {
        async fn probe(&self, address: &str) -> Reachability {
            if self.up.contains(address) {
                Reachability::Reachable
            } else {
                Reachability::Unreachable {
                    reason: Some("exit status 1".into()),
                }
            }
        }
    }

    struct HangingProber;

    #[async_trait]
    impl Prober for HangingProber {
        async fn probe(&self, _address: &str) -> Reachability {
            std::future::pending().await
        }
    }

    struct PanickingProber;

    #[async_trait]
    impl Prober for PanickingProber {
        async fn probe(&self, address: &str) -> Reachability {
            if address == "10.0.0.2" {
                panic!("prober bug");
            }
            Reachability::Reachable
        }
    }

    /// Records the highest number of probes running at the same time.
    #[derive(Default)]
    struct CountingProber {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Prober for CountingProber {
        async fn probe(&self, _address: &str) -> Reachability {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Reachability::Reachable
        }
    }

    #[tokio::test]
    async fn test_router_up_printer_down() {
        let prober = Arc::new(FixedProber {
            up: HashSet::from(["192.168.1.1".to_string()]),
        });
        let scanner = Scanner::new(prober, 50, Duration::from_secs(2));
        let devices = devices(&[("Router", "192.168.1.1"), ("Printer", "192.168.1.50")]);

        let results = scanner.scan(&devices).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].name, "Router");
        assert_eq!(results[0].status, DeviceStatus::Online);
        assert_eq!(results[0].error, None);
        assert_eq!(results[1].name, "Printer");
        assert_eq!(results[1].status, DeviceStatus::Offline);
        assert_eq!(results[1].error.as_deref(), Some("exit status 1"));
    }

    #[tokio::test]
    async fn test_one_result_per_device_in_input_order() {
        let prober = Arc::new(FixedProber {
            up: HashSet::new(),
        });
        let scanner = Scanner::new(prober, 3, Duration::from_secs(2));
        let list: Vec<(String, String)> = (0..20)
            .map(|i| (format!("Device {i}"), format!("10.0.0.{i}")))
            .collect();
        let refs: Vec<(&str, &str)> = list.iter().map(|(n, a)| (n.as_str(), a.as_str())).collect();
        let devices = devices(&refs);

        let results = scanner.scan(&devices).await;

        let names: Vec<_> = results.iter().map(|r| r.name.clone()).collect();
        let expected: Vec<_> = devices.iter().map(|d| d.name().to_string()).collect();
        assert_eq!(names, expected);
    }

    #[tokio::test]
    async fn test_empty_device_list() {
        let scanner = Scanner::new(Arc::new(HangingProber), 4, Duration::from_secs(1));
        assert!(scanner.scan(&[]).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_probe_is_bounded_by_deadline() {
        let scanner = Scanner::new(Arc::new(HangingProber), 50, Duration::from_millis(1500));
        let devices = devices(&[("Router", "192.168.1.1"), ("Printer", "192.168.1.50")]);
        let started = tokio::time::Instant::now();

        let results = scanner.scan(&devices).await;

        assert_eq!(started.elapsed(), Duration::from_millis(1500));
        assert!(results.iter().all(|r| r.status == DeviceStatus::Offline));
        assert!(results[0].error.as_deref().unwrap().contains("deadline"));
    }

    #[tokio::test]
    async fn test_panicking_probe_yields_offline() {
        let scanner = Scanner::new(Arc::new(PanickingProber), 4, Duration::from_secs(1));
        let devices = devices(&[("A", "10.0.0.1"), ("B", "10.0.0.2"), ("C", "10.0.0.3")]);

        let results = scanner.scan(&devices).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].status, DeviceStatus::Online);
        assert_eq!(results[1].status, DeviceStatus::Offline);
        assert_eq!(results[1].error.as_deref(), Some("probe task failed"));
        assert_eq!(results[2].status, DeviceStatus::Online);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_limited() {
        let prober = Arc::new(CountingProber::default());
        let scanner = Scanner::new(prober.clone(), 4, Duration::from_secs(5));
        let list: Vec<(String, String)> = (0..12)
            .map(|i| (format!("D{i}"), format!("10.0.1.{i}")))
            .collect();
        let refs: Vec<(&str, &str)> = list.iter().map(|(n, a)| (n.as_str(), a.as_str())).collect();
        let started = tokio::time::Instant::now();

        let results = scanner.scan(&devices(&refs)).await;

        assert_eq!(results.len(), 12);
        assert_eq!(prober.peak.load(Ordering::SeqCst), 4);
        // Three waves of 100 ms.
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }
}
