//! Last-known status per device and the publishes each cycle produces.
//!
//! Every result is published every cycle (retained), so a broker that lost
//! its store converges within one interval. Logging is change-only: a device
//! that stays online cycle after cycle produces no log lines.

use std::collections::HashMap;

use iot_checker_mqtt::EndpointMetadata;
use tracing::info;

use super::{device::DeviceStatus, scanner::ScanResult, slug::slugify, topics::Topics};

/// A message ready to hand to the publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishAction {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
    pub qos: u8,
}

impl PublishAction {
    /// Retained QoS 1 message.
    pub fn retained(topic: String, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic,
            payload: payload.into(),
            retain: true,
            qos: 1,
        }
    }

    pub fn metadata(&self) -> EndpointMetadata {
        EndpointMetadata {
            qos: self.qos,
            topic: self.topic.clone(),
            retain: self.retain,
        }
    }
}

/// A status change. `old` is `None` the first time a device is seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub name: String,
    pub address: String,
    pub old: Option<DeviceStatus>,
    pub new: DeviceStatus,
}

#[derive(Debug, Default)]
pub struct StateTracker {
    topics: Topics,
    last: HashMap<String, DeviceStatus>,
}

impl StateTracker {
    /// Creates an empty tracker that builds state topics from `topics`.
    pub fn new(topics: Topics) -> Self {
        Self {
            topics,
            last: HashMap::new(),
        }
    }

    /// Records `result` and reports whether its status changed.
    pub fn observe(&mut self, result: &ScanResult) -> Option<Transition> {
        let old = self.last.insert(result.name.clone(), result.status);
        if old == Some(result.status) {
            return None;
        }
        Some(Transition {
            name: result.name.clone(),
            address: result.address.clone(),
            old,
            new: result.status,
        })
    }

    /// Logs transitions and returns one state publish per result.
    pub fn apply(&mut self, results: &[ScanResult]) -> Vec<PublishAction> {
        results
            .iter()
            .map(|result| {
                if let Some(change) = self.observe(result) {
                    info!(
                        device = %change.name,
                        address = %change.address,
                        old = change.old.map_or("unknown", |s| s.as_str()),
                        new = change.new.as_str(),
                        "Device {} is now {}",
                        change.name,
                        change.new
                    );
                }
                PublishAction::retained(
                    self.topics.state(&slugify(&result.name)),
                    result.status.as_str(),
                )
            })
            .collect()
    }

    pub fn last_status(&self, name: &str) -> Option<DeviceStatus> {
        self.last.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;

    fn result(name: &str, address: &str, status: DeviceStatus) -> ScanResult {
        ScanResult {
            name: name.into(),
            address: address.into(),
            status,
            error: None,
        }
    }

    #[test]
    #[traced_test]
    fn test_router_printer_scenario() {
        let mut tracker = StateTracker::default();
        let results = vec![
            result("Router", "192.168.1.1", DeviceStatus::Online),
            result("Printer", "192.168.1.50", DeviceStatus::Offline),
        ];

        let actions = tracker.apply(&results);

        assert_eq!(
            actions,
            vec![
                PublishAction::retained("iot_checker/router/state".into(), "online"),
                PublishAction::retained("iot_checker/printer/state".into(), "offline"),
            ]
        );
        assert!(logs_contain("Device Router is now online"));
        assert!(logs_contain("Device Printer is now offline"));
        assert!(logs_contain("old=\"unknown\""));
    }

    #[test]
    #[traced_test]
    fn test_identical_cycles_publish_but_do_not_log() {
        let mut tracker = StateTracker::default();
        let results = vec![result("Router", "192.168.1.1", DeviceStatus::Online)];

        tracker.apply(&results);
        let second = tracker.apply(&results);
        let third = tracker.apply(&results);

        assert_eq!(second.len(), 1);
        assert_eq!(third.len(), 1);
        logs_assert(|lines: &[&str]| {
            match lines
                .iter()
                .filter(|line| line.contains("Device Router is now"))
                .count()
            {
                1 => Ok(()),
                n => Err(format!("expected one transition log, got {n}")),
            }
        });
    }

    #[test]
    fn test_observe_reports_old_status() {
        let mut tracker = StateTracker::default();
        let up = result("NAS", "10.0.0.5", DeviceStatus::Online);
        let down = result("NAS", "10.0.0.5", DeviceStatus::Offline);

        let first = tracker.observe(&up).unwrap();
        assert_eq!(first.old, None);
        assert_eq!(first.new, DeviceStatus::Online);

        assert_eq!(tracker.observe(&up), None);

        let flip = tracker.observe(&down).unwrap();
        assert_eq!(flip.old, Some(DeviceStatus::Online));
        assert_eq!(flip.new, DeviceStatus::Offline);
        assert_eq!(tracker.last_status("NAS"), Some(DeviceStatus::Offline));
    }

    #[test]
    fn test_state_topic_uses_slug() {
        let mut tracker = StateTracker::new(Topics::new("homeassistant", "lan"));
        let actions = tracker.apply(&[result("Štěpán's Lamp", "10.0.0.9", DeviceStatus::Online)]);
        assert_eq!(actions[0].topic, "lan/stepans_lamp/state");
        assert!(actions[0].retain);
        assert_eq!(actions[0].metadata().topic, "lan/stepans_lamp/state");
    }
}
