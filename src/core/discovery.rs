//! Home Assistant MQTT discovery.
//!
//! Each device becomes a `binary_sensor` with device class `connectivity`.
//! Registration is retained and repeated on every successful connect, so a
//! broker restart without persistence still ends up with all sensors. It goes
//! through the waiting publish path: a busy request queue delays
//! registration but never drops it.

use std::sync::Arc;

use async_trait::async_trait;
use iot_checker_mqtt::SessionHandler;
use serde::Serialize;
use tracing::{error, info};

use super::{
    device::{Device, DeviceStatus},
    executor::{log_publish_error, Publisher},
    topics::Topics,
    tracker::PublishAction,
};
use crate::config::scan::DiscoveryConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryPayload {
    pub name: String,
    pub state_topic: String,
    pub payload_on: &'static str,
    pub payload_off: &'static str,
    pub device_class: &'static str,
    pub unique_id: String,
    pub device: DiscoveryDevice,
}

/// The HA device all sensors are grouped under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryDevice {
    pub identifiers: Vec<String>,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
}

impl DiscoveryPayload {
    pub fn new(device: &Device, topics: &Topics, config: &DiscoveryConfig) -> Self {
        Self {
            name: format!("{}{}", config.name_prefix, device.name()),
            state_topic: topics.state(device.slug()),
            payload_on: DeviceStatus::Online.as_str(),
            payload_off: DeviceStatus::Offline.as_str(),
            device_class: "connectivity",
            unique_id: topics.unique_id(device.slug()),
            device: DiscoveryDevice {
                identifiers: vec![topics.device_identifier()],
                name: config.device_name.clone(),
                manufacturer: config.manufacturer.clone(),
                model: config.model.clone(),
            },
        }
    }
}

pub struct DiscoveryRegistrar {
    devices: Arc<[Device]>,
    publisher: Arc<dyn Publisher>,
    topics: Topics,
    config: DiscoveryConfig,
}

impl DiscoveryRegistrar {
    /// Creates a new `DiscoveryRegistrar`.
    ///
    /// # Arguments
    ///
    /// * `devices` - Devices announced on every connect.
    /// * `publisher` - Registrations go through [`Publisher::publish_wait`].
    /// * `config` - Discovery prefix, state base topic and device naming.
    pub fn new(
        devices: Arc<[Device]>,
        publisher: Arc<dyn Publisher>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            devices,
            publisher,
            topics: Topics::from_config(&config),
            config,
        }
    }

    /// Discovery config message for one device.
    pub fn action(&self, device: &Device) -> Result<PublishAction, serde_json::Error> {
        let payload = DiscoveryPayload::new(device, &self.topics, &self.config);
        Ok(PublishAction::retained(
            self.topics.discovery(device.slug()),
            serde_json::to_vec(&payload)?,
        ))
    }

    /// Queues the discovery config of every device, waiting for queue space
    /// as needed. Returns how many were queued.
    pub async fn register_all(&self) -> usize {
        let mut registered = 0;
        for device in self.devices.iter() {
            let action = match self.action(device) {
                Ok(action) => action,
                Err(e) => {
                    error!(device = device.name(), "Failed to encode discovery payload: {e}");
                    continue;
                }
            };
            match self.publisher.publish_wait(&action).await {
                Ok(()) => {
                    registered += 1;
                    info!("Sensor '{}' registered", device.name());
                }
                Err(e) => log_publish_error(&action.topic, &e),
            }
        }
        registered
    }
}

#[async_trait]
impl SessionHandler for DiscoveryRegistrar {
    async fn on_connected(&self, session: u64) {
        info!(
            session,
            devices = self.devices.len(),
            "Connected to MQTT broker, registering discovery"
        );
        self.register_all().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use iot_checker_mqtt::TransferError;
    use tracing_test::traced_test;

    use super::*;
    use crate::config::scan::DeviceEntry;

    #[derive(Default)]
    struct RecordingPublisher {
        sent: Mutex<Vec<PublishAction>>,
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(&self, action: &PublishAction) -> Result<(), TransferError> {
            self.sent.lock().unwrap().push(action.clone());
            Ok(())
        }
    }

    /// Refuses every fire-and-forget publish, the way a full request queue
    /// does, but accepts messages that wait for room.
    #[derive(Default)]
    struct SaturatedPublisher {
        waited: Mutex<Vec<PublishAction>>,
    }

    #[async_trait]
    impl Publisher for SaturatedPublisher {
        async fn publish(&self, _action: &PublishAction) -> Result<(), TransferError> {
            Err(TransferError::NotConnected("Connecting".into()))
        }

        async fn publish_wait(&self, action: &PublishAction) -> Result<(), TransferError> {
            self.waited.lock().unwrap().push(action.clone());
            Ok(())
        }
    }

    fn registrar(publisher: Arc<dyn Publisher>) -> DiscoveryRegistrar {
        let devices = Device::from_entries(&[
            DeviceEntry::new("Router", "192.168.1.1"),
            DeviceEntry::new("Štěpán's Lamp", "192.168.1.77"),
        ]);
        DiscoveryRegistrar::new(devices.into(), publisher, DiscoveryConfig::default())
    }

    #[test]
    fn test_payload_shape() {
        let device = Device::from_entry(&DeviceEntry::new("Router", "192.168.1.1")).unwrap();
        let payload =
            DiscoveryPayload::new(&device, &Topics::default(), &DiscoveryConfig::default());

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "IoT Router",
                "state_topic": "iot_checker/router/state",
                "payload_on": "online",
                "payload_off": "offline",
                "device_class": "connectivity",
                "unique_id": "iot_checker_router",
                "device": {
                    "identifiers": ["iot_checker_addon"],
                    "name": "IoT Network Checker",
                    "manufacturer": "IoT Checker",
                    "model": "Ping Checker"
                }
            })
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_register_all_publishes_retained_configs() {
        let publisher = Arc::new(RecordingPublisher::default());
        let registrar = registrar(publisher.clone());

        assert_eq!(registrar.register_all().await, 2);

        let sent = publisher.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert_eq!(
            sent[1].topic,
            "homeassistant/binary_sensor/iot_checker/stepans_lamp/config"
        );
        assert!(sent.iter().all(|a| a.retain));

        let body: serde_json::Value = serde_json::from_slice(&sent[1].payload).unwrap();
        assert_eq!(body["name"], "IoT Štěpán's Lamp");
        assert_eq!(body["state_topic"], "iot_checker/stepans_lamp/state");

        assert!(logs_contain("Sensor 'Router' registered"));
        assert!(logs_contain("Sensor 'Štěpán's Lamp' registered"));
    }

    #[tokio::test]
    async fn test_each_connect_registers_again() {
        let publisher = Arc::new(RecordingPublisher::default());
        let registrar = registrar(publisher.clone());

        registrar.on_connected(1).await;
        registrar.on_connected(2).await;

        assert_eq!(publisher.sent.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_registration_uses_waiting_path() {
        let publisher = Arc::new(SaturatedPublisher::default());
        let registrar = registrar(publisher.clone());

        assert_eq!(registrar.register_all().await, 2);
        assert_eq!(publisher.waited.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_outage_backlog_does_not_starve_registration() {
        // A small queue and a broker that is not up yet.
        let manager = iot_checker_mqtt::MqttManager::from_config(iot_checker_mqtt::Config {
            host: "127.0.0.1".into(),
            port: 1,
            request_channel_capacity: 4,
            ..Default::default()
        })
        .unwrap();
        let publisher: Arc<dyn Publisher> = Arc::new(manager.publisher());
        let devices: Arc<[Device]> = Device::from_entries(&[
            DeviceEntry::new("Router", "192.168.1.1"),
            DeviceEntry::new("Printer", "192.168.1.50"),
        ])
        .into();

        // Several cycles of state messages during the outage.
        let topics = Topics::default();
        for _ in 0..3 {
            for device in devices.iter() {
                let state = PublishAction::retained(topics.state(device.slug()), "offline");
                assert!(publisher.publish(&state).await.is_err());
            }
        }

        let registrar =
            DiscoveryRegistrar::new(devices, publisher.clone(), DiscoveryConfig::default());
        registrar.on_connected(1).await;

        assert!(logs_contain("Sensor 'Router' registered"));
        assert!(logs_contain("Sensor 'Printer' registered"));
        assert_eq!(registrar.register_all().await, 2);
    }
}
