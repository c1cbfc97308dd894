use std::{process, sync::Arc};

use iot_checker::{
    config::Config,
    core::{
        device::Device,
        discovery::DiscoveryRegistrar,
        executor::{Executor, Publisher},
        prober::PingProber,
        scanner::Scanner,
        topics::Topics,
        tracker::StateTracker,
    },
    logger::LoggerManager,
    print_error,
};
use iot_checker_mqtt::MqttManager;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

fn log_devices_table(devices: &[Device]) {
    let name_width = devices
        .iter()
        .map(|d| d.name().chars().count())
        .max()
        .unwrap_or(0)
        .max("Device".len());

    info!("{:<width$} | Address", "Device", width = name_width);
    info!("{}-+-{}", "-".repeat(name_width), "-".repeat(15));
    for device in devices {
        info!("{:<width$} | {}", device.name(), device.address(), width = name_width);
    }
}

/// Cancels `token` on SIGINT or SIGTERM.
fn spawn_signal_listener(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down..."),
                        _ = term.recv() => info!("Received SIGTERM, shutting down..."),
                    }
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {e}");
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Received SIGINT, shutting down...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C, shutting down...");
        }

        token.cancel();
    });
}

#[tokio::main]
async fn main() {
    let cfg = Config::new().unwrap_or_else(|e| {
        print_error!("{}", e);
        process::exit(1);
    });

    let logger_manager = LoggerManager::new(cfg.logger.clone()).unwrap_or_else(|e| {
        print_error!("Failed to setup Log Manager: {}", e);
        process::exit(1);
    });
    logger_manager.init().unwrap_or_else(|e| {
        print_error!("Failed to init Log Manager: {}", e);
        process::exit(1);
    });

    info!("Starting iot-checker version {}...", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", cfg.logger.level);
    debug!("{:#?}", cfg.transport);

    info!("MQTT broker: {}", cfg.broker_summary());
    if cfg.credentials_missing() {
        warn!("MQTT credentials not fully configured, connecting anonymously");
    }

    let devices: Arc<[Device]> = Device::from_entries(&cfg.devices).into();
    if devices.is_empty() {
        warn!("No valid devices configured, nothing will be monitored");
    } else {
        log_devices_table(&devices);
    }
    info!(
        "Scan interval {}s, probe timeout {}s, concurrency {}",
        cfg.scan.interval,
        cfg.scan.probe_timeout,
        cfg.scan.concurrency
    );

    let manager = MqttManager::from_config(cfg.broker_config()).unwrap_or_else(|e| {
        error!("Failed to create MqttManager: {}", e);
        process::exit(1);
    });
    let publisher: Arc<dyn Publisher> = Arc::new(manager.publisher());

    let registrar = DiscoveryRegistrar::new(
        devices.clone(),
        publisher.clone(),
        cfg.discovery.clone(),
    );
    let instance = manager
        .with_handler(Arc::new(registrar))
        .build_and_start()
        .await
        .unwrap_or_else(|e| {
            error!("Failed to start MQTT session: {}", e);
            process::exit(1);
        });

    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone());

    let scanner = Scanner::new(
        Arc::new(PingProber::from_config(&cfg.scan)),
        cfg.scan.concurrency,
        cfg.scan.probe_deadline(),
    );
    let tracker = StateTracker::new(Topics::from_config(&cfg.discovery));
    let executor = Executor::new(devices, scanner, tracker, publisher, cfg.scan.interval());

    executor.run(shutdown).await;

    info!(connected = instance.is_connected(), "Closing MQTT session");
    instance.shutdown().await;
    info!("Shutdown complete");
}
