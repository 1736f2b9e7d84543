//! Application state management

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use levante_coordinator::{
    CoordinatorEvent, CoordinatorRegistry, CoordinatorState, UpdateCoordinator,
};
use levante_core::{DeviceIdentity, FanSpeedTargets, SensorSnapshot};
use levante_gatt::EmulatedFan;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::config::BenchConfig;

/// Shared application state
pub struct BenchState {
    /// Coordinators for every ready device
    pub registry: CoordinatorRegistry,
    pub config: BenchConfig,
}

/// Snapshot of one device for status output
#[derive(Debug, Serialize)]
pub struct DeviceReport {
    pub address: String,
    pub name: Option<String>,
    pub state: CoordinatorState,
    pub identity: Option<DeviceIdentity>,
    pub sensors: Option<SensorSnapshot>,
    pub fan_speed_targets: Option<FanSpeedTargets>,
    pub last_update_success: Option<DateTime<Utc>>,
}

impl BenchState {
    /// Register every configured device against its emulated fan
    ///
    /// Devices whose first refresh fails are logged and skipped.
    pub async fn new(config: BenchConfig) -> Result<Arc<Self>> {
        let registry = CoordinatorRegistry::new();

        for device in &config.devices {
            let fan = EmulatedFan::new(device.emulator.clone());
            match registry
                .register(device.coordinator_config(&config.bench), Arc::new(fan))
                .await
            {
                Ok(coordinator) => {
                    spawn_event_logger(&coordinator);
                    info!(
                        address = %device.address,
                        pin = %coordinator.config().pin,
                        "Device ready"
                    );
                }
                Err(e) => warn!(address = %device.address, error = %e, "Skipping device"),
            }
        }

        Ok(Arc::new(Self { registry, config }))
    }

    /// Look up a device, or the only one when no address is given
    pub async fn coordinator(&self, address: Option<&str>) -> Result<UpdateCoordinator> {
        let address = match address {
            Some(address) => self
                .config
                .device(address)
                .map(|d| d.address.clone())
                .ok_or_else(|| anyhow!("Device {} is not configured", address))?,
            None => {
                let addresses = self.registry.addresses().await;
                match addresses.as_slice() {
                    [only] => only.clone(),
                    [] => return Err(anyhow!("No devices are ready")),
                    _ => return Err(anyhow!("Several devices are configured, pass --address")),
                }
            }
        };

        self.registry
            .get(&address)
            .await
            .ok_or_else(|| anyhow!("Device {} is not ready", address))
    }

    pub async fn report(&self, coordinator: &UpdateCoordinator) -> DeviceReport {
        DeviceReport {
            address: coordinator.address().to_string(),
            name: coordinator.config().name.clone(),
            state: coordinator.state(),
            identity: coordinator.identity().await,
            sensors: coordinator.sensors().await,
            fan_speed_targets: coordinator.fan_speed_targets().await,
            last_update_success: coordinator.last_update_success().await,
        }
    }

    pub async fn reports(&self) -> Vec<DeviceReport> {
        let mut reports = Vec::new();
        for address in self.registry.addresses().await {
            if let Some(coordinator) = self.registry.get(&address).await {
                reports.push(self.report(&coordinator).await);
            }
        }
        reports
    }
}

/// Log coordinator events until the coordinator goes away
fn spawn_event_logger(coordinator: &UpdateCoordinator) {
    let address = coordinator.address().to_string();
    let mut events = coordinator.subscribe();
    let mut state = coordinator.watch_state();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(CoordinatorEvent::Updated(sensors)) => {
                        info!(
                            address = %address,
                            humidity = sensors.humidity,
                            temperature = sensors.temperature,
                            light = sensors.light,
                            fan_speed = sensors.fan_speed,
                            trigger = %sensors.current_trigger,
                            "Sensors updated"
                        );
                    }
                    Ok(CoordinatorEvent::UpdateFailed { reason }) => {
                        warn!(address = %address, reason = %reason, "Update failed");
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!(address = %address, skipped = n, "Event channel lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = *state.borrow_and_update();
                    debug!(address = %address, state = %current, "Coordinator state changed");
                }
            }
        }
    });
}
