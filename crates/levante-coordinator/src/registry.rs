//! Registry of per-device coordinators
//!
//! Owned by the composition root. A device is only registered once its
//! first refresh succeeds; from then on it has a refresh loop that lives
//! until the device is unregistered or the registry shuts down.

use levante_gatt::Transport;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::CoordinatorConfig;
use crate::coordinator::UpdateCoordinator;
use crate::error::RegistryError;
use crate::scheduler::spawn_refresh_loop;

struct Entry {
    coordinator: UpdateCoordinator,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Entry {
    async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(
                address = %self.coordinator.address(),
                error = %e,
                "Refresh loop ended abnormally"
            );
        }
    }
}

pub struct CoordinatorRegistry {
    entries: RwLock<HashMap<String, Entry>>,
    cancel: CancellationToken,
}

impl Default for CoordinatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CoordinatorRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Create a coordinator, run its first refresh, and start its loop
    pub async fn register(
        &self,
        config: CoordinatorConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<UpdateCoordinator, RegistryError> {
        let address = config.address.clone();
        if self.entries.read().await.contains_key(&address) {
            return Err(RegistryError::AlreadyRegistered(address));
        }

        let period = config.update_interval;
        let coordinator = UpdateCoordinator::new(config, transport);
        if let Err(e) = coordinator.refresh_now().await {
            warn!(address = %address, error = %e, "First refresh failed, device not registered");
            return Err(RegistryError::NotReady {
                address,
                source: e,
            });
        }

        let mut entries = self.entries.write().await;
        if entries.contains_key(&address) {
            return Err(RegistryError::AlreadyRegistered(address));
        }

        let cancel = self.cancel.child_token();
        let task = spawn_refresh_loop(coordinator.clone(), period, cancel.clone());
        entries.insert(
            address.clone(),
            Entry {
                coordinator: coordinator.clone(),
                cancel,
                task,
            },
        );
        info!(address = %address, period = ?period, "Device registered");
        Ok(coordinator)
    }

    pub async fn get(&self, address: &str) -> Option<UpdateCoordinator> {
        self.entries
            .read()
            .await
            .get(address)
            .map(|entry| entry.coordinator.clone())
    }

    /// Registered addresses, sorted
    pub async fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.entries.read().await.keys().cloned().collect();
        addresses.sort();
        addresses
    }

    /// Stop and forget one device, returning whether it was registered
    pub async fn unregister(&self, address: &str) -> bool {
        let entry = self.entries.write().await.remove(address);
        match entry {
            Some(entry) => {
                entry.stop().await;
                info!(address = %address, "Device unregistered");
                true
            }
            None => false,
        }
    }

    /// Stop every refresh loop and clear the registry
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let entries: Vec<Entry> = self.entries.write().await.drain().map(|(_, e)| e).collect();
        let count = entries.len();
        for entry in entries {
            entry.stop().await;
        }
        info!(devices = count, "Coordinator registry shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoordinatorError;
    use levante_core::Pin;
    use levante_gatt::{EmulatedFan, Faults};

    fn config(address: &str) -> CoordinatorConfig {
        CoordinatorConfig::new(address, Pin(1234))
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = CoordinatorRegistry::new();
        let fan = EmulatedFan::default();

        let coordinator = registry
            .register(config("AA:00"), Arc::new(fan.clone()))
            .await
            .unwrap();
        assert!(coordinator.sensors().await.is_some());
        assert!(registry.get("AA:00").await.is_some());
        assert!(registry.get("BB:00").await.is_none());

        let duplicate = registry.register(config("AA:00"), Arc::new(fan)).await;
        assert!(matches!(duplicate, Err(RegistryError::AlreadyRegistered(_))));

        registry.shutdown().await;
        assert!(registry.addresses().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_first_refresh_is_not_registered() {
        let registry = CoordinatorRegistry::new();
        let fan = EmulatedFan::default();
        fan.set_faults(Faults {
            fail_connect: true,
            ..Faults::default()
        })
        .await;

        let result = registry.register(config("AA:00"), Arc::new(fan)).await;
        assert!(matches!(
            result,
            Err(RegistryError::NotReady {
                source: CoordinatorError::UpdateFailed(_),
                ..
            })
        ));
        assert!(registry.addresses().await.is_empty());
    }

    #[tokio::test]
    async fn test_unregister_stops_device() {
        let registry = CoordinatorRegistry::new();
        registry
            .register(config("BB:00"), Arc::new(EmulatedFan::default()))
            .await
            .unwrap();
        registry
            .register(config("AA:00"), Arc::new(EmulatedFan::default()))
            .await
            .unwrap();
        assert_eq!(registry.addresses().await, vec!["AA:00", "BB:00"]);

        assert!(registry.unregister("AA:00").await);
        assert!(!registry.unregister("AA:00").await);
        assert_eq!(registry.addresses().await, vec!["BB:00"]);

        registry.shutdown().await;
    }
}
