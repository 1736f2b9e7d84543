//! Update coordinator for one fan
//!
//! Owns the cached view of a single device and serializes every
//! connection to it. Refreshes and commands each run inside one scoped
//! session while holding the device lock, so two sequences never overlap
//! on the same fan. A failed refresh keeps serving the last good cache.

use chrono::{DateTime, Utc};
use levante_core::{
    Boost, BoostRequest, DeviceIdentity, FanSensitivitySetting, FanSpeedTargetKey, FanSpeedTargets,
    Pin, SensorSnapshot,
};
use levante_gatt::command;
use levante_gatt::query::{
    log_characteristics, read_boost, read_fan_sensitivity, read_fan_speed_targets, read_identity,
    read_pin, read_sensors,
};
use levante_gatt::{GattError, SessionFactory, Transport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::error::CoordinatorError;

/// Lifecycle of the cached view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    /// No refresh has completed yet
    Uninitialized,
    Refreshing,
    Ready,
    /// Last refresh failed, cache holds the previous values
    Failed,
}

impl std::fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Refreshing => "refreshing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Coordinator event for observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    /// New sensor values, from a refresh or a command
    Updated(SensorSnapshot),
    /// A refresh failed
    UpdateFailed { reason: String },
}

#[derive(Debug, Default)]
struct Cache {
    identity: Option<DeviceIdentity>,
    sensors: Option<SensorSnapshot>,
    targets: Option<FanSpeedTargets>,
    last_update_success: Option<DateTime<Utc>>,
}

struct Inner {
    config: CoordinatorConfig,
    sessions: SessionFactory,
    /// Held across connect, protocol and disconnect
    device_lock: Mutex<()>,
    cache: RwLock<Cache>,
    state: watch::Sender<CoordinatorState>,
    events: broadcast::Sender<CoordinatorEvent>,
}

/// Publishes `Refreshing` for its lifetime
///
/// A refresh dropped before it finishes leaves the state `Failed`.
struct RefreshGuard<'a> {
    state: &'a watch::Sender<CoordinatorState>,
    address: &'a str,
    finished: bool,
}

impl<'a> RefreshGuard<'a> {
    fn start(state: &'a watch::Sender<CoordinatorState>, address: &'a str) -> Self {
        state.send_replace(CoordinatorState::Refreshing);
        Self {
            state,
            address,
            finished: false,
        }
    }

    fn finish(mut self, next: CoordinatorState) {
        self.state.send_replace(next);
        self.finished = true;
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(address = %self.address, "Refresh abandoned");
            self.state.send_replace(CoordinatorState::Failed);
        }
    }
}

/// Cached, serialized access to one fan
#[derive(Clone)]
pub struct UpdateCoordinator {
    inner: Arc<Inner>,
}

impl UpdateCoordinator {
    pub fn new(config: CoordinatorConfig, transport: Arc<dyn Transport>) -> Self {
        let sessions = SessionFactory::new(transport, config.address.clone())
            .with_hint(config.display_name())
            .with_timeout(config.session_timeout);
        let (state, _) = watch::channel(CoordinatorState::Uninitialized);
        let (events, _) = broadcast::channel(100);

        Self {
            inner: Arc::new(Inner {
                config,
                sessions,
                device_lock: Mutex::new(()),
                cache: RwLock::new(Cache::default()),
                state,
                events,
            }),
        }
    }

    pub fn address(&self) -> &str {
        &self.inner.config.address
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    pub fn state(&self) -> CoordinatorState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<CoordinatorState> {
        self.inner.state.subscribe()
    }

    /// Subscribe to coordinator events
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.inner.events.subscribe()
    }

    pub async fn identity(&self) -> Option<DeviceIdentity> {
        self.inner.cache.read().await.identity.clone()
    }

    pub async fn sensors(&self) -> Option<SensorSnapshot> {
        self.inner.cache.read().await.sensors.clone()
    }

    pub async fn fan_speed_targets(&self) -> Option<FanSpeedTargets> {
        self.inner.cache.read().await.targets
    }

    pub async fn last_update_success(&self) -> Option<DateTime<Utc>> {
        self.inner.cache.read().await.last_update_success
    }

    /// Forget the cached identity so the next refresh reads it again
    pub async fn clear_identity(&self) {
        self.inner.cache.write().await.identity = None;
    }

    fn publish(&self, event: CoordinatorEvent) {
        // No subscribers is not an error
        let _ = self.inner.events.send(event);
    }

    /// Read the device and replace the cache
    pub async fn refresh_now(&self) -> Result<SensorSnapshot, CoordinatorError> {
        let _device = self.inner.device_lock.lock().await;
        let refreshing = RefreshGuard::start(&self.inner.state, self.address());

        let need_identity = self.inner.cache.read().await.identity.is_none();
        let result = self
            .inner
            .sessions
            .with_session(|session| async move {
                let identity = if need_identity {
                    if let Err(e) = log_characteristics(&session).await {
                        debug!(
                            address = %session.address(),
                            error = %e,
                            "Unable to list characteristics"
                        );
                    }
                    Some(read_identity(&session).await?)
                } else {
                    None
                };
                let sensors = read_sensors(&session).await?;
                let targets = read_fan_speed_targets(&session).await?;
                Ok::<_, GattError>((identity, sensors, targets))
            })
            .await;

        match result {
            Ok((identity, sensors, targets)) => {
                {
                    let mut cache = self.inner.cache.write().await;
                    if identity.is_some() {
                        cache.identity = identity;
                    }
                    cache.sensors = Some(sensors.clone());
                    cache.targets = Some(targets);
                    cache.last_update_success = Some(Utc::now());
                }
                refreshing.finish(CoordinatorState::Ready);
                debug!(
                    address = %self.address(),
                    fan_speed = sensors.fan_speed,
                    trigger = %sensors.current_trigger,
                    "Refresh complete"
                );
                self.publish(CoordinatorEvent::Updated(sensors.clone()));
                Ok(sensors)
            }
            Err(e) => {
                warn!(address = %self.address(), error = %e, "Refresh failed");
                refreshing.finish(CoordinatorState::Failed);
                self.publish(CoordinatorEvent::UpdateFailed {
                    reason: e.to_string(),
                });
                Err(CoordinatorError::UpdateFailed(e))
            }
        }
    }

    fn require_pin(&self) -> Result<Pin, CoordinatorError> {
        let pin = self.inner.config.pin;
        if pin.is_set() {
            Ok(pin)
        } else {
            warn!(address = %self.address(), "Pin not set, refusing command");
            Err(CoordinatorError::PinNotSet)
        }
    }

    /// Change one fan speed target
    ///
    /// The other two targets are written back from the cache. The value the
    /// device reports afterwards is what gets cached.
    pub async fn set_fan_speed_target(
        &self,
        key: FanSpeedTargetKey,
        value: u16,
    ) -> Result<SensorSnapshot, CoordinatorError> {
        let pin = self.require_pin()?;
        let _device = self.inner.device_lock.lock().await;

        let requested = {
            let cache = self.inner.cache.read().await;
            match (cache.targets, cache.sensors.is_some()) {
                (Some(targets), true) => targets.with(key, value),
                _ => return Err(CoordinatorError::TargetsUnavailable),
            }
        };

        info!(address = %self.address(), target = %key, value, "Setting fan speed target");
        let stored = self
            .inner
            .sessions
            .with_session(|session| async move {
                command::set_fan_speed_targets(&session, pin, &requested).await
            })
            .await?;

        if stored.get(key) != value {
            warn!(
                address = %self.address(),
                target = %key,
                requested = value,
                stored = stored.get(key),
                "Device stored a different fan speed target than requested"
            );
        }

        let sensors = {
            let mut cache = self.inner.cache.write().await;
            cache.targets = Some(stored);
            cache.sensors.clone()
        }
        .ok_or(CoordinatorError::TargetsUnavailable)?;

        self.publish(CoordinatorEvent::Updated(sensors.clone()));
        Ok(sensors)
    }

    /// Turn boost on or off with the device defaults
    pub async fn set_boost(&self, active: bool) -> Result<SensorSnapshot, CoordinatorError> {
        let request = if active {
            BoostRequest::on()
        } else {
            BoostRequest::off()
        };
        self.set_boost_request(request).await
    }

    /// Write a boost request and cache the sensors that follow it
    pub async fn set_boost_request(
        &self,
        request: BoostRequest,
    ) -> Result<SensorSnapshot, CoordinatorError> {
        let pin = self.require_pin()?;
        let _device = self.inner.device_lock.lock().await;

        info!(address = %self.address(), active = request.active, "Setting boost");
        let sensors = self
            .inner
            .sessions
            .with_session(|session| async move {
                command::set_boost(&session, pin, &request).await
            })
            .await?;

        self.inner.cache.write().await.sensors = Some(sensors.clone());
        self.publish(CoordinatorEvent::Updated(sensors.clone()));
        Ok(sensors)
    }

    pub async fn read_fan_sensitivity(&self) -> Result<FanSensitivitySetting, CoordinatorError> {
        let _device = self.inner.device_lock.lock().await;
        Ok(self
            .inner
            .sessions
            .with_session(|session| async move { read_fan_sensitivity(&session).await })
            .await?)
    }

    pub async fn read_boost(&self) -> Result<Boost, CoordinatorError> {
        let _device = self.inner.device_lock.lock().await;
        Ok(self
            .inner
            .sessions
            .with_session(|session| async move { read_boost(&session).await })
            .await?)
    }

    /// Read the pin the device reports, for prefilling a credential
    pub async fn read_device_pin(&self) -> Result<Pin, CoordinatorError> {
        let _device = self.inner.device_lock.lock().await;
        Ok(self
            .inner
            .sessions
            .with_session(|session| async move { read_pin(&session).await })
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use levante_core::{Attribute, CurrentTrigger};
    use levante_gatt::{EmulatedFan, Faults, Operation, TransportError};
    use std::time::Duration;

    fn coordinator(fan: &EmulatedFan, pin: u32) -> UpdateCoordinator {
        UpdateCoordinator::new(
            CoordinatorConfig::new("AA:BB:CC:DD:EE:FF", Pin(pin)),
            Arc::new(fan.clone()),
        )
    }

    #[tokio::test]
    async fn test_refresh_populates_cache() {
        let fan = EmulatedFan::default();
        let coordinator = coordinator(&fan, 1234);
        assert_eq!(coordinator.state(), CoordinatorState::Uninitialized);
        assert!(coordinator.sensors().await.is_none());

        let mut events = coordinator.subscribe();
        let sensors = coordinator.refresh_now().await.unwrap();

        assert_eq!(coordinator.state(), CoordinatorState::Ready);
        assert_eq!(coordinator.sensors().await, Some(sensors.clone()));
        assert_eq!(coordinator.fan_speed_targets().await, Some(fan.config().targets));
        assert_eq!(
            coordinator.identity().await.and_then(|i| i.manufacturer),
            Some("PAX".to_string())
        );
        assert!(coordinator.last_update_success().await.is_some());
        assert_eq!(events.recv().await.unwrap(), CoordinatorEvent::Updated(sensors));
    }

    #[tokio::test]
    async fn test_unset_pin_opens_no_session() {
        let fan = EmulatedFan::default();
        let coordinator = coordinator(&fan, 0);

        let result = coordinator
            .set_fan_speed_target(FanSpeedTargetKey::Base, 1000)
            .await;
        assert_eq!(result, Err(CoordinatorError::PinNotSet));

        let result = coordinator.set_boost(true).await;
        assert_eq!(result, Err(CoordinatorError::PinNotSet));

        assert_eq!(fan.stats().connects, 0);
        assert!(fan.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_snapshot() {
        let fan = EmulatedFan::default();
        let coordinator = coordinator(&fan, 1234);
        coordinator.refresh_now().await.unwrap();
        let before = coordinator.sensors().await;
        let refreshed_at = coordinator.last_update_success().await;

        fan.set_faults(Faults {
            fail_connect: true,
            ..Faults::default()
        })
        .await;
        let mut events = coordinator.subscribe();
        let result = coordinator.refresh_now().await;

        assert!(matches!(
            result,
            Err(CoordinatorError::UpdateFailed(GattError::Transport(
                TransportError::Connect { .. }
            )))
        ));
        assert_eq!(coordinator.state(), CoordinatorState::Failed);
        assert_eq!(coordinator.sensors().await, before);
        assert_eq!(coordinator.last_update_success().await, refreshed_at);
        assert!(matches!(
            events.recv().await.unwrap(),
            CoordinatorEvent::UpdateFailed { .. }
        ));
    }

    #[tokio::test]
    async fn test_boost_off_is_idempotent() {
        let fan = EmulatedFan::default();
        let coordinator = coordinator(&fan, 1234);
        coordinator.refresh_now().await.unwrap();

        let first = coordinator.set_boost(false).await.unwrap();
        let second = coordinator.set_boost(false).await.unwrap();
        assert_eq!(first, second);
        assert!(!second.boost_active);
    }

    #[tokio::test]
    async fn test_boost_on_updates_cache() {
        let fan = EmulatedFan::default();
        let coordinator = coordinator(&fan, 1234);

        let sensors = coordinator.set_boost(true).await.unwrap();
        assert_eq!(sensors.current_trigger, CurrentTrigger::Boost);
        assert_eq!(coordinator.sensors().await, Some(sensors));
        assert!(coordinator.read_boost().await.unwrap().active);
    }

    #[tokio::test]
    async fn test_identity_read_once() {
        let fan = EmulatedFan::default();
        let coordinator = coordinator(&fan, 1234);
        coordinator.refresh_now().await.unwrap();
        coordinator.refresh_now().await.unwrap();

        let identity_reads = |history: &[Operation]| {
            history
                .iter()
                .filter(|op| **op == Operation::Read(Attribute::ManufacturerName))
                .count()
        };
        assert_eq!(identity_reads(&fan.history().await), 1);

        coordinator.clear_identity().await;
        coordinator.refresh_now().await.unwrap();
        assert_eq!(identity_reads(&fan.history().await), 2);
    }

    #[tokio::test]
    async fn test_set_target_caches_read_back() {
        let fan = EmulatedFan::default();
        let coordinator = coordinator(&fan, 1234);
        coordinator.refresh_now().await.unwrap();

        coordinator
            .set_fan_speed_target(FanSpeedTargetKey::Light, 1800)
            .await
            .unwrap();
        assert_eq!(coordinator.fan_speed_targets().await.map(|t| t.light), Some(1800));

        // Out of range, the fan clamps and the clamped value is cached
        coordinator
            .set_fan_speed_target(FanSpeedTargetKey::Humidity, 3000)
            .await
            .unwrap();
        let cached = coordinator.fan_speed_targets().await.unwrap();
        assert_eq!(cached.humidity, 2400);
        assert_eq!(cached, fan.targets().await);
    }

    #[tokio::test]
    async fn test_set_target_requires_cached_targets() {
        let fan = EmulatedFan::default();
        let coordinator = coordinator(&fan, 1234);

        let result = coordinator
            .set_fan_speed_target(FanSpeedTargetKey::Base, 1000)
            .await;
        assert_eq!(result, Err(CoordinatorError::TargetsUnavailable));
        assert_eq!(fan.stats().connects, 0);
    }

    #[tokio::test]
    async fn test_rejected_pin_leaves_cache() {
        let fan = EmulatedFan::default();
        let coordinator = coordinator(&fan, 4321);
        coordinator.refresh_now().await.unwrap();
        let before = coordinator.fan_speed_targets().await;

        let err = coordinator
            .set_fan_speed_target(FanSpeedTargetKey::Base, 1200)
            .await
            .unwrap_err();
        assert_eq!(err, CoordinatorError::PinRejected);
        assert!(err.is_auth());
        assert_eq!(coordinator.fan_speed_targets().await, before);
        assert_eq!(fan.targets().await, fan.config().targets);
    }

    #[tokio::test]
    async fn test_one_shot_reads() {
        let fan = EmulatedFan::default();
        let coordinator = coordinator(&fan, 1234);

        assert_eq!(coordinator.read_device_pin().await, Ok(Pin(1234)));
        let sensitivity = coordinator.read_fan_sensitivity().await.unwrap();
        assert_eq!(sensitivity.light, levante_core::FanSensitivity::High);
        assert!(coordinator.sensors().await.is_none());
        assert_eq!(coordinator.state(), CoordinatorState::Uninitialized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_refresh_is_marked_failed() {
        let fan = EmulatedFan::default();
        let coordinator = coordinator(&fan, 1234);
        fan.set_faults(Faults {
            read_delay: Some(Duration::from_secs(5)),
            ..Faults::default()
        })
        .await;

        let result = tokio::time::timeout(Duration::from_secs(1), coordinator.refresh_now()).await;
        assert!(result.is_err());
        assert_eq!(coordinator.state(), CoordinatorState::Failed);

        fan.clear_faults().await;
        coordinator.refresh_now().await.unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_waits_for_refresh() {
        let fan = EmulatedFan::default();
        let coordinator = coordinator(&fan, 1234);
        fan.set_faults(Faults {
            read_delay: Some(Duration::from_millis(500)),
            ..Faults::default()
        })
        .await;

        let (refreshed, boosted) =
            tokio::join!(coordinator.refresh_now(), coordinator.set_boost(true));
        refreshed.unwrap();
        assert!(boosted.unwrap().boost_active);

        let mut open = 0;
        let mut sessions = 0;
        for op in fan.history().await {
            match op {
                Operation::Connect => {
                    open += 1;
                    sessions += 1;
                    assert_eq!(open, 1, "sessions overlapped");
                }
                Operation::Disconnect => open -= 1,
                _ => {}
            }
        }
        assert_eq!(open, 0);
        assert_eq!(sessions, 2);
    }
}
