//! In-memory emulated fan
//!
//! Implements [`Transport`] over a software model of the fan's attribute
//! table. Writes need a prior accepted pin on the same link, fan speed
//! targets are clamped to the range the hardware accepts, and the sensors
//! attribute reflects boost state. Faults can be injected to exercise
//! error paths.

use async_trait::async_trait;
use levante_core::codec::{
    decode_boost, decode_fan_speed_targets, decode_pin, encode_boost, encode_fan_speed_targets,
    encode_pin,
};
use levante_core::{
    Attribute, Boost, BoostRequest, CurrentTrigger, DeviceIdentity, FanSpeedTargets, FAN_SPEED_MAX,
    FAN_SPEED_MIN,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::transport::{Link, Transport, TransportError};

/// Initial state of an emulated fan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Pin the fan accepts
    pub pin: u32,
    pub humidity: u16,
    pub temperature: u16,
    pub light: u16,
    /// Trigger reported while boost is off
    pub trigger: CurrentTrigger,
    /// Raw fan sensitivity bytes
    pub sensitivity: [u8; 4],
    pub targets: FanSpeedTargets,
    pub identity: DeviceIdentity,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            pin: 1234,
            humidity: 45,
            temperature: 22,
            light: 150,
            trigger: CurrentTrigger::Base,
            sensitivity: [1, 2, 1, 3],
            targets: FanSpeedTargets {
                humidity: 2000,
                light: 1500,
                base: 950,
            },
            identity: DeviceIdentity {
                manufacturer: Some("PAX".to_string()),
                model_number: Some("Levante 50".to_string()),
                name: Some("PAX Levante".to_string()),
                sw_version: Some("1.0.0".to_string()),
                hw_version: Some("1.0".to_string()),
                serial_number: None,
            },
        }
    }
}

/// Injected failures
#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub fail_connect: bool,
    /// Delay applied to every read before it is served
    pub read_delay: Option<Duration>,
    pub fail_reads: HashSet<Attribute>,
    /// Attributes served one byte short
    pub truncate_reads: HashSet<Attribute>,
    /// Report every write as unacknowledged
    pub reject_writes: bool,
}

/// One transport call observed by the fan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Connect,
    Read(Attribute),
    Write(Attribute, Vec<u8>),
    Disconnect,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmulatorStats {
    pub connects: usize,
    pub disconnects: usize,
    pub reads: usize,
    pub writes: usize,
}

struct FanState {
    humidity: u16,
    temperature: u16,
    light: u16,
    trigger: CurrentTrigger,
    targets: FanSpeedTargets,
    sensitivity: [u8; 4],
    boost: Boost,
}

struct Inner {
    config: EmulatorConfig,
    state: Mutex<FanState>,
    faults: Mutex<Faults>,
    history: Mutex<Vec<Operation>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

/// Software model of one fan
#[derive(Clone)]
pub struct EmulatedFan {
    inner: Arc<Inner>,
}

impl Default for EmulatedFan {
    fn default() -> Self {
        Self::new(EmulatorConfig::default())
    }
}

impl EmulatedFan {
    pub fn new(config: EmulatorConfig) -> Self {
        let state = FanState {
            humidity: config.humidity,
            temperature: config.temperature,
            light: config.light,
            trigger: config.trigger,
            targets: config.targets,
            sensitivity: config.sensitivity,
            boost: Boost {
                active: false,
                fan_speed_target: 0,
                timeleft_seconds: 0,
            },
        };
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(state),
                faults: Mutex::new(Faults::default()),
                history: Mutex::new(Vec::new()),
                connects: AtomicUsize::new(0),
                disconnects: AtomicUsize::new(0),
                reads: AtomicUsize::new(0),
                writes: AtomicUsize::new(0),
            }),
        }
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.inner.config
    }

    pub async fn set_faults(&self, faults: Faults) {
        *self.inner.faults.lock().await = faults;
    }

    pub async fn clear_faults(&self) {
        self.set_faults(Faults::default()).await;
    }

    pub fn stats(&self) -> EmulatorStats {
        EmulatorStats {
            connects: self.inner.connects.load(Ordering::SeqCst),
            disconnects: self.inner.disconnects.load(Ordering::SeqCst),
            reads: self.inner.reads.load(Ordering::SeqCst),
            writes: self.inner.writes.load(Ordering::SeqCst),
        }
    }

    pub async fn history(&self) -> Vec<Operation> {
        self.inner.history.lock().await.clone()
    }

    pub async fn clear_history(&self) {
        self.inner.history.lock().await.clear();
    }

    pub async fn targets(&self) -> FanSpeedTargets {
        self.inner.state.lock().await.targets
    }

    pub async fn boost(&self) -> Boost {
        self.inner.state.lock().await.boost
    }

    /// Change the ambient readings and the trigger reported without boost
    pub async fn set_readings(
        &self,
        humidity: u16,
        temperature: u16,
        light: u16,
        trigger: CurrentTrigger,
    ) {
        let mut state = self.inner.state.lock().await;
        state.humidity = humidity;
        state.temperature = temperature;
        state.light = light;
        state.trigger = trigger;
    }

    async fn record(&self, op: Operation) {
        self.inner.history.lock().await.push(op);
    }
}

impl FanState {
    fn sensors_bytes(&self) -> Vec<u8> {
        let code = self.trigger.code().unwrap_or(1);
        let (trigger_raw, fan_speed) = if self.boost.active {
            (0x10 | code, self.boost.fan_speed_target)
        } else {
            let speed = match self.trigger {
                CurrentTrigger::Humidity => self.targets.humidity,
                CurrentTrigger::Light => self.targets.light,
                _ => self.targets.base,
            };
            (code, speed)
        };
        [
            self.humidity,
            self.temperature,
            self.light,
            fan_speed,
            trigger_raw,
            0,
        ]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect()
    }
}

/// Pad a descriptor the way the device does
fn padded(value: &str) -> Vec<u8> {
    let mut bytes = value.as_bytes().to_vec();
    bytes.resize(bytes.len() + 4, 0);
    bytes
}

#[async_trait]
impl Transport for EmulatedFan {
    async fn connect(
        &self,
        address: &str,
        hint: &str,
        _timeout: Duration,
    ) -> Result<Arc<dyn Link>, TransportError> {
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        self.record(Operation::Connect).await;

        if self.inner.faults.lock().await.fail_connect {
            return Err(TransportError::Connect {
                address: address.to_string(),
                reason: "device not found".to_string(),
            });
        }

        debug!(address = %address, hint = %hint, "Emulated fan connected");
        Ok(Arc::new(EmulatedLink {
            fan: self.clone(),
            open: AtomicBool::new(true),
            authenticated: AtomicBool::new(false),
        }))
    }
}

struct EmulatedLink {
    fan: EmulatedFan,
    open: AtomicBool,
    authenticated: AtomicBool,
}

impl EmulatedLink {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Disconnected)
        }
    }

    async fn serve_read(&self, attribute: Attribute) -> Result<Vec<u8>, TransportError> {
        let identity = &self.fan.inner.config.identity;
        let descriptor = |value: &Option<String>| {
            value
                .as_deref()
                .map(padded)
                .ok_or(TransportError::AttributeNotFound(attribute.uuid()))
        };

        let state = self.fan.inner.state.lock().await;
        match attribute {
            Attribute::ModelNumber => descriptor(&identity.model_number),
            Attribute::HardwareRevision => descriptor(&identity.hw_version),
            Attribute::SoftwareRevision => descriptor(&identity.sw_version),
            Attribute::ManufacturerName => descriptor(&identity.manufacturer),
            Attribute::DeviceName => descriptor(&identity.name),
            Attribute::SerialNumber => descriptor(&identity.serial_number),
            Attribute::Sensors => Ok(state.sensors_bytes()),
            Attribute::Pin => Ok(encode_pin(self.fan.inner.config.pin).to_vec()),
            Attribute::PinCheck => {
                let accepted = self.authenticated.load(Ordering::SeqCst);
                Ok(u32::from(accepted).to_be_bytes().to_vec())
            }
            Attribute::FanSpeedTargets => Ok(encode_fan_speed_targets(&state.targets).to_vec()),
            Attribute::FanSensitivity => Ok(state.sensitivity.to_vec()),
            Attribute::Boost => Ok(encode_boost(&BoostRequest {
                active: state.boost.active,
                fan_speed_target: Some(state.boost.fan_speed_target),
                timeleft_seconds: Some(state.boost.timeleft_seconds),
            })
            .to_vec()),
        }
    }

    async fn apply_write(
        &self,
        attribute: Attribute,
        value: &[u8],
    ) -> Result<bool, TransportError> {
        let write_error = |reason: String| TransportError::Write { attribute, reason };

        if attribute == Attribute::Pin {
            let pin = decode_pin(value).map_err(|e| write_error(e.to_string()))?;
            let accepted = pin == self.fan.inner.config.pin;
            self.authenticated.store(accepted, Ordering::SeqCst);
            return Ok(true);
        }

        if !self.authenticated.load(Ordering::SeqCst) {
            debug!(%attribute, "Emulated fan ignored unauthenticated write");
            return Ok(false);
        }

        let mut state = self.fan.inner.state.lock().await;
        match attribute {
            Attribute::FanSpeedTargets => {
                let targets =
                    decode_fan_speed_targets(value).map_err(|e| write_error(e.to_string()))?;
                let clamp = |v: u16| v.clamp(FAN_SPEED_MIN, FAN_SPEED_MAX);
                state.targets = FanSpeedTargets {
                    humidity: clamp(targets.humidity),
                    light: clamp(targets.light),
                    base: clamp(targets.base),
                };
                Ok(true)
            }
            Attribute::Boost => {
                state.boost = decode_boost(value).map_err(|e| write_error(e.to_string()))?;
                Ok(true)
            }
            _ => Err(write_error("attribute is read-only".to_string())),
        }
    }
}

#[async_trait]
impl Link for EmulatedLink {
    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, TransportError> {
        self.ensure_open()?;
        let attribute = Attribute::from_uuid(&characteristic)
            .ok_or(TransportError::AttributeNotFound(characteristic))?;
        self.fan.inner.reads.fetch_add(1, Ordering::SeqCst);
        self.fan.record(Operation::Read(attribute)).await;

        let faults = self.fan.inner.faults.lock().await.clone();
        if let Some(delay) = faults.read_delay {
            tokio::time::sleep(delay).await;
        }
        if faults.fail_reads.contains(&attribute) {
            return Err(TransportError::Read {
                attribute,
                reason: "injected fault".to_string(),
            });
        }

        let mut value = self.serve_read(attribute).await?;
        if faults.truncate_reads.contains(&attribute) {
            value.pop();
        }
        Ok(value)
    }

    async fn write(&self, characteristic: Uuid, value: &[u8]) -> Result<bool, TransportError> {
        self.ensure_open()?;
        let attribute = Attribute::from_uuid(&characteristic)
            .ok_or(TransportError::AttributeNotFound(characteristic))?;
        self.fan.inner.writes.fetch_add(1, Ordering::SeqCst);
        self.fan.record(Operation::Write(attribute, value.to_vec())).await;

        if self.fan.inner.faults.lock().await.reject_writes {
            return Ok(false);
        }
        self.apply_write(attribute, value).await
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if self.open.swap(false, Ordering::SeqCst) {
            self.fan.inner.disconnects.fetch_add(1, Ordering::SeqCst);
            self.fan.record(Operation::Disconnect).await;
        }
        Ok(())
    }

    async fn characteristics(&self) -> Result<Vec<Uuid>, TransportError> {
        self.ensure_open()?;
        Ok(Attribute::ALL.iter().map(Attribute::uuid).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use levante_core::codec::{decode_pin_check, decode_sensors};

    async fn connect(fan: &EmulatedFan) -> Arc<dyn Link> {
        fan.connect("AA:BB:CC:DD:EE:FF", "test", Duration::from_secs(1))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_writes_require_pin() {
        let fan = EmulatedFan::default();
        let link = connect(&fan).await;
        let uuid = Attribute::FanSpeedTargets.uuid();
        let targets = FanSpeedTargets {
            humidity: 2200,
            light: 1500,
            base: 950,
        };

        assert!(!link.write(uuid, &encode_fan_speed_targets(&targets)).await.unwrap());
        assert_eq!(fan.targets().await, fan.config().targets);

        link.write(Attribute::Pin.uuid(), &encode_pin(1234)).await.unwrap();
        let check = link.read(Attribute::PinCheck.uuid()).await.unwrap();
        assert!(decode_pin_check(&check).unwrap());

        assert!(link.write(uuid, &encode_fan_speed_targets(&targets)).await.unwrap());
        assert_eq!(fan.targets().await, targets);
    }

    #[tokio::test]
    async fn test_wrong_pin_is_not_accepted() {
        let fan = EmulatedFan::default();
        let link = connect(&fan).await;
        link.write(Attribute::Pin.uuid(), &encode_pin(9999)).await.unwrap();
        let check = link.read(Attribute::PinCheck.uuid()).await.unwrap();
        assert!(!decode_pin_check(&check).unwrap());
    }

    #[tokio::test]
    async fn test_boost_reflected_in_sensors() {
        let fan = EmulatedFan::default();
        let link = connect(&fan).await;
        link.write(Attribute::Pin.uuid(), &encode_pin(1234)).await.unwrap();
        link.write(Attribute::Boost.uuid(), &encode_boost(&BoostRequest::on()))
            .await
            .unwrap();

        let raw = link.read(Attribute::Sensors.uuid()).await.unwrap();
        let sensors = decode_sensors(&raw).unwrap();
        assert!(sensors.boost_active);
        assert_eq!(sensors.current_trigger, CurrentTrigger::Boost);
        assert_eq!(sensors.fan_speed, 2400);
    }

    #[tokio::test]
    async fn test_targets_are_clamped() {
        let fan = EmulatedFan::default();
        let link = connect(&fan).await;
        link.write(Attribute::Pin.uuid(), &encode_pin(1234)).await.unwrap();
        let targets = FanSpeedTargets {
            humidity: 5000,
            light: 100,
            base: 1200,
        };
        link.write(Attribute::FanSpeedTargets.uuid(), &encode_fan_speed_targets(&targets))
            .await
            .unwrap();
        assert_eq!(
            fan.targets().await,
            FanSpeedTargets {
                humidity: 2400,
                light: 950,
                base: 1200,
            }
        );
    }

    #[tokio::test]
    async fn test_readings_follow_trigger() {
        let fan = EmulatedFan::default();
        fan.set_readings(80, 21, 10, CurrentTrigger::Humidity).await;
        let link = connect(&fan).await;

        let raw = link.read(Attribute::Sensors.uuid()).await.unwrap();
        let sensors = decode_sensors(&raw).unwrap();
        assert_eq!(sensors.humidity, 80);
        assert_eq!(sensors.current_trigger, CurrentTrigger::Humidity);
        assert_eq!(sensors.fan_speed, fan.config().targets.humidity);

        assert_eq!(fan.history().await.len(), 2);
        fan.clear_history().await;
        assert!(fan.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_descriptor_and_closed_link() {
        let fan = EmulatedFan::default();
        let link = connect(&fan).await;
        let serial = Attribute::SerialNumber.uuid();
        assert_eq!(
            link.read(serial).await,
            Err(TransportError::AttributeNotFound(serial))
        );

        link.disconnect().await.unwrap();
        link.disconnect().await.unwrap();
        assert_eq!(fan.stats().disconnects, 1);
        assert_eq!(
            link.read(Attribute::Sensors.uuid()).await,
            Err(TransportError::Disconnected)
        );
    }
}
