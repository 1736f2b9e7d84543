//! Typed reads over an open session

use levante_core::codec::{
    decode_boost, decode_fan_sensitivity, decode_fan_speed_targets, decode_pin, decode_pin_check,
    decode_sensors, decode_string,
};
use levante_core::{
    Attribute, Boost, DeviceIdentity, FanSensitivitySetting, FanSpeedTargets, Pin, SensorSnapshot,
};
use tracing::{debug, info};

use crate::error::GattError;
use crate::session::Session;
use crate::transport::TransportError;

/// Read a string descriptor
///
/// Descriptors the device does not expose and empty strings both read as
/// `None`.
pub async fn read_string(
    session: &Session,
    attribute: Attribute,
) -> Result<Option<String>, GattError> {
    let bytes = match session.read(attribute).await {
        Ok(bytes) => bytes,
        Err(TransportError::AttributeNotFound(_)) => {
            debug!(address = %session.address(), %attribute, "Descriptor not exposed");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let value = decode_string(&bytes)?;
    Ok(if value.is_empty() { None } else { Some(value) })
}

/// Read every identity descriptor
pub async fn read_identity(session: &Session) -> Result<DeviceIdentity, GattError> {
    let identity = DeviceIdentity {
        manufacturer: read_string(session, Attribute::ManufacturerName).await?,
        model_number: read_string(session, Attribute::ModelNumber).await?,
        name: read_string(session, Attribute::DeviceName).await?,
        sw_version: read_string(session, Attribute::SoftwareRevision).await?,
        hw_version: read_string(session, Attribute::HardwareRevision).await?,
        serial_number: read_string(session, Attribute::SerialNumber).await?,
    };

    info!(
        address = %session.address(),
        model = %identity.model_label(),
        sw_version = identity.sw_version.as_deref().unwrap_or("-"),
        "Read device identity"
    );
    Ok(identity)
}

pub async fn read_sensors(session: &Session) -> Result<SensorSnapshot, GattError> {
    let bytes = session.read(Attribute::Sensors).await?;
    let snapshot = decode_sensors(&bytes)?;
    debug!(
        address = %session.address(),
        fan_speed = snapshot.fan_speed,
        trigger = %snapshot.current_trigger,
        raw = %snapshot.raw,
        "Read sensors"
    );
    Ok(snapshot)
}

pub async fn read_fan_speed_targets(session: &Session) -> Result<FanSpeedTargets, GattError> {
    let bytes = session.read(Attribute::FanSpeedTargets).await?;
    Ok(decode_fan_speed_targets(&bytes)?)
}

pub async fn read_fan_sensitivity(session: &Session) -> Result<FanSensitivitySetting, GattError> {
    let bytes = session.read(Attribute::FanSensitivity).await?;
    Ok(decode_fan_sensitivity(&bytes)?)
}

pub async fn read_boost(session: &Session) -> Result<Boost, GattError> {
    let bytes = session.read(Attribute::Boost).await?;
    Ok(decode_boost(&bytes)?)
}

/// Read the pin the device currently holds
///
/// Some units report their pin before authentication; others return zero.
pub async fn read_pin(session: &Session) -> Result<Pin, GattError> {
    let bytes = session.read(Attribute::Pin).await?;
    Ok(Pin(decode_pin(&bytes)?))
}

/// Whether the last pin written on this link was accepted
pub async fn check_pin(session: &Session) -> Result<bool, GattError> {
    let bytes = session.read(Attribute::PinCheck).await?;
    Ok(decode_pin_check(&bytes)?)
}

/// Log the characteristics the device exposes
pub async fn log_characteristics(session: &Session) -> Result<usize, GattError> {
    let uuids = session.characteristics().await?;
    for uuid in &uuids {
        let name = Attribute::from_uuid(uuid)
            .map(|a| a.name())
            .unwrap_or("unrecognized");
        debug!(address = %session.address(), uuid = %uuid, attribute = name, "Characteristic");
    }
    Ok(uuids.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::{EmulatedFan, EmulatorConfig, Faults};
    use crate::session::SessionFactory;
    use levante_core::{CurrentTrigger, DecodeError, FanSensitivity};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn factory(fan: &EmulatedFan) -> SessionFactory {
        SessionFactory::new(Arc::new(fan.clone()), "AA:BB:CC:DD:EE:FF")
    }

    #[tokio::test]
    async fn test_read_identity_skips_missing_descriptor() {
        let fan = EmulatedFan::default();
        let identity = factory(&fan)
            .with_session(|session| async move { read_identity(&session).await })
            .await
            .unwrap();

        assert_eq!(identity.manufacturer.as_deref(), Some("PAX"));
        assert_eq!(identity.model_number.as_deref(), Some("Levante 50"));
        assert_eq!(identity.serial_number, None);
    }

    #[tokio::test]
    async fn test_empty_descriptor_reads_as_none() {
        let mut config = EmulatorConfig::default();
        config.identity.name = Some(String::new());
        let fan = EmulatedFan::new(config);

        let name = factory(&fan)
            .with_session(|session| async move {
                read_string(&session, Attribute::DeviceName).await
            })
            .await
            .unwrap();
        assert_eq!(name, None);
    }

    #[tokio::test]
    async fn test_read_values() {
        let fan = EmulatedFan::default();
        let (sensors, targets, sensitivity, boost, pin) = factory(&fan)
            .with_session(|session| async move {
                Ok::<_, GattError>((
                    read_sensors(&session).await?,
                    read_fan_speed_targets(&session).await?,
                    read_fan_sensitivity(&session).await?,
                    read_boost(&session).await?,
                    read_pin(&session).await?,
                ))
            })
            .await
            .unwrap();

        assert_eq!(sensors.current_trigger, CurrentTrigger::Base);
        assert_eq!(sensors.fan_speed, 950);
        assert_eq!(targets, fan.config().targets);
        assert_eq!(sensitivity.humidity, FanSensitivity::Medium);
        assert_eq!(sensitivity.light, FanSensitivity::High);
        assert!(!boost.active);
        assert_eq!(pin, Pin(1234));
    }

    #[tokio::test]
    async fn test_truncated_read_is_decode_error() {
        let fan = EmulatedFan::default();
        fan.set_faults(Faults {
            truncate_reads: HashSet::from([Attribute::Sensors]),
            ..Faults::default()
        })
        .await;

        let result = factory(&fan)
            .with_session(|session| async move { read_sensors(&session).await })
            .await;
        assert_eq!(
            result,
            Err(GattError::Decode(DecodeError::LengthMismatch {
                attribute: Attribute::Sensors,
                expected: 12,
                actual: 11,
            }))
        );
    }

    #[tokio::test]
    async fn test_log_characteristics_counts() {
        let fan = EmulatedFan::default();
        let count = factory(&fan)
            .with_session(|session| async move { log_characteristics(&session).await })
            .await
            .unwrap();
        assert_eq!(count, Attribute::ALL.len());
    }
}
