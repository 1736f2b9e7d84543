//! Authenticated write sequences
//!
//! Each command authenticates on the link it writes through, since the
//! fan only accepts writes on a link that presented the pin. Nothing here
//! retries.

use levante_core::codec::{encode_boost, encode_fan_speed_targets, encode_pin};
use levante_core::{Attribute, BoostRequest, FanSpeedTargets, Pin, SensorSnapshot};
use tracing::{debug, info, warn};

use crate::error::{AuthError, GattError};
use crate::query::{check_pin, read_fan_speed_targets, read_sensors};
use crate::session::Session;
use crate::transport::TransportError;

async fn write_acknowledged(
    session: &Session,
    attribute: Attribute,
    value: &[u8],
) -> Result<(), GattError> {
    if session.write(attribute, value).await? {
        Ok(())
    } else {
        Err(TransportError::NotAcknowledged(attribute).into())
    }
}

/// Present the pin and report whether the device accepted it
pub async fn authenticate(session: &Session, pin: Pin) -> Result<bool, GattError> {
    if !pin.is_set() {
        return Err(AuthError::PinNotSet.into());
    }

    write_acknowledged(session, Attribute::Pin, &encode_pin(pin.value())).await?;
    let accepted = check_pin(session).await?;
    debug!(address = %session.address(), accepted, "Pin check");
    Ok(accepted)
}

async fn require_auth(session: &Session, pin: Pin) -> Result<(), GattError> {
    if authenticate(session, pin).await? {
        Ok(())
    } else {
        warn!(address = %session.address(), "Unable to set pin");
        Err(AuthError::PinRejected.into())
    }
}

/// Write all three fan speed targets and return what the device now holds
pub async fn set_fan_speed_targets(
    session: &Session,
    pin: Pin,
    targets: &FanSpeedTargets,
) -> Result<FanSpeedTargets, GattError> {
    require_auth(session, pin).await?;
    write_acknowledged(
        session,
        Attribute::FanSpeedTargets,
        &encode_fan_speed_targets(targets),
    )
    .await?;

    let stored = read_fan_speed_targets(session).await?;
    info!(
        address = %session.address(),
        humidity = stored.humidity,
        light = stored.light,
        base = stored.base,
        "Fan speed targets written"
    );
    Ok(stored)
}

/// Write the boost attribute and return the sensors that follow it
pub async fn set_boost(
    session: &Session,
    pin: Pin,
    request: &BoostRequest,
) -> Result<SensorSnapshot, GattError> {
    require_auth(session, pin).await?;
    write_acknowledged(session, Attribute::Boost, &encode_boost(request)).await?;
    info!(address = %session.address(), active = request.active, "Boost written");
    read_sensors(session).await
}
