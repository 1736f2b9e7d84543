//! Binary codec for attribute values
//!
//! Pure functions between raw attribute bytes and the types in
//! [`crate::device`]. Multi-byte integers are little-endian except the
//! pin attributes, which are big-endian.

use thiserror::Error;

use crate::attribute::{layout_for, Attribute};
use crate::device::{
    Boost, BoostRequest, CurrentTrigger, FanSensitivity, FanSensitivitySetting, FanSpeedTargets,
    SensorSnapshot,
};

/// Position of the boost flag in the current trigger field
const BOOST_BIT_POSITION: u16 = 4;
/// Mask extracting the trigger code from the current trigger field
const TRIGGER_VALUE_MASK: u16 = 0xF;

/// Boost target used when activating without an explicit value (RPM)
pub const DEFAULT_BOOST_SPEED: u16 = 2400;
/// Boost duration used when activating without an explicit value
pub const DEFAULT_BOOST_SECONDS: u16 = 900;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{attribute}: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        attribute: Attribute,
        expected: usize,
        actual: usize,
    },
    #[error("String value is not valid UTF-8")]
    InvalidUtf8,
    #[error("Unknown current trigger code: {0:#x}")]
    UnknownTrigger(u16),
    #[error("Unknown fan sensitivity level: {0}")]
    UnknownSensitivity(u8),
}

/// Check a buffer against the attribute's fixed layout size
fn expect_len(attribute: Attribute, bytes: &[u8]) -> Result<(), DecodeError> {
    let expected = layout_for(attribute).size().unwrap_or(bytes.len());
    if bytes.len() != expected {
        return Err(DecodeError::LengthMismatch {
            attribute,
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

fn u16_le(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

/// Decode a NUL-terminated string descriptor
///
/// Everything from the first NUL onwards is padding and is never decoded.
pub fn decode_string(bytes: &[u8]) -> Result<String, DecodeError> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[..end])
        .map(str::to_string)
        .map_err(|_| DecodeError::InvalidUtf8)
}

/// Decode the sensors attribute
pub fn decode_sensors(bytes: &[u8]) -> Result<SensorSnapshot, DecodeError> {
    expect_len(Attribute::Sensors, bytes)?;

    let trigger_raw = u16_le(bytes, 8);
    let boost_active = trigger_raw >> BOOST_BIT_POSITION == 1;
    let current_trigger = if boost_active {
        CurrentTrigger::Boost
    } else {
        let code = trigger_raw & TRIGGER_VALUE_MASK;
        CurrentTrigger::from_code(code).ok_or(DecodeError::UnknownTrigger(trigger_raw))?
    };

    Ok(SensorSnapshot {
        humidity: u16_le(bytes, 0),
        temperature: u16_le(bytes, 2),
        light: u16_le(bytes, 4),
        fan_speed: u16_le(bytes, 6),
        current_trigger,
        boost_active,
        unknown: u16_le(bytes, 10),
        raw: hex::encode(bytes),
    })
}

pub fn decode_fan_speed_targets(bytes: &[u8]) -> Result<FanSpeedTargets, DecodeError> {
    expect_len(Attribute::FanSpeedTargets, bytes)?;
    Ok(FanSpeedTargets {
        humidity: u16_le(bytes, 0),
        light: u16_le(bytes, 2),
        base: u16_le(bytes, 4),
    })
}

pub fn encode_fan_speed_targets(targets: &FanSpeedTargets) -> [u8; 6] {
    let mut out = [0u8; 6];
    out[0..2].copy_from_slice(&targets.humidity.to_le_bytes());
    out[2..4].copy_from_slice(&targets.light.to_le_bytes());
    out[4..6].copy_from_slice(&targets.base.to_le_bytes());
    out
}

/// Decode the fan sensitivity attribute
///
/// A trigger whose active byte is zero reads as disabled whatever its
/// level byte holds.
pub fn decode_fan_sensitivity(bytes: &[u8]) -> Result<FanSensitivitySetting, DecodeError> {
    expect_len(Attribute::FanSensitivity, bytes)?;

    let level = |active: u8, raw: u8| {
        if active == 0 {
            Ok(FanSensitivity::Disabled)
        } else {
            FanSensitivity::from_level(raw).ok_or(DecodeError::UnknownSensitivity(raw))
        }
    };

    Ok(FanSensitivitySetting {
        humidity: level(bytes[0], bytes[1])?,
        light: level(bytes[2], bytes[3])?,
    })
}

pub fn decode_boost(bytes: &[u8]) -> Result<Boost, DecodeError> {
    expect_len(Attribute::Boost, bytes)?;
    Ok(Boost {
        active: bytes[0] != 0,
        fan_speed_target: u16_le(bytes, 1),
        timeleft_seconds: u16_le(bytes, 3),
    })
}

/// Encode a boost write
///
/// Omitted values default to [`DEFAULT_BOOST_SPEED`] and
/// [`DEFAULT_BOOST_SECONDS`] when activating and to zero when
/// deactivating. Explicit values are written as given.
pub fn encode_boost(request: &BoostRequest) -> [u8; 5] {
    let (default_speed, default_seconds) = if request.active {
        (DEFAULT_BOOST_SPEED, DEFAULT_BOOST_SECONDS)
    } else {
        (0, 0)
    };
    let speed = request.fan_speed_target.unwrap_or(default_speed);
    let seconds = request.timeleft_seconds.unwrap_or(default_seconds);

    let mut out = [0u8; 5];
    out[0] = u8::from(request.active);
    out[1..3].copy_from_slice(&speed.to_le_bytes());
    out[3..5].copy_from_slice(&seconds.to_le_bytes());
    out
}

pub fn decode_pin(bytes: &[u8]) -> Result<u32, DecodeError> {
    expect_len(Attribute::Pin, bytes)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub fn encode_pin(pin: u32) -> [u8; 4] {
    pin.to_be_bytes()
}

/// Decode the pin check attribute, `true` when the last pin was accepted
pub fn decode_pin_check(bytes: &[u8]) -> Result<bool, DecodeError> {
    expect_len(Attribute::PinCheck, bytes)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) == 1)
}
