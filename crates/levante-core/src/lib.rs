//! Levante Core - Device types, attribute registry and codec
//!
//! This crate provides the foundational pieces for talking to a Levante
//! ventilation fan:
//! - Value types for everything the fan reports or accepts
//! - The attribute registry (GATT UUIDs and byte layouts)
//! - Pure encode/decode functions for each attribute

pub mod attribute;
pub mod codec;
pub mod device;

pub use attribute::{layout_for, Attribute, Field, Layout, UnknownAttribute};
pub use codec::DecodeError;
pub use device::{
    Boost, BoostRequest, CurrentTrigger, DeviceIdentity, FanSensitivity, FanSensitivitySetting,
    FanSpeedTargetKey, FanSpeedTargets, Pin, SensorSnapshot, UnknownTargetKey, FAN_SPEED_MAX,
    FAN_SPEED_MIN, FAN_SPEED_STEP,
};
