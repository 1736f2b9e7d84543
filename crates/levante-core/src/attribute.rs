//! Attribute registry
//!
//! Every attribute the fan exposes is listed here with its GATT
//! characteristic UUID and the byte layout of its value. The device
//! information strings use the standard Bluetooth SIG characteristics,
//! the rest are vendor characteristics.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// A named, independently readable or writable device attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    ModelNumber,
    HardwareRevision,
    SoftwareRevision,
    ManufacturerName,
    DeviceName,
    SerialNumber,
    Sensors,
    Pin,
    PinCheck,
    FanSpeedTargets,
    FanSensitivity,
    Boost,
}

/// One packed field of a fixed-size layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    U8,
    /// 16-bit unsigned, little-endian
    U16Le,
    /// 32-bit unsigned, big-endian
    U32Be,
}

impl Field {
    pub const fn size(&self) -> usize {
        match self {
            Field::U8 => 1,
            Field::U16Le => 2,
            Field::U32Be => 4,
        }
    }
}

/// Byte layout of an attribute value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// NUL-terminated, zero-padded UTF-8
    Text,
    /// Consecutive fixed-size fields
    Packed(&'static [Field]),
}

impl Layout {
    /// Total size of a packed layout, `None` for text
    pub fn size(&self) -> Option<usize> {
        match self {
            Layout::Text => None,
            Layout::Packed(fields) => Some(fields.iter().map(Field::size).sum()),
        }
    }
}

const SENSORS_LAYOUT: &[Field] = &[
    Field::U16Le, // humidity
    Field::U16Le, // temperature
    Field::U16Le, // light
    Field::U16Le, // fan speed
    Field::U16Le, // current trigger
    Field::U16Le, // unknown
];
const PIN_LAYOUT: &[Field] = &[Field::U32Be];
const FAN_SPEED_TARGETS_LAYOUT: &[Field] = &[Field::U16Le, Field::U16Le, Field::U16Le];
const FAN_SENSITIVITY_LAYOUT: &[Field] = &[Field::U8, Field::U8, Field::U8, Field::U8];
const BOOST_LAYOUT: &[Field] = &[Field::U8, Field::U16Le, Field::U16Le];

/// Byte layout for an attribute
pub fn layout_for(attribute: Attribute) -> Layout {
    match attribute {
        Attribute::ModelNumber
        | Attribute::HardwareRevision
        | Attribute::SoftwareRevision
        | Attribute::ManufacturerName
        | Attribute::DeviceName
        | Attribute::SerialNumber => Layout::Text,
        Attribute::Sensors => Layout::Packed(SENSORS_LAYOUT),
        Attribute::Pin | Attribute::PinCheck => Layout::Packed(PIN_LAYOUT),
        Attribute::FanSpeedTargets => Layout::Packed(FAN_SPEED_TARGETS_LAYOUT),
        Attribute::FanSensitivity => Layout::Packed(FAN_SENSITIVITY_LAYOUT),
        Attribute::Boost => Layout::Packed(BOOST_LAYOUT),
    }
}

impl Attribute {
    pub const ALL: [Attribute; 12] = [
        Attribute::ModelNumber,
        Attribute::HardwareRevision,
        Attribute::SoftwareRevision,
        Attribute::ManufacturerName,
        Attribute::DeviceName,
        Attribute::SerialNumber,
        Attribute::Sensors,
        Attribute::Pin,
        Attribute::PinCheck,
        Attribute::FanSpeedTargets,
        Attribute::FanSensitivity,
        Attribute::Boost,
    ];

    /// GATT characteristic UUID
    pub const fn uuid(&self) -> Uuid {
        match self {
            Attribute::ModelNumber => sig_uuid(0x2a24),
            Attribute::HardwareRevision => sig_uuid(0x2a27),
            Attribute::SoftwareRevision => sig_uuid(0x2a28),
            Attribute::ManufacturerName => sig_uuid(0x2a29),
            Attribute::DeviceName => sig_uuid(0x2a00),
            Attribute::SerialNumber => sig_uuid(0x2a25),
            Attribute::Sensors => Uuid::from_u128(0x528b80e8_c47a_4c0a_bdf1_916a7748f412),
            Attribute::Pin => Uuid::from_u128(0x4cad343a_209a_40b7_b911_4d9b3df569b2),
            Attribute::PinCheck => Uuid::from_u128(0xd1ae6b70_ee12_4f6d_b166_d2063dcaffe1),
            Attribute::FanSpeedTargets => {
                Uuid::from_u128(0x1488a757_35bc_4ec8_9a6b_9ecf1502778e)
            }
            Attribute::FanSensitivity => Uuid::from_u128(0xe782e131_6ce1_4191_a8db_f4304d7610f1),
            Attribute::Boost => Uuid::from_u128(0x118c949c_28c8_4139_b0b3_36657fd055a9),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Attribute::ModelNumber => "model_number",
            Attribute::HardwareRevision => "hardware_revision",
            Attribute::SoftwareRevision => "software_revision",
            Attribute::ManufacturerName => "manufacturer_name",
            Attribute::DeviceName => "device_name",
            Attribute::SerialNumber => "serial_number",
            Attribute::Sensors => "sensors",
            Attribute::Pin => "pin",
            Attribute::PinCheck => "pin_check",
            Attribute::FanSpeedTargets => "fan_speed_targets",
            Attribute::FanSensitivity => "fan_sensitivity",
            Attribute::Boost => "boost",
        }
    }

    /// Reverse lookup for transports that only see UUIDs
    pub fn from_uuid(uuid: &Uuid) -> Option<Attribute> {
        Attribute::ALL.into_iter().find(|a| a.uuid() == *uuid)
    }

    pub fn layout(&self) -> Layout {
        layout_for(*self)
    }
}

/// Expand a 16-bit Bluetooth SIG assigned number onto the base UUID
const fn sig_uuid(short: u16) -> Uuid {
    Uuid::from_u128(((short as u128) << 96) | 0x0000_0000_0000_1000_8000_0080_5f9b_34fb)
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Error for an attribute name not in the registry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown attribute: {0}")]
pub struct UnknownAttribute(pub String);

impl FromStr for Attribute {
    type Err = UnknownAttribute;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Attribute::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| UnknownAttribute(s.to_string()))
    }
}
