//! Device value types decoded from the fan's attributes

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Lowest fan speed target accepted by the fan (RPM)
pub const FAN_SPEED_MIN: u16 = 950;
/// Highest fan speed target accepted by the fan (RPM)
pub const FAN_SPEED_MAX: u16 = 2400;
/// Granularity of fan speed targets (RPM)
pub const FAN_SPEED_STEP: u16 = 25;

/// Credential required to authorize writes
///
/// A value of zero means no credential has been configured.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pin(pub u32);

impl Pin {
    /// Sentinel for "no credential configured"
    pub const UNSET: Pin = Pin(0);

    pub fn is_set(&self) -> bool {
        self.0 != 0
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for Pin {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for Pin {
    // Never print the credential itself.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_set() {
            write!(f, "****")
        } else {
            write!(f, "<unset>")
        }
    }
}

impl std::fmt::Debug for Pin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Pin({self})")
    }
}

/// Static descriptors read from the device information attributes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub manufacturer: Option<String>,
    pub model_number: Option<String>,
    pub name: Option<String>,
    pub sw_version: Option<String>,
    pub hw_version: Option<String>,
    pub serial_number: Option<String>,
}

impl DeviceIdentity {
    /// Model label in the "<name> <model>" form used by device listings
    pub fn model_label(&self) -> String {
        match (&self.name, &self.model_number) {
            (Some(name), Some(model)) => format!("{} {}", name, model),
            (Some(name), None) => name.clone(),
            (None, Some(model)) => model.clone(),
            (None, None) => "unknown".to_string(),
        }
    }
}

/// Condition currently driving the fan speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrentTrigger {
    Base,
    Light,
    Humidity,
    AutomaticVentilation,
    /// Derived from the boost bit, has no code of its own
    Boost,
}

impl CurrentTrigger {
    /// Map a low-nibble trigger code
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::Base),
            2 => Some(Self::Light),
            3 => Some(Self::Humidity),
            7 => Some(Self::AutomaticVentilation),
            _ => None,
        }
    }

    /// Low-nibble code, `None` for the derived boost state
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Base => Some(1),
            Self::Light => Some(2),
            Self::Humidity => Some(3),
            Self::AutomaticVentilation => Some(7),
            Self::Boost => None,
        }
    }
}

impl std::fmt::Display for CurrentTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Base => "base",
            Self::Light => "light",
            Self::Humidity => "humidity",
            Self::AutomaticVentilation => "automatic_ventilation",
            Self::Boost => "boost",
        };
        f.write_str(s)
    }
}

/// One reading of the sensors attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    /// Relative humidity in percent
    pub humidity: u16,
    /// Temperature in device-native units
    pub temperature: u16,
    /// Light level in device-native units
    pub light: u16,
    /// Current fan speed (RPM)
    pub fan_speed: u16,
    pub current_trigger: CurrentTrigger,
    /// Always agrees with `current_trigger == Boost`
    pub boost_active: bool,
    /// Reserved field, passed through as read
    pub unknown: u16,
    /// Lowercase hex of the bytes this snapshot was decoded from
    pub raw: String,
}

/// Fan speed used for each trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanSpeedTargets {
    pub humidity: u16,
    pub light: u16,
    pub base: u16,
}

/// Selects one field of [`FanSpeedTargets`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanSpeedTargetKey {
    Humidity,
    Light,
    Base,
}

impl FanSpeedTargetKey {
    pub const ALL: [FanSpeedTargetKey; 3] = [Self::Humidity, Self::Light, Self::Base];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Humidity => "humidity",
            Self::Light => "light",
            Self::Base => "base",
        }
    }
}

impl std::fmt::Display for FanSpeedTargetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognized fan speed target key
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown fan speed target key: {0}")]
pub struct UnknownTargetKey(pub String);

impl FromStr for FanSpeedTargetKey {
    type Err = UnknownTargetKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "humidity" => Ok(Self::Humidity),
            "light" => Ok(Self::Light),
            "base" => Ok(Self::Base),
            _ => Err(UnknownTargetKey(s.to_string())),
        }
    }
}

impl FanSpeedTargets {
    pub fn get(&self, key: FanSpeedTargetKey) -> u16 {
        match key {
            FanSpeedTargetKey::Humidity => self.humidity,
            FanSpeedTargetKey::Light => self.light,
            FanSpeedTargetKey::Base => self.base,
        }
    }

    pub fn set(&mut self, key: FanSpeedTargetKey, value: u16) {
        match key {
            FanSpeedTargetKey::Humidity => self.humidity = value,
            FanSpeedTargetKey::Light => self.light = value,
            FanSpeedTargetKey::Base => self.base = value,
        }
    }

    /// Copy with one field replaced
    pub fn with(mut self, key: FanSpeedTargetKey, value: u16) -> Self {
        self.set(key, value);
        self
    }
}

/// Boost override state as read from the boost attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Boost {
    pub active: bool,
    pub fan_speed_target: u16,
    pub timeleft_seconds: u16,
}

/// Input for writing the boost attribute
///
/// Omitted values are filled in by the encoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoostRequest {
    pub active: bool,
    pub fan_speed_target: Option<u16>,
    pub timeleft_seconds: Option<u16>,
}

impl BoostRequest {
    pub fn on() -> Self {
        Self {
            active: true,
            ..Self::default()
        }
    }

    pub fn off() -> Self {
        Self::default()
    }
}

/// Sensitivity level of an automatic trigger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanSensitivity {
    #[default]
    Disabled,
    Low,
    Medium,
    High,
}

impl FanSensitivity {
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(Self::Disabled),
            1 => Some(Self::Low),
            2 => Some(Self::Medium),
            3 => Some(Self::High),
            _ => None,
        }
    }

    pub fn level(&self) -> u8 {
        match self {
            Self::Disabled => 0,
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }
}

/// Humidity and light trigger sensitivities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanSensitivitySetting {
    pub humidity: FanSensitivity,
    pub light: FanSensitivity,
}
