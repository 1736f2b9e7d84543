//! Per-device coordinator settings

use levante_core::Pin;
use levante_gatt::DEFAULT_SESSION_TIMEOUT;
use std::time::Duration;

/// Period between scheduled refreshes
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(65);

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Device address passed to the transport
    pub address: String,
    /// Human-readable name used in logs
    pub name: Option<String>,
    /// Credential for writes, unset disables every command
    pub pin: Pin,
    pub update_interval: Duration,
    /// Bound for one connect-and-run sequence
    pub session_timeout: Duration,
}

impl CoordinatorConfig {
    pub fn new(address: impl Into<String>, pin: Pin) -> Self {
        Self {
            address: address.into(),
            pin,
            ..Self::default()
        }
    }

    /// Name for logs, falling back to the address
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            name: None,
            pin: Pin::UNSET,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_output_masks_pin() {
        let config = CoordinatorConfig::new("AA:BB:CC:DD:EE:FF", Pin(1234));
        let printed = format!("{config:?}");
        assert!(printed.contains("AA:BB:CC:DD:EE:FF"));
        assert!(printed.contains("Pin(****)"));
        assert!(!printed.contains("1234"));
    }

    #[test]
    fn test_display_name_falls_back_to_address() {
        let mut config = CoordinatorConfig::new("AA:BB", Pin::UNSET);
        assert_eq!(config.display_name(), "AA:BB");
        config.name = Some("Bathroom".to_string());
        assert_eq!(config.display_name(), "Bathroom");
    }
}
