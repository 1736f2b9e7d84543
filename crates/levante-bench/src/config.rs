//! Configuration loading and validation

use anyhow::{bail, Result};
use levante_coordinator::CoordinatorConfig;
use levante_core::Pin;
use levante_gatt::EmulatorConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(default)]
    pub bench: BenchSettings,
    #[serde(default, rename = "device")]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchSettings {
    /// Seconds between scheduled refreshes
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,
    /// Bound for one connect-and-run sequence in seconds
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,
}

impl Default for BenchSettings {
    fn default() -> Self {
        Self {
            update_interval_secs: default_update_interval(),
            session_timeout_secs: default_session_timeout(),
        }
    }
}

fn default_update_interval() -> u64 {
    65
}

fn default_session_timeout() -> u64 {
    10
}

/// One fan to drive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Write credential, 0 leaves it unset
    #[serde(default)]
    pub pin: Pin,
    /// Initial state of the emulated fan behind this address
    #[serde(default)]
    pub emulator: EmulatorConfig,
}

impl DeviceConfig {
    pub fn coordinator_config(&self, settings: &BenchSettings) -> CoordinatorConfig {
        CoordinatorConfig {
            address: self.address.clone(),
            name: self.name.clone(),
            pin: self.pin,
            update_interval: Duration::from_secs(settings.update_interval_secs),
            session_timeout: Duration::from_secs(settings.session_timeout_secs),
        }
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        let emulator = EmulatorConfig::default();
        Self {
            bench: BenchSettings::default(),
            devices: vec![DeviceConfig {
                address: "D4:3D:39:00:00:01".to_string(),
                name: Some("bathroom".to_string()),
                pin: Pin(emulator.pin),
                emulator,
            }],
        }
    }
}

impl BenchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.bench.update_interval_secs == 0 {
            bail!("update_interval_secs must be greater than zero");
        }
        if self.bench.session_timeout_secs == 0 {
            bail!("session_timeout_secs must be greater than zero");
        }

        let mut seen = HashSet::new();
        for device in &self.devices {
            if device.address.is_empty() {
                bail!("device address must not be empty");
            }
            if !seen.insert(device.address.as_str()) {
                bail!("device {} is configured twice", device.address);
            }
        }
        Ok(())
    }

    pub fn device(&self, address: &str) -> Option<&DeviceConfig> {
        self.devices
            .iter()
            .find(|d| d.address.eq_ignore_ascii_case(address))
    }
}

/// Load configuration from file, or defaults when the file is missing
pub fn load_config(path: &Path) -> Result<BenchConfig> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: BenchConfig = toml::from_str(&content)?;
        info!(path = %path.display(), devices = config.devices.len(), "Loaded configuration");
        config
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        BenchConfig::default()
    };

    config.validate()?;
    Ok(config)
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(&BenchConfig::default())?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_config(&temp_dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.bench.update_interval_secs, 65);
        assert_eq!(config.bench.session_timeout_secs, 10);
        assert_eq!(config.devices.len(), 1);
    }

    #[test]
    fn test_saved_default_loads_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("levante.toml");
        save_default_config(&path).unwrap();

        let config = load_config(&path).unwrap();
        let device = &config.devices[0];
        assert_eq!(device.address, "D4:3D:39:00:00:01");
        assert_eq!(device.pin, Pin(1234));
        assert_eq!(device.emulator.targets.humidity, 2000);
    }

    #[test]
    fn test_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("levante.toml");
        std::fs::write(
            &path,
            r#"
[bench]
update_interval_secs = 30

[[device]]
address = "AA:BB:CC:DD:EE:FF"
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.bench.update_interval_secs, 30);
        assert_eq!(config.bench.session_timeout_secs, 10);

        let device = config.device("aa:bb:cc:dd:ee:ff").unwrap();
        assert_eq!(device.pin, Pin::UNSET);
        assert_eq!(device.emulator.pin, 1234);

        let coordinator = device.coordinator_config(&config.bench);
        assert!(!coordinator.pin.is_set());
        assert_eq!(coordinator.update_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_duplicate_device_rejected() {
        let mut config = BenchConfig::default();
        config.devices.push(config.devices[0].clone());
        assert!(config.validate().is_err());
    }
}
