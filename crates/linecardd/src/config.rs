//! Configuration file support for linecardd
//!
//! Loads and validates linecardd configuration from TOML files.
//! Default location: /etc/sonic/linecardd.toml

use crate::error::{LinecardError, LinecardResult};
use crate::linecard::SlotIndex;
use crate::status::{CardType, ReadyState, SlotInfo};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sonic/linecardd.toml";

/// Scan scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Interval between full chassis scans in milliseconds
    #[serde(default = "default_scan_interval")]
    pub interval_ms: u64,

    /// Maximum number of queued status events
    #[serde(default = "default_event_queue_depth")]
    pub event_queue_depth: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON log lines
    #[serde(default)]
    pub json: bool,
}

/// One slot of the in-memory chassis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotConfig {
    #[serde(default)]
    pub provisioned: bool,

    #[serde(default)]
    pub ready: bool,

    #[serde(default)]
    pub active: bool,

    #[serde(default)]
    pub hw_revision: u16,

    /// Firmware version as `major.minor.subminor`
    #[serde(default = "default_firmware")]
    pub firmware: String,

    #[serde(default)]
    pub card_type: u8,
}

/// Chassis description used when no hardware transport is linked in
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChassisConfig {
    /// Number of slots; defaults to the number of listed slots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_count: Option<usize>,

    /// Initial hardware state of each slot, in slot order
    #[serde(default)]
    pub slots: Vec<SlotConfig>,
}

/// Complete linecardd configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinecarddConfig {
    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub chassis: ChassisConfig,
}

// Default functions
fn default_scan_interval() -> u64 {
    1000
}

fn default_event_queue_depth() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_firmware() -> String {
    "0.0.0".to_string()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_scan_interval(),
            event_queue_depth: default_event_queue_depth(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            provisioned: false,
            ready: false,
            active: false,
            hw_revision: 0,
            firmware: default_firmware(),
            card_type: 0,
        }
    }
}

impl SlotConfig {
    /// Builds the hardware record this slot starts with.
    pub fn to_slot_info(&self, slot_index: SlotIndex) -> LinecardResult<SlotInfo> {
        if !self.provisioned && (self.ready || self.active) {
            return Err(LinecardError::Configuration(format!(
                "slot {} is ready or active but not provisioned",
                slot_index
            )));
        }

        Ok(SlotInfo {
            slot_index,
            provisioned: self.provisioned,
            sr_valid: true,
            ready: if self.ready {
                ReadyState::Ready
            } else {
                ReadyState::NotReady
            },
            active: self.active,
            hw_revision: self.hw_revision,
            firmware_version: self.firmware.parse()?,
            card_type: CardType(self.card_type),
        })
    }
}

impl ChassisConfig {
    pub fn slot_count(&self) -> usize {
        self.slot_count.unwrap_or(self.slots.len())
    }

    /// Hardware records for every slot, empty slots padded in.
    pub fn slot_infos(&self) -> LinecardResult<Vec<SlotInfo>> {
        let count = self.slot_count();
        if count > usize::from(SlotIndex::MAX) {
            return Err(LinecardError::Configuration(format!(
                "slot_count {} exceeds {}",
                count,
                SlotIndex::MAX
            )));
        }
        if self.slots.len() > count {
            return Err(LinecardError::Configuration(format!(
                "{} slots listed but slot_count is {}",
                self.slots.len(),
                count
            )));
        }

        (1..=count as SlotIndex)
            .map(|slot_index| match self.slots.get(usize::from(slot_index) - 1) {
                Some(slot) => slot.to_slot_info(slot_index),
                None => Ok(SlotInfo::unprovisioned(slot_index)),
            })
            .collect()
    }
}

impl LinecarddConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> LinecardResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                LinecardError::Configuration(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(LinecardError::Io(e)),
        }
    }

    /// Load from default location or defaults
    pub fn load() -> LinecardResult<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> LinecardResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            LinecardError::Configuration(format!("Failed to serialize config: {}", e))
        })?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get scan interval as Duration
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan.interval_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> LinecardResult<()> {
        if self.scan.interval_ms == 0 {
            return Err(LinecardError::Configuration(
                "interval_ms must be > 0".to_string(),
            ));
        }

        if self.scan.event_queue_depth == 0 {
            return Err(LinecardError::Configuration(
                "event_queue_depth must be > 0".to_string(),
            ));
        }

        self.chassis.slot_infos()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::FirmwareVersion;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = LinecarddConfig::default();
        assert_eq!(config.scan.interval_ms, 1000);
        assert_eq!(config.scan.event_queue_depth, 64);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert!(config.chassis.slots.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scan_interval_duration() {
        let config = LinecarddConfig::default();
        assert_eq!(config.scan_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_validate_zero_interval() {
        let mut config = LinecarddConfig::default();
        config.scan.interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_queue_depth() {
        let mut config = LinecarddConfig::default();
        config.scan.event_queue_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_active_without_provisioning() {
        let mut config = LinecarddConfig::default();
        config.chassis.slots.push(SlotConfig {
            active: true,
            ..SlotConfig::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_firmware() {
        let mut config = LinecarddConfig::default();
        config.chassis.slots.push(SlotConfig {
            provisioned: true,
            firmware: "1.two.3".to_string(),
            ..SlotConfig::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_too_many_slots() {
        let mut config = LinecarddConfig::default();
        config.chassis.slot_count = Some(256);
        assert!(config.validate().is_err());

        config.chassis.slot_count = Some(1);
        config.chassis.slots = vec![SlotConfig::default(), SlotConfig::default()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[scan]
interval_ms = 250

[chassis]
slot_count = 4

[[chassis.slots]]
provisioned = true
ready = true
active = true
hw_revision = 3
firmware = "1.2.0"
card_type = 2

[[chassis.slots]]
"#;
        let config: LinecarddConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scan.interval_ms, 250);
        // Unspecified values should use defaults
        assert_eq!(config.scan.event_queue_depth, 64);
        assert_eq!(config.logging.level, "info");

        let slots = config.chassis.slot_infos().unwrap();
        assert_eq!(slots.len(), 4);
        assert_eq!(
            slots[0],
            SlotInfo {
                card_type: CardType(2),
                ..SlotInfo::active(1, 3, FirmwareVersion::new(1, 2, 0))
            }
        );
        assert_eq!(slots[1], SlotInfo::unprovisioned(2));
        assert_eq!(slots[3], SlotInfo::unprovisioned(4));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linecardd.toml");

        let mut config = LinecarddConfig::default();
        config.logging.json = true;
        config.chassis.slots.push(SlotConfig {
            provisioned: true,
            firmware: "2.0.1".to_string(),
            ..SlotConfig::default()
        });
        config.save(&path).unwrap();

        let loaded = LinecarddConfig::load_or_default(&path).unwrap();
        assert!(loaded.logging.json);
        assert_eq!(loaded.chassis.slots.len(), 1);
        assert_eq!(loaded.chassis.slots[0].firmware, "2.0.1");
    }

    #[test]
    fn test_parse_error_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[scan\ninterval_ms = ").unwrap();
        assert!(matches!(
            LinecarddConfig::load_or_default(&path),
            Err(LinecardError::Configuration(_))
        ));
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = LinecarddConfig::load_or_default("/nonexistent/path.toml").unwrap();
        assert_eq!(config.scan.interval_ms, 1000);
    }
}
