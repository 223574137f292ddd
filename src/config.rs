//! Per-session settings.
//!
//! Values are read once when a session starts; edits made while a session is
//! recording take effect on the next `start_session`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::TemperatureUnit;

/// Settings shared by all profile decoders.
///
/// Unknown fields in a JSON file are ignored and missing ones take their
/// default, so older files keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Capacity of every ECG, pace and respiration channel. Default: `1000`.
    pub points_to_display: usize,
    /// Stop automatically after this many seconds. `None` records until
    /// `stop_session` is called. Default: `None`.
    pub record_duration_secs: Option<u64>,
    /// Trailing raw samples fed to each median. Default: `20`.
    pub median_on: usize,
    /// Emit one median every this many raw samples. Default: `20`.
    pub median_every: usize,
    /// Run the median filter on the respiration channels. Default: `true`.
    pub apply_resp_filter: bool,
    /// Arm the ECG Patch respiration baseline capture at session start.
    /// Default: `false`.
    pub capture_baseline: bool,
    /// SensorTag IR temperature resolution in °C per LSB. Default: `0.03125`.
    pub temperature_scale_lsb: f64,
    /// Unit of SensorTag IR temperatures. Default: Celsius.
    pub temp_units: TemperatureUnit,
    /// Current-RSSI history kept by the range test. Default: `1500`.
    pub range_test_capacity: usize,
    /// ADC display samples kept for plotting. Default: `400`.
    pub adc_display_capacity: usize,
    /// Health thermometer measurements kept. Default: `20`.
    pub thermometer_history: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            points_to_display: 1000,
            record_duration_secs: None,
            median_on: 20,
            median_every: 20,
            apply_resp_filter: true,
            capture_baseline: false,
            temperature_scale_lsb: 0.03125,
            temp_units: TemperatureUnit::Celsius,
            range_test_capacity: 1500,
            adc_display_capacity: 400,
            thermometer_history: 20,
        }
    }
}

impl SessionConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    /// Write pretty-printed JSON to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.points_to_display, 1000);
        assert_eq!(cfg.record_duration_secs, None);
        assert_eq!((cfg.median_on, cfg.median_every), (20, 20));
        assert!(cfg.apply_resp_filter);
        assert_eq!(cfg.temperature_scale_lsb, 0.03125);
        assert_eq!(cfg.range_test_capacity, 1500);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = SessionConfig::from_json_str(
            r#"{ "median_every": 1, "record_duration_secs": 30, "temp_units": "Fahrenheit" }"#,
        )
        .unwrap();
        assert_eq!(cfg.median_every, 1);
        assert_eq!(cfg.median_on, 20);
        assert_eq!(cfg.record_duration_secs, Some(30));
        assert_eq!(cfg.temp_units, TemperatureUnit::Fahrenheit);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            SessionConfig::from_json_str("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn save_then_load() {
        let path = std::env::temp_dir()
            .join(format!("blestream-config-{}", std::process::id()))
            .join("session.json");
        let cfg = SessionConfig {
            points_to_display: 250,
            capture_baseline: true,
            ..SessionConfig::default()
        };
        cfg.save(&path).unwrap();
        assert_eq!(SessionConfig::load(&path).unwrap(), cfg);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = SessionConfig::load(Path::new("/nonexistent/blestream.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
