//! Run configuration.
//!
//! Every section has defaults, so a JSON file only needs the fields it
//! changes:
//!
//! ```json
//! { "seed": 7, "devices": 20, "adr": { "change_tx_power": false } }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::lora::region;
use crate::mac::PowerSource;

/// Network-side ADR-Lite controller settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdrLiteConfig {
    /// Adjust transmit power as well as spreading factor
    pub change_tx_power: bool,
    /// Add coding rate 4/5..4/8 to the configuration space
    pub change_coding_rate: bool,
    /// Add the three mandatory channels to the configuration space
    pub change_channel: bool,
    /// Payload size used to rank configurations by energy
    pub reference_payload_bytes: usize,
    /// Two powers closer than this are considered equal
    pub power_tolerance_db: f64,
    /// NbTrans sent in every LinkADRReq
    pub nb_trans: u8,
}

impl Default for AdrLiteConfig {
    fn default() -> Self {
        Self {
            change_tx_power: true,
            change_coding_rate: false,
            change_channel: false,
            reference_payload_bytes: 20,
            power_tolerance_db: 0.1,
            nb_trans: 1,
        }
    }
}

impl AdrLiteConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reference_payload_bytes == 0 {
            return Err(ConfigError::Invalid("reference_payload_bytes must be > 0"));
        }
        if !(self.power_tolerance_db > 0.0 && self.power_tolerance_db < 1.0) {
            return Err(ConfigError::Invalid(
                "power_tolerance_db must be in (0, 1) dB",
            ));
        }
        if self.nb_trans == 0 || self.nb_trans > 15 {
            return Err(ConfigError::Invalid("nb_trans must be in 1..=15"));
        }
        Ok(())
    }
}

/// Device-side MAC settings shared by every simulated device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndDeviceConfig {
    /// NbTrans before the network changes it
    pub max_transmissions: u8,
    /// Send confirmed uplinks
    pub confirmed: bool,
    /// Participate in network-driven ADR
    pub adr_enabled: bool,
    pub initial_data_rate: u8,
    pub initial_tx_power_dbm: f64,
    /// Wait after the end of an uplink before declaring the ACK missing
    pub ack_timeout_ms: u64,
    pub retx_backoff_min_ms: u64,
    pub retx_backoff_max_ms: u64,
    pub power_source: PowerSource,
}

impl Default for EndDeviceConfig {
    fn default() -> Self {
        Self {
            max_transmissions: 1,
            confirmed: true,
            adr_enabled: true,
            initial_data_rate: 5,
            initial_tx_power_dbm: 14.0,
            ack_timeout_ms: 3000,
            retx_backoff_min_ms: 1000,
            retx_backoff_max_ms: 3000,
            power_source: PowerSource::External,
        }
    }
}

impl EndDeviceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_transmissions == 0 || self.max_transmissions > 15 {
            return Err(ConfigError::Invalid("max_transmissions must be in 1..=15"));
        }
        if self.initial_data_rate > 5 {
            return Err(ConfigError::Invalid(
                "initial_data_rate must be a 125 kHz data rate (0..=5)",
            ));
        }
        if !(0.0..=region::MAX_EIRP_DBM).contains(&self.initial_tx_power_dbm) {
            return Err(ConfigError::Invalid(
                "initial_tx_power_dbm must be in 0..=14 dBm",
            ));
        }
        if self.retx_backoff_max_ms < self.retx_backoff_min_ms {
            return Err(ConfigError::Invalid(
                "retx_backoff_max_ms must be >= retx_backoff_min_ms",
            ));
        }
        if let PowerSource::Battery(level) = self.power_source {
            if !(0.0..=1.0).contains(&level) {
                return Err(ConfigError::Invalid("battery level must be in [0, 1]"));
            }
        }
        Ok(())
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

/// Parameters of the stub propagation model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Each device draws a fixed path loss from this range
    pub min_path_loss_db: f64,
    pub max_path_loss_db: f64,
    /// Per-packet uniform fading in [-shadowing_db, +shadowing_db]
    pub shadowing_db: f64,
    /// Receiver noise floor for 125 kHz
    pub noise_floor_dbm: f64,
    /// Extra random loss applied to downlinks
    pub downlink_loss_probability: f64,
    pub gateway_tx_power_dbm: f64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            min_path_loss_db: 110.0,
            max_path_loss_db: 140.0,
            shadowing_db: 2.0,
            // -174 dBm/Hz + 10 log10(125 kHz) + 6 dB noise figure
            noise_floor_dbm: -117.0,
            downlink_loss_probability: 0.0,
            gateway_tx_power_dbm: 14.0,
        }
    }
}

impl LinkConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_path_loss_db < self.min_path_loss_db {
            return Err(ConfigError::Invalid(
                "max_path_loss_db must be >= min_path_loss_db",
            ));
        }
        if self.shadowing_db < 0.0 {
            return Err(ConfigError::Invalid("shadowing_db must be >= 0"));
        }
        if !(0.0..=1.0).contains(&self.downlink_loss_probability) {
            return Err(ConfigError::Invalid(
                "downlink_loss_probability must be in [0, 1]",
            ));
        }
        Ok(())
    }
}

/// Whole-run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub seed: u64,
    pub devices: usize,
    pub duration_secs: u64,
    /// Mean time between application messages of one device
    pub traffic_interval_secs: u64,
    /// Application payload size
    pub payload_bytes: usize,
    pub adr: AdrLiteConfig,
    pub end_device: EndDeviceConfig,
    pub link: LinkConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            devices: 10,
            duration_secs: 24 * 3600,
            traffic_interval_secs: 600,
            payload_bytes: 10,
            adr: AdrLiteConfig::default(),
            end_device: EndDeviceConfig::default(),
            link: LinkConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.devices == 0 {
            return Err(ConfigError::Invalid("devices must be > 0"));
        }
        if self.duration_secs == 0 {
            return Err(ConfigError::Invalid("duration_secs must be > 0"));
        }
        if self.traffic_interval_secs == 0 {
            return Err(ConfigError::Invalid("traffic_interval_secs must be > 0"));
        }
        // Smallest max MAC payload (DR0) minus FHDR and FPort
        if self.payload_bytes > 51 {
            return Err(ConfigError::Invalid(
                "payload_bytes must fit at DR0 (<= 51)",
            ));
        }
        self.adr.validate()?;
        self.end_device.validate()?;
        self.link.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(SimulationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_adr_defaults() {
        let adr = AdrLiteConfig::default();
        assert!(adr.change_tx_power);
        assert!(!adr.change_coding_rate);
        assert!(!adr.change_channel);
        assert_eq!(adr.reference_payload_bytes, 20);
        assert_eq!(adr.nb_trans, 1);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SimulationConfig::from_json_str(
            r#"{ "seed": 7, "devices": 3, "adr": { "change_tx_power": false } }"#,
        )
        .unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.devices, 3);
        assert!(!config.adr.change_tx_power);
        assert_eq!(config.adr.reference_payload_bytes, 20);
        assert_eq!(config.end_device, EndDeviceConfig::default());
    }

    #[test]
    fn test_power_source_from_json() {
        let config = SimulationConfig::from_json_str(
            r#"{ "end_device": { "power_source": { "battery": 0.5 } } }"#,
        )
        .unwrap();
        assert_eq!(config.end_device.power_source, PowerSource::Battery(0.5));

        let config =
            SimulationConfig::from_json_str(r#"{ "end_device": { "power_source": "unknown" } }"#)
                .unwrap();
        assert_eq!(config.end_device.power_source, PowerSource::Unknown);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = SimulationConfig::default();
        config.end_device.retx_backoff_max_ms = 10;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = SimulationConfig::default();
        config.adr.nb_trans = 0;
        assert!(config.validate().is_err());

        let mut config = SimulationConfig::default();
        config.link.downlink_loss_probability = 1.5;
        assert!(config.validate().is_err());

        let mut config = SimulationConfig::default();
        config.end_device.power_source = PowerSource::Battery(2.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json_is_a_parse_error() {
        let err = SimulationConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let err = SimulationConfig::load("/nonexistent/adr-sim.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
