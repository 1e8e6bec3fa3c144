use std::path::Path;
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub beacons: Vec<BeaconProfile>,
    pub lora_profiles: Vec<LoraProfile>,
    pub path: String,
    pub send_altitude: bool,
    pub send_comment_after_x_beacons: u8,
    /// minutes a heard station stays in the proximity table
    pub remember_station_time: u64,
    /// minutes without movement before a standing update is sent
    pub standing_update_time: u64,
    pub accept_own_frame_from_tnc: bool,
    pub battery: BatteryConfig,
    pub wx: WxConfig,
    pub bluetooth: BluetoothConfig,
}

/// One selectable station identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconProfile {
    pub callsign: String,
    pub symbol: String,
    pub overlay: String,
    /// three-bit Mic-E message code ("111" = off duty); empty disables Mic-E
    pub mic_e: String,
    pub comment: String,
    pub smart_beacon_active: bool,
    pub gps_eco_mode: bool,
}

impl BeaconProfile {
    pub fn mic_e_active(&self) -> bool {
        !self.mic_e.is_empty()
    }
}

impl Default for BeaconProfile {
    fn default() -> Self {
        Self {
            callsign: "NOCALL-7".to_string(),
            symbol: "[".to_string(),
            overlay: "/".to_string(),
            mic_e: String::new(),
            comment: String::new(),
            smart_beacon_active: true,
            gps_eco_mode: false,
        }
    }
}

/// Frequency profile selectable by index; the modem applies it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraProfile {
    pub frequency_hz: u32,
    pub spreading_factor: u8,
    pub coding_rate4: u8,
    pub signal_bandwidth_hz: u32,
    pub power_dbm: i8,
}

impl Default for LoraProfile {
    fn default() -> Self {
        Self {
            frequency_hz: 433_775_000,
            spreading_factor: 12,
            coding_rate4: 5,
            signal_bandwidth_hz: 125_000,
            power_dbm: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryMonitor {
    #[default]
    None,
    VoltageDivider,
    /// PMIC reporting charge current
    Axp192,
    /// PMIC reporting charge percentage
    Axp2101,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryConfig {
    pub monitor: BatteryMonitor,
    pub send_voltage: bool,
    pub voltage_as_telemetry: bool,
    pub send_voltage_always: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WxConfig {
    pub active: bool,
    pub send_telemetry: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    pub active: bool,
    /// companion app compatibility profile: 0 = KISS, 2 = TNC2 text
    pub profile: u8,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            active: true,
            profile: 0,
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            beacons: vec![BeaconProfile::default()],
            lora_profiles: vec![LoraProfile::default()],
            path: "WIDE1-1".to_string(),
            send_altitude: true,
            send_comment_after_x_beacons: 10,
            remember_station_time: 30,
            standing_update_time: 15,
            accept_own_frame_from_tnc: false,
            battery: BatteryConfig::default(),
            wx: WxConfig::default(),
            bluetooth: BluetoothConfig::default(),
        }
    }
}

impl Configuration {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Configuration = toml::de::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        info!(
            "Configuration loaded: {} beacons, {} LoRa profiles",
            config.beacons.len(),
            config.lora_profiles.len()
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.beacons.is_empty() {
            return Err(ConfigError::Invalid("at least one beacon is required".into()));
        }
        if let Some(b) = self.beacons.iter().find(|b| b.callsign.is_empty()) {
            return Err(ConfigError::Invalid(format!("beacon with empty callsign ({:?})", b.comment)));
        }
        if self.lora_profiles.is_empty() {
            return Err(ConfigError::Invalid("at least one LoRa profile is required".into()));
        }
        if self.send_comment_after_x_beacons == 0 {
            return Err(ConfigError::Invalid("send_comment_after_x_beacons must be at least 1".into()));
        }
        Ok(())
    }

    /// Beacon at `index`, falling back to the first when out of range.
    /// Panics on an empty list, which [`Configuration::validate`] rejects.
    pub fn beacon(&self, index: usize) -> &BeaconProfile {
        self.beacons.get(index).unwrap_or(&self.beacons[0])
    }

    pub fn lora_profile(&self, index: usize) -> &LoraProfile {
        self.lora_profiles.get(index).unwrap_or(&self.lora_profiles[0])
    }

    pub fn remember_station_window(&self) -> Duration {
        Duration::from_secs(self.remember_station_time * 60)
    }

    pub fn standing_update_interval(&self) -> Duration {
        Duration::from_secs(self.standing_update_time * 60)
    }
}
