//! core data types and station bookkeeping for LoRaTrack

use thiserror::Error;

pub mod aprs;
pub mod battery;
pub mod config;
pub mod persist;
pub mod proximity;
pub mod slots;
pub mod types;
pub mod weather;

pub use aprs::{AprsEncoder, MicEReport, PacketEncoder, PositionReport, ReportKind};
pub use battery::{BatteryInfoSource, BatteryReading, FixedBattery};
pub use config::{BatteryMonitor, BeaconProfile, Configuration, LoraProfile};
pub use persist::{IndexKind, IndexStore};
pub use proximity::{ProximityEntry, ProximityTable, PROXIMITY_SLOTS};
pub use slots::BoundedSlots;
pub use types::{GpsFix, Position, TOCALL};
pub use weather::{FixedWeather, WeatherSensor};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("index storage unavailable: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed index line {0:?}")]
    Malformed(String),
}
