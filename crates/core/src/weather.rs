/// Fields sent when the sensor type is unknown
pub const WX_PLACEHOLDER: &str = ".../...g...t...";

/// Environmental sensor feeding weather beacons
pub trait WeatherSensor: Send {
    /// APRS weather fields (`.../...g...t...` style). `None` when the
    /// module answered but its type could not be identified.
    fn read_fields(&mut self) -> Option<String>;
}

/// Sensor returning canned readings
#[derive(Debug, Clone, Default)]
pub struct FixedWeather {
    pub fields: Option<String>,
}

impl FixedWeather {
    pub fn new(fields: impl Into<String>) -> Self {
        Self {
            fields: Some(fields.into()),
        }
    }

    pub fn unidentified() -> Self {
        Self { fields: None }
    }
}

impl WeatherSensor for FixedWeather {
    fn read_fields(&mut self) -> Option<String> {
        self.fields.clone()
    }
}
