//! Battery readings and the text they contribute to beacons

use crate::config::BatteryMonitor;

/// Below this a voltage-divider battery asks for shutdown after a beacon
pub const SHUTDOWN_VOLTAGE: f32 = 3.0;

const EMPTY_VOLTAGE: f32 = 3.0;
const FULL_VOLTAGE: f32 = 4.2;

/// Telemetry sequence numbers wrap at the two-digit base91 limit
pub const TELEMETRY_SEQ_MODULO: u16 = 8281;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BatteryReading {
    None,
    VoltageDivider { volts: f32 },
    /// PMIC that reports charge current in mA
    SmartPmicA { volts: f32, charge_ma: f32 },
    /// PMIC that reports state of charge in percent
    SmartPmicB { volts: f32, percent: u8 },
}

impl BatteryReading {
    pub fn volts(&self) -> Option<f32> {
        match *self {
            BatteryReading::None => None,
            BatteryReading::VoltageDivider { volts }
            | BatteryReading::SmartPmicA { volts, .. }
            | BatteryReading::SmartPmicB { volts, .. } => Some(volts),
        }
    }

    pub fn comment_suffix(&self) -> Option<String> {
        match *self {
            BatteryReading::None => None,
            BatteryReading::VoltageDivider { volts } => Some(format!(
                " Bat={:.2}V{}%",
                volts,
                percent_from_voltage(volts)
            )),
            BatteryReading::SmartPmicA { volts, charge_ma } => {
                Some(format!(" Bat={:.2}V ({:.0}mA)", volts, charge_ma))
            }
            BatteryReading::SmartPmicB { volts, percent } => {
                Some(format!(" Bat={:.2}V ({}%)", volts, percent))
            }
        }
    }

    /// Only plain voltage dividers have no PMIC protecting the cell
    pub fn requests_shutdown(&self) -> bool {
        matches!(*self, BatteryReading::VoltageDivider { volts } if volts < SHUTDOWN_VOLTAGE)
    }
}

pub trait BatteryInfoSource: Send {
    fn monitor(&self) -> BatteryMonitor;
    fn read(&mut self) -> BatteryReading;
}

/// Source that always reports the same reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedBattery {
    pub reading: BatteryReading,
}

impl FixedBattery {
    pub fn new(reading: BatteryReading) -> Self {
        Self { reading }
    }

    pub fn none() -> Self {
        Self::new(BatteryReading::None)
    }
}

impl BatteryInfoSource for FixedBattery {
    fn monitor(&self) -> BatteryMonitor {
        match self.reading {
            BatteryReading::None => BatteryMonitor::None,
            BatteryReading::VoltageDivider { .. } => BatteryMonitor::VoltageDivider,
            BatteryReading::SmartPmicA { .. } => BatteryMonitor::Axp192,
            BatteryReading::SmartPmicB { .. } => BatteryMonitor::Axp2101,
        }
    }

    fn read(&mut self) -> BatteryReading {
        self.reading
    }
}

pub fn percent_from_voltage(volts: f32) -> u8 {
    let fraction = (volts - EMPTY_VOLTAGE) / (FULL_VOLTAGE - EMPTY_VOLTAGE);
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u8
}

fn base91_pair(value: u16) -> [char; 2] {
    let value = value % TELEMETRY_SEQ_MODULO;
    [
        char::from(33 + (value / 91) as u8),
        char::from(33 + (value % 91) as u8),
    ]
}

/// Compressed comment telemetry `|ssvv|` carrying the voltage in 10 mV steps
pub fn encode_voltage_telemetry(sequence: u16, volts: f32) -> String {
    let raw = (volts.max(0.0) * 100.0).round() as u16;
    let mut out = String::with_capacity(6);
    out.push('|');
    out.extend(base91_pair(sequence));
    out.extend(base91_pair(raw));
    out.push('|');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_per_variant() {
        assert_eq!(BatteryReading::None.comment_suffix(), None);
        assert_eq!(
            BatteryReading::VoltageDivider { volts: 3.6 }.comment_suffix().as_deref(),
            Some(" Bat=3.60V50%")
        );
        assert_eq!(
            BatteryReading::SmartPmicA { volts: 4.1, charge_ma: 120.4 }.comment_suffix().as_deref(),
            Some(" Bat=4.10V (120mA)")
        );
        assert_eq!(
            BatteryReading::SmartPmicB { volts: 3.95, percent: 80 }.comment_suffix().as_deref(),
            Some(" Bat=3.95V (80%)")
        );
    }

    #[test]
    fn test_divider_comment_has_no_separator() {
        let comment = BatteryReading::VoltageDivider { volts: 4.2 }.comment_suffix();
        assert_eq!(comment.as_deref(), Some(" Bat=4.20V100%"));
    }

    #[test]
    fn test_shutdown_only_for_divider() {
        assert!(BatteryReading::VoltageDivider { volts: 2.9 }.requests_shutdown());
        assert!(!BatteryReading::VoltageDivider { volts: 3.1 }.requests_shutdown());
        assert!(!BatteryReading::SmartPmicB { volts: 2.5, percent: 0 }.requests_shutdown());
    }

    #[test]
    fn test_percent_clamped() {
        assert_eq!(percent_from_voltage(2.5), 0);
        assert_eq!(percent_from_voltage(4.2), 100);
        assert_eq!(percent_from_voltage(5.0), 100);
    }

    #[test]
    fn test_encoded_telemetry() {
        // 4.12 V -> 412 = 4 * 91 + 48
        assert_eq!(encode_voltage_telemetry(0, 4.12), "|!!%Q|");
        assert_eq!(encode_voltage_telemetry(92, 0.0), "|\"\"!!|");
    }
}
