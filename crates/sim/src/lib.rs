//! simulation tools for LoRaTrack

pub mod scenarios;

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::sleep;

use loratrack_core::{BatteryInfoSource, BatteryMonitor, BatteryReading, GpsFix, Position};
use loratrack_radio::framing::Tnc2Decoder;
use loratrack_radio::{FrameCollector, LinkError, PhoneLink, RadioError, RadioLink};

const KM_PER_DEGREE: f64 = 111.32;

#[derive(Debug, Clone)]
pub struct ChannelConditions {
    pub bitrate_bps: u32,
    pub packet_loss: f32,
    pub max_packet_len: usize,
    pub latency: Duration,
}

impl Default for ChannelConditions {
    fn default() -> Self {
        SimulationPresets::long_range()
    }
}

pub struct SimulationPresets;

impl SimulationPresets {
    /// SF7 / 125 kHz
    pub fn short_range() -> ChannelConditions {
        ChannelConditions {
            bitrate_bps: 5470,
            packet_loss: 0.02,
            max_packet_len: 255,
            latency: Duration::from_millis(20),
        }
    }

    /// SF12 / 125 kHz, the usual APRS setting
    pub fn long_range() -> ChannelConditions {
        ChannelConditions {
            bitrate_bps: 293,
            packet_loss: 0.10,
            max_packet_len: 255,
            latency: Duration::from_millis(50),
        }
    }

    pub fn congested() -> ChannelConditions {
        ChannelConditions {
            bitrate_bps: 293,
            packet_loss: 0.35,
            max_packet_len: 255,
            latency: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RadioStats {
    pub sent: u64,
    pub dropped: u64,
    pub bytes: u64,
}

/// Radio that spends airtime and loses packets at random
pub struct SimulatedRadio {
    conditions: ChannelConditions,
    rng: StdRng,
    stats: RadioStats,
    /// packets that made it onto the air
    pub delivered: Vec<String>,
}

impl SimulatedRadio {
    pub fn new(conditions: ChannelConditions, seed: u64) -> Self {
        Self {
            conditions,
            rng: StdRng::seed_from_u64(seed),
            stats: RadioStats::default(),
            delivered: Vec::new(),
        }
    }

    pub fn stats(&self) -> RadioStats {
        self.stats
    }

    pub fn airtime(&self, len: usize) -> Duration {
        Duration::from_secs_f64((len * 8) as f64 / self.conditions.bitrate_bps as f64)
    }
}

#[async_trait]
impl RadioLink for SimulatedRadio {
    async fn send_packet(&mut self, packet: &str) -> Result<(), RadioError> {
        if packet.len() > self.conditions.max_packet_len {
            return Err(RadioError::PacketTooLarge(packet.len()));
        }

        trace!("Simulating LoRa transmission of {} bytes", packet.len());
        sleep(self.airtime(packet.len())).await;
        sleep(self.conditions.latency).await;

        if self.rng.random::<f32>() < self.conditions.packet_loss {
            self.stats.dropped += 1;
            debug!("Simulated packet loss");
            return Err(RadioError::TransmissionFailed);
        }

        self.stats.sent += 1;
        self.stats.bytes += packet.len() as u64;
        self.delivered.push(packet.to_string());
        Ok(())
    }
}

/// Phone end of the BLE link, recording everything notified to it
#[derive(Debug, Default)]
pub struct SimulatedPhone {
    pub notified: Vec<u8>,
    pub notifications: usize,
    pub advertising_started: usize,
}

impl SimulatedPhone {
    /// Packets received so far when the bridge speaks KISS
    pub fn kiss_packets(&self) -> Vec<String> {
        FrameCollector::new()
            .push_slice(&self.notified, &Tnc2Decoder)
            .into_iter()
            .map(|(_, packet)| packet)
            .collect()
    }

    /// Packets received so far when the bridge speaks TNC2 text
    pub fn text_packets(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.notified)
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[async_trait]
impl PhoneLink for SimulatedPhone {
    async fn notify(&mut self, data: &[u8]) -> Result<(), LinkError> {
        self.notified.extend_from_slice(data);
        self.notifications += 1;
        Ok(())
    }

    fn start_advertising(&mut self) -> Result<(), LinkError> {
        self.advertising_started += 1;
        Ok(())
    }
}

/// Battery discharging a fixed step per reading
#[derive(Debug, Clone)]
pub struct SimulatedBattery {
    monitor: BatteryMonitor,
    volts: f32,
    drain_per_read: f32,
}

impl SimulatedBattery {
    pub fn new(monitor: BatteryMonitor, volts: f32, drain_per_read: f32) -> Self {
        Self {
            monitor,
            volts,
            drain_per_read,
        }
    }
}

impl BatteryInfoSource for SimulatedBattery {
    fn monitor(&self) -> BatteryMonitor {
        self.monitor
    }

    fn read(&mut self) -> BatteryReading {
        let volts = self.volts;
        self.volts = (self.volts - self.drain_per_read).max(0.0);
        match self.monitor {
            BatteryMonitor::None => BatteryReading::None,
            BatteryMonitor::VoltageDivider => BatteryReading::VoltageDivider { volts },
            BatteryMonitor::Axp192 => BatteryReading::SmartPmicA {
                volts,
                charge_ma: 0.0,
            },
            BatteryMonitor::Axp2101 => BatteryReading::SmartPmicB {
                volts,
                percent: loratrack_core::battery::percent_from_voltage(volts),
            },
        }
    }
}

/// Vehicle wandering around a start point
pub struct RandomWalk {
    rng: StdRng,
    fix: GpsFix,
}

impl RandomWalk {
    pub fn new(start: Position, speed_kmh: f64, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            fix: GpsFix {
                position: start,
                course_deg: 0.0,
                speed_kmh,
                altitude_m: 100.0,
            },
        }
    }

    pub fn fix(&self) -> GpsFix {
        self.fix
    }

    pub fn stop(&mut self) {
        self.fix.speed_kmh = 0.0;
    }

    /// Advances by `dt` with a random heading change
    pub fn step(&mut self, dt: Duration) -> GpsFix {
        let turn: f64 = self.rng.random_range(-30.0..30.0);
        self.fix.course_deg = (self.fix.course_deg + turn).rem_euclid(360.0);

        let km = self.fix.speed_kmh * dt.as_secs_f64() / 3600.0;
        let heading = self.fix.course_deg.to_radians();
        let lat = self.fix.position.lat + km * heading.cos() / KM_PER_DEGREE;
        let lon = self.fix.position.lon
            + km * heading.sin() / (KM_PER_DEGREE * self.fix.position.lat.to_radians().cos());
        self.fix.position = Position::new(lat, lon);
        self.fix
    }
}
