//! Beacon scheduler: when to transmit and what goes into the packet

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::time::sleep;

use loratrack_core::aprs::{self, MicEReport, PacketEncoder, PositionReport, ReportKind};
use loratrack_core::battery::{encode_voltage_telemetry, BatteryInfoSource, BatteryReading, TELEMETRY_SEQ_MODULO};
use loratrack_core::weather::{WeatherSensor, WX_PLACEHOLDER};
use loratrack_core::{AprsEncoder, BeaconProfile, ConfigError, Configuration, GpsFix, Position, TOCALL};

use crate::bridge::TransportBridge;
use crate::display::DisplaySink;
use crate::link::{PhoneLink, RadioLink};

pub const TELEMETRY_PREAMBLE_PAUSE: Duration = Duration::from_secs(3);
pub const TELEMETRY_INTERVAL: Duration = Duration::from_secs(10 * 60);
pub const TELEMETRY_QUIET_PERIOD: Duration = Duration::from_secs(10);

/// Above either limit the tracker is assumed airborne and the path is dropped
pub const AIRBORNE_SPEED_KMH: f64 = 200.0;
pub const AIRBORNE_ALTITUDE_M: f64 = 9000.0;

pub const FORCED_COMMENT: &str = " winlink";

// first beacon after boot always carries the comment
const COMMENT_COUNTER_PRIMED: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeaconKind {
    Position,
    Weather,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SmartBeaconBaseline {
    pub last_tx_position: Option<Position>,
    pub previous_heading: f64,
    pub distance_since_tx_km: f64,
}

#[derive(Debug, Clone)]
pub struct BeaconState {
    pub booted: Instant,
    pub last_tx: Option<Instant>,
    pub last_tx_position: Option<Position>,
    pub comment_counter: u8,
    pub telemetry_preamble_pending: bool,
    pub last_telemetry_tx: Option<Instant>,
    pub telemetry_sequence: u16,
    /// a beacon is due
    pub send_update: bool,
    /// the pending or last update was triggered by standing still
    pub standing_update: bool,
    pub forced_comment: bool,
    pub smart_beacon: SmartBeaconBaseline,
}

impl BeaconState {
    pub fn new(now: Instant) -> Self {
        Self {
            booted: now,
            last_tx: None,
            last_tx_position: None,
            comment_counter: COMMENT_COUNTER_PRIMED,
            telemetry_preamble_pending: true,
            last_telemetry_tx: None,
            telemetry_sequence: 0,
            send_update: false,
            standing_update: false,
            forced_comment: false,
            smart_beacon: SmartBeaconBaseline::default(),
        }
    }
}

/// Inputs sampled for one beacon
pub struct BeaconContext<'a> {
    pub fix: &'a GpsFix,
    pub battery: &'a mut dyn BatteryInfoSource,
    pub weather: Option<&'a mut dyn WeatherSensor>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BeaconOutcome {
    pub packet: String,
    pub battery: BatteryReading,
    pub gps_should_sleep: bool,
    pub shutdown_requested: bool,
}

pub struct BeaconScheduler<E = AprsEncoder> {
    config: Arc<Configuration>,
    encoder: E,
    beacon_index: usize,
    state: BeaconState,
}

impl<E: PacketEncoder> BeaconScheduler<E> {
    /// Fails on a configuration without beacons or LoRa profiles.
    pub fn new(config: Arc<Configuration>, encoder: E, now: Instant) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            encoder,
            beacon_index: 0,
            state: BeaconState::new(now),
        })
    }

    pub fn state(&self) -> &BeaconState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut BeaconState {
        &mut self.state
    }

    pub fn beacon(&self) -> &BeaconProfile {
        self.config.beacon(self.beacon_index)
    }

    pub fn beacon_index(&self) -> usize {
        self.beacon_index
    }

    pub fn select_beacon(&mut self, index: usize) {
        self.beacon_index = index.min(self.config.beacons.len().saturating_sub(1));
        info!("Active beacon: {}", self.beacon().callsign);
    }

    /// Forces the comment onto every beacon while set
    pub fn set_forced_comment(&mut self, on: bool) {
        self.state.forced_comment = on;
    }

    /// A beacon triggered by movement (smart beaconing, user request)
    pub fn request_update(&mut self) {
        self.state.send_update = true;
        self.state.standing_update = false;
    }

    /// Distance travelled since the last beacon, for smart beaconing
    pub fn record_fix(&mut self, fix: &GpsFix) {
        let baseline = &mut self.state.smart_beacon;
        if let Some(from) = baseline.last_tx_position {
            baseline.distance_since_tx_km = from.distance_km(&fix.position);
        }
    }

    /// Schedules a standing update once the tracker has been quiet for the
    /// configured interval. Returns whether one was scheduled, in which case
    /// the GPS has to be awake.
    pub fn check_standing_update(&mut self, now: Instant) -> bool {
        let last = self.state.last_tx.unwrap_or(self.state.booted);
        if !self.state.send_update
            && now.saturating_duration_since(last) >= self.config.standing_update_interval()
        {
            debug!("Standing update due");
            self.state.send_update = true;
            self.state.standing_update = true;
            return true;
        }
        false
    }

    fn telemetry_header(&self) -> String {
        let callsign = &self.beacon().callsign;
        format!(
            "{}::{:<9}:",
            aprs::header(callsign, TOCALL, &self.config.path),
            callsign
        )
    }

    /// Telemetry definitions, sent once per session ahead of the first
    /// beacon carrying voltage telemetry.
    pub async fn maybe_send_telemetry_preamble<R: RadioLink + ?Sized>(&mut self, radio: &mut R) {
        let battery = &self.config.battery;
        if !(self.state.telemetry_preamble_pending && battery.send_voltage && battery.voltage_as_telemetry) {
            return;
        }

        let base = self.telemetry_header();
        for definition in ["EQNS.0,0.01,0", "UNIT.VDC", "PARM.V_Batt"] {
            let packet = format!("{}{}", base, definition);
            if let Err(e) = radio.send_packet(&packet).await {
                warn!("Telemetry definition not sent: {}", e);
            }
            sleep(TELEMETRY_PREAMBLE_PAUSE).await;
        }
        self.state.telemetry_preamble_pending = false;
    }

    fn position_packet(&self, kind: BeaconKind, ctx: &mut BeaconContext<'_>) -> String {
        let beacon = self.beacon();
        let fix = ctx.fix;

        if kind == BeaconKind::Weather && self.config.wx.send_telemetry {
            if let Some(sensor) = ctx.weather.as_deref_mut() {
                let report = PositionReport {
                    position: fix.position,
                    course_deg: fix.course_deg,
                    speed_knots: 0.0,
                    symbol: &beacon.symbol,
                    send_altitude: self.config.send_altitude,
                    altitude_ft: fix.altitude_ft(),
                    standing_update: self.state.standing_update,
                    kind: ReportKind::Wx,
                };
                let encoded = self.encoder.encode_position(&report);
                let mut packet =
                    self.encoder
                        .position_packet(&beacon.callsign, TOCALL, &self.config.path, "/", &encoded);
                match sensor.read_fields() {
                    Some(fields) => packet.push_str(&fields),
                    None => packet.push_str(WX_PLACEHOLDER),
                }
                return packet;
            }
        }

        let path = if fix.speed_kmh > AIRBORNE_SPEED_KMH || fix.altitude_m > AIRBORNE_ALTITUDE_M {
            ""
        } else {
            self.config.path.as_str()
        };

        if beacon.mic_e_active() {
            self.encoder.mic_e_packet(&MicEReport {
                message: &beacon.mic_e,
                callsign: &beacon.callsign,
                symbol: &beacon.symbol,
                overlay: &beacon.overlay,
                path,
                position: fix.position,
                course_deg: fix.course_deg,
                speed_knots: fix.speed_knots(),
                altitude_m: fix.altitude_m,
            })
        } else {
            let report = PositionReport {
                position: fix.position,
                course_deg: fix.course_deg,
                speed_knots: fix.speed_knots(),
                symbol: &beacon.symbol,
                send_altitude: self.config.send_altitude,
                altitude_ft: fix.altitude_ft(),
                standing_update: self.state.standing_update,
                kind: ReportKind::Gps,
            };
            let encoded = self.encoder.encode_position(&report);
            self.encoder
                .position_packet(&beacon.callsign, TOCALL, path, &beacon.overlay, &encoded)
        }
    }

    /// Appends comment and voltage telemetry when the duty cycle allows.
    fn append_comment(&mut self, packet: &mut String, reading: &BatteryReading) {
        let battery = &self.config.battery;
        let (mut comment, threshold) = if self.state.forced_comment || battery.send_voltage_always {
            let comment = if self.state.forced_comment {
                FORCED_COMMENT.to_string()
            } else {
                String::new()
            };
            (comment, 1)
        } else {
            (
                self.beacon().comment.clone(),
                self.config.send_comment_after_x_beacons,
            )
        };

        let voltage_telemetry = battery.send_voltage && battery.voltage_as_telemetry;
        if battery.send_voltage && !battery.voltage_as_telemetry {
            if let Some(text) = reading.comment_suffix() {
                comment.push_str(&text);
            }
        }

        if comment.is_empty() && !voltage_telemetry {
            return;
        }

        self.state.comment_counter = self.state.comment_counter.saturating_add(1);
        if self.state.comment_counter >= threshold {
            packet.push_str(&comment);
            if voltage_telemetry {
                if let Some(volts) = reading.volts() {
                    packet.push_str(&encode_voltage_telemetry(self.state.telemetry_sequence, volts));
                    self.state.telemetry_sequence = (self.state.telemetry_sequence + 1) % TELEMETRY_SEQ_MODULO;
                }
            }
            self.state.comment_counter = 0;
        }
    }

    /// Assembles the packet for `kind` without sending it
    pub fn build_packet(&mut self, kind: BeaconKind, ctx: &mut BeaconContext<'_>) -> (String, BatteryReading) {
        let reading = ctx.battery.read();
        let mut packet = self.position_packet(kind, ctx);
        self.append_comment(&mut packet, &reading);
        (packet, reading)
    }

    /// Builds a beacon, transmits it on the radio and mirrors it to the
    /// phone when a bridge is given.
    pub async fn build_and_send<R, P>(
        &mut self,
        kind: BeaconKind,
        mut ctx: BeaconContext<'_>,
        now: Instant,
        radio: &mut R,
        bridge: Option<&mut TransportBridge<P>>,
        display: &mut dyn DisplaySink,
    ) -> BeaconOutcome
    where
        R: RadioLink + ?Sized,
        P: PhoneLink,
    {
        self.maybe_send_telemetry_preamble(radio).await;

        let (packet, reading) = self.build_packet(kind, &mut ctx);

        display.show("<<< TX >>>", &packet);
        if let Err(e) = radio.send_packet(&packet).await {
            warn!("Beacon not sent: {}", e);
        }
        if let Some(bridge) = bridge {
            bridge.send_to_phone(&packet, display).await;
        }

        let fix = ctx.fix;
        if self.beacon().smart_beacon_active {
            self.state.smart_beacon = SmartBeaconBaseline {
                last_tx_position: Some(fix.position),
                previous_heading: fix.course_deg,
                distance_since_tx_km: 0.0,
            };
        }
        self.state.last_tx = Some(now);
        self.state.last_tx_position = Some(fix.position);
        self.state.send_update = false;

        let outcome = BeaconOutcome {
            packet,
            battery: reading,
            gps_should_sleep: self.beacon().gps_eco_mode,
            shutdown_requested: reading.requests_shutdown(),
        };
        if outcome.shutdown_requested {
            warn!("Battery below shutdown voltage: {:?}", reading.volts());
        }
        outcome
    }

    /// Weather telemetry while standing still: at most every
    /// [`TELEMETRY_INTERVAL`] and never right after another beacon.
    pub async fn maybe_send_periodic_telemetry<R, P>(
        &mut self,
        ctx: BeaconContext<'_>,
        now: Instant,
        radio: &mut R,
        bridge: Option<&mut TransportBridge<P>>,
        display: &mut dyn DisplaySink,
    ) -> Option<BeaconOutcome>
    where
        R: RadioLink + ?Sized,
        P: PhoneLink,
    {
        let wx = &self.config.wx;
        if !(wx.active && wx.send_telemetry && self.state.standing_update) {
            return None;
        }

        let since_tx = now.saturating_duration_since(self.state.last_tx?);
        let telemetry_due = self
            .state
            .last_telemetry_tx
            .map_or(true, |t| now.saturating_duration_since(t) > TELEMETRY_INTERVAL);

        if telemetry_due && since_tx > TELEMETRY_QUIET_PERIOD {
            let outcome = self
                .build_and_send(BeaconKind::Weather, ctx, now, radio, bridge, display)
                .await;
            self.state.last_telemetry_tx = Some(now);
            Some(outcome)
        } else {
            None
        }
    }
}
