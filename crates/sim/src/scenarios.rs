//! Scripted runs of a complete tracker over simulated links

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use log::info;

use loratrack_core::{AprsEncoder, BatteryMonitor, Configuration, FixedWeather, Position, PROXIMITY_SLOTS};
use loratrack_radio::framing;
use loratrack_radio::{BridgeProfile, Tracker};

use crate::{ChannelConditions, RandomWalk, SimulatedBattery, SimulatedPhone, SimulatedRadio};

/// Loop period of the simulated tracker
pub const TICK: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
pub struct ScenarioReport {
    pub beacons: usize,
    pub delivered: u64,
    pub dropped: u64,
    pub forwarded_from_phone: usize,
    pub phone_packets: Vec<String>,
    pub nearby: Vec<String>,
    pub shutdown_requested: bool,
}

type SimTracker = Tracker<SimulatedRadio, SimulatedPhone>;

fn build_tracker(config: Arc<Configuration>, conditions: ChannelConditions, seed: u64, now: Instant) -> Result<SimTracker> {
    let battery = SimulatedBattery::new(config.battery.monitor, 4.1, 0.01);
    let tracker = Tracker::new(
        config,
        AprsEncoder,
        SimulatedRadio::new(conditions, seed),
        Some(SimulatedPhone::default()),
        Box::new(battery),
        now,
    )?;
    Ok(tracker)
}

fn report(tracker: &SimTracker, beacons: usize, forwarded_from_phone: usize) -> ScenarioReport {
    let stats = tracker.radio().stats();
    let phone_packets = tracker
        .bridge()
        .map(|b| match b.profile() {
            BridgeProfile::Kiss => b.link().kiss_packets(),
            BridgeProfile::Tnc2 => b.link().text_packets(),
        })
        .unwrap_or_default();
    ScenarioReport {
        beacons,
        delivered: stats.sent,
        dropped: stats.dropped,
        forwarded_from_phone,
        phone_packets,
        nearby: tracker.proximity().describe_all().into_iter().filter(|l| !l.is_empty()).collect(),
        shutdown_requested: tracker.shutdown_requested(),
    }
}

/// A drive with a beacon requested every `beacon_every` ticks, a phone
/// sending a message halfway and six stations heard along the way.
pub async fn drive(config: Configuration, conditions: ChannelConditions, ticks: usize, seed: u64) -> Result<ScenarioReport> {
    let start = Instant::now();
    let config = Arc::new(config);
    let mut tracker = build_tracker(config.clone(), conditions, seed, start)?;
    let mut walk = RandomWalk::new(Position::new(42.2406, -8.7207), 50.0, seed);

    let handle = tracker.bridge_handle();
    if let Some(handle) = &handle {
        handle.on_connect();
    }

    let callsign = config.beacon(0).callsign.clone();
    let beacon_every = 12;
    let mut beacons = 0;
    let mut forwarded = 0;

    for i in 0..ticks {
        let now = start + TICK * i as u32;
        let fix = walk.step(TICK);

        if i % beacon_every == 0 {
            tracker.request_beacon();
        }
        if i == ticks / 2 {
            if let (Some(handle), Some(bridge)) = (&handle, tracker.bridge()) {
                let message = format!("{}>APLRT1,WIDE1-1::EA1AAA-9 :on my way{{7", callsign);
                let bytes = match bridge.profile() {
                    BridgeProfile::Kiss => framing::encode_tnc2(&message)
                        .map(|frame| frame.as_bytes().to_vec())
                        .unwrap_or_default(),
                    BridgeProfile::Tnc2 => format!("{}\n", message).into_bytes(),
                };
                // BLE MTU sized writes
                for chunk in bytes.chunks(20) {
                    handle.on_write(chunk);
                }
            }
        }
        if i % 10 == 5 && i / 10 < 6 {
            let heard = format!("EA1HRD-{}", i / 10);
            let offset = 0.01 * (i / 10 + 1) as f64;
            let position = Position::new(fix.position.lat + offset, fix.position.lon - offset);
            tracker.report_heard(&heard, position, now);
            tracker
                .on_radio_packet(&format!("{}>APLRT1,WIDE1-1:>heard", heard))
                .await;
        }

        let before = tracker.radio().stats().sent + tracker.radio().stats().dropped;
        if tracker.tick(now, Some(fix)).await.is_some() {
            beacons += 1;
        }
        let after = tracker.radio().stats().sent + tracker.radio().stats().dropped;
        forwarded += (after - before) as usize;
    }

    info!("Drive finished: {} beacons over {} ticks", beacons, ticks);
    Ok(report(&tracker, beacons, forwarded.saturating_sub(beacons)))
}

/// A parked weather station: standing updates and periodic weather
/// telemetry on a draining divider battery.
pub async fn parked_weather_station(conditions: ChannelConditions, minutes: u64, seed: u64) -> Result<ScenarioReport> {
    let mut config = Configuration::default();
    config.wx.active = true;
    config.wx.send_telemetry = true;
    config.standing_update_time = 5;
    config.battery.monitor = BatteryMonitor::VoltageDivider;
    config.battery.send_voltage = true;
    config.battery.voltage_as_telemetry = true;

    let start = Instant::now();
    let mut tracker = build_tracker(Arc::new(config), conditions, seed, start)?
        .with_weather(Box::new(FixedWeather::new(".../...g...t064h71b10142")));
    let mut walk = RandomWalk::new(Position::new(40.4168, -3.7038), 0.0, seed);
    walk.stop();

    let ticks = minutes * 60 / TICK.as_secs();
    let mut beacons = 0;
    for i in 0..ticks {
        let now = start + TICK * i as u32;
        if tracker.tick(now, Some(walk.fix())).await.is_some() {
            beacons += 1;
        }
        if tracker.shutdown_requested() {
            break;
        }
    }
    Ok(report(&tracker, beacons, 0))
}

/// Nearby table capacity for display purposes
pub fn nearby_capacity() -> usize {
    PROXIMITY_SLOTS
}
