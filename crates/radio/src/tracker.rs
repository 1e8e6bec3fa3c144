//! The tracker tick loop tying radio, phone bridge, proximity table and
//! beacon scheduler together.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info, warn};

use loratrack_core::{
    AprsEncoder, BatteryInfoSource, ConfigError, Configuration, GpsFix, IndexKind, IndexStore, LoraProfile,
    PacketEncoder, Position, ProximityTable, WeatherSensor,
};

use crate::bridge::{BridgeHandle, TransportBridge};
use crate::display::{DisplaySink, LogDisplay};
use crate::link::{PhoneLink, RadioLink};
use crate::scheduler::{BeaconContext, BeaconKind, BeaconOutcome, BeaconScheduler};

pub struct Tracker<R, P, E = AprsEncoder> {
    config: Arc<Configuration>,
    radio: R,
    bridge: Option<TransportBridge<P>>,
    display: Box<dyn DisplaySink>,
    battery: Box<dyn BatteryInfoSource>,
    weather: Option<Box<dyn WeatherSensor>>,
    store: Option<IndexStore>,
    proximity: ProximityTable,
    scheduler: BeaconScheduler<E>,
    lora_index: usize,
    last_fix: Option<GpsFix>,
    gps_asleep: bool,
    shutdown_requested: bool,
}

impl<R: RadioLink, P: PhoneLink, E: PacketEncoder> Tracker<R, P, E> {
    /// Without a phone link, or with bluetooth disabled, the tracker runs
    /// radio-only.
    pub fn new(
        config: Arc<Configuration>,
        encoder: E,
        radio: R,
        phone: Option<P>,
        battery: Box<dyn BatteryInfoSource>,
        now: Instant,
    ) -> Result<Self, ConfigError> {
        let scheduler = BeaconScheduler::new(config.clone(), encoder, now)?;
        let callsign = scheduler.beacon().callsign.clone();

        let bridge = match phone {
            Some(link) if config.bluetooth.active => match TransportBridge::setup(&config, &callsign, link) {
                Ok(bridge) => Some(bridge),
                Err(e) => {
                    warn!("Running without phone bridge: {}", e);
                    None
                }
            },
            _ => None,
        };

        info!("Tracker {} started, battery monitor {:?}", callsign, battery.monitor());

        Ok(Self {
            proximity: ProximityTable::new(config.remember_station_window(), now),
            config,
            radio,
            bridge,
            display: Box::new(LogDisplay),
            battery,
            weather: None,
            store: None,
            scheduler,
            lora_index: 0,
            last_fix: None,
            gps_asleep: false,
            shutdown_requested: false,
        })
    }

    pub fn with_display(mut self, display: Box<dyn DisplaySink>) -> Self {
        self.display = display;
        self
    }

    pub fn with_weather(mut self, sensor: Box<dyn WeatherSensor>) -> Self {
        self.weather = Some(sensor);
        self
    }

    /// Restores the persisted beacon and LoRa profile indices. Missing or
    /// unreadable files keep the defaults.
    pub fn with_store(mut self, store: IndexStore) -> Self {
        match store.load(IndexKind::Callsign) {
            Ok(Some(index)) => self.apply_beacon(index as usize),
            Ok(None) => {}
            Err(e) => warn!("Callsign index not restored: {}", e),
        }
        match store.load(IndexKind::Frequency) {
            Ok(Some(index)) => self.lora_index = (index as usize).min(self.config.lora_profiles.len().saturating_sub(1)),
            Ok(None) => {}
            Err(e) => warn!("Frequency index not restored: {}", e),
        }
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn bridge(&self) -> Option<&TransportBridge<P>> {
        self.bridge.as_ref()
    }

    /// Handle for the BLE stack callbacks
    pub fn bridge_handle(&self) -> Option<BridgeHandle> {
        self.bridge.as_ref().map(|b| b.handle())
    }

    pub fn proximity(&self) -> &ProximityTable {
        &self.proximity
    }

    pub fn scheduler(&self) -> &BeaconScheduler<E> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut BeaconScheduler<E> {
        &mut self.scheduler
    }

    pub fn lora_profile(&self) -> &LoraProfile {
        self.config.lora_profile(self.lora_index)
    }

    pub fn last_fix(&self) -> Option<&GpsFix> {
        self.last_fix.as_ref()
    }

    pub fn is_gps_asleep(&self) -> bool {
        self.gps_asleep
    }

    /// Set once a beacon found the battery below its shutdown voltage
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    /// Manual beacon request
    pub fn request_beacon(&mut self) {
        self.scheduler.request_update();
    }

    fn apply_beacon(&mut self, index: usize) {
        self.scheduler.select_beacon(index);
        let callsign = self.scheduler.beacon().callsign.clone();
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.set_callsign(&callsign);
        }
    }

    fn persist(&self, kind: IndexKind, index: usize) {
        let Some(store) = &self.store else {
            return;
        };
        let Ok(index) = u8::try_from(index) else {
            warn!("Index {} too large to persist", index);
            return;
        };
        if let Err(e) = store.save(kind, index) {
            warn!("Failed to persist {:?}: {}", kind, e);
        }
    }

    /// Switches the station identity and persists the choice
    pub fn select_beacon(&mut self, index: usize) {
        self.apply_beacon(index);
        let index = self.scheduler.beacon_index();
        self.persist(IndexKind::Callsign, index);
        self.display.show("CALLSIGN", &self.scheduler.beacon().callsign);
    }

    pub fn select_lora_profile(&mut self, index: usize) -> &LoraProfile {
        self.lora_index = index.min(self.config.lora_profiles.len().saturating_sub(1));
        self.persist(IndexKind::Frequency, self.lora_index);
        let profile = self.config.lora_profile(self.lora_index);
        info!(
            "LoRa profile {}: {} Hz SF{} CR4/{}",
            self.lora_index, profile.frequency_hz, profile.spreading_factor, profile.coding_rate4
        );
        profile
    }

    /// Records a station heard on the radio. Needs a fix to place it.
    pub fn report_heard(&mut self, callsign: &str, position: Position, now: Instant) -> bool {
        let Some(fix) = &self.last_fix else {
            debug!("No fix yet, {} not placed", callsign);
            return false;
        };
        let distance = fix.position.distance_km(&position) as f32;
        let bearing = fix.position.bearing_to(&position);
        self.proximity.upsert(callsign, distance, bearing, now);
        true
    }

    /// Packet received from the radio; mirrored to the phone when connected
    pub async fn on_radio_packet(&mut self, packet: &str) {
        debug!("LoRa Rx: {}", packet);
        self.display.show("<<< RX >>>", packet);
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.send_to_phone(packet, self.display.as_mut()).await;
        }
    }

    /// One pass of the main loop. Returns the beacon sent, if any.
    pub async fn tick(&mut self, now: Instant, fix: Option<GpsFix>) -> Option<BeaconOutcome> {
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.tick(&mut self.radio, self.display.as_mut()).await;
        }

        let expired = self.proximity.maybe_expire(now);
        if expired > 0 {
            debug!("{} stations expired", expired);
        }

        if let Some(fix) = &fix {
            self.last_fix = Some(*fix);
            self.scheduler.record_fix(fix);
        }

        if self.scheduler.check_standing_update(now) && self.gps_asleep {
            info!("Waking GPS for standing update");
            self.gps_asleep = false;
        }

        let fix = fix?;
        let ctx = BeaconContext {
            fix: &fix,
            battery: self.battery.as_mut(),
            weather: self.weather.as_mut().map(|w| -> &mut dyn WeatherSensor { w.as_mut() }),
        };

        let outcome = if self.scheduler.state().send_update {
            Some(
                self.scheduler
                    .build_and_send(
                        BeaconKind::Position,
                        ctx,
                        now,
                        &mut self.radio,
                        self.bridge.as_mut(),
                        self.display.as_mut(),
                    )
                    .await,
            )
        } else {
            self.scheduler
                .maybe_send_periodic_telemetry(ctx, now, &mut self.radio, self.bridge.as_mut(), self.display.as_mut())
                .await
        };
        let outcome = outcome?;

        if outcome.gps_should_sleep {
            debug!("GPS sleeping until next beacon");
            self.gps_asleep = true;
        }
        if outcome.shutdown_requested {
            error!("Battery exhausted, shutting down");
            self.shutdown_requested = true;
        }
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockPhone, MockRadio};
    use loratrack_core::battery::{BatteryReading, FixedBattery};
    use std::time::Duration;

    fn config() -> Configuration {
        let mut config = Configuration::default();
        config.beacons[0].callsign = "EA1AAA-7".to_string();
        config.beacons.push(loratrack_core::BeaconProfile {
            callsign: "EA1AAA-9".to_string(),
            ..Default::default()
        });
        config.lora_profiles.push(LoraProfile {
            frequency_hz: 868_000_000,
            ..Default::default()
        });
        config
    }

    fn make_tracker(config: Configuration, now: Instant) -> Tracker<MockRadio, MockPhone> {
        Tracker::new(
            Arc::new(config),
            AprsEncoder,
            MockRadio::default(),
            Some(MockPhone::default()),
            Box::new(FixedBattery::none()),
            now,
        )
        .unwrap()
    }

    fn fix_at(lat: f64, lon: f64) -> GpsFix {
        GpsFix {
            position: Position::new(lat, lon),
            course_deg: 0.0,
            speed_kmh: 0.0,
            altitude_m: 50.0,
        }
    }

    #[tokio::test]
    async fn test_beacon_on_request() {
        let now = Instant::now();
        let mut tracker = make_tracker(config(), now);

        assert!(tracker.tick(now, Some(fix_at(42.0, -8.0))).await.is_none());

        tracker.request_beacon();
        // no fix, nothing sent
        assert!(tracker.tick(now, None).await.is_none());

        let outcome = tracker.tick(now, Some(fix_at(42.0, -8.0))).await.unwrap();
        assert!(outcome.packet.starts_with("EA1AAA-7>APLRT1,WIDE1-1:!/"));
        assert_eq!(tracker.radio().sent, vec![outcome.packet]);
        assert!(tracker.tick(now, Some(fix_at(42.0, -8.0))).await.is_none());
    }

    #[tokio::test]
    async fn test_standing_update_wakes_gps() {
        let start = Instant::now();
        let mut config = config();
        config.beacons[0].gps_eco_mode = true;
        config.send_altitude = false;
        let mut tracker = make_tracker(config, start);

        tracker.request_beacon();
        tracker.tick(start, Some(fix_at(42.0, -8.0))).await.unwrap();
        assert!(tracker.is_gps_asleep());

        let later = start + Duration::from_secs(15 * 60);
        assert!(tracker.tick(later, None).await.is_none());
        assert!(!tracker.is_gps_asleep());
        assert!(tracker.scheduler().state().standing_update);

        let outcome = tracker.tick(later, Some(fix_at(42.0, -8.0))).await.unwrap();
        // standing update: no course/speed
        assert!(outcome.packet.contains("  "));
    }

    #[tokio::test]
    async fn test_report_heard_needs_fix() {
        let now = Instant::now();
        let mut tracker = make_tracker(config(), now);
        assert!(!tracker.report_heard("EA1BBB-9", Position::new(42.1, -8.0), now));

        tracker.tick(now, Some(fix_at(42.0, -8.0))).await;
        assert!(tracker.report_heard("EA1BBB-9", Position::new(42.1, -8.0), now));
        assert!(tracker.report_heard("EA1CCC-9", Position::new(42.0, -8.05), now));

        let entries: Vec<_> = tracker.proximity().entries().map(|e| e.callsign.clone()).collect();
        assert_eq!(entries, vec!["EA1CCC-9", "EA1BBB-9"]);
        assert_eq!(tracker.proximity().get(1).unwrap().bearing, 0);
    }

    #[tokio::test]
    async fn test_heard_stations_expire_on_tick() {
        let start = Instant::now();
        let mut tracker = make_tracker(config(), start);
        tracker.tick(start, Some(fix_at(42.0, -8.0))).await;
        tracker.report_heard("EA1BBB-9", Position::new(42.1, -8.0), start);

        tracker.tick(start + Duration::from_secs(29 * 60), None).await;
        assert_eq!(tracker.proximity().len(), 1);
        tracker.tick(start + Duration::from_secs(31 * 60), None).await;
        assert!(tracker.proximity().is_empty());
    }

    #[tokio::test]
    async fn test_low_battery_requests_shutdown() {
        let now = Instant::now();
        let mut tracker: Tracker<MockRadio, MockPhone> = Tracker::new(
            Arc::new(config()),
            AprsEncoder,
            MockRadio::default(),
            None,
            Box::new(FixedBattery::new(BatteryReading::VoltageDivider { volts: 2.9 })),
            now,
        )
        .unwrap();
        assert!(tracker.bridge().is_none());
        tracker.request_beacon();
        tracker.tick(now, Some(fix_at(42.0, -8.0))).await;
        assert!(tracker.shutdown_requested());
    }

    #[test]
    fn test_rejects_config_without_beacons() {
        let mut config = config();
        config.beacons.clear();
        let result: Result<Tracker<MockRadio, MockPhone>, _> = Tracker::new(
            Arc::new(config),
            AprsEncoder,
            MockRadio::default(),
            Some(MockPhone::default()),
            Box::new(FixedBattery::none()),
            Instant::now(),
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_indices_persisted_and_restored() {
        let dir = tempfile::tempdir().unwrap();
        let now = Instant::now();

        let mut tracker = make_tracker(config(), now).with_store(IndexStore::new(dir.path()));
        tracker.select_beacon(1);
        assert_eq!(tracker.select_lora_profile(1).frequency_hz, 868_000_000);
        assert_eq!(tracker.scheduler().beacon().callsign, "EA1AAA-9");

        let restored = make_tracker(config(), now).with_store(IndexStore::new(dir.path()));
        assert_eq!(restored.scheduler().beacon().callsign, "EA1AAA-9");
        assert_eq!(restored.lora_profile().frequency_hz, 868_000_000);

        // out of range falls back to the last profile
        let mut tracker = restored;
        assert_eq!(tracker.select_lora_profile(7).frequency_hz, 868_000_000);
    }

    #[test]
    fn test_bridge_disabled_in_config() {
        let mut config = config();
        config.bluetooth.active = false;
        let tracker = make_tracker(config, Instant::now());
        assert!(tracker.bridge_handle().is_none());
    }
}
