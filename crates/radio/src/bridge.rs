//! Phone-facing transport bridge.
//!
//! Link callbacks only enqueue [`LinkEvent`]s through a [`BridgeHandle`];
//! [`TransportBridge::tick`] drains them on the tracker's single execution
//! context, forwards decoded packets to the radio and keeps the connection
//! flag. Outbound packets are paced with awaited sleeps on that same
//! context.

use std::time::Duration;

use log::{debug, error, info, trace, warn};
use tokio::sync::mpsc;
use tokio::time::sleep;

use loratrack_core::types::{base_callsign, tnc2_sender};
use loratrack_core::Configuration;

use crate::display::DisplaySink;
use crate::framing::{self, DecodeStep, FrameCollector, Tnc2Decoder};
use crate::link::{PhoneLink, RadioLink};
use crate::BridgeError;

pub const KISS_CHUNK_SIZE: usize = 64;
pub const KISS_CHUNK_PAUSE: Duration = Duration::from_millis(200);
pub const TNC2_BYTE_PAUSE: Duration = Duration::from_millis(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattLayout {
    pub service: &'static str,
    /// notify, device to phone
    pub tx_characteristic: &'static str,
    /// write, phone to device
    pub rx_characteristic: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeProfile {
    /// AX.25 in KISS frames (aprs.fi and similar apps)
    Kiss,
    /// plain TNC2 text lines (serial terminal apps)
    Tnc2,
}

impl TryFrom<u8> for BridgeProfile {
    type Error = BridgeError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            0 => Ok(BridgeProfile::Kiss),
            2 => Ok(BridgeProfile::Tnc2),
            other => Err(BridgeError::UnknownProfile(other)),
        }
    }
}

impl BridgeProfile {
    pub fn id(&self) -> u8 {
        match self {
            BridgeProfile::Kiss => 0,
            BridgeProfile::Tnc2 => 2,
        }
    }

    pub fn layout(&self) -> GattLayout {
        match self {
            BridgeProfile::Kiss => GattLayout {
                service: "00000001-ba2a-46c9-ae49-01b0961f68bb",
                tx_characteristic: "00000003-ba2a-46c9-ae49-01b0961f68bb",
                rx_characteristic: "00000002-ba2a-46c9-ae49-01b0961f68bb",
            },
            BridgeProfile::Tnc2 => GattLayout {
                service: "6E400001-B5A3-F393-E0A9-E50E24DCCA9E",
                tx_characteristic: "6E400002-B5A3-F393-E0A9-E50E24DCCA9E",
                rx_characteristic: "6E400003-B5A3-F393-E0A9-E50E24DCCA9E",
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    Disconnected,
    Data(Vec<u8>),
}

/// Handed to the link's callbacks. Never blocks.
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    tx: mpsc::UnboundedSender<LinkEvent>,
}

impl BridgeHandle {
    fn enqueue(&self, event: LinkEvent) {
        if self.tx.send(event).is_err() {
            trace!("Bridge gone, link event dropped");
        }
    }

    pub fn on_connect(&self) {
        self.enqueue(LinkEvent::Connected);
    }

    pub fn on_disconnect(&self) {
        self.enqueue(LinkEvent::Disconnected);
    }

    pub fn on_write(&self, data: &[u8]) {
        self.enqueue(LinkEvent::Data(data.to_vec()));
    }
}

pub struct TransportBridge<P> {
    link: P,
    profile: BridgeProfile,
    device_name: String,
    own_callsign: String,
    accept_own_frames: bool,
    connected: bool,
    collector: FrameCollector,
    line: Vec<u8>,
    handle: BridgeHandle,
    events: mpsc::UnboundedReceiver<LinkEvent>,
}

impl<P: PhoneLink> TransportBridge<P> {
    /// Creates the service for the configured profile and starts advertising.
    pub fn setup(config: &Configuration, callsign: &str, mut link: P) -> Result<Self, BridgeError> {
        let profile = BridgeProfile::try_from(config.bluetooth.profile).inspect_err(|_| {
            error!(
                "Failed to create BLE service. Invalid bluetooth profile: {}",
                config.bluetooth.profile
            )
        })?;

        let device_name = format!("{}-BLE", base_callsign(callsign));
        let layout = profile.layout();
        debug!(
            "BLE service {} (tx {}, rx {}) as {}",
            layout.service, layout.tx_characteristic, layout.rx_characteristic, device_name
        );

        link.start_advertising()?;
        debug!("Waiting for BLE central to connect...");

        let (tx, events) = mpsc::unbounded_channel();
        Ok(Self {
            link,
            profile,
            device_name,
            own_callsign: callsign.to_string(),
            accept_own_frames: config.accept_own_frame_from_tnc,
            connected: false,
            collector: FrameCollector::new(),
            line: Vec::new(),
            handle: BridgeHandle { tx },
            events,
        })
    }

    pub fn handle(&self) -> BridgeHandle {
        self.handle.clone()
    }

    pub fn profile(&self) -> BridgeProfile {
        self.profile
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn link(&self) -> &P {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut P {
        &mut self.link
    }

    /// Follows a change of the active station identity
    pub fn set_callsign(&mut self, callsign: &str) {
        self.own_callsign = callsign.to_string();
    }

    /// Applies queued link events and forwards completed packets to the
    /// radio. Returns how many packets went out.
    pub async fn tick<R: RadioLink + ?Sized>(
        &mut self,
        radio: &mut R,
        display: &mut dyn DisplaySink,
    ) -> usize {
        let mut forwarded = 0;
        while let Ok(event) = self.events.try_recv() {
            for packet in self.apply(event) {
                if self.forward_to_radio(&packet, radio, display).await {
                    forwarded += 1;
                }
            }
        }
        forwarded
    }

    fn apply(&mut self, event: LinkEvent) -> Vec<String> {
        match event {
            LinkEvent::Connected => {
                self.connected = true;
                info!("BLE Client Connected");
                Vec::new()
            }
            LinkEvent::Disconnected => {
                self.connected = false;
                self.collector.reset();
                self.line.clear();
                info!("BLE client Disconnected, Started Advertising");
                if let Err(e) = self.link.start_advertising() {
                    error!("Could not restart advertising: {}", e);
                }
                Vec::new()
            }
            LinkEvent::Data(data) if !self.connected => {
                debug!("Ignoring {} bytes received while disconnected", data.len());
                Vec::new()
            }
            LinkEvent::Data(data) => match self.profile {
                BridgeProfile::Kiss => self.collect_kiss(&data),
                BridgeProfile::Tnc2 => self.collect_lines(&data),
            },
        }
    }

    fn collect_kiss(&mut self, data: &[u8]) -> Vec<String> {
        let mut packets = Vec::new();
        for &b in data {
            if let DecodeStep::Closed { decoded, .. } = self.collector.push(b, &Tnc2Decoder) {
                packets.push(decoded);
            }
        }
        packets
    }

    fn collect_lines(&mut self, data: &[u8]) -> Vec<String> {
        let mut packets = Vec::new();
        for &b in data {
            if b == b'\n' || b == b'\r' {
                let line = String::from_utf8_lossy(&self.line).into_owned();
                self.line.clear();
                if !line.is_empty() {
                    packets.push(line);
                }
            } else if self.line.len() >= framing::MAX_FRAME_LEN {
                trace!("Dropping {} bytes of unterminated text", self.line.len() + 1);
                self.line.clear();
            } else {
                self.line.push(b);
            }
        }
        packets
    }

    /// Own packets echoed back by the phone app are not retransmitted.
    /// Anything with an addressee field (`::`) always passes.
    pub fn is_own_loopback(&self, packet: &str) -> bool {
        !self.accept_own_frames
            && !packet.contains("::")
            && tnc2_sender(packet) == self.own_callsign
    }

    async fn forward_to_radio<R: RadioLink + ?Sized>(
        &mut self,
        packet: &str,
        radio: &mut R,
        display: &mut dyn DisplaySink,
    ) -> bool {
        if self.is_own_loopback(packet) {
            trace!("Dropping own frame from phone: {}", packet);
            return false;
        }

        debug!("BLE Tx: {}", packet);
        display.show("BLE Tx >>", packet);
        match radio.send_packet(packet).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Radio send failed for phone packet: {}", e);
                false
            }
        }
    }

    /// Delivers `packet` to the phone. A no-op while disconnected.
    pub async fn send_to_phone(&mut self, packet: &str, display: &mut dyn DisplaySink) {
        if packet.is_empty() || !self.connected {
            return;
        }
        debug!("BLE Rx: {}", packet);
        display.show("<< BLE Rx", packet);

        match self.profile {
            BridgeProfile::Kiss => {
                let frame = match framing::encode_tnc2(packet) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("Cannot frame packet for phone: {}", e);
                        return;
                    }
                };
                for chunk in frame.as_bytes().chunks(KISS_CHUNK_SIZE) {
                    self.write(chunk).await;
                    sleep(KISS_CHUNK_PAUSE).await;
                }
            }
            BridgeProfile::Tnc2 => {
                for &b in packet.as_bytes().iter().chain(std::iter::once(&b'\n')) {
                    self.write(&[b]).await;
                    sleep(TNC2_BYTE_PAUSE).await;
                }
            }
        }
    }

    async fn write(&mut self, data: &[u8]) {
        if let Err(e) = self.link.notify(data).await {
            warn!("BLE notify failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockPhone, MockRadio, RecordingDisplay};
    use tokio::time::Instant;

    fn config(profile: u8) -> Configuration {
        let mut config = Configuration::default();
        config.bluetooth.profile = profile;
        config
    }

    fn bridge(profile: u8) -> TransportBridge<MockPhone> {
        TransportBridge::setup(&config(profile), "N0CALL-7", MockPhone::default()).unwrap()
    }

    #[test]
    fn test_unknown_profile() {
        let result = TransportBridge::setup(&config(1), "N0CALL-7", MockPhone::default());
        assert!(matches!(result, Err(BridgeError::UnknownProfile(1))));
    }

    #[test]
    fn test_setup_advertises() {
        let bridge = bridge(0);
        assert_eq!(bridge.device_name(), "N0CALL-BLE");
        assert_eq!(bridge.link().advertising_started, 1);
        assert_eq!(bridge.profile().layout().service, "00000001-ba2a-46c9-ae49-01b0961f68bb");
        assert!(!bridge.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_rearms_advertising() {
        let mut bridge = bridge(0);
        let mut radio = MockRadio::default();
        let mut display = RecordingDisplay::default();
        let handle = bridge.handle();

        handle.on_connect();
        bridge.tick(&mut radio, &mut display).await;
        assert!(bridge.is_connected());

        handle.on_disconnect();
        bridge.tick(&mut radio, &mut display).await;
        assert!(!bridge.is_connected());
        assert_eq!(bridge.link().advertising_started, 2);
    }

    #[tokio::test]
    async fn test_kiss_inbound_split_writes() {
        let mut bridge = bridge(0);
        let mut radio = MockRadio::default();
        let mut display = RecordingDisplay::default();
        let handle = bridge.handle();

        let frame = framing::encode_tnc2("EA1XYZ-9>APLRT1,WIDE1-1:>hello").unwrap();
        let (a, b) = frame.as_bytes().split_at(9);
        handle.on_connect();
        handle.on_write(a);
        assert_eq!(bridge.tick(&mut radio, &mut display).await, 0);

        handle.on_write(b);
        assert_eq!(bridge.tick(&mut radio, &mut display).await, 1);
        assert_eq!(radio.sent, vec!["EA1XYZ-9>APLRT1,WIDE1-1:>hello".to_string()]);
        assert_eq!(display.shown.len(), 1);
    }

    #[tokio::test]
    async fn test_data_ignored_while_disconnected() {
        let mut bridge = bridge(2);
        let mut radio = MockRadio::default();
        let mut display = RecordingDisplay::default();
        bridge.handle().on_write(b"EA1XYZ-9>APLRT1:>hi\n");
        assert_eq!(bridge.tick(&mut radio, &mut display).await, 0);
        assert!(radio.sent.is_empty());
    }

    #[tokio::test]
    async fn test_unterminated_text_dropped_past_limit() {
        let mut bridge = bridge(2);
        let mut radio = MockRadio::default();
        let mut display = RecordingDisplay::default();
        let handle = bridge.handle();

        handle.on_connect();
        // 41 * 25 = MAX_FRAME_LEN + 1
        for _ in 0..41 {
            handle.on_write(&[b'x'; 25]);
            assert_eq!(bridge.tick(&mut radio, &mut display).await, 0);
            assert!(bridge.line.len() <= framing::MAX_FRAME_LEN);
        }
        assert!(bridge.line.is_empty());

        handle.on_write(b"EA1XYZ>APLRT1:>after\n");
        assert_eq!(bridge.tick(&mut radio, &mut display).await, 1);
        assert_eq!(radio.sent, vec!["EA1XYZ>APLRT1:>after".to_string()]);
    }

    #[tokio::test]
    async fn test_text_payload_whitespace_kept() {
        let mut bridge = bridge(2);
        let mut radio = MockRadio::default();
        let mut display = RecordingDisplay::default();
        let handle = bridge.handle();

        handle.on_connect();
        handle.on_write(b"N0CALL-9>APLRT1::EA1AAA   :hi  \r\n");
        assert_eq!(bridge.tick(&mut radio, &mut display).await, 1);
        assert_eq!(radio.sent, vec!["N0CALL-9>APLRT1::EA1AAA   :hi  ".to_string()]);
    }

    #[tokio::test]
    async fn test_self_frame_filter() {
        let mut bridge = bridge(2);
        let mut radio = MockRadio::default();
        let mut display = RecordingDisplay::default();
        let handle = bridge.handle();

        handle.on_connect();
        handle.on_write(b"N0CALL-7>APLRT1:!own position\r\n");
        handle.on_write(b"N0CALL-7>APLRT1::EA1XYZ   :message\n");
        handle.on_write(b"EA1XYZ>APLRT1:>other\n");
        assert_eq!(bridge.tick(&mut radio, &mut display).await, 2);
        assert_eq!(
            radio.sent,
            vec![
                "N0CALL-7>APLRT1::EA1XYZ   :message".to_string(),
                "EA1XYZ>APLRT1:>other".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_own_frames_accepted_when_enabled() {
        let mut config = config(2);
        config.accept_own_frame_from_tnc = true;
        let mut bridge = TransportBridge::setup(&config, "N0CALL-7", MockPhone::default()).unwrap();
        assert!(!bridge.is_own_loopback("N0CALL-7>APLRT1:!own"));

        let mut radio = MockRadio::default();
        let mut display = RecordingDisplay::default();
        bridge.handle().on_connect();
        bridge.handle().on_write(b"N0CALL-7>APLRT1:!own\n");
        assert_eq!(bridge.tick(&mut radio, &mut display).await, 1);
    }

    #[tokio::test]
    async fn test_radio_failure_is_absorbed() {
        let mut bridge = bridge(2);
        let mut radio = MockRadio {
            available: false,
            ..Default::default()
        };
        let mut display = RecordingDisplay::default();
        bridge.handle().on_connect();
        bridge.handle().on_write(b"EA1XYZ>APLRT1:>other\n");
        assert_eq!(bridge.tick(&mut radio, &mut display).await, 0);
        assert!(bridge.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_kiss_outbound_chunks() {
        let mut bridge = bridge(0);
        let mut radio = MockRadio::default();
        let mut display = RecordingDisplay::default();
        bridge.handle().on_connect();
        bridge.tick(&mut radio, &mut display).await;

        let packet = format!("N0CALL-7>APLRT1,WIDE1-1:>{}", "x".repeat(100));
        let expected = framing::encode_tnc2(&packet).unwrap();

        let start = Instant::now();
        bridge.send_to_phone(&packet, &mut display).await;
        let elapsed = start.elapsed();

        let writes = &bridge.link().notified;
        assert_eq!(writes.len(), expected.len().div_ceil(KISS_CHUNK_SIZE));
        assert!(writes[..writes.len() - 1].iter().all(|w| w.len() == KISS_CHUNK_SIZE));
        assert_eq!(writes.concat(), expected.as_bytes());
        assert!(elapsed >= KISS_CHUNK_PAUSE * writes.len() as u32);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tnc2_outbound_bytewise() {
        let mut bridge = bridge(2);
        let mut radio = MockRadio::default();
        let mut display = RecordingDisplay::default();
        bridge.handle().on_connect();
        bridge.tick(&mut radio, &mut display).await;

        bridge.send_to_phone("A>B:c", &mut display).await;
        let writes = &bridge.link().notified;
        assert_eq!(writes.len(), 6);
        assert!(writes.iter().all(|w| w.len() == 1));
        assert_eq!(writes.concat(), b"A>B:c\n");
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let mut bridge = bridge(2);
        let mut display = RecordingDisplay::default();
        bridge.send_to_phone("A>B:c", &mut display).await;
        assert!(bridge.link().notified.is_empty());
        assert!(display.shown.is_empty());
    }
}
