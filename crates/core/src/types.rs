use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

pub const KMH_PER_KNOT: f64 = 1.852;
pub const FEET_PER_METER: f64 = 3.280_84;

/// Tocall used as the destination of every generated packet
pub const TOCALL: &str = "APLRT1";

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

impl Position {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance in kilometres
    pub fn distance_km(&self, other: &Position) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.lon - self.lon).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
    }

    /// Initial bearing towards `other`, whole degrees in 0..360
    pub fn bearing_to(&self, other: &Position) -> u16 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlon = (other.lon - self.lon).to_radians();

        let y = dlon.sin() * lat2.cos();
        let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
        let deg = y.atan2(x).to_degrees().rem_euclid(360.0);
        (deg.round() as u16) % 360
    }
}

/// A GPS fix as handed over by the receiver driver
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GpsFix {
    pub position: Position,
    pub course_deg: f64,
    pub speed_kmh: f64,
    pub altitude_m: f64,
}

impl GpsFix {
    pub fn speed_knots(&self) -> f64 {
        self.speed_kmh / KMH_PER_KNOT
    }

    pub fn altitude_ft(&self) -> f64 {
        self.altitude_m * FEET_PER_METER
    }
}

/// Sender part of a TNC2 packet (`SRC>DEST,...:info`)
pub fn tnc2_sender(packet: &str) -> &str {
    packet.split_once('>').map_or(packet, |(sender, _)| sender)
}

/// Base callsign without SSID (`N0CALL-7` -> `N0CALL`)
pub fn base_callsign(callsign: &str) -> &str {
    callsign.split_once('-').map_or(callsign, |(base, _)| base)
}
