//! Packet content generation.
//!
//! The scheduler only talks to [`PacketEncoder`]; [`AprsEncoder`] is the
//! stock implementation producing compressed positions and Mic-E.

use crate::types::Position;

pub const WX_SYMBOL: &str = "_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Gps,
    Wx,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionReport<'a> {
    pub position: Position,
    pub course_deg: f64,
    pub speed_knots: f64,
    pub symbol: &'a str,
    pub send_altitude: bool,
    pub altitude_ft: f64,
    pub standing_update: bool,
    pub kind: ReportKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MicEReport<'a> {
    /// three characters of '0'/'1'
    pub message: &'a str,
    pub callsign: &'a str,
    pub symbol: &'a str,
    pub overlay: &'a str,
    pub path: &'a str,
    pub position: Position,
    pub course_deg: f64,
    pub speed_knots: f64,
    pub altitude_m: f64,
}

pub trait PacketEncoder {
    /// Position body placed after the symbol table identifier
    fn encode_position(&self, report: &PositionReport<'_>) -> String;

    fn position_packet(
        &self,
        callsign: &str,
        tocall: &str,
        path: &str,
        overlay: &str,
        encoded_position: &str,
    ) -> String;

    fn mic_e_packet(&self, report: &MicEReport<'_>) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AprsEncoder;

fn base91(mut value: u32, width: usize) -> String {
    let mut digits = vec![b'!'; width];
    for slot in digits.iter_mut().rev() {
        *slot = (value % 91) as u8 + 33;
        value /= 91;
    }
    String::from_utf8_lossy(&digits).into_owned()
}

fn first_char(s: &str, fallback: char) -> char {
    s.chars().next().unwrap_or(fallback)
}

pub fn header(callsign: &str, destination: &str, path: &str) -> String {
    if path.is_empty() {
        format!("{}>{}", callsign, destination)
    } else {
        format!("{}>{},{}", callsign, destination, path)
    }
}

// compression type: current fix, software origin, NMEA source GGA or RMC
const COMPRESSION_ALTITUDE: u8 = 0b0011_0010;
const COMPRESSION_COURSE_SPEED: u8 = 0b0011_1010;

impl PacketEncoder for AprsEncoder {
    fn encode_position(&self, report: &PositionReport<'_>) -> String {
        let lat = report.position.lat.clamp(-90.0, 90.0);
        let lon = report.position.lon.clamp(-180.0, 180.0);

        let mut out = String::with_capacity(13);
        out.push_str(&base91((380_926.0 * (90.0 - lat)) as u32, 4));
        out.push_str(&base91((190_463.0 * (180.0 + lon)) as u32, 4));

        let symbol = match report.kind {
            ReportKind::Wx => '_',
            ReportKind::Gps => first_char(report.symbol, '['),
        };
        out.push(symbol);

        if report.send_altitude {
            let feet = report.altitude_ft.max(1.0);
            let cs = (feet.ln() / 1.002f64.ln()).round() as u32;
            out.push_str(&base91(cs.min(91 * 91 - 1), 2));
            out.push(char::from(COMPRESSION_ALTITUDE + 33));
        } else if report.standing_update {
            out.push_str("  ");
            out.push(char::from(COMPRESSION_COURSE_SPEED + 33));
        } else {
            let course = report.course_deg.rem_euclid(360.0) as u32;
            let speed = ((report.speed_knots.max(0.0) + 1.0).ln() / 1.08f64.ln()).round() as u32;
            out.push(char::from((course / 4) as u8 + 33));
            out.push(char::from(speed.min(89) as u8 + 33));
            out.push(char::from(COMPRESSION_COURSE_SPEED + 33));
        }
        out
    }

    fn position_packet(
        &self,
        callsign: &str,
        tocall: &str,
        path: &str,
        overlay: &str,
        encoded_position: &str,
    ) -> String {
        format!(
            "{}:!{}{}",
            header(callsign, tocall, path),
            first_char(overlay, '/'),
            encoded_position
        )
    }

    fn mic_e_packet(&self, report: &MicEReport<'_>) -> String {
        let destination = mic_e_destination(report.message, &report.position);
        let mut info = String::from("`");
        info.push_str(&mic_e_longitude(report.position.lon));
        info.push_str(&mic_e_course_speed(report.course_deg, report.speed_knots));
        info.push(first_char(report.symbol, '['));
        info.push(first_char(report.overlay, '/'));
        let altitude = (report.altitude_m + 10_000.0).max(0.0) as u32;
        info.push_str(&base91(altitude, 3));
        info.push('}');

        format!("{}:{}", header(report.callsign, &destination, report.path), info)
    }
}

fn mic_e_destination(message: &str, position: &Position) -> String {
    let hundredths = (position.lat.abs().min(90.0) * 6000.0).round() as u32;
    let degrees = hundredths / 6000;
    let minutes = (hundredths % 6000) / 100;
    let fraction = hundredths % 100;
    let digits = [
        degrees / 10,
        degrees % 10,
        minutes / 10,
        minutes % 10,
        fraction / 10,
        fraction % 10,
    ];

    let lon_degrees = position.lon.abs() as u32;
    let flags = [
        message.as_bytes().first() == Some(&b'1'),
        message.as_bytes().get(1) == Some(&b'1'),
        message.as_bytes().get(2) == Some(&b'1'),
        position.lat >= 0.0,
        !(10..100).contains(&lon_degrees),
        position.lon < 0.0,
    ];

    digits
        .iter()
        .zip(flags)
        .map(|(&d, set)| {
            let base = if set { b'P' } else { b'0' };
            char::from(base + d as u8)
        })
        .collect()
}

fn mic_e_longitude(lon: f64) -> String {
    let hundredths = (lon.abs().min(180.0) * 6000.0).round() as u32;
    let degrees = hundredths / 6000;
    let minutes = (hundredths % 6000) / 100;
    let fraction = hundredths % 100;

    let d = match degrees {
        0..=9 => degrees + 118,
        10..=99 => degrees + 28,
        100..=109 => degrees + 8,
        _ => degrees - 72,
    };
    let m = if minutes < 10 { minutes + 88 } else { minutes + 28 };

    [d, m, fraction + 28]
        .into_iter()
        .map(|b| char::from(b as u8))
        .collect()
}

fn mic_e_course_speed(course_deg: f64, speed_knots: f64) -> String {
    let speed = (speed_knots.max(0.0).round() as u32).min(799);
    let course = (course_deg.rem_euclid(360.0).round() as u32) % 360;

    // low speeds and all courses use the +80/+400 offsets to stay printable
    let mut sp = speed / 10;
    if sp < 20 {
        sp += 80;
    }
    let dc = (speed % 10) * 10 + course / 100 + 4;
    let se = course % 100;

    [sp + 28, dc + 28, se + 28]
        .into_iter()
        .map(|b| char::from(b as u8))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(symbol: &str) -> PositionReport<'_> {
        PositionReport {
            position: Position::new(49.5, -72.75),
            course_deg: 88.0,
            speed_knots: 36.2,
            symbol,
            send_altitude: false,
            altitude_ft: 0.0,
            standing_update: false,
            kind: ReportKind::Gps,
        }
    }

    #[test]
    fn test_compressed_course_speed() {
        let encoded = AprsEncoder.encode_position(&report(">"));
        assert_eq!(encoded, "5L!!<*e7>7P[");
    }

    #[test]
    fn test_compressed_altitude_and_wx() {
        let mut r = report(">");
        r.send_altitude = true;
        r.altitude_ft = 10_004.0;
        r.kind = ReportKind::Wx;
        let encoded = AprsEncoder.encode_position(&r);
        assert_eq!(&encoded[8..9], "_");
        // 4610 = 50 * 91 + 60
        assert_eq!(&encoded[9..11], "S]");
        assert_eq!(&encoded[11..], "S");
    }

    #[test]
    fn test_position_packet_header() {
        let p = AprsEncoder.position_packet("N0CALL-7", "APLRT1", "WIDE1-1", "/", "XYZ");
        assert_eq!(p, "N0CALL-7>APLRT1,WIDE1-1:!/XYZ");
        let p = AprsEncoder.position_packet("N0CALL-7", "APLRT1", "", "/", "XYZ");
        assert_eq!(p, "N0CALL-7>APLRT1:!/XYZ");
    }

    #[test]
    fn test_mic_e() {
        let r = MicEReport {
            message: "111",
            callsign: "N0CALL-9",
            symbol: ">",
            overlay: "/",
            path: "",
            position: Position::new(33.0 + 25.64 / 60.0, -(112.0 + 7.74 / 60.0)),
            course_deg: 251.0,
            speed_knots: 20.0,
            altitude_m: 0.0,
        };
        let packet = AprsEncoder.mic_e_packet(&r);
        let (head, info) = packet.split_once(':').unwrap();
        assert_eq!(head, "N0CALL-9>SSRUVT");
        let info: Vec<char> = info.chars().collect();
        assert_eq!(info[0], '`');
        assert_eq!(info[1], '(');
        assert_eq!(info[2], '_');
        assert_eq!(info[3], 'f');
        // speed 20 -> sp 2 + 80, dc = 0 + 2 + 4, se = 51
        assert_eq!(info[4] as u32, 110);
        assert_eq!(info[5] as u32, 34);
        assert_eq!(info[6] as u32, 79);
        assert_eq!(info[7], '>');
        assert_eq!(info[8], '/');
        assert_eq!(*info.last().unwrap(), '}');
    }
}
