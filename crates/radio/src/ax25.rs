//! AX.25 UI frames and their TNC2 text form (`SRC>DEST,DIGI*:info`)

use std::fmt;
use std::str::FromStr;

use crate::FrameError;

pub const CONTROL_UI: u8 = 0x03;
pub const PID_NO_LAYER3: u8 = 0xF0;
pub const MAX_DIGIPEATERS: usize = 8;

const ADDRESS_LEN: usize = 7;
const CALLSIGN_LEN: usize = 6;
const SSID_RESERVED: u8 = 0x60;
const END_OF_ADDRESS: u8 = 0x01;
// command bit on the destination, has-been-repeated bit on digipeaters
const HIGH_BIT: u8 = 0x80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub callsign: String,
    pub ssid: u8,
    pub repeated: bool,
}

impl FromStr for Address {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (s, repeated) = match s.strip_suffix('*') {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        let (callsign, ssid) = match s.split_once('-') {
            Some((call, ssid)) => {
                let ssid = ssid
                    .parse::<u8>()
                    .ok()
                    .filter(|v| *v <= 15)
                    .ok_or_else(|| FrameError::BadAddress(s.to_string()))?;
                (call, ssid)
            }
            None => (s, 0),
        };
        if callsign.is_empty()
            || callsign.len() > CALLSIGN_LEN
            || !callsign.bytes().all(|b| b.is_ascii_alphanumeric())
        {
            return Err(FrameError::BadAddress(s.to_string()));
        }
        Ok(Address {
            callsign: callsign.to_string(),
            ssid,
            repeated,
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.callsign)?;
        if self.ssid > 0 {
            write!(f, "-{}", self.ssid)?;
        }
        if self.repeated {
            f.write_str("*")?;
        }
        Ok(())
    }
}

impl Address {
    fn encode_into(&self, out: &mut Vec<u8>, high_bit: bool, last: bool) {
        let call = self.callsign.as_bytes();
        for i in 0..CALLSIGN_LEN {
            out.push(call.get(i).copied().unwrap_or(b' ') << 1);
        }
        let mut ssid = SSID_RESERVED | ((self.ssid & 0x0F) << 1);
        if high_bit {
            ssid |= HIGH_BIT;
        }
        if last {
            ssid |= END_OF_ADDRESS;
        }
        out.push(ssid);
    }

    fn decode(field: &[u8]) -> Result<(Self, bool), FrameError> {
        let callsign: String = field[..CALLSIGN_LEN]
            .iter()
            .map(|b| char::from(b >> 1))
            .collect::<String>()
            .trim_end()
            .to_string();
        if callsign.is_empty() {
            return Err(FrameError::BadAddress(callsign));
        }
        let ssid_byte = field[CALLSIGN_LEN];
        Ok((
            Address {
                callsign,
                ssid: (ssid_byte >> 1) & 0x0F,
                repeated: ssid_byte & HIGH_BIT != 0,
            },
            ssid_byte & END_OF_ADDRESS != 0,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiFrame {
    pub destination: Address,
    pub source: Address,
    pub digipeaters: Vec<Address>,
    pub info: Vec<u8>,
}

impl UiFrame {
    pub fn from_tnc2(text: &str) -> Result<Self, FrameError> {
        let (head, info) = text.split_once(':').ok_or(FrameError::MissingInfo)?;
        let (source, route) = head.split_once('>').ok_or(FrameError::MissingInfo)?;
        let mut route = route.split(',');
        let destination = route.next().unwrap_or_default().parse::<Address>()?;
        let digipeaters = route
            .map(str::parse::<Address>)
            .collect::<Result<Vec<_>, _>>()?;
        if digipeaters.len() > MAX_DIGIPEATERS {
            return Err(FrameError::TooManyDigipeaters(digipeaters.len()));
        }

        Ok(UiFrame {
            destination: Address {
                repeated: false,
                ..destination
            },
            source: source.parse::<Address>()?,
            digipeaters,
            info: info.as_bytes().to_vec(),
        })
    }

    pub fn to_tnc2(&self) -> String {
        let mut out = format!("{}>{}", self.source, self.destination);
        for digi in &self.digipeaters {
            out.push(',');
            out.push_str(&digi.to_string());
        }
        out.push(':');
        out.push_str(&String::from_utf8_lossy(&self.info));
        out
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity((2 + self.digipeaters.len()) * ADDRESS_LEN + 2 + self.info.len());
        self.destination.encode_into(&mut out, true, false);
        self.source
            .encode_into(&mut out, false, self.digipeaters.is_empty());
        let count = self.digipeaters.len();
        for (i, digi) in self.digipeaters.iter().enumerate() {
            digi.encode_into(&mut out, digi.repeated, i + 1 == count);
        }
        out.push(CONTROL_UI);
        out.push(PID_NO_LAYER3);
        out.extend_from_slice(&self.info);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let mut addresses = Vec::new();
        let mut offset = 0;
        loop {
            let field = bytes
                .get(offset..offset + ADDRESS_LEN)
                .ok_or(FrameError::Truncated)?;
            let (address, last) = Address::decode(field)?;
            addresses.push(address);
            offset += ADDRESS_LEN;
            if last {
                break;
            }
            if addresses.len() >= 2 + MAX_DIGIPEATERS {
                return Err(FrameError::TooManyDigipeaters(addresses.len() - 2));
            }
        }
        if addresses.len() < 2 {
            return Err(FrameError::Truncated);
        }

        match bytes.get(offset..offset + 2) {
            Some([CONTROL_UI, PID_NO_LAYER3]) => {}
            Some(_) => return Err(FrameError::NotUi),
            None => return Err(FrameError::Truncated),
        }

        let mut addresses = addresses.into_iter();
        let destination = addresses.next().ok_or(FrameError::Truncated)?;
        let source = addresses.next().ok_or(FrameError::Truncated)?;
        Ok(UiFrame {
            destination: Address {
                repeated: false,
                ..destination
            },
            source: Address {
                repeated: false,
                ..source
            },
            digipeaters: addresses.collect(),
            info: bytes[offset + 2..].to_vec(),
        })
    }
}
