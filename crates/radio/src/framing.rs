//! KISS framing used on the phone-facing link

use bytes::{BufMut, Bytes, BytesMut};
use log::trace;

use crate::ax25::UiFrame;
use crate::FrameError;

pub const FEND: u8 = 0xC0;
pub const FESC: u8 = 0xDB;
pub const TFEND: u8 = 0xDC;
pub const TFESC: u8 = 0xDD;

/// Type byte of a data frame on port 0
pub const KISS_DATA_FRAME: u8 = 0x00;

/// A sentinel closes a frame only once more than this many bytes are held
pub const NOISE_FRAME_LEN: usize = 3;

/// Accumulator limit; a frame that never decodes is dropped past this
pub const MAX_FRAME_LEN: usize = 1024;

/// Raw frame bytes, sentinels included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Bytes);

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Frame {
    fn from(v: Vec<u8>) -> Self {
        Frame(Bytes::from(v))
    }
}

/// Upper layer that turns a closed frame into something useful.
/// Returning `None` keeps the collector accumulating.
pub trait FrameDecoder {
    type Output;

    fn decode(&self, frame: &[u8]) -> Option<Self::Output>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeStep<T> {
    /// byte ignored while waiting for an opening sentinel
    Discarded,
    /// frame still being collected
    Open,
    Closed { frame: Frame, decoded: T },
}

/// Byte-at-a-time frame collector.
///
/// Idle while the accumulator is empty; the first sentinel opens a frame and
/// is kept. Every later byte is appended, and a sentinel arriving with more
/// than [`NOISE_FRAME_LEN`] bytes held hands the frame to the decoder. Only
/// a successful decode resets to idle.
#[derive(Debug, Default)]
pub struct FrameCollector {
    buf: BytesMut,
}

impl FrameCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_collecting(&self) -> bool {
        !self.buf.is_empty()
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn reset(&mut self) {
        self.buf.clear();
    }

    pub fn push<D: FrameDecoder>(&mut self, byte: u8, decoder: &D) -> DecodeStep<D::Output> {
        if self.buf.is_empty() && byte != FEND {
            return DecodeStep::Discarded;
        }

        self.buf.put_u8(byte);

        if byte == FEND && self.buf.len() > NOISE_FRAME_LEN {
            if let Some(decoded) = decoder.decode(&self.buf) {
                let frame = Frame(self.buf.split().freeze());
                return DecodeStep::Closed { frame, decoded };
            }
        }

        if self.buf.len() > MAX_FRAME_LEN {
            trace!("Dropping {} undecodable bytes", self.buf.len());
            self.buf.clear();
            return DecodeStep::Discarded;
        }

        DecodeStep::Open
    }

    pub fn push_slice<D: FrameDecoder>(
        &mut self,
        bytes: &[u8],
        decoder: &D,
    ) -> Vec<(Frame, D::Output)> {
        bytes
            .iter()
            .filter_map(|&b| match self.push(b, decoder) {
                DecodeStep::Closed { frame, decoded } => Some((frame, decoded)),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KissPayload {
    pub command: u8,
    pub data: Vec<u8>,
}

/// Removes sentinels and escapes. The first remaining byte is the type byte.
pub fn unescape(frame: &[u8]) -> Option<KissPayload> {
    let mut out = Vec::with_capacity(frame.len());
    let mut escaped = false;
    for &b in frame.iter().filter(|&&b| b != FEND) {
        if escaped {
            match b {
                TFEND => out.push(FEND),
                TFESC => out.push(FESC),
                _ => return None,
            }
            escaped = false;
        } else if b == FESC {
            escaped = true;
        } else {
            out.push(b);
        }
    }
    if escaped || out.is_empty() {
        return None;
    }
    let command = out.remove(0);
    Some(KissPayload { command, data: out })
}

/// Accepts any non-empty frame
#[derive(Debug, Clone, Copy, Default)]
pub struct KissUnescape;

impl FrameDecoder for KissUnescape {
    type Output = KissPayload;

    fn decode(&self, frame: &[u8]) -> Option<KissPayload> {
        unescape(frame)
    }
}

/// Accepts data frames only, yielding their payload
#[derive(Debug, Clone, Copy, Default)]
pub struct KissDataDecoder;

impl FrameDecoder for KissDataDecoder {
    type Output = Vec<u8>;

    fn decode(&self, frame: &[u8]) -> Option<Vec<u8>> {
        unescape(frame)
            .filter(|p| p.command & 0x0F == KISS_DATA_FRAME && !p.data.is_empty())
            .map(|p| p.data)
    }
}

/// Data frames carrying an AX.25 UI frame, rendered as TNC2 text
#[derive(Debug, Clone, Copy, Default)]
pub struct Tnc2Decoder;

impl FrameDecoder for Tnc2Decoder {
    type Output = String;

    fn decode(&self, frame: &[u8]) -> Option<String> {
        let payload = KissDataDecoder.decode(frame)?;
        match UiFrame::decode(&payload) {
            Ok(ui) => Some(ui.to_tnc2()),
            Err(e) => {
                trace!("KISS data frame is not a UI frame: {}", e);
                None
            }
        }
    }
}

/// Wraps `payload` as a port 0 data frame
pub fn encode(payload: &[u8]) -> Frame {
    let mut out = BytesMut::with_capacity(payload.len() + 4);
    out.put_u8(FEND);
    out.put_u8(KISS_DATA_FRAME);
    for &b in payload {
        match b {
            FEND => out.put_slice(&[FESC, TFEND]),
            FESC => out.put_slice(&[FESC, TFESC]),
            _ => out.put_u8(b),
        }
    }
    out.put_u8(FEND);
    Frame(out.freeze())
}

/// TNC2 text to a KISS frame holding the AX.25 UI frame
pub fn encode_tnc2(packet: &str) -> Result<Frame, FrameError> {
    let ui = UiFrame::from_tnc2(packet)?;
    Ok(encode(&ui.encode()))
}
