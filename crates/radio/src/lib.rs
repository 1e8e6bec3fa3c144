//! radio and phone link layer for LoRaTrack

use thiserror::Error;

pub mod ax25;
pub mod bridge;
pub mod display;
pub mod framing;
pub mod link;
pub mod scheduler;
pub mod tracker;

#[cfg(test)]
pub(crate) mod testing;

pub use bridge::{BridgeHandle, BridgeProfile, GattLayout, LinkEvent, TransportBridge};
pub use display::{DisplaySink, LogDisplay};
pub use framing::{DecodeStep, Frame, FrameCollector, FrameDecoder};
pub use link::{PhoneLink, RadioLink};
pub use scheduler::{BeaconContext, BeaconKind, BeaconOutcome, BeaconScheduler, BeaconState};
pub use tracker::Tracker;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("packet has no information field")]
    MissingInfo,

    #[error("invalid address {0:?}")]
    BadAddress(String),

    #[error("too many digipeaters ({0})")]
    TooManyDigipeaters(usize),

    #[error("frame truncated")]
    Truncated,

    #[error("not a UI frame")]
    NotUi,
}

#[derive(Debug, Error)]
pub enum RadioError {
    #[error("radio link unavailable")]
    Unavailable,

    #[error("packet too large for radio ({0} bytes)")]
    PacketTooLarge(usize),

    #[error("radio transmission failed")]
    TransmissionFailed,
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("phone link not connected")]
    NotConnected,

    #[error("phone link write failed: {0}")]
    WriteFailed(String),

    #[error("advertising failed: {0}")]
    Advertising(String),
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("unknown bridge profile {0}")]
    UnknownProfile(u8),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Frame(#[from] FrameError),
}
