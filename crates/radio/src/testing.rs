//! In-memory links used by unit tests

use async_trait::async_trait;

use crate::display::DisplaySink;
use crate::link::{PhoneLink, RadioLink};
use crate::{LinkError, RadioError};

#[derive(Debug)]
pub struct MockRadio {
    pub sent: Vec<String>,
    pub available: bool,
}

impl Default for MockRadio {
    fn default() -> Self {
        Self {
            sent: Vec::new(),
            available: true,
        }
    }
}

#[async_trait]
impl RadioLink for MockRadio {
    async fn send_packet(&mut self, packet: &str) -> Result<(), RadioError> {
        if !self.available {
            return Err(RadioError::Unavailable);
        }
        self.sent.push(packet.to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MockPhone {
    pub notified: Vec<Vec<u8>>,
    pub advertising_started: usize,
}

#[async_trait]
impl PhoneLink for MockPhone {
    async fn notify(&mut self, data: &[u8]) -> Result<(), LinkError> {
        self.notified.push(data.to_vec());
        Ok(())
    }

    fn start_advertising(&mut self) -> Result<(), LinkError> {
        self.advertising_started += 1;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingDisplay {
    pub shown: Vec<(String, String)>,
}

impl DisplaySink for RecordingDisplay {
    fn show(&mut self, header: &str, body: &str) {
        self.shown.push((header.to_string(), body.to_string()));
    }
}
