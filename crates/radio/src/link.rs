use async_trait::async_trait;

use crate::{LinkError, RadioError};

/// LoRa modem. Sends are fire-and-forget; rate limiting belongs to callers.
#[async_trait]
pub trait RadioLink: Send {
    async fn send_packet(&mut self, packet: &str) -> Result<(), RadioError>;
}

/// Device side of the GATT service the phone connects to
#[async_trait]
pub trait PhoneLink: Send {
    /// Writes `data` to the notify characteristic
    async fn notify(&mut self, data: &[u8]) -> Result<(), LinkError>;

    fn start_advertising(&mut self) -> Result<(), LinkError>;
}

#[async_trait]
impl<T: RadioLink + ?Sized> RadioLink for Box<T> {
    async fn send_packet(&mut self, packet: &str) -> Result<(), RadioError> {
        (**self).send_packet(packet).await
    }
}

#[async_trait]
impl<T: PhoneLink + ?Sized> PhoneLink for Box<T> {
    async fn notify(&mut self, data: &[u8]) -> Result<(), LinkError> {
        (**self).notify(data).await
    }

    fn start_advertising(&mut self) -> Result<(), LinkError> {
        (**self).start_advertising()
    }
}
