/// Transport seam between the log session and a BLE stack
use async_trait::async_trait;
use bluer::Uuid;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Something that happened on an open link, delivered in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Notification(Vec<u8>),
    Disconnected,
}

/// Receiving half of a link. A closed channel means the link is gone.
pub type LinkEvents = mpsc::UnboundedReceiver<LinkEvent>;

#[async_trait]
pub trait Transport: Send + Sync {
    type Connection: Connection;

    /// Open a connection to the device at `address`.
    ///
    /// Implementations may take as long as the device needs to show up;
    /// the caller bounds the wait.
    async fn connect(&self, address: &str)
        -> Result<(Self::Connection, LinkEvents), TransportError>;
}

#[async_trait]
pub trait Connection: Send {
    /// Forward notifications of `characteristic` into the link events
    async fn subscribe(&mut self, characteristic: Uuid) -> Result<(), TransportError>;

    async fn write(&mut self, characteristic: Uuid, data: &[u8]) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}
