/// Error types for frame decoding, BLE transports and log retrieval
use thiserror::Error;

/// A notification that cannot be decoded for the running session.
///
/// These are never fatal: the frame is dropped and the session keeps waiting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("wrong frame size: expected 11 bytes, got {0}")]
    WrongSize(usize),

    #[error("wrong destination: expected 0x{expected:02X}, got 0x{actual:02X}")]
    WrongDestination { expected: u8, actual: u8 },
}

/// Errors raised by a BLE transport implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("invalid Bluetooth address: {0}")]
    InvalidAddress(String),

    #[error("device {0} not found")]
    DeviceNotFound(String),

    #[error("characteristic {0} not found")]
    CharacteristicNotFound(String),

    /// The link dropped before the connection was ready
    #[error("Device disconnected")]
    Disconnected,

    /// Fault reported by the underlying stack or driver
    #[error("{0}")]
    Protocol(String),
}

impl From<bluer::Error> for TransportError {
    fn from(err: bluer::Error) -> Self {
        TransportError::Protocol(err.to_string())
    }
}

/// Terminal failure of a retrieval.
///
/// The `Display` text is the reason carried by the `failed` event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetrievalError {
    #[error("Could not find the device")]
    TransportTimeout,

    #[error("{0}")]
    Transport(String),

    #[error("Device disconnected")]
    UnexpectedDisconnect,

    #[error("Could not start new thread")]
    SupervisorBusy,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Log retrieval cancelled")]
    Cancelled,

    #[error("Log retrieval timed out")]
    SessionTimeout,
}

impl From<TransportError> for RetrievalError {
    fn from(err: TransportError) -> Self {
        RetrievalError::Transport(err.to_string())
    }
}
