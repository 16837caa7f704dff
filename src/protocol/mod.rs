//! RuuviTag log-read protocol over the Nordic UART Service
//!
//! Requests and notifications share one 11-byte big-endian layout:
//! - Byte 0: Destination (sensor being read)
//! - Byte 1: Source (mirrors the destination in requests)
//! - Byte 2: Command
//! - Bytes 3-6: Timestamp (request: current time, notification: sample time)
//! - Bytes 7-10: Value (request: lower bound of the log range)

pub mod frame;
pub mod record;

use bluer::Uuid;

pub use frame::{decode_notification, encode_request};
pub use record::{classify, RecordOrEnd};

/// NUS RX characteristic, written by the client
pub const NUS_RX_CHARACTERISTIC: Uuid = Uuid::from_u128(0x6E400002_B5A3_F393_E0A9_E50E24DCCA9E);
/// NUS TX characteristic, notified by the tag
pub const NUS_TX_CHARACTERISTIC: Uuid = Uuid::from_u128(0x6E400003_B5A3_F393_E0A9_E50E24DCCA9E);

pub const FRAME_LEN: usize = 11;
pub const LOG_READ: u8 = 0x11;
/// Timestamp and value both carry this on the end-of-log frame
pub const END_OF_LOG: u32 = 0xFFFF_FFFF;
