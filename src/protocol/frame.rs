/// Encoding of log-read requests and decoding of log notifications
use crate::error::FrameError;
use crate::models::{FrameHeader, SensorDestination};

use super::{FRAME_LEN, LOG_READ};

/// A notification that passed size and destination checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFrame {
    pub header: FrameHeader,
    pub timestamp: u32,
    pub value: u32,
}

/// Build the log-read request frame.
///
/// # Arguments
/// * `destination` - Sensor whose log is requested, repeated in bytes 0 and 1
/// * `range_start` - Oldest sample to return, in epoch seconds
/// * `now` - Current time handed to the tag, in epoch seconds
///
/// # Returns
/// The 11-byte frame to write to the NUS RX characteristic
pub fn encode_request(
    destination: SensorDestination,
    range_start: u32,
    now: u32,
) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    // Header: destination, source, opcode
    frame[0] = destination.as_byte();
    frame[1] = destination.as_byte();
    frame[2] = LOG_READ;
    // Payload: big-endian current time, then range start
    frame[3..7].copy_from_slice(&now.to_be_bytes());
    frame[7..11].copy_from_slice(&range_start.to_be_bytes());
    frame
}

/// Decode a notification addressed to `expected`
///
/// # Arguments
/// * `data` - Raw notification bytes from the NUS TX characteristic
/// * `expected` - Destination the running session asked for
///
/// # Returns
/// * `Ok(DecodedFrame)` - Header plus big-endian timestamp and value
/// * `Err(FrameError)` - If the frame is not 11 bytes or addressed elsewhere
pub fn decode_notification(
    data: &[u8],
    expected: SensorDestination,
) -> Result<DecodedFrame, FrameError> {
    // Check the frame size
    let data: &[u8; FRAME_LEN] = data
        .try_into()
        .map_err(|_| FrameError::WrongSize(data.len()))?;

    // Reject frames addressed to another sensor
    if data[0] != expected.as_byte() {
        return Err(FrameError::WrongDestination {
            expected: expected.as_byte(),
            actual: data[0],
        });
    }

    Ok(DecodedFrame {
        header: FrameHeader {
            destination: data[0],
            source: data[1],
            command: data[2],
        },
        timestamp: u32::from_be_bytes([data[3], data[4], data[5], data[6]]),
        value: u32::from_be_bytes([data[7], data[8], data[9], data[10]]),
    })
}
