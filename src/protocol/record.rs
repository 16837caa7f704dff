/// Classification of decoded notifications
use crate::models::LogRecord;

use super::frame::DecodedFrame;
use super::END_OF_LOG;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOrEnd {
    Record(LogRecord),
    EndOfStream,
}

/// A frame whose timestamp and value are both all-ones ends the log;
/// any other frame is a record.
pub fn classify(frame: &DecodedFrame) -> RecordOrEnd {
    if frame.timestamp == END_OF_LOG && frame.value == END_OF_LOG {
        RecordOrEnd::EndOfStream
    } else {
        RecordOrEnd::Record(LogRecord {
            header: frame.header,
            timestamp: frame.timestamp,
            value: frame.value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FrameHeader;

    fn frame(destination: u8, timestamp: u32, value: u32) -> DecodedFrame {
        DecodedFrame {
            header: FrameHeader {
                destination,
                source: destination,
                command: 0x10,
            },
            timestamp,
            value,
        }
    }

    #[test]
    fn end_marker_for_every_destination() {
        for destination in [0x30, 0x31, 0x32, 0x3A] {
            assert_eq!(
                classify(&frame(destination, END_OF_LOG, END_OF_LOG)),
                RecordOrEnd::EndOfStream
            );
        }
    }

    #[test]
    fn half_sentinel_is_still_a_record() {
        let RecordOrEnd::Record(record) = classify(&frame(0x30, END_OF_LOG, 7)) else {
            panic!("expected a record");
        };
        assert_eq!(record.timestamp, END_OF_LOG);
        assert_eq!(record.value, 7);

        assert!(matches!(
            classify(&frame(0x30, 7, END_OF_LOG)),
            RecordOrEnd::Record(_)
        ));
    }

    #[test]
    fn record_keeps_exact_fields() {
        let input = frame(0x31, 100, 20);
        assert_eq!(
            classify(&input),
            RecordOrEnd::Record(LogRecord {
                header: input.header,
                timestamp: 100,
                value: 20,
            })
        );
    }
}
