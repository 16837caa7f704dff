/// Utility functions for timestamps and retrieved-log summaries
use std::collections::BTreeMap;
use time::{format_description, OffsetDateTime};

use crate::models::{LogRecord, SensorDestination};

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS format
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    format_description::parse("[day].[month].[year] - [hour]:[minute]:[second]")
        .ok()
        .and_then(|format| dt.format(&format).ok())
        .unwrap_or_else(|| dt.to_string())
}

/// Format a device timestamp (epoch seconds, UTC)
pub fn format_timestamp(epoch_secs: u32) -> String {
    match OffsetDateTime::from_unix_timestamp(i64::from(epoch_secs)) {
        Ok(dt) => format_datetime(&dt),
        Err(_) => epoch_secs.to_string(),
    }
}

/// Current time as the tag expects it: unsigned 32-bit epoch seconds
pub fn now_epoch_secs() -> u32 {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    u32::try_from(now).unwrap_or(u32::MAX)
}

/// Statistics over one sensor's records in a completed log
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSummary {
    pub samples: usize,
    pub min: f64,
    pub max: f64,
    pub average: f64,
    pub first_timestamp: u32,
    pub last_timestamp: u32,
    /// Records skipped because their value is out of the sensor's range
    pub rejected: usize,
}

/// Summarize completed records per sensor
///
/// Records are grouped by the sensor named in their source byte. Values
/// outside the plausible range are counted as rejected and left out of the
/// statistics. Records with an unknown source are ignored.
pub fn summarize_records(records: &[LogRecord]) -> BTreeMap<SensorDestination, RecordSummary> {
    let mut grouped: BTreeMap<SensorDestination, (Vec<&LogRecord>, usize)> = BTreeMap::new();

    for record in records {
        let Some(sensor) = record.sensor() else {
            continue;
        };
        let entry = grouped.entry(sensor).or_default();
        if record.is_plausible() {
            entry.0.push(record);
        } else {
            entry.1 += 1;
        }
    }

    grouped
        .into_iter()
        .filter(|(_, (accepted, _))| !accepted.is_empty())
        .map(|(sensor, (accepted, rejected))| {
            let values: Vec<f64> = accepted.iter().map(|r| r.scaled_value()).collect();
            let sum: f64 = values.iter().sum();
            let summary = RecordSummary {
                samples: values.len(),
                min: values.iter().copied().fold(f64::INFINITY, f64::min),
                max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                average: (sum / values.len() as f64 * 100.0).round() / 100.0, // 2 decimal places
                // The tag may send records out of order
                first_timestamp: accepted.iter().map(|r| r.timestamp).min().unwrap_or(0),
                last_timestamp: accepted.iter().map(|r| r.timestamp).max().unwrap_or(0),
                rejected,
            };
            (sensor, summary)
        })
        .collect()
}
