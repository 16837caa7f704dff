use std::fmt;
use std::str::FromStr;

use crate::error::RetrievalError;

/// Sensor channel addressed by a log read.
///
/// The discriminant is the byte the RuuviTag firmware uses as destination
/// and source in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum SensorDestination {
    Temperature = 0x30,
    Humidity = 0x31,
    #[default]
    Pressure = 0x32,
    All = 0x3A,
}

impl SensorDestination {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x30 => Some(Self::Temperature),
            0x31 => Some(Self::Humidity),
            0x32 => Some(Self::Pressure),
            0x3A => Some(Self::All),
            _ => None,
        }
    }
}

impl FromStr for SensorDestination {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "temperature" => Ok(Self::Temperature),
            "humidity" => Ok(Self::Humidity),
            "pressure" | "air_pressure" => Ok(Self::Pressure),
            other => Err(RetrievalError::InvalidArgument(format!(
                "unknown sensor kind '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for SensorDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Pressure => "pressure",
            Self::All => "all",
        };
        f.write_str(name)
    }
}

/// First three bytes of every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub destination: u8,
    pub source: u8,
    pub command: u8,
}

/// One historical measurement read from the tag's log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecord {
    pub header: FrameHeader,
    pub timestamp: u32,
    pub value: u32,
}

impl LogRecord {
    /// Sensor that produced the record. For `All` reads the destination
    /// byte stays 0x3A and the source byte names the actual sensor.
    pub fn sensor(&self) -> Option<SensorDestination> {
        match SensorDestination::from_byte(self.header.source) {
            Some(SensorDestination::All) | None => None,
            sensor => sensor,
        }
    }

    /// Value in the sensor's unit. The tag logs signed hundredths.
    pub fn scaled_value(&self) -> f64 {
        f64::from(self.value as i32) / 100.0
    }

    /// Whether the scaled value is physically possible for its sensor
    pub fn is_plausible(&self) -> bool {
        let value = self.scaled_value();
        match self.sensor() {
            Some(SensorDestination::Humidity) => (0.0..=100.0).contains(&value),
            Some(SensorDestination::Pressure) => (0.0..=10000.0).contains(&value),
            _ => true,
        }
    }
}

/// Validated arguments of one retrieval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRequest {
    pub device_address: String,
    pub destination: SensorDestination,
    pub range_start: u32,
}

impl LogRequest {
    /// Validate raw caller input. Unknown sensor kinds and range starts
    /// that do not fit an unsigned 32-bit timestamp are rejected.
    pub fn new(
        device_address: &str,
        range_start_epoch_secs: i64,
        sensor_kind: &str,
    ) -> Result<Self, RetrievalError> {
        let destination = sensor_kind.parse::<SensorDestination>()?;
        let range_start = u32::try_from(range_start_epoch_secs).map_err(|_| {
            RetrievalError::InvalidArgument(format!(
                "range start {} is not a valid timestamp",
                range_start_epoch_secs
            ))
        })?;
        let device_address = device_address.trim();
        if device_address.is_empty() {
            return Err(RetrievalError::InvalidArgument(
                "device address is empty".to_string(),
            ));
        }

        Ok(LogRequest {
            device_address: device_address.to_string(),
            destination,
            range_start,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(source: u8, value: u32) -> LogRecord {
        LogRecord {
            header: FrameHeader {
                destination: 0x3A,
                source,
                command: 0x10,
            },
            timestamp: 1_700_000_000,
            value,
        }
    }

    #[test]
    fn parses_sensor_kinds() {
        assert_eq!("all".parse::<SensorDestination>(), Ok(SensorDestination::All));
        assert_eq!("Temperature".parse::<SensorDestination>(), Ok(SensorDestination::Temperature));
        assert_eq!("humidity".parse::<SensorDestination>(), Ok(SensorDestination::Humidity));
        assert_eq!("pressure".parse::<SensorDestination>(), Ok(SensorDestination::Pressure));
        assert!(matches!(
            "co2".parse::<SensorDestination>(),
            Err(RetrievalError::InvalidArgument(_))
        ));
        assert_eq!(SensorDestination::default(), SensorDestination::Pressure);
    }

    #[test]
    fn destination_bytes() {
        assert_eq!(SensorDestination::Temperature.as_byte(), 0x30);
        assert_eq!(SensorDestination::Humidity.as_byte(), 0x31);
        assert_eq!(SensorDestination::Pressure.as_byte(), 0x32);
        assert_eq!(SensorDestination::All.as_byte(), 0x3A);
        assert_eq!(SensorDestination::from_byte(0x33), None);
    }

    #[test]
    fn scaled_value_is_signed_hundredths() {
        assert_eq!(record(0x30, 2150).scaled_value(), 21.5);
        assert_eq!(record(0x30, (-250i32) as u32).scaled_value(), -2.5);
    }

    #[test]
    fn plausibility_ranges() {
        assert!(record(0x31, 4550).is_plausible());
        assert!(!record(0x31, 10_100).is_plausible());
        assert!(record(0x32, 101_325).is_plausible());
        assert!(!record(0x32, (-1i32) as u32).is_plausible());
        assert!(record(0x30, (-4000i32) as u32).is_plausible());
    }

    #[test]
    fn log_request_validation() {
        let request = LogRequest::new(" C8:25:2D:8E:9C:31 ", 1_700_000_000, "all").unwrap();
        assert_eq!(request.device_address, "C8:25:2D:8E:9C:31");
        assert_eq!(request.destination, SensorDestination::All);
        assert_eq!(request.range_start, 1_700_000_000);

        assert!(LogRequest::new("C8:25:2D:8E:9C:31", -1, "all").is_err());
        assert!(LogRequest::new("C8:25:2D:8E:9C:31", 1 << 33, "all").is_err());
        assert!(LogRequest::new("", 0, "all").is_err());
        assert_eq!(
            LogRequest::new("C8:25:2D:8E:9C:31", 0, "voltage"),
            Err(RetrievalError::InvalidArgument(
                "unknown sensor kind 'voltage'".to_string()
            ))
        );
    }
}
