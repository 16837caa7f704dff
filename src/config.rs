use log::debug;
use std::env;
use std::str::FromStr;
use tokio::time::Duration;

use crate::bluetooth::SessionConfig;
use crate::supervisor::SupervisorConfig;
use crate::utils::now_epoch_secs;

// Default lookback when RUUVI_LOG_START is not set
const DEFAULT_LOOKBACK_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub device_address: String,
    pub range_start: i64,
    pub sensor: String,
    pub supervisor: SupervisorConfig,
}

impl ReaderConfig {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        // Load environment variables
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Box<dyn std::error::Error>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let device_address = lookup("RUUVI_DEVICE")
            .map(|value| value.trim().to_uppercase())
            .filter(|value| !value.is_empty())
            .ok_or("RUUVI_DEVICE environment variable not set")?;

        let range_start = match parse_var::<i64, _>(&lookup, "RUUVI_LOG_START")? {
            Some(start) => start,
            None => i64::from(now_epoch_secs()) - DEFAULT_LOOKBACK_SECS,
        };

        let sensor = lookup("RUUVI_SENSOR").unwrap_or_else(|| "pressure".to_string());

        let defaults = SupervisorConfig::default();
        let supervisor = SupervisorConfig {
            busy_retries: parse_var(&lookup, "RUUVI_BUSY_RETRIES")?
                .unwrap_or(defaults.busy_retries),
            busy_retry_interval: parse_secs(&lookup, "RUUVI_BUSY_RETRY_INTERVAL_SECS")?
                .unwrap_or(defaults.busy_retry_interval),
            session: SessionConfig {
                connect_timeout: parse_secs(&lookup, "RUUVI_CONNECT_TIMEOUT_SECS")?
                    .unwrap_or(defaults.session.connect_timeout),
                max_session_duration: parse_secs(&lookup, "RUUVI_SESSION_TIMEOUT_SECS")?
                    .unwrap_or(defaults.session.max_session_duration),
            },
        };

        debug!(
            "Reading {} log of {} from {} ({:?})",
            sensor, device_address, range_start, supervisor
        );

        Ok(ReaderConfig {
            device_address,
            range_start,
            sensor,
            supervisor,
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, Box<dyn std::error::Error>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => match value.trim().parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(format!("{} has an invalid value: '{}'", key, value).into()),
        },
        None => Ok(None),
    }
}

fn parse_secs<F>(lookup: &F, key: &str) -> Result<Option<Duration>, Box<dyn std::error::Error>>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_var::<u64, F>(lookup, key)?.map(Duration::from_secs))
}
