//! Logger configuration
//!
//! Borrowed string fields keep the config zero-copy, so it can either be
//! built from compile-time constants or decoded straight out of a postcard
//! blob read from storage.

use embassy_time::Duration;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(bound(deserialize = "'de: 'a"))]
pub struct Config<'a> {
    #[serde(borrow)]
    pub internet: InternetConfig<'a>,
    #[serde(borrow)]
    pub collector: CollectorConfig<'a>,
    #[serde(borrow)]
    pub time: TimeConfig<'a>,
    pub pipeline: PipelineConfig,
}

impl Default for Config<'_> {
    fn default() -> Self {
        Self {
            internet: InternetConfig::default(),
            collector: CollectorConfig::default(),
            time: TimeConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Config blob could not be decoded: {0}")]
    Decode(postcard::Error),
    #[error("Config could not be encoded: {0}")]
    Encode(postcard::Error),
    #[error("Invalid config: {0}")]
    Invalid(&'static str),
}

impl<'a> Config<'a> {
    /// Decodes a postcard-encoded config, borrowing strings from `bytes`.
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self, ConfigError> {
        let config: Self = postcard::from_bytes(bytes).map_err(ConfigError::Decode)?;
        config.validate()?;
        Ok(config)
    }

    /// Encodes the config into `buffer`, returning the used part.
    pub fn to_bytes<'b>(&self, buffer: &'b mut [u8]) -> Result<&'b mut [u8], ConfigError> {
        postcard::to_slice(self, buffer).map_err(ConfigError::Encode)
    }

    /// Rejects settings that would stall or spin the pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let pipeline = &self.pipeline;
        if pipeline.sample_interval_ms == 0 {
            return Err(ConfigError::Invalid("sample interval must be non-zero"));
        }
        if pipeline.window_interval_ms < pipeline.sample_interval_ms {
            return Err(ConfigError::Invalid(
                "aggregation window shorter than the sample interval",
            ));
        }
        if pipeline.upload_interval_ms == 0 || self.time.resync_interval_ms == 0 {
            return Err(ConfigError::Invalid("periodic intervals must be non-zero"));
        }
        if self.time.attempts == 0 {
            return Err(ConfigError::Invalid("time sync needs at least one attempt"));
        }
        if self.collector.enabled && self.collector.broker.is_empty() {
            return Err(ConfigError::Invalid("collector enabled without a broker"));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InternetConfig<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
    /// Upper bound for bringing the link up, in milliseconds
    pub connect_timeout_ms: u32,
}

impl Default for InternetConfig<'_> {
    fn default() -> Self {
        Self {
            ssid: "",
            password: "",
            connect_timeout_ms: 20_000,
        }
    }
}

impl InternetConfig<'_> {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms as u64)
    }
}

/// Remote MQTT collector settings
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CollectorConfig<'a> {
    /// When false, no upload task runs and aggregation stops feeding the
    /// upload queue; records only go to storage
    pub enabled: bool,
    pub broker: &'a str,
    pub port: u16,
    pub client_id: &'a str,
    /// Empty for anonymous brokers
    pub username: &'a str,
    pub password: &'a str,
    pub topic: &'a str,
    /// Identifier written into every payload
    pub device_id: &'a str,
}

impl Default for CollectorConfig<'_> {
    fn default() -> Self {
        Self {
            enabled: true,
            broker: "localhost",
            port: 1883,
            client_id: "loam-logger",
            username: "",
            password: "",
            topic: "loam/data",
            device_id: "loam-logger",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TimeConfig<'a> {
    pub ntp_server: &'a str,
    /// Delay before the first sync attempt after boot
    pub settle_delay_ms: u32,
    /// Attempts in the startup phase
    pub attempts: u8,
    pub retry_delay_ms: u32,
    /// Accepted difference between the written and read-back clock, in seconds
    pub readback_tolerance_secs: u32,
    pub resync_interval_ms: u32,
}

impl Default for TimeConfig<'_> {
    fn default() -> Self {
        Self {
            ntp_server: "pool.ntp.org",
            settle_delay_ms: 5_000,
            attempts: 3,
            retry_delay_ms: 30_000,
            readback_tolerance_secs: 2,
            resync_interval_ms: 86_400_000,
        }
    }
}

impl TimeConfig<'_> {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms as u64)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms as u64)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_millis(self.resync_interval_ms as u64)
    }
}

/// Cadences and bounded waits of the four pipeline stages
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub sample_interval_ms: u32,
    pub window_interval_ms: u32,
    pub upload_interval_ms: u32,
    /// Bounded wait when aggregation hands a record to storage and upload
    pub stats_send_timeout_ms: u32,
    /// Bounded wait for the storage mutex
    pub storage_lock_timeout_ms: u32,
    /// Pause between consecutive publishes in one upload cycle
    pub publish_spacing_ms: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 1_000,
            window_interval_ms: 60_000,
            upload_interval_ms: 300_000,
            stats_send_timeout_ms: 1_000,
            storage_lock_timeout_ms: 5_000,
            publish_spacing_ms: 100,
        }
    }
}

impl PipelineConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms as u64)
    }

    pub fn window_interval(&self) -> Duration {
        Duration::from_millis(self.window_interval_ms as u64)
    }

    pub fn upload_interval(&self) -> Duration {
        Duration::from_millis(self.upload_interval_ms as u64)
    }

    pub fn stats_send_timeout(&self) -> Duration {
        Duration::from_millis(self.stats_send_timeout_ms as u64)
    }

    pub fn storage_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_lock_timeout_ms as u64)
    }

    pub fn publish_spacing(&self) -> Duration {
        Duration::from_millis(self.publish_spacing_ms as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.pipeline.sample_interval(), Duration::from_secs(1));
        assert_eq!(config.pipeline.window_interval(), Duration::from_secs(60));
        assert_eq!(config.pipeline.upload_interval(), Duration::from_secs(300));
        assert_eq!(config.time.resync_interval(), Duration::from_secs(86_400));
        assert_eq!(config.internet.connect_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn test_blob_borrows_strings() {
        let mut config = Config::default();
        config.internet.ssid = "greenhouse";
        config.collector.topic = "farm/bed-3";

        let mut buffer = [0u8; 256];
        let encoded = config.to_bytes(&mut buffer).expect("config fits");
        let encoded: &[u8] = encoded;
        let decoded = Config::from_bytes(encoded).expect("blob decodes");

        assert_eq!(decoded.internet.ssid, "greenhouse");
        assert_eq!(decoded.collector.topic, "farm/bed-3");
        assert_eq!(decoded.pipeline, config.pipeline);
    }

    #[test]
    fn test_window_shorter_than_sample_is_rejected() {
        let mut config = Config::default();
        config.pipeline.window_interval_ms = 500;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_truncated_blob_is_rejected() {
        assert!(matches!(
            Config::from_bytes(&[0x01]),
            Err(ConfigError::Decode(_))
        ));
    }
}
