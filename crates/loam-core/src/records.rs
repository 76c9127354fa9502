//! Record types that flow through the pipeline.
//!
//! - [`RawSample`]: one instant-in-time observation set, produced by acquisition
//! - [`StatisticsRecord`]: one window's min/max/mean reduction, produced by aggregation
//!
//! Every channel slot is an `f32` where `NaN` marks "no data".

use serde::{Deserialize, Serialize};

/// Number of measurement channels tracked through the pipeline
pub const CHANNEL_COUNT: usize = 4;

/// Timestamp value used to mark a sample whose time could not be read
pub const INVALID_TIMESTAMP: u32 = 0;

/// One measurement type tracked independently through the pipeline.
///
/// The declaration order is the fixed column order of the CSV file and the
/// key order of the upload payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Measurement {
    /// Soil probe temperature (DS18B20), °C
    ProbeTemperature,
    /// Air temperature (SHT40), °C
    AirTemperature,
    /// Relative air humidity (SHT40), %RH
    AirHumidity,
    /// Raw soil moisture ADC counts (SEN0193), 0..4095
    SoilMoisture,
}

impl Measurement {
    /// All channels in column order
    pub const ALL: [Measurement; CHANNEL_COUNT] = [
        Self::ProbeTemperature,
        Self::AirTemperature,
        Self::AirHumidity,
        Self::SoilMoisture,
    ];

    /// Slot of this channel inside a sample's value array
    pub const fn index(self) -> usize {
        match self {
            Self::ProbeTemperature => 0,
            Self::AirTemperature => 1,
            Self::AirHumidity => 2,
            Self::SoilMoisture => 3,
        }
    }

    /// Fixed number of decimal places used when this channel is rendered
    pub const fn decimals(self) -> usize {
        match self {
            Self::ProbeTemperature | Self::AirTemperature => 2,
            Self::AirHumidity => 1,
            Self::SoilMoisture => 0,
        }
    }

    /// Column prefix in the CSV header (`<prefix>_avg,<prefix>_min,<prefix>_max`)
    pub const fn column_prefix(self) -> &'static str {
        match self {
            Self::ProbeTemperature => "ds18b20",
            Self::AirTemperature => "sht40_temp",
            Self::AirHumidity => "sht40_hum",
            Self::SoilMoisture => "soil",
        }
    }

    /// Object key in the JSON upload payload
    pub const fn payload_key(self) -> &'static str {
        match self {
            Self::ProbeTemperature => "ds18b20",
            Self::AirTemperature => "sht40_temp",
            Self::AirHumidity => "sht40_humidity",
            Self::SoilMoisture => "soil_moisture",
        }
    }
}

/// One instant-in-time observation set.
///
/// A sample starts with every channel at `NaN`; each sensor fills in the
/// channel(s) it owns. The timestamp is written by acquisition only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    /// UTC seconds, [`INVALID_TIMESTAMP`] when the clock could not be read
    pub timestamp: u32,
    /// One value per channel, indexed by [`Measurement::index`]
    pub values: [f32; CHANNEL_COUNT],
}

impl Default for RawSample {
    fn default() -> Self {
        Self {
            timestamp: INVALID_TIMESTAMP,
            values: [f32::NAN; CHANNEL_COUNT],
        }
    }
}

impl RawSample {
    /// Creates an empty sample stamped with `timestamp`.
    pub fn new(timestamp: u32) -> Self {
        Self {
            timestamp,
            ..Self::default()
        }
    }

    /// Returns whether the sample carries a usable timestamp.
    pub const fn has_valid_timestamp(&self) -> bool {
        self.timestamp != INVALID_TIMESTAMP
    }

    pub fn get(&self, channel: Measurement) -> f32 {
        self.values[channel.index()]
    }

    pub fn set(&mut self, channel: Measurement, value: f32) {
        self.values[channel.index()] = value;
    }

    /// Builder-style setter, mostly useful for synthetic data
    pub fn with(mut self, channel: Measurement, value: f32) -> Self {
        self.set(channel, value);
        self
    }
}

/// Min/max/mean summary of one channel over a window.
///
/// Either all three values are `NaN` (no data) or `min <= mean <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

impl ChannelStats {
    /// Summary of a channel that received no values
    pub const EMPTY: Self = Self {
        min: f32::NAN,
        max: f32::NAN,
        mean: f32::NAN,
    };

    /// Returns whether this channel had at least one value in the window.
    pub fn has_data(&self) -> bool {
        !self.mean.is_nan()
    }
}

impl Default for ChannelStats {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// One aggregation window's reduction.
///
/// Produced once per non-empty window and handed to both storage and upload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatisticsRecord {
    /// Earliest sample timestamp folded into this record (UTC seconds)
    pub window_start: u32,
    /// Latest sample timestamp folded into this record (UTC seconds)
    pub window_end: u32,
    /// Number of samples folded in, regardless of per-channel gaps
    pub sample_count: u32,
    /// Per-channel summaries, indexed by [`Measurement::index`]
    pub channels: [ChannelStats; CHANNEL_COUNT],
}

impl StatisticsRecord {
    pub fn channel(&self, channel: Measurement) -> &ChannelStats {
        &self.channels[channel.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sample_is_invalid_and_empty() {
        let sample = RawSample::default();
        assert!(!sample.has_valid_timestamp(), "default sample must be unstamped");
        assert!(
            sample.values.iter().all(|v| v.is_nan()),
            "every channel must start as NaN"
        );
    }

    #[test]
    fn test_channel_indices_match_column_order() {
        for (position, channel) in Measurement::ALL.iter().enumerate() {
            assert_eq!(channel.index(), position, "{:?} out of order", channel);
        }
    }

    #[test]
    fn test_sample_set_only_touches_one_slot() {
        let sample = RawSample::new(1_700_000_000).with(Measurement::AirHumidity, 55.5);

        assert_eq!(sample.get(Measurement::AirHumidity), 55.5);
        assert!(sample.get(Measurement::ProbeTemperature).is_nan());
        assert!(sample.get(Measurement::AirTemperature).is_nan());
        assert!(sample.get(Measurement::SoilMoisture).is_nan());
        assert_eq!(sample.timestamp, 1_700_000_000);
    }

    #[test]
    fn test_empty_channel_stats_have_no_data() {
        assert!(!ChannelStats::EMPTY.has_data());
        let filled = ChannelStats {
            min: 1.0,
            max: 3.0,
            mean: 2.0,
        };
        assert!(filled.has_data());
    }
}
