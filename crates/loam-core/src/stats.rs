//! Running statistics used by the aggregation stage
//!
//! [`RunningStats`] reduces one channel; [`WindowAccumulator`] holds one per
//! channel plus the window bounds and sample count. Both live entirely inside
//! the aggregation task, so nothing here is synchronized.

use crate::records::{CHANNEL_COUNT, ChannelStats, RawSample, StatisticsRecord};

/// Min/max/sum/count reduction of a single channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunningStats {
    min: f32,
    max: f32,
    /// Kept in f64 so an hour of 1 Hz readings does not lose precision
    sum: f64,
    count: u32,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningStats {
    pub const fn new() -> Self {
        Self {
            min: f32::INFINITY,
            max: f32::NEG_INFINITY,
            sum: 0.0,
            count: 0,
        }
    }

    /// Folds `value` in. `NaN` values are ignored.
    pub fn add_value(&mut self, value: f32) {
        if value.is_nan() {
            return;
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value as f64;
        self.count += 1;
    }

    /// Arithmetic mean, or `NaN` when nothing was added.
    ///
    /// The result is clamped into `[min, max]` so f64 to f32 rounding can
    /// never place the mean outside the observed range.
    pub fn mean(&self) -> f32 {
        if self.count == 0 {
            return f32::NAN;
        }

        let mean = (self.sum / self.count as f64) as f32;
        mean.clamp(self.min, self.max)
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Summary for a statistics record; all `NaN` when the channel is empty.
    pub fn summary(&self) -> ChannelStats {
        if self.count == 0 {
            return ChannelStats::EMPTY;
        }

        ChannelStats {
            min: self.min,
            max: self.max,
            mean: self.mean(),
        }
    }
}

/// Per-window reduction state of the aggregation stage.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowAccumulator {
    channels: [RunningStats; CHANNEL_COUNT],
    window_start: u32,
    window_end: u32,
    sample_count: u32,
}

impl Default for WindowAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowAccumulator {
    pub const fn new() -> Self {
        Self {
            channels: [RunningStats::new(); CHANNEL_COUNT],
            window_start: u32::MAX,
            window_end: 0,
            sample_count: 0,
        }
    }

    /// Folds one sample into every channel and widens the window bounds.
    pub fn fold(&mut self, sample: &RawSample) {
        for (stats, value) in self.channels.iter_mut().zip(sample.values.iter()) {
            stats.add_value(*value);
        }

        self.window_start = self.window_start.min(sample.timestamp);
        self.window_end = self.window_end.max(sample.timestamp);
        self.sample_count += 1;
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }

    /// Builds the record for the current window, if any sample was folded in.
    ///
    /// The accumulator is reset in both cases, so the next window always
    /// starts from the same state as a freshly constructed one.
    pub fn finish(&mut self) -> Option<StatisticsRecord> {
        let record = (!self.is_empty()).then(|| StatisticsRecord {
            window_start: self.window_start,
            window_end: self.window_end,
            sample_count: self.sample_count,
            channels: self.channels.map(|stats| stats.summary()),
        });

        self.reset();
        record
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Measurement;

    #[test]
    fn test_running_stats_ignores_nan() {
        let mut stats = RunningStats::new();
        stats.add_value(20.0);
        stats.add_value(f32::NAN);
        stats.add_value(22.0);

        assert_eq!(stats.count(), 2, "NaN must not be counted");
        assert_eq!(stats.min(), 20.0);
        assert_eq!(stats.max(), 22.0);
        assert_eq!(stats.mean(), 21.0);
    }

    #[test]
    fn test_running_stats_empty_mean_is_nan() {
        let stats = RunningStats::new();
        assert!(stats.mean().is_nan());

        let summary = stats.summary();
        assert!(summary.min.is_nan() && summary.max.is_nan() && summary.mean.is_nan());
    }

    #[test]
    fn test_running_stats_mean_stays_within_bounds() {
        let mut stats = RunningStats::new();
        for _ in 0..3600 {
            stats.add_value(0.1);
        }

        let mean = stats.mean();
        assert!(
            mean >= stats.min() && mean <= stats.max(),
            "mean {} escaped [{}, {}]",
            mean,
            stats.min(),
            stats.max()
        );
    }

    #[test]
    fn test_window_matches_reference_reduction() {
        let readings = [12.5_f32, 13.25, f32::NAN, 11.0, 14.75];
        let mut window = WindowAccumulator::new();

        for (offset, value) in readings.iter().enumerate() {
            let sample = RawSample::new(1_000 + offset as u32)
                .with(Measurement::AirTemperature, *value);
            window.fold(&sample);
        }

        let record = window.finish().expect("non-empty window must emit");
        let finite: [f32; 4] = [12.5, 13.25, 11.0, 14.75];
        let expected_mean = finite.iter().sum::<f32>() / finite.len() as f32;

        let air = record.channel(Measurement::AirTemperature);
        assert_eq!(air.min, 11.0);
        assert_eq!(air.max, 14.75);
        assert!((air.mean - expected_mean).abs() < 1e-5);
        assert_eq!(record.sample_count, 5, "count includes samples with gaps");
        assert_eq!(record.window_start, 1_000);
        assert_eq!(record.window_end, 1_004);

        let soil = record.channel(Measurement::SoilMoisture);
        assert!(!soil.has_data(), "untouched channel must be all NaN");
    }

    #[test]
    fn test_empty_window_emits_nothing() {
        let mut window = WindowAccumulator::new();
        assert!(window.finish().is_none());
    }

    #[test]
    fn test_finish_resets_to_fresh_state() {
        let mut window = WindowAccumulator::new();
        window.fold(&RawSample::new(50).with(Measurement::ProbeTemperature, 99.0));
        let _ = window.finish();

        assert_eq!(window, WindowAccumulator::new(), "finish must reset");

        window.fold(&RawSample::new(60).with(Measurement::ProbeTemperature, 1.0));
        let record = window.finish().expect("second window must emit");
        let probe = record.channel(Measurement::ProbeTemperature);
        assert_eq!(probe.max, 1.0, "max must not leak from the previous window");
        assert_eq!(record.window_start, 60);
        assert_eq!(record.sample_count, 1);
    }
}
