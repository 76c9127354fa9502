//! Synthetic sensors and a host-backed RTC

use std::time::{SystemTime, UNIX_EPOCH};

use loam_core::records::{Measurement, RawSample};
use loam_core::sensors::clock::is_plausible;
use loam_core::sensors::{Clock, ClockError, Sensor, SensorError, SensorHealth};
use log::info;

/// 2000-01-01T00:00:00Z, where a DS1308 restarts after losing its backup cell
const RTC_RESET_TIME: i64 = 946_684_800;

fn host_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

// ---------------------------------------------------------------------------
// Sensors
// ---------------------------------------------------------------------------

/// Slow sinusoid around a baseline, one per channel.
#[derive(Debug, Clone, Copy)]
pub struct Wave {
    pub baseline: f64,
    pub amplitude: f64,
    pub period_secs: f64,
}

impl Wave {
    pub const fn new(baseline: f64, amplitude: f64, period_secs: f64) -> Self {
        Self {
            baseline,
            amplitude,
            period_secs,
        }
    }

    fn at(&self, t: f64) -> f64 {
        self.baseline + self.amplitude * (core::f64::consts::TAU * t / self.period_secs).sin()
    }
}

/// Sensor producing one [`Wave`] per channel, failing every `fail_every`th read.
pub struct SyntheticSensor {
    name: &'static str,
    channels: &'static [Measurement],
    waves: Vec<Wave>,
    fail_every: u32,
    reads: u32,
    health: SensorHealth,
}

impl SyntheticSensor {
    /// `waves` pairs up with `channels` in order.
    pub fn new(name: &'static str, channels: &'static [Measurement], waves: &[Wave]) -> Self {
        Self {
            name,
            channels,
            waves: waves.to_vec(),
            fail_every: 0,
            reads: 0,
            health: SensorHealth::new(),
        }
    }

    /// Makes every `n`th read fail, 0 never.
    pub fn failing_every(mut self, n: u32) -> Self {
        self.fail_every = n;
        self
    }
}

impl Sensor for SyntheticSensor {
    async fn initialize(&mut self) -> Result<(), SensorError> {
        info!("{}: synthetic, {} channel(s)", self.name, self.channels.len());
        self.health.mark_ok();
        Ok(())
    }

    async fn read(&mut self, sample: &mut RawSample) -> Result<(), SensorError> {
        self.reads += 1;
        if self.fail_every != 0 && self.reads % self.fail_every == 0 {
            return Err(self.health.fail(SensorError::ReadFailed {
                sensor: self.name,
                operation: "read",
                details: "injected failure",
            }));
        }

        let t = host_seconds() as f64;
        for (channel, wave) in self.channels.iter().zip(&self.waves) {
            sample.set(*channel, wave.at(t) as f32);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn channels(&self) -> &'static [Measurement] {
        self.channels
    }

    fn is_available(&self) -> bool {
        self.health.is_available()
    }

    fn last_error(&self) -> &str {
        self.health.last_error()
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// RTC running at host speed from an adjustable offset.
///
/// Starts like a board whose backup cell died: counting from 2000-01-01, so
/// every sample is invalid until the first time sync.
pub struct SimClock {
    offset: i64,
    set: bool,
}

impl SimClock {
    pub fn reset() -> Self {
        Self {
            offset: RTC_RESET_TIME - host_seconds(),
            set: false,
        }
    }

    fn read(&self) -> i64 {
        host_seconds() + self.offset
    }
}

impl Clock for SimClock {
    async fn now(&mut self) -> Result<u32, ClockError> {
        let time = u32::try_from(self.read()).map_err(|_| ClockError::InvalidDate)?;
        if !is_plausible(time) {
            return Err(ClockError::Implausible(time));
        }
        Ok(time)
    }

    async fn set_time(&mut self, timestamp: u32) -> Result<(), ClockError> {
        self.offset = timestamp as i64 - host_seconds();
        self.set = true;
        Ok(())
    }

    async fn lost_power(&mut self) -> Result<bool, ClockError> {
        Ok(!self.set)
    }
}
