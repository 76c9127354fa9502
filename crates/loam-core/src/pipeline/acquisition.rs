use embassy_sync::channel::TrySendError;
use embassy_time::{Duration, Ticker};
use log::{debug, info, warn};

use super::RawSender;
use crate::app_state::SystemStatus;
use crate::records::{INVALID_TIMESTAMP, RawSample};
use crate::sensors::SensorSet;
use crate::sensors::clock::Clock;

/// Successful readings between two debug summaries
const SUMMARY_EVERY: u32 = 10;

/// What happened to the sample of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Queued,
    /// Raw queue was full
    Dropped,
    /// Clock could not be read; the sample never leaves acquisition
    InvalidTimestamp,
}

/// Fastest stage: one timestamped [`RawSample`] per tick, never blocking
/// on downstream consumers.
pub struct Acquisition<'a, C: Clock, S: SensorSet> {
    clock: C,
    sensors: S,
    raw: RawSender<'a>,
    status: &'a SystemStatus,
    queued: u32,
}

impl<'a, C: Clock, S: SensorSet> Acquisition<'a, C, S> {
    pub fn new(clock: C, sensors: S, raw: RawSender<'a>, status: &'a SystemStatus) -> Self {
        Self {
            clock,
            sensors,
            raw,
            status,
            queued: 0,
        }
    }

    pub fn sensors(&self) -> &S {
        &self.sensors
    }

    /// Brings the sensors up and logs a startup report.
    ///
    /// Sensors that fail here stay in the set and are retried on read.
    pub async fn start(&mut self, interval: Duration) {
        let available = self.sensors.initialize_all().await;
        info!(
            "Acquisition: {}/{} sensors available",
            available,
            self.sensors.len()
        );

        match self.clock.lost_power().await {
            Ok(true) => warn!("RTC lost power, samples are invalid until the next time sync"),
            Ok(false) => {}
            Err(e) => warn!("RTC check failed: {}", e),
        }

        let budget = self.sensors.total_measurement_time_ms() as u64;
        if budget > interval.as_millis() {
            warn!(
                "Sensor latency {} ms exceeds the {} ms sample interval",
                budget,
                interval.as_millis()
            );
        }

        self.sensors.probe_report().await;
    }

    /// Produces and enqueues one sample.
    pub async fn tick(&mut self) -> TickOutcome {
        let timestamp = match self.clock.now().await {
            Ok(timestamp) => timestamp,
            Err(e) => {
                warn!("Clock read failed: {}", e);
                self.status.record_failed_reading();
                INVALID_TIMESTAMP
            }
        };

        // Sensors are read even without a timestamp so their health stays current
        let mut sample = RawSample::new(timestamp);
        self.sensors.read_all(&mut sample).await;

        if !sample.has_valid_timestamp() {
            return TickOutcome::InvalidTimestamp;
        }

        match self.raw.try_send(sample) {
            Ok(()) => {
                self.status.record_reading();
                self.queued = self.queued.wrapping_add(1);
                if self.queued % SUMMARY_EVERY == 0 {
                    debug!(
                        "Acquisition: {} readings, {} failed",
                        self.status.total_readings(),
                        self.status.failed_readings()
                    );
                }
                TickOutcome::Queued
            }
            Err(TrySendError::Full(_)) => {
                warn!("Raw sample queue full, sample {} dropped", timestamp);
                self.status.record_failed_reading();
                TickOutcome::Dropped
            }
        }
    }

    /// Runs forever on absolute tick boundaries, so read latency never
    /// accumulates into drift.
    pub async fn run(&mut self, interval: Duration) -> ! {
        self.start(interval).await;

        let mut ticker = Ticker::every(interval);
        loop {
            self.tick().await;
            ticker.next().await;
        }
    }
}
