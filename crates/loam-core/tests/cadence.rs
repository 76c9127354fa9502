//! Tick cadence of the timed stages under slow work, on the std time driver

mod common;

use common::{NOON, StepClock};
use embassy_futures::block_on;
use embassy_futures::join::join;
use embassy_futures::select::{Either, select};
use embassy_time::{Duration, Instant, Timer};
use loam_core::app_state::SystemStatus;
use loam_core::pipeline::{Acquisition, Aggregation, RawQueue, StatsQueue};
use loam_core::records::{ChannelStats, Measurement, RawSample, StatisticsRecord};
use loam_core::sensors::clock::{ClockCell, SharedClock};
use loam_core::sensors::{Sensor, SensorError, SensorHealth};

const INTERVAL: Duration = Duration::from_millis(100);

/// Slack for scheduling jitter of the host timer
const JITTER: Duration = Duration::from_millis(40);

/// Sensor whose reads take a different time on every call.
struct SlowSensor {
    delays_ms: &'static [u64],
    started: Vec<Instant>,
    health: SensorHealth,
}

impl SlowSensor {
    fn new(delays_ms: &'static [u64]) -> Self {
        Self {
            delays_ms,
            started: Vec::new(),
            health: SensorHealth::new(),
        }
    }
}

impl Sensor for SlowSensor {
    async fn initialize(&mut self) -> Result<(), SensorError> {
        self.health.mark_ok();
        Ok(())
    }

    async fn read(&mut self, sample: &mut RawSample) -> Result<(), SensorError> {
        let delay = self.delays_ms[self.started.len() % self.delays_ms.len()];
        self.started.push(Instant::now());
        Timer::after_millis(delay).await;
        sample.set(Measurement::SoilMoisture, 1800.0);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "slow"
    }

    fn channels(&self) -> &'static [Measurement] {
        &[Measurement::SoilMoisture]
    }

    fn is_available(&self) -> bool {
        self.health.is_available()
    }

    fn last_error(&self) -> &str {
        self.health.last_error()
    }
}

#[test]
fn test_acquisition_ticks_on_fixed_boundaries() {
    let clock = ClockCell::new(StepClock { next: NOON });
    let raw = RawQueue::new();
    let status = SystemStatus::new();
    let mut acquisition = Acquisition::new(
        SharedClock::new(&clock),
        (SlowSensor::new(&[30, 70, 50]),),
        raw.sender(),
        &status,
    );

    let began = Instant::now();
    let deadline = began + Duration::from_millis(1_050);
    match block_on(select(acquisition.run(INTERVAL), Timer::at(deadline))) {
        Either::First(never) => match never {},
        Either::Second(()) => {}
    }

    // The first read is the startup probe; ticks follow it
    let (sensor,) = acquisition.sensors();
    let ticks = &sensor.started[1..];
    let origin = ticks[0];
    for (n, tick) in ticks.iter().enumerate() {
        let due = origin + INTERVAL * n as u32;
        let late = tick.saturating_duration_since(due);
        assert!(
            late < JITTER,
            "tick {} started {} ms after its boundary",
            n,
            late.as_millis()
        );
    }

    // Every tick whose read finished before the deadline queued a sample
    let expected = (deadline - origin).as_millis() / INTERVAL.as_millis();
    let queued = raw.len() as u64;
    assert!(
        (expected.saturating_sub(1)..=expected + 1).contains(&queued),
        "{} samples queued, {} boundaries elapsed",
        queued,
        expected
    );
}

#[test]
fn test_slow_handoff_does_not_delay_next_window() {
    let raw = RawQueue::new();
    let storage = StatsQueue::new();
    let status = SystemStatus::new();

    // Storage never drains, so every emission waits out the full timeout
    let stuck = StatisticsRecord {
        window_start: NOON,
        window_end: NOON + 59,
        sample_count: 60,
        channels: [ChannelStats::EMPTY; 4],
    };
    while storage.try_send(stuck).is_ok() {}

    let mut aggregation = Aggregation::new(
        raw.receiver(),
        storage.sender(),
        None,
        Duration::from_millis(150),
        &status,
    );

    let feeder = async {
        for n in 0..30 {
            let _ = raw.try_send(RawSample::new(NOON + n).with(Measurement::SoilMoisture, 1.0));
            Timer::after_millis(50).await;
        }
    };

    // Windows close at 300, 600 and 900 ms; drifting by the 150 ms
    // handoff wait would push the third past the deadline
    let deadline = Instant::now() + Duration::from_millis(1_050);
    match block_on(select(
        join(aggregation.run(Duration::from_millis(300)), feeder),
        Timer::at(deadline),
    )) {
        Either::First((never, ())) => match never {},
        Either::Second(()) => {}
    }

    assert_eq!(status.records_emitted(), 3);
    assert_eq!(status.records_dropped(), 3, "every handoff timed out");
}
