//! Fakes shared by the scenario tests

#![allow(dead_code)]

use std::collections::VecDeque;

use embassy_time::{Duration, Timer};
use loam_core::network::{Collector, CollectorSession, NetworkError, NetworkLink, NetworkTime};
use loam_core::records::{Measurement, RawSample};
use loam_core::sensors::{Clock, ClockError, Sensor, SensorError, SensorHealth};

/// 2025-10-16T12:00:00Z
pub const NOON: u32 = 1_760_616_000;

/// Single-channel sensor replaying a list of readings; `None` fails the read.
pub struct ListSensor {
    name: &'static str,
    channels: &'static [Measurement],
    values: VecDeque<Option<f32>>,
    health: SensorHealth,
}

impl ListSensor {
    pub fn new(
        name: &'static str,
        channels: &'static [Measurement],
        values: &[Option<f32>],
    ) -> Self {
        Self {
            name,
            channels,
            values: values.iter().copied().collect(),
            health: SensorHealth::new(),
        }
    }
}

impl Sensor for ListSensor {
    async fn initialize(&mut self) -> Result<(), SensorError> {
        self.health.mark_ok();
        Ok(())
    }

    async fn read(&mut self, sample: &mut RawSample) -> Result<(), SensorError> {
        match self.values.pop_front().flatten() {
            Some(value) => {
                sample.set(self.channels[0], value);
                Ok(())
            }
            None => Err(self.health.fail(SensorError::ReadFailed {
                sensor: self.name,
                operation: "read",
                details: "no reading",
            })),
        }
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

/// Clock that advances one second per read.
pub struct StepClock {
    pub next: u32,
}

impl Clock for StepClock {
    async fn now(&mut self) -> Result<u32, ClockError> {
        let now = self.next;
        self.next += 1;
        Ok(now)
    }

    async fn set_time(&mut self, timestamp: u32) -> Result<(), ClockError> {
        self.next = timestamp;
        Ok(())
    }
}

/// Link that takes a little time to come up and refuses concurrent use.
#[derive(Default)]
pub struct SlowLink {
    pub up: bool,
    pub offline: bool,
    pub connects: u32,
}

impl NetworkLink for SlowLink {
    async fn connect(&mut self) -> Result<(), NetworkError> {
        assert!(!self.up, "link handed to two sessions at once");
        self.connects += 1;
        Timer::after(Duration::from_millis(5)).await;
        if self.offline {
            return Err(NetworkError::Link("offline"));
        }
        self.up = true;
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.up = false;
    }
}

/// Collector whose publishes follow a script of outcomes (missing = success).
#[derive(Default)]
pub struct ScriptedCollector {
    pub outcomes: VecDeque<bool>,
    pub delivered: Vec<String>,
}

pub struct ScriptedSession<'s> {
    collector: &'s mut ScriptedCollector,
}

impl Collector for ScriptedCollector {
    type Session<'s> = ScriptedSession<'s>;

    async fn open(&mut self) -> Result<Self::Session<'_>, NetworkError> {
        Ok(ScriptedSession { collector: self })
    }
}

impl CollectorSession for ScriptedSession<'_> {
    async fn publish(&mut self, payload: &[u8]) -> Result<(), NetworkError> {
        if !self.collector.outcomes.pop_front().unwrap_or(true) {
            return Err(NetworkError::Publish("broker went away"));
        }
        self.collector
            .delivered
            .push(String::from_utf8(payload.to_vec()).expect("payload is UTF-8"));
        Ok(())
    }

    async fn close(self) {}
}

/// Time server with a fixed answer.
pub struct FixedTime(pub u32);

impl NetworkTime for FixedTime {
    async fn fetch_time(&mut self) -> Result<u32, NetworkError> {
        Ok(self.0)
    }
}
