//! Sensor capability contract and the ordered sensor set used by acquisition
//!
//! Every concrete driver implements [`Sensor`]. Acquisition never sees the
//! concrete types: it holds one [`SensorSet`] (a tuple of drivers, or a
//! collection of one driver type) and iterates it in declaration order.

pub mod bus;
pub mod clock;
pub mod ds1308;
pub mod ds18b20;
pub mod sen0193;
#[cfg(feature = "sensor-sht40")]
pub mod sht40;

use core::fmt::Write;

use log::{debug, info, warn};
use thiserror_no_std::Error;

use crate::records::{Measurement, RawSample};

pub use bus::SharedI2c;
pub use clock::{Clock, ClockError, SharedClock};
pub use ds1308::Ds1308;
pub use ds18b20::{Ds18b20Sensor, OneWireBus};
pub use sen0193::{AdcChannel, Calibration, Sen0193Sensor};
#[cfg(feature = "sensor-sht40")]
pub use sht40::Sht40Sensor;

/// Capacity of a sensor's last-error text
pub const ERROR_TEXT_LEN: usize = 64;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    #[error("{sensor}: initialization failed ({details})")]
    InitializationFailed {
        sensor: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: {operation} failed ({details})")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: {operation} timed out")]
    Timeout {
        sensor: &'static str,
        operation: &'static str,
    },
    #[error("{sensor}: value {value} outside of the valid range")]
    OutOfRange { sensor: &'static str, value: f32 },
    #[error("{sensor}: not initialized")]
    NotInitialized { sensor: &'static str },
}

/// Capability set of one sensing device.
///
/// `read` must only write the channels listed by [`Sensor::channels`] and
/// must never touch the sample timestamp; [`SensorSet`] enforces this by
/// reading into a scratch sample and copying the declared channels only.
pub trait Sensor {
    /// Brings the device up. Called once at startup and again lazily while
    /// the sensor reports unavailable.
    fn initialize(&mut self) -> impl Future<Output = Result<(), SensorError>>;

    /// Takes one measurement and writes it into `sample`.
    fn read(&mut self, sample: &mut RawSample) -> impl Future<Output = Result<(), SensorError>>;

    fn name(&self) -> &'static str;

    /// Channels this sensor fills in
    fn channels(&self) -> &'static [Measurement];

    fn is_available(&self) -> bool;

    /// Text of the most recent failure, empty if none
    fn last_error(&self) -> &str;

    /// Expected duration of one `read`, in milliseconds
    fn measurement_time_ms(&self) -> u32 {
        1
    }
}

/// Availability flag and last error text, shared by the drivers.
#[derive(Debug, Default, Clone)]
pub struct SensorHealth {
    available: bool,
    last_error: heapless::String<ERROR_TEXT_LEN>,
}

impl SensorHealth {
    pub const fn new() -> Self {
        Self {
            available: false,
            last_error: heapless::String::new(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn last_error(&self) -> &str {
        self.last_error.as_str()
    }

    pub fn mark_ok(&mut self) {
        self.available = true;
    }

    /// Records `error`, truncating the text if it does not fit, and passes
    /// it through so drivers can `return Err(self.health.fail(..))`.
    pub fn fail(&mut self, error: SensorError) -> SensorError {
        self.record(&error);
        error
    }

    /// Like [`SensorHealth::fail`] but also marks the device unavailable.
    pub fn lost(&mut self, error: SensorError) -> SensorError {
        self.available = false;
        self.fail(error)
    }

    fn record(&mut self, error: &SensorError) {
        self.last_error.clear();
        // Overflow only truncates the message
        let _ = write!(TruncatingWriter(&mut self.last_error), "{}", error);
    }
}

struct TruncatingWriter<'a, const N: usize>(&'a mut heapless::String<N>);

impl<const N: usize> Write for TruncatingWriter<'_, N> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                return Err(core::fmt::Error);
            }
        }
        Ok(())
    }
}

/// Outcome of reading every sensor once
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadSummary {
    pub ok: u8,
    pub failed: u8,
}

impl ReadSummary {
    fn add(&mut self, ok: bool) {
        if ok {
            self.ok += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Ordered collection of sensors, iterated without knowledge of the
/// concrete driver types.
pub trait SensorSet {
    /// Initializes every sensor, returning how many came up.
    fn initialize_all(&mut self) -> impl Future<Output = usize>;

    /// Reads every sensor into `sample`. A failing sensor is logged and
    /// skipped; the others still fill their channels.
    fn read_all(&mut self, sample: &mut RawSample) -> impl Future<Output = ReadSummary>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of the sensors' expected read latencies, in milliseconds
    fn total_measurement_time_ms(&self) -> u32;

    /// Reads every sensor once into a scratch sample and logs OK/FAILED.
    fn probe_report(&mut self) -> impl Future<Output = ()> {
        async move {
            let mut scratch = RawSample::default();
            let summary = self.read_all(&mut scratch).await;
            info!(
                "Sensor probe: {} ok, {} failed, values {:?}",
                summary.ok, summary.failed, scratch.values
            );
        }
    }
}

/// Initializes one sensor, logging the outcome.
pub async fn initialize_one<S: Sensor>(sensor: &mut S) -> bool {
    match sensor.initialize().await {
        Ok(()) => {
            info!("{}: initialized", sensor.name());
            true
        }
        Err(e) => {
            warn!("{}: {}", sensor.name(), e);
            false
        }
    }
}

/// Reads one sensor into `sample`, copying only the sensor's own channels.
///
/// An unavailable sensor gets one lazy `initialize` attempt first.
pub async fn read_one<S: Sensor>(sensor: &mut S, sample: &mut RawSample) -> bool {
    if !sensor.is_available() && sensor.initialize().await.is_err() {
        debug!("{}: still unavailable, skipped", sensor.name());
        return false;
    }

    let mut scratch = RawSample::new(sample.timestamp);
    match sensor.read(&mut scratch).await {
        Ok(()) => {
            for channel in sensor.channels() {
                sample.set(*channel, scratch.get(*channel));
            }
            true
        }
        Err(e) => {
            warn!("{} read failed: {}", sensor.name(), e);
            false
        }
    }
}

macro_rules! impl_sensor_set_for_tuple {
    ($count:expr; $($name:ident: $idx:tt),+) => {
        impl<$($name: Sensor),+> SensorSet for ($($name,)+) {
            async fn initialize_all(&mut self) -> usize {
                let mut up = 0;
                $(
                    if initialize_one(&mut self.$idx).await {
                        up += 1;
                    }
                )+
                up
            }

            async fn read_all(&mut self, sample: &mut RawSample) -> ReadSummary {
                let mut summary = ReadSummary::default();
                $( summary.add(read_one(&mut self.$idx, sample).await); )+
                summary
            }

            fn len(&self) -> usize {
                $count
            }

            fn total_measurement_time_ms(&self) -> u32 {
                0 $( + self.$idx.measurement_time_ms() )+
            }
        }
    };
}

impl_sensor_set_for_tuple!(1; A: 0);
impl_sensor_set_for_tuple!(2; A: 0, B: 1);
impl_sensor_set_for_tuple!(3; A: 0, B: 1, C: 2);
impl_sensor_set_for_tuple!(4; A: 0, B: 1, C: 2, D: 3);
impl_sensor_set_for_tuple!(5; A: 0, B: 1, C: 2, D: 3, E: 4);
impl_sensor_set_for_tuple!(6; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);

impl<S: Sensor> SensorSet for alloc::vec::Vec<S> {
    async fn initialize_all(&mut self) -> usize {
        let mut up = 0;
        for sensor in self.iter_mut() {
            if initialize_one(sensor).await {
                up += 1;
            }
        }
        up
    }

    async fn read_all(&mut self, sample: &mut RawSample) -> ReadSummary {
        let mut summary = ReadSummary::default();
        for sensor in self.iter_mut() {
            summary.add(read_one(sensor, sample).await);
        }
        summary
    }

    fn len(&self) -> usize {
        alloc::vec::Vec::len(self)
    }

    fn total_measurement_time_ms(&self) -> u32 {
        self.iter().map(|s| s.measurement_time_ms()).sum()
    }
}

/// Rejects readings outside of a device's physical range.
pub fn check_range(
    sensor: &'static str,
    value: f32,
    range: core::ops::RangeInclusive<f32>,
) -> Result<f32, SensorError> {
    if value.is_finite() && range.contains(&value) {
        Ok(value)
    } else {
        Err(SensorError::OutOfRange { sensor, value })
    }
}
