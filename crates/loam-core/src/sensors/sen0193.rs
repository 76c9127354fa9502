//! SEN0193 capacitive soil moisture sensor on a 12-bit ADC channel
//!
//! The logged value is the raw ADC count averaged over several conversions;
//! [`Calibration`] converts it to a percentage for display and diagnostics.

use embassy_time::{Duration, Timer};
use log::{info, warn};

use super::{Sensor, SensorError, SensorHealth};
use crate::records::{Measurement, RawSample};

const NAME: &str = "SEN0193";

/// Conversions averaged per reading
pub const SAMPLES_PER_READ: u32 = 10;

/// Full scale of the 12-bit converter
pub const ADC_MAX: u16 = 4095;

/// One analog input. Mirrors the one-shot ADC API of the HAL.
pub trait AdcChannel {
    /// Starts or polls one conversion, `WouldBlock` while it runs.
    fn read_oneshot(&mut self) -> nb::Result<u16, ()>;
}

/// Raw readings in dry air and in saturated soil.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    pub dry: u16,
    pub wet: u16,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            dry: 0,
            wet: ADC_MAX,
        }
    }
}

impl Calibration {
    /// Moisture in percent between the dry and wet points, clamped to 0..=100.
    ///
    /// Works for sensors whose reading falls with moisture too (`dry > wet`).
    pub fn raw_to_percent(&self, raw: u16) -> f32 {
        if self.dry == self.wet {
            return 0.0;
        }
        let span = self.wet as f32 - self.dry as f32;
        let percent = 100.0 * (raw as f32 - self.dry as f32) / span;
        percent.clamp(0.0, 100.0)
    }
}

pub struct Sen0193Sensor<A> {
    adc: A,
    calibration: Calibration,
    health: SensorHealth,
}

impl<A: AdcChannel> Sen0193Sensor<A> {
    pub fn new(adc: A, calibration: Calibration) -> Self {
        Self {
            adc,
            calibration,
            health: SensorHealth::new(),
        }
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    pub fn set_calibration(&mut self, calibration: Calibration) {
        info!(
            "SEN0193 calibration updated, dry {} wet {}",
            calibration.dry, calibration.wet
        );
        self.calibration = calibration;
    }

    /// Average of [`SAMPLES_PER_READ`] conversions, 1 ms apart.
    async fn read_average(&mut self) -> Result<u16, SensorError> {
        let mut sum: u32 = 0;
        for _ in 0..SAMPLES_PER_READ {
            let raw = nb::block!(self.adc.read_oneshot()).map_err(|_| {
                self.health.fail(SensorError::ReadFailed {
                    sensor: NAME,
                    operation: "ADC conversion",
                    details: "converter reported an error",
                })
            })?;
            sum += raw.min(ADC_MAX) as u32;
            Timer::after(Duration::from_millis(1)).await;
        }
        Ok((sum / SAMPLES_PER_READ) as u16)
    }
}

impl<A: AdcChannel> Sensor for Sen0193Sensor<A> {
    async fn initialize(&mut self) -> Result<(), SensorError> {
        let raw = self.read_average().await.map_err(|e| self.health.lost(e))?;

        // A rail value usually means a loose wire, but is still a valid reading
        if raw == 0 || raw == ADC_MAX {
            warn!("SEN0193 ADC reads {}, check the wiring", raw);
        }
        info!(
            "SEN0193 ready, raw {} ({:.0} %), dry {} wet {}",
            raw,
            self.calibration.raw_to_percent(raw),
            self.calibration.dry,
            self.calibration.wet
        );
        self.health.mark_ok();
        Ok(())
    }

    async fn read(&mut self, sample: &mut RawSample) -> Result<(), SensorError> {
        let raw = self.read_average().await?;
        sample.set(Measurement::SoilMoisture, raw as f32);
        Ok(())
    }

    fn name(&self) -> &'static str {
        NAME
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

    fn measurement_time_ms(&self) -> u32 {
        // About 2 ms per conversion including the pause
        SAMPLES_PER_READ * 2
    }
}
