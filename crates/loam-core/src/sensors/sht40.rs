use embedded_hal_async::i2c::I2c;
use log::error;
use sht4x::Sht4xAsync;

use super::{Sensor, SensorError, SensorHealth, check_range};
use crate::records::{Measurement, RawSample};

const NAME: &str = "SHT40";

/// SHT40 air temperature and humidity sensor.
///
/// Fills [`Measurement::AirTemperature`] and [`Measurement::AirHumidity`]
/// from one high-precision measurement.
pub struct Sht40Sensor<I> {
    sensor: Sht4xAsync<I, embassy_time::Delay>,
    health: SensorHealth,
}

impl<I: I2c> Sht40Sensor<I> {
    pub fn new(i2c: I) -> Self {
        Self {
            sensor: Sht4xAsync::<I, embassy_time::Delay>::new(i2c),
            health: SensorHealth::new(),
        }
    }
}

impl<I: I2c> Sensor for Sht40Sensor<I> {
    async fn initialize(&mut self) -> Result<(), SensorError> {
        // The serial number read doubles as a presence check
        match self.sensor.serial_number(&mut embassy_time::Delay).await {
            Ok(serial) => {
                log::info!("SHT40 serial number: {:#010x}", serial);
                self.health.mark_ok();
                Ok(())
            }
            Err(e) => {
                error!("SHT40 serial number read failed: {:?}", e);
                Err(self.health.lost(SensorError::InitializationFailed {
                    sensor: NAME,
                    details: "sensor not responding on I2C",
                }))
            }
        }
    }

    async fn read(&mut self, sample: &mut RawSample) -> Result<(), SensorError> {
        let measurement = match self
            .sensor
            .measure(sht4x::Precision::High, &mut embassy_time::Delay)
            .await
        {
            Ok(measurement) => measurement,
            Err(e) => {
                error!("SHT40 measurement failed: {:?}", e);
                return Err(self.health.fail(SensorError::ReadFailed {
                    sensor: NAME,
                    operation: "measure temperature/humidity",
                    details: "I2C communication error or sensor not responding",
                }));
            }
        };

        let temperature = measurement.temperature_celsius().to_num::<f32>();
        let humidity = measurement.humidity_percent().to_num::<f32>();

        let temperature =
            check_range(NAME, temperature, -40.0..=125.0).map_err(|e| self.health.fail(e))?;
        let humidity =
            check_range(NAME, humidity, 0.0..=100.0).map_err(|e| self.health.fail(e))?;

        sample.set(Measurement::AirTemperature, temperature);
        sample.set(Measurement::AirHumidity, humidity);
        Ok(())
    }

    fn name(&self) -> &'static str {
        NAME
    }

    fn channels(&self) -> &'static [Measurement] {
        &[Measurement::AirTemperature, Measurement::AirHumidity]
    }

    fn is_available(&self) -> bool {
        self.health.is_available()
    }

    fn last_error(&self) -> &str {
        self.health.last_error()
    }

    fn measurement_time_ms(&self) -> u32 {
        // High precision conversion takes up to 8.3 ms
        10
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::testing::FakeI2c;
    use embassy_futures::block_on;

    const SHT40_ADDRESS: u8 = 0x44;
    const CMD_SERIAL: usize = 0x89;
    const CMD_MEASURE_HIGH: usize = 0xFD;

    /// Command bytes double as register pointers in the fake, so each
    /// response sits at its command's offset.
    fn device(measurement: [u8; 6]) -> FakeI2c {
        let mut registers = [0u8; 0x100 + 6];
        registers[CMD_SERIAL..CMD_SERIAL + 6]
            .copy_from_slice(&[0x12, 0x34, 0x37, 0x56, 0x78, 0x7D]);
        registers[CMD_MEASURE_HIGH..CMD_MEASURE_HIGH + 6].copy_from_slice(&measurement);
        FakeI2c::with_registers(SHT40_ADDRESS, &registers)
    }

    #[test]
    fn test_measurement_fills_both_air_channels() {
        // 25 °C and 50 %RH, each word followed by its CRC
        let mut sht = Sht40Sensor::new(device([0x66, 0x66, 0x93, 0x72, 0xB0, 0xDC]));
        block_on(sht.initialize()).expect("serial number read");
        assert!(sht.is_available());

        let mut sample = RawSample::new(1);
        block_on(sht.read(&mut sample)).expect("measurement succeeds");
        assert!((sample.get(Measurement::AirTemperature) - 25.0).abs() < 0.05);
        assert!((sample.get(Measurement::AirHumidity) - 50.0).abs() < 0.05);
        assert!(sample.get(Measurement::ProbeTemperature).is_nan());
    }

    #[test]
    fn test_out_of_range_temperature_fails_read() {
        // Raw 0 converts to -45 °C, below the rated range
        let mut sht = Sht40Sensor::new(device([0x00, 0x00, 0x81, 0x72, 0xB0, 0xDC]));
        let mut sample = RawSample::new(1);

        assert!(matches!(
            block_on(sht.read(&mut sample)),
            Err(SensorError::OutOfRange { .. })
        ));
        assert!(sample.get(Measurement::AirHumidity).is_nan(), "no partial write");
    }

    #[test]
    fn test_missing_sensor_is_unavailable() {
        let mut sht = Sht40Sensor::new(FakeI2c::with_registers(0x45, &[0; 8]));
        assert!(block_on(sht.initialize()).is_err());
        assert!(!sht.is_available());
        assert!(sht.last_error().contains("not responding"));
    }
}
