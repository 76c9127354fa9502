//! DS18B20 soil probe on a dedicated 1-Wire line
//!
//! The probe is the only device on its line, so every command is addressed
//! with Skip ROM. Conversions run at 12-bit resolution.

use embassy_time::{Duration, Timer};
use log::{error, info};

use super::{Sensor, SensorError, SensorHealth, check_range};
use crate::records::{Measurement, RawSample};

const NAME: &str = "DS18B20";

const FAMILY_CODE: u8 = 0x28;

const CMD_READ_ROM: u8 = 0x33;
const CMD_SKIP_ROM: u8 = 0xCC;
const CMD_CONVERT_T: u8 = 0x44;
const CMD_READ_SCRATCHPAD: u8 = 0xBE;
const CMD_WRITE_SCRATCHPAD: u8 = 0x4E;

/// Configuration register value for 12-bit conversions
const RESOLUTION_12_BIT: u8 = 0x7F;

/// Worst-case 12-bit conversion time
const CONVERSION_TIME_MS: u32 = 750;

/// Power-on value of the temperature register, 85 °C
const POWER_ON_RAW: i16 = 0x0550;

/// Low-level access to a 1-Wire line. Implementations own the timing.
pub trait OneWireBus {
    /// Sends a reset pulse, returning whether a device answered.
    fn reset(&mut self) -> bool;

    fn write_byte(&mut self, byte: u8);

    fn read_byte(&mut self) -> u8;
}

/// Dallas/Maxim CRC-8 over `data`.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for byte in data {
        let mut byte = *byte;
        for _ in 0..8 {
            let mix = (crc ^ byte) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            byte >>= 1;
        }
    }
    crc
}

/// Extracts the temperature from a scratchpad read.
pub fn decode_scratchpad(scratchpad: &[u8; 9]) -> Result<f32, &'static str> {
    if crc8(&scratchpad[..8]) != scratchpad[8] {
        return Err("scratchpad CRC mismatch");
    }
    // The low five configuration bits always read as one
    if scratchpad[4] & 0x1F != 0x1F {
        return Err("no device answering");
    }

    let raw = i16::from_le_bytes([scratchpad[0], scratchpad[1]]);
    if raw == POWER_ON_RAW {
        return Err("power-on value, conversion did not run");
    }
    Ok(raw as f32 / 16.0)
}

pub struct Ds18b20Sensor<B> {
    bus: B,
    health: SensorHealth,
}

impl<B: OneWireBus> Ds18b20Sensor<B> {
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            health: SensorHealth::new(),
        }
    }

    fn command(&mut self, command: u8) -> Result<(), SensorError> {
        if !self.bus.reset() {
            return Err(self.health.lost(SensorError::ReadFailed {
                sensor: NAME,
                operation: "reset",
                details: "no presence pulse",
            }));
        }
        self.bus.write_byte(CMD_SKIP_ROM);
        self.bus.write_byte(command);
        Ok(())
    }

    fn read_rom(&mut self) -> Result<[u8; 8], SensorError> {
        if !self.bus.reset() {
            return Err(self.health.lost(SensorError::InitializationFailed {
                sensor: NAME,
                details: "no device on the 1-Wire line",
            }));
        }
        self.bus.write_byte(CMD_READ_ROM);

        let mut rom = [0u8; 8];
        for byte in rom.iter_mut() {
            *byte = self.bus.read_byte();
        }

        if rom[0] != FAMILY_CODE || crc8(&rom[..7]) != rom[7] {
            error!("DS18B20 unexpected ROM code {:02x?}", rom);
            return Err(self.health.lost(SensorError::InitializationFailed {
                sensor: NAME,
                details: "ROM code is not a DS18B20",
            }));
        }
        Ok(rom)
    }

    async fn measure(&mut self) -> Result<f32, SensorError> {
        self.command(CMD_CONVERT_T)?;
        Timer::after(Duration::from_millis(CONVERSION_TIME_MS as u64)).await;

        self.command(CMD_READ_SCRATCHPAD)?;
        let mut scratchpad = [0u8; 9];
        for byte in scratchpad.iter_mut() {
            *byte = self.bus.read_byte();
        }

        let temperature = decode_scratchpad(&scratchpad).map_err(|details| {
            self.health.fail(SensorError::ReadFailed {
                sensor: NAME,
                operation: "read scratchpad",
                details,
            })
        })?;

        check_range(NAME, temperature, -55.0..=125.0).map_err(|e| self.health.fail(e))
    }
}

impl<B: OneWireBus> Sensor for Ds18b20Sensor<B> {
    async fn initialize(&mut self) -> Result<(), SensorError> {
        let rom = self.read_rom()?;

        self.command(CMD_WRITE_SCRATCHPAD)?;
        // Alarm thresholds are unused
        self.bus.write_byte(0x00);
        self.bus.write_byte(0x00);
        self.bus.write_byte(RESOLUTION_12_BIT);

        let temperature = self.measure().await?;
        info!("DS18B20 {:02X?} ready, 12-bit, {:.2} °C", rom, temperature);
        self.health.mark_ok();
        Ok(())
    }

    async fn read(&mut self, sample: &mut RawSample) -> Result<(), SensorError> {
        let temperature = self.measure().await?;
        sample.set(Measurement::ProbeTemperature, temperature);
        Ok(())
    }

    fn name(&self) -> &'static str {
        NAME
    }

    fn channels(&self) -> &'static [Measurement] {
        &[Measurement::ProbeTemperature]
    }

    fn is_available(&self) -> bool {
        self.health.is_available()
    }

    fn last_error(&self) -> &str {
        self.health.last_error()
    }

    fn measurement_time_ms(&self) -> u32 {
        CONVERSION_TIME_MS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::collections::VecDeque;
    use alloc::vec::Vec;
    use embassy_futures::block_on;

    const ROM: [u8; 8] = [0x28, 0xFF, 0x4B, 0x6B, 0x55, 0x16, 0x03, 0x3F];

    /// Scratchpad holding `raw`, with a valid CRC
    fn scratchpad(raw: i16) -> [u8; 9] {
        let [lo, hi] = raw.to_le_bytes();
        let mut pad = [lo, hi, 0x4B, 0x46, RESOLUTION_12_BIT, 0xFF, 0x0C, 0x10, 0x00];
        pad[8] = crc8(&pad[..8]);
        pad
    }

    #[derive(Default)]
    struct FakeLine {
        present: bool,
        reads: VecDeque<u8>,
        written: Vec<u8>,
    }

    impl OneWireBus for FakeLine {
        fn reset(&mut self) -> bool {
            self.present
        }

        fn write_byte(&mut self, byte: u8) {
            self.written.push(byte);
        }

        fn read_byte(&mut self) -> u8 {
            // An idle line reads as all ones
            self.reads.pop_front().unwrap_or(0xFF)
        }
    }

    #[test]
    fn test_crc8_matches_rom_checksum() {
        assert_eq!(crc8(&ROM[..7]), ROM[7]);
        assert_eq!(crc8(&[]), 0);
    }

    #[test]
    fn test_decode_scratchpad() {
        assert_eq!(decode_scratchpad(&scratchpad(0x0191)), Ok(25.0625));
        assert_eq!(decode_scratchpad(&scratchpad(-162)), Ok(-10.125));
        assert!(decode_scratchpad(&scratchpad(POWER_ON_RAW)).is_err());

        let mut corrupt = scratchpad(0x0191);
        corrupt[0] ^= 0x01;
        assert_eq!(decode_scratchpad(&corrupt), Err("scratchpad CRC mismatch"));

        // All zeros has a valid CRC but no device wrote it
        assert!(decode_scratchpad(&[0; 9]).is_err());
    }

    #[test]
    fn test_initialize_and_read() {
        let mut line = FakeLine {
            present: true,
            ..FakeLine::default()
        };
        line.reads.extend(ROM);
        line.reads.extend(scratchpad(0x0150));
        line.reads.extend(scratchpad(0x0191));
        let mut probe = Ds18b20Sensor::new(line);

        block_on(probe.initialize()).expect("probe comes up");
        assert!(probe.is_available());
        assert_eq!(
            &probe.bus.written[..6],
            &[CMD_READ_ROM, CMD_SKIP_ROM, CMD_WRITE_SCRATCHPAD, 0x00, 0x00, RESOLUTION_12_BIT]
        );

        let mut sample = RawSample::new(1);
        block_on(probe.read(&mut sample)).expect("read succeeds");
        assert_eq!(sample.get(Measurement::ProbeTemperature), 25.0625);
    }

    #[test]
    fn test_unplugged_probe() {
        let mut probe = Ds18b20Sensor::new(FakeLine::default());

        assert!(block_on(probe.initialize()).is_err());
        assert!(!probe.is_available());
        assert!(probe.last_error().contains("no device"));

        // Presence without data reads all ones and fails the CRC
        probe.bus.present = true;
        let mut sample = RawSample::new(1);
        assert!(block_on(probe.read(&mut sample)).is_err());
        assert!(sample.get(Measurement::ProbeTemperature).is_nan());
    }
}
