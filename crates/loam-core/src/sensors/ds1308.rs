//! DS1308 battery-backed real-time clock
//!
//! Register compatible with the DS1307: seven BCD time registers starting at
//! 0x00, bit 7 of the seconds register halts the oscillator. The clock always
//! holds UTC in 24-hour mode.

use chrono::{DateTime, Datelike, NaiveDate, Timelike};
use embedded_hal_async::i2c::I2c;
use log::{error, info, warn};

use super::clock::{Clock, ClockError, is_plausible};

pub const DS1308_ADDRESS: u8 = 0x68;

const REG_SECONDS: u8 = 0x00;
const CLOCK_HALT: u8 = 0x80;
const HOUR_12H: u8 = 0x40;

fn bcd_to_bin(value: u8) -> u8 {
    (value >> 4) * 10 + (value & 0x0F)
}

fn bin_to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

/// Decodes the seven time registers into Unix seconds.
pub fn decode_registers(regs: &[u8; 7]) -> Result<u32, ClockError> {
    if regs[2] & HOUR_12H != 0 {
        // Never written by this driver, so the registers were corrupted
        return Err(ClockError::InvalidDate);
    }

    let seconds = bcd_to_bin(regs[0] & 0x7F);
    let minutes = bcd_to_bin(regs[1] & 0x7F);
    let hours = bcd_to_bin(regs[2] & 0x3F);
    let day = bcd_to_bin(regs[4] & 0x3F);
    let month = bcd_to_bin(regs[5] & 0x1F);
    let year = 2000 + bcd_to_bin(regs[6]) as i32;

    let timestamp = NaiveDate::from_ymd_opt(year, month as u32, day as u32)
        .and_then(|date| date.and_hms_opt(hours as u32, minutes as u32, seconds as u32))
        .ok_or(ClockError::InvalidDate)?
        .and_utc()
        .timestamp();

    u32::try_from(timestamp).map_err(|_| ClockError::InvalidDate)
}

/// Encodes Unix seconds into the seven time registers, oscillator running.
pub fn encode_registers(timestamp: u32) -> Result<[u8; 7], ClockError> {
    let time = DateTime::from_timestamp(timestamp as i64, 0).ok_or(ClockError::InvalidDate)?;
    if !(2000..2100).contains(&time.year()) {
        return Err(ClockError::InvalidDate);
    }

    Ok([
        bin_to_bcd(time.second() as u8),
        bin_to_bcd(time.minute() as u8),
        bin_to_bcd(time.hour() as u8),
        time.weekday().number_from_sunday() as u8,
        bin_to_bcd(time.day() as u8),
        bin_to_bcd(time.month() as u8),
        bin_to_bcd((time.year() - 2000) as u8),
    ])
}

/// DS1308 on an async I2C bus.
pub struct Ds1308<I> {
    i2c: I,
}

impl<I: I2c> Ds1308<I> {
    pub fn new(i2c: I) -> Self {
        Self { i2c }
    }

    async fn read_registers(&mut self) -> Result<[u8; 7], ClockError> {
        let mut regs = [0u8; 7];
        self.i2c
            .write_read(DS1308_ADDRESS, &[REG_SECONDS], &mut regs)
            .await
            .map_err(|e| {
                error!("DS1308 register read failed: {:?}", e);
                ClockError::Bus
            })?;
        Ok(regs)
    }

    /// Checks that the RTC answers and logs its current state.
    pub async fn probe(&mut self) -> Result<(), ClockError> {
        let regs = self.read_registers().await.map_err(|_| ClockError::NotFound)?;

        match decode_registers(&regs) {
            Ok(time) if is_plausible(time) => info!("DS1308 found, time {}", time),
            Ok(time) => warn!("DS1308 found, time {} needs a sync", time),
            Err(e) => warn!("DS1308 found, {}", e),
        }
        if regs[0] & CLOCK_HALT != 0 {
            warn!("DS1308 oscillator halted, waiting for the first time sync");
        }
        Ok(())
    }
}

impl<I: I2c> Clock for Ds1308<I> {
    async fn now(&mut self) -> Result<u32, ClockError> {
        let regs = self.read_registers().await?;
        let time = decode_registers(&regs)?;
        if !is_plausible(time) {
            return Err(ClockError::Implausible(time));
        }
        Ok(time)
    }

    async fn set_time(&mut self, timestamp: u32) -> Result<(), ClockError> {
        let regs = encode_registers(timestamp)?;

        let mut frame = [0u8; 8];
        frame[0] = REG_SECONDS;
        frame[1..].copy_from_slice(&regs);

        self.i2c.write(DS1308_ADDRESS, &frame).await.map_err(|e| {
            error!("DS1308 register write failed: {:?}", e);
            ClockError::Bus
        })
    }

    /// Halted oscillator, or the 2000-01-01 reset date.
    async fn lost_power(&mut self) -> Result<bool, ClockError> {
        let regs = self.read_registers().await?;
        let reset_date = regs[6] == 0x00 && regs[5] & 0x1F == 0x01 && regs[4] & 0x3F == 0x01;
        Ok(regs[0] & CLOCK_HALT != 0 || reset_date)
    }
}
