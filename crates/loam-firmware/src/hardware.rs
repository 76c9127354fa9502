//! Hardware initialization for the logger board
//!
//! Pin map:
//! - I2C0 (DS1308, SHT40): SDA GPIO8, SCL GPIO9
//! - 1-Wire (DS18B20): GPIO10, external 4.7 kΩ pull-up
//! - ADC1 (SEN0193): GPIO1
//! - SPI2 (SD card): SCK GPIO6, MOSI GPIO7, MISO GPIO2, CS GPIO3

use chrono::{DateTime, Datelike, Timelike};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex as AsyncMutex;
use embedded_hal_bus::spi::ExclusiveDevice;
use embedded_sdmmc::{SdCard, TimeSource, Timestamp};
use esp_hal::analog::adc::{Adc, AdcConfig, AdcPin, Attenuation};
use esp_hal::delay::Delay;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::peripherals::{ADC1, GPIO1};
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::time::Rate;
use esp_hal::{Async, Blocking};
use loam_core::app_state::SYSTEM_STATUS;
use loam_core::sensors::AdcChannel;
use loam_core::sensors::bus::I2cBus;
use loam_core::storage::sd_card::SdCardStore;
use static_cell::StaticCell;
use thiserror_no_std::Error;

use crate::config::{I2C_FREQUENCY_KHZ, SD_SPI_FREQUENCY_KHZ};

pub type I2cDriver = I2c<'static, Async>;

pub type SdSpiDevice = ExclusiveDevice<Spi<'static, Blocking>, Output<'static>, Delay>;

pub type SdStore = SdCardStore<SdSpiDevice, Delay, StatusTimeSource>;

#[derive(Error, Debug)]
pub enum HardwareError {
    #[error("I2C bus configuration rejected")]
    I2cConfig,
    #[error("SPI bus configuration rejected")]
    SpiConfig,
    #[error("SD card chip select unusable")]
    ChipSelect,
}

/// Creates the shared I2C bus. Each device takes its own
/// [`SharedI2c`](loam_core::sensors::SharedI2c) handle onto it.
pub fn create_i2c_bus(
    i2c0: esp_hal::peripherals::I2C0<'static>,
    sda: esp_hal::peripherals::GPIO8<'static>,
    scl: esp_hal::peripherals::GPIO9<'static>,
) -> Result<&'static I2cBus<I2cDriver>, HardwareError> {
    static I2C0_BUS: StaticCell<AsyncMutex<CriticalSectionRawMutex, I2cDriver>> =
        StaticCell::new();

    let i2c = I2c::new(
        i2c0,
        I2cConfig::default().with_frequency(Rate::from_khz(I2C_FREQUENCY_KHZ)),
    )
    .map_err(|_| HardwareError::I2cConfig)?
    .with_sda(sda)
    .with_scl(scl)
    .into_async();

    Ok(I2C0_BUS.init(AsyncMutex::new(i2c)))
}

/// Creates the SD card row store on SPI2. The card itself is only
/// touched on the first mount.
pub fn create_sd_store(
    spi2: esp_hal::peripherals::SPI2<'static>,
    sck: esp_hal::peripherals::GPIO6<'static>,
    mosi: esp_hal::peripherals::GPIO7<'static>,
    miso: esp_hal::peripherals::GPIO2<'static>,
    cs: esp_hal::peripherals::GPIO3<'static>,
) -> Result<SdStore, HardwareError> {
    let spi = Spi::new(
        spi2,
        SpiConfig::default().with_frequency(Rate::from_khz(SD_SPI_FREQUENCY_KHZ)),
    )
    .map_err(|_| HardwareError::SpiConfig)?
    .with_sck(sck)
    .with_mosi(mosi)
    .with_miso(miso);

    let cs = Output::new(cs, Level::High, OutputConfig::default());
    let device =
        ExclusiveDevice::new(spi, cs, Delay::new()).map_err(|_| HardwareError::ChipSelect)?;

    let sd_card = SdCard::new(device, Delay::new());
    Ok(SdCardStore::new(sd_card, StatusTimeSource))
}

/// SEN0193 analog input on ADC1.
pub struct SoilAdc {
    adc: Adc<'static, ADC1<'static>, Blocking>,
    pin: AdcPin<GPIO1<'static>, ADC1<'static>>,
}

impl SoilAdc {
    /// 11 dB attenuation covers the sensor's full 0..3.0 V output.
    pub fn new(adc1: ADC1<'static>, pin: GPIO1<'static>) -> Self {
        let mut config = AdcConfig::new();
        let pin = config.enable_pin(pin, Attenuation::_11dB);
        Self {
            adc: Adc::new(adc1, config),
            pin,
        }
    }
}

impl AdcChannel for SoilAdc {
    fn read_oneshot(&mut self) -> nb::Result<u16, ()> {
        self.adc.read_oneshot(&mut self.pin)
    }
}

/// FAT timestamps from the last time sync, 2020-01-01 before the first one.
pub struct StatusTimeSource;

impl TimeSource for StatusTimeSource {
    fn get_timestamp(&self) -> Timestamp {
        SYSTEM_STATUS
            .estimated_time()
            .and_then(|now| DateTime::from_timestamp(now as i64, 0))
            .and_then(|now| {
                Timestamp::from_calendar(
                    now.year() as u16,
                    now.month() as u8,
                    now.day() as u8,
                    now.hour() as u8,
                    now.minute() as u8,
                    now.second() as u8,
                )
                .ok()
            })
            .unwrap_or(Timestamp {
                year_since_1970: 50,
                zero_indexed_month: 0,
                zero_indexed_day: 0,
                hours: 0,
                minutes: 0,
                seconds: 0,
            })
    }
}
