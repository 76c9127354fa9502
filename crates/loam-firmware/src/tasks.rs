//! Embassy task entry points
//!
//! Tasks cannot be generic, so each one is pinned to the concrete drivers
//! of this board through the aliases below.
//!
//! Acquisition runs on the priority 3 interrupt executor, aggregation and
//! storage on the priority 2 one, everything else on the main thread
//! executor. Tasks on the interrupt executors must stay `Send`.

use embassy_time::Duration;
use loam_core::app_state::{SYSTEM_STATUS, run_monitor};
use loam_core::network::{LinkCell, Upload};
use loam_core::pipeline::{Acquisition, Aggregation};
use loam_core::sensors::clock::ClockCell;
use loam_core::sensors::{Ds1308, Ds18b20Sensor, Sen0193Sensor, SharedClock, SharedI2c};
use loam_core::storage::StorageManager;
use loam_core::storage::manager::StoreLock;
use loam_core::time_sync::TimeSync;

use crate::hardware::{I2cDriver, SdStore, SoilAdc};
use crate::net::{MqttCollector, SntpClient, WifiLink};
use crate::onewire::OneWirePin;

pub type BusHandle = SharedI2c<'static, I2cDriver>;

pub type Rtc = Ds1308<BusHandle>;

pub type RtcCell = ClockCell<Rtc>;

pub type RtcHandle = SharedClock<'static, Rtc>;

#[cfg(feature = "sensor-sht40")]
pub type LoggerSensors = (
    Ds18b20Sensor<OneWirePin<'static>>,
    loam_core::sensors::Sht40Sensor<BusHandle>,
    Sen0193Sensor<SoilAdc>,
);

#[cfg(not(feature = "sensor-sht40"))]
pub type LoggerSensors = (Ds18b20Sensor<OneWirePin<'static>>, Sen0193Sensor<SoilAdc>);

pub type WifiCell = LinkCell<WifiLink>;

pub type SdLock = StoreLock<SdStore>;

#[embassy_executor::task]
pub async fn acquisition_task(
    mut acquisition: Acquisition<'static, RtcHandle, LoggerSensors>,
    interval: Duration,
) -> ! {
    acquisition.run(interval).await
}

#[embassy_executor::task]
pub async fn aggregation_task(mut aggregation: Aggregation<'static>, interval: Duration) -> ! {
    aggregation.run(interval).await
}

#[embassy_executor::task]
pub async fn storage_task(storage: StorageManager<'static, SdStore>) -> ! {
    storage.run().await
}

#[embassy_executor::task]
pub async fn upload_task(
    mut upload: Upload<'static, WifiLink, MqttCollector>,
    interval: Duration,
) -> ! {
    upload.run(interval).await
}

#[embassy_executor::task]
pub async fn time_sync_task(mut sync: TimeSync<'static, WifiLink, SntpClient, RtcHandle>) -> ! {
    sync.run().await
}

#[embassy_executor::task]
pub async fn monitor_task() -> ! {
    run_monitor(&SYSTEM_STATUS, || esp_alloc::HEAP.free() as u32).await
}
