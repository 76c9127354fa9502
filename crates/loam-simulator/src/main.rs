//! Desktop simulator for the loam soil logger.
//!
//! Runs the real acquisition, aggregation, storage, upload and time-sync
//! tasks from loam-core on the std embassy executor, with intervals shortened
//! so a full cycle is visible within a minute:
//!
//! | Stage        | Interval |
//! |--------------|----------|
//! | Acquisition  | 1 s      |
//! | Aggregation  | 10 s     |
//! | Upload       | 30 s     |
//! | Time resync  | 2 min    |
//!
//! The RTC starts reset, so samples stay invalid until the first time sync.
//! Daily CSV files land in `$LOAM_SIM_DATA` (default `sim-data/`), published
//! payloads are logged. `RUST_LOG=debug` shows per-tick detail.

mod devices;
mod dir_store;
mod network;

use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use log::info;

use loam_core::app_state::{SYSTEM_STATUS, run_monitor};
use loam_core::config::{Config, PipelineConfig};
use loam_core::network::{LinkCell, Upload};
use loam_core::pipeline::{Acquisition, Aggregation, PipelineQueues};
use loam_core::records::Measurement;
use loam_core::sensors::SharedClock;
use loam_core::sensors::clock::ClockCell;
use loam_core::storage::StorageManager;
use loam_core::storage::manager::StoreLock;
use loam_core::time_sync::TimeSync;

use devices::{SimClock, SyntheticSensor, Wave};
use dir_store::DirStore;
use network::{FlakyLink, HostTime, LogCollector};

// ---------------------------------------------------------------------------
// Simulated board
// ---------------------------------------------------------------------------

/// Every 4th WiFi association fails
const LINK_FAIL_EVERY: u32 = 4;

/// Every 7th publish loses the broker connection
const PUBLISH_DROP_EVERY: u32 = 7;

/// Every 13th probe read fails
const PROBE_FAIL_EVERY: u32 = 13;

/// Heap figure reported to the monitor; the host has no meaningful one
const FAKE_FREE_HEAP: u32 = 64 * 1024;

type Sensors = (SyntheticSensor, SyntheticSensor, SyntheticSensor);

type RtcHandle = SharedClock<'static, SimClock>;

static PIPELINE: PipelineQueues = PipelineQueues::new();

fn simulator_config() -> Config<'static> {
    let mut config = Config::default();
    config.internet.ssid = "sim-ap";
    config.internet.connect_timeout_ms = 5_000;
    config.collector.client_id = "loam-sim";
    config.collector.device_id = "loam-sim";
    config.time.ntp_server = "host";
    config.time.settle_delay_ms = 1_000;
    config.time.retry_delay_ms = 3_000;
    config.time.resync_interval_ms = 120_000;
    config.pipeline = PipelineConfig {
        sample_interval_ms: 1_000,
        window_interval_ms: 10_000,
        upload_interval_ms: 30_000,
        ..PipelineConfig::default()
    };
    config
}

fn sensors() -> Sensors {
    (
        SyntheticSensor::new(
            "probe",
            &[Measurement::ProbeTemperature],
            &[Wave::new(14.0, 2.5, 600.0)],
        )
        .failing_every(PROBE_FAIL_EVERY),
        SyntheticSensor::new(
            "air",
            &[Measurement::AirTemperature, Measurement::AirHumidity],
            &[Wave::new(21.0, 4.0, 300.0), Wave::new(55.0, 12.0, 450.0)],
        ),
        SyntheticSensor::new(
            "soil",
            &[Measurement::SoilMoisture],
            &[Wave::new(1800.0, 250.0, 900.0)],
        ),
    )
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[embassy_executor::task]
async fn acquisition_task(
    mut acquisition: Acquisition<'static, RtcHandle, Sensors>,
    interval: Duration,
) {
    acquisition.run(interval).await
}

#[embassy_executor::task]
async fn aggregation_task(mut aggregation: Aggregation<'static>, interval: Duration) {
    aggregation.run(interval).await
}

#[embassy_executor::task]
async fn storage_task(storage: StorageManager<'static, DirStore>) {
    storage.run().await
}

#[embassy_executor::task]
async fn upload_task(mut upload: Upload<'static, FlakyLink, LogCollector>, interval: Duration) {
    upload.run(interval).await
}

#[embassy_executor::task]
async fn time_sync_task(mut sync: TimeSync<'static, FlakyLink, HostTime, RtcHandle>) {
    sync.run().await
}

#[embassy_executor::task]
async fn monitor_task() {
    run_monitor(&SYSTEM_STATUS, || FAKE_FREE_HEAP).await
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    env_logger::init();
    info!("Starting loam simulator");

    let settings = simulator_config();
    if let Err(e) = settings.validate() {
        log::error!("Simulator config rejected: {}", e);
        return;
    }

    let data_dir = std::env::var("LOAM_SIM_DATA").unwrap_or_else(|_| "sim-data".into());
    let store = DirStore::new(data_dir);
    info!("Daily files go to {}", store.root().display());

    let status = &SYSTEM_STATUS;
    let network_timeout = settings.internet.connect_timeout();

    // The host process lives as long as its tasks
    let clock: &'static ClockCell<SimClock> =
        Box::leak(Box::new(ClockCell::new(SimClock::reset())));
    let store: &'static StoreLock<DirStore> = Box::leak(Box::new(StoreLock::new(store)));
    let link: &'static LinkCell<FlakyLink> =
        Box::leak(Box::new(LinkCell::new(FlakyLink::new(LINK_FAIL_EVERY))));

    let acquisition = Acquisition::new(
        SharedClock::new(clock),
        sensors(),
        PIPELINE.raw.sender(),
        status,
    );
    let aggregation = Aggregation::new(
        PIPELINE.raw.receiver(),
        PIPELINE.storage.sender(),
        Some(&PIPELINE.upload),
        settings.pipeline.stats_send_timeout(),
        status,
    );
    let storage = StorageManager::new(
        store,
        PIPELINE.storage.receiver(),
        status,
        settings.pipeline.storage_lock_timeout(),
    );
    let upload = Upload::new(
        link,
        LogCollector::new(settings.collector.topic, PUBLISH_DROP_EVERY),
        &PIPELINE.upload,
        status,
        settings.collector.device_id,
        network_timeout,
        settings.pipeline.publish_spacing(),
    );
    let sync = TimeSync::new(
        link,
        HostTime::default(),
        SharedClock::new(clock),
        status,
        settings.time.clone(),
        network_timeout,
    );

    spawner.spawn(monitor_task()).unwrap();
    spawner.spawn(storage_task(storage)).unwrap();
    spawner
        .spawn(aggregation_task(aggregation, settings.pipeline.window_interval()))
        .unwrap();
    spawner
        .spawn(acquisition_task(acquisition, settings.pipeline.sample_interval()))
        .unwrap();
    spawner
        .spawn(upload_task(upload, settings.pipeline.upload_interval()))
        .unwrap();
    spawner.spawn(time_sync_task(sync)).unwrap();

    info!("All tasks running, Ctrl-C to stop");
    loop {
        Timer::after(Duration::from_secs(3600)).await;
    }
}
