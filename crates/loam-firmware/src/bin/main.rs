#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_net::{Config as NetConfig, StackResources};
use embassy_time::{Duration, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::gpio::Flex;
use esp_hal::interrupt::Priority;
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::rng::Rng;
use esp_hal::timer::timg::TimerGroup;
use esp_rtos::embassy::InterruptExecutor;
use log::{info, warn};
use static_cell::StaticCell;

use loam_core::app_state::SYSTEM_STATUS;
use loam_core::network::Upload;
use loam_core::pipeline::{Acquisition, Aggregation, PipelineQueues};
use loam_core::sensors::{Calibration, Ds1308, Ds18b20Sensor, Sen0193Sensor, SharedClock, SharedI2c};
use loam_core::storage::StorageManager;
use loam_core::time_sync::TimeSync;
use loam_firmware::config::config;
use loam_firmware::hardware::{SoilAdc, create_i2c_bus, create_sd_store};
use loam_firmware::net::wifi::net_task;
use loam_firmware::net::{MqttCollector, SntpClient, WifiLink};
use loam_firmware::onewire::OneWirePin;
use loam_firmware::tasks::{
    RtcCell, SdLock, WifiCell, acquisition_task, aggregation_task, monitor_task, storage_task,
    time_sync_task, upload_task,
};

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

/// Queues between the pipeline stages
static PIPELINE: PipelineQueues = PipelineQueues::new();

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!(log::LevelFilter::Info);

    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(hal_config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // Acquisition preempts aggregation and storage, which preempt the
    // network tasks on the thread executor
    let sw_ints = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    static SAMPLING_EXECUTOR: StaticCell<InterruptExecutor<2>> = StaticCell::new();
    let sampling_spawner = SAMPLING_EXECUTOR
        .init(InterruptExecutor::new(sw_ints.software_interrupt2))
        .start(Priority::Priority3);
    static PIPELINE_EXECUTOR: StaticCell<InterruptExecutor<1>> = StaticCell::new();
    let pipeline_spawner = PIPELINE_EXECUTOR
        .init(InterruptExecutor::new(sw_ints.software_interrupt1))
        .start(Priority::Priority2);

    let settings = config();
    settings.validate().expect("Invalid firmware configuration");
    info!(
        "loam logger starting: sample {} ms, window {} ms, upload {} ms",
        settings.pipeline.sample_interval_ms,
        settings.pipeline.window_interval_ms,
        settings.pipeline.upload_interval_ms
    );

    let status = &SYSTEM_STATUS;
    let network_timeout = settings.internet.connect_timeout();

    // 1. I2C bus and RTC
    let i2c_bus = create_i2c_bus(peripherals.I2C0, peripherals.GPIO8, peripherals.GPIO9)
        .expect("Failed to initialize I2C bus");

    let mut rtc = Ds1308::new(SharedI2c::new(i2c_bus));
    if let Err(e) = rtc.probe().await {
        // Acquisition keeps running and marks every sample invalid
        warn!("RTC: {}", e);
    }
    static RTC: StaticCell<RtcCell> = StaticCell::new();
    let rtc: &'static RtcCell = RTC.init(RtcCell::new(rtc));

    // 2. Sensors, in column order
    let probe = Ds18b20Sensor::new(OneWirePin::new(Flex::new(peripherals.GPIO10)));
    let soil = Sen0193Sensor::new(
        SoilAdc::new(peripherals.ADC1, peripherals.GPIO1),
        Calibration::default(),
    );
    #[cfg(feature = "sensor-sht40")]
    let sensors = (
        probe,
        loam_core::sensors::Sht40Sensor::new(SharedI2c::new(i2c_bus)),
        soil,
    );
    #[cfg(not(feature = "sensor-sht40"))]
    let sensors = (probe, soil);

    // 3. SD card
    let sd_store = create_sd_store(
        peripherals.SPI2,
        peripherals.GPIO6,
        peripherals.GPIO7,
        peripherals.GPIO2,
        peripherals.GPIO3,
    )
    .expect("Failed to initialize SD card SPI bus");
    static SD_STORE: StaticCell<SdLock> = StaticCell::new();
    let sd_store: &'static SdLock = SD_STORE.init(SdLock::new(sd_store));

    // 4. WiFi and network stack
    static RADIO_INIT: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
    let radio_init =
        RADIO_INIT.init(esp_radio::init().expect("Failed to initialize Wi-Fi/BLE controller"));
    let (wifi_controller, interfaces) =
        esp_radio::wifi::new(radio_init, peripherals.WIFI, Default::default())
            .expect("Failed to initialize Wi-Fi controller");

    let rng = Rng::new();
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;

    // DHCP, DNS, the MQTT TCP socket and the SNTP UDP socket
    static RESOURCES: StaticCell<StackResources<5>> = StaticCell::new();
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        NetConfig::dhcpv4(Default::default()),
        RESOURCES.init(StackResources::new()),
        seed,
    );
    spawner.spawn(net_task(runner)).expect("Failed to spawn network task");

    static WIFI: StaticCell<WifiCell> = StaticCell::new();
    let link: &'static WifiCell =
        WIFI.init(WifiCell::new(WifiLink::new(wifi_controller, stack, &settings.internet)));

    // 5. Pipeline tasks
    let acquisition = Acquisition::new(
        SharedClock::new(rtc),
        sensors,
        PIPELINE.raw.sender(),
        status,
    );
    let aggregation = Aggregation::new(
        PIPELINE.raw.receiver(),
        PIPELINE.storage.sender(),
        settings.collector.enabled.then_some(&PIPELINE.upload),
        settings.pipeline.stats_send_timeout(),
        status,
    );
    let storage = StorageManager::new(
        sd_store,
        PIPELINE.storage.receiver(),
        status,
        settings.pipeline.storage_lock_timeout(),
    );
    let sync = TimeSync::new(
        link,
        SntpClient::new(stack, settings.time.ntp_server, network_timeout),
        SharedClock::new(rtc),
        status,
        settings.time.clone(),
        network_timeout,
    );

    spawner.spawn(monitor_task()).expect("Failed to spawn monitor task");
    pipeline_spawner
        .spawn(storage_task(storage))
        .expect("Failed to spawn storage task");
    pipeline_spawner
        .spawn(aggregation_task(aggregation, settings.pipeline.window_interval()))
        .expect("Failed to spawn aggregation task");
    sampling_spawner
        .spawn(acquisition_task(acquisition, settings.pipeline.sample_interval()))
        .expect("Failed to spawn acquisition task");

    if settings.collector.enabled {
        let upload = Upload::new(
            link,
            MqttCollector::new(stack, settings.collector.clone(), network_timeout),
            &PIPELINE.upload,
            status,
            settings.collector.device_id,
            network_timeout,
            settings.pipeline.publish_spacing(),
        );
        spawner
            .spawn(upload_task(upload, settings.pipeline.upload_interval()))
            .expect("Failed to spawn upload task");
    } else {
        info!("Collector disabled, records are only written to the SD card");
    }

    spawner
        .spawn(time_sync_task(sync))
        .expect("Failed to spawn time sync task");

    info!("All tasks running");
    loop {
        Timer::after(Duration::from_secs(3600)).await;
    }
}
