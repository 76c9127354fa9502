//! Process-wide status record and the telemetry monitor loop
//!
//! Every task reports into one [`SystemStatus`]. Fields are individual
//! atomics accessed with `Relaxed` ordering and no lock: each counter has
//! exactly one writer task (listed on the field), and readers only need
//! eventually-consistent telemetry. A [`StatusSnapshot`] taken while tasks
//! run may therefore mix values from slightly different instants.

use core::sync::atomic::{AtomicBool, AtomicI8, AtomicU32, Ordering};

use embassy_time::{Duration, Instant, Ticker};
use log::info;
use serde::{Deserialize, Serialize};

/// Global status record used by the firmware tasks
pub static SYSTEM_STATUS: SystemStatus = SystemStatus::new();

/// Live status counters and flags.
pub struct SystemStatus {
    /// Writer: monitor
    uptime_seconds: AtomicU32,
    /// Writer: monitor
    free_heap: AtomicU32,
    /// Writer: monitor
    min_free_heap: AtomicU32,
    /// Writers: upload and time sync, which never hold the link at the same time
    wifi_connected: AtomicBool,
    /// Signal strength at the last association, 0 before the first one.
    /// Writers: upload and time sync, through the link
    wifi_rssi: AtomicI8,
    /// Writer: upload
    mqtt_connected: AtomicBool,
    /// Writer: storage
    sd_card_ok: AtomicBool,
    /// Writer: time sync
    time_synced: AtomicBool,
    /// Writer: acquisition
    total_readings: AtomicU32,
    /// Writer: acquisition
    failed_readings: AtomicU32,
    /// Writer: aggregation
    records_emitted: AtomicU32,
    /// Writer: aggregation
    records_dropped: AtomicU32,
    /// Writer: storage
    rows_written: AtomicU32,
    /// Writer: storage
    sd_write_errors: AtomicU32,
    /// Writer: upload
    uploads_ok: AtomicU32,
    /// Writer: upload
    upload_errors: AtomicU32,
    /// Writer: time sync
    time_sync_failures: AtomicU32,
    /// Writer: time sync
    last_sync: AtomicU32,
    /// Monotonic seconds at `last_sync`. Writer: time sync
    last_sync_uptime: AtomicU32,
}

impl Default for SystemStatus {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! counter {
    ($field:ident, $incr:ident) => {
        pub fn $field(&self) -> u32 {
            self.$field.load(Ordering::Relaxed)
        }

        pub fn $incr(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }
    };
}

macro_rules! flag {
    ($field:ident, $set:ident) => {
        pub fn $field(&self) -> bool {
            self.$field.load(Ordering::Relaxed)
        }

        pub fn $set(&self, value: bool) {
            self.$field.store(value, Ordering::Relaxed);
        }
    };
}

impl SystemStatus {
    /// All-zero, all-false status, as at boot
    pub const fn new() -> Self {
        Self {
            uptime_seconds: AtomicU32::new(0),
            free_heap: AtomicU32::new(0),
            min_free_heap: AtomicU32::new(u32::MAX),
            wifi_connected: AtomicBool::new(false),
            wifi_rssi: AtomicI8::new(0),
            mqtt_connected: AtomicBool::new(false),
            sd_card_ok: AtomicBool::new(false),
            time_synced: AtomicBool::new(false),
            total_readings: AtomicU32::new(0),
            failed_readings: AtomicU32::new(0),
            records_emitted: AtomicU32::new(0),
            records_dropped: AtomicU32::new(0),
            rows_written: AtomicU32::new(0),
            sd_write_errors: AtomicU32::new(0),
            uploads_ok: AtomicU32::new(0),
            upload_errors: AtomicU32::new(0),
            time_sync_failures: AtomicU32::new(0),
            last_sync: AtomicU32::new(0),
            last_sync_uptime: AtomicU32::new(0),
        }
    }

    counter!(total_readings, record_reading);
    counter!(failed_readings, record_failed_reading);
    counter!(records_emitted, record_emitted);
    counter!(records_dropped, record_dropped);
    counter!(rows_written, record_row_written);
    counter!(sd_write_errors, record_sd_write_error);
    counter!(uploads_ok, record_upload);
    counter!(upload_errors, record_upload_error);
    counter!(time_sync_failures, record_time_sync_failure);

    flag!(wifi_connected, set_wifi_connected);
    flag!(mqtt_connected, set_mqtt_connected);
    flag!(sd_card_ok, set_sd_card_ok);
    flag!(time_synced, set_time_synced);

    pub fn uptime_seconds(&self) -> u32 {
        self.uptime_seconds.load(Ordering::Relaxed)
    }

    pub fn set_uptime_seconds(&self, seconds: u32) {
        self.uptime_seconds.store(seconds, Ordering::Relaxed);
    }

    pub fn free_heap(&self) -> u32 {
        self.free_heap.load(Ordering::Relaxed)
    }

    /// Lowest free heap seen so far, 0 before the first report
    pub fn min_free_heap(&self) -> u32 {
        match self.min_free_heap.load(Ordering::Relaxed) {
            u32::MAX => 0,
            bytes => bytes,
        }
    }

    /// Records the current free heap and lowers the watermark if needed.
    pub fn report_heap(&self, free_bytes: u32) {
        self.free_heap.store(free_bytes, Ordering::Relaxed);
        self.min_free_heap.fetch_min(free_bytes, Ordering::Relaxed);
    }

    /// RSSI in dBm seen at the last association
    pub fn wifi_rssi(&self) -> Option<i8> {
        match self.wifi_rssi.load(Ordering::Relaxed) {
            0 => None,
            dbm => Some(dbm),
        }
    }

    pub fn set_wifi_rssi(&self, dbm: i8) {
        self.wifi_rssi.store(dbm, Ordering::Relaxed);
    }

    pub fn last_sync(&self) -> u32 {
        self.last_sync.load(Ordering::Relaxed)
    }

    /// Marks a successful clock correction at UTC `timestamp`.
    pub fn record_time_sync(&self, timestamp: u32) {
        self.last_sync_uptime.store(monotonic_seconds(), Ordering::Relaxed);
        self.last_sync.store(timestamp, Ordering::Relaxed);
        self.time_synced.store(true, Ordering::Relaxed);
    }

    /// UTC estimate from the last sync plus the monotonic time since, for
    /// consumers that cannot read the RTC (file system metadata).
    ///
    /// `None` before the first sync.
    pub fn estimated_time(&self) -> Option<u32> {
        if !self.time_synced() {
            return None;
        }
        let synced_at = self.last_sync_uptime.load(Ordering::Relaxed);
        let elapsed = monotonic_seconds().saturating_sub(synced_at);
        Some(self.last_sync().saturating_add(elapsed))
    }

    /// Copies every field out for reporting.
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            uptime_seconds: self.uptime_seconds(),
            free_heap: self.free_heap(),
            min_free_heap: self.min_free_heap(),
            wifi_connected: self.wifi_connected(),
            wifi_rssi: self.wifi_rssi(),
            mqtt_connected: self.mqtt_connected(),
            sd_card_ok: self.sd_card_ok(),
            time_synced: self.time_synced(),
            total_readings: self.total_readings(),
            failed_readings: self.failed_readings(),
            records_emitted: self.records_emitted(),
            records_dropped: self.records_dropped(),
            rows_written: self.rows_written(),
            sd_write_errors: self.sd_write_errors(),
            uploads_ok: self.uploads_ok(),
            upload_errors: self.upload_errors(),
            time_sync_failures: self.time_sync_failures(),
            last_sync: self.last_sync(),
        }
    }
}

/// Point-in-time copy of [`SystemStatus`], for diagnostics output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub uptime_seconds: u32,
    pub free_heap: u32,
    pub min_free_heap: u32,
    pub wifi_connected: bool,
    pub wifi_rssi: Option<i8>,
    pub mqtt_connected: bool,
    pub sd_card_ok: bool,
    pub time_synced: bool,
    pub total_readings: u32,
    pub failed_readings: u32,
    pub records_emitted: u32,
    pub records_dropped: u32,
    pub rows_written: u32,
    pub sd_write_errors: u32,
    pub uploads_ok: u32,
    pub upload_errors: u32,
    pub time_sync_failures: u32,
    pub last_sync: u32,
}

impl StatusSnapshot {
    /// Encodes the snapshot as a compact postcard frame into `buffer`.
    pub fn encode<'b>(&self, buffer: &'b mut [u8]) -> Result<&'b mut [u8], postcard::Error> {
        postcard::to_slice(self, buffer)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

impl core::fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "up {}s | heap {}/{} | wifi {} rssi {:?} mqtt {} sd {} sync {} | readings {} ({} failed) | records {} ({} dropped) | rows {} ({} errors) | uploads {} ({} errors) | sync failures {}",
            self.uptime_seconds,
            self.free_heap,
            self.min_free_heap,
            self.wifi_connected,
            self.wifi_rssi,
            self.mqtt_connected,
            self.sd_card_ok,
            self.time_synced,
            self.total_readings,
            self.failed_readings,
            self.records_emitted,
            self.records_dropped,
            self.rows_written,
            self.sd_write_errors,
            self.uploads_ok,
            self.upload_errors,
            self.time_sync_failures,
        )
    }
}

/// Source of heap telemetry, provided by the platform.
pub trait HeapProbe {
    /// Currently free heap in bytes
    fn free_bytes(&self) -> u32;
}

impl<F: Fn() -> u32> HeapProbe for F {
    fn free_bytes(&self) -> u32 {
        self()
    }
}

/// How often the monitor refreshes telemetry
pub const MONITOR_INTERVAL: Duration = Duration::from_secs(10);

/// How many monitor ticks between status summary log lines
const SUMMARY_EVERY: u32 = 6;

/// Refreshes uptime and heap telemetry forever and logs a periodic summary.
pub async fn run_monitor<H: HeapProbe>(status: &SystemStatus, heap: H) -> ! {
    let mut ticker = Ticker::every(MONITOR_INTERVAL);
    let mut ticks: u32 = 0;

    loop {
        refresh_telemetry(status, &heap);

        ticks = ticks.wrapping_add(1);
        if ticks % SUMMARY_EVERY == 0 {
            info!("Status: {}", status.snapshot());
        }

        ticker.next().await;
    }
}

fn monotonic_seconds() -> u32 {
    Instant::now().as_secs().min(u32::MAX as u64) as u32
}

/// One monitor step: uptime from the monotonic clock, heap from the probe.
pub fn refresh_telemetry<H: HeapProbe>(status: &SystemStatus, heap: &H) {
    status.set_uptime_seconds(monotonic_seconds());
    status.report_heap(heap.free_bytes());
}
