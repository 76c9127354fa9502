use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, with_timeout};
use log::{error, info, warn};

use super::{HEADER, RowStore, StorageError, StoreUsage, daily_file_name, format_row, usage};
use crate::app_state::SystemStatus;
use crate::pipeline::StatsReceiver;
use crate::records::StatisticsRecord;

/// Lock guarding the storage device
pub type StoreLock<R> = Mutex<CriticalSectionRawMutex, R>;

/// Storage task: persists every statistics record to its daily CSV file
///
/// For each record received it:
/// 1. Takes the storage lock, waiting at most `lock_timeout`
/// 2. Remounts the device if it is not mounted
/// 3. Creates the day's file with the header if needed, then appends one row
/// 4. Releases the lock
///
/// The lock covers a single record. A record that fails to persist is
/// counted and dropped, never re-queued.
pub struct StorageManager<'a, R: RowStore> {
    store: &'a StoreLock<R>,
    records: StatsReceiver<'a>,
    status: &'a SystemStatus,
    lock_timeout: Duration,
}

impl<'a, R: RowStore> StorageManager<'a, R> {
    pub fn new(
        store: &'a StoreLock<R>,
        records: StatsReceiver<'a>,
        status: &'a SystemStatus,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            store,
            records,
            status,
            lock_timeout,
        }
    }

    /// First mount attempt at boot, followed by a listing of the files
    /// already on the volume. Failure is not fatal: the next record retries
    /// the mount.
    pub async fn init(&self) -> Option<StoreUsage> {
        let mounted = match with_timeout(self.lock_timeout, self.store.lock()).await {
            Ok(mut store) => store.mount().map(|()| {
                info!(" Storage mounted, files on volume:");
                usage(&mut *store)
                    .inspect_err(|e| warn!(" Storage listing failed: {}", e))
                    .ok()
            }),
            Err(_) => Err(StorageError::LockTimeout),
        };
        self.status.set_sd_card_ok(mounted.is_ok());

        match mounted {
            Ok(listed) => {
                if let Some(summary) = listed {
                    info!(" Storage: {}", summary);
                }
                listed
            }
            Err(e) => {
                warn!(" Storage not available at boot: {}", e);
                None
            }
        }
    }

    /// Runs the storage task forever. Waiting for the next record is the
    /// only unbounded wait in the pipeline.
    pub async fn run(&self) -> ! {
        self.init().await;

        loop {
            let record = self.records.receive().await;
            // Failures are counted inside; the loop always continues
            let _ = self.process_record(&record).await;
        }
    }

    /// Persists one record and updates the storage counters.
    pub async fn process_record(&self, record: &StatisticsRecord) -> Result<(), StorageError> {
        match self.persist(record).await {
            Ok(created) => {
                if created {
                    info!(" Created daily file for {}", record.window_start);
                }
                self.status.record_row_written();
                self.status.set_sd_card_ok(true);
                Ok(())
            }
            Err(e) => {
                error!(
                    " Failed to write record {}..{}: {:?}",
                    record.window_start, record.window_end, e
                );
                self.status.record_sd_write_error();
                self.status.set_sd_card_ok(false);
                Err(e)
            }
        }
    }

    async fn persist(&self, record: &StatisticsRecord) -> Result<bool, StorageError> {
        let name = daily_file_name(record.window_start)?;
        let row = format_row(record)?;

        let mut store = with_timeout(self.lock_timeout, self.store.lock())
            .await
            .map_err(|_| StorageError::LockTimeout)?;

        if !store.is_mounted() {
            self.status.set_sd_card_ok(false);
            info!(" Storage not mounted, remounting");
            store.mount()?;
        }

        let written = store
            .ensure_file(&name, HEADER)
            .and_then(|created| store.append_row(&name, &row).map(|()| created));

        if written.is_err() {
            store.unmount();
        }
        written
    }
}
