use embassy_futures::join::join;
use embassy_time::{Duration, Ticker, with_timeout};
use log::{debug, info, warn};

use super::{RawReceiver, StatsSender, UploadQueue};
use crate::app_state::SystemStatus;
use crate::records::StatisticsRecord;
use crate::stats::WindowAccumulator;

/// Window stage: folds everything acquisition queued since the last tick
/// into one [`StatisticsRecord`].
pub struct Aggregation<'a> {
    raw: RawReceiver<'a>,
    storage: StatsSender<'a>,
    /// `None` when the collector is disabled
    upload: Option<&'a UploadQueue>,
    window: WindowAccumulator,
    send_timeout: Duration,
    status: &'a SystemStatus,
}

impl<'a> Aggregation<'a> {
    pub fn new(
        raw: RawReceiver<'a>,
        storage: StatsSender<'a>,
        upload: Option<&'a UploadQueue>,
        send_timeout: Duration,
        status: &'a SystemStatus,
    ) -> Self {
        Self {
            raw,
            storage,
            upload,
            window: WindowAccumulator::new(),
            send_timeout,
            status,
        }
    }

    /// Closes the current window.
    ///
    /// Drains the raw queue without waiting, then emits the record (if any
    /// sample arrived) to both consumers with a bounded wait each. The
    /// accumulator is reset whether or not a record was emitted.
    pub async fn tick(&mut self) -> Option<StatisticsRecord> {
        while let Ok(sample) = self.raw.try_receive() {
            self.window.fold(&sample);
        }

        let Some(record) = self.window.finish() else {
            debug!("Aggregation: empty window, nothing emitted");
            return None;
        };

        self.status.record_emitted();
        info!(
            "Aggregation: window {}..{} with {} samples",
            record.window_start, record.window_end, record.sample_count
        );

        let to_storage = with_timeout(self.send_timeout, self.storage.send(record));
        match self.upload {
            Some(upload) => {
                let to_upload = with_timeout(self.send_timeout, upload.send(record));
                let (stored, queued) = join(to_storage, to_upload).await;
                self.check_handoff("storage", stored.is_ok());
                self.check_handoff("upload", queued.is_ok());
            }
            None => {
                let stored = to_storage.await;
                self.check_handoff("storage", stored.is_ok());
            }
        }

        Some(record)
    }

    fn check_handoff(&self, consumer: &str, delivered: bool) {
        if !delivered {
            warn!("Aggregation: {} queue full, record dropped", consumer);
            self.status.record_dropped();
        }
    }

    pub async fn run(&mut self, interval: Duration) -> ! {
        let mut ticker = Ticker::every(interval);
        loop {
            ticker.next().await;
            self.tick().await;
        }
    }
}
