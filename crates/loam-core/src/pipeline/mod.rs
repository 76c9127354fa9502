//! The periodic stages of the logger and the queues between them
//!
//! ```text
//! Acquisition --raw--> Aggregation --storage--> StorageManager
//!                                   \--upload---> Upload
//! ```
//!
//! Aggregation emits every record into two independent queues, so storage
//! and upload each see the full stream in order regardless of how fast the
//! other one consumes it.

pub mod acquisition;
pub mod aggregation;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};

use crate::queue::RetryQueue;
use crate::records::{RawSample, StatisticsRecord};

pub use acquisition::{Acquisition, TickOutcome};
pub use aggregation::Aggregation;

/// One minute of samples at the default 1 s cadence
pub const RAW_QUEUE_CAPACITY: usize = 60;

/// Ten aggregation windows, per consumer
pub const STATS_QUEUE_CAPACITY: usize = 10;

pub type RawQueue = Channel<CriticalSectionRawMutex, RawSample, RAW_QUEUE_CAPACITY>;
pub type RawSender<'a> = Sender<'a, CriticalSectionRawMutex, RawSample, RAW_QUEUE_CAPACITY>;
pub type RawReceiver<'a> = Receiver<'a, CriticalSectionRawMutex, RawSample, RAW_QUEUE_CAPACITY>;

pub type StatsQueue = Channel<CriticalSectionRawMutex, StatisticsRecord, STATS_QUEUE_CAPACITY>;
pub type StatsSender<'a> =
    Sender<'a, CriticalSectionRawMutex, StatisticsRecord, STATS_QUEUE_CAPACITY>;
pub type StatsReceiver<'a> =
    Receiver<'a, CriticalSectionRawMutex, StatisticsRecord, STATS_QUEUE_CAPACITY>;

/// Upload backlog; records leave it only once published
pub type UploadQueue = RetryQueue<CriticalSectionRawMutex, StatisticsRecord, STATS_QUEUE_CAPACITY>;

/// Every queue of the pipeline, suitable for a `static`.
pub struct PipelineQueues {
    pub raw: RawQueue,
    pub storage: StatsQueue,
    pub upload: UploadQueue,
}

impl Default for PipelineQueues {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineQueues {
    pub const fn new() -> Self {
        Self {
            raw: Channel::new(),
            storage: Channel::new(),
            upload: RetryQueue::new(),
        }
    }
}
