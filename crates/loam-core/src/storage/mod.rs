//! Durable storage of statistics records
//!
//! Records land in one CSV file per UTC calendar day. The storage task only
//! talks to the device through [`RowStore`], so the same task drives the SD
//! card on hardware, a directory on the simulator host, and an in-memory
//! store in tests.

pub mod csv;
pub mod manager;
pub mod memory;
#[cfg(feature = "storage-sdmmc")]
pub mod sd_card;

use core::fmt::Write;

use chrono::{DateTime, Datelike};
use log::info;
use thiserror_no_std::Error;

pub use csv::{HEADER, format_row};
pub use manager::StorageManager;
pub use memory::MemoryStore;

/// Capacity of a daily file name, `YYYYMMDD.CSV`
pub const FILE_NAME_LEN: usize = 12;

pub type FileName = heapless::String<FILE_NAME_LEN>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage device not mounted")]
    NotMounted,
    #[error("Storage device failed to mount")]
    MountFailed,
    #[error("Timed out waiting for the storage lock")]
    LockTimeout,
    #[error("Storage I/O error during {0}")]
    Io(&'static str),
    #[error("Timestamp {0} has no calendar date")]
    InvalidTimestamp(u32),
    #[error("Row does not fit the row buffer")]
    RowOverflow,
}

/// Append-only tabular file store.
///
/// Every call is a complete open/write/close cycle; nothing is held open
/// between calls, so a store can be dropped or remounted at any point.
pub trait RowStore {
    /// (Re)initializes the device and checks that the volume is readable.
    fn mount(&mut self) -> Result<(), StorageError>;

    fn is_mounted(&self) -> bool;

    /// Forgets the mount so the next record triggers a fresh [`RowStore::mount`].
    fn unmount(&mut self);

    /// Creates `name` with `header` as its first line if it does not exist.
    ///
    /// Returns `true` when the file was created.
    fn ensure_file(&mut self, name: &str, header: &str) -> Result<bool, StorageError>;

    /// Appends `row` plus a line terminator to `name`.
    fn append_row(&mut self, name: &str, row: &str) -> Result<(), StorageError>;

    /// Calls `visit` with the name and size of every file in the root
    /// directory.
    fn list_files(&mut self, visit: &mut dyn FnMut(&str, u64)) -> Result<(), StorageError>;

    /// Raw size of the underlying device, for stores that know it.
    fn capacity_bytes(&mut self) -> Option<u64> {
        None
    }
}

/// What a mounted store holds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreUsage {
    pub files: u32,
    pub used_bytes: u64,
    pub capacity_bytes: Option<u64>,
}

impl core::fmt::Display for StoreUsage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} files, {} KB used", self.files, self.used_bytes / 1024)?;
        if let Some(capacity) = self.capacity_bytes {
            write!(f, " of {} MB", capacity / (1024 * 1024))?;
        }
        Ok(())
    }
}

/// Lists the root directory into the log and totals it up.
pub fn usage<R: RowStore + ?Sized>(store: &mut R) -> Result<StoreUsage, StorageError> {
    let mut usage = StoreUsage {
        capacity_bytes: store.capacity_bytes(),
        ..StoreUsage::default()
    };

    store.list_files(&mut |name, size| {
        info!("   {} ({} bytes)", name, size);
        usage.files += 1;
        usage.used_bytes += size;
    })?;
    Ok(usage)
}

/// Name of the file holding records whose window starts at `timestamp`.
///
/// 8.3 so it is valid on a plain FAT volume: `20251016.CSV`.
pub fn daily_file_name(timestamp: u32) -> Result<FileName, StorageError> {
    let date = DateTime::from_timestamp(timestamp as i64, 0)
        .ok_or(StorageError::InvalidTimestamp(timestamp))?
        .date_naive();

    let mut name = FileName::new();
    write!(
        name,
        "{:04}{:02}{:02}.CSV",
        date.year(),
        date.month(),
        date.day()
    )
    .map_err(|_| StorageError::InvalidTimestamp(timestamp))?;
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_totals_every_file() {
        let mut store = MemoryStore::new();
        assert_eq!(usage(&mut store), Err(StorageError::NotMounted));

        store.mount().unwrap();
        store.ensure_file("20251016.CSV", "ab").unwrap();
        store.append_row("20251016.CSV", "cdef").unwrap();
        store.ensure_file("20251017.CSV", "ab").unwrap();

        let summary = usage(&mut store).expect("mounted store lists");
        assert_eq!(summary.files, 2);
        // Lines are CRLF-terminated
        assert_eq!(summary.used_bytes, (2 + 2) + (4 + 2) + (2 + 2));
        assert_eq!(summary.capacity_bytes, None);
    }

    #[test]
    fn test_usage_display() {
        let summary = StoreUsage {
            files: 3,
            used_bytes: 4096,
            capacity_bytes: Some(8 * 1024 * 1024 * 1024),
        };
        assert_eq!(alloc::format!("{}", summary), "3 files, 4 KB used of 8192 MB");
    }

    #[test]
    fn test_daily_file_name() {
        // 2025-10-16T12:00:00Z
        assert_eq!(daily_file_name(1_760_616_000).unwrap().as_str(), "20251016.CSV");
    }

    #[test]
    fn test_file_rolls_over_at_utc_midnight() {
        // 2024-02-29T23:59:59Z and one second later
        assert_eq!(daily_file_name(1_709_251_199).unwrap().as_str(), "20240229.CSV");
        assert_eq!(daily_file_name(1_709_251_200).unwrap().as_str(), "20240301.CSV");
    }
}
