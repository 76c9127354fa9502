use core::fmt::Write;
use core::ops::ControlFlow;

use embedded_sdmmc::{Error, Mode, SdCard, SdCardError, TimeSource, VolumeIdx, VolumeManager};
use log::{error, info, warn};

use super::{FileName, RowStore, StorageError};

/// Line terminator of the daily files
const LINE_END: &[u8] = b"\r\n";

/// FAT volume on an SD card, behind [`RowStore`].
///
/// SD card operations are blocking and share the SPI bus with nothing else,
/// so each call simply runs to completion while the storage lock is held.
pub struct SdCardStore<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    volume_mgr: VolumeManager<SdCard<S, D>, T, 4, 4, 1>,
    mounted: bool,
}

impl<S, D, T> SdCardStore<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    pub fn new(sd_card: SdCard<S, D>, ts: T) -> Self {
        Self {
            volume_mgr: VolumeManager::new(sd_card, ts),
            mounted: false,
        }
    }

    fn write_line(&self, name: &str, line: &str, mode: Mode) -> Result<(), Error<SdCardError>> {
        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;
        let file = root_dir.open_file_in_dir(name, mode)?;

        file.write(line.as_bytes())?;
        file.write(LINE_END)?;

        // Close explicitly so flush errors surface
        file.close()?;
        root_dir.close()?;
        volume0.close()?;
        Ok(())
    }
}

fn io_error(operation: &'static str, e: Error<SdCardError>) -> StorageError {
    error!(" SD card {} failed: {:?}", operation, e);
    StorageError::Io(operation)
}

impl<S, D, T> RowStore for SdCardStore<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    fn mount(&mut self) -> Result<(), StorageError> {
        self.mounted = false;

        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0)).map_err(|e| {
            error!(" SD card mount failed: {:?}", e);
            StorageError::MountFailed
        })?;
        volume0.close().map_err(|e| io_error("mount", e))?;

        let (card_type, size) = self
            .volume_mgr
            .device(|card| (card.get_card_type(), card.num_bytes()));
        match size {
            Ok(bytes) => info!(
                " SD card {:?}, {} MB",
                card_type,
                bytes / (1024 * 1024)
            ),
            Err(e) => warn!(" SD card size unknown: {:?}", e),
        }

        self.mounted = true;
        Ok(())
    }

    fn list_files(&mut self, visit: &mut dyn FnMut(&str, u64)) -> Result<(), StorageError> {
        if !self.mounted {
            return Err(StorageError::NotMounted);
        }

        let volume0 = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(|e| io_error("list", e))?;
        let root_dir = volume0.open_root_dir().map_err(|e| io_error("list", e))?;
        root_dir
            .iterate_dir(|entry| {
                if entry.attributes.is_directory() || entry.attributes.is_volume() {
                    return ControlFlow::Continue(());
                }
                let mut name = FileName::new();
                if write!(name, "{}", entry.name).is_ok() {
                    visit(&name, entry.size as u64);
                }
                ControlFlow::Continue(())
            })
            .map_err(|e| io_error("list", e))?;
        root_dir.close().map_err(|e| io_error("list", e))?;
        volume0.close().map_err(|e| io_error("list", e))?;
        Ok(())
    }

    fn capacity_bytes(&mut self) -> Option<u64> {
        self.volume_mgr.device(|card| card.num_bytes()).ok()
    }

    fn is_mounted(&self) -> bool {
        self.mounted
    }

    fn unmount(&mut self) {
        self.mounted = false;
    }

    fn ensure_file(&mut self, name: &str, header: &str) -> Result<bool, StorageError> {
        if !self.mounted {
            return Err(StorageError::NotMounted);
        }

        match self.write_line(name, header, Mode::ReadWriteCreate) {
            Ok(()) => Ok(true),
            Err(Error::FileAlreadyExists) => Ok(false),
            Err(e) => Err(io_error("create", e)),
        }
    }

    fn append_row(&mut self, name: &str, row: &str) -> Result<(), StorageError> {
        if !self.mounted {
            return Err(StorageError::NotMounted);
        }

        self.write_line(name, row, Mode::ReadWriteAppend)
            .map_err(|e| io_error("append", e))
    }
}
