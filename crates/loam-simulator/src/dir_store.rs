//! [`RowStore`] on a host directory, standing in for the SD card volume

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use loam_core::storage::{RowStore, StorageError};
use log::error;

const LINE_END: &str = "\r\n";

pub struct DirStore {
    root: PathBuf,
    mounted: bool,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mounted: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn write_line(&self, name: &str, line: &str, create: bool) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .create_new(create)
            .open(self.root.join(name))?;
        file.write_all(line.as_bytes())?;
        file.write_all(LINE_END.as_bytes())?;
        file.sync_data()
    }
}

fn io_error(operation: &'static str, e: std::io::Error) -> StorageError {
    error!(" Directory store {} failed: {:?}", operation, e);
    StorageError::Io(operation)
}

impl RowStore for DirStore {
    fn mount(&mut self) -> Result<(), StorageError> {
        self.mounted = false;
        fs::create_dir_all(&self.root).map_err(|e| {
            error!(" Cannot create {}: {:?}", self.root.display(), e);
            StorageError::MountFailed
        })?;
        self.mounted = true;
        Ok(())
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

        match self.write_line(name, header, true) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(io_error("create", e)),
        }
    }

    fn append_row(&mut self, name: &str, row: &str) -> Result<(), StorageError> {
        if !self.mounted {
            return Err(StorageError::NotMounted);
        }

        self.write_line(name, row, false)
            .map_err(|e| io_error("append", e))
    }

    fn list_files(&mut self, visit: &mut dyn FnMut(&str, u64)) -> Result<(), StorageError> {
        if !self.mounted {
            return Err(StorageError::NotMounted);
        }

        let entries = fs::read_dir(&self.root).map_err(|e| io_error("list", e))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_error("list", e))?;
            let metadata = entry.metadata().map_err(|e| io_error("list", e))?;
            if metadata.is_file() {
                visit(&entry.file_name().to_string_lossy(), metadata.len());
            }
        }
        Ok(())
    }
}
