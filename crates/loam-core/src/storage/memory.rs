//! Heap-backed [`RowStore`], used by tests and by hosts without a card

use alloc::string::String;
use alloc::vec::Vec;

use super::{RowStore, StorageError};

/// One file: its name and its lines, header included
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryFile {
    pub name: String,
    pub lines: Vec<String>,
}

impl MemoryFile {
    /// Size the file would have on disk, with CRLF line ends
    pub fn size_bytes(&self) -> u64 {
        self.lines.iter().map(|line| line.len() as u64 + 2).sum()
    }
}

/// In-memory file store with switchable failure modes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Vec<MemoryFile>,
    mounted: bool,
    /// Makes every `mount` fail, as with a missing card
    pub fail_mount: bool,
    /// Makes every write fail, as with a card pulled mid-operation
    pub fail_writes: bool,
    /// Number of `mount` calls, successful or not
    pub mount_attempts: u32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(&self, name: &str) -> Option<&MemoryFile> {
        self.files.iter().find(|file| file.name == name)
    }

    pub fn files(&self) -> &[MemoryFile] {
        &self.files
    }

    fn file_mut(&mut self, name: &str) -> Option<&mut MemoryFile> {
        self.files.iter_mut().find(|file| file.name == name)
    }

    fn check_writable(&self, operation: &'static str) -> Result<(), StorageError> {
        if !self.mounted {
            return Err(StorageError::NotMounted);
        }
        if self.fail_writes {
            return Err(StorageError::Io(operation));
        }
        Ok(())
    }
}

impl RowStore for MemoryStore {
    fn mount(&mut self) -> Result<(), StorageError> {
        self.mount_attempts += 1;
        self.mounted = !self.fail_mount;
        if self.mounted {
            Ok(())
        } else {
            Err(StorageError::MountFailed)
        }
    }

    fn is_mounted(&self) -> bool {
        self.mounted
    }

    fn unmount(&mut self) {
        self.mounted = false;
    }

    fn ensure_file(&mut self, name: &str, header: &str) -> Result<bool, StorageError> {
        self.check_writable("create")?;
        if self.file(name).is_some() {
            return Ok(false);
        }

        self.files.push(MemoryFile {
            name: String::from(name),
            lines: alloc::vec![String::from(header)],
        });
        Ok(true)
    }

    fn append_row(&mut self, name: &str, row: &str) -> Result<(), StorageError> {
        self.check_writable("append")?;
        let file = self.file_mut(name).ok_or(StorageError::Io("append"))?;
        file.lines.push(String::from(row));
        Ok(())
    }
    fn list_files(&mut self, visit: &mut dyn FnMut(&str, u64)) -> Result<(), StorageError> {
        if !self.mounted {
            return Err(StorageError::NotMounted);
        }
        for file in &self.files {
            visit(&file.name, file.size_bytes());
        }
        Ok(())
    }
}
