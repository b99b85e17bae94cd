//! Disk I/O for archive files

use crate::core::error::{ArchiveError, Result};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Disk-backed archive storage with positioned reads and writes
pub struct ArchiveFile {
    file: File,
    path: PathBuf,
    writable: bool,
}

impl ArchiveFile {
    /// Create a new archive file; an existing file at `path` is never replaced
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => {
                    ArchiveError::AlreadyExists(path.as_ref().display().to_string())
                }
                _ => ArchiveError::Io(e),
            })?;

        Ok(ArchiveFile {
            file,
            path: path.as_ref().to_path_buf(),
            writable: true,
        })
    }

    /// Open an existing archive file
    pub fn open<P: AsRef<Path>>(path: P, writable: bool) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(writable).open(&path)?;

        Ok(ArchiveFile {
            file,
            path: path.as_ref().to_path_buf(),
            writable,
        })
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Read exactly `len` bytes starting at `offset`
    pub fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        self.file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    /// Read everything from `offset` to the end of the file
    pub fn read_to_end_from(&mut self, offset: u64) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buffer = Vec::new();
        self.file.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    /// Write `data` at `offset`
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(ArchiveError::ReadOnly);
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(())
    }

    /// Current length of the file on disk
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Truncate or extend the file
    pub fn set_len(&mut self, len: u64) -> Result<()> {
        if !self.writable {
            return Err(ArchiveError::ReadOnly);
        }
        self.file.set_len(len)?;
        Ok(())
    }

    /// Get file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sync all writes to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        if self.writable {
            self.file.sync_all()?;
        }
        Ok(())
    }
}
