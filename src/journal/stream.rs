//! Fixed-capacity, memory-mapped journal region.
//!
//! Bytes written here land in a shared file mapping, so they survive the
//! death of the process without an explicit flush. Only a kernel crash or
//! power loss needs [`MmapJournalStream::flush`].

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use log::debug;
use memmap2::{MmapMut, MmapOptions};

use crate::core::{Result, StoreError};

/// Fill byte for cleared regions. 0x99 is a UTF-8 continuation byte, so it
/// can never start a valid record.
pub const CLEARED_BYTE: u8 = 0x99;

/// Append-only sink over a fixed-length mapping.
///
/// Not internally synchronized: the owner serializes access through
/// `&mut self`.
pub struct MmapJournalStream {
    path: PathBuf,
    map: Option<MmapMut>,
    capacity: usize,
    cursor: usize,
}

impl MmapJournalStream {
    /// Maps `capacity` bytes of the file at `path`, creating or resizing it,
    /// and clears the region. Any previous content is discarded.
    pub fn create<P: AsRef<Path>>(path: P, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(StoreError::Value(
                "journal stream capacity must be greater than zero".to_string(),
            ));
        }
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        file.set_len(capacity as u64)?;

        // SAFETY: the journal file is owned by this stream for its lifetime;
        // nothing else in the process maps or truncates it while mapped.
        let map = unsafe { MmapOptions::new().len(capacity).map_mut(&file)? };

        let mut stream = Self {
            path,
            map: Some(map),
            capacity,
            cursor: 0,
        };
        stream.clear()?;
        debug!("mapped {} byte journal at {}", capacity, stream.path.display());
        Ok(stream)
    }

    /// Appends `bytes` at the cursor.
    ///
    /// # Errors
    ///
    /// `StoreError::CapacityExceeded` when the bytes do not fit in the rest
    /// of the region; nothing is written in that case.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let available = self.remaining();
        let map = self.map.as_mut().ok_or(StoreError::Closed)?;
        if bytes.len() > available {
            return Err(StoreError::CapacityExceeded {
                needed: bytes.len(),
                available,
            });
        }
        let end = self.cursor + bytes.len();
        map[self.cursor..end].copy_from_slice(bytes);
        self.cursor = end;
        Ok(())
    }

    /// Overwrites the whole region with [`CLEARED_BYTE`] and rewinds.
    pub fn clear(&mut self) -> Result<()> {
        let map = self.map.as_mut().ok_or(StoreError::Closed)?;
        map.fill(CLEARED_BYTE);
        self.cursor = 0;
        Ok(())
    }

    /// Forces dirty pages to the backing file.
    pub fn flush(&self) -> Result<()> {
        if let Some(map) = &self.map {
            map.flush()?;
        }
        Ok(())
    }

    /// Flushes and releases the mapping. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        if let Some(map) = self.map.take() {
            map.flush()?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.cursor
    }

    pub fn is_closed(&self) -> bool {
        self.map.is_none()
    }
}

impl std::fmt::Debug for MmapJournalStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmapJournalStream")
            .field("path", &self.path)
            .field("capacity", &self.capacity)
            .field("cursor", &self.cursor)
            .field("closed", &self.is_closed())
            .finish()
    }
}
