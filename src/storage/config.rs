use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::core::{Result, StoreError};

/// Default size of the memory-mapped journal region.
pub const DEFAULT_BUFFER_SIZE: usize = 100 * 1024;

pub const SNAPSHOT_SUFFIX: &str = ".snapshot";
pub const NEW_SNAPSHOT_SUFFIX: &str = ".snapshot.new";
pub const JOURNAL_SUFFIX: &str = ".journal";

/// Journaled document configuration
///
/// All three files live next to each other and are named after one base
/// path:
///
/// ```text
/// <base>.snapshot      last complete document (JSON)
/// <base>.snapshot.new  snapshot being written
/// <base>.journal       memory-mapped journal region
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalConfig {
    /// Base path the store files are derived from
    pub base_path: PathBuf,

    /// Size in bytes of the journal region
    pub buffer_size: usize,
}

impl JournalConfig {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Set the journal region size
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(StoreError::Value(
                "buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.base_path.file_name().is_none() {
            return Err(StoreError::Value(format!(
                "base path '{}' does not name a file",
                self.base_path.display()
            )));
        }
        Ok(())
    }

    pub fn snapshot_path(&self) -> PathBuf {
        with_suffix(&self.base_path, SNAPSHOT_SUFFIX)
    }

    pub fn new_snapshot_path(&self) -> PathBuf {
        with_suffix(&self.base_path, NEW_SNAPSHOT_SUFFIX)
    }

    pub fn journal_path(&self) -> PathBuf {
        with_suffix(&self.base_path, JOURNAL_SUFFIX)
    }
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
