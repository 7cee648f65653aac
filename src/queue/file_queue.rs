//! Directory-backed queue of persisted payloads.
//!
//! Membership and order come purely from a directory listing; there is no
//! index file. Files that cannot be deleted, or whose processing failed,
//! are *blocked*: they stay on disk but are never offered again by this
//! queue instance.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::core::{Result, StoreError};
use crate::queue::lock_registry::{DirectoryLock, LockRegistry};

pub const DEFAULT_MAX_STORE_COUNT: usize = 32;

pub type Comparator = Arc<dyn Fn(&Path, &Path) -> Ordering + Send + Sync>;
pub type ErrorCallback = Box<dyn Fn(&StoreError, &Path) + Send + Sync>;
pub type EmptyCallback = Box<dyn Fn() + Send + Sync>;

/// Queue order, oldest first.
#[derive(Clone, Default)]
pub enum FileOrder {
    /// Lexicographic file name; pairs with [`timestamped_filename`].
    #[default]
    ByName,
    /// Modification time, ties broken by name.
    ByModified,
    Custom(Comparator),
}

impl FileOrder {
    pub fn compare(&self, a: &Path, b: &Path) -> Ordering {
        match self {
            Self::ByName => a.file_name().cmp(&b.file_name()),
            Self::ByModified => {
                let modified = |p: &Path| fs::metadata(p).and_then(|m| m.modified()).ok();
                modified(a)
                    .cmp(&modified(b))
                    .then_with(|| a.file_name().cmp(&b.file_name()))
            }
            Self::Custom(compare) => compare(a, b),
        }
    }
}

impl fmt::Debug for FileOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByName => f.write_str("ByName"),
            Self::ByModified => f.write_str("ByModified"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// File queue configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Directory holding the queued files
    pub storage_dir: PathBuf,

    /// Maximum number of files retained; 0 disables writing
    pub max_store_count: usize,

    /// Queue order
    pub order: FileOrder,
}

impl QueueConfig {
    pub fn new<P: AsRef<Path>>(storage_dir: P) -> Self {
        Self {
            storage_dir: storage_dir.as_ref().to_path_buf(),
            max_store_count: DEFAULT_MAX_STORE_COUNT,
            order: FileOrder::default(),
        }
    }

    /// Set the retention bound
    pub fn max_store_count(mut self, max_store_count: usize) -> Self {
        self.max_store_count = max_store_count;
        self
    }

    /// Set the queue order
    pub fn order(mut self, order: FileOrder) -> Self {
        self.order = order;
        self
    }

    /// Order with a custom comparator
    pub fn order_by(self, compare: impl Fn(&Path, &Path) -> Ordering + Send + Sync + 'static) -> Self {
        self.order(FileOrder::Custom(Arc::new(compare)))
    }
}

#[derive(Debug, Default)]
struct QueueState {
    blocked: HashSet<OsString>,
    empty_notified: bool,
}

/// Bounded queue of files in one directory.
///
/// Every operation runs under the directory's lock from the
/// [`LockRegistry`], so several queues over the same directory (say, a
/// writer and a delivery worker) never interleave. The lock is reentrant:
/// processors may call back into the queue.
pub struct FileQueue {
    config: QueueConfig,
    lock: DirectoryLock,
    state: Mutex<QueueState>,
    on_error: Option<ErrorCallback>,
    on_empty: Option<EmptyCallback>,
}

impl FileQueue {
    /// Creates a queue locked through the process-wide registry.
    pub fn new(config: QueueConfig) -> Self {
        Self::with_registry(config, LockRegistry::global())
    }

    pub fn with_registry(config: QueueConfig, registry: &LockRegistry) -> Self {
        let lock = registry.lock_for(&config.storage_dir);
        let queue = Self {
            config,
            lock,
            state: Mutex::new(QueueState::default()),
            on_error: None,
            on_empty: None,
        };
        let initially_empty = {
            let _guard = queue.lock.lock();
            queue.is_empty_locked()
        };
        queue.state.lock().empty_notified = initially_empty;
        queue
    }

    /// Called with the failure and the file whenever a write fails.
    pub fn with_error_callback(mut self, callback: impl Fn(&StoreError, &Path) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// Called, with the directory lock held, each time the queue becomes
    /// empty.
    pub fn with_empty_callback(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_empty = Some(Box::new(callback));
        self
    }

    pub fn storage_dir(&self) -> &Path {
        &self.config.storage_dir
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Writes `content` to `filename`, evicting the oldest files first so
    /// that at most `max_store_count` remain.
    ///
    /// Returns the written path, or `None` when writing is disabled or
    /// failed (the error callback has been told and the partial file
    /// removed).
    pub fn write(&self, filename: &str, content: &[u8]) -> Option<PathBuf> {
        self.write_with(filename, |writer| Ok(writer.write_all(content)?))
    }

    /// Like [`FileQueue::write`], serializing `value` as JSON.
    pub fn write_json<T: Serialize + ?Sized>(&self, filename: &str, value: &T) -> Option<PathBuf> {
        self.write_with(filename, |writer| Ok(serde_json::to_writer(writer, value)?))
    }

    fn write_with(
        &self,
        filename: &str,
        write: impl FnOnce(&mut BufWriter<File>) -> Result<()>,
    ) -> Option<PathBuf> {
        let _guard = self.lock.lock();
        let written = self.write_locked(filename, write);
        self.check_empty();
        written
    }

    fn write_locked(
        &self,
        filename: &str,
        write: impl FnOnce(&mut BufWriter<File>) -> Result<()>,
    ) -> Option<PathBuf> {
        if let Err(e) = fs::create_dir_all(&self.config.storage_dir) {
            self.report_error(&StoreError::Io(e), &self.config.storage_dir);
            return None;
        }
        if self.config.max_store_count == 0 {
            return None;
        }

        self.evict_oldest(self.config.max_store_count - 1);

        let path = self.config.storage_dir.join(filename);
        match write_file(&path, write) {
            Ok(()) => {
                debug!("Queued {}", path.display());
                Some(path)
            }
            Err(e) => {
                self.report_error(&e, &path);
                if let Err(e) = fs::remove_file(&path) {
                    if e.kind() != ErrorKind::NotFound {
                        warn!("Failed to remove partial file {}: {}", path.display(), e);
                    }
                }
                None
            }
        }
    }

    fn evict_oldest(&self, keep: usize) {
        let files = self.find_stored_files_locked();
        let excess = files.len().saturating_sub(keep);
        for file in files.iter().take(excess) {
            debug!("Evicting {} to stay within {} files", file.display(), self.config.max_store_count);
            self.delete_locked(file);
        }
    }

    /// Offers the oldest unblocked file accepted by `filter` to `processor`.
    ///
    /// A processor error blocks the file for the lifetime of this queue and
    /// is logged, not returned. Returns whether a file was found.
    pub fn process_next_file<E: fmt::Display>(
        &self,
        filter: impl Fn(&Path) -> bool,
        processor: impl FnOnce(&Path) -> std::result::Result<(), E>,
    ) -> bool {
        let _guard = self.lock.lock();
        let candidate = self
            .find_stored_files_locked()
            .into_iter()
            .find(|file| filter(file.as_path()));
        self.process_candidate(candidate, processor)
    }

    /// Like [`FileQueue::process_next_file`], but offers the newest file.
    pub fn process_last_file<E: fmt::Display>(
        &self,
        filter: impl Fn(&Path) -> bool,
        processor: impl FnOnce(&Path) -> std::result::Result<(), E>,
    ) -> bool {
        let _guard = self.lock.lock();
        let candidate = self
            .find_stored_files_locked()
            .into_iter()
            .rev()
            .find(|file| filter(file.as_path()));
        self.process_candidate(candidate, processor)
    }

    fn process_candidate<E: fmt::Display>(
        &self,
        candidate: Option<PathBuf>,
        processor: impl FnOnce(&Path) -> std::result::Result<(), E>,
    ) -> bool {
        let Some(file) = candidate else {
            return false;
        };
        if let Err(e) = processor(file.as_path()) {
            warn!("Processing {} failed, it will not be retried: {}", file.display(), e);
            self.block(&file);
        }
        self.check_empty();
        true
    }

    /// Passes every enqueued file, oldest first, to `processor` in one call.
    /// Returns how many were passed.
    pub fn process_enqueued_files(&self, processor: impl FnOnce(&[PathBuf])) -> usize {
        let _guard = self.lock.lock();
        let files = self.find_stored_files_locked();
        processor(&files);
        self.check_empty();
        files.len()
    }

    /// Enqueued (unblocked) files, oldest first.
    pub fn find_stored_files(&self) -> Vec<PathBuf> {
        let _guard = self.lock.lock();
        self.find_stored_files_locked()
    }

    /// Deletes `file`; a file the OS refuses to delete becomes blocked.
    pub fn delete(&self, file: &Path) {
        let _guard = self.lock.lock();
        self.delete_locked(file);
        self.check_empty();
    }

    pub fn delete_all<I, P>(&self, files: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let _guard = self.lock.lock();
        for file in files {
            self.delete_locked(file.as_ref());
        }
        self.check_empty();
    }

    /// Blocks `file` without deleting it.
    pub fn cancel_file(&self, file: &Path) {
        let _guard = self.lock.lock();
        self.block(file);
        self.check_empty();
    }

    /// True when every file in the directory is blocked, or there are none.
    pub fn is_empty(&self) -> bool {
        let _guard = self.lock.lock();
        self.is_empty_locked()
    }

    /// Number of enqueued (unblocked) files.
    pub fn len(&self) -> usize {
        self.find_stored_files().len()
    }

    pub fn blocked_count(&self) -> usize {
        self.state.lock().blocked.len()
    }

    pub fn is_blocked(&self, file: &Path) -> bool {
        self.state.lock().blocked.contains(&blocked_key(file))
    }

    fn delete_locked(&self, file: &Path) {
        match fs::remove_file(file) {
            Ok(()) => {
                self.state.lock().blocked.remove(&blocked_key(file));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.state.lock().blocked.remove(&blocked_key(file));
            }
            Err(e) => {
                warn!("Failed to delete {}, blocking it: {}", file.display(), e);
                self.block(file);
            }
        }
    }

    fn block(&self, file: &Path) {
        self.state.lock().blocked.insert(blocked_key(file));
    }

    fn list_directory(&self) -> Vec<PathBuf> {
        let entries = match fs::read_dir(&self.config.storage_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Failed to list {}: {}", self.config.storage_dir.display(), e);
                return Vec::new();
            }
        };
        entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect()
    }

    fn find_stored_files_locked(&self) -> Vec<PathBuf> {
        let mut files = self.list_directory();
        {
            let state = self.state.lock();
            files.retain(|file| !state.blocked.contains(&blocked_key(file)));
        }
        files.sort_by(|a, b| self.config.order.compare(a, b));
        files
    }

    fn is_empty_locked(&self) -> bool {
        let files = self.list_directory();
        let state = self.state.lock();
        files.iter().all(|file| state.blocked.contains(&blocked_key(file)))
    }

    /// Fires the empty callback on a non-empty to empty transition. Must be
    /// called with the directory lock held.
    fn check_empty(&self) {
        let empty = self.is_empty_locked();
        let notify = {
            let mut state = self.state.lock();
            let notify = empty && !state.empty_notified;
            state.empty_notified = empty;
            notify
        };
        if notify {
            if let Some(callback) = &self.on_empty {
                debug!("{} is empty", self.config.storage_dir.display());
                callback();
            }
        }
    }

    fn report_error(&self, err: &StoreError, path: &Path) {
        warn!("Failed to write {}: {}", path.display(), err);
        if let Some(callback) = &self.on_error {
            callback(err, path);
        }
    }
}

impl fmt::Debug for FileQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileQueue")
            .field("config", &self.config)
            .field("blocked", &self.blocked_count())
            .finish()
    }
}

/// Builds a unique file name that sorts chronologically under
/// [`FileOrder::ByName`]: `<millis>_<uuid>.<extension>`.
pub fn timestamped_filename(extension: &str) -> String {
    format!(
        "{:013}_{}.{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4(),
        extension
    )
}

/// Recovers the creation time encoded by [`timestamped_filename`].
pub fn filename_timestamp(file: &Path) -> Option<DateTime<Utc>> {
    let name = file.file_name()?.to_str()?;
    let (millis, _) = name.split_once('_')?;
    DateTime::from_timestamp_millis(millis.parse().ok()?)
}

fn blocked_key(file: &Path) -> OsString {
    file.file_name()
        .unwrap_or(file.as_os_str())
        .to_os_string()
}

fn write_file(path: &Path, write: impl FnOnce(&mut BufWriter<File>) -> Result<()>) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write(&mut writer)?;
    writer.flush()?;
    Ok(())
}
