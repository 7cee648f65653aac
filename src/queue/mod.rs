//! Bounded, lock-guarded queues of persisted files.

pub mod file_queue;
pub mod lock_registry;

pub use file_queue::{
    Comparator, DEFAULT_MAX_STORE_COUNT, EmptyCallback, ErrorCallback, FileOrder, FileQueue,
    QueueConfig, filename_timestamp, timestamped_filename,
};
pub use lock_registry::{DirectoryLock, LockRegistry};
