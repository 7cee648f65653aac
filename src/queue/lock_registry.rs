use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::{Mutex, ReentrantMutex};

/// Lock serializing every queue operation on one directory.
pub type DirectoryLock = Arc<ReentrantMutex<()>>;

/// Hands out one reentrant lock per absolute directory path, so every
/// [`FileQueue`](crate::queue::FileQueue) bound to the same directory
/// excludes the others.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<PathBuf, DirectoryLock>>,
}

// Process-wide default for queues that are not given a registry
lazy_static! {
    static ref GLOBAL_LOCK_REGISTRY: Arc<LockRegistry> = Arc::new(LockRegistry::new());
}

impl LockRegistry {
    /// Get the process-wide registry
    pub fn global() -> &'static Arc<LockRegistry> {
        &GLOBAL_LOCK_REGISTRY
    }

    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock for `dir`, creating it on first use.
    pub fn lock_for(&self, dir: &Path) -> DirectoryLock {
        let key = registry_key(dir);
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(key).or_default())
    }

    /// Number of directories with a lock.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

fn registry_key(dir: &Path) -> PathBuf {
    std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_directory_shares_lock() {
        let registry = LockRegistry::new();
        let a = registry.lock_for(Path::new("/tmp/queue"));
        let b = registry.lock_for(Path::new("/tmp/queue"));
        let c = registry.lock_for(Path::new("/tmp/other"));

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_relative_and_absolute_paths_share_lock() {
        let registry = LockRegistry::new();
        let cwd = std::env::current_dir().unwrap();
        let relative = registry.lock_for(Path::new("spool"));
        let absolute = registry.lock_for(&cwd.join("spool"));
        assert!(Arc::ptr_eq(&relative, &absolute));
    }

    #[test]
    fn test_lock_is_reentrant() {
        let registry = LockRegistry::new();
        let lock = registry.lock_for(Path::new("/tmp/queue"));
        let _outer = lock.lock();
        let _inner = lock.lock();
    }

    #[test]
    fn test_global_registry_is_shared() {
        assert!(Arc::ptr_eq(LockRegistry::global(), LockRegistry::global()));
    }
}
