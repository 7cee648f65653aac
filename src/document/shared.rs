use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::{Result, Value};
use crate::document::mutation::get_at;
use crate::document::path::compile_path;

/// Handle to the live document of a journaled store.
///
/// Cloning the handle shares the document. Readers take O(1) snapshots
/// (the containers are persistent structures), so a background thread can
/// iterate a list while the owning store keeps appending to it.
#[derive(Debug, Clone, Default)]
pub struct SharedDocument {
    inner: Arc<RwLock<Value>>,
}

impl SharedDocument {
    pub fn new(document: Value) -> Self {
        Self {
            inner: Arc::new(RwLock::new(document)),
        }
    }

    /// Point-in-time copy of the whole document.
    pub fn snapshot(&self) -> Value {
        self.inner.read().clone()
    }

    /// Point-in-time copy of the value at `path`, if present.
    pub fn get(&self, path: &str) -> Result<Option<Value>> {
        let ops = compile_path(path)?;
        let guard = self.inner.read();
        Ok(get_at(&guard, &ops).cloned())
    }

    pub fn read<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        f(&self.inner.read())
    }

    pub(crate) fn replace(&self, document: Value) {
        *self.inner.write() = document;
    }
}
