//! Common imports for embedding the store.
//!
//! `use journalstore::prelude::*;` brings in the document, journal and
//! queue entry points.

pub use crate::core::{Result, StoreError, Value};
pub use crate::journal::JournalCommand;
pub use crate::queue::{FileOrder, FileQueue, LockRegistry, QueueConfig, timestamped_filename};
pub use crate::storage::{JournalConfig, JournaledDocument, document_exists, load_document_contents};
