// ============================================================================
// journalstore Library
// ============================================================================

//! Crash-consistent persistence for in-flight application state.
//!
//! A [`JournaledDocument`] is a path-addressed JSON document whose
//! mutations are written to a memory-mapped journal before they are
//! applied, so the document survives the process dying mid-mutation. A
//! [`FileQueue`] keeps a bounded directory of finished payloads for later
//! pickup.
//!
//! ```no_run
//! use journalstore::{JournalConfig, JournaledDocument, Value, load_document_contents};
//!
//! # fn main() -> journalstore::Result<()> {
//! let mut doc = JournaledDocument::open(JournalConfig::new("/tmp/report"))?;
//! doc.set("app.id", "com.example")?;
//! doc.set("breadcrumbs.", "launched")?;
//! doc.close()?;
//!
//! let recovered = load_document_contents("/tmp/report")?;
//! assert_eq!(recovered.get_path("breadcrumbs.0")?, Some(&Value::from("launched")));
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod document;
pub mod journal;
pub mod prelude;
pub mod queue;
pub mod storage;

// Re-export main types for convenience
pub use crate::core::{List, MAX_NESTING_DEPTH, Map, Result, StoreError, Value};
pub use document::{DocumentPath, PathOp, SharedDocument, compile_path, get_at, modify};
pub use journal::{CLEARED_BYTE, Journal, JournalCommand, MmapJournalStream, RECORD_TERMINATOR};
pub use queue::{FileOrder, FileQueue, LockRegistry, QueueConfig, timestamped_filename};
pub use storage::{
    DEFAULT_BUFFER_SIZE, JournalConfig, JournaledDocument, document_exists,
    load_document_contents,
};
