//! Journaled document: snapshot + memory-mapped journal crash recovery.
//!
//! Every mutation is written to the journal region before it becomes
//! visible in memory. Snapshots bound the journal: the full document is
//! written to `.snapshot.new`, the journal is cleared, and the new snapshot
//! is renamed over `.snapshot`. Recovery picks the newest complete state:
//!
//! 1. `.snapshot.new` if it parses (crash between clear and rename)
//! 2. otherwise `.snapshot` with `.journal` replayed on top
//!
//! A process can die at any byte boundary without losing a mutation whose
//! `add_command` returned.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use log::{debug, error, info, warn};

use crate::core::{Result, StoreError, Value};
use crate::document::SharedDocument;
use crate::journal::{Journal, JournalCommand, MmapJournalStream};
use crate::storage::config::JournalConfig;

pub struct JournaledDocument {
    config: JournalConfig,
    document: SharedDocument,
    journal: Journal,
    stream: MmapJournalStream,
    closed: bool,
}

impl JournaledDocument {
    /// Creates a store at `config.base_path` holding `initial`, replacing
    /// whatever state was persisted there before.
    ///
    /// `initial` must be a map.
    pub fn new(config: JournalConfig, initial: Value) -> Result<Self> {
        config.validate()?;
        if !matches!(initial, Value::Map(_)) {
            return Err(StoreError::Type(format!(
                "document root must be a map, got {}",
                initial.type_name()
            )));
        }
        initial.check_storable(0)?;

        write_new_snapshot(&config, &initial)?;
        // the old journal must be gone before the new snapshot is promoted,
        // otherwise recovery would replay it a second time
        let stream = MmapJournalStream::create(config.journal_path(), config.buffer_size)?;
        promote_new_snapshot(&config)?;

        debug!("Opened journaled document at {}", config.base_path.display());
        Ok(Self {
            config,
            document: SharedDocument::new(initial),
            journal: Journal::new(),
            stream,
            closed: false,
        })
    }

    /// Recovers the document persisted at `config.base_path`, or starts an
    /// empty one, and compacts it into a fresh snapshot.
    pub fn open(config: JournalConfig) -> Result<Self> {
        let initial = if document_exists(&config.base_path) {
            load_document_contents(&config.base_path)?
        } else {
            Value::empty_map()
        };
        Self::new(config, initial)
    }

    /// Journals `command` and applies it to the live document.
    ///
    /// A full journal triggers a snapshot and one retry. The command is
    /// validated against a copy of the document first, so a command that
    /// cannot apply is never journaled.
    pub fn add_command(&mut self, command: JournalCommand) -> Result<()> {
        self.ensure_open()?;

        let mut updated = self.document.snapshot();
        command.apply_to(&mut updated)?;

        let record = command.serialize()?;
        match self.stream.write(&record) {
            Ok(()) => {}
            Err(StoreError::CapacityExceeded { .. }) => {
                debug!(
                    "Journal full at {} bytes, snapshotting {}",
                    self.stream.position(),
                    self.config.base_path.display()
                );
                self.snapshot()?;
                self.stream.write(&record).map_err(|e| match e {
                    StoreError::CapacityExceeded { needed, available } => StoreError::Value(format!(
                        "journal record of {} bytes can never fit a {} byte journal",
                        needed, available
                    )),
                    other => other,
                })?;
            }
            Err(e) => return Err(e),
        }

        self.document.replace(updated);
        self.journal.add(command);
        Ok(())
    }

    /// Sets `value` at `path`.
    pub fn set(&mut self, path: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        self.add_command(JournalCommand::new(path, value))
    }

    /// Removes the slot at `path`.
    pub fn delete(&mut self, path: impl Into<String>) -> Result<()> {
        self.add_command(JournalCommand::delete(path))
    }

    /// Writes the full document to disk and empties the journal.
    pub fn snapshot(&mut self) -> Result<()> {
        self.ensure_open()?;

        let document = self.document.snapshot();
        write_new_snapshot(&self.config, &document)?;
        self.journal.clear();
        self.stream.clear()?;
        self.journal.write_to(&mut self.stream)?;
        promote_new_snapshot(&self.config)?;

        debug!("Snapshotted {}", self.config.base_path.display());
        Ok(())
    }

    /// Flushes and releases the journal region. Further mutation fails with
    /// `StoreError::Closed`.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream.close()
    }

    /// Point-in-time copy of the live document.
    pub fn document(&self) -> Value {
        self.document.snapshot()
    }

    /// Shared handle for reading the live document from other threads.
    pub fn shared(&self) -> SharedDocument {
        self.document.clone()
    }

    pub fn get(&self, path: &str) -> Result<Option<Value>> {
        self.document.get(path)
    }

    /// Commands journaled since the last snapshot.
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn journal_len(&self) -> usize {
        self.journal.len()
    }

    pub fn config(&self) -> &JournalConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl Drop for JournaledDocument {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.stream.close() {
                error!("Failed to flush journal for {}: {}", self.config.base_path.display(), e);
            }
        }
    }
}

impl std::fmt::Debug for JournaledDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournaledDocument")
            .field("config", &self.config)
            .field("journal_len", &self.journal.len())
            .field("stream", &self.stream)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Whether a document has been persisted at `base_path`.
pub fn document_exists<P: AsRef<Path>>(base_path: P) -> bool {
    let config = JournalConfig::new(base_path);
    config.new_snapshot_path().exists() || config.snapshot_path().exists()
}

/// Rebuilds the most recent document persisted at `base_path`.
///
/// # Errors
///
/// `StoreError::CorruptSnapshot` when neither snapshot is usable. A damaged
/// journal only loses the mutations made since the last snapshot.
pub fn load_document_contents<P: AsRef<Path>>(base_path: P) -> Result<Value> {
    let config = JournalConfig::new(base_path);

    let new_snapshot_path = config.new_snapshot_path();
    if new_snapshot_path.exists() {
        match read_snapshot(&new_snapshot_path) {
            Ok(document) => {
                info!("Recovered {} from an unpromoted snapshot", config.base_path.display());
                return Ok(document);
            }
            Err(e) => warn!("Ignoring incomplete snapshot {}: {}", new_snapshot_path.display(), e),
        }
    }

    let snapshot_path = config.snapshot_path();
    let snapshot = read_snapshot(&snapshot_path)?;

    let bytes = match fs::read(config.journal_path()) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(
                "Journal for {} unreadable, using snapshot only: {}",
                config.base_path.display(),
                e
            );
            return Ok(snapshot);
        }
    };

    let journal = Journal::deserialize_all(&bytes);
    let (document, skipped) = journal.replay_onto(snapshot);
    if skipped > 0 {
        warn!(
            "Skipped {} of {} journal commands recovering {}",
            skipped,
            journal.len(),
            config.base_path.display()
        );
    }
    debug!("Replayed {} journal commands", journal.len() - skipped);
    Ok(document)
}

fn read_snapshot(path: &Path) -> Result<Value> {
    let bytes = fs::read(path).map_err(|e| {
        StoreError::CorruptSnapshot(format!("failed to read {}: {}", path.display(), e))
    })?;
    let document = Value::from_json_slice(&bytes).map_err(|e| {
        StoreError::CorruptSnapshot(format!("failed to parse {}: {}", path.display(), e))
    })?;
    if !matches!(document, Value::Map(_)) {
        return Err(StoreError::CorruptSnapshot(format!(
            "{} holds a {}, not a map",
            path.display(),
            document.type_name()
        )));
    }
    Ok(document)
}

fn write_new_snapshot(config: &JournalConfig, document: &Value) -> Result<()> {
    let path = config.new_snapshot_path();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(&path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, document)?;
    writer.flush()?;
    writer.get_mut().sync_all()?;
    Ok(())
}

fn promote_new_snapshot(config: &JournalConfig) -> Result<()> {
    fs::rename(config.new_snapshot_path(), config.snapshot_path())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn config(temp_dir: &TempDir) -> JournalConfig {
        JournalConfig::new(temp_dir.path().join("event")).buffer_size(256)
    }

    #[test]
    fn test_new_writes_snapshot_and_clean_journal() {
        let temp_dir = TempDir::new().unwrap();
        let cfg = config(&temp_dir);
        let doc = JournaledDocument::new(cfg.clone(), Value::from(json!({"a": 1}))).unwrap();

        assert!(cfg.snapshot_path().exists());
        assert!(!cfg.new_snapshot_path().exists());
        assert_eq!(fs::metadata(cfg.journal_path()).unwrap().len(), 256);
        assert_eq!(doc.document(), Value::from(json!({"a": 1})));
        assert!(document_exists(&cfg.base_path));
    }

    #[test]
    fn test_rejects_non_map_initial_document() {
        let temp_dir = TempDir::new().unwrap();
        let result = JournaledDocument::new(config(&temp_dir), Value::from(json!([1])));
        assert!(matches!(result, Err(StoreError::Type(_))));
    }

    #[test]
    fn test_invalid_command_is_not_journaled() {
        let temp_dir = TempDir::new().unwrap();
        let cfg = config(&temp_dir);
        let mut doc = JournaledDocument::new(cfg.clone(), Value::empty_map()).unwrap();
        doc.set("s", "text").unwrap();
        assert!(matches!(doc.set("s.x", 1), Err(StoreError::Type(_))));
        assert!(matches!(doc.set("l.", Value::Null), Err(StoreError::Value(_))));
        assert_eq!(doc.journal_len(), 1);
        drop(doc);

        let recovered = load_document_contents(&cfg.base_path).unwrap();
        assert_eq!(recovered, Value::from(json!({"s": "text"})));
    }

    #[test]
    fn test_capacity_exceeded_forces_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let cfg = config(&temp_dir);
        let mut doc = JournaledDocument::new(cfg.clone(), Value::empty_map()).unwrap();

        for i in 0..40 {
            doc.set("crumbs.", Value::from(json!({"index": i}))).unwrap();
        }
        // 40 records of ~24 bytes cannot fit 256 bytes without snapshots
        assert!(doc.journal_len() < 40);

        let snapshot = read_snapshot(&cfg.snapshot_path()).unwrap();
        assert!(snapshot.get_path("crumbs.0").unwrap().is_some());

        let live = doc.document();
        std::mem::forget(doc);
        assert_eq!(load_document_contents(&cfg.base_path).unwrap(), live);
    }

    #[test]
    fn test_oversized_command_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let mut doc = JournaledDocument::new(config(&temp_dir), Value::empty_map()).unwrap();
        let err = doc.set("big", "x".repeat(1024)).unwrap_err();
        assert!(matches!(err, StoreError::Value(_)));
        assert_eq!(doc.get("big").unwrap(), None);
    }

    #[test]
    fn test_closed_document_rejects_mutation() {
        let temp_dir = TempDir::new().unwrap();
        let mut doc = JournaledDocument::new(config(&temp_dir), Value::empty_map()).unwrap();
        doc.set("a", 1).unwrap();
        doc.close().unwrap();
        doc.close().unwrap();

        assert!(doc.is_closed());
        assert!(matches!(doc.set("b", 2), Err(StoreError::Closed)));
        assert!(matches!(doc.snapshot(), Err(StoreError::Closed)));
        assert_eq!(doc.get("a").unwrap(), Some(Value::from(1)));
    }

    #[test]
    fn test_recovery_prefers_valid_new_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let cfg = config(&temp_dir);
        let mut doc = JournaledDocument::new(cfg.clone(), Value::empty_map()).unwrap();
        doc.set("a", 1).unwrap();
        drop(doc);

        fs::write(cfg.new_snapshot_path(), br#"{"from":"new"}"#).unwrap();
        assert_eq!(
            load_document_contents(&cfg.base_path).unwrap(),
            Value::from(json!({"from": "new"}))
        );
    }

    #[test]
    fn test_recovery_ignores_torn_new_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let cfg = config(&temp_dir);
        let mut doc = JournaledDocument::new(cfg.clone(), Value::empty_map()).unwrap();
        doc.set("a", 1).unwrap();
        drop(doc);

        fs::write(cfg.new_snapshot_path(), br#"{"from":"ne"#).unwrap();
        assert_eq!(
            load_document_contents(&cfg.base_path).unwrap(),
            Value::from(json!({"a": 1}))
        );
    }

    #[test]
    fn test_recovery_without_journal_uses_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let cfg = config(&temp_dir);
        let mut doc = JournaledDocument::new(cfg.clone(), Value::from(json!({"base": true}))).unwrap();
        doc.set("lost", 1).unwrap();
        drop(doc);

        fs::remove_file(cfg.journal_path()).unwrap();
        assert_eq!(
            load_document_contents(&cfg.base_path).unwrap(),
            Value::from(json!({"base": true}))
        );
    }

    #[test]
    fn test_corrupt_snapshot_is_unrecoverable() {
        let temp_dir = TempDir::new().unwrap();
        let cfg = config(&temp_dir);
        fs::write(cfg.snapshot_path(), b"not json").unwrap();
        let err = load_document_contents(&cfg.base_path).unwrap_err();
        assert!(matches!(err, StoreError::CorruptSnapshot(_)));
    }

    #[test]
    fn test_open_recovers_and_compacts() {
        let temp_dir = TempDir::new().unwrap();
        let cfg = config(&temp_dir);
        let mut doc = JournaledDocument::open(cfg.clone()).unwrap();
        doc.set("list.", "first").unwrap();
        std::mem::forget(doc);

        let mut reopened = JournaledDocument::open(cfg.clone()).unwrap();
        assert_eq!(reopened.journal_len(), 0);
        reopened.set("list.", "second").unwrap();
        reopened.close().unwrap();

        assert_eq!(
            load_document_contents(&cfg.base_path).unwrap(),
            Value::from(json!({"list": ["first", "second"]}))
        );
    }
}
