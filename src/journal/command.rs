use std::collections::BTreeMap;

use crate::core::{Result, StoreError, Value};
use crate::document::{compile_path, modify};

/// Terminates every serialized record in the journal stream.
pub const RECORD_TERMINATOR: u8 = 0x00;

/// A single journaled mutation: write `value` at `path`, or remove the
/// slot when the value is null.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalCommand {
    path: String,
    value: Value,
}

impl JournalCommand {
    pub fn new(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(path, Value::Null)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn is_delete(&self) -> bool {
        self.value.is_null()
    }

    pub fn apply_to(&self, document: &mut Value) -> Result<()> {
        let ops = compile_path(&self.path)?;
        modify(document, &ops, self.value.clone())
    }

    /// Encodes the command as `{"<path>": <value>}` followed by the record
    /// terminator.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let record = BTreeMap::from([(self.path.as_str(), &self.value)]);
        let mut bytes = serde_json::to_vec(&record)?;
        bytes.push(RECORD_TERMINATOR);
        Ok(bytes)
    }

    /// Decodes one record (without its terminator).
    pub fn deserialize(record: &[u8]) -> Result<Self> {
        let decoded = Value::from_json_slice(record)
            .map_err(|e| StoreError::CorruptJournalEntry(e.to_string()))?;
        let map = match decoded {
            Value::Map(map) => map,
            other => {
                return Err(StoreError::CorruptJournalEntry(format!(
                    "expected a single-entry object, found {}",
                    other.type_name()
                )));
            }
        };
        if map.len() != 1 {
            return Err(StoreError::CorruptJournalEntry(format!(
                "expected a single-entry object, found {} entries",
                map.len()
            )));
        }
        match map.into_iter().next() {
            Some((path, value)) => Ok(Self { path, value }),
            None => Err(StoreError::CorruptJournalEntry("empty record".to_string())),
        }
    }
}
