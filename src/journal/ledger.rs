use log::{debug, warn};

use crate::core::{Result, Value};
use crate::journal::command::{JournalCommand, RECORD_TERMINATOR};
use crate::journal::stream::{CLEARED_BYTE, MmapJournalStream};

/// In-memory mirror of the commands journaled since the last snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Journal {
    commands: Vec<JournalCommand>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, command: JournalCommand) {
        self.commands.push(command);
    }

    /// Forgets every command. The backing stream is not touched.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[JournalCommand] {
        &self.commands
    }

    pub fn iter(&self) -> std::slice::Iter<'_, JournalCommand> {
        self.commands.iter()
    }

    /// Folds every command, in order, onto `document` and returns the
    /// result. Stops at the first command that fails to apply.
    pub fn apply_to(&self, mut document: Value) -> Result<Value> {
        for command in &self.commands {
            command.apply_to(&mut document)?;
        }
        Ok(document)
    }

    /// Like [`Journal::apply_to`], but a command that fails to apply is
    /// logged and skipped. Returns the document and the number skipped.
    pub fn replay_onto(&self, mut document: Value) -> (Value, usize) {
        let mut skipped = 0;
        for command in &self.commands {
            // apply to a copy so a half-applied command leaves no containers behind
            let mut candidate = document.clone();
            match command.apply_to(&mut candidate) {
                Ok(()) => document = candidate,
                Err(e) => {
                    skipped += 1;
                    warn!("Skipping journal command at '{}': {}", command.path(), e);
                }
            }
        }
        (document, skipped)
    }

    /// Concatenated wire form of every command.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        for command in &self.commands {
            bytes.extend(command.serialize()?);
        }
        Ok(bytes)
    }

    pub fn write_to(&self, stream: &mut MmapJournalStream) -> Result<()> {
        for command in &self.commands {
            stream.write(&command.serialize()?)?;
        }
        Ok(())
    }

    /// Decodes every terminated record in `bytes`.
    ///
    /// A record that does not decode is logged and skipped. Trailing bytes
    /// after the last terminator (a torn write, or the cleared fill) are
    /// ignored.
    pub fn deserialize_all(bytes: &[u8]) -> Self {
        let mut journal = Self::new();
        let mut records = bytes.split(|&b| b == RECORD_TERMINATOR);
        let tail = records.next_back().unwrap_or_default();

        for record in records.filter(|r| !r.is_empty()) {
            match JournalCommand::deserialize(record) {
                Ok(command) => journal.add(command),
                Err(e) => warn!("Skipping corrupt journal record of {} bytes: {}", record.len(), e),
            }
        }

        if tail.iter().any(|&b| b != CLEARED_BYTE) {
            debug!("Ignoring {} unterminated bytes at the end of the journal", tail.len());
        }
        journal
    }
}

impl FromIterator<JournalCommand> for Journal {
    fn from_iter<I: IntoIterator<Item = JournalCommand>>(iter: I) -> Self {
        Self {
            commands: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Journal {
    type Item = &'a JournalCommand;
    type IntoIter = std::slice::Iter<'a, JournalCommand>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.iter()
    }
}
