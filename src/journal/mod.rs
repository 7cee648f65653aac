//! Mutation journal
//!
//! Wire format: each command is the JSON object `{"<path>": <value>}`
//! followed by a single `0x00`. Cleared regions are filled with `0x99`.

pub mod command;
pub mod ledger;
pub mod stream;

pub use command::{JournalCommand, RECORD_TERMINATOR};
pub use ledger::Journal;
pub use stream::{CLEARED_BYTE, MmapJournalStream};
