pub mod config;
pub mod journaled;

pub use config::{DEFAULT_BUFFER_SIZE, JournalConfig};
pub use journaled::{JournaledDocument, document_exists, load_document_contents};
