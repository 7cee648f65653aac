use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Path syntax error: {0}")]
    PathSyntax(String),

    #[error("Type error: {0}")]
    Type(String),

    #[error("Value error: {0}")]
    Value(String),

    #[error("Invalid list index {0}")]
    InvalidIndex(i64),

    #[error("Journal stream capacity exceeded: needed {needed} bytes, {available} available")]
    CapacityExceeded { needed: usize, available: usize },

    #[error("Journaled document is closed")]
    Closed,

    #[error("Corrupt journal entry: {0}")]
    CorruptJournalEntry(String),

    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether the failure has a defined recovery path, as opposed to
    /// signalling a caller bug or an unusable document.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::CapacityExceeded { .. } | Self::CorruptJournalEntry(_) | Self::Io(_)
        )
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(StoreError::CapacityExceeded { needed: 10, available: 2 }.is_recoverable());
        assert!(StoreError::CorruptJournalEntry("x".into()).is_recoverable());
        assert!(!StoreError::Closed.is_recoverable());
        assert!(!StoreError::CorruptSnapshot("bad".into()).is_recoverable());
        assert!(!StoreError::PathSyntax("a\\".into()).is_recoverable());
    }

    #[test]
    fn test_display_messages() {
        let err = StoreError::CapacityExceeded { needed: 12, available: 4 };
        assert_eq!(
            err.to_string(),
            "Journal stream capacity exceeded: needed 12 bytes, 4 available"
        );
        assert_eq!(StoreError::Closed.to_string(), "Journaled document is closed");
    }
}
