//! Progress store error types.

/// Errors produced by [`ProgressStore`](crate::ProgressStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// `SQLite` failure annotated with the failing operation.
    #[error("{op}: {source}")]
    Backend {
        op: String,
        #[source]
        source: rusqlite::Error,
    },

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored payload could not be decoded.
    #[error("corrupt stored value: {0}")]
    Corrupt(String),

    /// Internal mutex was poisoned by a panicked thread.
    #[error("progress store lock poisoned")]
    LockPoisoned,
}

impl StateError {
    /// Wrap a backend error with the failing operation's name.
    #[must_use]
    pub fn context(op: impl Into<String>, source: rusqlite::Error) -> Self {
        Self::Backend { op: op.into(), source }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_poisoned_displays() {
        assert_eq!(
            StateError::LockPoisoned.to_string(),
            "progress store lock poisoned"
        );
    }

    #[test]
    fn io_error_wraps() {
        let inner = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = StateError::Io(inner);
        assert!(err.to_string().contains("i/o"));
    }

    #[test]
    fn corrupt_displays_payload() {
        let err = StateError::Corrupt("bad json".into());
        assert!(err.to_string().contains("bad json"));
    }

    #[test]
    fn context_includes_operation_name() {
        let err = StateError::context(
            "record_outcome: insert",
            rusqlite::Error::QueryReturnedNoRows,
        );
        assert!(err.to_string().contains("record_outcome"));
    }
}
