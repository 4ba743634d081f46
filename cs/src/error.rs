//! Store error taxonomy

use std::path::PathBuf;

use thiserror::Error;

/// Errors from coordination store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("node already exists: {0}")]
    NodeAlreadyExists(String),

    #[error("node does not exist: {0}")]
    NodeMissing(String),

    #[error("node has children: {0}")]
    NotEmpty(String),

    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("transaction aborted at op {index} ({op}): {source}")]
    TransactionAborted {
        index: usize,
        op: String,
        #[source]
        source: Box<StoreError>,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error at {path}: {source}")]
    Serialization {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// The failure underneath any number of `TransactionAborted` wrappers
    pub fn root_cause(&self) -> &StoreError {
        match self {
            Self::TransactionAborted { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Owned variant of [`StoreError::root_cause`]
    pub fn into_root_cause(self) -> StoreError {
        match self {
            Self::TransactionAborted { source, .. } => source.into_root_cause(),
            other => other,
        }
    }

    /// True when the failure is about reaching the store rather than the data in it
    ///
    /// SQLite errors count only when they are contention or I/O; constraint,
    /// schema and conversion failures will not go away on retry.
    pub fn is_unavailable(&self) -> bool {
        match self.root_cause() {
            Self::Unavailable(_) | Self::Io { .. } => true,
            Self::Sqlite(e) => sqlite_unavailable(e),
            _ => false,
        }
    }
}

fn sqlite_unavailable(err: &rusqlite::Error) -> bool {
    use rusqlite::ErrorCode;

    matches!(
        err.sqlite_error_code(),
        Some(
            ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::CannotOpen
                | ErrorCode::DiskFull
                | ErrorCode::FileLockingProtocolFailed
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_nested_aborts() {
        let err = StoreError::TransactionAborted {
            index: 2,
            op: "create /a".to_string(),
            source: Box::new(StoreError::NodeAlreadyExists("/a".to_string())),
        };
        assert!(matches!(err.root_cause(), StoreError::NodeAlreadyExists(p) if p == "/a"));
        assert!(!err.is_unavailable());
        assert!(matches!(err.into_root_cause(), StoreError::NodeAlreadyExists(_)));
    }

    #[test]
    fn test_unavailable_classification() {
        assert!(StoreError::Unavailable("lock poisoned".to_string()).is_unavailable());
        assert!(!StoreError::NodeMissing("/x".to_string()).is_unavailable());
    }

    fn sqlite_failure(code: std::os::raw::c_int) -> StoreError {
        StoreError::Sqlite(rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None))
    }

    #[test]
    fn test_sqlite_contention_is_unavailable() {
        assert!(sqlite_failure(rusqlite::ffi::SQLITE_BUSY).is_unavailable());
        assert!(sqlite_failure(rusqlite::ffi::SQLITE_LOCKED).is_unavailable());
        assert!(sqlite_failure(rusqlite::ffi::SQLITE_IOERR).is_unavailable());

        let wrapped = StoreError::TransactionAborted {
            index: 0,
            op: "set /a".to_string(),
            source: Box::new(sqlite_failure(rusqlite::ffi::SQLITE_BUSY)),
        };
        assert!(wrapped.is_unavailable());
    }

    #[test]
    fn test_sqlite_data_errors_are_not_unavailable() {
        assert!(!sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT).is_unavailable());
        assert!(!sqlite_failure(rusqlite::ffi::SQLITE_CORRUPT).is_unavailable());
        assert!(!StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows).is_unavailable());
    }
}
