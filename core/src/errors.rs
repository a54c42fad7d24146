//! Error types for the ServiceDesk core.
//!
//! Persistence failures are split into two categories: capacity-exceeded
//! (surfaced to the user once per failure episode) and everything else
//! (logged only). Nothing here blocks the in-memory board.

use thiserror::Error;

/// Numeric quota code some storage runtimes attach to a full-store failure.
pub const QUOTA_EXCEEDED_CODE: i32 = 22;

/// Message fragments that identify a full store when no typed signal exists.
const CAPACITY_MARKERS: [&str; 4] = ["quota", "storage full", "disk full", "no space left"];

/// Failure category for a store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The medium is out of space or over its quota.
    CapacityExceeded,
    /// Serialization, medium unavailable, I/O, anything else.
    Other,
}

impl FailureKind {
    /// Machine-readable code for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CapacityExceeded => "CAPACITY_EXCEEDED",
            Self::Other => "STORE_FAILURE",
        }
    }
}

/// Errors from the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage quota exceeded: {message}")]
    QuotaExceeded { message: String },

    #[error("storage backend error: {message}")]
    Backend { code: Option<i32>, message: String },

    #[error("storage medium unavailable: {message}")]
    Unavailable { message: String },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::QuotaExceeded {
            message: message.into(),
        }
    }

    pub fn backend(code: Option<i32>, message: impl Into<String>) -> Self {
        Self::Backend {
            code,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Classify this failure.
    ///
    /// Typed signals win; the message heuristic is the last resort.
    pub fn kind(&self) -> FailureKind {
        let typed = match self {
            Self::QuotaExceeded { .. } => true,
            Self::Backend { code, .. } => *code == Some(QUOTA_EXCEEDED_CODE),
            Self::Sqlite(e) => e.sqlite_error_code() == Some(rusqlite::ErrorCode::DiskFull),
            Self::Io(e) => e.kind() == std::io::ErrorKind::StorageFull,
            Self::Unavailable { .. } | Self::Serde(_) => false,
        };

        if typed || message_indicates_capacity(&self.to_string()) {
            FailureKind::CapacityExceeded
        } else {
            FailureKind::Other
        }
    }

    pub fn is_capacity_exceeded(&self) -> bool {
        self.kind() == FailureKind::CapacityExceeded
    }
}

/// Fallback heuristic over free-text error messages.
pub fn message_indicates_capacity(message: &str) -> bool {
    let lower = message.to_lowercase();
    CAPACITY_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("repository is still loading")]
    NotReady,

    #[error("intake rejected: {field} is required")]
    InvalidIntake { field: &'static str },
}

/// Configuration error with context.
#[derive(Debug, Error)]
#[error("config error: {message}")]
pub struct ConfigError {
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn explicit_quota_is_capacity() {
        assert_eq!(
            StoreError::quota_exceeded("legacy store over 5 MiB").kind(),
            FailureKind::CapacityExceeded
        );
    }

    #[test]
    fn code_22_is_capacity() {
        let err = StoreError::backend(Some(QUOTA_EXCEEDED_CODE), "write rejected");
        assert_eq!(err.kind(), FailureKind::CapacityExceeded);

        let err = StoreError::backend(Some(5), "write rejected");
        assert_eq!(err.kind(), FailureKind::Other);
    }

    #[test]
    fn message_heuristic_catches_common_phrasings() {
        for msg in [
            "QuotaExceededError",
            "Storage full",
            "DISK FULL while writing",
            "No space left on device (os error 28)",
        ] {
            assert_eq!(
                StoreError::backend(None, msg).kind(),
                FailureKind::CapacityExceeded,
                "{msg}"
            );
        }
    }

    #[test]
    fn other_failures_are_generic() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only fs");
        assert_eq!(StoreError::from(io).kind(), FailureKind::Other);
        assert_eq!(
            StoreError::unavailable("sqlite could not be opened").kind(),
            FailureKind::Other
        );
    }

    #[test]
    fn storage_full_io_kind_is_capacity() {
        let io = std::io::Error::new(std::io::ErrorKind::StorageFull, "write failed");
        assert_eq!(StoreError::from(io).kind(), FailureKind::CapacityExceeded);
    }

    #[test]
    fn sqlite_full_is_capacity() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_FULL),
            None,
        );
        assert_eq!(StoreError::from(err).kind(), FailureKind::CapacityExceeded);
    }
}
