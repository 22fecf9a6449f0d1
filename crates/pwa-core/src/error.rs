//! Error types for the PWA shell core
//!
//! Every failure here is recoverable locally:
//! - Persistence failures keep the in-memory log authoritative
//! - Replay failures abort the pass and keep the full log for the next retry
//! - Configuration errors surface before anything is wired up

use std::path::PathBuf;

/// Main shell error type
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    /// Durable store failed
    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistenceError),

    /// Offline sync pass failed
    #[error("sync failed: {0}")]
    Sync(#[from] SyncError),

    /// Configuration rejected
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ShellError {
    /// Check if a later attempt may succeed without intervention
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Persistence(e) => e.is_transient(),
            Self::Sync(SyncError::ReplayFailed { source, .. }) => source.is_transient(),
            Self::Config(_) => false,
        }
    }
}

/// Durable store errors
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Underlying I/O failed
    #[error("storage i/o failed for key {key}: {source}")]
    Io {
        /// Storage key being accessed
        key: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Stored value could not be encoded or decoded
    #[error("stored value for key {key} is malformed: {source}")]
    Serialization {
        /// Storage key being accessed
        key: String,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// Store refused the operation (quota, disabled storage)
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl PersistenceError {
    /// Whether retrying the same write can succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Serialization { .. })
    }
}

/// Failure reported by a replay handler for one change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    /// Upstream rejected the change
    #[error("change rejected: {0}")]
    Rejected(String),

    /// Upstream could not be reached
    #[error("upstream unreachable: {0}")]
    Unreachable(String),
}

impl ReplayError {
    /// Whether the same change may replay on a later pass
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

/// Sync pass errors
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Replay stopped at a record; the full log is kept
    #[error("replay stopped at change {index} of {total}: {source}")]
    ReplayFailed {
        /// Zero-based position of the failing record
        index: usize,
        /// Records in the pass
        total: usize,
        /// Handler failure
        #[source]
        source: ReplayError,
    },
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config text is not valid TOML for this schema
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parsed but are out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_error_display() {
        let err = ShellError::from(PersistenceError::Unavailable("quota".to_string()));
        assert!(err.to_string().contains("persistence failed"));
        assert!(err.to_string().contains("quota"));
    }

    #[test]
    fn sync_error_display_names_position() {
        let err = SyncError::ReplayFailed {
            index: 1,
            total: 3,
            source: ReplayError::Rejected("conflict".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "replay stopped at change 1 of 3: change rejected: conflict"
        );
    }

    #[test]
    fn shell_error_is_retryable() {
        let unreachable = ShellError::from(SyncError::ReplayFailed {
            index: 0,
            total: 1,
            source: ReplayError::Unreachable("offline".to_string()),
        });
        assert!(unreachable.is_retryable());

        let rejected = ShellError::from(SyncError::ReplayFailed {
            index: 0,
            total: 1,
            source: ReplayError::Rejected("bad".to_string()),
        });
        assert!(!rejected.is_retryable());

        assert!(ShellError::from(PersistenceError::Unavailable("x".into())).is_retryable());
        assert!(!ShellError::from(ConfigError::Invalid("x".into())).is_retryable());
    }
}
