//! Error types for runboard cache operations

use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("I/O failure on {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Serialization failed for {path}: {reason}")]
    Serialization { path: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Durable store unavailable: {reason}")]
    Unavailable { reason: String },
}

impl StorageError {
    /// Build an `Io` error from a path and the underlying failure.
    pub fn io(path: &std::path::Path, err: &std::io::Error) -> Self {
        StorageError::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }

    /// Build a `Serialization` error from a path and the underlying failure.
    pub fn serialization(path: &std::path::Path, err: &serde_json::Error) -> Self {
        StorageError::Serialization {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all runboard errors.
#[derive(Debug, Clone, Error)]
pub enum RunboardError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for runboard operations.
pub type RunboardResult<T> = Result<T, RunboardError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_storage_error_display_io() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = StorageError::io(Path::new("/tmp/runs"), &io);
        let msg = format!("{}", err);
        assert!(msg.contains("/tmp/runs"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_storage_error_display_lock_poisoned() {
        let msg = format!("{}", StorageError::LockPoisoned);
        assert_eq!(msg, "Storage lock poisoned");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue {
            field: "run_ttl".to_string(),
            value: "0".to_string(),
            reason: "must be > 0".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("run_ttl"));
        assert!(msg.contains("must be > 0"));
    }

    #[test]
    fn test_runboard_error_from_storage() {
        let err: RunboardError = StorageError::LockPoisoned.into();
        assert!(matches!(err, RunboardError::Storage(StorageError::LockPoisoned)));
        assert!(format!("{}", err).starts_with("Storage error:"));
    }

    #[test]
    fn test_runboard_error_from_config() {
        let err: RunboardError = ConfigError::MissingRequired {
            field: "cache_root".to_string(),
        }
        .into();
        assert!(matches!(err, RunboardError::Config(_)));
    }
}
