//! Error taxonomy for facade operations.

use std::io;

use thiserror::Error;

/// Result type for facade operations.
pub type FsResult<T> = Result<T, FsError>;

/// Facade operation errors.
#[derive(Debug, Error)]
pub enum FsError {
    /// The access gate refused the operation.
    #[error("access denied to '{0}'")]
    AccessDenied(String),

    /// The path did not resolve against any mount.
    #[error("not found: '{0}'")]
    NotFound(String),

    /// The storage backend reported an error.
    #[error("{prefix}: '{path}' reason: {reason}")]
    Backend {
        prefix: String,
        path: String,
        reason: String,
    },

    /// Preference-directory resolution or write-directory designation failed.
    #[error("identity error: {0}")]
    Identity(String),

    /// Process creation failed.
    #[error("failed to spawn process: {0}")]
    Spawn(String),

    /// The capability is unavailable in this build or environment.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl FsError {
    /// Wrap a backend failure with the standard log formatting.
    pub fn backend(prefix: impl Into<String>, path: impl Into<String>, err: &io::Error) -> Self {
        FsError::Backend {
            prefix: prefix.into(),
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

impl From<io::Error> for FsError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FsError::NotFound(err.to_string()),
            io::ErrorKind::PermissionDenied => FsError::AccessDenied(err.to_string()),
            _ => FsError::Backend {
                prefix: "io error".to_string(),
                path: String::new(),
                reason: err.to_string(),
            },
        }
    }
}
