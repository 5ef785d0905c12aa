//! Error types for the hostPath provisioner

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Hard failures of the provisioner.
///
/// "This volume is not for this node" is not an error; it is reported as
/// [`Outcome::Ignored`](crate::domain::Outcome::Ignored).
#[derive(Error, Debug)]
pub enum Error {
    /// A required request parameter or setting is missing or malformed
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A volume descriptor lacks metadata this provisioner always writes
    #[error("Invariant violation on volume {volume}: {reason}")]
    InvariantViolation { volume: String, reason: String },

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Filesystem error on a volume directory
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The API server is older than the oldest supported release
    #[error("Unsupported API server version: {0}")]
    UnsupportedServerVersion(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Whether the controller should retry the request with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Kube(_) | Error::Io { .. } | Error::Internal(_))
    }
}
