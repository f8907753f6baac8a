use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Failed to open process: {0}")]
    ProcessOpenFailed(String),

    #[error("Timed out after {waited:?} waiting for process {process}")]
    AttachTimeout { process: String, waited: Duration },

    #[error("Process handle for PID {pid} is stale")]
    StaleHandle { pid: u32 },

    #[error("Failed to read process memory at address {address:#x}: {message}")]
    MemoryReadFailed { address: u64, message: String },

    #[error("Signature not found in module: {pattern}")]
    SignatureNotFound { pattern: String },

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid layout: {0}")]
    InvalidLayout(String),

    #[error("Unknown boss: {0}")]
    UnknownBoss(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Failed to read {field}: {reason}")]
    FieldRead { field: &'static str, reason: String },

    #[error("Reader has not been refreshed since the last attach")]
    NotRefreshed,

    #[error("Not attached to any process")]
    NotAttached,

    #[error("Unsupported on this platform: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn field(field: &'static str, reason: impl Into<String>) -> Self {
        Error::FieldRead {
            field,
            reason: reason.into(),
        }
    }

    /// Conditions the caller can expect to clear up by trying again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ProcessNotFound(_)
                | Error::StaleHandle { .. }
                | Error::EntityNotFound(_)
                | Error::MemoryReadFailed { .. }
                | Error::FieldRead { .. }
                | Error::NotRefreshed
                | Error::NotAttached
        )
    }

    /// Conditions that retrying will not fix without outside intervention:
    /// the configured layout no longer matches the binary, or the process
    /// never showed up within the deadline.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::SignatureNotFound { .. }
                | Error::InvalidSignature(_)
                | Error::InvalidLayout(_)
                | Error::UnknownBoss(_)
                | Error::AttachTimeout { .. }
                | Error::Unsupported(_)
        )
    }

    /// A layout file that does not exist. Distinct from a missing entity.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}
