//! Error taxonomy shared by the engine, the adapters and the stores.

use thiserror::Error;

/// Every way a sync operation can fail.
///
/// The variants follow how a run reacts to them, not where they come from:
/// `Unavailable` turns a run into a no-op, `AuthFailure` aborts it, and the
/// rest are recorded against a single record while the run carries on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Credentials or subject are not configured; the subsystem is disabled.
    #[error("directory sync is not configured")]
    Unavailable,

    #[error("authentication rejected by provider: {0}")]
    AuthFailure(String),

    /// Network trouble, rate limiting or a provider 5xx.
    #[error("transient remote error{}: {message}", status_suffix(.status))]
    Transient {
        status: Option<u16>,
        message: String,
    },

    #[error("remote rejected payload: {0}")]
    Validation(String),

    #[error("version conflict: {0}")]
    VersionConflict(String),

    #[error("remote record not found: {0}")]
    NotFound(String),

    /// The change token is no longer accepted. Adapters absorb this one.
    #[error("change token expired")]
    TokenExpired,

    #[error("local store error: {0}")]
    Store(String),

    #[error("field mapping error: {0}")]
    Mapping(String),
}

impl SyncError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            status: None,
            message: message.into(),
        }
    }

    pub fn store(error: impl std::fmt::Display) -> Self {
        Self::Store(error.to_string())
    }

    /// Whether a retry wrapper may try the same call again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Whether the whole run must stop rather than skip one record.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, Self::AuthFailure(_) | Self::Unavailable)
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
