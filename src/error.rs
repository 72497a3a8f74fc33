//! Crate-wide error taxonomy
//!
//! Every fallible operation reports one of these classes so callers know
//! whether to reject, retry, or surface:
//! - `InvalidArgument`, `NotFound`, `Conflict` are never retried
//! - `ClusterRace` is the one recoverable conflict: the incident commit
//!   found a member already escalated, and the caller may retry once
//!   against a fresh snapshot
//! - `Unavailable` is transient and retried with bounded backoff
//! - `Internal` is unexpected and always logged at the raise site

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline error classes
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Malformed input: bad hash format, unknown operation kind, missing
    /// fields an operation requires
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Referenced alert/incident/transaction does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Write rejected: already-confirmed transaction, closed incident,
    /// or a backwards status transition
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A cluster member was claimed by a concurrent incident commit
    #[error("Cluster race: {0}")]
    ClusterRace(String),

    /// Storage or ledger gateway transiently unreachable
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Unexpected condition
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a coordinator should retry after backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Unavailable(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(ref err, _) => match err.code {
                rusqlite::ErrorCode::DatabaseBusy
                | rusqlite::ErrorCode::DatabaseLocked
                | rusqlite::ErrorCode::CannotOpen => Error::Unavailable(e.to_string()),
                rusqlite::ErrorCode::ConstraintViolation => Error::InvalidArgument(e.to_string()),
                _ => Error::Internal(e.to_string()),
            },
            other => Error::Internal(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            Error::Unavailable(e.to_string())
        } else {
            Error::Internal(e.to_string())
        }
    }
}
