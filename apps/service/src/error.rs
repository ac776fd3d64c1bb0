use deadpool::managed::PoolError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced by the monitoring core.
///
/// Probe failures are not errors: an unreachable site is recorded as a `false`
/// outcome. Storage errors, on the other hand, always propagate to whoever
/// triggered the operation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid address: {0:?}")]
    InvalidAddress(String),

    #[error("Check interval must be at least 1 minute, got {0}")]
    InvalidInterval(u32),

    #[error("Target name must not be blank")]
    InvalidName,

    #[error("Database query failed: {0}")]
    Storage(#[from] libsql::Error),

    #[error("Database pool unavailable: {0}")]
    Pool(String),

    #[error("Corrupt row in {table}: {reason}")]
    CorruptRow { table: &'static str, reason: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Whether the error was caused by caller input rather than the environment.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::InvalidAddress(_) | Error::InvalidInterval(_) | Error::InvalidName)
    }

    pub(crate) fn corrupt(table: &'static str, reason: impl Into<String>) -> Self {
        Error::CorruptRow { table, reason: reason.into() }
    }
}

impl From<PoolError<libsql::Error>> for Error {
    fn from(error: PoolError<libsql::Error>) -> Self {
        match error {
            PoolError::Backend(error) => Error::Storage(error),
            other => Error::Pool(other.to_string()),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
