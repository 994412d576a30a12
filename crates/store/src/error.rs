//! Errors from the relational store.

use thiserror::Error;

/// Errors a [`crate::RelationalStore`] implementation can raise.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The connection pool could not be created or was lost.
    #[error("store connection error: {0}")]
    Connection(String),

    /// A query failed for a reason expected to clear on retry.
    #[error("transient store error: {0}")]
    Transient(String),

    /// A schema or constraint violation that will not clear on retry.
    #[error("permanent store error: {0}")]
    Permanent(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::Permanent(err.to_string())
            }
            sqlx::Error::Database(db_err) if db_err.is_check_violation() => {
                Self::Permanent(err.to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => Self::Transient(err.to_string()),
            _ => Self::Transient(err.to_string()),
        }
    }
}
