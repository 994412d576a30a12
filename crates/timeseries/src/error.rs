//! Errors from the time-series writer and its backing sink.

use thiserror::Error;

/// Errors the time-series writer or one of its sinks can raise.
#[derive(Debug, Error)]
pub enum TimeseriesError {
    /// The sink's HTTP endpoint could not be reached or returned a server
    /// error; expected to clear on retry.
    #[error("time-series sink transient error: {0}")]
    Transient(String),

    /// The sink rejected the write outright (bad credentials, malformed
    /// line protocol); retrying will not help.
    #[error("time-series sink permanent error: {0}")]
    Permanent(String),

    /// The on-disk overflow buffer could not be read or written.
    #[error("overflow buffer error: {0}")]
    Overflow(String),
}
