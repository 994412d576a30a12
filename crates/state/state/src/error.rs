//! Errors from the shared-cache abstraction.

use thiserror::Error;

/// Errors a [`crate::store::SharedCache`] implementation can raise. Every
/// variant is treated as retryable (`TransientStore` in the core error
/// taxonomy) by callers; the shared cache is never the source of truth.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend connection could not be established or was lost.
    #[error("cache connection error: {0}")]
    Connection(String),

    /// The backend rejected or failed an operation.
    #[error("cache backend error: {0}")]
    Backend(String),
}
