//! Cache construction errors

use thiserror::Error;

/// Errors raised when building an [`LruCache`](crate::LruCache)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CacheError {
    /// A cache must be able to hold at least one entry
    #[error("LRU cache capacity must be at least 1")]
    ZeroCapacity,
}
