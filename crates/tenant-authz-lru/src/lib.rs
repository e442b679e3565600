//! # Tenant Authz LRU
//!
//! A fixed-capacity key/value store with strict least-recently-used eviction.
//!
//! ## Guarantees
//!
//! - **Bounded** - `len() <= capacity()` at all times; capacity 0 is rejected
//! - **O(1) amortized** - `get` and `insert` are a hash lookup plus a constant
//!   number of link updates
//! - **No overwrite** - inserting a resident key returns the stored value and
//!   drops the new one, so speculative inserts are always safe
//! - **Owned storage** - every key and value is owned by the cache; nothing
//!   borrows from the caller past the call
//!
//! ## Example
//!
//! ```rust
//! use std::num::NonZeroUsize;
//! use tenant_authz_lru::LruCache;
//!
//! let mut cache = LruCache::new(NonZeroUsize::new(2).unwrap());
//! cache.insert("a", 1);
//! cache.insert("b", 2);
//!
//! // Touch "a" so "b" becomes the eviction candidate
//! assert_eq!(cache.get("a"), Some(&1));
//! cache.insert("c", 3);
//!
//! assert!(!cache.contains("b"));
//! assert_eq!(cache.len(), 2);
//! ```

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![deny(unsafe_code)]

mod cache;
mod error;

pub use cache::{Iter, LruCache};
pub use error::CacheError;
