//! Process-wide token cache
//!
//! Libraries should take a `&TokenCache` from their caller. This accessor is
//! for the process boundary, where a transport needs one shared cache and has
//! nowhere to thread it from.

use once_cell::sync::OnceCell;

use crate::cache::TokenCache;
use crate::error::{AuthzError, Result};

static TOKEN_CACHE: OnceCell<TokenCache> = OnceCell::new();

/// Install `cache` as the process-wide instance
///
/// # Errors
///
/// Returns [`AuthzError::AlreadyInitialized`] if an instance exists already.
pub fn install(cache: TokenCache) -> Result<&'static TokenCache> {
    TOKEN_CACHE
        .try_insert(cache)
        .map_err(|_| AuthzError::AlreadyInitialized)
}

/// The process-wide instance, if one was installed
pub fn instance() -> Option<&'static TokenCache> {
    TOKEN_CACHE.get()
}

/// The process-wide instance, building it with `init` on first use
pub fn get_or_init(init: impl FnOnce() -> TokenCache) -> &'static TokenCache {
    TOKEN_CACHE.get_or_init(init)
}

/// Fallible [`get_or_init`]
///
/// # Errors
///
/// Returns whatever `init` returns; nothing is installed in that case.
pub fn get_or_try_init(init: impl FnOnce() -> Result<TokenCache>) -> Result<&'static TokenCache> {
    TOKEN_CACHE.get_or_try_init(init)
}
