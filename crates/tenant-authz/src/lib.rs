//! # Tenant Authz - Token Authorization Cache
//!
//! The authorization fast path of an RPC layer: for every request that
//! carries a bearer token, decide whether the caller may act on the named
//! tenant.
//!
//! A token is verified once (structure, key, time claims, tenants claim,
//! signature) and then remembered in a bounded LRU keyed by the raw token
//! bytes. Repeat checks are a cache lookup plus an expiration and tenant
//! check; a cached token stops authorizing the moment it expires.
//!
//! ## Architecture
//!
//! - [`cache`] - [`TokenCache`], the decision path
//! - [`claims`] - Token claims and the compact-form parser
//! - [`sign`] - Signing and signature verification (`jsonwebtoken`)
//! - [`keys`] - Verification keys and the concurrent [`KeyRegistry`]
//! - [`jwks`] - JSON Web Key Set documents
//! - [`report`] - Rejection reasons, reporters and peer identity
//! - [`clock`] - Time sources
//! - [`config`] - [`TokenCacheConfig`] with file and environment loading
//! - [`tenant`] - [`TenantInfo`] request descriptor
//! - [`global`] - Process-wide instance for the transport boundary
//!
//! ## Rejections
//!
//! `validate` never returns an error. Each refused token is handed to the
//! configured [`RejectionReporter`] with one of these reasons:
//!
//! | Reason | When |
//! |---|---|
//! | `ParseError` | not three base64url JSON segments with the required header |
//! | `UnknownKey` | `kid` not in the key registry |
//! | `NoIssuedAt` / `NoExpirationTime` / `NoNotBefore` | time claim missing |
//! | `Expired` | `exp <= now` at admission |
//! | `TokenNotYetValid` | `nbf > now` at admission |
//! | `NoTenants` | `tenants` claim missing |
//! | `InvalidSignature` | signature or algorithm does not match the key |
//! | `ExpiredInCache` | cached entry with `exp < now` |
//! | `TenantTokenMismatch` | tenant not listed in the token |
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use tenant_authz::{KeyRegistry, TokenCache, TokenCacheConfig};
//!
//! let registry = Arc::new(KeyRegistry::new());
//! // registry.load_jwks_file("keys.json")?;
//!
//! let cache = TokenCache::with_config(&TokenCacheConfig::default(), registry)?;
//! assert!(!cache.validate(b"tenantA", b"not-a-token"));
//! # Ok::<(), tenant_authz::AuthzError>(())
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]
#![deny(unsafe_code)]

pub mod cache;
pub mod claims;
pub mod clock;
pub mod config;
pub mod error;
pub mod global;
pub mod jwks;
pub mod keys;
pub mod report;
pub mod sign;
pub mod tenant;

pub use cache::{CacheEntry, TokenCache, TokenCacheBuilder};
pub use claims::{Algorithm, ParseError, ParsedToken, TokenClaims, parse_token};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DEFAULT_CAPACITY, TokenCacheConfig};
pub use error::{AuthzError, Result};
pub use jwks::{Jwk, JwkSet};
pub use keys::{KeyLookup, KeyRegistry, VerificationKey};
pub use report::{
    PeerAddr, PeerSource, RecordedRejection, RecordingReporter, Rejection, RejectionEvent,
    RejectionReporter, TracingReporter, UnknownPeer,
};
pub use sign::{SigningKey, sign_token, verify_token};
pub use tenant::{INVALID_TENANT, TenantInfo};
