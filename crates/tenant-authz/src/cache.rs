//! The token authorization cache
//!
//! # Decision path
//!
//! ```text
//! validate(tenant, token)
//!   │
//!   ├─ cache hit ──────────────────────────────┐
//!   │                                          ▼
//!   └─ miss → admit(): parse → key → iat → exp → nbf → tenants → signature
//!               │ reject: report, return false │ accept: insert + re-lookup
//!                                              ▼
//!                          exp < now ? ExpiredInCache : tenant listed ? true : TenantTokenMismatch
//! ```
//!
//! Only tokens that passed every admission step are stored. Time validity is
//! checked again on every hit, so a cached token stops authorizing as soon
//! as it expires.
//!
//! # Locking
//!
//! The LRU sits behind one mutex. Signature verification runs without it;
//! the insert and the re-lookup that follows run under a single acquisition.
//! Rejections are reported after the lock is released. Two threads racing on
//! the same new token may both verify it, and the second insert leaves the
//! first entry in place.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tenant_authz_lru::LruCache;
use tracing::debug;

use crate::claims::{TokenClaims, parse_token};
use crate::clock::{Clock, SystemClock};
use crate::config::{DEFAULT_CAPACITY, TokenCacheConfig};
use crate::error::Result;
use crate::keys::KeyLookup;
use crate::report::{
    PeerAddr, PeerSource, Rejection, RejectionEvent, RejectionReporter, TracingReporter,
    UnknownPeer,
};
use crate::sign::verify_token;

/// What the cache remembers about a verified token
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Tenants the token grants, in token order
    pub tenants: Vec<String>,
    /// `exp` claim, seconds since the Unix epoch
    pub expiration_time: f64,
}

impl CacheEntry {
    /// Whether this entry authorizes `tenant` at `now`
    fn verdict(&self, now: f64, tenant: &[u8]) -> std::result::Result<(), Rejection> {
        if self.expiration_time < now {
            return Err(Rejection::ExpiredInCache);
        }
        if !self.tenants.iter().any(|t| t.as_bytes() == tenant) {
            return Err(Rejection::TenantTokenMismatch);
        }
        Ok(())
    }
}

/// Bounded cache of verified tokens answering tenant authorization checks
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use tenant_authz::{Algorithm, KeyRegistry, SigningKey, TokenCache, TokenClaims, sign_token};
/// use std::time::{SystemTime, UNIX_EPOCH};
///
/// let key = SigningKey::generate_es256("K1")?;
/// let registry = Arc::new(KeyRegistry::new());
/// registry.insert("K1", key.verification_key().clone());
///
/// let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
/// let mut claims = TokenClaims::new(Algorithm::Es256, "K1");
/// claims.issued_at = Some(now);
/// claims.not_before = Some(now);
/// claims.expires_at = Some(now + 600);
/// claims.tenants = Some(vec!["tenantA".to_string()]);
/// let token = sign_token(&claims, &key)?;
///
/// let cache = TokenCache::builder(registry).capacity(16).build()?;
/// assert!(cache.validate(b"tenantA", token.as_bytes()));
/// assert!(!cache.validate(b"tenantB", token.as_bytes()));
/// # Ok::<(), tenant_authz::AuthzError>(())
/// ```
pub struct TokenCache {
    entries: Mutex<LruCache<Box<[u8]>, CacheEntry>>,
    keys: Arc<dyn KeyLookup>,
    clock: Arc<dyn Clock>,
    peers: Arc<dyn PeerSource>,
    reporter: Arc<dyn RejectionReporter>,
}

impl fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock();
        f.debug_struct("TokenCache")
            .field("len", &entries.len())
            .field("capacity", &entries.capacity())
            .finish_non_exhaustive()
    }
}

impl TokenCache {
    /// Start building a cache that resolves keys through `keys`
    pub fn builder<K: KeyLookup + 'static>(keys: Arc<K>) -> TokenCacheBuilder {
        TokenCacheBuilder::new(keys)
    }

    /// Cache sized by `config`, with the system clock and tracing reporter
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::InvalidConfig`](crate::AuthzError::InvalidConfig)
    /// if the configuration is invalid.
    pub fn with_config<K: KeyLookup + 'static>(
        config: &TokenCacheConfig,
        keys: Arc<K>,
    ) -> Result<Self> {
        config.validate()?;
        Self::builder(keys).config(config).build()
    }

    /// Whether `token` authorizes `tenant`, for the current peer
    ///
    /// # Panics
    ///
    /// See [`validate_from`](Self::validate_from).
    pub fn validate(&self, tenant: &[u8], token: &[u8]) -> bool {
        self.validate_from(self.peers.current_peer(), tenant, token)
    }

    /// Whether `token` authorizes `tenant`, reporting rejections against `peer`
    ///
    /// Never fails: every rejection is reported and yields `false`.
    ///
    /// # Panics
    ///
    /// Panics if a freshly admitted token is missing from the cache on the
    /// lookup that immediately follows its insertion. Both happen under one
    /// lock acquisition, so this indicates a broken cache.
    pub fn validate_from(&self, peer: PeerAddr, tenant: &[u8], token: &[u8]) -> bool {
        let now = self.clock.now();

        let cached = self
            .entries
            .lock()
            .get(token)
            .map(|entry| entry.verdict(now, tenant));

        let verdict = match cached {
            Some(verdict) => verdict,
            None => {
                let Some(admitted) = self.admit(now, token, peer) else {
                    return false;
                };
                let mut entries = self.entries.lock();
                entries.insert(Box::from(token), admitted);
                entries
                    .get(token)
                    .map(|entry| entry.verdict(now, tenant))
                    .expect("token cache lost an entry inside a single lock acquisition")
            }
        };

        match verdict {
            Ok(()) => true,
            Err(reason) => {
                let tenant = (reason == Rejection::TenantTokenMismatch).then_some(tenant);
                self.reject(peer, reason, now, token, None, tenant);
                false
            }
        }
    }

    /// Number of cached tokens
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Maximum number of cached tokens
    pub fn capacity(&self) -> usize {
        self.entries.lock().capacity()
    }

    /// Whether no tokens are cached
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Whether `token` is cached (no recency change)
    pub fn contains(&self, token: &[u8]) -> bool {
        self.entries.lock().contains(token)
    }

    /// Run the admission pipeline for an uncached token
    fn admit(&self, now: f64, token: &[u8], peer: PeerAddr) -> Option<CacheEntry> {
        let parsed = match parse_token(token) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(peer = %peer, error = %e, "Token failed to parse");
                self.reject(peer, Rejection::ParseError, now, token, None, None);
                return None;
            }
        };
        let claims = &parsed.claims;
        let fail = |reason| {
            self.reject(peer, reason, now, token, Some(claims), None);
            None
        };

        let Some(key) = self.keys.lookup_key(&claims.key_id) else {
            return fail(Rejection::UnknownKey);
        };
        if claims.issued_at.is_none() {
            return fail(Rejection::NoIssuedAt);
        }
        let Some(expires_at) = claims.expires_at else {
            return fail(Rejection::NoExpirationTime);
        };
        if expires_at as f64 <= now {
            return fail(Rejection::Expired);
        }
        let Some(not_before) = claims.not_before else {
            return fail(Rejection::NoNotBefore);
        };
        if not_before as f64 > now {
            return fail(Rejection::TokenNotYetValid);
        }
        let Some(tenants) = &claims.tenants else {
            return fail(Rejection::NoTenants);
        };
        let verified = std::str::from_utf8(token).is_ok_and(|text| verify_token(text, &key));
        if !verified {
            return fail(Rejection::InvalidSignature);
        }

        debug!(
            key_id = %claims.key_id,
            expires_at,
            tenants = tenants.len(),
            "Admitting token into cache"
        );
        Some(CacheEntry {
            tenants: tenants.clone(),
            expiration_time: expires_at as f64,
        })
    }

    fn reject(
        &self,
        peer: PeerAddr,
        reason: Rejection,
        current_time: f64,
        token: &[u8],
        claims: Option<&TokenClaims>,
        tenant: Option<&[u8]>,
    ) {
        self.reporter.report(&RejectionEvent {
            peer,
            reason,
            current_time,
            token,
            claims,
            tenant,
        });
    }
}

/// Builder for [`TokenCache`]
pub struct TokenCacheBuilder {
    capacity: usize,
    keys: Arc<dyn KeyLookup>,
    clock: Arc<dyn Clock>,
    peers: Arc<dyn PeerSource>,
    reporter: Arc<dyn RejectionReporter>,
}

impl fmt::Debug for TokenCacheBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCacheBuilder")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl TokenCacheBuilder {
    fn new<K: KeyLookup + 'static>(keys: Arc<K>) -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            keys,
            clock: Arc::new(SystemClock),
            peers: Arc::new(UnknownPeer),
            reporter: Arc::new(TracingReporter),
        }
    }

    /// Maximum number of cached tokens
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Take the capacity from `config`
    pub fn config(mut self, config: &TokenCacheConfig) -> Self {
        self.capacity = config.capacity;
        self
    }

    /// Time source for expiration checks
    pub fn clock<C: Clock + 'static>(mut self, clock: Arc<C>) -> Self {
        self.clock = clock;
        self
    }

    /// Source of the peer reported with rejections
    pub fn peer_source<P: PeerSource + 'static>(mut self, peers: Arc<P>) -> Self {
        self.peers = peers;
        self
    }

    /// Where rejections go
    pub fn reporter<R: RejectionReporter + 'static>(mut self, reporter: Arc<R>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Build the cache
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::Cache`](crate::AuthzError::Cache) if the
    /// capacity is 0.
    pub fn build(self) -> Result<TokenCache> {
        Ok(TokenCache {
            entries: Mutex::new(LruCache::with_capacity(self.capacity)?),
            keys: self.keys,
            clock: self.clock,
            peers: self.peers,
            reporter: self.reporter,
        })
    }
}
