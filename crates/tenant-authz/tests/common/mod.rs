//! Common test utilities for integration tests
//!
//! Provides randomized token claims and a ready-to-use token cache wired to
//! a freshly generated ES256 key.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use rand::distr::Alphanumeric;
use tenant_authz::{
    Algorithm, Clock, KeyRegistry, ManualClock, RecordingReporter, SigningKey, SystemClock,
    TokenCache, TokenClaims, sign_token,
};

/// Get current Unix timestamp
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs()
}

/// Random alphanumeric string with length in `min..max`
pub fn random_alphanumeric(rng: &mut impl Rng, min: usize, max: usize) -> String {
    let len = rng.random_range(min..max);
    rng.sample_iter(Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Random valid claims issued at `now`
///
/// - `iat` = `nbf` = `now`, `exp` = `now` + 360..1080 seconds
/// - 1 to 3 tenants of 8 to 15 characters
/// - key id of 10 to 19 characters
pub fn random_claims(rng: &mut impl Rng, now: u64) -> TokenClaims {
    let key_id = random_alphanumeric(rng, 10, 20);
    let mut claims = TokenClaims::new(Algorithm::Es256, key_id);
    claims.issuer = Some(random_alphanumeric(rng, 8, 16));
    claims.token_id = Some(random_alphanumeric(rng, 16, 32));
    claims.issued_at = Some(now);
    claims.not_before = Some(now);
    claims.expires_at = Some(now + rng.random_range(360..1080));
    let tenant_count = rng.random_range(1..=3);
    claims.tenants = Some(
        (0..tenant_count)
            .map(|_| random_alphanumeric(rng, 8, 16))
            .collect(),
    );
    claims
}

/// A token cache with one registered ES256 key and a recording reporter
pub struct Fixture {
    pub key: SigningKey,
    pub registry: Arc<KeyRegistry>,
    pub reporter: Arc<RecordingReporter>,
    pub cache: TokenCache,
}

impl Fixture {
    /// Fixture on the wall clock
    pub fn new(key_id: &str, capacity: usize) -> Self {
        Self::with_clock(key_id, capacity, Arc::new(SystemClock))
    }

    /// Fixture on a caller-controlled clock
    pub fn with_clock<C: Clock + 'static>(key_id: &str, capacity: usize, clock: Arc<C>) -> Self {
        let key = SigningKey::generate_es256(key_id).expect("ES256 key generation failed");
        let registry = Arc::new(KeyRegistry::new());
        registry.insert(key_id, key.verification_key().clone());
        let reporter = Arc::new(RecordingReporter::new());
        let cache = TokenCache::builder(Arc::clone(&registry))
            .capacity(capacity)
            .clock(clock)
            .reporter(Arc::clone(&reporter))
            .build()
            .expect("valid cache configuration");
        Self {
            key,
            registry,
            reporter,
            cache,
        }
    }

    /// Also publish the fixture key under `key_id`
    pub fn register_alias(&self, key_id: &str) {
        self.registry
            .insert(key_id, self.key.verification_key().clone());
    }

    /// Sign `claims` with the fixture key, whatever key id they name
    pub fn sign(&self, claims: &TokenClaims) -> String {
        sign_token(claims, &self.key).expect("signing failed")
    }
}

/// Fixture on a manual clock starting at `start`
pub fn manual_fixture(key_id: &str, capacity: usize, start: u64) -> (Fixture, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start as f64));
    let fixture = Fixture::with_clock(key_id, capacity, Arc::clone(&clock));
    (fixture, clock)
}
