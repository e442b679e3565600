//! Token cache benchmarks
//!
//! Compares the cached decision path against full verification.
//!
//! Run with:
//! ```bash
//! cargo bench -p tenant-authz --bench validate_benchmark
//! ```

use std::hint::black_box;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use criterion::{Criterion, criterion_group, criterion_main};
use tenant_authz::{
    Algorithm, KeyRegistry, SigningKey, TokenCache, TokenClaims, sign_token, verify_token,
};

fn signed_token(key: &SigningKey) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs();
    let mut claims = TokenClaims::new(Algorithm::Es256, key.key_id());
    claims.issued_at = Some(now);
    claims.not_before = Some(now);
    claims.expires_at = Some(now + 3600);
    claims.tenants = Some(vec!["tenantA".to_string(), "tenantB".to_string()]);
    sign_token(&claims, key).expect("signing failed")
}

fn bench_validate(c: &mut Criterion) {
    let key = SigningKey::generate_es256("bench").expect("key generation failed");
    let registry = Arc::new(KeyRegistry::new());
    registry.insert("bench", key.verification_key().clone());
    let token = signed_token(&key);

    let mut group = c.benchmark_group("validate");

    let cache = TokenCache::builder(Arc::clone(&registry))
        .capacity(1_000)
        .build()
        .expect("valid capacity");
    assert!(cache.validate(b"tenantB", token.as_bytes()));
    group.bench_function("cached_hit", |b| {
        b.iter(|| black_box(cache.validate(b"tenantB", token.as_bytes())));
    });

    group.bench_function("signature_only", |b| {
        b.iter(|| black_box(verify_token(&token, key.verification_key())));
    });

    group.finish();
}

criterion_group!(benches, bench_validate);
criterion_main!(benches);
