//! Acceptance paths of the token cache

mod common;

use std::thread;
use std::time::Duration;

use common::{Fixture, current_timestamp, manual_fixture, random_claims};
use tenant_authz::{Algorithm, Rejection, TenantInfo, TokenCacheConfig, TokenClaims};

const REPEATS: usize = 50;

#[test]
fn test_random_valid_tokens_authorize_their_tenants() {
    let now = current_timestamp();
    let (fixture, _clock) = manual_fixture("base", 1000, now);
    let mut rng = rand::rng();

    for _ in 0..REPEATS {
        let claims = random_claims(&mut rng, now);
        fixture.register_alias(&claims.key_id);
        let token = fixture.sign(&claims);

        for tenant in claims.tenants.as_ref().unwrap() {
            assert!(
                fixture.cache.validate(tenant.as_bytes(), token.as_bytes()),
                "tenant {tenant} of {claims}"
            );
        }
        assert!(fixture.cache.contains(token.as_bytes()));
    }
    assert_eq!(fixture.cache.len(), REPEATS);
    assert!(fixture.reporter.is_empty(), "{:?}", fixture.reporter.events());
}

#[test]
fn test_token_expires_while_cached() {
    let now = current_timestamp();
    let (fixture, clock) = manual_fixture("K1", 10, now);
    let mut rng = rand::rng();

    let mut claims = random_claims(&mut rng, now);
    claims.key_id = "K1".to_string();
    let lifetime = claims.expires_at.unwrap() - now;
    let token = fixture.sign(&claims);
    let tenant = claims.tenants.as_ref().unwrap()[0].clone();

    // GIVEN: a cached token
    assert!(fixture.cache.validate(tenant.as_bytes(), token.as_bytes()));

    // WHEN: its expiration time passes
    clock.advance(lifetime as f64 + 1.0);

    // THEN: the cached entry stops authorizing
    assert!(!fixture.cache.validate(tenant.as_bytes(), token.as_bytes()));
    assert_eq!(fixture.reporter.reasons(), vec![Rejection::ExpiredInCache]);
    let event = fixture.reporter.last().unwrap();
    assert_eq!(event.token, token.as_bytes());
}

#[test]
fn test_short_lived_token_on_wall_clock() {
    let fixture = Fixture::new("K1", 100);
    let now = current_timestamp();

    let mut claims = TokenClaims::new(Algorithm::Es256, "K1");
    claims.issued_at = Some(now);
    claims.not_before = Some(now);
    claims.expires_at = Some(now + 2);
    claims.tenants = Some(vec!["tenantA".to_string()]);
    let token = fixture.sign(&claims);

    assert!(fixture.cache.validate(b"tenantA", token.as_bytes()));

    thread::sleep(Duration::from_millis(3500));

    assert!(!fixture.cache.validate(b"tenantA", token.as_bytes()));
    assert_eq!(fixture.reporter.reasons(), vec![Rejection::ExpiredInCache]);
}

#[test]
fn test_evicted_tokens_are_verified_again() {
    let now = current_timestamp();
    let (fixture, _clock) = manual_fixture("K1", 3, now);
    let mut rng = rand::rng();

    let tokens: Vec<(String, String)> = (0..6)
        .map(|_| {
            let mut claims = random_claims(&mut rng, now);
            claims.key_id = "K1".to_string();
            let tenant = claims.tenants.as_ref().unwrap()[0].clone();
            (tenant, fixture.sign(&claims))
        })
        .collect();

    for (tenant, token) in &tokens {
        assert!(fixture.cache.validate(tenant.as_bytes(), token.as_bytes()));
    }
    assert_eq!(fixture.cache.len(), 3);
    for (i, (_, token)) in tokens.iter().enumerate() {
        assert_eq!(fixture.cache.contains(token.as_bytes()), i >= 3, "token {i}");
    }

    // Without the key only resident tokens still authorize
    fixture.registry.remove("K1");
    for (i, (tenant, token)) in tokens.iter().enumerate().rev() {
        let authorized = fixture.cache.validate(tenant.as_bytes(), token.as_bytes());
        assert_eq!(authorized, i >= 3, "token {i}");
    }
    assert_eq!(
        fixture.reporter.reasons(),
        vec![Rejection::UnknownKey; 3]
    );
}

#[test]
fn test_recently_used_token_survives_eviction() {
    let now = current_timestamp();
    let (fixture, _clock) = manual_fixture("K1", 2, now);
    let mut rng = rand::rng();

    let mut sign = || {
        let mut claims = random_claims(&mut rng, now);
        claims.key_id = "K1".to_string();
        let tenant = claims.tenants.as_ref().unwrap()[0].clone();
        (tenant, fixture.sign(&claims))
    };
    let (a, b, c) = (sign(), sign(), sign());

    assert!(fixture.cache.validate(a.0.as_bytes(), a.1.as_bytes()));
    assert!(fixture.cache.validate(b.0.as_bytes(), b.1.as_bytes()));
    // Touch `a` so `b` is least recently used
    assert!(fixture.cache.validate(a.0.as_bytes(), a.1.as_bytes()));
    assert!(fixture.cache.validate(c.0.as_bytes(), c.1.as_bytes()));

    assert!(fixture.cache.contains(a.1.as_bytes()));
    assert!(!fixture.cache.contains(b.1.as_bytes()));
    assert!(fixture.cache.contains(c.1.as_bytes()));
}

#[test]
fn test_tenant_info_uses_token_cache() {
    let now = current_timestamp();
    let (fixture, _clock) = manual_fixture("K1", 10, now);
    let mut rng = rand::rng();

    let mut claims = random_claims(&mut rng, now);
    claims.key_id = "K1".to_string();
    let token = fixture.sign(&claims);
    let tenant = claims.tenants.as_ref().unwrap()[0].clone();
    let config = TokenCacheConfig::default();

    let mut granted = TenantInfo::new(Some(tenant), Some(token.clone()), 42);
    granted.authorize(&fixture.cache, &config);
    assert!(granted.is_authorized());

    let mut denied = TenantInfo::new(Some("someone-else".into()), Some(token), 43);
    denied.authorize(&fixture.cache, &config);
    assert!(!denied.is_authorized());
    assert!(denied.with_trusted(true).is_authorized());
}
