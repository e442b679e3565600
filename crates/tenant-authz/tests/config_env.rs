//! Environment overrides for file configuration
//!
//! Runs as its own test binary: it mutates the process environment.

use std::io::Write;

use tenant_authz::{AuthzError, TokenCacheConfig};

#[test]
#[allow(unsafe_code)]
fn test_environment_overrides_file_values() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(b"capacity = 250\nallow_tokenless_tenant_access = false\n")
        .unwrap();

    // SAFETY: single test in this binary, no other thread reads the environment
    unsafe {
        std::env::set_var("TENANT_AUTHZ_CAPACITY", "512");
        std::env::set_var("TENANT_AUTHZ_ALLOW_TOKENLESS_TENANT_ACCESS", "true");
    }

    let config = TokenCacheConfig::from_file(file.path()).unwrap();
    assert_eq!(config.capacity, 512);
    assert!(config.allow_tokenless_tenant_access);

    // Overrides go through the same range checks
    unsafe {
        std::env::set_var("TENANT_AUTHZ_CAPACITY", "0");
    }
    assert!(matches!(
        TokenCacheConfig::from_file(file.path()),
        Err(AuthzError::InvalidConfig(_))
    ));

    unsafe {
        std::env::remove_var("TENANT_AUTHZ_CAPACITY");
        std::env::remove_var("TENANT_AUTHZ_ALLOW_TOKENLESS_TENANT_ACCESS");
    }
    assert_eq!(TokenCacheConfig::from_file(file.path()).unwrap().capacity, 250);
}
