//! Per-request tenant descriptor

use serde::{Deserialize, Serialize};

use crate::cache::TokenCache;
use crate::config::TokenCacheConfig;

/// Tenant id of requests that do not target a tenant
pub const INVALID_TENANT: i64 = -1;

/// Tenant a request targets, with the token presented for it
///
/// `trusted` and `tenant_authorized` are decided locally and never travel
/// over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantInfo {
    /// Tenant name
    #[serde(default)]
    pub name: Option<String>,
    /// Bearer token presented for the tenant
    #[serde(default)]
    pub token: Option<String>,
    /// Tenant id, [`INVALID_TENANT`] when unset
    #[serde(default = "invalid_tenant")]
    pub tenant_id: i64,
    /// Request came from a trusted peer
    #[serde(skip)]
    pub trusted: bool,
    /// Token grants the named tenant
    #[serde(skip)]
    pub tenant_authorized: bool,
}

fn invalid_tenant() -> i64 {
    INVALID_TENANT
}

impl Default for TenantInfo {
    fn default() -> Self {
        Self {
            name: None,
            token: None,
            tenant_id: INVALID_TENANT,
            trusted: false,
            tenant_authorized: false,
        }
    }
}

impl TenantInfo {
    /// Unauthorized descriptor for `name` carrying `token`
    pub fn new(name: Option<String>, token: Option<String>, tenant_id: i64) -> Self {
        Self {
            name,
            token,
            tenant_id,
            ..Self::default()
        }
    }

    /// Mark the request as coming from a trusted peer
    pub fn with_trusted(mut self, trusted: bool) -> Self {
        self.trusted = trusted;
        self
    }

    /// Decide `tenant_authorized`
    ///
    /// Starts from `allow_tokenless_tenant_access`. When that is off and both
    /// a name and a token are present, the token cache decides.
    pub fn authorize(&mut self, cache: &TokenCache, config: &TokenCacheConfig) {
        self.tenant_authorized = config.allow_tokenless_tenant_access;
        if self.tenant_authorized {
            return;
        }
        if let (Some(name), Some(token)) = (&self.name, &self.token) {
            self.tenant_authorized = cache.validate(name.as_bytes(), token.as_bytes());
        }
    }

    /// Whether a tenant id is set
    pub fn has_tenant(&self) -> bool {
        self.tenant_id != INVALID_TENANT
    }

    /// Trusted peers are always authorized; others need an authorized tenant
    pub fn is_authorized(&self) -> bool {
        self.trusted || self.tenant_authorized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyRegistry;
    use std::sync::Arc;

    fn empty_cache() -> TokenCache {
        TokenCache::builder(Arc::new(KeyRegistry::new()))
            .capacity(2)
            .build()
            .unwrap()
    }

    #[test]
    fn test_default_has_no_tenant() {
        let info = TenantInfo::default();
        assert!(!info.has_tenant());
        assert!(!info.is_authorized());
    }

    #[test]
    fn test_authorization_truth_table() {
        assert!(!TenantInfo::default().is_authorized());
        assert!(TenantInfo::default().with_trusted(true).is_authorized());

        let mut authorized = TenantInfo::default();
        authorized.tenant_authorized = true;
        assert!(authorized.is_authorized());
        assert!(authorized.with_trusted(true).is_authorized());
    }

    #[test]
    fn test_tokenless_access_config() {
        let cache = empty_cache();
        let mut info = TenantInfo::new(Some("tenantA".into()), None, 7);

        info.authorize(&cache, &TokenCacheConfig::default());
        assert!(!info.tenant_authorized);

        let permissive = TokenCacheConfig {
            allow_tokenless_tenant_access: true,
            ..TokenCacheConfig::default()
        };
        info.authorize(&cache, &permissive);
        assert!(info.tenant_authorized);
    }

    #[test]
    fn test_bad_token_is_not_authorized() {
        let cache = empty_cache();
        let mut info = TenantInfo::new(Some("tenantA".into()), Some("1111.22".into()), 7);
        info.authorize(&cache, &TokenCacheConfig::default());
        assert!(!info.is_authorized());
    }

    #[test]
    fn test_local_flags_are_not_serialized() {
        let mut info = TenantInfo::new(Some("tenantA".into()), Some("tok".into()), 3)
            .with_trusted(true);
        info.tenant_authorized = true;

        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("trusted").is_none());
        assert!(json.get("tenant_authorized").is_none());

        let back: TenantInfo = serde_json::from_value(json).unwrap();
        assert!(!back.trusted);
        assert!(!back.tenant_authorized);
        assert_eq!(back.tenant_id, 3);
    }

    #[test]
    fn test_missing_tenant_id_deserializes_invalid() {
        let info: TenantInfo = serde_json::from_str(r#"{"name":"tenantA"}"#).unwrap();
        assert_eq!(info.tenant_id, INVALID_TENANT);
    }
}
