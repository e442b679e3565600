//! Public verification keys and the key registry
//!
//! The token cache resolves a token's `kid` through the [`KeyLookup`] trait.
//! [`KeyRegistry`] is the stock implementation: a shared map that can be
//! updated (key rotation, JWKS reload) while validations are in flight.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::DecodingKey;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::claims::Algorithm;
use crate::error::{AuthzError, Result};
use crate::jwks::{Jwk, JwkSet};

/// P-256 coordinate length in bytes
const P256_COORDINATE_LEN: usize = 32;

/// `d`, `p`, `q`, `dp`, `dq`, `qi`
const RSA_PRIVATE_MEMBERS: usize = 6;

/// Resolves key ids to verification keys
pub trait KeyLookup: Send + Sync {
    /// The key registered under `key_id`, if any
    fn lookup_key(&self, key_id: &str) -> Option<Arc<VerificationKey>>;
}

impl<T: KeyLookup + ?Sized> KeyLookup for Arc<T> {
    fn lookup_key(&self, key_id: &str) -> Option<Arc<VerificationKey>> {
        (**self).lookup_key(key_id)
    }
}

#[derive(Clone)]
enum PublicComponents {
    Ec { x: String, y: String },
    Rsa { n: String, e: String },
}

/// A public key bound to the single algorithm it verifies
#[derive(Clone)]
pub struct VerificationKey {
    algorithm: Algorithm,
    decoding: DecodingKey,
    components: Option<PublicComponents>,
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("algorithm", &self.algorithm)
            .field("exportable", &self.components.is_some())
            .finish_non_exhaustive()
    }
}

impl VerificationKey {
    /// ES256 key from base64url-encoded P-256 coordinates
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::InvalidKey`] if a coordinate is not 32 bytes of
    /// base64url.
    pub fn es256_from_components(x: &str, y: &str) -> Result<Self> {
        for (name, coordinate) in [("x", x), ("y", y)] {
            let bytes = URL_SAFE_NO_PAD
                .decode(coordinate)
                .map_err(|e| AuthzError::InvalidKey(format!("EC `{name}` is not base64url: {e}")))?;
            if bytes.len() != P256_COORDINATE_LEN {
                return Err(AuthzError::InvalidKey(format!(
                    "EC `{name}` must be {P256_COORDINATE_LEN} bytes, got {}",
                    bytes.len()
                )));
            }
        }
        let decoding = DecodingKey::from_ec_components(x, y)
            .map_err(|e| AuthzError::InvalidKey(format!("Failed to create EC key: {e}")))?;
        Ok(Self {
            algorithm: Algorithm::Es256,
            decoding,
            components: Some(PublicComponents::Ec {
                x: x.to_string(),
                y: y.to_string(),
            }),
        })
    }

    /// RS256 key from base64url-encoded modulus and exponent
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::InvalidKey`] if either component is empty or not
    /// base64url.
    pub fn rs256_from_components(n: &str, e: &str) -> Result<Self> {
        for (name, component) in [("n", n), ("e", e)] {
            let bytes = URL_SAFE_NO_PAD
                .decode(component)
                .map_err(|err| AuthzError::InvalidKey(format!("RSA `{name}` is not base64url: {err}")))?;
            if bytes.is_empty() {
                return Err(AuthzError::InvalidKey(format!("RSA `{name}` is empty")));
            }
        }
        let decoding = DecodingKey::from_rsa_components(n, e)
            .map_err(|err| AuthzError::InvalidKey(format!("Failed to create RSA key: {err}")))?;
        Ok(Self {
            algorithm: Algorithm::Rs256,
            decoding,
            components: Some(PublicComponents::Rsa {
                n: n.to_string(),
                e: e.to_string(),
            }),
        })
    }

    /// Key from a PEM-encoded public key for `algorithm`
    ///
    /// PEM keys cannot be exported back to a JWK.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::InvalidKey`] if the PEM does not hold a key of
    /// the requested family.
    pub fn from_pem(algorithm: Algorithm, pem: &[u8]) -> Result<Self> {
        let decoding = match algorithm {
            Algorithm::Es256 => DecodingKey::from_ec_pem(pem),
            Algorithm::Rs256 => DecodingKey::from_rsa_pem(pem),
        }
        .map_err(|e| AuthzError::InvalidKey(format!("Failed to read {algorithm} PEM key: {e}")))?;
        Ok(Self {
            algorithm,
            decoding,
            components: None,
        })
    }

    /// Key from a JSON Web Key
    ///
    /// `alg` is required. `EC` keys must be on P-256 and use ES256; `RSA` keys
    /// use RS256 and carry either none or all of the private members. Only
    /// the public half is kept.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::Jwks`] for unsupported key types, curves or
    /// algorithm hints and for missing members, and [`AuthzError::InvalidKey`]
    /// for undecodable key material.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self> {
        fn member<'a>(jwk: &'a Jwk, value: Option<&'a String>, name: &str) -> Result<&'a str> {
            value.map(String::as_str).ok_or_else(|| {
                AuthzError::Jwks(format!("{} key is missing `{name}`", jwk.kty))
            })
        }

        let expected = match jwk.kty.as_str() {
            "EC" => Algorithm::Es256,
            "RSA" => Algorithm::Rs256,
            other => return Err(AuthzError::Jwks(format!("unsupported key type `{other}`"))),
        };
        let alg = member(jwk, jwk.alg.as_ref(), "alg")?;
        if alg != expected.as_str() {
            return Err(AuthzError::Jwks(format!(
                "{} key cannot be used with `{alg}`",
                jwk.kty
            )));
        }

        match expected {
            Algorithm::Es256 => {
                let crv = member(jwk, jwk.crv.as_ref(), "crv")?;
                if crv != "P-256" {
                    return Err(AuthzError::Jwks(format!("unsupported EC curve `{crv}`")));
                }
                Self::es256_from_components(
                    member(jwk, jwk.x.as_ref(), "x")?,
                    member(jwk, jwk.y.as_ref(), "y")?,
                )
            }
            Algorithm::Rs256 => {
                let private_members = jwk.rsa_private_member_count();
                if private_members != 0 && private_members != RSA_PRIVATE_MEMBERS {
                    return Err(AuthzError::Jwks(format!(
                        "RSA key has {private_members} of {RSA_PRIVATE_MEMBERS} private members"
                    )));
                }
                Self::rs256_from_components(
                    member(jwk, jwk.n.as_ref(), "n")?,
                    member(jwk, jwk.e.as_ref(), "e")?,
                )
            }
        }
    }

    /// The only algorithm this key verifies
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Public JWK for this key, or `None` if it was loaded from PEM
    pub fn public_jwk(&self, kid: &str) -> Option<Jwk> {
        match self.components.as_ref()? {
            PublicComponents::Ec { x, y } => Some(Jwk::es256(kid, x.as_str(), y.as_str())),
            PublicComponents::Rsa { n, e } => Some(Jwk::rs256(kid, n.as_str(), e.as_str())),
        }
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

/// Shared registry of verification keys by key id
///
/// # Example
///
/// ```rust
/// use tenant_authz::{KeyLookup, KeyRegistry, SigningKey};
///
/// let signing = SigningKey::generate_es256("K1")?;
/// let registry = KeyRegistry::new();
/// registry.insert("K1", signing.verification_key().clone());
///
/// assert!(registry.lookup_key("K1").is_some());
/// assert!(registry.lookup_key("K2").is_none());
/// # Ok::<(), tenant_authz::AuthzError>(())
/// ```
#[derive(Debug, Default)]
pub struct KeyRegistry {
    keys: RwLock<HashMap<String, Arc<VerificationKey>>>,
}

impl KeyRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key` under `key_id`, returning the key it replaced
    pub fn insert(
        &self,
        key_id: impl Into<String>,
        key: VerificationKey,
    ) -> Option<Arc<VerificationKey>> {
        let key_id = key_id.into();
        debug!(key_id = %key_id, algorithm = %key.algorithm(), "Registering verification key");
        self.keys.write().insert(key_id, Arc::new(key))
    }

    /// Remove the key registered under `key_id`
    pub fn remove(&self, key_id: &str) -> Option<Arc<VerificationKey>> {
        self.keys.write().remove(key_id)
    }

    /// The key registered under `key_id`
    pub fn get(&self, key_id: &str) -> Option<Arc<VerificationKey>> {
        self.keys.read().get(key_id).cloned()
    }

    /// Drop every key
    pub fn clear(&self) {
        self.keys.write().clear();
    }

    /// Number of registered keys
    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    /// Whether no keys are registered
    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }

    /// Registered key ids, sorted
    pub fn key_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.keys.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Register every key of a JWKS document, returning how many were loaded
    ///
    /// The document is validated as a whole before any key is registered.
    /// Keys already present under the same id are replaced; other keys stay.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::Jwks`] if the document is not a key set or a key
    /// lacks a `kid`, and the errors of [`VerificationKey::from_jwk`].
    pub fn load_jwks(&self, json: &str) -> Result<usize> {
        let parsed = parse_jwks(json)?;
        let count = parsed.len();
        self.keys.write().extend(parsed);
        info!(keys = count, "Loaded verification keys from JWKS");
        Ok(count)
    }

    /// [`load_jwks`](Self::load_jwks) from a file
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::Io`] if the file cannot be read, otherwise the
    /// errors of [`load_jwks`](Self::load_jwks).
    pub fn load_jwks_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let json = std::fs::read_to_string(path)?;
        self.load_jwks(&json)
    }

    /// Make a JWKS document the complete key set, returning its size
    ///
    /// Keys absent from the document are dropped, so tokens signed by them
    /// stop being admitted. The swap happens under one write lock and only
    /// after the whole document validated; on error the current set is kept.
    /// An empty key set clears the registry.
    ///
    /// # Errors
    ///
    /// The errors of [`load_jwks`](Self::load_jwks).
    pub fn replace_jwks(&self, json: &str) -> Result<usize> {
        let parsed: HashMap<_, _> = parse_jwks(json)?.into_iter().collect();
        let count = parsed.len();
        let retired = {
            let mut keys = self.keys.write();
            let retired = keys.keys().filter(|id| !parsed.contains_key(*id)).count();
            *keys = parsed;
            retired
        };
        info!(keys = count, retired, "Replaced verification key set from JWKS");
        Ok(count)
    }

    /// [`replace_jwks`](Self::replace_jwks) from a file
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::Io`] if the file cannot be read, otherwise the
    /// errors of [`replace_jwks`](Self::replace_jwks).
    pub fn replace_jwks_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let json = std::fs::read_to_string(path)?;
        self.replace_jwks(&json)
    }

    /// Export every exportable key as a JWKS document, sorted by key id
    pub fn to_jwks(&self) -> JwkSet {
        let mut keys: Vec<Jwk> = self
            .keys
            .read()
            .iter()
            .filter_map(|(kid, key)| key.public_jwk(kid))
            .collect();
        keys.sort_by(|a, b| a.kid.cmp(&b.kid));
        JwkSet { keys }
    }
}

fn parse_jwks(json: &str) -> Result<Vec<(String, Arc<VerificationKey>)>> {
    let set: JwkSet = serde_json::from_str(json).map_err(|e| AuthzError::Jwks(e.to_string()))?;
    set.keys
        .iter()
        .map(|jwk| {
            let kid = jwk
                .kid
                .clone()
                .ok_or_else(|| AuthzError::Jwks("every key needs a `kid`".to_string()))?;
            Ok((kid, Arc::new(VerificationKey::from_jwk(jwk)?)))
        })
        .collect()
}

impl KeyLookup for KeyRegistry {
    fn lookup_key(&self, key_id: &str) -> Option<Arc<VerificationKey>> {
        self.get(key_id)
    }
}
