//! Token signing and signature verification
//!
//! Tokens are minted and verified with `jsonwebtoken`. ES256 key pairs are
//! generated with `ring` and handled as PKCS#8 through `p256`, so they can be
//! written out and loaded again; RS256 keys are accepted as PEM only.
//!
//! [`verify_token`] checks the signature and nothing else. Time claims and
//! tenant membership are evaluated by the token cache, so every registered
//! claim check in `jsonwebtoken` is switched off here.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{EncodingKey, Header, Validation, decode, decode_header, encode};
use p256::SecretKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use ring::rand::SystemRandom;
use ring::signature::{ECDSA_P256_SHA256_FIXED_SIGNING, EcdsaKeyPair};
use serde::Serialize;
use serde::de::IgnoredAny;
use tracing::{debug, warn};

use crate::claims::{Algorithm, TokenClaims};
use crate::error::{AuthzError, Result};
use crate::jwks::Jwk;
use crate::keys::VerificationKey;

/// A private key together with its matching verification key
pub struct SigningKey {
    key_id: String,
    algorithm: Algorithm,
    encoding: EncodingKey,
    verification: VerificationKey,
    ec_secret: Option<SecretKey>,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl SigningKey {
    /// Generate a fresh ES256 (P-256) key pair
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::InvalidKey`] if the system RNG fails.
    pub fn generate_es256(key_id: impl Into<String>) -> Result<Self> {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
            .map_err(|e| AuthzError::InvalidKey(format!("Failed to generate ES256 key: {e}")))?;
        Self::from_es256_pkcs8_der(key_id, pkcs8.as_ref())
    }

    /// Load an ES256 key from a PKCS#8 DER document
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::InvalidKey`] if the document is not a P-256
    /// private key.
    pub fn from_es256_pkcs8_der(key_id: impl Into<String>, der: &[u8]) -> Result<Self> {
        let secret = SecretKey::from_pkcs8_der(der)
            .map_err(|e| AuthzError::InvalidKey(format!("Not a P-256 PKCS#8 key: {e}")))?;
        Self::from_es256_secret(key_id.into(), secret)
    }

    /// Load an ES256 key from a PEM `PRIVATE KEY` (PKCS#8) block
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::InvalidKey`] if the PEM block is missing or its
    /// contents are not a P-256 PKCS#8 key.
    pub fn from_es256_pkcs8_pem(key_id: impl Into<String>, pem: &str) -> Result<Self> {
        let secret = SecretKey::from_pkcs8_pem(pem)
            .map_err(|e| AuthzError::InvalidKey(format!("Not a P-256 PKCS#8 PEM key: {e}")))?;
        Self::from_es256_secret(key_id.into(), secret)
    }

    fn from_es256_secret(key_id: String, secret: SecretKey) -> Result<Self> {
        let der = secret
            .to_pkcs8_der()
            .map_err(|e| AuthzError::InvalidKey(format!("Failed to encode EC key as PKCS#8: {e}")))?;

        let point = secret.public_key().to_encoded_point(false);
        let (Some(x), Some(y)) = (point.x(), point.y()) else {
            return Err(AuthzError::InvalidKey(
                "P-256 public key has no affine coordinates".to_string(),
            ));
        };
        let verification = VerificationKey::es256_from_components(
            &URL_SAFE_NO_PAD.encode(x),
            &URL_SAFE_NO_PAD.encode(y),
        )?;

        Ok(Self {
            key_id,
            algorithm: Algorithm::Es256,
            encoding: EncodingKey::from_ec_der(der.as_bytes()),
            verification,
            ec_secret: Some(secret),
        })
    }

    /// Load an RS256 key pair from PEM documents
    ///
    /// The pair is checked by signing and verifying a throwaway token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::InvalidKey`] if either document is not an RSA key
    /// or the two keys do not belong together.
    pub fn from_rsa_pem(
        key_id: impl Into<String>,
        private_pem: &[u8],
        public_pem: &[u8],
    ) -> Result<Self> {
        let encoding = EncodingKey::from_rsa_pem(private_pem)
            .map_err(|e| AuthzError::InvalidKey(format!("Failed to read RSA private key: {e}")))?;
        let verification = VerificationKey::from_pem(Algorithm::Rs256, public_pem)?;
        let key = Self {
            key_id: key_id.into(),
            algorithm: Algorithm::Rs256,
            encoding,
            verification,
            ec_secret: None,
        };

        let check = sign_token(&TokenClaims::new(Algorithm::Rs256, key.key_id.as_str()), &key)?;
        if !verify_token(&check, &key.verification) {
            return Err(AuthzError::InvalidKey(
                "RSA private and public keys do not match".to_string(),
            ));
        }
        Ok(key)
    }

    /// Key id this key is published under
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Algorithm this key signs with
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Matching public key
    pub fn verification_key(&self) -> &VerificationKey {
        &self.verification
    }

    /// Public JWK published under this key's id, if exportable
    pub fn public_jwk(&self) -> Option<Jwk> {
        self.verification.public_jwk(&self.key_id)
    }

    /// PEM `PRIVATE KEY` (PKCS#8) document of an ES256 key
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::InvalidKey`] for RS256 keys, which are only
    /// held in `jsonwebtoken`'s encoding form, or if encoding fails.
    pub fn to_pkcs8_pem(&self) -> Result<String> {
        let secret = self.ec_secret.as_ref().ok_or_else(|| {
            AuthzError::InvalidKey(format!("{} keys cannot be exported", self.algorithm))
        })?;
        let pem = secret
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| AuthzError::InvalidKey(format!("Failed to encode EC key as PEM: {e}")))?;
        Ok(pem.to_string())
    }
}

#[derive(Serialize)]
struct Payload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    iss: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    aud: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    iat: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exp: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nbf: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    jti: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tenants: Option<&'a [String]>,
}

impl<'a> From<&'a TokenClaims> for Payload<'a> {
    fn from(claims: &'a TokenClaims) -> Self {
        Self {
            iss: claims.issuer.as_deref(),
            sub: claims.subject.as_deref(),
            aud: claims.audience.as_deref(),
            iat: claims.issued_at,
            exp: claims.expires_at,
            nbf: claims.not_before,
            jti: claims.token_id.as_deref(),
            tenants: claims.tenants.as_deref(),
        }
    }
}

/// Sign `claims` into a compact token
///
/// The header carries `typ: "JWT"`, the claims' algorithm and key id. Absent
/// optional claims are left out of the payload.
///
/// # Errors
///
/// Returns [`AuthzError::AlgorithmMismatch`] if the claims name a different
/// algorithm than `key`, or [`AuthzError::Signing`] if encoding fails.
pub fn sign_token(claims: &TokenClaims, key: &SigningKey) -> Result<String> {
    if claims.algorithm != key.algorithm {
        return Err(AuthzError::AlgorithmMismatch {
            claims: claims.algorithm,
            key: key.algorithm,
        });
    }

    let mut header = Header::new(claims.algorithm.to_jwt());
    header.typ = Some("JWT".to_string());
    header.kid = Some(claims.key_id.clone());

    Ok(encode(&header, &Payload::from(claims), &key.encoding)?)
}

/// Check the signature of `token` against `key`
///
/// Fails if the header algorithm differs from the key's algorithm.
pub fn verify_token(token: &str, key: &VerificationKey) -> bool {
    let header = match decode_header(token) {
        Ok(header) => header,
        Err(e) => {
            debug!(error = %e, "Token header could not be decoded");
            return false;
        }
    };

    if Algorithm::from_jwt(header.alg) != Some(key.algorithm()) {
        warn!(
            token_algorithm = ?header.alg,
            key_algorithm = %key.algorithm(),
            "Token algorithm does not match verification key"
        );
        return false;
    }

    let mut validation = Validation::new(key.algorithm().to_jwt());
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    match decode::<IgnoredAny>(token, key.decoding_key(), &validation) {
        Ok(_) => true,
        Err(e) => {
            debug!(error = %e, "Token signature verification failed");
            false
        }
    }
}
