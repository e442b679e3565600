//! JSON Web Key (RFC 7517) documents for public verification keys

use serde::{Deserialize, Serialize};

/// A single JSON Web Key
///
/// The public members of ES256 (`crv`, `x`, `y`) and RS256 (`n`, `e`) keys
/// are modelled, plus the RSA private members so that incomplete private
/// keys can be refused. Unknown members are ignored on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type: `EC` or `RSA`
    pub kty: String,
    /// Key ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// Intended use, normally `sig`
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    /// Algorithm hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// EC curve
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    /// EC x coordinate (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    /// EC y coordinate (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    /// RSA modulus (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// RSA exponent (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    /// Private exponent (EC or RSA)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    /// RSA first prime factor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
    /// RSA second prime factor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    /// RSA first factor CRT exponent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dp: Option<String>,
    /// RSA second factor CRT exponent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dq: Option<String>,
    /// RSA first CRT coefficient
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qi: Option<String>,
}

impl Jwk {
    /// ES256 verification key from base64url P-256 coordinates
    pub fn es256(kid: impl Into<String>, x: impl Into<String>, y: impl Into<String>) -> Self {
        Self {
            kid: Some(kid.into()),
            key_use: Some("sig".to_string()),
            alg: Some("ES256".to_string()),
            crv: Some("P-256".to_string()),
            x: Some(x.into()),
            y: Some(y.into()),
            ..Self::bare("EC")
        }
    }

    /// RS256 verification key from base64url modulus and exponent
    pub fn rs256(kid: impl Into<String>, n: impl Into<String>, e: impl Into<String>) -> Self {
        Self {
            kid: Some(kid.into()),
            key_use: Some("sig".to_string()),
            alg: Some("RS256".to_string()),
            n: Some(n.into()),
            e: Some(e.into()),
            ..Self::bare("RSA")
        }
    }

    fn bare(kty: &str) -> Self {
        Self {
            kty: kty.to_string(),
            kid: None,
            key_use: None,
            alg: None,
            crv: None,
            x: None,
            y: None,
            n: None,
            e: None,
            d: None,
            p: None,
            q: None,
            dp: None,
            dq: None,
            qi: None,
        }
    }

    /// How many of the six RSA private members (`d`, `p`, `q`, `dp`, `dq`,
    /// `qi`) are present
    pub fn rsa_private_member_count(&self) -> usize {
        [&self.d, &self.p, &self.q, &self.dp, &self.dq, &self.qi]
            .into_iter()
            .filter(|member| member.is_some())
            .count()
    }
}

/// JSON Web Key Set document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    /// Keys in document order
    #[serde(default)]
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    /// Find a key by `kid`
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }

    /// Add `jwk`, replacing any key with the same `kid`
    pub fn upsert(&mut self, jwk: Jwk) {
        match self.keys.iter_mut().find(|k| k.kid.is_some() && k.kid == jwk.kid) {
            Some(existing) => *existing = jwk,
            None => self.keys.push(jwk),
        }
    }
}
