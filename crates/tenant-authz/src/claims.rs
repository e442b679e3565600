//! Token claims and the compact-form parser
//!
//! A token is three base64url (unpadded) segments joined by `.`: a JSON
//! header, a JSON payload and the signature. The parser checks structure and
//! claim types only; time validity, key resolution and the signature are the
//! token cache's business.
//!
//! Header fields (all required):
//!
//! - `typ` - must be `"JWT"`
//! - `alg` - `"ES256"` or `"RS256"`
//! - `kid` - name of the verification key
//!
//! Payload fields (all optional, wrong types are rejected):
//!
//! | Claim | Type | Field |
//! |---|---|---|
//! | `iss`, `sub`, `jti` | string | `issuer`, `subject`, `token_id` |
//! | `aud`, `tenants` | array of strings | `audience`, `tenants` |
//! | `iat`, `exp`, `nbf` | non-negative number, seconds | `issued_at`, `expires_at`, `not_before` |

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Signature algorithms accepted in token headers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    /// ECDSA over P-256 with SHA-256
    #[serde(rename = "ES256")]
    Es256,
    /// RSASSA-PKCS1-v1_5 with SHA-256
    #[serde(rename = "RS256")]
    Rs256,
}

impl Algorithm {
    /// Header spelling of the algorithm
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Es256 => "ES256",
            Self::Rs256 => "RS256",
        }
    }

    pub(crate) fn to_jwt(self) -> jsonwebtoken::Algorithm {
        match self {
            Self::Es256 => jsonwebtoken::Algorithm::ES256,
            Self::Rs256 => jsonwebtoken::Algorithm::RS256,
        }
    }

    pub(crate) fn from_jwt(alg: jsonwebtoken::Algorithm) -> Option<Self> {
        match alg {
            jsonwebtoken::Algorithm::ES256 => Some(Self::Es256),
            jsonwebtoken::Algorithm::RS256 => Some(Self::Rs256),
            _ => None,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ES256" => Ok(Self::Es256),
            "RS256" => Ok(Self::Rs256),
            other => Err(ParseError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// Decoded header and payload claims of a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// Signature algorithm from the header
    pub algorithm: Algorithm,
    /// Verification key name from the header
    pub key_id: String,
    /// `iss`
    pub issuer: Option<String>,
    /// `sub`
    pub subject: Option<String>,
    /// `aud`
    pub audience: Option<Vec<String>>,
    /// `iat`, unix seconds
    pub issued_at: Option<u64>,
    /// `exp`, unix seconds
    pub expires_at: Option<u64>,
    /// `nbf`, unix seconds
    pub not_before: Option<u64>,
    /// `jti`
    pub token_id: Option<String>,
    /// Tenants the bearer may act on
    pub tenants: Option<Vec<String>>,
}

impl TokenClaims {
    /// Claims with only the header fields set
    pub fn new(algorithm: Algorithm, key_id: impl Into<String>) -> Self {
        Self {
            algorithm,
            key_id: key_id.into(),
            issuer: None,
            subject: None,
            audience: None,
            issued_at: None,
            expires_at: None,
            not_before: None,
            token_id: None,
            tenants: None,
        }
    }
}

/// One-line diagnostic summary, absent fields omitted:
///
/// `alg=ES256 kid=k1 iss=issuer aud=[a,b] iat=1 exp=2 nbf=1 tenants=[t1,t2]`
impl fmt::Display for TokenClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, name: &str, items: &[String]) -> fmt::Result {
            write!(f, " {name}=[{}]", items.join(","))
        }

        write!(f, "alg={} kid={}", self.algorithm, self.key_id)?;
        if let Some(iss) = &self.issuer {
            write!(f, " iss={iss}")?;
        }
        if let Some(sub) = &self.subject {
            write!(f, " sub={sub}")?;
        }
        if let Some(aud) = &self.audience {
            list(f, "aud", aud)?;
        }
        if let Some(iat) = self.issued_at {
            write!(f, " iat={iat}")?;
        }
        if let Some(exp) = self.expires_at {
            write!(f, " exp={exp}")?;
        }
        if let Some(nbf) = self.not_before {
            write!(f, " nbf={nbf}")?;
        }
        if let Some(jti) = &self.token_id {
            write!(f, " jti={jti}")?;
        }
        if let Some(tenants) = &self.tenants {
            list(f, "tenants", tenants)?;
        }
        Ok(())
    }
}

/// A structurally valid token: its claims plus the decoded signature bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedToken {
    /// Header and payload claims
    pub claims: TokenClaims,
    /// Raw signature bytes (base64url-decoded third segment)
    pub signature: Vec<u8>,
}

/// Why a token could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Token bytes are not UTF-8
    #[error("token is not valid UTF-8")]
    NotUtf8,

    /// Not exactly three `.`-separated segments
    #[error("token must have exactly three '.'-separated segments")]
    SegmentCount,

    /// One of the segments is empty
    #[error("token {0} segment is empty")]
    EmptySegment(&'static str),

    /// A segment is not unpadded base64url
    #[error("token {0} segment is not valid base64url")]
    Base64(&'static str),

    /// A segment is not JSON
    #[error("token {segment} is not valid JSON: {message}")]
    Json {
        /// `header` or `payload`
        segment: &'static str,
        /// Decoder message
        message: String,
    },

    /// A segment is JSON but not an object
    #[error("token {0} must be a JSON object")]
    NotAnObject(&'static str),

    /// A required header field is absent
    #[error("header field `{0}` is missing")]
    MissingField(&'static str),

    /// A field has the wrong JSON type
    #[error("field `{field}` must be {expected}")]
    WrongType {
        /// Claim name
        field: &'static str,
        /// Expected JSON type
        expected: &'static str,
    },

    /// `typ` is not `JWT`
    #[error("unsupported token type `{0}`")]
    UnsupportedType(String),

    /// `alg` is not ES256 or RS256
    #[error("unsupported algorithm `{0}`")]
    UnsupportedAlgorithm(String),

    /// A time claim is negative or not finite
    #[error("time claim `{0}` must be a non-negative number")]
    InvalidTimestamp(&'static str),
}

/// Parse the compact form of a token
///
/// # Errors
///
/// Returns a [`ParseError`] describing the first structural or type problem
/// found. Nothing is verified cryptographically.
pub fn parse_token(token: &[u8]) -> Result<ParsedToken, ParseError> {
    let text = std::str::from_utf8(token).map_err(|_| ParseError::NotUtf8)?;

    let mut segments = text.split('.');
    let (Some(header), Some(payload), Some(signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(ParseError::SegmentCount);
    };

    let header = decode_object(header, "header")?;
    let payload = decode_object(payload, "payload")?;
    let signature = decode_segment(signature, "signature")?;

    match required_string(&header, "typ")? {
        "JWT" => {}
        other => return Err(ParseError::UnsupportedType(other.to_string())),
    }
    let algorithm = required_string(&header, "alg")?.parse()?;
    let key_id = required_string(&header, "kid")?.to_string();

    let claims = TokenClaims {
        algorithm,
        key_id,
        issuer: optional_string(&payload, "iss")?,
        subject: optional_string(&payload, "sub")?,
        audience: optional_string_array(&payload, "aud")?,
        issued_at: optional_timestamp(&payload, "iat")?,
        expires_at: optional_timestamp(&payload, "exp")?,
        not_before: optional_timestamp(&payload, "nbf")?,
        token_id: optional_string(&payload, "jti")?,
        tenants: optional_string_array(&payload, "tenants")?,
    };

    Ok(ParsedToken { claims, signature })
}

fn decode_segment(segment: &str, name: &'static str) -> Result<Vec<u8>, ParseError> {
    if segment.is_empty() {
        return Err(ParseError::EmptySegment(name));
    }
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| ParseError::Base64(name))
}

fn decode_object(segment: &str, name: &'static str) -> Result<Map<String, Value>, ParseError> {
    let bytes = decode_segment(segment, name)?;
    match serde_json::from_slice(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ParseError::NotAnObject(name)),
        Err(e) => Err(ParseError::Json {
            segment: name,
            message: e.to_string(),
        }),
    }
}

fn required_string<'a>(
    map: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, ParseError> {
    match map.get(field) {
        None | Some(Value::Null) => Err(ParseError::MissingField(field)),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(ParseError::WrongType {
            field,
            expected: "a string",
        }),
    }
}

fn optional_string(
    map: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, ParseError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ParseError::WrongType {
            field,
            expected: "a string",
        }),
    }
}

fn optional_string_array(
    map: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<Vec<String>>, ParseError> {
    let wrong_type = ParseError::WrongType {
        field,
        expected: "an array of strings",
    };
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .map(Some)
            .ok_or(wrong_type),
        Some(_) => Err(wrong_type),
    }
}

fn optional_timestamp(
    map: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<u64>, ParseError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            if let Some(secs) = n.as_u64() {
                return Ok(Some(secs));
            }
            // Fractional seconds truncate toward zero
            match n.as_f64() {
                Some(secs) if secs.is_finite() && secs >= 0.0 => Ok(Some(secs as u64)),
                _ => Err(ParseError::InvalidTimestamp(field)),
            }
        }
        Some(_) => Err(ParseError::WrongType {
            field,
            expected: "a number",
        }),
    }
}
