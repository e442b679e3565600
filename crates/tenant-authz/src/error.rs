//! Error types for the non-decision APIs
//!
//! Token validation itself never fails with an error: every rejection is
//! reported through a [`RejectionReporter`](crate::RejectionReporter) and
//! resolved to `false`. The errors here cover construction, configuration,
//! key material and token signing.

use std::path::PathBuf;

use thiserror::Error;

use crate::claims::Algorithm;

/// Errors raised while building caches, loading keys or minting tokens
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Configuration values are out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Config file not found
    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    /// Unsupported config file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedConfigFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    Config(#[from] config::ConfigError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Key material could not be decoded or is not usable for the algorithm
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// JSON Web Key Set document is malformed
    #[error("Invalid JWKS document: {0}")]
    Jwks(String),

    /// The claims name a different algorithm than the signing key
    #[error("Claims request {claims} but the signing key is {key}")]
    AlgorithmMismatch {
        /// Algorithm named in the claims
        claims: Algorithm,
        /// Algorithm of the signing key
        key: Algorithm,
    },

    /// JWT encoding failed
    #[error("Token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    /// Cache construction failed
    #[error(transparent)]
    Cache(#[from] tenant_authz_lru::CacheError),

    /// A process-wide token cache was already installed
    #[error("The process-wide token cache is already initialized")]
    AlreadyInitialized,
}

/// Result alias for this crate
pub type Result<T> = std::result::Result<T, AuthzError>;
