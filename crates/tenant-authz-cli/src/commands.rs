//! Subcommand definitions and their implementations

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, bail};
use clap::Subcommand;
use tenant_authz::{
    Algorithm, JwkSet, KeyRegistry, RecordingReporter, SigningKey, TokenCache, TokenCacheConfig,
    TokenClaims, parse_token, sign_token,
};
use tracing::info;

use crate::Outcome;

/// Available subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate an ES256 key pair and publish its public half
    Keygen {
        /// Key id the public key is published under
        #[arg(long)]
        kid: String,

        /// Where to write the PKCS#8 PEM private key
        #[arg(long, value_name = "PATH")]
        private_key: PathBuf,

        /// JWKS file to add the public key to, created if absent
        #[arg(long, value_name = "PATH")]
        jwks: Option<PathBuf>,

        /// Overwrite an existing private key file
        #[arg(long)]
        force: bool,
    },

    /// Mint a token for one or more tenants
    Sign {
        /// PEM private key
        #[arg(long, value_name = "PATH")]
        private_key: PathBuf,

        /// PEM public key, required for RS256
        #[arg(long, value_name = "PATH")]
        public_key: Option<PathBuf>,

        /// Signature algorithm
        #[arg(long, default_value = "ES256")]
        algorithm: Algorithm,

        /// Key id placed in the token header
        #[arg(long)]
        kid: String,

        /// Tenant the token grants (repeatable)
        #[arg(long = "tenant", required = true)]
        tenants: Vec<String>,

        /// Lifetime in seconds
        #[arg(long, default_value_t = 3600)]
        ttl: u64,

        /// `iss` claim
        #[arg(long)]
        issuer: Option<String>,

        /// `sub` claim
        #[arg(long)]
        subject: Option<String>,

        /// `aud` claim (repeatable)
        #[arg(long)]
        audience: Vec<String>,
    },

    /// Print the claims of a token without verifying it
    Inspect {
        /// Compact token
        token: String,
    },

    /// Decide whether a token grants a tenant
    Check {
        /// JWKS file with the verification keys
        #[arg(long, value_name = "PATH")]
        jwks: PathBuf,

        /// Tenant the token is presented for
        #[arg(long)]
        tenant: String,

        /// Cache configuration file (TOML, YAML or JSON)
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Compact token
        token: String,
    },
}

impl Command {
    /// Run the subcommand
    ///
    /// # Errors
    ///
    /// Returns an error when an input file or key cannot be used.
    pub fn execute(self, out: &mut impl Write) -> anyhow::Result<Outcome> {
        match self {
            Self::Keygen {
                kid,
                private_key,
                jwks,
                force,
            } => keygen(out, &kid, &private_key, jwks.as_deref(), force),
            Self::Sign {
                private_key,
                public_key,
                algorithm,
                kid,
                tenants,
                ttl,
                issuer,
                subject,
                audience,
            } => {
                let key = load_signing_key(algorithm, &kid, &private_key, public_key.as_deref())?;
                let now = unix_now()?;
                let mut claims = TokenClaims::new(algorithm, kid);
                claims.issuer = issuer;
                claims.subject = subject;
                claims.audience = (!audience.is_empty()).then_some(audience);
                claims.issued_at = Some(now);
                claims.not_before = Some(now);
                claims.expires_at = Some(now.saturating_add(ttl));
                claims.tenants = Some(tenants);

                let token = sign_token(&claims, &key)?;
                info!(claims = %claims, "Signed token");
                writeln!(out, "{token}")?;
                Ok(Outcome::Success)
            }
            Self::Inspect { token } => match parse_token(token.as_bytes()) {
                Ok(parsed) => {
                    writeln!(out, "{}", parsed.claims)?;
                    Ok(Outcome::Success)
                }
                Err(e) => {
                    writeln!(out, "unparseable: {e}")?;
                    Ok(Outcome::Denied)
                }
            },
            Self::Check {
                jwks,
                tenant,
                config,
                token,
            } => check(out, &jwks, &tenant, config.as_deref(), &token),
        }
    }
}

fn keygen(
    out: &mut impl Write,
    kid: &str,
    private_key: &Path,
    jwks: Option<&Path>,
    force: bool,
) -> anyhow::Result<Outcome> {
    if private_key.exists() && !force {
        bail!(
            "{} already exists, pass --force to overwrite",
            private_key.display()
        );
    }

    let key = SigningKey::generate_es256(kid)?;
    let pem = key.to_pkcs8_pem()?;
    std::fs::write(private_key, pem)
        .with_context(|| format!("writing {}", private_key.display()))?;
    writeln!(out, "wrote private key {}", private_key.display())?;

    if let Some(path) = jwks {
        let mut set = if path.exists() {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str::<JwkSet>(&json)
                .with_context(|| format!("{} is not a JWKS document", path.display()))?
        } else {
            JwkSet::default()
        };
        set.upsert(key.public_jwk().context("generated key has no public JWK")?);
        std::fs::write(path, serde_json::to_string_pretty(&set)?)
            .with_context(|| format!("writing {}", path.display()))?;
        writeln!(out, "published {kid} in {}", path.display())?;
    }
    Ok(Outcome::Success)
}

fn load_signing_key(
    algorithm: Algorithm,
    kid: &str,
    private_key: &Path,
    public_key: Option<&Path>,
) -> anyhow::Result<SigningKey> {
    let private_pem = std::fs::read(private_key)
        .with_context(|| format!("reading {}", private_key.display()))?;
    let key = match algorithm {
        Algorithm::Es256 => {
            let pem = std::str::from_utf8(&private_pem).context("private key is not PEM text")?;
            SigningKey::from_es256_pkcs8_pem(kid, pem)?
        }
        Algorithm::Rs256 => {
            let public_key = public_key.context("RS256 signing needs --public-key")?;
            let public_pem = std::fs::read(public_key)
                .with_context(|| format!("reading {}", public_key.display()))?;
            SigningKey::from_rsa_pem(kid, &private_pem, &public_pem)?
        }
    };
    Ok(key)
}

fn check(
    out: &mut impl Write,
    jwks: &Path,
    tenant: &str,
    config: Option<&Path>,
    token: &str,
) -> anyhow::Result<Outcome> {
    let config = match config {
        Some(path) => TokenCacheConfig::from_file(path)?,
        None => TokenCacheConfig::default(),
    };

    let registry = KeyRegistry::new();
    registry
        .load_jwks_file(jwks)
        .with_context(|| format!("loading {}", jwks.display()))?;

    let reporter = Arc::new(RecordingReporter::new());
    let cache = TokenCache::builder(Arc::new(registry))
        .config(&config)
        .reporter(Arc::clone(&reporter))
        .build()?;

    if cache.validate(tenant.as_bytes(), token.as_bytes()) {
        writeln!(out, "authorized")?;
        return Ok(Outcome::Success);
    }

    match reporter.last() {
        Some(rejection) => writeln!(out, "denied ({})", rejection.reason)?,
        None => writeln!(out, "denied")?,
    }
    Ok(Outcome::Denied)
}

fn unix_now() -> anyhow::Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before the Unix epoch")?
        .as_secs())
}
