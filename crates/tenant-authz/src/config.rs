//! Token cache configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AuthzError, Result};

/// Default number of validated tokens kept in memory
pub const DEFAULT_CAPACITY: usize = 100;

/// Environment prefix for overrides, e.g. `TENANT_AUTHZ_CAPACITY=500`
pub const ENV_PREFIX: &str = "TENANT_AUTHZ";

/// Token cache configuration
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenCacheConfig {
    /// Maximum number of validated tokens kept in the cache
    pub capacity: usize,
    /// Authorize tenant requests that carry no token
    pub allow_tokenless_tenant_access: bool,
}

impl Default for TokenCacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            allow_tokenless_tenant_access: false,
        }
    }
}

impl TokenCacheConfig {
    /// Load configuration from a file (TOML, YAML, or JSON)
    ///
    /// The file format is auto-detected from the file extension:
    /// - `.toml` → TOML format
    /// - `.yaml` or `.yml` → YAML format
    /// - `.json` → JSON format
    ///
    /// Environment variables with the `TENANT_AUTHZ_` prefix override file
    /// settings. For example, `TENANT_AUTHZ_CAPACITY=500` overrides `capacity`.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use tenant_authz::TokenCacheConfig;
    ///
    /// let config = TokenCacheConfig::from_file("authz.toml").expect("Failed to load config");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file doesn't exist
    /// - The file format is unsupported
    /// - The file contains invalid configuration
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_file_with_prefix(path, ENV_PREFIX)
    }

    /// Load configuration from a file with a custom environment prefix
    ///
    /// # Errors
    ///
    /// Same as [`from_file`](Self::from_file).
    pub fn from_file_with_prefix(path: impl AsRef<Path>, env_prefix: &str) -> Result<Self> {
        use config::{Config, Environment, File, FileFormat};

        let path = path.as_ref();

        if !path.exists() {
            return Err(AuthzError::ConfigNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml" | "yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(AuthzError::UnsupportedConfigFormat),
        };

        let config = Config::builder()
            .add_source(File::new(
                path.to_str().ok_or(AuthzError::UnsupportedConfigFormat)?,
                format,
            ))
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: Self = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::InvalidConfig`] if `capacity` is 0.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(AuthzError::InvalidConfig(
                "capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(extension: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(&format!(".{extension}"))
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    // Unique prefixes keep these tests independent of the real environment
    fn load(file: &tempfile::NamedTempFile, prefix: &str) -> Result<TokenCacheConfig> {
        TokenCacheConfig::from_file_with_prefix(file.path(), prefix)
    }

    #[test]
    fn test_defaults() {
        let config = TokenCacheConfig::default();
        assert_eq!(config.capacity, 100);
        assert!(!config.allow_tokenless_tenant_access);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_file() {
        let file = write_config("toml", "capacity = 250\nallow_tokenless_tenant_access = true\n");
        let config = load(&file, "TENANT_AUTHZ_TEST_TOML").unwrap();
        assert_eq!(config.capacity, 250);
        assert!(config.allow_tokenless_tenant_access);
    }

    #[test]
    fn test_json_file_with_missing_fields_uses_defaults() {
        let file = write_config("json", "{}");
        let config = load(&file, "TENANT_AUTHZ_TEST_JSON").unwrap();
        assert_eq!(config, TokenCacheConfig::default());
    }

    #[test]
    fn test_yaml_file() {
        let file = write_config("yaml", "capacity: 7\n");
        assert_eq!(load(&file, "TENANT_AUTHZ_TEST_YAML").unwrap().capacity, 7);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let file = write_config("toml", "capacity = 0\n");
        assert!(matches!(
            load(&file, "TENANT_AUTHZ_TEST_ZERO"),
            Err(AuthzError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            TokenCacheConfig::from_file("/definitely/not/here.toml"),
            Err(AuthzError::ConfigNotFound(_))
        ));
    }

    #[test]
    fn test_unsupported_extension() {
        let file = write_config("ini", "capacity = 3\n");
        assert!(matches!(
            load(&file, "TENANT_AUTHZ_TEST_INI"),
            Err(AuthzError::UnsupportedConfigFormat)
        ));
    }

    #[test]
    fn test_wrong_type_is_config_error() {
        let file = write_config("toml", "capacity = \"lots\"\n");
        assert!(matches!(
            load(&file, "TENANT_AUTHZ_TEST_TYPE"),
            Err(AuthzError::Config(_))
        ));
    }
}
