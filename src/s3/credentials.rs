//! S3 Credentials Module
//!
//! Resolves the static access/secret key pair used to sign requests.
//!
//! Sources, in order of precedence:
//! - `storage.access_key` / `storage.secret_key` from the configuration file
//! - `ACCESS_KEY` / `SECRET_KEY` environment variables
//!
//! Empty values are treated exactly like missing ones; a missing key is a
//! startup failure.
//!
//! # Example
//!
//! ```
//! use quota_uploadr::s3::Credentials;
//!
//! let creds = Credentials::new("access-key", "secret-key");
//! assert_eq!(creds.access_key_id(), "access-key");
//! assert_eq!(creds.secret_access_key(), "secret-key");
//! ```

use crate::config::StorageConfig;
use thiserror::Error;

/// Environment variable holding the access key
pub const ACCESS_KEY_ENV: &str = "ACCESS_KEY";

/// Environment variable holding the secret key
pub const SECRET_KEY_ENV: &str = "SECRET_KEY";

/// Credential loading errors
#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),
}

/// Static credentials for an S3-compatible endpoint
#[derive(Clone)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
}

impl Credentials {
    /// Create new credentials
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }

    /// Get the access key ID
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Get the secret access key
    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Factory methods for resolving credentials
pub struct CredentialsProvider;

impl CredentialsProvider {
    /// Load credentials from `ACCESS_KEY` and `SECRET_KEY`
    pub fn from_env() -> Result<Credentials, CredentialsError> {
        let access_key = non_empty(std::env::var(ACCESS_KEY_ENV).ok());
        let secret_key = non_empty(std::env::var(SECRET_KEY_ENV).ok());

        match (access_key, secret_key) {
            (Some(access), Some(secret)) => Ok(Credentials::new(access, secret)),
            _ => Err(CredentialsError::MissingCredentials(format!(
                "missing {} or {} environment variables",
                ACCESS_KEY_ENV, SECRET_KEY_ENV
            ))),
        }
    }

    /// Load credentials from the `storage` configuration section
    pub fn from_config(config: &StorageConfig) -> Result<Credentials, CredentialsError> {
        let access_key = non_empty(config.access_key.clone()).ok_or_else(|| {
            CredentialsError::MissingCredentials("access_key not set in config".into())
        })?;

        let secret_key = non_empty(config.secret_key.clone()).ok_or_else(|| {
            CredentialsError::MissingCredentials("secret_key not set in config".into())
        })?;

        Ok(Credentials::new(access_key, secret_key))
    }

    /// Prefer configured keys, fall back to the environment
    pub fn resolve(config: &StorageConfig) -> Result<Credentials, CredentialsError> {
        Self::from_config(config).or_else(|_| Self::from_env())
    }
}

/// Unexpanded `${VAR}` placeholders count as missing too.
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.starts_with("${"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_creation() {
        let creds = Credentials::new("access", "secret");
        assert_eq!(creds.access_key_id(), "access");
        assert_eq!(creds.secret_access_key(), "secret");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let creds = Credentials::new("access", "very-secret");
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("access"));
        assert!(!rendered.contains("very-secret"));
    }

    #[test]
    fn test_from_config_missing_access_key() {
        let config = StorageConfig {
            access_key: None,
            secret_key: Some("secret".into()),
            ..StorageConfig::default()
        };

        assert!(CredentialsProvider::from_config(&config).is_err());
    }

    #[test]
    fn test_from_config_empty_secret_key() {
        let config = StorageConfig {
            access_key: Some("access".into()),
            secret_key: Some("   ".into()),
            ..StorageConfig::default()
        };

        assert!(CredentialsProvider::from_config(&config).is_err());
    }

    #[test]
    fn test_from_config_unexpanded_placeholder() {
        let config = StorageConfig {
            access_key: Some("${ACCESS_KEY}".into()),
            secret_key: Some("secret".into()),
            ..StorageConfig::default()
        };

        assert!(CredentialsProvider::from_config(&config).is_err());
    }

    #[test]
    fn test_from_config_success() {
        let config = StorageConfig {
            access_key: Some("config-access".into()),
            secret_key: Some("config-secret".into()),
            ..StorageConfig::default()
        };

        let creds = CredentialsProvider::from_config(&config).unwrap();
        assert_eq!(creds.access_key_id(), "config-access");
        assert_eq!(creds.secret_access_key(), "config-secret");
    }
}
