//! Intake configuration
//!
//! Non-secret settings load from TOML; secrets come only from the process
//! environment and are held as [`SecretString`].

use crate::credential::DEFAULT_TOKEN_TTL_SECS;
use crate::notify::DEFAULT_SENDGRID_ENDPOINT;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable holding the token signing secret
pub const SIGNING_SECRET_ENV: &str = "SESSION_JWT_SECRET";

/// Environment variable holding the SendGrid API key
pub const SENDGRID_API_KEY_ENV: &str = "SENDGRID_API_KEY";

/// Configuration loading failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path that failed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// File is not valid TOML for this schema
    #[error("invalid config {path}: {source}")]
    Parse {
        /// Path that failed
        path: PathBuf,
        /// Underlying error
        source: toml::de::Error,
    },
}

/// Where application records live
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreBackend {
    /// Process memory; lost on restart
    #[default]
    Memory,
    /// One JSON document per record under `dir`
    File {
        /// Record directory
        dir: PathBuf,
    },
}

/// Confirmation mail settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailSettings {
    /// Sender address
    pub from_email: String,
    /// Sender display name
    pub from_name: String,
    /// Broker inboxes receiving each confirmation; notify refuses to run while empty
    pub recipients: Vec<String>,
    /// SendGrid mail-send URL
    pub sendgrid_endpoint: String,
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            from_email: "applications@example.com".to_string(),
            from_name: "Acorn Brokers".to_string(),
            recipients: Vec::new(),
            sendgrid_endpoint: DEFAULT_SENDGRID_ENDPOINT.to_string(),
        }
    }
}

/// Intake configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// HTTP listen address
    pub bind_addr: String,
    /// Session token lifetime in seconds
    pub token_ttl_secs: u64,
    /// Tolerance past token expiry in seconds; zero disables it
    pub clock_skew_leeway_secs: u64,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Record storage
    pub store: StoreBackend,
    /// Confirmation mail
    pub mail: MailSettings,
    /// Token signing secret (environment only)
    #[serde(skip)]
    pub signing_secret: Option<SecretString>,
    /// SendGrid API key (environment only)
    #[serde(skip)]
    pub sendgrid_api_key: Option<SecretString>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            clock_skew_leeway_secs: 0,
            request_timeout_ms: 10_000,
            store: StoreBackend::Memory,
            mail: MailSettings::default(),
            signing_secret: None,
            sendgrid_api_key: None,
        }
    }
}

impl IntakeConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// `Io` if unreadable, `Parse` if malformed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse TOML text
    ///
    /// # Errors
    /// Returns the TOML error for malformed input
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Read secrets from the process environment
    #[must_use]
    pub fn with_env_secrets(self) -> Self {
        self.with_secrets_from(|key| std::env::var(key).ok())
    }

    /// Read secrets through a lookup function; empty values count as absent
    #[must_use]
    pub fn with_secrets_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let secret = |key: &str| lookup(key).filter(|v| !v.is_empty()).map(SecretString::from);
        if let Some(signing) = secret(SIGNING_SECRET_ENV) {
            self.signing_secret = Some(signing);
        }
        if let Some(api_key) = secret(SENDGRID_API_KEY_ENV) {
            self.sendgrid_api_key = Some(api_key);
        }
        self
    }

    /// With signing secret
    #[inline]
    #[must_use]
    pub fn with_signing_secret(mut self, secret: impl Into<String>) -> Self {
        self.signing_secret = Some(SecretString::from(secret.into()));
        self
    }

    /// With SendGrid API key
    #[inline]
    #[must_use]
    pub fn with_sendgrid_api_key(mut self, key: impl Into<String>) -> Self {
        self.sendgrid_api_key = Some(SecretString::from(key.into()));
        self
    }

    /// With bind address
    #[inline]
    #[must_use]
    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    /// With token lifetime
    #[inline]
    #[must_use]
    pub fn with_token_ttl(mut self, secs: u64) -> Self {
        self.token_ttl_secs = secs;
        self
    }

    /// With expiry leeway
    #[inline]
    #[must_use]
    pub fn with_clock_skew_leeway(mut self, secs: u64) -> Self {
        self.clock_skew_leeway_secs = secs;
        self
    }

    /// With request timeout
    #[inline]
    #[must_use]
    pub fn with_request_timeout_ms(mut self, ms: u64) -> Self {
        self.request_timeout_ms = ms;
        self
    }

    /// With store backend
    #[inline]
    #[must_use]
    pub fn with_store(mut self, store: StoreBackend) -> Self {
        self.store = store;
        self
    }

    /// With mail settings
    #[inline]
    #[must_use]
    pub fn with_mail(mut self, mail: MailSettings) -> Self {
        self.mail = mail;
        self
    }
}
