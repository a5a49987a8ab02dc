//! Configuration management for Authlink
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from YAML files and environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::api::decode::DateDecodingStrategy;
use crate::auth::authority::AuthorityConfig;
use crate::auth::grant::{ClientCredentials, DEFAULT_SCOPE};
use crate::error::{AuthlinkError, Result};

/// Main configuration structure for Authlink
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// API endpoint settings
    #[serde(default)]
    pub api: ApiConfig,
    /// Identity endpoint settings
    #[serde(default)]
    pub auth: AuthConfig,
    /// Credential persistence settings
    #[serde(default)]
    pub credentials: CredentialConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// API endpoint configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL that endpoint paths are appended to
    #[serde(default)]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Optional second header that repeats the bearer credential
    #[serde(default)]
    pub mirror_auth_header: Option<String>,

    /// Strategy for date fields in response models
    #[serde(default)]
    pub date_strategy: DateDecodingStrategy,
}

fn default_timeout_seconds() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_seconds: default_timeout_seconds(),
            mirror_auth_header: None,
            date_strategy: DateDecodingStrategy::default(),
        }
    }
}

impl ApiConfig {
    /// Parses the base URL.
    pub fn base_url(&self) -> Result<Url> {
        parse_url("api.base_url", &self.base_url)
    }
}

/// Identity endpoint configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Grant endpoint URL
    #[serde(default)]
    pub token_url: String,

    /// Sign-out endpoint URL
    #[serde(default)]
    pub sign_out_url: String,

    /// OAuth client identifier
    #[serde(default)]
    pub client_id: String,

    /// OAuth client secret
    #[serde(default)]
    pub client_secret: String,

    /// Scope requested by grants that carry one
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Per-request timeout in seconds for grant and sign-out calls
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_url: String::new(),
            sign_out_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            scope: default_scope(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl AuthConfig {
    /// Builds the [`AuthorityConfig`] used by the token authority.
    pub fn authority_config(&self) -> Result<AuthorityConfig> {
        Ok(AuthorityConfig {
            token_url: parse_url("auth.token_url", &self.token_url)?,
            sign_out_url: parse_url("auth.sign_out_url", &self.sign_out_url)?,
            credentials: ClientCredentials {
                client_id: self.client_id.clone(),
                client_secret: self.client_secret.clone(),
                scope: self.scope.clone(),
            },
            timeout: Duration::from_secs(self.timeout_seconds),
        })
    }
}

/// Where tokens are persisted between runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    /// OS keyring
    #[default]
    Keyring,
    /// Process memory only
    Memory,
}

/// Credential persistence configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialConfig {
    /// Storage backend
    #[serde(default)]
    pub backend: CredentialBackend,

    /// Keyring service name
    #[serde(default = "default_service")]
    pub service: String,
}

fn default_service() -> String {
    "authlink".to_string()
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            backend: CredentialBackend::default(),
            service: default_service(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json_format: bool,

    /// Optional file that receives a copy of every log line
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// A missing file is not an error: defaults are used and environment
    /// variables are still applied.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_env_vars();

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AuthlinkError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| AuthlinkError::Config(format!("Failed to parse config: {}", e)))
    }

    fn apply_env_vars(&mut self) {
        let string_overrides: [(&str, &mut String); 6] = [
            ("AUTHLINK_BASE_URL", &mut self.api.base_url),
            ("AUTHLINK_TOKEN_URL", &mut self.auth.token_url),
            ("AUTHLINK_SIGN_OUT_URL", &mut self.auth.sign_out_url),
            ("AUTHLINK_CLIENT_ID", &mut self.auth.client_id),
            ("AUTHLINK_CLIENT_SECRET", &mut self.auth.client_secret),
            ("AUTHLINK_LOG_LEVEL", &mut self.logging.level),
        ];
        for (name, field) in string_overrides {
            if let Ok(value) = std::env::var(name) {
                *field = value;
            }
        }

        let timeout_overrides: [(&str, &mut u64); 2] = [
            ("AUTHLINK_TIMEOUT_SECONDS", &mut self.api.timeout_seconds),
            ("AUTHLINK_AUTH_TIMEOUT_SECONDS", &mut self.auth.timeout_seconds),
        ];
        for (name, field) in timeout_overrides {
            if let Ok(value) = std::env::var(name) {
                match value.parse() {
                    Ok(parsed) => *field = parsed,
                    Err(_) => tracing::warn!("Invalid {}: {}", name, value),
                }
            }
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        self.api.base_url()?;
        self.auth.authority_config()?;

        if self.auth.client_id.trim().is_empty() {
            return Err(AuthlinkError::Config(
                "auth.client_id cannot be empty".to_string(),
            ));
        }

        if self.api.timeout_seconds == 0 {
            return Err(AuthlinkError::Config(
                "api.timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.auth.timeout_seconds == 0 {
            return Err(AuthlinkError::Config(
                "auth.timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.credentials.backend == CredentialBackend::Keyring
            && self.credentials.service.trim().is_empty()
        {
            return Err(AuthlinkError::Config(
                "credentials.service cannot be empty for the keyring backend".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_url(field: &str, value: &str) -> Result<Url> {
    Url::parse(value)
        .map_err(|e| AuthlinkError::Config(format!("Invalid {} '{}': {}", field, value, e)))
}
