//! Durable credential persistence
//!
//! The [`CredentialStore`] trait is the boundary to whatever secure storage
//! the host platform offers. Two implementations ship with the crate:
//!
//! - [`KeyringCredentialStore`] uses the operating system's native credential
//!   store (Keychain on macOS, Secret Service on Linux, Windows Credential
//!   Manager on Windows).
//! - [`InMemoryCredentialStore`] keeps values in process memory; useful for
//!   tests and for hosts that must not persist credentials.
//!
//! Writes are best-effort from the token authority's point of view: the
//! in-memory [`Token`] stays authoritative for the lifetime of the process and
//! a failed write is only logged.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};

use crate::auth::token::Token;

/// Store key under which the access token is persisted.
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Store key under which the refresh token is persisted.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Secure key-value persistence for token strings.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialStore: Send + Sync {
    /// Returns the value stored under `key`, or `None` when absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes the value under `key`. Removing an absent key is not an error.
    fn clear(&self, key: &str) -> Result<()>;
}

/// Credential store backed by the OS keyring.
///
/// Each key is stored as a separate keyring entry under a shared service
/// name, so several applications can use the crate without colliding.
///
/// # Examples
///
/// ```no_run
/// use authlink::auth::credential_store::{CredentialStore, KeyringCredentialStore};
///
/// let store = KeyringCredentialStore::new("my-app");
/// store.set("access_token", "abc").unwrap();
/// assert_eq!(store.get("access_token").unwrap().as_deref(), Some("abc"));
/// ```
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service: String,
}

impl KeyringCredentialStore {
    /// Creates a store that namespaces its entries under `service`.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Service name used for every keyring entry.
    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, key)
            .map_err(|e| anyhow!("keyring entry '{}' unavailable: {}", key, e))
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(anyhow!("keyring read of '{}' failed: {}", key, e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| anyhow!("keyring write of '{}' failed: {}", key, e))
    }

    fn clear(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(anyhow!("keyring delete of '{}' failed: {}", key, e)),
        }
    }
}

/// Credential store that lives only in process memory.
///
/// # Examples
///
/// ```
/// use authlink::auth::credential_store::{CredentialStore, InMemoryCredentialStore};
///
/// let store = InMemoryCredentialStore::default();
/// store.set("refresh_token", "r1").unwrap();
/// store.clear("refresh_token").unwrap();
/// assert!(store.get("refresh_token").unwrap().is_none());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    values: Mutex<HashMap<String, String>>,
}

impl InMemoryCredentialStore {
    /// Creates a store pre-populated with the given token.
    pub fn with_token(token: &Token) -> Self {
        let mut values = HashMap::new();
        if let Some(access) = &token.access_token {
            values.insert(ACCESS_TOKEN_KEY.to_string(), access.clone());
        }
        if let Some(refresh) = &token.refresh_token {
            values.insert(REFRESH_TOKEN_KEY.to_string(), refresh.clone());
        }
        Self {
            values: Mutex::new(values),
        }
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|_| anyhow!("credential store lock poisoned"))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow!("credential store lock poisoned"))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow!("credential store lock poisoned"))?;
        values.remove(key);
        Ok(())
    }
}

/// Reads the persisted token. Store failures yield an empty field.
pub(crate) fn load_token(store: &dyn CredentialStore) -> Token {
    let read = |key: &str| match store.get(key) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Failed to read '{}' from credential store: {}", key, e);
            None
        }
    };

    Token::new(read(ACCESS_TOKEN_KEY), read(REFRESH_TOKEN_KEY))
}

/// Mirrors `token` into the store; absent fields are cleared.
pub(crate) fn persist_token(store: &dyn CredentialStore, token: &Token) {
    for (key, value) in [
        (ACCESS_TOKEN_KEY, token.access_token.as_deref()),
        (REFRESH_TOKEN_KEY, token.refresh_token.as_deref()),
    ] {
        let result = match value {
            Some(value) => store.set(key, value),
            None => store.clear(key),
        };
        if let Err(e) = result {
            tracing::warn!("Failed to persist '{}' to credential store: {}", key, e);
        }
    }
}
