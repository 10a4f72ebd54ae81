use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

pub const MAX_TOKEN_LENGTH: usize = 8192;

/// The two named credentials the capture core reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKey {
    AccessToken,
    RefreshToken,
}

impl CredentialKey {
    pub const ALL: [CredentialKey; 2] = [CredentialKey::AccessToken, CredentialKey::RefreshToken];

    /// Storage key as written by the mobile shells.
    pub fn raw(&self) -> &'static str {
        match self {
            CredentialKey::AccessToken => "access_token",
            CredentialKey::RefreshToken => "refresh_token",
        }
    }
}

impl std::fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.raw())
    }
}

pub fn validate_token(key: CredentialKey, value: &str) -> Result<(), KvError> {
    if value.trim().is_empty() {
        return Err(KvError::InvalidValue {
            key,
            reason: "token cannot be empty".to_string(),
        });
    }

    if value.len() > MAX_TOKEN_LENGTH {
        return Err(KvError::InvalidValue {
            key,
            reason: format!("token exceeds maximum length of {MAX_TOKEN_LENGTH} bytes"),
        });
    }

    if value.chars().any(char::is_control) {
        return Err(KvError::InvalidValue {
            key,
            reason: "token contains control characters".to_string(),
        });
    }

    Ok(())
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum KvError {
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: CredentialKey, reason: String },

    #[error("storage error: {message} (code: {code:?}, retryable: {retryable})")]
    Storage {
        code: StorageErrorCode,
        message: String,
        retryable: bool,
    },
}

impl KvError {
    pub fn is_retryable(&self) -> bool {
        match self {
            KvError::Storage { retryable, .. } => *retryable,
            KvError::InvalidValue { .. } => false,
        }
    }

    pub fn storage(code: StorageErrorCode, message: impl Into<String>) -> Self {
        Self::Storage {
            code,
            message: message.into(),
            retryable: code.is_retryable(),
        }
    }
}

/// Vocabulary for shell [`CredentialStore`] implementations: keychain and
/// keystore failures are mapped onto these codes through [`KvError::storage`].
/// The in-memory store never fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageErrorCode {
    Unknown,
    Corrupted,
    DiskFull,
    PermissionDenied,
    Busy,
    Locked,
    IoError,
}

impl StorageErrorCode {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageErrorCode::Busy | StorageErrorCode::Locked)
    }
}

/// Durable credential storage owned by the shell (keychain, keystore, ...).
///
/// Writes must be durable by the time `set` returns.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, key: CredentialKey) -> Result<Option<SecretString>, KvError>;
    async fn set(&self, key: CredentialKey, value: SecretString) -> Result<(), KvError>;
    async fn remove(&self, key: CredentialKey) -> Result<(), KvError>;
}

/// Process-local store. Used by previews and tests, and by shells that
/// persist through their own lifecycle hooks.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    entries: RwLock<HashMap<CredentialKey, SecretString>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(access: &str, refresh: &str) -> Self {
        let mut entries = HashMap::new();
        entries.insert(CredentialKey::AccessToken, SecretString::new(access.to_string()));
        entries.insert(CredentialKey::RefreshToken, SecretString::new(refresh.to_string()));
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Exposes a stored token; for assertions and debugging tools only.
    pub async fn peek(&self, key: CredentialKey) -> Option<String> {
        self.entries
            .read()
            .await
            .get(&key)
            .map(|s| s.expose_secret().clone())
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get(&self, key: CredentialKey) -> Result<Option<SecretString>, KvError> {
        Ok(self.entries.read().await.get(&key).cloned())
    }

    async fn set(&self, key: CredentialKey, value: SecretString) -> Result<(), KvError> {
        validate_token(key, value.expose_secret())?;
        self.entries.write().await.insert(key, value);
        Ok(())
    }

    async fn remove(&self, key: CredentialKey) -> Result<(), KvError> {
        self.entries.write().await.remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_keys_match_shell_storage() {
        assert_eq!(CredentialKey::AccessToken.raw(), "access_token");
        assert_eq!(CredentialKey::RefreshToken.raw(), "refresh_token");
        assert_eq!(CredentialKey::ALL.len(), 2);
    }

    #[test]
    fn test_token_validation() {
        assert!(validate_token(CredentialKey::AccessToken, "").is_err());
        assert!(validate_token(CredentialKey::AccessToken, "   ").is_err());
        assert!(validate_token(CredentialKey::AccessToken, "abc\ndef").is_err());
        assert!(validate_token(CredentialKey::AccessToken, &"a".repeat(MAX_TOKEN_LENGTH + 1)).is_err());
        assert!(validate_token(CredentialKey::RefreshToken, "eyJhbGciOi.payload.sig").is_ok());
    }

    #[test]
    fn test_error_retryable() {
        assert!(KvError::storage(StorageErrorCode::Busy, "busy").is_retryable());
        assert!(!KvError::storage(StorageErrorCode::Corrupted, "bad").is_retryable());
        assert!(!KvError::InvalidValue {
            key: CredentialKey::AccessToken,
            reason: "x".into()
        }
        .is_retryable());
    }

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let store = InMemoryCredentialStore::new();
        assert!(store.get(CredentialKey::AccessToken).await.unwrap().is_none());

        store
            .set(CredentialKey::AccessToken, SecretString::new("a1".into()))
            .await
            .unwrap();
        let value = store.get(CredentialKey::AccessToken).await.unwrap().unwrap();
        assert_eq!(value.expose_secret(), "a1");

        store.remove(CredentialKey::AccessToken).await.unwrap();
        assert!(store.get(CredentialKey::AccessToken).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_rejects_empty_token() {
        let store = InMemoryCredentialStore::with_tokens("a", "r");
        let result = store
            .set(CredentialKey::AccessToken, SecretString::new(String::new()))
            .await;
        assert!(matches!(result, Err(KvError::InvalidValue { .. })));
        assert_eq!(store.peek(CredentialKey::AccessToken).await.as_deref(), Some("a"));
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = SecretString::new("hunter2".into());
        assert!(!format!("{secret:?}").contains("hunter2"));
    }
}
