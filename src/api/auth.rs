//! Session token storage.
//!
//! Access and refresh tokens live under fixed key names. The production
//! store is the OS keychain (`keyring`); [`MemoryTokenStore`] keeps tokens
//! for the lifetime of the process and is what tests use.

use std::collections::HashMap;
use std::sync::Mutex;

use base64::Engine;
use keyring::Entry;
use thiserror::Error;
use zeroize::Zeroize;

/// Default keychain service name for the SchoolDesk client.
pub const SERVICE_NAME: &str = "com.schooldesk.client";

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("Keychain operation failed: {0}")]
    OperationFailed(String),
}

impl From<keyring::Error> for TokenStoreError {
    fn from(err: keyring::Error) -> Self {
        TokenStoreError::OperationFailed(err.to_string())
    }
}

/// Which of the two session tokens an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    /// Fixed storage key for this token.
    pub const fn key(self) -> &'static str {
        match self {
            TokenKind::Access => "access_token",
            TokenKind::Refresh => "refresh_token",
        }
    }
}

/// Persistent storage for session credentials.
///
/// Reads happen on every request; writes only on login, refresh and logout.
pub trait TokenStore: Send + Sync {
    fn get(&self, kind: TokenKind) -> Result<Option<String>, TokenStoreError>;

    fn set(&self, kind: TokenKind, token: &str) -> Result<(), TokenStoreError>;

    /// Remove a token. Removing a token that is not stored is not an error.
    fn delete(&self, kind: TokenKind) -> Result<(), TokenStoreError>;

    /// Remove both tokens.
    fn clear(&self) -> Result<(), TokenStoreError> {
        self.delete(TokenKind::Access)?;
        self.delete(TokenKind::Refresh)
    }
}

/// Token store backed by the platform keychain.
pub struct KeychainTokenStore {
    service: String,
}

impl KeychainTokenStore {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, kind: TokenKind) -> Result<Entry, TokenStoreError> {
        Ok(Entry::new(&self.service, kind.key())?)
    }
}

impl Default for KeychainTokenStore {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl TokenStore for KeychainTokenStore {
    /// Returns `None` if no entry exists (never logged in, or logged out).
    fn get(&self, kind: TokenKind) -> Result<Option<String>, TokenStoreError> {
        match self.entry(kind)?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(TokenStoreError::from(e)),
        }
    }

    fn set(&self, kind: TokenKind, token: &str) -> Result<(), TokenStoreError> {
        self.entry(kind)?.set_password(token)?;
        Ok(())
    }

    fn delete(&self, kind: TokenKind) -> Result<(), TokenStoreError> {
        match self.entry(kind)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()), // Already deleted, idempotent
            Err(e) => Err(TokenStoreError::from(e)),
        }
    }
}

/// In-process token store. Cleared tokens are zeroed before being dropped.
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<HashMap<TokenKind, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with an access token and optional refresh token.
    pub fn with_tokens(access: &str, refresh: Option<&str>) -> Self {
        let mut tokens = HashMap::new();
        tokens.insert(TokenKind::Access, access.to_string());
        if let Some(refresh) = refresh {
            tokens.insert(TokenKind::Refresh, refresh.to_string());
        }
        Self {
            tokens: Mutex::new(tokens),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, kind: TokenKind) -> Result<Option<String>, TokenStoreError> {
        let tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        Ok(tokens.get(&kind).cloned())
    }

    fn set(&self, kind: TokenKind, token: &str) -> Result<(), TokenStoreError> {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(mut old) = tokens.insert(kind, token.to_string()) {
            old.zeroize();
        }
        Ok(())
    }

    fn delete(&self, kind: TokenKind) -> Result<(), TokenStoreError> {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(mut old) = tokens.remove(&kind) {
            old.zeroize();
        }
        Ok(())
    }
}

/// Extract the `sub` claim from a JWT access token.
///
/// The payload is decoded without verification; the backend already
/// verified the token and we only want the subject for display.
pub fn token_subject(token: &str) -> Result<String, String> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err("Invalid JWT format".to_string());
    }

    let payload = parts[1].trim_end_matches('=');
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| format!("Failed to decode JWT payload: {}", e))?;

    let json: serde_json::Value = serde_json::from_slice(&decoded)
        .map_err(|e| format!("Failed to parse JWT payload: {}", e))?;

    json["sub"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| "JWT payload missing 'sub' claim".to_string())
}
