//! Client-side credential storage
//!
//! The access token lives only in process memory. The refresh token goes
//! through a [`CookieJar`] so it can outlive the process.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::user_auth::TokenPair;

/// Persistence for the refresh token
pub trait CookieJar: Send + Sync {
    fn load(&self) -> io::Result<Option<String>>;
    fn store(&self, refresh_token: &str) -> io::Result<()>;
    fn clear(&self) -> io::Result<()>;
}

#[derive(Default)]
pub struct MemoryCookieJar {
    value: Mutex<Option<String>>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<String>> {
        self.value.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CookieJar for MemoryCookieJar {
    fn load(&self) -> io::Result<Option<String>> {
        Ok(self.slot().clone())
    }

    fn store(&self, refresh_token: &str) -> io::Result<()> {
        *self.slot() = Some(refresh_token.to_string());
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        *self.slot() = None;
        Ok(())
    }
}

/// One token per file; a missing file means no session
pub struct FileCookieJar {
    path: PathBuf,
}

impl FileCookieJar {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CookieJar for FileCookieJar {
    fn load(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                let token = content.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn store(&self, refresh_token: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, refresh_token)
    }

    fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// Current session tokens
pub struct TokenStore {
    access: Mutex<Option<String>>,
    jar: Arc<dyn CookieJar>,
}

impl TokenStore {
    pub fn new(jar: Arc<dyn CookieJar>) -> Self {
        Self {
            access: Mutex::new(None),
            jar,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCookieJar::new()))
    }

    fn access_slot(&self) -> MutexGuard<'_, Option<String>> {
        self.access.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn access_token(&self) -> Option<String> {
        self.access_slot().clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        match self.jar.load() {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read refresh token");
                None
            }
        }
    }

    /// Replace both tokens. Readers never see a new access token paired
    /// with the old refresh token.
    pub fn set_tokens(&self, tokens: &TokenPair) {
        let mut access = self.access_slot();
        if let Err(e) = self.jar.store(&tokens.refresh_token) {
            tracing::warn!(error = %e, "Failed to persist refresh token");
        }
        *access = Some(tokens.access_token.clone());
    }

    pub fn clear(&self) {
        let mut access = self.access_slot();
        if let Err(e) = self.jar.clear() {
            tracing::warn!(error = %e, "Failed to clear refresh token");
        }
        *access = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_slot().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(access: &str, refresh: &str) -> TokenPair {
        TokenPair {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
        }
    }

    #[test]
    fn test_set_and_clear() {
        let store = TokenStore::in_memory();
        assert!(!store.is_authenticated());

        store.set_tokens(&pair("a1", "r1"));
        assert_eq!(store.access_token().as_deref(), Some("a1"));
        assert_eq!(store.refresh_token().as_deref(), Some("r1"));

        store.clear();
        assert!(store.access_token().is_none());
        assert!(store.refresh_token().is_none());
    }

    #[test]
    fn test_file_jar_survives_restart() {
        let path = std::env::temp_dir().join(format!("e_library_jar_{}", uuid::Uuid::new_v4()));

        let first = TokenStore::new(Arc::new(FileCookieJar::new(&path)));
        first.set_tokens(&pair("a1", "r1"));

        // Only the refresh token is persisted
        let second = TokenStore::new(Arc::new(FileCookieJar::new(&path)));
        assert!(second.access_token().is_none());
        assert_eq!(second.refresh_token().as_deref(), Some("r1"));

        second.clear();
        assert!(!path.exists());
        // Clearing twice is fine
        assert!(FileCookieJar::new(&path).clear().is_ok());
    }
}
