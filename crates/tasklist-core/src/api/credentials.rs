//! Access and refresh credential storage.
//!
//! Credentials live in an in-memory cache backed by the durable store. The
//! cache is authoritative for the process lifetime: the durable store is read
//! only on a cold miss and writes to it are best-effort. Values are never
//! logged or displayed.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use reqwest::header::{HeaderValue, InvalidHeaderValue};
use tasklist_types::TokenResponse;
use thiserror::Error;
use tracing::warn;

use crate::storage::{KeyValueStore, keys};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    /// Short-lived bearer credential attached to every request.
    Access,
    /// Longer-lived credential exchanged for a new pair.
    Refresh,
}

impl CredentialKind {
    fn storage_key(self) -> &'static str {
        match self {
            CredentialKind::Access => keys::ACCESS_TOKEN,
            CredentialKind::Refresh => keys::REFRESH_TOKEN,
        }
    }
}

/// An opaque bearer credential.
///
/// Validated at construction to be non-empty visible ASCII so it always fits
/// in an HTTP header. `Debug` is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// # Errors
    /// Returns an error if the value is empty or contains characters that
    /// cannot appear in a header.
    pub fn new(value: impl Into<String>) -> Result<Self, InvalidCredential> {
        let value = value.into();
        if value.is_empty() {
            return Err(InvalidCredential::Empty);
        }
        if let Some(position) = value.bytes().position(|b| !(0x21..=0x7e).contains(&b)) {
            return Err(InvalidCredential::InvalidCharacter { position });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `Bearer <credential>`, marked sensitive so it is redacted in debug output.
    ///
    /// # Errors
    /// Returns an error if the header value cannot be built.
    pub fn header_value(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.0))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&"[REDACTED]").finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidCredential {
    #[error("credential is empty")]
    Empty,
    #[error("credential contains an invalid character at position {position}")]
    InvalidCharacter { position: usize },
}

/// Cache slot. `Unknown` means the durable store has not been consulted yet.
#[derive(Debug, Clone, Default)]
enum Slot {
    #[default]
    Unknown,
    Known(Option<Credential>),
}

#[derive(Debug, Default)]
struct Cache {
    access: Slot,
    refresh: Slot,
}

impl Cache {
    fn slot_mut(&mut self, kind: CredentialKind) -> &mut Slot {
        match kind {
            CredentialKind::Access => &mut self.access,
            CredentialKind::Refresh => &mut self.refresh,
        }
    }
}

/// Process-scoped holder of the credential pair.
///
/// The only writer of the credential keys in durable storage.
pub struct CredentialStore {
    cache: Mutex<Cache>,
    durable: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    /// Creates a store with a cold cache; each kind is read from `durable` on
    /// first use.
    pub fn new(durable: Arc<dyn KeyValueStore>) -> Self {
        Self {
            cache: Mutex::new(Cache::default()),
            durable,
        }
    }

    /// Creates a store and reads both kinds from `durable` once.
    pub fn init(durable: Arc<dyn KeyValueStore>) -> Self {
        let store = Self::new(durable);
        store.get(CredentialKind::Access);
        store.get(CredentialKind::Refresh);
        store
    }

    fn lock(&self) -> MutexGuard<'_, Cache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, kind: CredentialKind) -> Option<Credential> {
        let mut cache = self.lock();
        let slot = cache.slot_mut(kind);
        if let Slot::Known(value) = slot {
            return value.clone();
        }

        let loaded = match self.durable.get(kind.storage_key()) {
            Ok(Some(raw)) => match Credential::new(raw) {
                Ok(credential) => Some(credential),
                Err(err) => {
                    warn!(?kind, error = %err, "ignoring malformed stored credential");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(?kind, error = %err, "failed to read stored credential");
                None
            }
        };
        *slot = Slot::Known(loaded.clone());
        loaded
    }

    pub fn has(&self, kind: CredentialKind) -> bool {
        self.get(kind).is_some()
    }

    /// Replaces one credential. `None` removes it.
    pub fn set(&self, kind: CredentialKind, value: Option<Credential>) {
        let mut cache = self.lock();
        let key = kind.storage_key();
        let persisted = match &value {
            Some(credential) => self.durable.set(key, credential.as_str()),
            None => self.durable.remove(key),
        };
        if let Err(err) = persisted {
            warn!(?kind, error = %err, "failed to persist credential; keeping it in memory only");
        }
        *cache.slot_mut(kind) = Slot::Known(value);
    }

    /// Stores the pair from a login or refresh response.
    ///
    /// The refresh credential is only replaced when the response carries one.
    ///
    /// # Errors
    /// Returns an error if a returned credential is malformed; nothing is
    /// stored in that case.
    pub fn apply_tokens(&self, tokens: &TokenResponse) -> Result<(), InvalidCredential> {
        let access = Credential::new(tokens.access_token.clone())?;
        let refresh = tokens
            .refresh_token
            .clone()
            .map(Credential::new)
            .transpose()?;

        self.set(CredentialKind::Access, Some(access));
        if let Some(refresh) = refresh {
            self.set(CredentialKind::Refresh, Some(refresh));
        }
        Ok(())
    }

    /// Removes both kinds from memory and durable storage.
    pub fn clear(&self) {
        self.set(CredentialKind::Access, None);
        self.set(CredentialKind::Refresh, None);
    }

    /// Ends the credential lifecycle started by [`CredentialStore::init`].
    pub fn teardown(&self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;
    use crate::storage::MemoryStore;

    /// Store whose writes always fail.
    struct ReadOnlyStore(MemoryStore);

    impl KeyValueStore for ReadOnlyStore {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.0.get(key)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            anyhow::bail!("read-only")
        }

        fn remove(&self, _key: &str) -> Result<()> {
            anyhow::bail!("read-only")
        }
    }

    fn credential(value: &str) -> Credential {
        Credential::new(value).unwrap()
    }

    #[test]
    fn test_credential_validation() {
        assert_eq!(Credential::new(""), Err(InvalidCredential::Empty));
        assert_eq!(
            Credential::new("abc def"),
            Err(InvalidCredential::InvalidCharacter { position: 3 })
        );
        assert!(Credential::new("eyJhbGciOi.J9-_x").is_ok());
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let debug = format!("{:?}", credential("super-secret"));
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_header_value_is_sensitive_bearer() {
        let header = credential("a1").header_value().unwrap();
        assert_eq!(header.to_str().unwrap(), "Bearer a1");
        assert!(header.is_sensitive());
    }

    #[test]
    fn test_cold_read_from_durable_store() {
        let durable = Arc::new(MemoryStore::new());
        durable.set(keys::ACCESS_TOKEN, "a1").unwrap();

        let store = CredentialStore::new(durable);
        assert_eq!(store.get(CredentialKind::Access), Some(credential("a1")));
        assert_eq!(store.get(CredentialKind::Refresh), None);
    }

    #[test]
    fn test_set_and_clear_write_through() {
        let durable = Arc::new(MemoryStore::new());
        let store = CredentialStore::init(durable.clone());

        store.set(CredentialKind::Access, Some(credential("a1")));
        store.set(CredentialKind::Refresh, Some(credential("r1")));
        assert_eq!(durable.get(keys::REFRESH_TOKEN).unwrap().as_deref(), Some("r1"));

        store.clear();
        assert_eq!(store.get(CredentialKind::Access), None);
        assert_eq!(durable.get(keys::ACCESS_TOKEN).unwrap(), None);
        assert_eq!(durable.get(keys::REFRESH_TOKEN).unwrap(), None);
    }

    #[test]
    fn test_memory_wins_when_durable_write_fails() {
        let inner = MemoryStore::new();
        inner.set(keys::ACCESS_TOKEN, "stale").unwrap();
        let store = CredentialStore::init(Arc::new(ReadOnlyStore(inner)));

        store.set(CredentialKind::Access, Some(credential("fresh")));
        assert_eq!(store.get(CredentialKind::Access), Some(credential("fresh")));

        // A failed durable removal must not resurrect the old value.
        store.clear();
        assert_eq!(store.get(CredentialKind::Access), None);
    }

    #[test]
    fn test_apply_tokens_keeps_refresh_when_not_rotated() {
        let store = CredentialStore::init(Arc::new(MemoryStore::new()));
        store.set(CredentialKind::Refresh, Some(credential("r1")));

        let tokens = TokenResponse {
            access_token: "a2".to_string(),
            refresh_token: None,
            user: None,
        };
        store.apply_tokens(&tokens).unwrap();

        assert_eq!(store.get(CredentialKind::Access), Some(credential("a2")));
        assert_eq!(store.get(CredentialKind::Refresh), Some(credential("r1")));
    }

    #[test]
    fn test_apply_tokens_rejects_malformed_without_partial_write() {
        let store = CredentialStore::init(Arc::new(MemoryStore::new()));
        let tokens = TokenResponse {
            access_token: "a2".to_string(),
            refresh_token: Some("bad token".to_string()),
            user: None,
        };
        assert!(store.apply_tokens(&tokens).is_err());
        assert_eq!(store.get(CredentialKind::Access), None);
    }
}
