//! Per-session key registry.
//!
//! [`SessionKeyRegistry`] answers "which key belongs to this chat session".
//! It keeps two tiers:
//!
//! 1. an in-memory cache of live keys (no I/O on hit);
//! 2. a durable [`KeyValueStore`] holding exported keys under
//!    `"chat_key_" + session_id`.
//!
//! On a cache miss the durable entry is authoritative. If there is none, or
//! it cannot be imported, a new key is generated and written to both tiers.
//!
//! # Failure policy
//!
//! A session must stay usable when storage misbehaves:
//! - a corrupt stored key is replaced by a fresh one, and
//!   [`KeyWarning::CorruptKeyReplaced`] is emitted because every message
//!   sealed under the old key is now unreadable;
//! - a failed durable write still returns the generated key, and
//!   [`KeyWarning::PersistFailed`] is emitted because the key will not
//!   survive a restart.
//!
//! Warnings are delivered through the channel returned by
//! [`SessionKeyRegistry::with_warnings`] and logged via `tracing`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::crypto::CryptoError;
use crate::crypto::keys::{self, SessionKey};
use crate::store::{KeyValueStore, StoreError};

/// Prefix prepended to session ids to form durable storage keys.
pub const DEFAULT_KEY_PREFIX: &str = "chat_key_";

/// Errors from explicit registry writes.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The key could not be exported for storage.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The durable store rejected the write.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Where [`SessionKeyRegistry::resolve_session_key`] found the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// In-memory cache hit.
    Cache,
    /// Imported from the durable store.
    Store,
    /// Freshly generated.
    Generated,
}

/// Result of resolving a session key.
#[derive(Debug)]
pub struct ResolvedKey {
    /// The key to use for this session.
    pub key: Arc<SessionKey>,
    /// Which tier supplied it.
    pub source: KeySource,
    /// Set when a freshly generated key could not be persisted.
    pub persist_error: Option<SessionError>,
}

/// Warning emitted when key storage degrades.
///
/// The host UI should watch for these and tell the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyWarning {
    /// The stored key could not be imported and was replaced. Messages
    /// sealed under the old key can no longer be decrypted.
    CorruptKeyReplaced {
        /// Affected session.
        session_id: String,
        /// Description of the import error.
        reason: String,
    },
    /// The durable store could not be read; a new key was generated.
    StoreUnavailable {
        /// Affected session.
        session_id: String,
        /// Description of the read error.
        reason: String,
    },
    /// A key is in use but was not persisted, so it will not survive a
    /// restart.
    PersistFailed {
        /// Affected session.
        session_id: String,
        /// Description of the write error.
        reason: String,
    },
}

/// Maps chat session ids to their active [`SessionKey`].
///
/// Each session id resolves to exactly one key at a time. The check-then-act
/// sequence in [`get_session_key`](Self::get_session_key) runs under a
/// per-session lock, so concurrent first access cannot produce two keys.
pub struct SessionKeyRegistry<S: KeyValueStore> {
    store: S,
    prefix: String,
    cache: Mutex<HashMap<String, Arc<SessionKey>>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    warning_tx: Option<tokio::sync::mpsc::Sender<KeyWarning>>,
}

impl<S: KeyValueStore> SessionKeyRegistry<S> {
    /// Create a registry over `store` with the default key prefix and no
    /// warning channel.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store,
            prefix: DEFAULT_KEY_PREFIX.to_string(),
            cache: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
            warning_tx: None,
        }
    }

    /// Create a registry that reports [`KeyWarning`]s.
    ///
    /// Returns the registry and a receiver the UI can consume. Warnings are
    /// dropped if the receiver falls `warning_buffer` entries behind.
    #[must_use]
    pub fn with_warnings(
        store: S,
        warning_buffer: usize,
    ) -> (Self, tokio::sync::mpsc::Receiver<KeyWarning>) {
        let (tx, rx) = tokio::sync::mpsc::channel(warning_buffer.max(1));
        let mut registry = Self::new(store);
        registry.warning_tx = Some(tx);
        (registry, rx)
    }

    /// Use `prefix` instead of [`DEFAULT_KEY_PREFIX`] for storage keys.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Storage key for `session_id`.
    #[must_use]
    pub fn storage_key(&self, session_id: &str) -> String {
        format!("{}{session_id}", self.prefix)
    }

    /// The underlying durable store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Number of keys held in memory.
    #[must_use]
    pub fn cached_sessions(&self) -> usize {
        self.cache.lock().len()
    }

    /// Return the key for `session_id`, loading or generating it as needed.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyGeneration`] only if a new key was needed
    /// and the OS random source failed. Storage problems never fail this
    /// call; they are reported as [`KeyWarning`]s.
    pub fn get_session_key(&self, session_id: &str) -> Result<Arc<SessionKey>, CryptoError> {
        self.resolve_session_key(session_id).map(|resolved| resolved.key)
    }

    /// Like [`get_session_key`](Self::get_session_key), but also reports
    /// where the key came from and whether persisting it failed.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyGeneration`] if key generation fails.
    pub fn resolve_session_key(&self, session_id: &str) -> Result<ResolvedKey, CryptoError> {
        if let Some(key) = self.cached(session_id) {
            return Ok(ResolvedKey {
                key,
                source: KeySource::Cache,
                persist_error: None,
            });
        }

        let lock = self.session_lock(session_id);
        let _guard = lock.lock();

        // Another caller may have populated the cache while we waited.
        if let Some(key) = self.cached(session_id) {
            return Ok(ResolvedKey {
                key,
                source: KeySource::Cache,
                persist_error: None,
            });
        }

        if let Some(key) = self.load_stored(session_id) {
            let key = Arc::new(key);
            self.cache
                .lock()
                .insert(session_id.to_string(), Arc::clone(&key));
            tracing::debug!(session_id, "session key loaded from store");
            return Ok(ResolvedKey {
                key,
                source: KeySource::Store,
                persist_error: None,
            });
        }

        let key = Arc::new(keys::generate_key()?);
        self.cache
            .lock()
            .insert(session_id.to_string(), Arc::clone(&key));
        tracing::info!(session_id, "generated new session key");

        let persist_error = self.persist(session_id, &key).err();
        if let Some(err) = &persist_error {
            tracing::warn!(
                session_id,
                error = %err,
                "session key not persisted — it will be lost on restart"
            );
            self.emit(KeyWarning::PersistFailed {
                session_id: session_id.to_string(),
                reason: err.to_string(),
            });
        }

        Ok(ResolvedKey {
            key,
            source: KeySource::Generated,
            persist_error,
        })
    }

    /// Install `key` for `session_id`, overwriting both tiers.
    ///
    /// The in-memory tier is always updated, so the key is usable even if
    /// persisting it fails.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Crypto`] if the key is non-extractable, or
    /// [`SessionError::Store`] if the durable write fails.
    pub fn save_session_key(&self, session_id: &str, key: SessionKey) -> Result<(), SessionError> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock();

        let key = Arc::new(key);
        self.cache
            .lock()
            .insert(session_id.to_string(), Arc::clone(&key));

        self.persist(session_id, &key).inspect_err(|err| {
            tracing::warn!(session_id, error = %err, "failed to persist saved session key");
        })
    }

    /// Remove the key for `session_id` from both tiers.
    ///
    /// The next [`get_session_key`](Self::get_session_key) generates a new
    /// key; anything sealed under the old one becomes unreadable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the durable entry could not be removed. The
    /// in-memory entry is removed regardless.
    pub fn clear_session_key(&self, session_id: &str) -> Result<(), StoreError> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock();

        self.cache.lock().remove(session_id);
        let removed = self.store.remove(&self.storage_key(session_id));

        // Drop the lock entry unless another caller already holds a clone:
        // one reference is ours, one is the map's.
        let mut locks = self.locks.lock();
        if locks
            .get(session_id)
            .is_some_and(|entry| Arc::strong_count(entry) <= 2)
        {
            locks.remove(session_id);
        }
        drop(locks);

        removed?;
        tracing::info!(session_id, "session key cleared");
        Ok(())
    }

    /// Return the existing key for `session_id` without generating or
    /// writing anything.
    ///
    /// A stored key is imported into the in-memory tier. `Ok(None)` means
    /// neither tier has a key.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the store cannot be read, or
    /// [`SessionError::Crypto`] if the stored entry does not import.
    pub fn find_session_key(
        &self,
        session_id: &str,
    ) -> Result<Option<Arc<SessionKey>>, SessionError> {
        if let Some(key) = self.cached(session_id) {
            return Ok(Some(key));
        }

        let lock = self.session_lock(session_id);
        let _guard = lock.lock();

        let Some(stored) = self.store.get(&self.storage_key(session_id))? else {
            return Ok(None);
        };
        let key = Arc::new(keys::import_key(&stored)?);
        self.cache
            .lock()
            .insert(session_id.to_string(), Arc::clone(&key));
        Ok(Some(key))
    }

    /// Number of per-session locks currently tracked.
    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop every in-memory key, leaving the durable store untouched.
    pub fn forget_cached(&self) {
        self.cache.lock().clear();
    }

    fn cached(&self, session_id: &str) -> Option<Arc<SessionKey>> {
        self.cache.lock().get(session_id).cloned()
    }

    fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .lock()
                .entry(session_id.to_string())
                .or_default(),
        )
    }

    /// Read and import the stored key, reporting (not returning) failures.
    fn load_stored(&self, session_id: &str) -> Option<SessionKey> {
        let stored = match self.store.get(&self.storage_key(session_id)) {
            Ok(stored) => stored?,
            Err(err) => {
                tracing::warn!(session_id, error = %err, "could not read stored session key");
                self.emit(KeyWarning::StoreUnavailable {
                    session_id: session_id.to_string(),
                    reason: err.to_string(),
                });
                return None;
            }
        };

        match keys::import_key(&stored) {
            Ok(key) => Some(key),
            Err(err) => {
                tracing::warn!(
                    session_id,
                    error = %err,
                    "stored session key is corrupt — replacing it"
                );
                self.emit(KeyWarning::CorruptKeyReplaced {
                    session_id: session_id.to_string(),
                    reason: err.to_string(),
                });
                None
            }
        }
    }

    fn persist(&self, session_id: &str, key: &SessionKey) -> Result<(), SessionError> {
        let exported = keys::export_key(key)?;
        self.store.set(&self.storage_key(session_id), &exported)?;
        Ok(())
    }

    fn emit(&self, warning: KeyWarning) {
        if let Some(tx) = &self.warning_tx {
            // Best-effort: a full channel drops the warning; it is logged anyway.
            let _ = tx.try_send(warning);
        }
    }
}
