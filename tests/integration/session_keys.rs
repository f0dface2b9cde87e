//! Integration tests for the session key registry over real storage.
//!
//! A "reload" is simulated by dropping a registry and building a new one
//! over the same durable store, which is what a page reload or process
//! restart does to the in-memory tier.

use std::sync::Arc;
use std::thread;

use chatvault::crypto::keys::export_key;
use chatvault::crypto::seal::{open_message, open_or_placeholder, seal_message};
use chatvault::session::{KeySource, KeyWarning, SessionKeyRegistry};
use chatvault::store::{FileStore, InMemoryStore, KeyValueStore};
use chatvault_proto::message::ChatMessage;

fn note(text: &str) -> ChatMessage {
    ChatMessage::new(text)
        .with_sender("support")
        .with_sender_id("s1")
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn key_survives_reload_with_file_store() {
    let dir = tempfile::tempdir().unwrap();

    let envelope = {
        let registry = SessionKeyRegistry::new(FileStore::in_dir(dir.path()));
        let key = registry.get_session_key("chat_case-17").unwrap();
        seal_message(&key, &note("sealed before reload")).unwrap()
    };

    let reloaded = SessionKeyRegistry::new(FileStore::in_dir(dir.path()));
    let resolved = reloaded.resolve_session_key("chat_case-17").unwrap();
    assert_eq!(resolved.source, KeySource::Store);

    let opened = open_message(&resolved.key, &envelope).unwrap();
    assert_eq!(opened.text, "sealed before reload");
}

#[test]
fn key_survives_reload_with_shared_memory_store() {
    let store = Arc::new(InMemoryStore::new());

    let first = SessionKeyRegistry::new(Arc::clone(&store));
    let key = first.get_session_key("room-1").unwrap();
    let envelope = seal_message(&key, &note("hi")).unwrap();
    drop(first);

    let second = SessionKeyRegistry::new(Arc::clone(&store));
    let key = second.get_session_key("room-1").unwrap();
    assert!(open_message(&key, &envelope).is_ok());
}

#[test]
fn durable_layout_uses_chat_key_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let registry = SessionKeyRegistry::new(FileStore::in_dir(dir.path()));
    let key = registry.get_session_key("abc").unwrap();

    let raw = std::fs::read_to_string(dir.path().join("keys.json")).unwrap();
    let entries: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&raw).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries["chat_key_abc"].as_str(),
        Some(export_key(&key).unwrap().as_str())
    );
}

// ============================================================================
// Isolation and rotation
// ============================================================================

#[test]
fn sessions_are_isolated() {
    let registry = SessionKeyRegistry::new(InMemoryStore::new());
    let a = registry.get_session_key("A").unwrap();
    let b = registry.get_session_key("B").unwrap();
    assert_ne!(export_key(&a).unwrap(), export_key(&b).unwrap());

    let envelope = seal_message(&a, &note("for A only")).unwrap();
    assert!(open_message(&b, &envelope).is_err());
    assert!(open_or_placeholder(&b, &envelope).decryption_failed);
}

#[test]
fn clearing_rotates_and_strands_old_messages() {
    let dir = tempfile::tempdir().unwrap();
    let registry = SessionKeyRegistry::new(FileStore::in_dir(dir.path()));

    let old = registry.get_session_key("logout-me").unwrap();
    let envelope = seal_message(&old, &note("before logout")).unwrap();

    registry.clear_session_key("logout-me").unwrap();
    assert!(
        registry
            .store()
            .get("chat_key_logout-me")
            .unwrap()
            .is_none()
    );

    let fresh = registry.get_session_key("logout-me").unwrap();
    assert!(open_message(&fresh, &envelope).is_err());
}

// ============================================================================
// Recovery
// ============================================================================

#[test]
fn corrupt_durable_entry_recovers_with_warning() {
    let dir = tempfile::tempdir().unwrap();
    FileStore::in_dir(dir.path())
        .set("chat_key_broken", "this is not a key")
        .unwrap();

    let (registry, mut warnings) =
        SessionKeyRegistry::with_warnings(FileStore::in_dir(dir.path()), 4);
    let key = registry.get_session_key("broken").unwrap();

    let envelope = seal_message(&key, &note("works again")).unwrap();
    assert_eq!(open_message(&key, &envelope).unwrap().text, "works again");

    assert!(matches!(
        warnings.try_recv().unwrap(),
        KeyWarning::CorruptKeyReplaced { ref session_id, .. } if session_id == "broken"
    ));
}

#[test]
fn wrong_length_durable_entry_is_treated_as_corrupt() {
    let store = InMemoryStore::new();
    // Valid base64, but only 16 bytes of material.
    store.set("chat_key_short", "AAAAAAAAAAAAAAAAAAAAAA==").unwrap();

    let registry = SessionKeyRegistry::new(store);
    let resolved = registry.resolve_session_key("short").unwrap();
    assert_eq!(resolved.source, KeySource::Generated);
}

#[test]
fn unreadable_key_file_still_yields_usable_key() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("keys.json"), "{ truncated").unwrap();

    let (registry, mut warnings) =
        SessionKeyRegistry::with_warnings(FileStore::in_dir(dir.path()), 4);
    let resolved = registry.resolve_session_key("s").unwrap();

    assert_eq!(resolved.source, KeySource::Generated);
    // The store cannot be parsed, so the write fails too.
    assert!(resolved.persist_error.is_some());

    let first = warnings.try_recv().unwrap();
    let second = warnings.try_recv().unwrap();
    assert!(matches!(first, KeyWarning::StoreUnavailable { .. }));
    assert!(matches!(second, KeyWarning::PersistFailed { .. }));
}

#[test]
fn quota_exceeded_keeps_key_for_current_lifetime_only() {
    let store = Arc::new(InMemoryStore::new());
    store.fail_writes(true);

    let registry = SessionKeyRegistry::new(Arc::clone(&store));
    let key = registry.get_session_key("q").unwrap();
    let envelope = seal_message(&key, &note("in memory only")).unwrap();
    assert!(open_message(&registry.get_session_key("q").unwrap(), &envelope).is_ok());

    // After a reload the key is gone.
    store.fail_writes(false);
    let reloaded = SessionKeyRegistry::new(Arc::clone(&store));
    let resolved = reloaded.resolve_session_key("q").unwrap();
    assert_eq!(resolved.source, KeySource::Generated);
    assert!(open_message(&resolved.key, &envelope).is_err());
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn concurrent_first_access_yields_one_key() {
    let registry = Arc::new(SessionKeyRegistry::new(InMemoryStore::new()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let key = registry.get_session_key("race").unwrap();
                export_key(&key).unwrap()
            })
        })
        .collect();

    let exported: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(exported.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(
        registry.store().get("chat_key_race").unwrap().as_deref(),
        Some(exported[0].as_str())
    );
}

#[test]
fn concurrent_distinct_sessions_do_not_block_each_other() {
    let registry = Arc::new(SessionKeyRegistry::new(InMemoryStore::new()));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.get_session_key(&format!("s{i}")).is_ok())
        })
        .collect();

    assert!(handles.into_iter().all(|h| h.join().unwrap()));
    assert_eq!(registry.cached_sessions(), 16);
}
