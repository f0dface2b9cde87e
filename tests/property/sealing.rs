//! Property-based tests for sealing and opening.
//!
//! Uses proptest to verify:
//! 1. Any message sealed under a key opens under the same key with every
//!    field intact.
//! 2. Arbitrary envelope contents never panic the receive path; they either
//!    open or become a placeholder.

use chatvault::crypto::keys::SessionKey;
use chatvault::crypto::seal::{open_message, open_or_placeholder, seal_message};
use chatvault_proto::envelope::{ENCRYPTION_VERSION, SealedEnvelope};
use chatvault_proto::message::ChatMessage;
use proptest::prelude::*;

fn arb_key() -> impl Strategy<Value = SessionKey> {
    any::<[u8; 32]>().prop_map(SessionKey::from_bytes)
}

fn arb_chat_message() -> impl Strategy<Value = ChatMessage> {
    (
        ".{0,256}",
        prop::option::of("[a-z]{1,12}"),
        prop::option::of("[a-z0-9]{1,12}"),
        prop::option::of("[A-Za-z ]{1,24}"),
        prop::option::of("[a-z]{1,8}"),
    )
        .prop_map(|(text, sender, sender_id, sender_name, kind)| ChatMessage {
            text,
            sender,
            sender_id,
            sender_name,
            kind,
            ..ChatMessage::default()
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn sealed_messages_open_intact(key in arb_key(), msg in arb_chat_message()) {
        let envelope = seal_message(&key, &msg).unwrap();
        let opened = open_message(&key, &envelope).unwrap();

        prop_assert_eq!(&opened.text, &msg.text);
        prop_assert_eq!(&opened.sender, &msg.sender);
        prop_assert_eq!(&opened.sender_id, &msg.sender_id);
        prop_assert_eq!(&opened.sender_name, &msg.sender_name);
        prop_assert_eq!(&opened.kind, &msg.kind);
        // The message had no timestamp, so the envelope's generated one is used.
        prop_assert_eq!(&opened.timestamp, &envelope.timestamp);
        prop_assert!(opened.decrypted);
    }

    #[test]
    fn arbitrary_envelopes_never_panic(
        key in arb_key(),
        content in "[A-Za-z0-9+/=]{0,128}",
        iv in "[A-Za-z0-9+/=]{0,24}",
    ) {
        let envelope = SealedEnvelope {
            encrypted_content: content,
            iv,
            timestamp: None,
            sender_id: Some("x".into()),
            kind: None,
            encryption_version: ENCRYPTION_VERSION.to_string(),
            extra: serde_json::Map::new(),
        };
        let shown = open_or_placeholder(&key, &envelope);
        prop_assert!(shown.decryption_failed);
        prop_assert_eq!(shown.sender_id.as_deref(), Some("x"));
    }
}
