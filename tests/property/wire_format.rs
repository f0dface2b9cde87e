//! Property-based tests for the wire format.
//!
//! Uses proptest to verify:
//! 1. `text_to_buffer(buffer_to_text(b)) == b` for any byte buffer.
//! 2. Any `ChatMessage` survives a JSON round-trip, including absent fields.
//! 3. Random text never causes a panic in the decoders (returns `Err`).

use chatvault_proto::codec;
use chatvault_proto::envelope::Envelope;
use chatvault_proto::message::ChatMessage;
use proptest::prelude::*;

/// Strategy for optional short metadata strings.
fn arb_field() -> impl Strategy<Value = Option<String>> {
    prop::option::of("[a-zA-Z0-9_-]{1,24}")
}

/// Strategy for generating arbitrary `ChatMessage` values.
fn arb_chat_message() -> impl Strategy<Value = ChatMessage> {
    (
        ".{0,512}",
        arb_field(),
        arb_field(),
        arb_field(),
        arb_field(),
        arb_field(),
    )
        .prop_map(
            |(text, sender, sender_id, sender_name, timestamp, kind)| ChatMessage {
                text,
                sender,
                sender_id,
                sender_name,
                timestamp,
                kind,
                ..ChatMessage::default()
            },
        )
}

proptest! {
    #[test]
    fn base64_round_trips(bytes in prop::collection::vec(any::<u8>(), 0..2048)) {
        let text = codec::buffer_to_text(&bytes);
        prop_assert_eq!(codec::text_to_buffer(&text).unwrap(), bytes);
    }

    #[test]
    fn base64_decode_never_panics(text in ".{0,256}") {
        let _ = codec::text_to_buffer(&text);
    }

    #[test]
    fn chat_message_json_round_trips(msg in arb_chat_message()) {
        let json = serde_json::to_string(&msg).unwrap();
        let back: ChatMessage = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, msg);
    }

    #[test]
    fn plain_envelope_round_trips(msg in arb_chat_message()) {
        let envelope = Envelope::Plain(msg);
        let text = codec::encode_envelope(&envelope).unwrap();
        prop_assert_eq!(codec::decode_envelope(&text).unwrap(), envelope);
    }

    #[test]
    fn envelope_decode_never_panics(text in ".{0,256}") {
        let _ = codec::decode_envelope(&text);
    }
}
