//! Sealing chat messages into envelopes and opening them again.
//!
//! [`seal_message`] and [`open_message`] are the strict transforms: they
//! return every failure. [`seal_or_plain`], [`open_or_placeholder`] and
//! [`receive_envelope`] wrap them with the chat UI's degradation policy:
//!
//! - a message that cannot be sealed is sent as an explicit
//!   [`Envelope::Plain`], never as something that looks encrypted;
//! - a sealed envelope that cannot be opened becomes an undecryptable
//!   placeholder that keeps the envelope's routing metadata.

use chatvault_proto::codec;
use chatvault_proto::envelope::{ENCRYPTION_VERSION, Envelope, SealedEnvelope};
use chatvault_proto::message::{ChatMessage, now_iso8601};
use serde_json::Map;

use super::CryptoError;
use super::cipher;
use super::keys::SessionKey;

/// Encrypt a whole message into a [`SealedEnvelope`].
///
/// The full message, body included, is serialized and encrypted. The
/// envelope copies `timestamp` (or the current time), `senderId` and `type`
/// in the clear.
///
/// # Errors
///
/// Returns [`CryptoError::MalformedMessage`] if the message cannot be
/// serialized or an `extra` entry shadows a typed field, or
/// [`CryptoError::Cipher`] if encryption fails.
pub fn seal_message(key: &SessionKey, message: &ChatMessage) -> Result<SealedEnvelope, CryptoError> {
    if let Some(name) = message.shadowed_field() {
        return Err(CryptoError::MalformedMessage(format!(
            "extra field `{name}` shadows a message field"
        )));
    }
    let plaintext =
        serde_json::to_vec(message).map_err(|e| CryptoError::MalformedMessage(e.to_string()))?;
    let sealed = cipher::encrypt(key, &plaintext)?;

    Ok(SealedEnvelope {
        encrypted_content: codec::buffer_to_text(&sealed.bytes),
        iv: codec::buffer_to_text(&sealed.nonce),
        timestamp: Some(message.timestamp.clone().unwrap_or_else(now_iso8601)),
        sender_id: message.sender_id.clone(),
        kind: message.kind.clone(),
        encryption_version: ENCRYPTION_VERSION.to_string(),
        extra: Map::new(),
    })
}

/// Decrypt a [`SealedEnvelope`] back into the original message.
///
/// Envelope metadata only fills gaps: a field present in the decrypted
/// message is kept, a missing one is taken from the envelope. The result is
/// marked `decrypted`.
///
/// # Errors
///
/// - [`CryptoError::Decode`] if the ciphertext or nonce is not base64.
/// - [`CryptoError::Authentication`] if the tag does not verify.
/// - [`CryptoError::MalformedMessage`] if the plaintext is not a message.
pub fn open_message(key: &SessionKey, envelope: &SealedEnvelope) -> Result<ChatMessage, CryptoError> {
    let ciphertext = codec::text_to_buffer(&envelope.encrypted_content)?;
    let nonce = codec::text_to_buffer(&envelope.iv)?;

    let plaintext = cipher::decrypt(key, &ciphertext, &nonce)?;
    let mut message: ChatMessage = serde_json::from_slice(&plaintext)
        .map_err(|e| CryptoError::MalformedMessage(e.to_string()))?;

    if message.timestamp.is_none() {
        message.timestamp.clone_from(&envelope.timestamp);
    }
    if message.sender_id.is_none() {
        message.sender_id.clone_from(&envelope.sender_id);
    }
    if message.kind.is_none() {
        message.kind.clone_from(&envelope.kind);
    }
    message.decrypted = true;
    message.decryption_failed = false;

    Ok(message)
}

/// Seal `message` if a key is available, otherwise fall back to an explicit
/// plaintext envelope.
///
/// The fallback is logged at `warn` so the host can surface it.
#[must_use]
pub fn seal_or_plain(key: Option<&SessionKey>, message: &ChatMessage) -> Envelope {
    let Some(key) = key else {
        tracing::warn!(
            sender_id = message.sender_id.as_deref().unwrap_or(""),
            "no session key available, sending message unencrypted"
        );
        return Envelope::Plain(message.clone());
    };

    match seal_message(key, message) {
        Ok(sealed) => Envelope::Sealed(sealed),
        Err(e) => {
            tracing::warn!(error = %e, "sealing failed, sending message unencrypted");
            Envelope::Plain(message.clone())
        }
    }
}

/// Open `envelope`, turning any failure into an undecryptable placeholder.
#[must_use]
pub fn open_or_placeholder(key: &SessionKey, envelope: &SealedEnvelope) -> ChatMessage {
    match open_message(key, envelope) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(
                error = %e,
                sender_id = envelope.routing_sender_id().unwrap_or(""),
                "message could not be decrypted"
            );
            placeholder_for(envelope)
        }
    }
}

/// Turn whatever the transport delivered into a displayable message.
///
/// Plain envelopes pass through unchanged. Sealed envelopes are opened with
/// `key`; without a key they become placeholders.
#[must_use]
pub fn receive_envelope(key: Option<&SessionKey>, envelope: Envelope) -> ChatMessage {
    match envelope {
        Envelope::Plain(message) => message,
        Envelope::Sealed(sealed) => match key {
            Some(key) => open_or_placeholder(key, &sealed),
            None => {
                tracing::debug!("sealed envelope received before a session key was ready");
                placeholder_for(&sealed)
            }
        },
    }
}

fn placeholder_for(envelope: &SealedEnvelope) -> ChatMessage {
    let mut placeholder = ChatMessage::undecryptable(
        envelope.timestamp.clone(),
        envelope.sender_id.clone(),
        envelope.kind.clone(),
    );
    placeholder.fill_missing_from(&envelope.extra);
    placeholder
}
