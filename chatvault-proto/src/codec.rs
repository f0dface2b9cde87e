//! Transport-safe text encoding for binary buffers and envelopes.
//!
//! Ciphertext, nonces and exported key material all travel inside JSON
//! envelopes or durable key-value stores, so they are carried as standard
//! base64 (RFC 4648 alphabet, with padding). Envelopes themselves are JSON.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::envelope::Envelope;

/// Error type for codec decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The input is not valid base64 (bad alphabet, truncated padding,
    /// impossible length).
    #[error("invalid base64 text: {0}")]
    Decode(String),
    /// Envelope JSON could not be produced or parsed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Encodes a byte buffer as base64 text.
///
/// Total: every buffer, including the empty one, has an encoding.
#[must_use]
pub fn buffer_to_text(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decodes base64 text back into the original byte buffer.
///
/// # Errors
///
/// Returns `CodecError::Decode` if `text` is not canonical padded base64.
pub fn text_to_buffer(text: &str) -> Result<Vec<u8>, CodecError> {
    STANDARD
        .decode(text)
        .map_err(|e| CodecError::Decode(e.to_string()))
}

/// Encodes an [`Envelope`] as the JSON text handed to the transport.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the envelope cannot be serialized.
pub fn encode_envelope(envelope: &Envelope) -> Result<String, CodecError> {
    serde_json::to_string(envelope).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes an [`Envelope`] from transport JSON.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the text is neither a sealed
/// envelope nor a plain message.
pub fn decode_envelope(text: &str) -> Result<Envelope, CodecError> {
    serde_json::from_str(text).map_err(|e| CodecError::Serialization(e.to_string()))
}
