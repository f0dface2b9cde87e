//! Envelope types exchanged with the chat transport.
//!
//! The transport forwards envelopes verbatim. A [`SealedEnvelope`] carries
//! the encrypted message body plus a few routing fields in the clear; an
//! [`Envelope::Plain`] is the explicit unencrypted fallback used when sealing
//! was not possible. The two are told apart structurally: an object carrying
//! both `encryptedContent` and `iv` is sealed, anything else is plain.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::message::ChatMessage;

/// Format tag written into every envelope sealed by this version.
pub const ENCRYPTION_VERSION: &str = "1.0";

fn default_encryption_version() -> String {
    ENCRYPTION_VERSION.to_string()
}

/// An encrypted chat message as it travels over the wire.
///
/// Only `encrypted_content` is confidential. The remaining fields are
/// routing metadata readable by anyone who sees the envelope, and they are
/// not covered by the authentication tag. Clear fields added by the
/// transport (`sender`, the web client's `sender_id`, ...) are kept in
/// `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedEnvelope {
    /// Base64 ciphertext with the authentication tag appended.
    pub encrypted_content: String,
    /// Base64 nonce used for this encryption.
    pub iv: String,
    /// ISO-8601 timestamp of the original message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Sender identifier, copied from the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    /// Classification tag, copied from the message.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Envelope format version.
    #[serde(default = "default_encryption_version")]
    pub encryption_version: String,
    /// Other clear fields present on the wire.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SealedEnvelope {
    /// Sender identifier, falling back to the legacy `sender_id` field.
    #[must_use]
    pub fn routing_sender_id(&self) -> Option<&str> {
        self.sender_id
            .as_deref()
            .or_else(|| self.extra.get("sender_id").and_then(Value::as_str))
    }
}

/// Anything the transport hands to or receives from the sealing layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    /// Encrypted message body with clear routing metadata.
    Sealed(SealedEnvelope),
    /// Explicitly unencrypted message.
    Plain(ChatMessage),
}

impl Envelope {
    /// Returns `true` if the envelope carries an encrypted body.
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        matches!(self, Self::Sealed(_))
    }

    /// Routing timestamp regardless of variant.
    #[must_use]
    pub fn timestamp(&self) -> Option<&str> {
        match self {
            Self::Sealed(sealed) => sealed.timestamp.as_deref(),
            Self::Plain(msg) => msg.timestamp.as_deref(),
        }
    }

    /// Sender identifier regardless of variant.
    #[must_use]
    pub fn sender_id(&self) -> Option<&str> {
        match self {
            Self::Sealed(sealed) => sealed.routing_sender_id(),
            Self::Plain(msg) => msg.sender_id.as_deref(),
        }
    }
}

impl From<SealedEnvelope> for Envelope {
    fn from(sealed: SealedEnvelope) -> Self {
        Self::Sealed(sealed)
    }
}

impl From<ChatMessage> for Envelope {
    fn from(msg: ChatMessage) -> Self {
        Self::Plain(msg)
    }
}
