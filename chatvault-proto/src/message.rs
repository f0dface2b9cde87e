//! Plaintext chat message shape shared with the chat UI.
//!
//! A [`ChatMessage`] is what the UI hands to the sealing layer and what it
//! gets back after a successful (or failed) decryption. The JSON field names
//! match the ones the UI already produces (`senderId`, `senderName`, `type`),
//! and any extra fields the UI attaches are carried through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Text shown in place of a message body that could not be decrypted.
pub const UNDECRYPTABLE_TEXT: &str =
    "This message cannot be decrypted. It may have been encrypted with a different key.";

/// Current time as an ISO-8601 / RFC 3339 string with millisecond precision
/// in UTC (for example `2026-10-19T08:15:30.123Z`).
#[must_use]
pub fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// JSON names owned by typed [`ChatMessage`] fields. None of these may
/// appear in [`ChatMessage::extra`].
pub const MESSAGE_FIELDS: [&str; 8] = [
    "text",
    "sender",
    "senderId",
    "senderName",
    "timestamp",
    "type",
    "decrypted",
    "decryptionFailed",
];

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(value: &bool) -> bool {
    !*value
}

/// An application-level chat message.
///
/// Only `text` is required. Optional fields that are absent stay absent when
/// serialized, so a message survives a JSON round-trip field for field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message body.
    pub text: String,
    /// Display role of the sender (`client`, `support`, `system`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// Stable sender identifier used for routing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    /// Human-readable sender name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    /// ISO-8601 creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Message classification tag.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Set on messages produced by successful decryption.
    #[serde(default, skip_serializing_if = "is_false")]
    pub decrypted: bool,
    /// Set on placeholders standing in for a message that failed to decrypt.
    #[serde(default, skip_serializing_if = "is_false")]
    pub decryption_failed: bool,
    /// Any other fields the caller attached. Must not use a name from
    /// [`MESSAGE_FIELDS`].
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    /// Creates a message with the given body and no metadata.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Sets the sender role.
    #[must_use]
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Sets the sender identifier.
    #[must_use]
    pub fn with_sender_id(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = Some(sender_id.into());
        self
    }

    /// Sets the sender display name.
    #[must_use]
    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = Some(name.into());
        self
    }

    /// Sets the creation timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Sets the classification tag.
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Attaches an extra caller-defined field.
    ///
    /// A name from [`MESSAGE_FIELDS`] sets the typed field instead, provided
    /// the value has the matching JSON type (string, `null` for an optional
    /// field, bool for a flag). A mistyped value is kept in `extra`, where
    /// sealing rejects it.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if !self.set_typed_field(&key, &value) {
            self.extra.insert(key, value);
        }
        self
    }

    /// First `extra` entry whose name collides with a typed field.
    ///
    /// Such a message would serialize with a duplicate key and could not be
    /// read back.
    #[must_use]
    pub fn shadowed_field(&self) -> Option<&str> {
        self.extra
            .keys()
            .map(String::as_str)
            .find(|name| MESSAGE_FIELDS.contains(name))
    }

    /// Fill absent metadata from loose JSON fields, such as the clear fields
    /// of a received envelope.
    ///
    /// Present fields are never overwritten, and `text` and the provenance
    /// flags are never taken from `fields`. The legacy `sender_id` spelling
    /// is accepted for `senderId`. Unknown names are added to `extra`.
    pub fn fill_missing_from(&mut self, fields: &Map<String, Value>) {
        for (name, value) in fields {
            let slot = match name.as_str() {
                "sender" => &mut self.sender,
                "senderId" | "sender_id" => &mut self.sender_id,
                "senderName" => &mut self.sender_name,
                "timestamp" => &mut self.timestamp,
                "type" => &mut self.kind,
                "text" | "decrypted" | "decryptionFailed" => continue,
                _ => {
                    self.extra
                        .entry(name.clone())
                        .or_insert_with(|| value.clone());
                    continue;
                }
            };
            if slot.is_none() {
                *slot = value.as_str().map(str::to_owned);
            }
        }
    }

    fn set_typed_field(&mut self, name: &str, value: &Value) -> bool {
        let slot = match name {
            "text" => {
                let Some(text) = value.as_str() else {
                    return false;
                };
                self.text = text.to_owned();
                return true;
            }
            "decrypted" | "decryptionFailed" => {
                let Some(flag) = value.as_bool() else {
                    return false;
                };
                if name == "decrypted" {
                    self.decrypted = flag;
                } else {
                    self.decryption_failed = flag;
                }
                return true;
            }
            "sender" => &mut self.sender,
            "senderId" => &mut self.sender_id,
            "senderName" => &mut self.sender_name,
            "timestamp" => &mut self.timestamp,
            "type" => &mut self.kind,
            _ => return false,
        };
        match value {
            Value::String(text) => *slot = Some(text.clone()),
            Value::Null => *slot = None,
            _ => return false,
        }
        true
    }

    /// Builds the placeholder shown when a sealed message cannot be opened.
    ///
    /// Routing metadata is kept so the UI can still place the entry in the
    /// conversation.
    #[must_use]
    pub fn undecryptable(
        timestamp: Option<String>,
        sender_id: Option<String>,
        kind: Option<String>,
    ) -> Self {
        Self {
            text: UNDECRYPTABLE_TEXT.to_string(),
            sender_id,
            timestamp,
            kind,
            decryption_failed: true,
            ..Self::default()
        }
    }
}
