//! Session key lifecycle for `ChatVault`.
//!
//! A [`SessionKey`] is a 256-bit AES-GCM key. Raw bytes leave this module
//! only through [`export_key`], which exists so the session registry can
//! persist keys across restarts.

use rand_core::{OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use chatvault_proto::codec;

use super::CryptoError;

/// Length of a session key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Default size of tokens produced by [`generate_random_token`], in bytes.
pub const DEFAULT_TOKEN_BYTES: usize = 32;

/// A symmetric AES-256-GCM key bound to one chat session.
///
/// Key material is zeroized on drop and never printed by `Debug`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey {
    bytes: [u8; KEY_LEN],
    #[zeroize(skip)]
    extractable: bool,
}

impl SessionKey {
    /// Build an extractable key from raw material.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            bytes,
            extractable: true,
        }
    }

    /// Build a key that [`export_key`] refuses to serialize.
    #[must_use]
    pub const fn non_extractable(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            bytes,
            extractable: false,
        }
    }

    /// Whether the key may be exported for storage.
    #[must_use]
    pub const fn is_extractable(&self) -> bool {
        self.extractable
    }

    pub(crate) const fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey")
            .field("bytes", &"<redacted>")
            .field("extractable", &self.extractable)
            .finish()
    }
}

/// Generate a fresh session key from the OS CSPRNG.
///
/// # Errors
///
/// Returns [`CryptoError::KeyGeneration`] if the OS random source fails.
pub fn generate_key() -> Result<SessionKey, CryptoError> {
    let mut bytes = [0u8; KEY_LEN];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
    let key = SessionKey::from_bytes(bytes);
    bytes.zeroize();
    Ok(key)
}

/// Serialize raw key material as base64 text.
///
/// # Errors
///
/// Returns [`CryptoError::KeyExport`] if the key is non-extractable.
pub fn export_key(key: &SessionKey) -> Result<String, CryptoError> {
    if !key.is_extractable() {
        return Err(CryptoError::KeyExport(
            "key was created non-extractable".to_string(),
        ));
    }
    Ok(codec::buffer_to_text(key.as_bytes()))
}

/// Rebuild a key from text produced by [`export_key`].
///
/// # Errors
///
/// Returns [`CryptoError::KeyImport`] if the text is not base64 or does not
/// decode to exactly 32 bytes.
pub fn import_key(text: &str) -> Result<SessionKey, CryptoError> {
    let mut material =
        codec::text_to_buffer(text).map_err(|e| CryptoError::KeyImport(e.to_string()))?;

    if material.len() != KEY_LEN {
        let len = material.len();
        material.zeroize();
        return Err(CryptoError::KeyImport(format!(
            "key material must be {KEY_LEN} bytes, got {len}"
        )));
    }

    let mut bytes = [0u8; KEY_LEN];
    bytes.copy_from_slice(&material);
    material.zeroize();
    let key = SessionKey::from_bytes(bytes);
    bytes.zeroize();
    Ok(key)
}

/// Create a random token of `len` bytes rendered as lowercase hex.
///
/// # Errors
///
/// Returns [`CryptoError::KeyGeneration`] if the OS random source fails.
pub fn generate_random_token(len: usize) -> Result<String, CryptoError> {
    use std::fmt::Write;

    let mut buf = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
    Ok(buf.iter().fold(String::with_capacity(len * 2), |mut output, b| {
        let _ = write!(output, "{b:02x}");
        output
    }))
}
