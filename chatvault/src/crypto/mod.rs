//! Cryptographic layer for `ChatVault`.
//!
//! Three pieces, leaf to root:
//!
//! - [`keys`] generates, exports and imports 256-bit session keys.
//! - [`cipher`] runs AES-256-GCM with a fresh random nonce per call.
//! - [`seal`] turns [`ChatMessage`](chatvault_proto::message::ChatMessage)
//!   values into sealed envelopes and back.
//!
//! The seal/open boundary is the only place where message plaintext and key
//! material meet. Everything the transport sees has already been sealed.

pub mod cipher;
pub mod keys;
pub mod seal;

use chatvault_proto::codec::CodecError;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Transport text (ciphertext, nonce) was not valid base64.
    #[error("decode failed: {0}")]
    Decode(String),

    /// The OS random source could not produce key material.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// The key cannot be exported (it was created non-extractable).
    #[error("key export failed: {0}")]
    KeyExport(String),

    /// Serialized key material is malformed or has the wrong length.
    #[error("key import failed: {0}")]
    KeyImport(String),

    /// The AEAD primitive or its nonce source failed.
    #[error("encryption failed: {0}")]
    Cipher(String),

    /// The authentication tag did not verify (tampered data, wrong key, or
    /// wrong nonce). The ciphertext must not be trusted.
    #[error("authentication failed — ciphertext cannot be trusted")]
    Authentication,

    /// Decrypted plaintext is not a valid chat message.
    #[error("malformed message: {0}")]
    MalformedMessage(String),
}

impl From<CodecError> for CryptoError {
    fn from(err: CodecError) -> Self {
        Self::Decode(err.to_string())
    }
}
