//! AES-256-GCM with a random 96-bit nonce per call.
//!
//! Key size: 32 bytes. Nonce: 12 bytes (random, from the OS CSPRNG).
//! Tag: 16 bytes, appended to the ciphertext.
//!
//! Nonces are never derived or counted, so uniqueness under one key rests on
//! the random draw. At 2^32 messages per key the collision probability is
//! about 2^-33, far beyond the volume of a single chat session.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand_core::{OsRng, RngCore};

use super::CryptoError;
use super::keys::SessionKey;

/// Nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Output of [`encrypt`]: ciphertext with embedded tag and the nonce used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ciphertext {
    /// Ciphertext followed by the 16-byte tag.
    pub bytes: Vec<u8>,
    /// Nonce that must accompany the ciphertext.
    pub nonce: [u8; NONCE_LEN],
}

fn cipher_for(key: &SessionKey) -> Result<Aes256Gcm, CryptoError> {
    Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|e| CryptoError::Cipher(e.to_string()))
}

/// Encrypt `plaintext` under `key` with a freshly drawn nonce.
///
/// # Errors
///
/// Returns [`CryptoError::Cipher`] if the nonce cannot be drawn or the AEAD
/// transform fails.
pub fn encrypt(key: &SessionKey, plaintext: &[u8]) -> Result<Ciphertext, CryptoError> {
    let cipher = cipher_for(key)?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| CryptoError::Cipher(format!("nonce generation: {e}")))?;

    let bytes = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::Cipher("AEAD encryption failed".to_string()))?;

    Ok(Ciphertext { bytes, nonce })
}

/// Decrypt and verify `ciphertext` produced by [`encrypt`].
///
/// # Errors
///
/// Returns [`CryptoError::Authentication`] if the tag does not verify or the
/// nonce is not 12 bytes. No partial plaintext is ever returned.
pub fn decrypt(key: &SessionKey, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if nonce.len() != NONCE_LEN || ciphertext.len() < TAG_LEN {
        return Err(CryptoError::Authentication);
    }
    let cipher = cipher_for(key)?;

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Authentication)
}
