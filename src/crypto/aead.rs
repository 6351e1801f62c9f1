/// XChaCha20-Poly1305 AEAD for secret envelopes.
///
/// Nonces are 24 bytes and generated uniformly at random for every seal;
/// that size is large enough that random generation carries no practical
/// collision risk. Nonces are stored next to their ciphertext, so both
/// seal and open take the nonce explicitly.
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::crypto::sensitive::SensitiveBytes32;
use crate::error::{Result, VaultError};

pub const NONCE_LEN: usize = 24;
pub const KEY_LEN: usize = 32;
pub const TAG_LEN: usize = 16;

/// Fill `buf` from the platform CSPRNG. Fails closed: a short or failed
/// read surfaces as `EntropyFailed` and the operation aborts.
pub fn random_bytes(buf: &mut [u8]) -> Result<()> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|_| VaultError::EntropyFailed)
}

/// Generate a random 256-bit symmetric key.
pub fn generate_key() -> Result<SensitiveBytes32> {
    let mut key = [0u8; KEY_LEN];
    random_bytes(&mut key)?;
    Ok(SensitiveBytes32::new(key))
}

/// Generate a random 24-byte nonce. Fresh randomness on every call,
/// never cached, never counter-derived.
pub fn generate_nonce() -> Result<[u8; NONCE_LEN]> {
    let mut nonce = [0u8; NONCE_LEN];
    random_bytes(&mut nonce)?;
    Ok(nonce)
}

/// Authenticated symmetric encryption. The ciphertext is the plaintext
/// plus a 16-byte Poly1305 tag.
pub fn seal_sym(
    key: &SensitiveBytes32,
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    cipher
        .encrypt(XNonce::from_slice(nonce), plaintext)
        .map_err(|_| VaultError::InvalidInput("message too large"))
}

/// Authenticated symmetric decryption. Wrong key, tampered ciphertext or
/// truncated data all fail the tag check; the caller sees no partial
/// plaintext.
pub fn open_sym(
    key: &SensitiveBytes32,
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| VaultError::DecryptFailed)
}
