//! Password-based authenticated encryption for export payloads.
//!
//! Sealed layout: `salt(16) || nonce(12) || ciphertext || tag(16)`.
//! The key is PBKDF2-HMAC-SHA256(password, salt) and the cipher AES-256-GCM.

use super::CryptoError;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const TAG_LEN: usize = 16;

/// Encrypts `plaintext` under a key derived from `password`.
pub fn seal(password: &str, plaintext: &[u8], iterations: u32) -> Result<Vec<u8>, CryptoError> {
    let mut rng = rand::thread_rng();
    let mut salt = [0u8; SALT_LEN];
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut nonce_bytes);

    let cipher = cipher_for(password, &salt, iterations)?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|err| CryptoError::Cipher(err.to_string()))?;

    let mut sealed = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&salt);
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypts a block produced by [`seal`].
pub fn open(password: &str, sealed: &[u8], iterations: u32) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < SALT_LEN + NONCE_LEN + TAG_LEN {
        return Err(CryptoError::TruncatedBlock);
    }

    let (salt, rest) = sealed.split_at(SALT_LEN);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);
    let cipher = cipher_for(password, salt, iterations)?;
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

fn cipher_for(password: &str, salt: &[u8], iterations: u32) -> Result<Aes256Gcm, CryptoError> {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations.max(1), &mut key);
    Aes256Gcm::new_from_slice(&key).map_err(|err| CryptoError::Cipher(err.to_string()))
}
