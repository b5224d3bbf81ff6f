//! Password hashing and symmetric encryption primitives.
//!
//! # Responsibility
//! - Generate salts and derive salted password digests.
//! - Seal/open export payloads with a password-derived key.
//!
//! # Invariants
//! - Plaintext passwords never leave the call that received them.
//! - Nothing in this module logs key material, salts or digests.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod cipher;
pub mod password;

/// Failures raised by crypto helpers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Stored salt or hash is not valid hex.
    InvalidEncoding(&'static str),
    /// Sealed block is shorter than its fixed header.
    TruncatedBlock,
    /// Authentication tag mismatch: wrong password or tampered data.
    DecryptionFailed,
    /// Cipher backend rejected the operation.
    Cipher(String),
}

impl Display for CryptoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEncoding(field) => write!(f, "invalid hex encoding in {field}"),
            Self::TruncatedBlock => write!(f, "encrypted block is truncated"),
            Self::DecryptionFailed => write!(f, "decryption failed"),
            Self::Cipher(message) => write!(f, "cipher error: {message}"),
        }
    }
}

impl Error for CryptoError {}
