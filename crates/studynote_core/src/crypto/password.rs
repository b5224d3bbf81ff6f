//! Salted password digests and input policy.
//!
//! # Responsibility
//! - Generate random salts.
//! - Derive PBKDF2-HMAC-SHA256 digests over one or more salts.
//! - Enforce the minimum password length at input time.
//!
//! # Invariants
//! - Multi-salt digests concatenate decoded salts in the given order.
//! - An empty password maps to an empty digest ("no password").
//! - Verification compares digests in constant time.

use super::CryptoError;
use crate::model::project::PasswordDigest;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use std::error::Error;
use std::fmt::{Display, Formatter};
use subtle::ConstantTimeEq;

/// Minimum length, in characters, of any non-empty password.
pub const MIN_PASSWORD_CHARS: usize = 8;
/// Iteration count used when configuration does not override it.
pub const DEFAULT_HASH_ITERATIONS: u32 = 100_000;

const SALT_BYTES: usize = 16;
const DIGEST_BYTES: usize = 32;

/// Rejection reasons for user-supplied passwords.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordPolicyError {
    Required,
    TooShort { min_chars: usize, actual_chars: usize },
}

impl Display for PasswordPolicyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Required => write!(f, "password is required"),
            Self::TooShort { min_chars, .. } => {
                write!(f, "password must be at least {min_chars} characters")
            }
        }
    }
}

impl Error for PasswordPolicyError {}

/// Checks a newly entered password.
///
/// Empty input passes only when `optional` is set.
pub fn check_new_password(password: &str, optional: bool) -> Result<(), PasswordPolicyError> {
    if password.is_empty() {
        return if optional {
            Ok(())
        } else {
            Err(PasswordPolicyError::Required)
        };
    }

    let actual_chars = password.chars().count();
    if actual_chars < MIN_PASSWORD_CHARS {
        return Err(PasswordPolicyError::TooShort {
            min_chars: MIN_PASSWORD_CHARS,
            actual_chars,
        });
    }
    Ok(())
}

/// PBKDF2 password hasher with a fixed iteration count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordHasher {
    iterations: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_ITERATIONS)
    }
}

impl PasswordHasher {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Returns a fresh random salt as lowercase hex.
    pub fn generate_salt(&self) -> String {
        let mut salt = [0u8; SALT_BYTES];
        rand::thread_rng().fill_bytes(&mut salt);
        hex::encode(salt)
    }

    /// Hashes `password` over the concatenation of `salts`.
    pub fn hash(&self, password: &str, salts: &[&str]) -> Result<String, CryptoError> {
        let mut salt_bytes = Vec::with_capacity(salts.len() * SALT_BYTES);
        for salt in salts {
            let decoded = hex::decode(salt).map_err(|_| CryptoError::InvalidEncoding("salt"))?;
            salt_bytes.extend_from_slice(&decoded);
        }

        let mut digest = [0u8; DIGEST_BYTES];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt_bytes, self.iterations, &mut digest);
        Ok(hex::encode(digest))
    }

    /// Builds a stored digest for `password` with a new salt.
    ///
    /// `extra_salts` are appended after the generated salt, e.g. the project
    /// salt for member passwords.
    pub fn digest(&self, password: &str, extra_salts: &[&str]) -> Result<PasswordDigest, CryptoError> {
        if password.is_empty() {
            return Ok(PasswordDigest::none());
        }

        let salt = self.generate_salt();
        let mut salts = Vec::with_capacity(extra_salts.len() + 1);
        salts.push(salt.as_str());
        salts.extend_from_slice(extra_salts);
        let hash = self.hash(password, &salts)?;
        Ok(PasswordDigest { salt, hash })
    }

    /// Verifies `password` against `stored_hash` derived from `salts`.
    ///
    /// With no stored hash, only an empty password verifies.
    pub fn verify(
        &self,
        password: &str,
        salts: &[&str],
        stored_hash: &str,
    ) -> Result<bool, CryptoError> {
        if stored_hash.is_empty() {
            return Ok(password.is_empty());
        }

        let expected =
            hex::decode(stored_hash).map_err(|_| CryptoError::InvalidEncoding("password hash"))?;
        let actual = hex::decode(self.hash(password, salts)?)
            .map_err(|_| CryptoError::InvalidEncoding("password hash"))?;
        Ok(expected.ct_eq(&actual).into())
    }
}
