// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Crypto Provider Port
//!
//! Domain-level contract for the cryptographic primitives the engine
//! depends on: random bytes, password-based key derivation, AES-256-GCM
//! authenticated encryption, SHA-256 checksums, and timing-safe comparison.
//!
//! The trait is **synchronous**: every operation is CPU-bound and
//! non-cancellable once started. Implementations size their parameters
//! (iteration counts, memory cost) so the worst case fits inside reasonable
//! operation deadlines. Async execution is an infrastructure concern;
//! callers that need it run the provider on a blocking thread.
//!
//! ## Key Material
//!
//! Derived and generated keys travel inside [`KeyMaterial`], which zeroizes
//! its bytes on drop so plaintext key bytes never outlive their use.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::value_objects::{timing_safe_eq, Checksum};
use crate::VaultError;

/// Symmetric key length for AES-256-GCM, in bytes.
pub const KEY_LEN: usize = 32;

/// IV length for AES-GCM, in bytes (96 bits).
pub const IV_LEN: usize = 12;

/// Salt length for key derivation, in bytes.
pub const SALT_LEN: usize = 32;

/// Default PBKDF2-HMAC-SHA-256 iteration count, and the floor below which
/// stored keys earn a weak-KDF warning on validation.
pub const PBKDF2_DEFAULT_ITERATIONS: u32 = 210_000;

/// Key derivation function selection with its tunable parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KdfAlgorithm {
    /// PBKDF2-HMAC-SHA-256 with a configurable iteration count
    Pbkdf2HmacSha256 { iterations: u32 },

    /// Argon2id, memory-hard, for deployments that request it
    Argon2id {
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    },
}

impl KdfAlgorithm {
    /// Default derivation parameters
    pub fn default_pbkdf2() -> Self {
        KdfAlgorithm::Pbkdf2HmacSha256 {
            iterations: PBKDF2_DEFAULT_ITERATIONS,
        }
    }

    /// The label persisted in the key row's `algorithm` column
    pub fn label(&self) -> &'static str {
        match self {
            KdfAlgorithm::Pbkdf2HmacSha256 { .. } => "PBKDF2-HMAC-SHA256",
            KdfAlgorithm::Argon2id { .. } => "Argon2id",
        }
    }

    /// The iteration count persisted alongside the label
    pub fn iterations(&self) -> u32 {
        match self {
            KdfAlgorithm::Pbkdf2HmacSha256 { iterations } => *iterations,
            KdfAlgorithm::Argon2id { iterations, .. } => *iterations,
        }
    }

    /// Reconstructs the KDF from its persisted label and iteration count
    pub fn from_label(label: &str, iterations: u32) -> Result<Self, VaultError> {
        match label {
            "PBKDF2-HMAC-SHA256" => Ok(KdfAlgorithm::Pbkdf2HmacSha256 { iterations }),
            "Argon2id" => Ok(KdfAlgorithm::Argon2id {
                memory_kib: 19 * 1024,
                iterations,
                parallelism: 1,
            }),
            other => Err(VaultError::UnsupportedAlgorithm(format!(
                "unknown key derivation algorithm {:?}",
                other
            ))),
        }
    }
}

/// Symmetric key bytes with automatic zeroization on drop.
#[derive(Clone)]
pub struct KeyMaterial {
    key: Vec<u8>,
}

impl Zeroize for KeyMaterial {
    fn zeroize(&mut self) {
        self.key.zeroize();
    }
}

impl ZeroizeOnDrop for KeyMaterial {}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl KeyMaterial {
    /// Wraps raw key bytes; the wrapper owns and later zeroizes them
    pub fn new(key: Vec<u8>) -> Self {
        Self { key }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key bytes
        write!(f, "KeyMaterial({} bytes)", self.key.len())
    }
}

/// Domain port for cryptographic primitives.
///
/// Implementations must be stateless and thread-safe; the engine shares one
/// provider across all requests.
pub trait CryptoProvider: Send + Sync {
    /// Returns `n` cryptographically-random bytes
    fn random_bytes(&self, n: usize) -> Result<Vec<u8>, VaultError>;

    /// Derives a 256-bit symmetric key from a password and salt
    fn derive_key(&self, password: &str, salt: &[u8], kdf: &KdfAlgorithm) -> Result<KeyMaterial, VaultError>;

    /// Encrypts with AES-256-GCM under a fresh random 96-bit IV.
    ///
    /// Returns `(ciphertext, iv)`; the authentication tag is appended to the
    /// ciphertext.
    fn encrypt(&self, plaintext: &[u8], key: &KeyMaterial) -> Result<(Vec<u8>, Vec<u8>), VaultError>;

    /// Decrypts AES-256-GCM ciphertext.
    ///
    /// Fails `DecryptionFailed` on authentication-tag mismatch, which is how
    /// a wrong password surfaces.
    fn decrypt(&self, ciphertext: &[u8], key: &KeyMaterial, iv: &[u8]) -> Result<Vec<u8>, VaultError>;

    /// SHA-256 of `bytes` as 64 lowercase hex chars
    fn sha256_hex(&self, bytes: &[u8]) -> String {
        Checksum::compute(bytes).as_str().to_string()
    }

    /// Constant-time equality for checksum and tag comparisons
    fn timing_safe_eq(&self, a: &[u8], b: &[u8]) -> bool {
        timing_safe_eq(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kdf_label_round_trip() {
        let kdf = KdfAlgorithm::default_pbkdf2();
        assert_eq!(kdf.iterations(), PBKDF2_DEFAULT_ITERATIONS);
        let back = KdfAlgorithm::from_label(kdf.label(), kdf.iterations()).unwrap();
        assert_eq!(kdf, back);

        assert!(KdfAlgorithm::from_label("bcrypt", 10).is_err());
    }

    #[test]
    fn test_key_material_debug_hides_bytes() {
        let material = KeyMaterial::new(vec![0xAA; KEY_LEN]);
        let rendered = format!("{:?}", material);
        assert!(!rendered.contains("aa"));
        assert!(rendered.contains("32 bytes"));
    }
}
