// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Crypto Provider Implementation
//!
//! Concrete [`CryptoProvider`] backed by `ring` (randomness, PBKDF2,
//! constant-time comparison), the `aes-gcm` crate (AES-256-GCM), and the
//! `argon2` crate (Argon2id). All operations are synchronous and CPU-bound;
//! the provider is stateless and shared across requests.
//!
//! ## Algorithm Parameters
//!
//! - **AES-256-GCM**: 32-byte keys, 12-byte IVs, authentication tag
//!   appended to the ciphertext
//! - **PBKDF2-HMAC-SHA-256**: default 210,000 iterations, 256-bit output
//! - **Argon2id**: configurable memory/iterations/parallelism, 256-bit
//!   output
//!
//! A wrong password surfaces as an authentication-tag mismatch during
//! unwrap, i.e. `DecryptionFailed`; the engine never stores anything that
//! would let it distinguish "wrong password" from "tampered ciphertext".

use aes_gcm::{AeadInPlace, Aes256Gcm, Key, KeyInit, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use ring::rand::{SecureRandom, SystemRandom};

use vault_domain::services::{CryptoProvider, KdfAlgorithm, KeyMaterial, IV_LEN, KEY_LEN};
use vault_domain::VaultError;

/// Crypto provider backed by `ring`, `aes-gcm`, and `argon2`.
pub struct RingCryptoProvider {
    rng: SystemRandom,
}

impl Default for RingCryptoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl RingCryptoProvider {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }

    /// Derives a key using PBKDF2 with SHA-256
    fn derive_pbkdf2(&self, password: &[u8], salt: &[u8], iterations: u32) -> Result<Vec<u8>, VaultError> {
        let mut key = vec![0u8; KEY_LEN];
        ring::pbkdf2::derive(
            ring::pbkdf2::PBKDF2_HMAC_SHA256,
            std::num::NonZeroU32::new(iterations)
                .ok_or_else(|| VaultError::InternalError("invalid iteration count".to_string()))?,
            salt,
            password,
            &mut key,
        );
        Ok(key)
    }

    /// Derives a key using Argon2id
    fn derive_argon2id(
        &self,
        password: &[u8],
        salt: &[u8],
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    ) -> Result<Vec<u8>, VaultError> {
        let params = Params::new(memory_kib, iterations, parallelism, Some(KEY_LEN))
            .map_err(|e| VaultError::InternalError(format!("invalid Argon2id parameters: {}", e)))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let mut key = vec![0u8; KEY_LEN];
        argon2
            .hash_password_into(password, salt, &mut key)
            .map_err(|e| VaultError::InternalError(format!("Argon2id key derivation failed: {}", e)))?;
        Ok(key)
    }
}

impl CryptoProvider for RingCryptoProvider {
    fn random_bytes(&self, n: usize) -> Result<Vec<u8>, VaultError> {
        let mut bytes = vec![0u8; n];
        self.rng
            .fill(&mut bytes)
            .map_err(|e| VaultError::InternalError(format!("failed to generate random bytes: {:?}", e)))?;
        Ok(bytes)
    }

    fn derive_key(&self, password: &str, salt: &[u8], kdf: &KdfAlgorithm) -> Result<KeyMaterial, VaultError> {
        let key = match kdf {
            KdfAlgorithm::Pbkdf2HmacSha256 { iterations } => {
                self.derive_pbkdf2(password.as_bytes(), salt, *iterations)?
            }
            KdfAlgorithm::Argon2id {
                memory_kib,
                iterations,
                parallelism,
            } => self.derive_argon2id(password.as_bytes(), salt, *memory_kib, *iterations, *parallelism)?,
        };
        Ok(KeyMaterial::new(key))
    }

    fn encrypt(&self, plaintext: &[u8], key: &KeyMaterial) -> Result<(Vec<u8>, Vec<u8>), VaultError> {
        if key.len() != KEY_LEN {
            return Err(VaultError::InternalError(format!(
                "AES-256-GCM requires a {}-byte key",
                KEY_LEN
            )));
        }
        let iv = self.random_bytes(IV_LEN)?;

        let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_slice());
        let cipher = Aes256Gcm::new(cipher_key);
        let nonce = Nonce::from_slice(&iv);

        let mut buffer = plaintext.to_vec();
        cipher
            .encrypt_in_place(nonce, b"", &mut buffer)
            .map_err(|e| VaultError::InternalError(format!("AES-256-GCM encryption failed: {:?}", e)))?;

        Ok((buffer, iv))
    }

    fn decrypt(&self, ciphertext: &[u8], key: &KeyMaterial, iv: &[u8]) -> Result<Vec<u8>, VaultError> {
        if key.len() != KEY_LEN {
            return Err(VaultError::InternalError(format!(
                "AES-256-GCM requires a {}-byte key",
                KEY_LEN
            )));
        }
        if iv.len() != IV_LEN {
            return Err(VaultError::decryption_failed(format!(
                "AES-GCM requires a {}-byte IV, got {}",
                IV_LEN,
                iv.len()
            )));
        }

        let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_slice());
        let cipher = Aes256Gcm::new(cipher_key);
        let nonce = Nonce::from_slice(iv);

        let mut buffer = ciphertext.to_vec();
        cipher
            .decrypt_in_place(nonce, b"", &mut buffer)
            .map_err(|_| VaultError::decryption_failed("authentication tag mismatch"))?;

        Ok(buffer)
    }

    fn timing_safe_eq(&self, a: &[u8], b: &[u8]) -> bool {
        ring::constant_time::verify_slices_are_equal(a, b).is_ok()
    }
}
