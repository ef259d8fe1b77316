// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Checksum Value Object
//!
//! SHA-256 checksum over persisted payload bytes, carried as 64 lowercase hex
//! characters. Integrity verification is the first step of every read path,
//! so the comparison is timing-safe.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::{self, Display};

use crate::VaultError;

/// SHA-256 checksum in lowercase hex form.
///
/// Equality via `==` is derived (and fine for hash-map keys); use
/// [`Checksum::verify`] on untrusted input so the comparison does not leak
/// prefix-length timing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    /// Computes the checksum of the given bytes
    pub fn compute(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(hex::encode(digest))
    }

    /// Wraps an existing 64-char hex digest, validating the format
    pub fn parse(s: &str) -> Result<Self, VaultError> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(VaultError::IntegrityFailed(format!(
                "malformed checksum {:?}",
                s
            )));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Verifies that `bytes` hash to this checksum, in constant time.
    pub fn verify(&self, bytes: &[u8]) -> Result<(), VaultError> {
        let actual = Self::compute(bytes);
        if timing_safe_eq(self.0.as_bytes(), actual.0.as_bytes()) {
            Ok(())
        } else {
            Err(VaultError::IntegrityFailed(format!(
                "checksum mismatch: stored {}.., computed {}..",
                &self.0[..8.min(self.0.len())],
                &actual.0[..8]
            )))
        }
    }

    /// Gets the hex string form
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Constant-time byte-slice equality for checksum and tag comparisons.
///
/// Length mismatch returns early; for equal lengths every byte is inspected.
pub fn timing_safe_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_is_64_lowercase_hex() {
        let sum = Checksum::compute(b"hello");
        assert_eq!(sum.as_str().len(), 64);
        assert_eq!(sum.as_str(), sum.as_str().to_ascii_lowercase());
        // Known SHA-256 of "hello"
        assert_eq!(
            sum.as_str(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_verify_detects_single_byte_change() {
        let data = b"workspace state".to_vec();
        let sum = Checksum::compute(&data);
        sum.verify(&data).unwrap();

        let mut tampered = data.clone();
        tampered[3] ^= 0x01;
        assert!(matches!(
            sum.verify(&tampered),
            Err(VaultError::IntegrityFailed(_))
        ));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Checksum::parse("abc").is_err());
        assert!(Checksum::parse(&"g".repeat(64)).is_err());
    }

    #[test]
    fn test_timing_safe_eq() {
        assert!(timing_safe_eq(b"abc", b"abc"));
        assert!(!timing_safe_eq(b"abc", b"abd"));
        assert!(!timing_safe_eq(b"abc", b"ab"));
    }
}
