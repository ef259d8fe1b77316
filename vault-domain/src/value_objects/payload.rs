// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Payload Envelope Types
//!
//! Typed on-disk encodings for serialized workspace state.
//!
//! Two layers compose here:
//!
//! 1. [`SerializedPayload`] — the inner encoding, a sum type discriminated by
//!    a `kind` field: either a full state or a delta against a previously
//!    stored base state. This replaces the legacy side-channel convention of
//!    mixing `_delta`/`_baseState` keys into the state mapping itself.
//! 2. [`EncryptedEnvelope`] — the outer encoding used when encryption is on:
//!    base64 ciphertext, IV, and salt plus an algorithm tag. Any unknown
//!    algorithm on read fails `UnsupportedAlgorithm` before a single byte of
//!    ciphertext is touched.
//!
//! When encryption is off, the persisted payload is the compressed (or raw)
//! bytes directly and the stored checksum covers that same byte sequence.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{self, Display};
use std::str::FromStr;

use crate::value_objects::Checksum;
use crate::VaultError;

/// Algorithm tag persisted for encrypted payloads.
pub const AES_GCM_LABEL: &str = "AES-GCM";

/// Encryption algorithm recorded on a session row, used to dispatch on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionAlgorithm {
    AesGcm,
    None,
}

impl EncryptionAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncryptionAlgorithm::AesGcm => AES_GCM_LABEL,
            EncryptionAlgorithm::None => "none",
        }
    }
}

impl Display for EncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EncryptionAlgorithm {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            AES_GCM_LABEL => Ok(EncryptionAlgorithm::AesGcm),
            "none" => Ok(EncryptionAlgorithm::None),
            other => Err(VaultError::UnsupportedAlgorithm(format!(
                "unknown encryption algorithm {:?}",
                other
            ))),
        }
    }
}

/// Compression algorithm recorded on a session row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionAlgorithm {
    Gzip,
    None,
}

impl CompressionAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionAlgorithm::Gzip => "gzip",
            CompressionAlgorithm::None => "none",
        }
    }
}

impl Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CompressionAlgorithm {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gzip" => Ok(CompressionAlgorithm::Gzip),
            "none" => Ok(CompressionAlgorithm::None),
            other => Err(VaultError::UnsupportedAlgorithm(format!(
                "unknown compression algorithm {:?}",
                other
            ))),
        }
    }
}

/// Per-sequence change summary recorded in a delta payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceChange {
    /// Wire name of the changed sequence (`terminals`, `browserTabs`, ...)
    pub field: String,
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
}

impl SequenceChange {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.modified == 0
    }
}

/// Inner payload encoding: a full state or a delta against a base state.
///
/// Deltas are diagnostic: applying one verifies the base checksum and then
/// yields the base state together with the reported changes. The stores
/// persist full payloads; a delta whose `base_checksum` does not match the
/// base it is applied against fails `BaseStateMismatch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SerializedPayload {
    Full {
        state: Value,
    },
    Delta {
        base_checksum: Checksum,
        new_checksum: Checksum,
        changes: Vec<SequenceChange>,
    },
}

impl SerializedPayload {
    /// Encodes the payload to its canonical JSON byte form
    pub fn to_bytes(&self) -> Result<Vec<u8>, VaultError> {
        serde_json::to_vec(self).map_err(VaultError::from)
    }

    /// Decodes a payload from its JSON byte form
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VaultError> {
        serde_json::from_slice(bytes)
            .map_err(|e| VaultError::Corrupted(format!("payload envelope did not parse: {}", e)))
    }

    pub fn is_delta(&self) -> bool {
        matches!(self, SerializedPayload::Delta { .. })
    }
}

/// Outer envelope persisted when encryption is on.
///
/// All three byte fields are base64; `algorithm` must equal `"AES-GCM"` on
/// read or the payload is rejected with `UnsupportedAlgorithm`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub data: String,
    pub iv: String,
    pub salt: String,
    pub algorithm: String,
}

impl EncryptedEnvelope {
    /// Seals ciphertext, IV, and salt into an envelope
    pub fn seal(ciphertext: &[u8], iv: &[u8], salt: &[u8]) -> Self {
        Self {
            data: BASE64.encode(ciphertext),
            iv: BASE64.encode(iv),
            salt: BASE64.encode(salt),
            algorithm: AES_GCM_LABEL.to_string(),
        }
    }

    /// Encodes the envelope to its persisted JSON byte form
    pub fn to_bytes(&self) -> Result<Vec<u8>, VaultError> {
        serde_json::to_vec(self).map_err(VaultError::from)
    }

    /// Decodes an envelope from its persisted JSON byte form
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VaultError> {
        serde_json::from_slice(bytes)
            .map_err(|e| VaultError::Corrupted(format!("encrypted envelope did not parse: {}", e)))
    }

    /// Opens the envelope, validating the algorithm tag and decoding the
    /// base64 fields. Returns `(ciphertext, iv, salt)`.
    pub fn open(&self) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>), VaultError> {
        if self.algorithm != AES_GCM_LABEL {
            return Err(VaultError::UnsupportedAlgorithm(format!(
                "unknown payload algorithm {:?}",
                self.algorithm
            )));
        }
        let decode = |field: &str, value: &str| {
            BASE64
                .decode(value)
                .map_err(|e| VaultError::Corrupted(format!("envelope field {} is not base64: {}", field, e)))
        };
        Ok((
            decode("data", &self.data)?,
            decode("iv", &self.iv)?,
            decode("salt", &self.salt)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_kind_discriminator() {
        let full = SerializedPayload::Full { state: json!({"terminals": []}) };
        let bytes = full.to_bytes().unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["kind"], "full");

        let delta = SerializedPayload::Delta {
            base_checksum: Checksum::compute(b"base"),
            new_checksum: Checksum::compute(b"new"),
            changes: vec![SequenceChange { field: "terminals".into(), added: 1, removed: 0, modified: 0 }],
        };
        let value: Value = serde_json::from_slice(&delta.to_bytes().unwrap()).unwrap();
        assert_eq!(value["kind"], "delta");

        let decoded = SerializedPayload::from_bytes(&delta.to_bytes().unwrap()).unwrap();
        assert!(decoded.is_delta());
    }

    #[test]
    fn test_envelope_round_trip() {
        let envelope = EncryptedEnvelope::seal(b"ciphertext", b"twelve-bytes", b"thirty-two-byte-salt-goes-here!!");
        let bytes = envelope.to_bytes().unwrap();
        let reopened = EncryptedEnvelope::from_bytes(&bytes).unwrap();
        let (data, iv, salt) = reopened.open().unwrap();
        assert_eq!(data, b"ciphertext");
        assert_eq!(iv, b"twelve-bytes");
        assert_eq!(salt, b"thirty-two-byte-salt-goes-here!!");
    }

    #[test]
    fn test_envelope_rejects_unknown_algorithm() {
        let mut envelope = EncryptedEnvelope::seal(b"x", b"y", b"z");
        envelope.algorithm = "ROT13".to_string();
        assert!(matches!(
            envelope.open(),
            Err(VaultError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_algorithm_labels() {
        assert_eq!(EncryptionAlgorithm::AesGcm.as_str(), "AES-GCM");
        assert_eq!("AES-GCM".parse::<EncryptionAlgorithm>().unwrap(), EncryptionAlgorithm::AesGcm);
        assert_eq!("none".parse::<CompressionAlgorithm>().unwrap(), CompressionAlgorithm::None);
        assert!("lz4".parse::<CompressionAlgorithm>().is_err());
        assert!("DES".parse::<EncryptionAlgorithm>().is_err());
    }
}
