// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Key identifier value object.
//!
//! Unlike session and checkpoint identifiers (UUIDv4), encryption-key
//! identifiers are 16 random bytes rendered as 32 lowercase hex characters.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

use crate::VaultError;

/// Identifier for a user encryption key: 128 random bits, 32-char hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(String);

impl KeyId {
    /// Generates a fresh random key identifier
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Parses a key identifier, validating length and hex alphabet
    pub fn parse(s: &str) -> Result<Self, VaultError> {
        if s.len() != 32 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(VaultError::NotFound(format!("invalid key id {:?}", s)));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Gets the hex string form
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for KeyId {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for KeyId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for KeyId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_32_hex_chars() {
        let id = KeyId::generate();
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_parse_normalizes_case() {
        let id = KeyId::parse("00FFAA11223344556677889900AABBCC").unwrap();
        assert_eq!(id.as_str(), "00ffaa11223344556677889900aabbcc");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(KeyId::parse("short").is_err());
        assert!(KeyId::parse("zz00aa11223344556677889900aabbcc").is_err());
        assert!(KeyId::parse("").is_err());
    }
}
