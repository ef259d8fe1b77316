// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # User Encryption Key Entity
//!
//! A per-user master key record. The random data-encryption key (the
//! "session key") is never stored in the clear: it is wrapped under a key
//! derived from the user's password and a per-key salt, and only the wrapped
//! form plus the derivation parameters are persisted. Successfully
//! unwrapping the session key is the proof that a presented password is
//! correct.
//!
//! Deactivation is an explicit state carrying its timestamp and reason, not
//! a bare flag; deactivated keys are retained for a grace period and
//! eventually removed by retention.
//!
//! ## Invariants
//!
//! - A user has at most [`MAX_ACTIVE_KEYS_PER_USER`] active keys.
//! - A key must be at least [`MIN_ROTATION_AGE_DAYS`] old before rotation.
//! - A user may never delete their only active key.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt::{self, Display};

use crate::services::datetime_serde;
use crate::value_objects::{KeyId, UserId};
use crate::VaultError;

/// Maximum number of active keys per user.
pub const MAX_ACTIVE_KEYS_PER_USER: usize = 10;

/// Minimum key age before rotation is allowed, in days.
pub const MIN_ROTATION_AGE_DAYS: i64 = 30;

/// Default key lifetime, in days.
pub const DEFAULT_KEY_EXPIRY_DAYS: i64 = 90;

/// Window before expiry in which validation warns, in days.
pub const NEAR_EXPIRY_DAYS: i64 = 7;

/// Maximum key name length, in characters.
pub const MAX_KEY_NAME_LEN: usize = 100;

/// Why a key left the active state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeactivationReason {
    KeyRotation,
    Expired,
    UserRequest,
}

impl DeactivationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeactivationReason::KeyRotation => "key_rotation",
            DeactivationReason::Expired => "expired",
            DeactivationReason::UserRequest => "user_request",
        }
    }

    pub fn parse(s: &str) -> Result<Self, VaultError> {
        match s {
            "key_rotation" => Ok(DeactivationReason::KeyRotation),
            "expired" => Ok(DeactivationReason::Expired),
            "user_request" => Ok(DeactivationReason::UserRequest),
            other => Err(VaultError::InternalError(format!(
                "unknown deactivation reason {:?}",
                other
            ))),
        }
    }
}

impl Display for DeactivationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Activation state of a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum KeyStatus {
    Active,
    Deactivated {
        #[serde(with = "datetime_serde")]
        at: DateTime<Utc>,
        reason: DeactivationReason,
    },
}

/// User encryption key entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEncryptionKey {
    pub key_id: KeyId,
    pub user_id: UserId,

    /// Unique per user
    pub key_name: String,

    /// The random data-encryption key, AES-GCM-wrapped under the
    /// password-derived wrapping key
    pub encrypted_session_key: Vec<u8>,

    /// Key-derivation salt
    pub salt: Vec<u8>,

    /// IV used to wrap the session key
    pub iv: Vec<u8>,

    /// KDF label (`PBKDF2-HMAC-SHA256` or `Argon2id`)
    pub algorithm: String,

    /// KDF iteration count at creation time
    pub iterations: u32,

    pub status: KeyStatus,

    #[serde(with = "datetime_serde")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "datetime_serde")]
    pub expires_at: DateTime<Utc>,

    #[serde(default, with = "datetime_serde::optional", skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl UserEncryptionKey {
    /// Creates a fresh active key record.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        user_id: UserId,
        key_name: &str,
        encrypted_session_key: Vec<u8>,
        salt: Vec<u8>,
        iv: Vec<u8>,
        algorithm: &str,
        iterations: u32,
        expires_in_days: i64,
        description: Option<String>,
        tags: BTreeSet<String>,
    ) -> Result<Self, VaultError> {
        if key_name.trim().is_empty() {
            return Err(VaultError::MissingName("key name is required".to_string()));
        }
        if key_name.chars().count() > MAX_KEY_NAME_LEN {
            return Err(VaultError::NameTooLong(format!(
                "key name exceeds {} characters",
                MAX_KEY_NAME_LEN
            )));
        }
        let now = Utc::now();
        Ok(Self {
            key_id: KeyId::generate(),
            user_id,
            key_name: key_name.to_string(),
            encrypted_session_key,
            salt,
            iv,
            algorithm: algorithm.to_string(),
            iterations,
            status: KeyStatus::Active,
            created_at: now,
            expires_at: now + Duration::days(expires_in_days),
            last_used_at: None,
            tags,
            description,
            metadata: Map::new(),
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == KeyStatus::Active
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    pub fn is_near_expiry(&self) -> bool {
        !self.is_expired() && self.expires_at - Utc::now() <= Duration::days(NEAR_EXPIRY_DAYS)
    }

    /// Age of the key
    pub fn age(&self) -> Duration {
        Utc::now() - self.created_at
    }

    /// Whether rotation is permitted by the minimum-age rule
    pub fn old_enough_to_rotate(&self) -> bool {
        self.age() >= Duration::days(MIN_ROTATION_AGE_DAYS)
    }

    /// Soft-deactivates the key with the given reason. Idempotent: an
    /// already-deactivated key keeps its original state.
    pub fn deactivate(&mut self, reason: DeactivationReason) {
        if self.is_active() {
            self.status = KeyStatus::Deactivated {
                at: Utc::now(),
                reason,
            };
        }
    }

    /// Records a successful validation
    pub fn touch_used(&mut self) {
        self.last_used_at = Some(Utc::now());
    }

    /// The public view of this key: everything except the wrapped session
    /// key and derivation secrets.
    pub fn public_record(&self) -> PublicKeyRecord {
        PublicKeyRecord {
            key_id: self.key_id.clone(),
            user_id: self.user_id,
            key_name: self.key_name.clone(),
            algorithm: self.algorithm.clone(),
            iterations: self.iterations,
            status: self.status.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            last_used_at: self.last_used_at,
            tags: self.tags.clone(),
            description: self.description.clone(),
        }
    }
}

/// Public projection of a key record, safe to hand to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicKeyRecord {
    pub key_id: KeyId,
    pub user_id: UserId,
    pub key_name: String,
    pub algorithm: String,
    pub iterations: u32,
    pub status: KeyStatus,

    #[serde(with = "datetime_serde")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "datetime_serde")]
    pub expires_at: DateTime<Utc>,

    #[serde(default, with = "datetime_serde::optional", skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_key() -> UserEncryptionKey {
        UserEncryptionKey::create(
            UserId::new(),
            "laptop",
            vec![1; 48],
            vec![2; 32],
            vec![3; 12],
            "PBKDF2-HMAC-SHA256",
            210_000,
            DEFAULT_KEY_EXPIRY_DAYS,
            None,
            BTreeSet::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_create_is_active_with_default_expiry() {
        let key = sample_key();
        assert!(key.is_active());
        assert!(!key.is_expired());
        let lifetime = key.expires_at - key.created_at;
        assert_eq!(lifetime.num_days(), DEFAULT_KEY_EXPIRY_DAYS);
    }

    #[test]
    fn test_key_name_validated() {
        let blank = UserEncryptionKey::create(
            UserId::new(),
            "  ",
            vec![],
            vec![],
            vec![],
            "PBKDF2-HMAC-SHA256",
            1,
            90,
            None,
            BTreeSet::new(),
        );
        assert!(matches!(blank, Err(VaultError::MissingName(_))));
    }

    #[test]
    fn test_deactivate_records_reason_and_is_idempotent() {
        let mut key = sample_key();
        key.deactivate(DeactivationReason::KeyRotation);
        let KeyStatus::Deactivated { at: first_at, reason } = key.status.clone() else {
            panic!("expected deactivated state");
        };
        assert_eq!(reason, DeactivationReason::KeyRotation);

        key.deactivate(DeactivationReason::Expired);
        let KeyStatus::Deactivated { at, reason } = key.status.clone() else {
            panic!("expected deactivated state");
        };
        assert_eq!(at, first_at);
        assert_eq!(reason, DeactivationReason::KeyRotation);
    }

    #[test]
    fn test_fresh_key_not_old_enough_to_rotate() {
        let key = sample_key();
        assert!(!key.old_enough_to_rotate());
    }

    #[test]
    fn test_public_record_omits_secret_material() {
        let key = sample_key();
        let public = key.public_record();
        let json = serde_json::to_string(&public).unwrap();
        assert!(!json.contains("encryptedSessionKey"));
        assert!(!json.contains("encrypted_session_key"));
        assert!(!json.contains("salt"));
        assert!(!json.contains("\"iv\""));
    }

    #[test]
    fn test_deactivation_reason_labels() {
        assert_eq!(DeactivationReason::KeyRotation.as_str(), "key_rotation");
        assert_eq!(DeactivationReason::parse("expired").unwrap(), DeactivationReason::Expired);
        assert!(DeactivationReason::parse("gone").is_err());
    }
}
