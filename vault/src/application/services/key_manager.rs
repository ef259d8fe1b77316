// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Key Manager
//!
//! Manages per-user master keys: creation, validation, rotation, deletion,
//! and expiry cleanup. The random data-encryption key ("session key") is
//! wrapped under a password-derived key with AES-256-GCM; successfully
//! unwrapping it is the proof that a presented password is correct, so no
//! password hash is ever stored.
//!
//! ## Password Policy
//!
//! Configurable via [`SecuritySettings`]: minimum length 12 (maximum 128),
//! required character classes, a common-password denylist, and a soft
//! lockout after repeated failures (default 5 failures → 15 minutes).
//! Strength is scored on a 0–4 ladder from length and character-class
//! diversity.
//!
//! ## Invariants
//!
//! - Key names are unique per user (`KeyNameConflict`)
//! - At most 10 active keys per user, enforced inside the insert
//!   transaction (`KeyLimitExceeded`)
//! - Keys rotate only after 30 days unless forced (`RotationTooSoon`)
//! - The only active key can never be deleted (`LastKey`)
//!
//! The failed-validation lockout is tracked in-process; it guards the
//! engine's own validation path, not the durable store.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use vault_domain::entities::{
    DeactivationReason, OperationContext, PublicKeyRecord, UserEncryptionKey, DEFAULT_KEY_EXPIRY_DAYS,
    MAX_ACTIVE_KEYS_PER_USER, MAX_KEY_NAME_LEN, MIN_ROTATION_AGE_DAYS,
};
use vault_domain::repositories::KeyRepository;
use vault_domain::services::{CryptoProvider, KdfAlgorithm, KeyMaterial, KEY_LEN, PBKDF2_DEFAULT_ITERATIONS};
use vault_domain::value_objects::{KeyId, UserId};
use vault_domain::{VaultError, VaultEvent};

use std::collections::BTreeSet;

static COMMON_PASSWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "password",
        "password1",
        "password123",
        "passw0rd",
        "p@ssword",
        "p@ssw0rd",
        "123456",
        "12345678",
        "123456789",
        "1234567890",
        "qwerty",
        "qwerty123",
        "letmein",
        "welcome",
        "welcome1",
        "admin",
        "administrator",
        "iloveyou",
        "monkey",
        "dragon",
        "sunshine",
        "princess",
        "football",
        "baseball",
        "master",
        "superman",
        "trustno1",
        "abc123",
        "secret",
        "changeme",
    ])
});

/// Key-derivation settings for newly created keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyDerivationSettings {
    pub algorithm: String,
    pub iterations: u32,
    pub key_length: u32,
    pub hash: String,
    pub salt_length: u32,
}

impl Default for KeyDerivationSettings {
    fn default() -> Self {
        Self {
            algorithm: "PBKDF2-HMAC-SHA256".to_string(),
            iterations: PBKDF2_DEFAULT_ITERATIONS,
            key_length: KEY_LEN as u32,
            hash: "SHA-256".to_string(),
            salt_length: 32,
        }
    }
}

impl KeyDerivationSettings {
    /// Resolves the configured KDF
    pub fn kdf(&self) -> Result<KdfAlgorithm, VaultError> {
        KdfAlgorithm::from_label(&self.algorithm, self.iterations)
    }
}

/// Rotation policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationSettings {
    /// Age at which a key becomes due for rotation, in days
    pub max_key_age_days: i64,
    /// Minimum age before rotation is allowed, in days
    pub min_key_age_days: i64,
    pub max_keys_per_user: u32,
    pub auto_rotate: bool,
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            max_key_age_days: DEFAULT_KEY_EXPIRY_DAYS,
            min_key_age_days: MIN_ROTATION_AGE_DAYS,
            max_keys_per_user: MAX_ACTIVE_KEYS_PER_USER as u32,
            auto_rotate: false,
        }
    }
}

/// Password policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    pub min_password_length: usize,
    pub max_password_length: usize,
    pub require_uppercase: bool,
    pub require_numbers: bool,
    pub require_symbols: bool,
    pub prevent_common_passwords: bool,
    pub max_failed_attempts: u32,
    pub lockout_duration_minutes: i64,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            min_password_length: 12,
            max_password_length: 128,
            require_uppercase: true,
            require_numbers: true,
            require_symbols: true,
            prevent_common_passwords: true,
            max_failed_attempts: 5,
            lockout_duration_minutes: 15,
        }
    }
}

/// Full key-manager configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyManagerConfig {
    pub key_derivation: KeyDerivationSettings,
    pub rotation: RotationSettings,
    pub security: SecuritySettings,
}

/// Password strength ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PasswordStrength {
    Weak,
    Fair,
    Good,
    Strong,
}

impl PasswordStrength {
    /// Maps a 0–4 score onto the ladder
    pub fn from_score(score: u8) -> Self {
        match score {
            0 | 1 => PasswordStrength::Weak,
            2 => PasswordStrength::Fair,
            3 => PasswordStrength::Good,
            _ => PasswordStrength::Strong,
        }
    }
}

/// Result of validating a password against a stored key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyValidation {
    pub is_valid: bool,
    pub is_expired: bool,
    pub is_near_expiry: bool,
    pub strength: PasswordStrength,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// Options for key creation.
#[derive(Debug, Clone, Default)]
pub struct CreateKeyOptions {
    pub description: Option<String>,
    pub tags: BTreeSet<String>,
    pub expires_in_days: Option<i64>,
}

/// Options for key rotation.
#[derive(Debug, Clone, Copy, Default)]
pub struct RotateKeyOptions {
    /// Keep the old key active alongside the new one
    pub preserve_old_key: bool,
    /// Bypass the minimum-age rule
    pub force_rotation: bool,
}

/// Result of a key rotation.
#[derive(Debug, Clone)]
pub struct RotationOutcome {
    pub new_key: PublicKeyRecord,
    pub old_key_deactivated: bool,
    /// Downstream ciphertexts wrapped under the old key must be re-wrapped
    pub migration_required: bool,
    pub event: VaultEvent,
}

#[derive(Debug, Clone, Copy, Default)]
struct FailureState {
    count: u32,
    locked_until: Option<chrono::DateTime<Utc>>,
}

/// Application service managing user encryption keys.
pub struct KeyManager {
    keys: Arc<dyn KeyRepository>,
    crypto: Arc<dyn CryptoProvider>,
    config: KeyManagerConfig,
    failures: Mutex<HashMap<String, FailureState>>,
}

impl KeyManager {
    pub fn new(keys: Arc<dyn KeyRepository>, crypto: Arc<dyn CryptoProvider>, config: KeyManagerConfig) -> Self {
        Self {
            keys,
            crypto,
            config,
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &KeyManagerConfig {
        &self.config
    }

    /// Scores a password 0–4 from length and character-class diversity.
    pub fn score_password(password: &str) -> PasswordStrength {
        let mut score = 0u8;
        if password.len() >= 12 {
            score += 1;
        }
        if password.len() >= 16 {
            score += 1;
        }
        let classes = [
            password.chars().any(|c| c.is_ascii_lowercase()),
            password.chars().any(|c| c.is_ascii_uppercase()),
            password.chars().any(|c| c.is_ascii_digit()),
            password.chars().any(|c| !c.is_ascii_alphanumeric()),
        ]
        .iter()
        .filter(|present| **present)
        .count();
        if classes >= 3 {
            score += 1;
        }
        if classes == 4 {
            score += 1;
        }
        PasswordStrength::from_score(score)
    }

    /// Validates a password against the policy, returning its strength or
    /// `WeakPassword` with every violated rule enumerated.
    pub fn check_password_policy(&self, password: &str) -> Result<PasswordStrength, VaultError> {
        let policy = &self.config.security;
        let mut reasons = Vec::new();

        if password.len() < policy.min_password_length {
            reasons.push(format!(
                "must be at least {} characters",
                policy.min_password_length
            ));
        }
        if password.len() > policy.max_password_length {
            reasons.push(format!("must be at most {} characters", policy.max_password_length));
        }
        if policy.require_uppercase && !password.chars().any(|c| c.is_ascii_uppercase()) {
            reasons.push("must contain an uppercase letter".to_string());
        }
        if policy.require_numbers && !password.chars().any(|c| c.is_ascii_digit()) {
            reasons.push("must contain a digit".to_string());
        }
        if policy.require_symbols && !password.chars().any(|c| !c.is_ascii_alphanumeric()) {
            reasons.push("must contain a special character".to_string());
        }
        if policy.prevent_common_passwords && COMMON_PASSWORDS.contains(password.to_ascii_lowercase().as_str()) {
            reasons.push("is a commonly used password".to_string());
        }

        if reasons.is_empty() {
            Ok(Self::score_password(password))
        } else {
            Err(VaultError::WeakPassword(reasons))
        }
    }

    /// Creates a new master key for a user.
    pub async fn create_user_key(
        &self,
        ctx: &OperationContext,
        user_id: UserId,
        key_name: &str,
        password: &str,
        opts: CreateKeyOptions,
    ) -> Result<PublicKeyRecord, VaultError> {
        ctx.check_deadline()?;

        if key_name.trim().is_empty() {
            return Err(VaultError::MissingName("key name is required".to_string()));
        }
        if key_name.chars().count() > MAX_KEY_NAME_LEN {
            return Err(VaultError::NameTooLong(format!(
                "key name exceeds {} characters",
                MAX_KEY_NAME_LEN
            )));
        }
        if self.keys.find_by_name(user_id, key_name).await?.is_some() {
            return Err(VaultError::KeyNameConflict(format!(
                "key name {:?} is already used",
                key_name
            )));
        }

        let active = self.keys.count_active(user_id).await?;
        if active >= u64::from(self.config.rotation.max_keys_per_user) {
            return Err(VaultError::KeyLimitExceeded(format!(
                "user already has {} active keys",
                active
            )));
        }

        self.check_password_policy(password)?;
        ctx.check_deadline()?;

        let key = self.wrap_fresh_session_key(user_id, key_name, password, &opts)?;
        self.keys
            .insert_key_guarded(&key, self.config.rotation.max_keys_per_user)
            .await?;

        info!(user = %user_id, key = %key.key_id, "created user encryption key");
        Ok(key.public_record())
    }

    /// Validates a password against a stored key.
    ///
    /// Unwrap success proves the password; `last_used_at` is updated only on
    /// success. Repeated failures soft-lock the key for the configured
    /// window.
    pub async fn validate_user_key(
        &self,
        ctx: &OperationContext,
        user_id: UserId,
        key_id: &KeyId,
        password: &str,
    ) -> Result<KeyValidation, VaultError> {
        ctx.check_deadline()?;
        let strength = Self::score_password(password);

        if let Some(until) = self.locked_until(key_id) {
            return Ok(KeyValidation {
                is_valid: false,
                is_expired: false,
                is_near_expiry: false,
                strength,
                warnings: Vec::new(),
                errors: vec![format!(
                    "key is temporarily locked until {} after repeated failures",
                    until.to_rfc3339()
                )],
            });
        }

        let mut key = self
            .keys
            .find_key(user_id, key_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("key {} not found", key_id)))?;
        if !key.is_active() {
            return Err(VaultError::NotFound(format!("key {} is not active", key_id)));
        }

        let unwrapped = self.unwrap_session_key(&key, password);
        match unwrapped {
            Ok(_session_key) => {
                self.clear_failures(key_id);

                let mut warnings = Vec::new();
                if key.iterations < PBKDF2_DEFAULT_ITERATIONS {
                    warnings.push(format!(
                        "key derivation uses {} iterations, below the current recommendation of {}",
                        key.iterations, PBKDF2_DEFAULT_ITERATIONS
                    ));
                }
                let is_expired = key.is_expired();
                let is_near_expiry = key.is_near_expiry();
                if is_expired {
                    warnings.push("key is expired".to_string());
                } else if is_near_expiry {
                    warnings.push("key expires within 7 days".to_string());
                }

                key.touch_used();
                self.keys.update_key(&key).await?;

                Ok(KeyValidation {
                    is_valid: true,
                    is_expired,
                    is_near_expiry,
                    strength,
                    warnings,
                    errors: Vec::new(),
                })
            }
            Err(_) => {
                self.record_failure(key_id);
                debug!(key = %key_id, "password validation failed");
                Ok(KeyValidation {
                    is_valid: false,
                    is_expired: key.is_expired(),
                    is_near_expiry: key.is_near_expiry(),
                    strength,
                    warnings: Vec::new(),
                    errors: vec!["invalid password".to_string()],
                })
            }
        }
    }

    /// Rotates a key to a new password.
    pub async fn rotate_user_key(
        &self,
        ctx: &OperationContext,
        user_id: UserId,
        key_id: &KeyId,
        current_password: &str,
        new_password: &str,
        opts: RotateKeyOptions,
    ) -> Result<RotationOutcome, VaultError> {
        ctx.check_deadline()?;

        let validation = self.validate_user_key(ctx, user_id, key_id, current_password).await?;
        if !validation.is_valid {
            return Err(VaultError::decryption_failed("invalid password for key rotation"));
        }

        let mut old_key = self
            .keys
            .find_key(user_id, key_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("key {} not found", key_id)))?;

        if !opts.force_rotation && !old_key.old_enough_to_rotate() {
            return Err(VaultError::RotationTooSoon(format!(
                "key {} is {} days old, minimum rotation age is {} days",
                key_id,
                old_key.age().num_days(),
                self.config.rotation.min_key_age_days
            )));
        }

        self.check_password_policy(new_password)?;
        ctx.check_deadline()?;

        let opts_for_new = CreateKeyOptions {
            description: old_key.description.clone(),
            tags: old_key.tags.clone(),
            expires_in_days: None,
        };
        // Active key names are unique per user; a preserved old key keeps
        // its name, so its replacement needs a fresh one.
        let new_name = if opts.preserve_old_key {
            let candidate = format!("{}-rotated", old_key.key_name);
            if self.keys.find_by_name(user_id, &candidate).await?.is_some() {
                return Err(VaultError::KeyNameConflict(format!(
                    "key name {:?} is already used",
                    candidate
                )));
            }
            candidate
        } else {
            old_key.key_name.clone()
        };
        let mut new_key = self.wrap_fresh_session_key(user_id, &new_name, new_password, &opts_for_new)?;
        new_key
            .metadata
            .insert("rotatedFrom".to_string(), serde_json::Value::String(key_id.to_string()));

        let old_key_deactivated = !opts.preserve_old_key;
        if old_key_deactivated {
            old_key.deactivate(DeactivationReason::KeyRotation);
            self.keys.rotate_key_txn(&new_key, Some(&old_key)).await?;
        } else {
            // The old key stays active, so the replacement must still fit
            // under the per-user cap.
            let active = self.keys.count_active(user_id).await?;
            if active >= u64::from(self.config.rotation.max_keys_per_user) {
                return Err(VaultError::KeyLimitExceeded(format!(
                    "user already has {} active keys",
                    active
                )));
            }
            self.keys.rotate_key_txn(&new_key, None).await?;
        }

        info!(user = %user_id, old = %key_id, new = %new_key.key_id, "rotated user encryption key");
        let event = VaultEvent::KeyRotated {
            user_id,
            old_key_id: key_id.clone(),
            new_key_id: new_key.key_id.clone(),
            occurred_at: Utc::now(),
        };
        Ok(RotationOutcome {
            new_key: new_key.public_record(),
            old_key_deactivated,
            migration_required: old_key_deactivated,
            event,
        })
    }

    /// Deletes a key after validating its password. The user's only active
    /// key can never be deleted.
    pub async fn delete_user_key(
        &self,
        ctx: &OperationContext,
        user_id: UserId,
        key_id: &KeyId,
        password: &str,
    ) -> Result<(), VaultError> {
        ctx.check_deadline()?;

        let validation = self.validate_user_key(ctx, user_id, key_id, password).await?;
        if !validation.is_valid {
            return Err(VaultError::decryption_failed("invalid password for key deletion"));
        }

        let key = self
            .keys
            .find_key(user_id, key_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("key {} not found", key_id)))?;
        if key.is_active() && self.keys.count_active(user_id).await? <= 1 {
            return Err(VaultError::LastKey(format!(
                "key {} is the user's only active key",
                key_id
            )));
        }

        self.keys.delete_key(user_id, key_id).await?;
        info!(user = %user_id, key = %key_id, "deleted user encryption key");
        Ok(())
    }

    /// Lists a user's keys as public records, newest first
    pub async fn list_keys(&self, ctx: &OperationContext, user_id: UserId) -> Result<Vec<PublicKeyRecord>, VaultError> {
        ctx.check_deadline()?;
        let keys = self.keys.list_keys(user_id).await?;
        Ok(keys.iter().map(UserEncryptionKey::public_record).collect())
    }

    /// Soft-deactivates every active key past its expiry. Idempotent and
    /// resumable: already-deactivated keys are never revisited.
    pub async fn cleanup_expired_keys(&self) -> Result<u64, VaultError> {
        let mut deactivated = 0u64;
        loop {
            let batch = self.keys.find_expired_active(Utc::now(), 1_000).await?;
            if batch.is_empty() {
                break;
            }
            for mut key in batch {
                key.deactivate(DeactivationReason::Expired);
                self.keys.update_key(&key).await?;
                deactivated += 1;
            }
        }
        if deactivated > 0 {
            info!(count = deactivated, "deactivated expired encryption keys");
        }
        Ok(deactivated)
    }

    /// Generates and wraps a fresh session key under the given password.
    fn wrap_fresh_session_key(
        &self,
        user_id: UserId,
        key_name: &str,
        password: &str,
        opts: &CreateKeyOptions,
    ) -> Result<UserEncryptionKey, VaultError> {
        let kdf = self.config.key_derivation.kdf()?;
        let session_key = KeyMaterial::new(self.crypto.random_bytes(KEY_LEN)?);
        let salt = self.crypto.random_bytes(self.config.key_derivation.salt_length as usize)?;
        let wrapping_key = self.crypto.derive_key(password, &salt, &kdf)?;
        let (wrapped, iv) = self.crypto.encrypt(session_key.as_slice(), &wrapping_key)?;

        UserEncryptionKey::create(
            user_id,
            key_name,
            wrapped,
            salt,
            iv,
            kdf.label(),
            kdf.iterations(),
            opts.expires_in_days.unwrap_or(DEFAULT_KEY_EXPIRY_DAYS),
            opts.description.clone(),
            opts.tags.clone(),
        )
    }

    /// Attempts to unwrap the stored session key with the presented
    /// password. Success proves the password is correct. The unwrapped key
    /// travels inside [`KeyMaterial`] so it zeroizes when dropped.
    fn unwrap_session_key(&self, key: &UserEncryptionKey, password: &str) -> Result<KeyMaterial, VaultError> {
        let kdf = KdfAlgorithm::from_label(&key.algorithm, key.iterations)?;
        let wrapping_key = self.crypto.derive_key(password, &key.salt, &kdf)?;
        let session_key = self.crypto.decrypt(&key.encrypted_session_key, &wrapping_key, &key.iv)?;
        Ok(KeyMaterial::new(session_key))
    }

    fn locked_until(&self, key_id: &KeyId) -> Option<chrono::DateTime<Utc>> {
        let mut failures = self.failures.lock();
        if let Some(state) = failures.get(key_id.as_str()) {
            match state.locked_until {
                Some(until) if until > Utc::now() => return Some(until),
                Some(_) => {
                    // Lockout elapsed
                    failures.remove(key_id.as_str());
                }
                None => {}
            }
        }
        None
    }

    fn record_failure(&self, key_id: &KeyId) {
        let mut failures = self.failures.lock();
        let state = failures.entry(key_id.as_str().to_string()).or_default();
        state.count += 1;
        if state.count >= self.config.security.max_failed_attempts {
            let until = Utc::now() + Duration::minutes(self.config.security.lockout_duration_minutes);
            state.locked_until = Some(until);
            warn!(key = %key_id, attempts = state.count, "soft-locked key after repeated failures");
        }
    }

    fn clear_failures(&self, key_id: &KeyId) {
        self.failures.lock().remove(key_id.as_str());
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    // Policy and scoring checks never touch the repository.
    struct UnusedRepo;

    #[async_trait::async_trait]
    impl KeyRepository for UnusedRepo {
        async fn insert_key_guarded(&self, _: &UserEncryptionKey, _: u32) -> Result<(), VaultError> {
            unreachable!()
        }
        async fn find_key(&self, _: UserId, _: &KeyId) -> Result<Option<UserEncryptionKey>, VaultError> {
            unreachable!()
        }
        async fn find_by_name(&self, _: UserId, _: &str) -> Result<Option<UserEncryptionKey>, VaultError> {
            unreachable!()
        }
        async fn list_keys(&self, _: UserId) -> Result<Vec<UserEncryptionKey>, VaultError> {
            unreachable!()
        }
        async fn count_active(&self, _: UserId) -> Result<u64, VaultError> {
            unreachable!()
        }
        async fn update_key(&self, _: &UserEncryptionKey) -> Result<(), VaultError> {
            unreachable!()
        }
        async fn rotate_key_txn(
            &self,
            _: &UserEncryptionKey,
            _: Option<&UserEncryptionKey>,
        ) -> Result<(), VaultError> {
            unreachable!()
        }
        async fn delete_key(&self, _: UserId, _: &KeyId) -> Result<bool, VaultError> {
            unreachable!()
        }
        async fn find_expired_active(
            &self,
            _: chrono::DateTime<Utc>,
            _: u32,
        ) -> Result<Vec<UserEncryptionKey>, VaultError> {
            unreachable!()
        }
        async fn find_active_created_before(
            &self,
            _: chrono::DateTime<Utc>,
            _: u32,
        ) -> Result<Vec<UserEncryptionKey>, VaultError> {
            unreachable!()
        }
    }

    fn manager_with(config: KeyManagerConfig) -> KeyManager {
        KeyManager::new(
            Arc::new(UnusedRepo),
            Arc::new(crate::infrastructure::crypto::RingCryptoProvider::new()),
            config,
        )
    }

    #[test]
    fn test_score_ladder() {
        assert_eq!(KeyManager::score_password("short"), PasswordStrength::Weak);
        assert_eq!(KeyManager::score_password("alllowercase"), PasswordStrength::Weak);
        assert_eq!(KeyManager::score_password("Mixed1234567"), PasswordStrength::Good);
        assert_eq!(KeyManager::score_password("CorrectP@ss123!!"), PasswordStrength::Strong);
    }

    #[test]
    fn test_policy_enumerates_reasons() {
        let manager = manager_with(KeyManagerConfig::default());

        let err = manager.check_password_policy("weak").unwrap_err();
        let VaultError::WeakPassword(reasons) = err else {
            panic!("expected WeakPassword");
        };
        assert!(reasons.iter().any(|r| r.contains("at least 12")));
        assert!(reasons.iter().any(|r| r.contains("uppercase")));
        assert!(reasons.iter().any(|r| r.contains("digit")));
        assert!(reasons.iter().any(|r| r.contains("special")));

        assert!(manager.check_password_policy("CorrectP@ss123!").is_ok());
    }

    #[test]
    fn test_password_length_ceiling() {
        let manager = manager_with(KeyManagerConfig::default());
        let oversized = format!("Aa1!{}", "x".repeat(130));
        let err = manager.check_password_policy(&oversized).unwrap_err();
        let VaultError::WeakPassword(reasons) = err else {
            panic!("expected WeakPassword");
        };
        assert!(reasons.iter().any(|r| r.contains("at most 128")));
    }

    #[test]
    fn test_common_passwords_denied_case_insensitively() {
        let config = KeyManagerConfig {
            security: SecuritySettings {
                min_password_length: 6,
                require_uppercase: false,
                require_numbers: false,
                require_symbols: false,
                ..SecuritySettings::default()
            },
            ..KeyManagerConfig::default()
        };
        let manager = manager_with(config);

        let err = manager.check_password_policy("LetMeIn").unwrap_err();
        let VaultError::WeakPassword(reasons) = err else {
            panic!("expected WeakPassword for common password");
        };
        assert!(reasons.iter().any(|r| r.contains("commonly used")));
    }

    #[test]
    fn test_lockout_state_machine() {
        let manager = manager_with(KeyManagerConfig::default());
        let key_id = KeyId::generate();

        assert!(manager.locked_until(&key_id).is_none());
        for _ in 0..5 {
            manager.record_failure(&key_id);
        }
        assert!(manager.locked_until(&key_id).is_some());

        manager.clear_failures(&key_id);
        assert!(manager.locked_until(&key_id).is_none());
    }
}
