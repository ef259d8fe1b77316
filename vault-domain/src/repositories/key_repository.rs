// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Persistence port for user encryption keys.
//!
//! `rotate_key_txn` is the transactional composite behind key rotation: the
//! replacement key is inserted and the old key soft-deactivated in one
//! transaction, so observers never see zero or two live generations of the
//! same key name.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::UserEncryptionKey;
use crate::value_objects::{KeyId, UserId};
use crate::VaultError;

/// Persistence port for user encryption keys.
#[async_trait]
pub trait KeyRepository: Send + Sync {
    /// Inserts a new key row, failing `KeyLimitExceeded` when the user
    /// already holds `max_active` active keys. The count-and-compare runs
    /// inside the write transaction.
    async fn insert_key_guarded(&self, key: &UserEncryptionKey, max_active: u32) -> Result<(), VaultError>;

    /// Loads a user's key by id
    async fn find_key(&self, user_id: UserId, key_id: &KeyId) -> Result<Option<UserEncryptionKey>, VaultError>;

    /// Loads a user's key by name
    async fn find_by_name(&self, user_id: UserId, key_name: &str) -> Result<Option<UserEncryptionKey>, VaultError>;

    /// Lists all of a user's keys, newest first
    async fn list_keys(&self, user_id: UserId) -> Result<Vec<UserEncryptionKey>, VaultError>;

    /// Counts the user's active keys
    async fn count_active(&self, user_id: UserId) -> Result<u64, VaultError>;

    /// Persists a modified key row
    async fn update_key(&self, key: &UserEncryptionKey) -> Result<(), VaultError>;

    /// Atomically inserts the replacement key and persists the deactivated
    /// old key (when rotation does not preserve it as active).
    async fn rotate_key_txn(
        &self,
        new_key: &UserEncryptionKey,
        old_key: Option<&UserEncryptionKey>,
    ) -> Result<(), VaultError>;

    /// Hard-deletes a key row; returns whether a row was removed
    async fn delete_key(&self, user_id: UserId, key_id: &KeyId) -> Result<bool, VaultError>;

    /// Active keys whose `expires_at` is before `now`, oldest first
    async fn find_expired_active(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<UserEncryptionKey>, VaultError>;

    /// Active keys created before the cutoff (rotation-due scan)
    async fn find_active_created_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<UserEncryptionKey>, VaultError>;
}
