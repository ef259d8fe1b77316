// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite Key Repository
//!
//! [`KeyRepository`] over a `SqlitePool`. The explicit `KeyStatus` sum type
//! maps onto three columns (`is_active`, `deactivated_at`,
//! `deactivated_reason`); a partial unique index keeps key names unique
//! among a user's active keys while rotated-out rows keep their name.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use vault_domain::entities::{DeactivationReason, KeyStatus, UserEncryptionKey};
use vault_domain::repositories::KeyRepository;
use vault_domain::value_objects::{KeyId, UserId};
use vault_domain::VaultError;

use super::mapping::{fmt_dt, map_from_json, map_to_json, parse_dt, parse_opt_dt, store_err, tags_from_json, tags_to_json};

/// SQLite-backed key repository.
pub struct SqliteKeyRepository {
    pool: SqlitePool,
}

impl SqliteKeyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn key_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<UserEncryptionKey, VaultError> {
        let is_active = row.get::<i64, _>("is_active") != 0;
        let status = if is_active {
            KeyStatus::Active
        } else {
            let at = parse_opt_dt(row.get::<Option<String>, _>("deactivated_at").as_deref())?
                .ok_or_else(|| VaultError::StoreError("deactivated key missing deactivated_at".to_string()))?;
            let reason = row
                .get::<Option<String>, _>("deactivated_reason")
                .as_deref()
                .map(DeactivationReason::parse)
                .transpose()?
                .ok_or_else(|| VaultError::StoreError("deactivated key missing deactivated_reason".to_string()))?;
            KeyStatus::Deactivated { at, reason }
        };

        Ok(UserEncryptionKey {
            key_id: KeyId::parse(row.get::<String, _>("key_id").as_str())?,
            user_id: UserId::parse(row.get::<String, _>("user_id").as_str())
                .map_err(|e| VaultError::StoreError(e.to_string()))?,
            key_name: row.get("key_name"),
            encrypted_session_key: row.get("encrypted_session_key"),
            salt: row.get("salt"),
            iv: row.get("iv"),
            algorithm: row.get("algorithm"),
            iterations: row.get::<i64, _>("iterations") as u32,
            status,
            created_at: parse_dt(row.get::<String, _>("created_at").as_str())?,
            expires_at: parse_dt(row.get::<String, _>("expires_at").as_str())?,
            last_used_at: parse_opt_dt(row.get::<Option<String>, _>("last_used_at").as_deref())?,
            tags: tags_from_json(row.get::<String, _>("tags").as_str())?,
            description: row.get("description"),
            metadata: map_from_json(row.get::<String, _>("metadata").as_str())?,
        })
    }

    fn status_columns(key: &UserEncryptionKey) -> (i64, Option<String>, Option<&'static str>) {
        match &key.status {
            KeyStatus::Active => (1, None, None),
            KeyStatus::Deactivated { at, reason } => (0, Some(fmt_dt(at)), Some(reason.as_str())),
        }
    }

    async fn insert_in_txn(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        key: &UserEncryptionKey,
    ) -> Result<(), VaultError> {
        let (is_active, deactivated_at, deactivated_reason) = Self::status_columns(key);
        sqlx::query(
            "INSERT INTO user_encryption_keys \
             (key_id, user_id, key_name, encrypted_session_key, salt, iv, algorithm, iterations, \
              is_active, deactivated_at, deactivated_reason, created_at, expires_at, last_used_at, \
              tags, description, metadata) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(key.key_id.to_string())
        .bind(key.user_id.to_string())
        .bind(&key.key_name)
        .bind(&key.encrypted_session_key)
        .bind(&key.salt)
        .bind(&key.iv)
        .bind(&key.algorithm)
        .bind(key.iterations as i64)
        .bind(is_active)
        .bind(deactivated_at)
        .bind(deactivated_reason)
        .bind(fmt_dt(&key.created_at))
        .bind(fmt_dt(&key.expires_at))
        .bind(key.last_used_at.as_ref().map(fmt_dt))
        .bind(tags_to_json(&key.tags))
        .bind(&key.description)
        .bind(map_to_json(&key.metadata))
        .execute(&mut **tx)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn update_in_txn(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        key: &UserEncryptionKey,
    ) -> Result<(), VaultError> {
        let (is_active, deactivated_at, deactivated_reason) = Self::status_columns(key);
        let result = sqlx::query(
            "UPDATE user_encryption_keys SET \
             key_name = ?, encrypted_session_key = ?, salt = ?, iv = ?, algorithm = ?, iterations = ?, \
             is_active = ?, deactivated_at = ?, deactivated_reason = ?, expires_at = ?, last_used_at = ?, \
             tags = ?, description = ?, metadata = ? \
             WHERE key_id = ?",
        )
        .bind(&key.key_name)
        .bind(&key.encrypted_session_key)
        .bind(&key.salt)
        .bind(&key.iv)
        .bind(&key.algorithm)
        .bind(key.iterations as i64)
        .bind(is_active)
        .bind(deactivated_at)
        .bind(deactivated_reason)
        .bind(fmt_dt(&key.expires_at))
        .bind(key.last_used_at.as_ref().map(fmt_dt))
        .bind(tags_to_json(&key.tags))
        .bind(&key.description)
        .bind(map_to_json(&key.metadata))
        .bind(key.key_id.to_string())
        .execute(&mut **tx)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(VaultError::NotFound(format!("key {} not found", key.key_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyRepository for SqliteKeyRepository {
    async fn insert_key_guarded(&self, key: &UserEncryptionKey, max_active: u32) -> Result<(), VaultError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let (active,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM user_encryption_keys WHERE user_id = ? AND is_active = 1")
                .bind(key.user_id.to_string())
                .fetch_one(&mut *tx)
                .await
                .map_err(store_err)?;
        if active as u32 >= max_active {
            return Err(VaultError::KeyLimitExceeded(format!(
                "user already has {} active keys (limit {})",
                active, max_active
            )));
        }

        Self::insert_in_txn(&mut tx, key).await?;
        tx.commit().await.map_err(store_err)
    }

    async fn find_key(&self, user_id: UserId, key_id: &KeyId) -> Result<Option<UserEncryptionKey>, VaultError> {
        let row = sqlx::query("SELECT * FROM user_encryption_keys WHERE user_id = ? AND key_id = ?")
            .bind(user_id.to_string())
            .bind(key_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        row.as_ref().map(Self::key_from_row).transpose()
    }

    async fn find_by_name(&self, user_id: UserId, key_name: &str) -> Result<Option<UserEncryptionKey>, VaultError> {
        let row = sqlx::query(
            "SELECT * FROM user_encryption_keys WHERE user_id = ? AND key_name = ? AND is_active = 1 LIMIT 1",
        )
        .bind(user_id.to_string())
        .bind(key_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        row.as_ref().map(Self::key_from_row).transpose()
    }

    async fn list_keys(&self, user_id: UserId) -> Result<Vec<UserEncryptionKey>, VaultError> {
        let rows = sqlx::query("SELECT * FROM user_encryption_keys WHERE user_id = ? ORDER BY created_at DESC")
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        rows.iter().map(Self::key_from_row).collect()
    }

    async fn count_active(&self, user_id: UserId) -> Result<u64, VaultError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM user_encryption_keys WHERE user_id = ? AND is_active = 1")
                .bind(user_id.to_string())
                .fetch_one(&self.pool)
                .await
                .map_err(store_err)?;
        Ok(count as u64)
    }

    async fn update_key(&self, key: &UserEncryptionKey) -> Result<(), VaultError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        Self::update_in_txn(&mut tx, key).await?;
        tx.commit().await.map_err(store_err)
    }

    async fn rotate_key_txn(
        &self,
        new_key: &UserEncryptionKey,
        old_key: Option<&UserEncryptionKey>,
    ) -> Result<(), VaultError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        // Deactivate the old generation first so the partial unique index
        // on active key names admits the replacement.
        if let Some(old_key) = old_key {
            Self::update_in_txn(&mut tx, old_key).await?;
        }
        Self::insert_in_txn(&mut tx, new_key).await?;

        tx.commit().await.map_err(store_err)
    }

    async fn delete_key(&self, user_id: UserId, key_id: &KeyId) -> Result<bool, VaultError> {
        let result = sqlx::query("DELETE FROM user_encryption_keys WHERE user_id = ? AND key_id = ?")
            .bind(user_id.to_string())
            .bind(key_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_expired_active(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<UserEncryptionKey>, VaultError> {
        let rows = sqlx::query(
            "SELECT * FROM user_encryption_keys WHERE is_active = 1 AND expires_at < ? \
             ORDER BY expires_at ASC LIMIT ?",
        )
        .bind(fmt_dt(&now))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        rows.iter().map(Self::key_from_row).collect()
    }

    async fn find_active_created_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<UserEncryptionKey>, VaultError> {
        let rows = sqlx::query(
            "SELECT * FROM user_encryption_keys WHERE is_active = 1 AND created_at < ? \
             ORDER BY created_at ASC LIMIT ?",
        )
        .bind(fmt_dt(&cutoff))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        rows.iter().map(Self::key_from_row).collect()
    }
}
