// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite Session Repository
//!
//! [`SessionRepository`] over a `SqlitePool` with typed columns and
//! explicit row mapping. The transactional composites hold the invariants:
//! `create_session_txn` inserts the session and its metadata projection,
//! upserts the user's config, and deactivates every other session of that
//! user inside one transaction; `update_session_txn` couples the guarded
//! session write (`WHERE id = ? AND version = ?`) with the metadata
//! refresh, so a stale writer fails `VersionConflict` and touches nothing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use vault_domain::entities::{Session, SessionConfig, SessionMetadata, SessionStatus};
use vault_domain::repositories::{SessionPage, SessionQuery, SessionRepository, SessionSizeRow};
use vault_domain::value_objects::{Checksum, ClockTime, MetadataId, SessionId, UserId, WorkspaceId};
use vault_domain::VaultError;

use super::mapping::{fmt_dt, parse_dt, store_err};

/// SQLite-backed session repository.
pub struct SqliteSessionRepository {
    pool: SqlitePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn session_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Session, VaultError> {
        Ok(Session {
            id: SessionId::parse(row.get::<String, _>("id").as_str())?,
            user_id: UserId::parse(row.get::<String, _>("user_id").as_str())
                .map_err(|e| VaultError::StoreError(e.to_string()))?,
            workspace_id: WorkspaceId::parse(row.get::<String, _>("workspace_id").as_str())
                .map_err(|e| VaultError::StoreError(e.to_string()))?,
            name: row.get("name"),
            status: row.get::<String, _>("status").parse::<SessionStatus>()?,
            last_saved_at: parse_dt(row.get::<String, _>("last_saved_at").as_str())?,
            expires_at: parse_dt(row.get::<String, _>("expires_at").as_str())?,
            created_at: parse_dt(row.get::<String, _>("created_at").as_str())?,
            version: row.get::<i64, _>("version") as u64,
            state_checksum: Checksum::parse(row.get::<String, _>("state_checksum").as_str())?,
            encryption_algorithm: row.get::<String, _>("encryption_algorithm").parse()?,
            compression: row.get::<String, _>("compression").parse()?,
            payload: row.get("payload"),
        })
    }

    fn metadata_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SessionMetadata, VaultError> {
        Ok(SessionMetadata {
            id: MetadataId::parse(row.get::<String, _>("id").as_str())
                .map_err(|e| VaultError::StoreError(e.to_string()))?,
            session_id: SessionId::parse(row.get::<String, _>("session_id").as_str())?,
            user_id: UserId::parse(row.get::<String, _>("user_id").as_str())
                .map_err(|e| VaultError::StoreError(e.to_string()))?,
            workspace_id: WorkspaceId::parse(row.get::<String, _>("workspace_id").as_str())
                .map_err(|e| VaultError::StoreError(e.to_string()))?,
            session_name: row.get("session_name"),
            last_saved_at: parse_dt(row.get::<String, _>("last_saved_at").as_str())?,
            checkpoint_count: row.get::<i64, _>("checkpoint_count") as u32,
            total_size: row.get::<i64, _>("total_size") as u64,
            is_active: row.get::<i64, _>("is_active") != 0,
        })
    }

    fn config_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SessionConfig, VaultError> {
        let clock = |column: Option<String>| -> Result<Option<ClockTime>, VaultError> {
            column
                .as_deref()
                .map(ClockTime::parse)
                .transpose()
                .map_err(|e| VaultError::StoreError(e.to_string()))
        };
        Ok(SessionConfig {
            user_id: UserId::parse(row.get::<String, _>("user_id").as_str())
                .map_err(|e| VaultError::StoreError(e.to_string()))?,
            auto_save_interval_secs: row.get::<i64, _>("auto_save_interval_secs") as u32,
            retention_days: row.get("retention_days"),
            checkpoint_retention_days: row.get("checkpoint_retention_days"),
            max_session_size: row.get::<i64, _>("max_session_size") as u64,
            compression_enabled: row.get::<i64, _>("compression_enabled") != 0,
            encryption_enabled: row.get::<i64, _>("encryption_enabled") != 0,
            quiet_hours_start: clock(row.get("quiet_hours_start"))?,
            quiet_hours_end: clock(row.get("quiet_hours_end"))?,
        })
    }
}

const INSERT_SESSION: &str = "INSERT INTO sessions \
    (id, user_id, workspace_id, name, status, last_saved_at, expires_at, created_at, \
     version, state_checksum, encryption_algorithm, compression, payload) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

const INSERT_METADATA: &str = "INSERT INTO session_metadata \
    (id, session_id, user_id, workspace_id, session_name, last_saved_at, \
     checkpoint_count, total_size, is_active) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)";

const UPSERT_CONFIG: &str = "INSERT INTO session_configs \
    (user_id, auto_save_interval_secs, retention_days, checkpoint_retention_days, \
     max_session_size, compression_enabled, encryption_enabled, quiet_hours_start, quiet_hours_end) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
    ON CONFLICT(user_id) DO UPDATE SET \
        auto_save_interval_secs = excluded.auto_save_interval_secs, \
        retention_days = excluded.retention_days, \
        checkpoint_retention_days = excluded.checkpoint_retention_days, \
        max_session_size = excluded.max_session_size, \
        compression_enabled = excluded.compression_enabled, \
        encryption_enabled = excluded.encryption_enabled, \
        quiet_hours_start = excluded.quiet_hours_start, \
        quiet_hours_end = excluded.quiet_hours_end";

#[async_trait]
impl SessionRepository for SqliteSessionRepository {
    async fn create_session_txn(
        &self,
        session: &Session,
        metadata: &SessionMetadata,
        config: &SessionConfig,
    ) -> Result<(), VaultError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        sqlx::query(INSERT_SESSION)
            .bind(session.id.to_string())
            .bind(session.user_id.to_string())
            .bind(session.workspace_id.to_string())
            .bind(&session.name)
            .bind(session.status.as_str())
            .bind(fmt_dt(&session.last_saved_at))
            .bind(fmt_dt(&session.expires_at))
            .bind(fmt_dt(&session.created_at))
            .bind(session.version as i64)
            .bind(session.state_checksum.as_str())
            .bind(session.encryption_algorithm.as_str())
            .bind(session.compression.as_str())
            .bind(&session.payload)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        sqlx::query(INSERT_METADATA)
            .bind(metadata.id.to_string())
            .bind(metadata.session_id.to_string())
            .bind(metadata.user_id.to_string())
            .bind(metadata.workspace_id.to_string())
            .bind(&metadata.session_name)
            .bind(fmt_dt(&metadata.last_saved_at))
            .bind(metadata.checkpoint_count as i64)
            .bind(metadata.total_size as i64)
            .bind(metadata.is_active as i64)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        sqlx::query(UPSERT_CONFIG)
            .bind(config.user_id.to_string())
            .bind(config.auto_save_interval_secs as i64)
            .bind(config.retention_days)
            .bind(config.checkpoint_retention_days)
            .bind(config.max_session_size as i64)
            .bind(config.compression_enabled as i64)
            .bind(config.encryption_enabled as i64)
            .bind(config.quiet_hours_start.map(|t| t.to_string()))
            .bind(config.quiet_hours_end.map(|t| t.to_string()))
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        // One active session per user: everyone else steps down.
        sqlx::query("UPDATE sessions SET status = 'inactive' WHERE user_id = ? AND id <> ? AND status = 'active'")
            .bind(session.user_id.to_string())
            .bind(session.id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        sqlx::query("UPDATE session_metadata SET is_active = 0 WHERE user_id = ? AND session_id <> ?")
            .bind(session.user_id.to_string())
            .bind(session.id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        tx.commit().await.map_err(store_err)
    }

    async fn find_session(&self, id: SessionId) -> Result<Option<Session>, VaultError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        row.as_ref().map(Self::session_from_row).transpose()
    }

    async fn update_session_txn(&self, session: &Session, expected_version: u64) -> Result<(), VaultError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let result = sqlx::query(
            "UPDATE sessions SET name = ?, status = ?, last_saved_at = ?, expires_at = ?, \
             version = ?, state_checksum = ?, encryption_algorithm = ?, compression = ?, payload = ? \
             WHERE id = ? AND version = ?",
        )
        .bind(&session.name)
        .bind(session.status.as_str())
        .bind(fmt_dt(&session.last_saved_at))
        .bind(fmt_dt(&session.expires_at))
        .bind(session.version as i64)
        .bind(session.state_checksum.as_str())
        .bind(session.encryption_algorithm.as_str())
        .bind(session.compression.as_str())
        .bind(&session.payload)
        .bind(session.id.to_string())
        .bind(expected_version as i64)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            let stored: Option<(i64,)> = sqlx::query_as("SELECT version FROM sessions WHERE id = ?")
                .bind(session.id.to_string())
                .fetch_optional(&mut *tx)
                .await
                .map_err(store_err)?;
            return match stored {
                None => Err(VaultError::NotFound(format!("session {} not found", session.id))),
                Some((version,)) => Err(VaultError::VersionConflict(format!(
                    "session {} is at version {}, write observed {}",
                    session.id, version, expected_version
                ))),
            };
        }

        sqlx::query(
            "UPDATE session_metadata SET session_name = ?, last_saved_at = ?, total_size = ?, is_active = ? \
             WHERE session_id = ?",
        )
        .bind(&session.name)
        .bind(fmt_dt(&session.last_saved_at))
        .bind(session.payload.len() as i64)
        .bind(session.is_active() as i64)
        .bind(session.id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        tx.commit().await.map_err(store_err)
    }

    async fn list_sessions(&self, user_id: UserId, query: &SessionQuery) -> Result<SessionPage, VaultError> {
        let mut conditions = vec!["user_id = ?".to_string()];
        if query.workspace_id.is_some() {
            conditions.push("workspace_id = ?".to_string());
        }
        match query.is_active {
            Some(true) => conditions.push("status = 'active'".to_string()),
            Some(false) => conditions.push("status <> 'active'".to_string()),
            None => {}
        }
        let where_clause = conditions.join(" AND ");

        let count_sql = format!("SELECT COUNT(*) FROM sessions WHERE {}", where_clause);
        let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql).bind(user_id.to_string());
        if let Some(workspace_id) = query.workspace_id {
            count_query = count_query.bind(workspace_id.to_string());
        }
        let (total,) = count_query.fetch_one(&self.pool).await.map_err(store_err)?;

        let page_sql = format!(
            "SELECT * FROM sessions WHERE {} ORDER BY last_saved_at DESC, id ASC LIMIT ? OFFSET ?",
            where_clause
        );
        let mut page_query = sqlx::query(&page_sql).bind(user_id.to_string());
        if let Some(workspace_id) = query.workspace_id {
            page_query = page_query.bind(workspace_id.to_string());
        }
        let rows = page_query
            .bind(query.page_size as i64)
            .bind(query.offset() as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        let sessions = rows
            .iter()
            .map(Self::session_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SessionPage {
            sessions,
            total: total as u64,
        })
    }

    async fn delete_session(&self, id: SessionId) -> Result<bool, VaultError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_metadata(&self, session_id: SessionId) -> Result<Option<SessionMetadata>, VaultError> {
        let row = sqlx::query("SELECT * FROM session_metadata WHERE session_id = ?")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        row.as_ref().map(Self::metadata_from_row).transpose()
    }

    async fn count_active_for_user(&self, user_id: UserId) -> Result<u64, VaultError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions WHERE user_id = ? AND status = 'active'")
            .bind(user_id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(count as u64)
    }

    async fn find_config(&self, user_id: UserId) -> Result<Option<SessionConfig>, VaultError> {
        let row = sqlx::query("SELECT * FROM session_configs WHERE user_id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        row.as_ref().map(Self::config_from_row).transpose()
    }

    async fn upsert_config(&self, config: &SessionConfig) -> Result<(), VaultError> {
        sqlx::query(UPSERT_CONFIG)
            .bind(config.user_id.to_string())
            .bind(config.auto_save_interval_secs as i64)
            .bind(config.retention_days)
            .bind(config.checkpoint_retention_days)
            .bind(config.max_session_size as i64)
            .bind(config.compression_enabled as i64)
            .bind(config.encryption_enabled as i64)
            .bind(config.quiet_hours_start.map(|t| t.to_string()))
            .bind(config.quiet_hours_end.map(|t| t.to_string()))
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn list_configs(&self) -> Result<Vec<SessionConfig>, VaultError> {
        let rows = sqlx::query("SELECT * FROM session_configs")
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        rows.iter().map(Self::config_from_row).collect()
    }

    async fn find_expired_autosaved(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<SessionSizeRow>, VaultError> {
        let rows = sqlx::query(
            "SELECT id, LENGTH(payload) AS size FROM sessions \
             WHERE status <> 'active' AND expires_at < ? \
             ORDER BY expires_at ASC LIMIT ?",
        )
        .bind(fmt_dt(&cutoff))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter()
            .map(|row| {
                Ok(SessionSizeRow {
                    id: SessionId::parse(row.get::<String, _>("id").as_str())?,
                    size: row.get::<i64, _>("size") as u64,
                })
            })
            .collect()
    }

    async fn find_inactive_older_than(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<SessionSizeRow>, VaultError> {
        let rows = sqlx::query(
            "SELECT s.id AS id, LENGTH(s.payload) AS size \
             FROM sessions s JOIN session_metadata m ON m.session_id = s.id \
             WHERE m.is_active = 0 AND m.last_saved_at < ? \
             ORDER BY m.last_saved_at ASC LIMIT ?",
        )
        .bind(fmt_dt(&cutoff))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter()
            .map(|row| {
                Ok(SessionSizeRow {
                    id: SessionId::parse(row.get::<String, _>("id").as_str())?,
                    size: row.get::<i64, _>("size") as u64,
                })
            })
            .collect()
    }

    async fn delete_sessions(&self, ids: &[SessionId]) -> Result<u64, VaultError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("DELETE FROM sessions WHERE id IN ({})", placeholders);
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id.to_string());
        }
        let result = query.execute(&self.pool).await.map_err(store_err)?;
        Ok(result.rows_affected())
    }
}
