// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite Checkpoint Repository
//!
//! [`CheckpointRepository`] over a `SqlitePool`. The save composite counts
//! the session's checkpoints inside the transaction before inserting
//! (`CheckpointLimit`) and increments the metadata counter in the same
//! transaction; deletion decrements it; the retention recount rewrites
//! every counter from the checkpoint table itself.
//!
//! Tag filtering is match-all over a JSON text column, applied after the
//! SQL-able filters; sorting and tie-breaking happen in SQL so pagination
//! stays stable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use vault_domain::entities::Checkpoint;
use vault_domain::repositories::{
    CheckpointAgeRow, CheckpointFilter, CheckpointPage, CheckpointRepository, CheckpointSortKey, CheckpointStatsRow,
    OwnerScope, SortOrder,
};
use vault_domain::value_objects::{CheckpointId, Checksum, SessionId, UserId};
use vault_domain::VaultError;

use super::mapping::{fmt_dt, map_from_json, map_to_json, parse_dt, store_err, tags_from_json, tags_to_json};

/// SQLite-backed checkpoint repository.
pub struct SqliteCheckpointRepository {
    pool: SqlitePool,
}

impl SqliteCheckpointRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn checkpoint_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Checkpoint, VaultError> {
        Ok(Checkpoint {
            id: CheckpointId::parse(row.get::<String, _>("id").as_str())
                .map_err(|e| VaultError::StoreError(e.to_string()))?,
            session_id: SessionId::parse(row.get::<String, _>("session_id").as_str())?,
            name: row.get("name"),
            description: row.get("description"),
            priority: row.get::<String, _>("priority").parse()?,
            tags: tags_from_json(row.get::<String, _>("tags").as_str())?,
            is_auto_generated: row.get::<i64, _>("is_auto_generated") != 0,
            payload: row.get("payload"),
            state_checksum: Checksum::parse(row.get::<String, _>("state_checksum").as_str())?,
            encryption_algorithm: row.get::<String, _>("encryption_algorithm").parse()?,
            compression: row.get::<String, _>("compression").parse()?,
            compressed_size: row.get::<i64, _>("compressed_size") as u64,
            uncompressed_size: row.get::<i64, _>("uncompressed_size") as u64,
            created_at: parse_dt(row.get::<String, _>("created_at").as_str())?,
            metadata: map_from_json(row.get::<String, _>("metadata").as_str())?,
        })
    }

    fn order_clause(filter: &CheckpointFilter) -> String {
        let key = match filter.sort_key {
            CheckpointSortKey::CreatedAt => "created_at",
            CheckpointSortKey::Size => "compressed_size",
            CheckpointSortKey::Name => "name",
        };
        let order = match filter.sort_order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        format!("ORDER BY {} {}, id ASC", key, order)
    }
}

const INSERT_CHECKPOINT: &str = "INSERT INTO checkpoints \
    (id, session_id, name, description, priority, tags, is_auto_generated, payload, \
     state_checksum, encryption_algorithm, compression, compressed_size, uncompressed_size, \
     created_at, metadata) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

#[async_trait]
impl CheckpointRepository for SqliteCheckpointRepository {
    async fn save_checkpoint_txn(&self, checkpoint: &Checkpoint, max_per_session: u32) -> Result<(), VaultError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM checkpoints WHERE session_id = ?")
            .bind(checkpoint.session_id.to_string())
            .fetch_one(&mut *tx)
            .await
            .map_err(store_err)?;
        if count as u32 >= max_per_session {
            return Err(VaultError::CheckpointLimit(format!(
                "session {} already holds {} checkpoints (limit {})",
                checkpoint.session_id, count, max_per_session
            )));
        }

        sqlx::query(INSERT_CHECKPOINT)
            .bind(checkpoint.id.to_string())
            .bind(checkpoint.session_id.to_string())
            .bind(&checkpoint.name)
            .bind(&checkpoint.description)
            .bind(checkpoint.priority.as_str())
            .bind(tags_to_json(&checkpoint.tags))
            .bind(checkpoint.is_auto_generated as i64)
            .bind(&checkpoint.payload)
            .bind(checkpoint.state_checksum.as_str())
            .bind(checkpoint.encryption_algorithm.as_str())
            .bind(checkpoint.compression.as_str())
            .bind(checkpoint.compressed_size as i64)
            .bind(checkpoint.uncompressed_size as i64)
            .bind(fmt_dt(&checkpoint.created_at))
            .bind(map_to_json(&checkpoint.metadata))
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        sqlx::query("UPDATE session_metadata SET checkpoint_count = checkpoint_count + 1 WHERE session_id = ?")
            .bind(checkpoint.session_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        tx.commit().await.map_err(store_err)
    }

    async fn find_checkpoint(&self, id: CheckpointId) -> Result<Option<Checkpoint>, VaultError> {
        let row = sqlx::query("SELECT * FROM checkpoints WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        row.as_ref().map(Self::checkpoint_from_row).transpose()
    }

    async fn update_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), VaultError> {
        let result = sqlx::query(
            "UPDATE checkpoints SET name = ?, description = ?, priority = ?, tags = ?, metadata = ? WHERE id = ?",
        )
        .bind(&checkpoint.name)
        .bind(&checkpoint.description)
        .bind(checkpoint.priority.as_str())
        .bind(tags_to_json(&checkpoint.tags))
        .bind(map_to_json(&checkpoint.metadata))
        .bind(checkpoint.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(VaultError::NotFound(format!("checkpoint {} not found", checkpoint.id)));
        }
        Ok(())
    }

    async fn query_checkpoints(&self, filter: &CheckpointFilter) -> Result<CheckpointPage, VaultError> {
        let mut conditions = Vec::new();
        if filter.session_id.is_some() {
            conditions.push("session_id = ?");
        }
        if filter.date_from.is_some() {
            conditions.push("created_at >= ?");
        }
        if filter.date_to.is_some() {
            conditions.push("created_at < ?");
        }
        if filter.is_auto_generated.is_some() {
            conditions.push("is_auto_generated = ?");
        }
        if filter.priority.is_some() {
            conditions.push("priority = ?");
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT * FROM checkpoints {} {}",
            where_clause,
            Self::order_clause(filter)
        );
        let mut query = sqlx::query(&sql);
        if let Some(session_id) = filter.session_id {
            query = query.bind(session_id.to_string());
        }
        if let Some(from) = filter.date_from {
            query = query.bind(fmt_dt(&from));
        }
        if let Some(to) = filter.date_to {
            query = query.bind(fmt_dt(&to));
        }
        if let Some(auto) = filter.is_auto_generated {
            query = query.bind(auto as i64);
        }
        if let Some(priority) = filter.priority {
            query = query.bind(priority.as_str());
        }

        let rows = query.fetch_all(&self.pool).await.map_err(store_err)?;
        let mut checkpoints = rows
            .iter()
            .map(Self::checkpoint_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        // Match-all tag filter over the JSON column.
        if !filter.tags.is_empty() {
            checkpoints.retain(|c| filter.tags.iter().all(|tag| c.tags.contains(tag)));
        }

        let total = checkpoints.len() as u64;
        let offset = filter.offset as usize;
        let items: Vec<Checkpoint> = match filter.limit {
            Some(limit) => checkpoints.into_iter().skip(offset).take(limit as usize).collect(),
            None => checkpoints.into_iter().skip(offset).collect(),
        };
        let has_more = (offset as u64 + items.len() as u64) < total;

        Ok(CheckpointPage { items, total, has_more })
    }

    async fn delete_checkpoint_txn(&self, id: CheckpointId) -> Result<bool, VaultError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let session_id: Option<(String,)> = sqlx::query_as("SELECT session_id FROM checkpoints WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_err)?;
        let Some((session_id,)) = session_id else {
            return Ok(false);
        };

        sqlx::query("DELETE FROM checkpoints WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        sqlx::query(
            "UPDATE session_metadata SET checkpoint_count = \
             CASE WHEN checkpoint_count > 0 THEN checkpoint_count - 1 ELSE 0 END \
             WHERE session_id = ?",
        )
        .bind(&session_id)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;
        Ok(true)
    }

    async fn count_for_session(&self, session_id: SessionId) -> Result<u64, VaultError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM checkpoints WHERE session_id = ?")
            .bind(session_id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(count as u64)
    }

    async fn stats_rows(&self, session_id: Option<SessionId>) -> Result<Vec<CheckpointStatsRow>, VaultError> {
        let sql = match session_id {
            Some(_) => {
                "SELECT priority, tags, compressed_size, uncompressed_size, created_at \
                 FROM checkpoints WHERE session_id = ?"
            }
            None => "SELECT priority, tags, compressed_size, uncompressed_size, created_at FROM checkpoints",
        };
        let mut query = sqlx::query(sql);
        if let Some(session_id) = session_id {
            query = query.bind(session_id.to_string());
        }
        let rows = query.fetch_all(&self.pool).await.map_err(store_err)?;

        rows.iter()
            .map(|row| {
                Ok(CheckpointStatsRow {
                    priority: row.get::<String, _>("priority").parse()?,
                    tags: tags_from_json(row.get::<String, _>("tags").as_str())?,
                    compressed_size: row.get::<i64, _>("compressed_size") as u64,
                    uncompressed_size: row.get::<i64, _>("uncompressed_size") as u64,
                    created_at: parse_dt(row.get::<String, _>("created_at").as_str())?,
                })
            })
            .collect()
    }

    async fn find_older_than(
        &self,
        cutoff: DateTime<Utc>,
        scope: OwnerScope,
        limit: u32,
    ) -> Result<Vec<CheckpointAgeRow>, VaultError> {
        let scope_clause = match &scope {
            OwnerScope::All => String::new(),
            OwnerScope::Only(_) => "AND s.user_id = ?".to_string(),
            OwnerScope::Excluding(users) => {
                if users.is_empty() {
                    String::new()
                } else {
                    let placeholders = vec!["?"; users.len()].join(", ");
                    format!("AND s.user_id NOT IN ({})", placeholders)
                }
            }
        };

        let sql = format!(
            "SELECT c.id AS id, c.session_id AS session_id, s.user_id AS user_id, \
                    c.created_at AS created_at, c.compressed_size AS compressed_size \
             FROM checkpoints c JOIN sessions s ON s.id = c.session_id \
             WHERE c.created_at < ? {} \
             ORDER BY c.created_at ASC LIMIT ?",
            scope_clause
        );

        let mut query = sqlx::query(&sql).bind(fmt_dt(&cutoff));
        match &scope {
            OwnerScope::All => {}
            OwnerScope::Only(user_id) => query = query.bind(user_id.to_string()),
            OwnerScope::Excluding(users) => {
                for user_id in users {
                    query = query.bind(user_id.to_string());
                }
            }
        }
        let rows = query
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        rows.iter()
            .map(|row| {
                Ok(CheckpointAgeRow {
                    id: CheckpointId::parse(row.get::<String, _>("id").as_str())
                        .map_err(|e| VaultError::StoreError(e.to_string()))?,
                    session_id: SessionId::parse(row.get::<String, _>("session_id").as_str())?,
                    user_id: UserId::parse(row.get::<String, _>("user_id").as_str())
                        .map_err(|e| VaultError::StoreError(e.to_string()))?,
                    created_at: parse_dt(row.get::<String, _>("created_at").as_str())?,
                    compressed_size: row.get::<i64, _>("compressed_size") as u64,
                })
            })
            .collect()
    }

    async fn delete_checkpoints(&self, ids: &[CheckpointId]) -> Result<u64, VaultError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("DELETE FROM checkpoints WHERE id IN ({})", placeholders);
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id.to_string());
        }
        let result = query.execute(&self.pool).await.map_err(store_err)?;
        Ok(result.rows_affected())
    }

    async fn recount_metadata(&self) -> Result<(), VaultError> {
        sqlx::query(
            "UPDATE session_metadata SET checkpoint_count = \
             (SELECT COUNT(*) FROM checkpoints WHERE checkpoints.session_id = session_metadata.session_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }
}
