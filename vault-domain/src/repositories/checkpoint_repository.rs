// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Checkpoint Repository Port
//!
//! Persistence abstraction for checkpoints. `save_checkpoint_txn` enforces
//! the per-session checkpoint cap by count-and-compare inside the write
//! transaction and increments the session's metadata counter in the same
//! transaction, so metadata consistency holds at every transaction boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::entities::{Checkpoint, CheckpointPriority};
use crate::value_objects::{CheckpointId, SessionId, UserId};
use crate::VaultError;

/// Sort key for checkpoint listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckpointSortKey {
    #[default]
    CreatedAt,
    Size,
    Name,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Filter, sort, and pagination options for checkpoint queries.
///
/// The date range is half-open: `date_from <= created_at < date_to`.
/// `tags` is match-all. Ties on the sort key break by id so pagination is
/// stable.
#[derive(Debug, Clone, Default)]
pub struct CheckpointFilter {
    pub session_id: Option<SessionId>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub tags: BTreeSet<String>,
    pub is_auto_generated: Option<bool>,
    pub priority: Option<CheckpointPriority>,
    pub sort_key: CheckpointSortKey,
    pub sort_order: SortOrder,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// One page of checkpoints plus total and continuation flag.
#[derive(Debug, Clone)]
pub struct CheckpointPage {
    pub items: Vec<Checkpoint>,
    pub total: u64,
    pub has_more: bool,
}

/// Payload-free row used by the statistics aggregation.
#[derive(Debug, Clone)]
pub struct CheckpointStatsRow {
    pub priority: CheckpointPriority,
    pub tags: BTreeSet<String>,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub created_at: DateTime<Utc>,
}

/// Age row used by the retention pass, carrying the owner so per-user
/// retention overrides can be applied.
#[derive(Debug, Clone)]
pub struct CheckpointAgeRow {
    pub id: CheckpointId,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub compressed_size: u64,
}

/// Owner scope for retention queries: everyone, one user, or everyone
/// except the listed users (whose custom retention is handled separately).
#[derive(Debug, Clone)]
pub enum OwnerScope {
    All,
    Only(UserId),
    Excluding(Vec<UserId>),
}

/// Persistence port for checkpoints.
#[async_trait]
pub trait CheckpointRepository: Send + Sync {
    /// Atomically: insert the checkpoint, failing `CheckpointLimit` when the
    /// session already holds `max_per_session` checkpoints (counted inside
    /// the transaction), and increment the session's metadata
    /// `checkpoint_count`.
    async fn save_checkpoint_txn(&self, checkpoint: &Checkpoint, max_per_session: u32) -> Result<(), VaultError>;

    /// Loads a checkpoint by id
    async fn find_checkpoint(&self, id: CheckpointId) -> Result<Option<Checkpoint>, VaultError>;

    /// Persists patched descriptive fields
    async fn update_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), VaultError>;

    /// Filtered, sorted, paginated listing
    async fn query_checkpoints(&self, filter: &CheckpointFilter) -> Result<CheckpointPage, VaultError>;

    /// Atomically: delete one checkpoint and decrement its session's
    /// metadata counter. Returns whether a row was removed.
    async fn delete_checkpoint_txn(&self, id: CheckpointId) -> Result<bool, VaultError>;

    /// Counts checkpoints belonging to a session
    async fn count_for_session(&self, session_id: SessionId) -> Result<u64, VaultError>;

    /// Payload-free rows feeding the statistics aggregation
    async fn stats_rows(&self, session_id: Option<SessionId>) -> Result<Vec<CheckpointStatsRow>, VaultError>;

    /// Retention pass 2 source: checkpoints created before the cutoff,
    /// oldest first, at most `limit` rows, with owning user attached and
    /// the owner scope applied.
    async fn find_older_than(
        &self,
        cutoff: DateTime<Utc>,
        scope: OwnerScope,
        limit: u32,
    ) -> Result<Vec<CheckpointAgeRow>, VaultError>;

    /// Bulk hard delete; returns the number of checkpoints removed
    async fn delete_checkpoints(&self, ids: &[CheckpointId]) -> Result<u64, VaultError>;

    /// Recomputes `checkpoint_count` for every surviving session's metadata
    /// row from the actual checkpoint table (idempotent recount, not a
    /// decrement).
    async fn recount_metadata(&self) -> Result<(), VaultError>;
}
