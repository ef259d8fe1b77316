// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Session Repository Port
//!
//! Persistence abstraction for sessions, their metadata projections, and
//! per-user configuration. The multi-row operations (`create_session_txn`,
//! `update_session_txn`) are transactional composites: either every row
//! lands or none does. The implementation enforces the optimistic
//! `version` guard and the one-active-session-per-user invariant inside the
//! write transaction, never via caches.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::{Session, SessionConfig, SessionMetadata};
use crate::value_objects::{SessionId, UserId, WorkspaceId};
use crate::VaultError;

/// Listing query for a user's sessions.
#[derive(Debug, Clone)]
pub struct SessionQuery {
    pub workspace_id: Option<WorkspaceId>,
    pub is_active: Option<bool>,
    /// 1-based page number
    pub page: u32,
    pub page_size: u32,
}

impl Default for SessionQuery {
    fn default() -> Self {
        Self {
            workspace_id: None,
            is_active: None,
            page: 1,
            page_size: 50,
        }
    }
}

impl SessionQuery {
    pub fn offset(&self) -> u32 {
        self.page.saturating_sub(1) * self.page_size
    }
}

/// One page of sessions plus the total match count.
#[derive(Debug, Clone)]
pub struct SessionPage {
    pub sessions: Vec<Session>,
    pub total: u64,
}

/// Id-and-size row used by the retention passes.
#[derive(Debug, Clone, Copy)]
pub struct SessionSizeRow {
    pub id: SessionId,
    pub size: u64,
}

/// Persistence port for sessions, metadata, and per-user config.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Atomically: insert the session and its metadata projection, upsert
    /// the user's config, and deactivate every other session of the same
    /// user (rows and metadata both). Rolls back entirely on any failure.
    async fn create_session_txn(
        &self,
        session: &Session,
        metadata: &SessionMetadata,
        config: &SessionConfig,
    ) -> Result<(), VaultError>;

    /// Loads a session by id
    async fn find_session(&self, id: SessionId) -> Result<Option<Session>, VaultError>;

    /// Atomically persists an updated session row and refreshes its metadata
    /// projection. The write is guarded on `expected_version`; when the
    /// stored version differs the call fails `VersionConflict` and nothing
    /// is written.
    async fn update_session_txn(&self, session: &Session, expected_version: u64) -> Result<(), VaultError>;

    /// Paginated listing ordered by `last_saved_at` descending
    async fn list_sessions(&self, user_id: UserId, query: &SessionQuery) -> Result<SessionPage, VaultError>;

    /// Hard delete; checkpoints and metadata cascade. Returns whether a row
    /// was removed.
    async fn delete_session(&self, id: SessionId) -> Result<bool, VaultError>;

    /// Loads the metadata projection for a session
    async fn find_metadata(&self, session_id: SessionId) -> Result<Option<SessionMetadata>, VaultError>;

    /// Counts the user's active sessions
    async fn count_active_for_user(&self, user_id: UserId) -> Result<u64, VaultError>;

    /// Loads the user's config row
    async fn find_config(&self, user_id: UserId) -> Result<Option<SessionConfig>, VaultError>;

    /// Inserts or replaces the user's config row
    async fn upsert_config(&self, config: &SessionConfig) -> Result<(), VaultError>;

    /// Lists every user config row (the retention scheduler applies
    /// per-user overrides from these)
    async fn list_configs(&self) -> Result<Vec<SessionConfig>, VaultError>;

    /// Retention pass 1 source: non-active sessions whose `expires_at` is
    /// before the cutoff, oldest first, at most `limit` rows.
    async fn find_expired_autosaved(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<SessionSizeRow>, VaultError>;

    /// Retention pass 3 source: non-active sessions (joined through
    /// metadata) whose `last_saved_at` is before the cutoff.
    async fn find_inactive_older_than(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<SessionSizeRow>, VaultError>;

    /// Bulk hard delete; returns the number of sessions removed
    async fn delete_sessions(&self, ids: &[SessionId]) -> Result<u64, VaultError>;
}
