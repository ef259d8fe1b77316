// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Retention & Rotation Scheduler
//!
//! Out-of-band maintenance: retention cleanup over sessions and
//! checkpoints, and the automatic key-rotation scan. The host decides the
//! cadence (cron, tokio interval, manual trigger); this service only
//! exposes the passes, each of which is idempotent — a second run with no
//! intervening writes deletes nothing.
//!
//! ## Cleanup passes
//!
//! [`RetentionScheduler::cleanup_expired_sessions`] runs three passes in
//! sequence, each paging at most 1000 ids per batch and summing
//! `space_freed` from the affected rows' sizes before deletion:
//!
//! 1. expired auto-saved sessions (`expires_at` past the grace cutoff, not
//!    active)
//! 2. old checkpoints (per-user retention overrides honored), followed by
//!    an idempotent recount of every surviving session's checkpoint counter
//! 3. inactive sessions via the metadata join
//!
//! ## Rotation scan
//!
//! [`RetentionScheduler::scan_for_rotation`] emits a `KeyRotationDue` event
//! for each active key past the rotation interval. Due times are spread by
//! a deterministic per-key offset within one eighth of the interval, so
//! rotations do not cluster at boot. Keys already queued are collapsed
//! until [`RetentionScheduler::complete_rotation`] releases them.

use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use vault_domain::repositories::{CheckpointRepository, KeyRepository, OwnerScope, SessionRepository};
use vault_domain::value_objects::{CheckpointId, SessionId, UserId};
use vault_domain::{VaultError, VaultEvent};

use crate::application::services::key_manager::RotationSettings;

/// Batch ceiling for every cleanup query.
const CLEANUP_BATCH: u32 = 1_000;

/// Retention windows, in days. Overridable per user via `SessionConfig`
/// (checkpoint retention; session retention shapes `expires_at` at write
/// time).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSettings {
    /// Grace past `expires_at` for non-active auto-saved sessions
    pub auto_saved_days: i64,
    /// Checkpoint age limit
    pub checkpoint_days: i64,
    /// Grace past `last_saved_at` for inactive sessions
    pub inactive_days: i64,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            auto_saved_days: 30,
            checkpoint_days: 90,
            inactive_days: 7,
        }
    }
}

/// Aggregate reply from a cleanup run.
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    pub auto_saved_deleted: u64,
    pub checkpoints_deleted: u64,
    pub inactive_deleted: u64,
    pub total_sessions_deleted: u64,
    pub space_freed: u64,
    pub event: Option<VaultEvent>,
}

/// Maintenance service for retention and key rotation.
pub struct RetentionScheduler {
    sessions: Arc<dyn SessionRepository>,
    checkpoints: Arc<dyn CheckpointRepository>,
    keys: Arc<dyn KeyRepository>,
    settings: RetentionSettings,
    rotation: RotationSettings,
    pending_rotations: Mutex<HashSet<String>>,
}

impl RetentionScheduler {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        checkpoints: Arc<dyn CheckpointRepository>,
        keys: Arc<dyn KeyRepository>,
        settings: RetentionSettings,
        rotation: RotationSettings,
    ) -> Self {
        Self {
            sessions,
            checkpoints,
            keys,
            settings,
            rotation,
            pending_rotations: Mutex::new(HashSet::new()),
        }
    }

    /// Runs the three retention passes in sequence.
    pub async fn cleanup_expired_sessions(&self) -> Result<CleanupReport, VaultError> {
        let mut report = CleanupReport::default();
        let now = Utc::now();

        // Pass 1: expired auto-saved sessions past the grace window.
        let cutoff = now - Duration::days(self.settings.auto_saved_days);
        loop {
            let rows = self.sessions.find_expired_autosaved(cutoff, CLEANUP_BATCH).await?;
            if rows.is_empty() {
                break;
            }
            let ids: Vec<SessionId> = rows.iter().map(|r| r.id).collect();
            report.space_freed += rows.iter().map(|r| r.size).sum::<u64>();
            report.auto_saved_deleted += self.sessions.delete_sessions(&ids).await?;
        }

        // Pass 2: old checkpoints, per-user retention honored, then an
        // idempotent recount of the surviving counters.
        let overrides = self.checkpoint_retention_overrides().await?;
        for (user_id, days) in &overrides {
            let user_cutoff = now - Duration::days(*days);
            report.checkpoints_deleted += self
                .delete_checkpoints_older_than(user_cutoff, OwnerScope::Only(*user_id), &mut report.space_freed)
                .await?;
        }
        let default_cutoff = now - Duration::days(self.settings.checkpoint_days);
        let excluded: Vec<UserId> = overrides.keys().copied().collect();
        let scope = if excluded.is_empty() {
            OwnerScope::All
        } else {
            OwnerScope::Excluding(excluded)
        };
        report.checkpoints_deleted += self
            .delete_checkpoints_older_than(default_cutoff, scope, &mut report.space_freed)
            .await?;
        self.checkpoints.recount_metadata().await?;

        // Pass 3: inactive sessions via the metadata join.
        let cutoff = now - Duration::days(self.settings.inactive_days);
        loop {
            let rows = self.sessions.find_inactive_older_than(cutoff, CLEANUP_BATCH).await?;
            if rows.is_empty() {
                break;
            }
            let ids: Vec<SessionId> = rows.iter().map(|r| r.id).collect();
            report.space_freed += rows.iter().map(|r| r.size).sum::<u64>();
            report.inactive_deleted += self.sessions.delete_sessions(&ids).await?;
        }

        report.total_sessions_deleted = report.auto_saved_deleted + report.inactive_deleted;
        info!(
            auto_saved = report.auto_saved_deleted,
            checkpoints = report.checkpoints_deleted,
            inactive = report.inactive_deleted,
            space_freed = report.space_freed,
            "retention cleanup finished"
        );
        report.event = Some(VaultEvent::CleanupCompleted {
            sessions_deleted: report.total_sessions_deleted,
            checkpoints_deleted: report.checkpoints_deleted,
            space_freed: report.space_freed,
            occurred_at: Utc::now(),
        });
        Ok(report)
    }

    /// Scans active keys for rotation due-ness and emits one
    /// `KeyRotationDue` per key whose (jittered) due time has passed.
    /// Already-queued keys are collapsed.
    pub async fn scan_for_rotation(&self) -> Result<Vec<VaultEvent>, VaultError> {
        let now = Utc::now();
        let interval = Duration::days(self.rotation.max_key_age_days);
        let cutoff = now - interval;

        let candidates = self.keys.find_active_created_before(cutoff, CLEANUP_BATCH).await?;
        let mut events = Vec::new();
        let mut pending = self.pending_rotations.lock();

        for key in candidates {
            let due_at = key.created_at + interval + rotation_jitter(key.key_id.as_str(), interval);
            if due_at > now {
                continue;
            }
            if !pending.insert(key.key_id.as_str().to_string()) {
                // Already queued; collapse.
                continue;
            }
            debug!(key = %key.key_id, user = %key.user_id, due = %due_at, "key rotation due");
            events.push(VaultEvent::KeyRotationDue {
                user_id: key.user_id,
                key_id: key.key_id.clone(),
                due_at,
                occurred_at: now,
            });
        }

        if !events.is_empty() {
            info!(
                due = events.len(),
                auto_rotate = self.rotation.auto_rotate,
                "rotation scan found due keys"
            );
        }
        Ok(events)
    }

    /// Releases a key from the pending-rotation set once its rotation task
    /// finished (or failed and should be retried by a later scan).
    pub fn complete_rotation(&self, key_id: &str) {
        self.pending_rotations.lock().remove(key_id);
    }

    /// Whether the host should enqueue rotation tasks for due keys
    pub fn auto_rotate_enabled(&self) -> bool {
        self.rotation.auto_rotate
    }

    async fn checkpoint_retention_overrides(&self) -> Result<HashMap<UserId, i64>, VaultError> {
        let configs = self.sessions.list_configs().await?;
        Ok(configs
            .into_iter()
            .filter(|c| c.checkpoint_retention_days != self.settings.checkpoint_days)
            .map(|c| (c.user_id, c.checkpoint_retention_days))
            .collect())
    }

    async fn delete_checkpoints_older_than(
        &self,
        cutoff: DateTime<Utc>,
        scope: OwnerScope,
        space_freed: &mut u64,
    ) -> Result<u64, VaultError> {
        let mut deleted = 0u64;
        loop {
            let rows = self
                .checkpoints
                .find_older_than(cutoff, scope.clone(), CLEANUP_BATCH)
                .await?;
            if rows.is_empty() {
                break;
            }
            let ids: Vec<CheckpointId> = rows.iter().map(|r| r.id).collect();
            *space_freed += rows.iter().map(|r| r.compressed_size).sum::<u64>();
            deleted += self.checkpoints.delete_checkpoints(&ids).await?;
        }
        Ok(deleted)
    }
}

/// Deterministic per-key rotation offset within one eighth of the interval.
fn rotation_jitter(key_id: &str, interval: Duration) -> Duration {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key_id.hash(&mut hasher);
    let window = (interval.num_seconds() / 8).max(1);
    Duration::seconds((hasher.finish() % window as u64) as i64)
}
