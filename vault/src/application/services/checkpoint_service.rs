// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Checkpoint Store
//!
//! Application service for named snapshots: create, query, patch, delete,
//! restore, and aggregate statistics. Checkpoints always serialize as full
//! payloads — a checkpoint must be restorable standing alone, with no base
//! state anywhere.
//!
//! Bulk deletion never short-circuits: every id is attempted and the reply
//! carries the success count alongside per-id errors. Partial success is
//! the expected shape, not a failure.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};

use vault_domain::entities::{
    Checkpoint, CheckpointPatch, CheckpointPriority, OperationContext, Session, MAX_CHECKPOINTS_PER_SESSION,
};
use vault_domain::repositories::{CheckpointFilter, CheckpointPage, CheckpointRepository, SessionRepository};
use vault_domain::services::CryptoProvider;
use vault_domain::value_objects::{CheckpointId, SessionId, WorkspaceState};
use vault_domain::{VaultError, VaultEvent};

use crate::application::services::state_serializer::{SerializerConfig, StateSerializer};

/// Request to create a checkpoint.
#[derive(Debug, Clone)]
pub struct CreateCheckpointRequest {
    pub session_id: SessionId,
    pub name: String,
    pub description: Option<String>,
    pub priority: CheckpointPriority,
    pub tags: BTreeSet<String>,
    pub is_auto_generated: bool,
    pub metadata: Map<String, Value>,
    pub state: WorkspaceState,
    /// Re-check the state shape before serializing (default true)
    pub validate_state: bool,
    /// Encrypt the checkpoint payload (requires `encryption_key`)
    pub encrypt_data: bool,
    pub encryption_key: Option<String>,
}

impl CreateCheckpointRequest {
    pub fn new(session_id: SessionId, name: impl Into<String>, state: WorkspaceState) -> Self {
        Self {
            session_id,
            name: name.into(),
            description: None,
            priority: CheckpointPriority::default(),
            tags: BTreeSet::new(),
            is_auto_generated: false,
            metadata: Map::new(),
            state,
            validate_state: true,
            encrypt_data: false,
            encryption_key: None,
        }
    }
}

/// Reply for bulk checkpoint deletion.
#[derive(Debug, Clone, Default)]
pub struct BatchDeleteOutcome {
    pub deleted: u64,
    pub errors: Vec<String>,
}

/// Result of restoring a session from a checkpoint.
#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    pub session: Session,
    pub state: WorkspaceState,
    pub event: VaultEvent,
}

/// Aggregate checkpoint statistics.
#[derive(Debug, Clone, Default)]
pub struct CheckpointStatistics {
    pub total_count: u64,
    pub total_compressed_size: u64,
    pub total_uncompressed_size: u64,
    pub average_size: f64,
    pub oldest: Option<chrono::DateTime<chrono::Utc>>,
    pub newest: Option<chrono::DateTime<chrono::Utc>>,
    pub count_by_priority: BTreeMap<String, u64>,
    pub count_by_tag: BTreeMap<String, u64>,
    /// `Σ uncompressed / Σ compressed`; 1.0 when both sums are zero
    pub compression_ratio: f64,
}

/// Application service for checkpoint persistence.
pub struct CheckpointService {
    checkpoints: Arc<dyn CheckpointRepository>,
    sessions: Arc<dyn SessionRepository>,
    crypto: Arc<dyn CryptoProvider>,
}

impl CheckpointService {
    pub fn new(
        checkpoints: Arc<dyn CheckpointRepository>,
        sessions: Arc<dyn SessionRepository>,
        crypto: Arc<dyn CryptoProvider>,
    ) -> Self {
        Self {
            checkpoints,
            sessions,
            crypto,
        }
    }

    /// Creates a checkpoint from a workspace state.
    pub async fn create_checkpoint(
        &self,
        ctx: &OperationContext,
        request: CreateCheckpointRequest,
    ) -> Result<Checkpoint, VaultError> {
        ctx.check_deadline()?;

        if request.encrypt_data && request.encryption_key.is_none() {
            return Err(VaultError::MissingKey(
                "checkpoint encryption requested without a key".to_string(),
            ));
        }

        let session = self
            .sessions
            .find_session(request.session_id)
            .await?
            .ok_or_else(|| VaultError::SessionNotFound(format!("session {} not found", request.session_id)))?;

        if request.validate_state {
            let value = serde_json::to_value(&request.state)?;
            WorkspaceState::validate_shape(&value)?;
        }

        let config = self
            .sessions
            .find_config(session.user_id)
            .await?
            .unwrap_or_else(|| vault_domain::entities::SessionConfig::defaults_for(session.user_id));

        // Checkpoints are standalone: always a full serialization.
        let serializer = StateSerializer::new(
            SerializerConfig {
                max_session_size: config.max_session_size,
                compression_enabled: config.compression_enabled,
                encryption_enabled: request.encrypt_data,
            },
            Arc::clone(&self.crypto),
        );
        let sealed = serializer.serialize(&request.state, request.encryption_key.as_deref())?;
        let encryption = sealed.encryption_algorithm();
        let compression = sealed.compression();

        let checkpoint = Checkpoint::create(
            request.session_id,
            &request.name,
            request.description.as_deref(),
            request.priority,
            request.tags,
            request.is_auto_generated,
            sealed.data,
            sealed.checksum,
            encryption,
            compression,
            sealed.size,
            sealed.uncompressed_size,
            request.metadata,
        )?;

        ctx.check_deadline()?;
        self.checkpoints
            .save_checkpoint_txn(&checkpoint, MAX_CHECKPOINTS_PER_SESSION)
            .await?;

        info!(checkpoint = %checkpoint.id, session = %checkpoint.session_id, "created checkpoint");
        Ok(checkpoint)
    }

    /// Filtered, sorted, paginated checkpoint listing
    pub async fn get_checkpoints(
        &self,
        ctx: &OperationContext,
        filter: CheckpointFilter,
    ) -> Result<CheckpointPage, VaultError> {
        ctx.check_deadline()?;
        self.checkpoints.query_checkpoints(&filter).await
    }

    /// Patches the mutable descriptive fields of a checkpoint
    pub async fn update_checkpoint(
        &self,
        ctx: &OperationContext,
        checkpoint_id: CheckpointId,
        patch: CheckpointPatch,
    ) -> Result<Checkpoint, VaultError> {
        ctx.check_deadline()?;

        let mut checkpoint = self
            .checkpoints
            .find_checkpoint(checkpoint_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("checkpoint {} not found", checkpoint_id)))?;

        checkpoint.apply_patch(patch)?;
        ctx.check_deadline()?;
        self.checkpoints.update_checkpoint(&checkpoint).await?;
        debug!(checkpoint = %checkpoint_id, "updated checkpoint");
        Ok(checkpoint)
    }

    /// Deletes one checkpoint
    pub async fn delete_checkpoint(&self, ctx: &OperationContext, checkpoint_id: CheckpointId) -> Result<(), VaultError> {
        ctx.check_deadline()?;
        let removed = self.checkpoints.delete_checkpoint_txn(checkpoint_id).await?;
        if !removed {
            return Err(VaultError::NotFound(format!("checkpoint {} not found", checkpoint_id)));
        }
        Ok(())
    }

    /// Deletes a batch of checkpoints. Each id is attempted independently;
    /// the reply reports successes and per-id failures together.
    pub async fn delete_checkpoints(
        &self,
        ctx: &OperationContext,
        checkpoint_ids: &[CheckpointId],
    ) -> Result<BatchDeleteOutcome, VaultError> {
        let mut outcome = BatchDeleteOutcome::default();
        for id in checkpoint_ids {
            if let Err(e) = ctx.check_deadline() {
                outcome.errors.push(format!("{}: {}", id, e));
                continue;
            }
            match self.checkpoints.delete_checkpoint_txn(*id).await {
                Ok(true) => outcome.deleted += 1,
                Ok(false) => outcome.errors.push(format!("{}: not found", id)),
                Err(e) => outcome.errors.push(format!("{}: {}", id, e)),
            }
        }
        info!(
            deleted = outcome.deleted,
            failed = outcome.errors.len(),
            "batch checkpoint deletion finished"
        );
        Ok(outcome)
    }

    /// Restores the parent session from a checkpoint: the session's payload,
    /// checksum, and algorithms are overwritten atomically, its version
    /// bumped, and `last_saved_at` refreshed.
    pub async fn restore_from_checkpoint(
        &self,
        ctx: &OperationContext,
        checkpoint_id: CheckpointId,
        password: Option<&str>,
    ) -> Result<RestoreOutcome, VaultError> {
        ctx.check_deadline()?;

        let checkpoint = self
            .checkpoints
            .find_checkpoint(checkpoint_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("checkpoint {} not found", checkpoint_id)))?;

        let mut session = self
            .sessions
            .find_session(checkpoint.session_id)
            .await?
            .ok_or_else(|| VaultError::SessionNotFound(format!("session {} not found", checkpoint.session_id)))?;

        let config = self
            .sessions
            .find_config(session.user_id)
            .await?
            .unwrap_or_else(|| vault_domain::entities::SessionConfig::defaults_for(session.user_id));

        // Verify the checkpoint payload (and the password) before touching
        // the session row.
        let serializer = StateSerializer::new(
            SerializerConfig {
                max_session_size: config.max_session_size,
                compression_enabled: config.compression_enabled,
                encryption_enabled: true,
            },
            Arc::clone(&self.crypto),
        );
        let state = serializer.deserialize(
            &checkpoint.payload,
            &checkpoint.state_checksum,
            checkpoint.encryption_algorithm,
            checkpoint.compression,
            password,
        )?;

        let expected_version = session.version;
        session.apply_update(
            checkpoint.payload.clone(),
            checkpoint.state_checksum.clone(),
            checkpoint.encryption_algorithm,
            checkpoint.compression,
        )?;

        ctx.check_deadline()?;
        self.sessions.update_session_txn(&session, expected_version).await?;

        info!(session = %session.id, checkpoint = %checkpoint_id, "restored session from checkpoint");
        let event = VaultEvent::SessionRestored {
            session_id: session.id,
            checkpoint_id,
            occurred_at: session.last_saved_at,
        };
        Ok(RestoreOutcome { session, state, event })
    }

    /// Aggregate statistics over all checkpoints, or one session's
    pub async fn get_checkpoint_statistics(
        &self,
        ctx: &OperationContext,
        session_id: Option<SessionId>,
    ) -> Result<CheckpointStatistics, VaultError> {
        ctx.check_deadline()?;
        let rows = self.checkpoints.stats_rows(session_id).await?;

        let mut stats = CheckpointStatistics {
            compression_ratio: 1.0,
            ..Default::default()
        };
        if rows.is_empty() {
            return Ok(stats);
        }

        for row in &rows {
            stats.total_count += 1;
            stats.total_compressed_size += row.compressed_size;
            stats.total_uncompressed_size += row.uncompressed_size;
            *stats
                .count_by_priority
                .entry(row.priority.as_str().to_string())
                .or_insert(0) += 1;
            for tag in &row.tags {
                *stats.count_by_tag.entry(tag.clone()).or_insert(0) += 1;
            }
            stats.oldest = Some(match stats.oldest {
                Some(oldest) => oldest.min(row.created_at),
                None => row.created_at,
            });
            stats.newest = Some(match stats.newest {
                Some(newest) => newest.max(row.created_at),
                None => row.created_at,
            });
        }

        stats.average_size = stats.total_compressed_size as f64 / stats.total_count as f64;
        stats.compression_ratio = if stats.total_compressed_size == 0 && stats.total_uncompressed_size == 0 {
            1.0
        } else if stats.total_compressed_size == 0 {
            1.0
        } else {
            stats.total_uncompressed_size as f64 / stats.total_compressed_size as f64
        };

        Ok(stats)
    }
}
