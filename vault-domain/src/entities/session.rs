// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Session Entity
//!
//! The current, mutable record of a workspace state for one user. A session
//! has identity (its id persists across state changes) and an explicit
//! lifecycle state machine:
//!
//! ```text
//! Draft → Active → Inactive → Expired → Deleted
//!           ↑_________|
//! ```
//!
//! Only `Active` accepts payload updates; `Inactive` accepts reads and
//! reactivation; `Expired` is read-only until the retention scheduler
//! removes it. At most one session per user is `Active` — an invariant the
//! session store enforces transactionally on every create.
//!
//! The `version` field is a monotonic optimistic-concurrency token: every
//! update increments it, and a writer that observed a stale version fails
//! `VersionConflict`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

use crate::services::datetime_serde;
use crate::value_objects::{
    Checksum, CompressionAlgorithm, EncryptionAlgorithm, MetadataId, SessionId, UserId, WorkspaceId,
};
use crate::VaultError;

/// Maximum session name length, in characters.
pub const MAX_SESSION_NAME_LEN: usize = 100;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Draft,
    Active,
    Inactive,
    Expired,
    Deleted,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Draft => "draft",
            SessionStatus::Active => "active",
            SessionStatus::Inactive => "inactive",
            SessionStatus::Expired => "expired",
            SessionStatus::Deleted => "deleted",
        }
    }

    /// Whether a payload update is allowed in this state
    pub fn accepts_updates(&self) -> bool {
        matches!(self, SessionStatus::Active)
    }
}

impl Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(SessionStatus::Draft),
            "active" => Ok(SessionStatus::Active),
            "inactive" => Ok(SessionStatus::Inactive),
            "expired" => Ok(SessionStatus::Expired),
            "deleted" => Ok(SessionStatus::Deleted),
            other => Err(VaultError::InternalError(format!("unknown session status {:?}", other))),
        }
    }
}

/// Session entity: one user's mutable workspace record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub status: SessionStatus,

    #[serde(with = "datetime_serde")]
    pub last_saved_at: DateTime<Utc>,

    #[serde(with = "datetime_serde")]
    pub expires_at: DateTime<Utc>,

    #[serde(with = "datetime_serde")]
    pub created_at: DateTime<Utc>,

    /// Monotonic version, incremented on each update
    pub version: u64,

    /// SHA-256 hex of the stored payload bytes
    pub state_checksum: Checksum,

    pub encryption_algorithm: EncryptionAlgorithm,
    pub compression: CompressionAlgorithm,

    /// Opaque persisted bytes (compressed and/or encrypted)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub payload: Vec<u8>,
}

impl Session {
    /// Creates a new active session with version 1.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        user_id: UserId,
        workspace_id: WorkspaceId,
        name: &str,
        payload: Vec<u8>,
        state_checksum: Checksum,
        encryption_algorithm: EncryptionAlgorithm,
        compression: CompressionAlgorithm,
        retention_days: i64,
    ) -> Result<Self, VaultError> {
        if name.chars().count() > MAX_SESSION_NAME_LEN {
            return Err(VaultError::NameTooLong(format!(
                "session name exceeds {} characters",
                MAX_SESSION_NAME_LEN
            )));
        }
        let now = Utc::now();
        Ok(Self {
            id: SessionId::new(),
            user_id,
            workspace_id,
            name: name.to_string(),
            status: SessionStatus::Active,
            last_saved_at: now,
            expires_at: now + Duration::days(retention_days),
            created_at: now,
            version: 1,
            state_checksum,
            encryption_algorithm,
            compression,
            payload,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn is_expired(&self) -> bool {
        self.status == SessionStatus::Expired || self.expires_at < Utc::now()
    }

    /// Applies a new payload, bumping the version and save timestamp.
    ///
    /// Fails `Expired` when the session no longer accepts updates.
    pub fn apply_update(
        &mut self,
        payload: Vec<u8>,
        state_checksum: Checksum,
        encryption_algorithm: EncryptionAlgorithm,
        compression: CompressionAlgorithm,
    ) -> Result<(), VaultError> {
        if self.is_expired() {
            return Err(VaultError::Expired(format!("session {} is expired", self.id)));
        }
        if !self.status.accepts_updates() {
            return Err(VaultError::Expired(format!(
                "session {} is {} and does not accept updates",
                self.id, self.status
            )));
        }
        self.payload = payload;
        self.state_checksum = state_checksum;
        self.encryption_algorithm = encryption_algorithm;
        self.compression = compression;
        self.version += 1;
        self.last_saved_at = Utc::now();
        Ok(())
    }

    /// Transition: `Draft | Inactive → Active`
    pub fn activate(&mut self) -> Result<(), VaultError> {
        match self.status {
            SessionStatus::Draft | SessionStatus::Inactive | SessionStatus::Active => {
                self.status = SessionStatus::Active;
                Ok(())
            }
            other => Err(VaultError::Expired(format!(
                "session {} cannot activate from {}",
                self.id, other
            ))),
        }
    }

    /// Transition: `Active → Inactive`
    pub fn deactivate(&mut self) -> Result<(), VaultError> {
        match self.status {
            SessionStatus::Active | SessionStatus::Inactive => {
                self.status = SessionStatus::Inactive;
                Ok(())
            }
            other => Err(VaultError::Expired(format!(
                "session {} cannot deactivate from {}",
                self.id, other
            ))),
        }
    }

    /// Transition: any live state → `Expired`
    pub fn expire(&mut self) -> Result<(), VaultError> {
        match self.status {
            SessionStatus::Deleted => Err(VaultError::Expired(format!(
                "session {} is already deleted",
                self.id
            ))),
            _ => {
                self.status = SessionStatus::Expired;
                Ok(())
            }
        }
    }

    /// Terminal transition
    pub fn mark_deleted(&mut self) {
        self.status = SessionStatus::Deleted;
    }
}

/// Derived metadata projection, one row per session.
///
/// Updated in the same transaction as the session it projects; never the
/// source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub id: MetadataId,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub workspace_id: WorkspaceId,
    pub session_name: String,

    #[serde(with = "datetime_serde")]
    pub last_saved_at: DateTime<Utc>,

    pub checkpoint_count: u32,
    pub total_size: u64,
    pub is_active: bool,
}

impl SessionMetadata {
    /// Projects a fresh metadata row from a session
    pub fn project(session: &Session) -> Self {
        Self {
            id: MetadataId::new(),
            session_id: session.id,
            user_id: session.user_id,
            workspace_id: session.workspace_id,
            session_name: session.name.clone(),
            last_saved_at: session.last_saved_at,
            checkpoint_count: 0,
            total_size: session.payload.len() as u64,
            is_active: session.is_active(),
        }
    }
}
