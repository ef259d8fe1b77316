// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Vault Domain Events
//!
//! Immutable, timestamped records of significant occurrences within the
//! engine. Events are returned to callers (and logged) rather than pushed
//! through a broker: the engine has no opinion about delivery, only about
//! what happened.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::datetime_serde;
use crate::value_objects::{CheckpointId, KeyId, SessionId, UserId};

/// Something that happened inside the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum VaultEvent {
    SessionCreated {
        session_id: SessionId,
        user_id: UserId,
        #[serde(with = "datetime_serde")]
        occurred_at: DateTime<Utc>,
    },
    SessionRestored {
        session_id: SessionId,
        checkpoint_id: CheckpointId,
        #[serde(with = "datetime_serde")]
        occurred_at: DateTime<Utc>,
    },
    CheckpointCreated {
        checkpoint_id: CheckpointId,
        session_id: SessionId,
        #[serde(with = "datetime_serde")]
        occurred_at: DateTime<Utc>,
    },
    KeyRotated {
        user_id: UserId,
        old_key_id: KeyId,
        new_key_id: KeyId,
        #[serde(with = "datetime_serde")]
        occurred_at: DateTime<Utc>,
    },
    KeyRotationDue {
        user_id: UserId,
        key_id: KeyId,
        #[serde(with = "datetime_serde")]
        due_at: DateTime<Utc>,
        #[serde(with = "datetime_serde")]
        occurred_at: DateTime<Utc>,
    },
    CleanupCompleted {
        sessions_deleted: u64,
        checkpoints_deleted: u64,
        space_freed: u64,
        #[serde(with = "datetime_serde")]
        occurred_at: DateTime<Utc>,
    },
}

impl VaultEvent {
    /// When the event occurred
    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            VaultEvent::SessionCreated { occurred_at, .. }
            | VaultEvent::SessionRestored { occurred_at, .. }
            | VaultEvent::CheckpointCreated { occurred_at, .. }
            | VaultEvent::KeyRotated { occurred_at, .. }
            | VaultEvent::KeyRotationDue { occurred_at, .. }
            | VaultEvent::CleanupCompleted { occurred_at, .. } => *occurred_at,
        }
    }

    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            VaultEvent::SessionCreated { .. } => "session_created",
            VaultEvent::SessionRestored { .. } => "session_restored",
            VaultEvent::CheckpointCreated { .. } => "checkpoint_created",
            VaultEvent::KeyRotated { .. } => "key_rotated",
            VaultEvent::KeyRotationDue { .. } => "key_rotation_due",
            VaultEvent::CleanupCompleted { .. } => "cleanup_completed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_discriminator() {
        let event = VaultEvent::SessionCreated {
            session_id: SessionId::new(),
            user_id: UserId::new(),
            occurred_at: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "session_created");
        assert_eq!(event.kind(), "session_created");
    }
}
