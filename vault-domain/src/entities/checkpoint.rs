// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Checkpoint Entity
//!
//! An immutable, named snapshot of a workspace state created from a session.
//! The payload and sizes never change after creation; only the descriptive
//! fields (name, description, priority, tags, metadata) may be patched.
//! Checkpoints are destroyed by session cascade or by retention.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt::{self, Display};
use std::str::FromStr;

use crate::services::datetime_serde;
use crate::value_objects::{CheckpointId, Checksum, CompressionAlgorithm, EncryptionAlgorithm, SessionId};
use crate::VaultError;

/// Maximum checkpoint name length, in characters.
pub const MAX_CHECKPOINT_NAME_LEN: usize = 100;

/// Maximum checkpoint description length, in characters.
pub const MAX_CHECKPOINT_DESCRIPTION_LEN: usize = 500;

/// Default per-session checkpoint cap.
pub const MAX_CHECKPOINTS_PER_SESSION: u32 = 50;

/// Checkpoint priority ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl CheckpointPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointPriority::Low => "low",
            CheckpointPriority::Medium => "medium",
            CheckpointPriority::High => "high",
        }
    }
}

impl Display for CheckpointPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CheckpointPriority {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(CheckpointPriority::Low),
            "medium" => Ok(CheckpointPriority::Medium),
            "high" => Ok(CheckpointPriority::High),
            other => Err(VaultError::InternalError(format!(
                "unknown checkpoint priority {:?}",
                other
            ))),
        }
    }
}

/// Checkpoint entity: an immutable named snapshot owned by a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub session_id: SessionId,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub priority: CheckpointPriority,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,

    pub is_auto_generated: bool,

    /// Opaque persisted bytes (compressed and/or encrypted)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub payload: Vec<u8>,

    pub state_checksum: Checksum,
    pub encryption_algorithm: EncryptionAlgorithm,
    pub compression: CompressionAlgorithm,
    pub compressed_size: u64,
    pub uncompressed_size: u64,

    #[serde(with = "datetime_serde")]
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// Patch of the mutable checkpoint fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub priority: Option<CheckpointPriority>,
    pub tags: Option<BTreeSet<String>>,
    pub metadata: Option<Map<String, Value>>,
}

fn validate_name(name: &str) -> Result<(), VaultError> {
    if name.trim().is_empty() {
        return Err(VaultError::MissingName("checkpoint name is required".to_string()));
    }
    if name.chars().count() > MAX_CHECKPOINT_NAME_LEN {
        return Err(VaultError::NameTooLong(format!(
            "checkpoint name exceeds {} characters",
            MAX_CHECKPOINT_NAME_LEN
        )));
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), VaultError> {
    if description.chars().count() > MAX_CHECKPOINT_DESCRIPTION_LEN {
        return Err(VaultError::DescriptionTooLong(format!(
            "checkpoint description exceeds {} characters",
            MAX_CHECKPOINT_DESCRIPTION_LEN
        )));
    }
    Ok(())
}

impl Checkpoint {
    /// Creates a new checkpoint, validating name and description limits.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        session_id: SessionId,
        name: &str,
        description: Option<&str>,
        priority: CheckpointPriority,
        tags: BTreeSet<String>,
        is_auto_generated: bool,
        payload: Vec<u8>,
        state_checksum: Checksum,
        encryption_algorithm: EncryptionAlgorithm,
        compression: CompressionAlgorithm,
        compressed_size: u64,
        uncompressed_size: u64,
        metadata: Map<String, Value>,
    ) -> Result<Self, VaultError> {
        validate_name(name)?;
        if let Some(desc) = description {
            validate_description(desc)?;
        }
        Ok(Self {
            id: CheckpointId::new(),
            session_id,
            name: name.to_string(),
            description: description.map(str::to_string),
            priority,
            tags,
            is_auto_generated,
            payload,
            state_checksum,
            encryption_algorithm,
            compression,
            compressed_size,
            uncompressed_size,
            created_at: Utc::now(),
            metadata,
        })
    }

    /// Applies a patch to the mutable fields, re-validating limits.
    pub fn apply_patch(&mut self, patch: CheckpointPatch) -> Result<(), VaultError> {
        if let Some(name) = patch.name {
            validate_name(&name)?;
            self.name = name;
        }
        if let Some(description) = patch.description {
            validate_description(&description)?;
            self.description = Some(description);
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        if let Some(metadata) = patch.metadata {
            self.metadata = metadata;
        }
        Ok(())
    }
}
