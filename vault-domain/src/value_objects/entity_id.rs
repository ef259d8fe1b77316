// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Generic Entity Identifiers
//!
//! Phantom-typed identifier value object shared by all entity ID types in the
//! vault domain. Each entity category gets its own distinct ID type, so a
//! `SessionId` can never be passed where a `CheckpointId` is expected, while
//! the underlying representation stays a single validated UUIDv4.
//!
//! ## Design Principles
//!
//! - **Type Safety**: Each entity gets its own distinct ID type via a
//!   zero-cost marker category
//! - **Validation**: Nil UUIDs are rejected on parse for every category
//! - **Serialization**: Uniform hyphenated-string representation in JSON and
//!   in database columns
//!
//! ## Wire Format
//!
//! Session, checkpoint, and metadata identifiers are UUIDv4 strings
//! (hyphenated, lowercase). Key identifiers use a different format and live
//! in their own value object.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use uuid::Uuid;

use crate::VaultError;

/// ID category trait for type-specific behavior
///
/// Marker types implement this to give each entity category its own ID type
/// and its own name in validation messages.
pub trait IdCategory {
    /// Gets the category name for this ID type
    fn category_name() -> &'static str;

    /// Validates category-specific constraints
    fn validate_id(uuid: &Uuid) -> Result<(), VaultError> {
        if uuid.is_nil() {
            return Err(VaultError::InvalidSessionId(format!(
                "{} ID cannot be nil",
                Self::category_name()
            )));
        }
        Ok(())
    }
}

/// Generic identifier value object for domain entities
///
/// # Purpose
/// Provides the foundational ID implementation that all specific entity IDs
/// build upon. This generic approach ensures consistency while allowing
/// type-safe specialization.
///
/// # Architecture Notes
/// This is the base implementation that specific ID value objects compose.
/// Use the concrete aliases (`SessionId`, `CheckpointId`, ...) rather than
/// `EntityId` directly.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub struct EntityId<C: IdCategory> {
    value: Uuid,
    _phantom: std::marker::PhantomData<C>,
}

// Custom serialization to use the plain string format instead of a JSON object
impl<C: IdCategory> Serialize for EntityId<C> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.value.to_string().serialize(serializer)
    }
}

impl<'de, C: IdCategory> Deserialize<'de> for EntityId<C> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let uuid = Uuid::parse_str(&s).map_err(|e| serde::de::Error::custom(e.to_string()))?;
        Ok(Self {
            value: uuid,
            _phantom: std::marker::PhantomData,
        })
    }
}

impl<C: IdCategory> EntityId<C> {
    /// Creates a new random (v4) entity ID
    pub fn new() -> Self {
        Self {
            value: Uuid::new_v4(),
            _phantom: std::marker::PhantomData,
        }
    }

    /// Creates an entity ID from an existing UUID with validation
    pub fn from_uuid(uuid: Uuid) -> Result<Self, VaultError> {
        C::validate_id(&uuid)?;
        Ok(Self {
            value: uuid,
            _phantom: std::marker::PhantomData,
        })
    }

    /// Parses an entity ID from its hyphenated string form
    pub fn parse(s: &str) -> Result<Self, VaultError> {
        let uuid = Uuid::parse_str(s).map_err(|e| {
            VaultError::InvalidSessionId(format!("invalid {} ID {:?}: {}", C::category_name(), s, e))
        })?;
        Self::from_uuid(uuid)
    }

    /// Gets the underlying UUID value
    pub fn as_uuid(&self) -> Uuid {
        self.value
    }
}

impl<C: IdCategory> Default for EntityId<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: IdCategory> Display for EntityId<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<C: IdCategory> FromStr for EntityId<C> {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<C: IdCategory> Hash for EntityId<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

/// Marker category for session identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SessionMarker;

impl IdCategory for SessionMarker {
    fn category_name() -> &'static str {
        "session"
    }
}

/// Marker category for checkpoint identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CheckpointMarker;

impl IdCategory for CheckpointMarker {
    fn category_name() -> &'static str {
        "checkpoint"
    }
}

/// Marker category for session-metadata identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MetadataMarker;

impl IdCategory for MetadataMarker {
    fn category_name() -> &'static str {
        "metadata"
    }
}

/// Marker category for user identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct UserMarker;

impl IdCategory for UserMarker {
    fn category_name() -> &'static str {
        "user"
    }
}

/// Marker category for workspace identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WorkspaceMarker;

impl IdCategory for WorkspaceMarker {
    fn category_name() -> &'static str {
        "workspace"
    }
}

/// Session identifier (UUIDv4)
pub type SessionId = EntityId<SessionMarker>;

/// Checkpoint identifier (UUIDv4)
pub type CheckpointId = EntityId<CheckpointMarker>;

/// Session-metadata identifier (UUIDv4)
pub type MetadataId = EntityId<MetadataMarker>;

/// User identifier (UUIDv4)
pub type UserId = EntityId<UserMarker>;

/// Workspace identifier (UUIDv4)
pub type WorkspaceId = EntityId<WorkspaceMarker>;
