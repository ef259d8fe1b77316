// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain entities: objects with identity and lifecycle.

pub mod checkpoint;
pub mod operation_context;
pub mod session;
pub mod session_config;
pub mod user_key;

pub use checkpoint::{
    Checkpoint, CheckpointPatch, CheckpointPriority, MAX_CHECKPOINTS_PER_SESSION, MAX_CHECKPOINT_DESCRIPTION_LEN,
    MAX_CHECKPOINT_NAME_LEN,
};
pub use operation_context::OperationContext;
pub use session::{Session, SessionMetadata, SessionStatus, MAX_SESSION_NAME_LEN};
pub use session_config::{
    SessionConfig, DEFAULT_AUTO_SAVE_INTERVAL_SECS, DEFAULT_CHECKPOINT_RETENTION_DAYS, DEFAULT_MAX_SESSION_SIZE,
    DEFAULT_RETENTION_DAYS,
};
pub use user_key::{
    DeactivationReason, KeyStatus, PublicKeyRecord, UserEncryptionKey, DEFAULT_KEY_EXPIRY_DAYS,
    MAX_ACTIVE_KEYS_PER_USER, MAX_KEY_NAME_LEN, MIN_ROTATION_AGE_DAYS, NEAR_EXPIRY_DAYS,
};
