// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Application services: the engine's seven cooperating components.

pub mod checkpoint_service;
pub mod key_manager;
pub mod recovery_service;
pub mod retention_scheduler;
pub mod session_service;
pub mod state_serializer;

pub use checkpoint_service::{
    BatchDeleteOutcome, CheckpointService, CheckpointStatistics, CreateCheckpointRequest, RestoreOutcome,
};
pub use key_manager::{
    CreateKeyOptions, KeyDerivationSettings, KeyManager, KeyManagerConfig, KeyValidation, PasswordStrength,
    RotateKeyOptions, RotationOutcome, RotationSettings, SecuritySettings,
};
pub use recovery_service::{
    MergeCandidate, MergeOutcome, MergeStrategy, RecoveryOutcome, RecoveryService, RepairOutcome, StateConflict,
    StructureReport,
};
pub use retention_scheduler::{CleanupReport, RetentionScheduler, RetentionSettings};
pub use session_service::{CreateSessionOutcome, CreateSessionRequest, SessionReadOutcome, SessionService};
pub use state_serializer::{IncrementalOutcome, SerializedState, SerializerConfig, StateSerializer};
