// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Value objects for the session vault domain.
//!
//! Immutable, self-validating values without identity: typed identifiers,
//! checksums, payload envelopes, and the workspace state itself.

pub mod checksum;
pub mod clock_time;
pub mod entity_id;
pub mod key_id;
pub mod payload;
pub mod workspace_state;

pub use checksum::{timing_safe_eq, Checksum};
pub use clock_time::ClockTime;
pub use entity_id::{CheckpointId, EntityId, IdCategory, MetadataId, SessionId, UserId, WorkspaceId};
pub use key_id::KeyId;
pub use payload::{
    CompressionAlgorithm, EncryptedEnvelope, EncryptionAlgorithm, SequenceChange, SerializedPayload, AES_GCM_LABEL,
};
pub use workspace_state::{
    BrowserTabState, ConversationState, OpenFileState, TerminalState, WorkspaceState, REQUIRED_SEQUENCES,
};
