// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Session Vault Domain
//!
//! Core business logic of the workspace session persistence engine,
//! independent of databases, runtimes, and transports.
//!
//! ## Domain Concepts
//!
//! ### Entities
//! Objects with identity that persists through state changes:
//! - [`entities::Session`]: the current, mutable record of a workspace
//!   state for one user, with an explicit lifecycle state machine
//! - [`entities::Checkpoint`]: an immutable named snapshot owned by a
//!   session
//! - [`entities::UserEncryptionKey`]: a per-user master key wrapping a
//!   random data-encryption key under a password-derived key
//! - [`entities::SessionConfig`]: per-user persistence preferences
//! - [`entities::OperationContext`]: per-request deadline carrier
//!
//! ### Value Objects
//! Immutable, self-validating values without identity:
//! - [`value_objects::WorkspaceState`]: the captured workspace contents
//! - [`value_objects::Checksum`]: SHA-256 integrity digest
//! - [`value_objects::SerializedPayload`] / [`value_objects::EncryptedEnvelope`]:
//!   typed on-disk encodings
//! - Typed identifiers: [`value_objects::SessionId`],
//!   [`value_objects::CheckpointId`], [`value_objects::KeyId`], ...
//!
//! ### Ports
//! - [`repositories`]: the durable-store contract (async, transactional)
//! - [`services::CryptoProvider`]: the cryptographic-primitive contract
//!   (sync, CPU-bound)
//!
//! ## Business Rules
//!
//! - At most one active session per user, enforced on every create
//! - At most 10 active encryption keys per user
//! - At most 50 checkpoints per session
//! - Keys rotate only after 30 days unless forced; the last active key is
//!   never deleted
//! - Metadata projections update in the same transaction as the rows they
//!   project

pub mod entities;
pub mod error;
pub mod events;
pub mod repositories;
pub mod services;
pub mod value_objects;

// Re-export commonly used types for convenient access
pub use entities::{
    Checkpoint, CheckpointPatch, CheckpointPriority, OperationContext, Session, SessionConfig, SessionMetadata,
    SessionStatus, UserEncryptionKey,
};
pub use error::VaultError;
pub use events::VaultEvent;
pub use value_objects::{Checksum, WorkspaceState};
