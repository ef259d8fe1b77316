// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Session Vault Engine
//!
//! Workspace session persistence and recovery: captures the full runtime
//! state of a developer workspace (terminals, browser tabs, AI
//! conversations, open files, configuration), stores it durably with
//! at-rest encryption under user-controlled keys, and restores it
//! faithfully after restart, crash, or corruption.
//!
//! ## Layers
//!
//! - [`application::services`] — the seven engine components: state
//!   serializer, key manager, session store, checkpoint store, recovery
//!   engine, retention scheduler, plus the crypto provider they share
//! - [`infrastructure`] — SQLite repositories over `sqlx`, the
//!   `ring`/`aes-gcm`/`argon2` crypto provider, TOML settings
//! - [`engine::Vault`] — the assembled facade a transport layer holds
//!
//! Domain types (entities, value objects, errors, repository ports) live in
//! the `vault-domain` crate; this crate re-exports the ones callers touch.
//!
//! ## Concurrency
//!
//! Multi-threaded: requests are short-lived tasks that suspend only on the
//! durable store. Every externally-invoked operation takes an
//! [`vault_domain::entities::OperationContext`] carrying its deadline;
//! multi-row writes run inside store transactions; per-user invariants are
//! enforced by count-and-compare inside those transactions, never caches.

pub mod application;
pub mod engine;
pub mod infrastructure;

pub use engine::Vault;

// Re-export the domain surface callers need alongside the engine.
pub use vault_domain::{
    Checkpoint, CheckpointPatch, CheckpointPriority, Checksum, OperationContext, Session, SessionConfig,
    SessionMetadata, SessionStatus, UserEncryptionKey, VaultError, VaultEvent, WorkspaceState,
};
