// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! This module provides the error system for the session vault domain. Every
//! failure the engine can surface is an enumerated kind here; messages are
//! derived from the kind plus context, never free-form strings scattered
//! through the codebase.
//!
//! ## Error Categories
//!
//! ### Validation Errors
//! - **InvalidStateShape**: A workspace state is missing one of its required
//!   sequences
//! - **StateTooLarge**: Serialized state exceeds the configured size limit
//! - **MissingName / NameTooLong / DescriptionTooLong**: Checkpoint and
//!   session naming rules
//! - **WeakPassword**: Password policy violations, with enumerated reasons
//! - **KeyNameConflict / KeyLimitExceeded / RotationTooSoon / LastKey /
//!   MissingKey**: Key-management invariants
//!
//! ### Integrity and Crypto Errors
//! - **IntegrityFailed**: Stored checksum does not match the payload
//! - **DecryptionFailed**: Authentication-tag mismatch (wrong password or
//!   tampered ciphertext)
//! - **UnsupportedAlgorithm**: Unknown algorithm tag on a persisted envelope
//! - **BaseStateMismatch**: A delta's base checksum does not match the base
//!   state it is applied to
//!
//! ### Lifecycle Errors
//! - **NotFound / SessionNotFound / Expired / VersionConflict /
//!   CheckpointLimit**: Entity lifecycle and concurrency failures
//!
//! ### Infrastructure Errors
//! - **StoreError**: Durable-store failures (retryable at the caller's
//!   discretion; the engine never retries internally)
//! - **Deadline**: The operation's deadline expired before completion
//!
//! ### Recovery Errors
//! - **NoCandidates**: A merge was requested over an empty candidate list
//! - **UnrecoverableCorruption**: Recovery was attempted and failed
//! - **Corrupted**: Generic corruption detected before recovery ran
//!
//! ## Propagation Policy
//!
//! Validation and lifecycle errors propagate to the caller unchanged.
//! Integrity/crypto errors on a read path are first handed to the recovery
//! engine ([`VaultError::is_recoverable`]); only if recovery fails does
//! `UnrecoverableCorruption` propagate. Bulk operations never short-circuit
//! on a single failure.

use thiserror::Error;

/// Domain-specific errors for the session vault engine.
///
/// Each variant represents a specific failure mode and carries a short
/// context message. Variants are grouped by category; use
/// [`VaultError::category`] for systematic handling and
/// [`VaultError::is_recoverable`] to decide whether the recovery engine
/// should be invoked.
#[derive(Error, Debug, Clone)]
pub enum VaultError {
    #[error("Invalid state shape: {0}")]
    InvalidStateShape(String),

    #[error("State too large: {0}")]
    StateTooLarge(String),

    #[error("Missing name: {0}")]
    MissingName(String),

    #[error("Name too long: {0}")]
    NameTooLong(String),

    #[error("Description too long: {0}")]
    DescriptionTooLong(String),

    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("Weak password: {}", .0.join("; "))]
    WeakPassword(Vec<String>),

    #[error("Key name conflict: {0}")]
    KeyNameConflict(String),

    #[error("Key limit exceeded: {0}")]
    KeyLimitExceeded(String),

    #[error("Rotation too soon: {0}")]
    RotationTooSoon(String),

    #[error("Last active key: {0}")]
    LastKey(String),

    #[error("Missing key: {0}")]
    MissingKey(String),

    #[error("Integrity check failed: {0}")]
    IntegrityFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Base state mismatch: {0}")]
    BaseStateMismatch(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session expired: {0}")]
    Expired(String),

    #[error("Version conflict: {0}")]
    VersionConflict(String),

    #[error("Checkpoint limit reached: {0}")]
    CheckpointLimit(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Deadline exceeded: {0}")]
    Deadline(String),

    #[error("No recovery candidates: {0}")]
    NoCandidates(String),

    #[error("Unrecoverable corruption: {0}")]
    UnrecoverableCorruption(String),

    #[error("Corrupted data: {0}")]
    Corrupted(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl VaultError {
    /// Creates a new store error
    pub fn store_error(msg: impl Into<String>) -> Self {
        Self::StoreError(msg.into())
    }

    /// Creates a new integrity error
    pub fn integrity_failed(msg: impl Into<String>) -> Self {
        Self::IntegrityFailed(msg.into())
    }

    /// Creates a new decryption error
    pub fn decryption_failed(msg: impl Into<String>) -> Self {
        Self::DecryptionFailed(msg.into())
    }

    /// Creates a new session-not-found error
    pub fn session_not_found(msg: impl Into<String>) -> Self {
        Self::SessionNotFound(msg.into())
    }

    /// Creates a new invalid-state-shape error
    pub fn invalid_state_shape(msg: impl Into<String>) -> Self {
        Self::InvalidStateShape(msg.into())
    }

    /// Creates a new internal error
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Creates a new serialization error
    pub fn serialization_error(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Checks whether this failure should be handed to the recovery engine.
    ///
    /// Only integrity, decryption, shape, and generic corruption failures are
    /// recoverable; lifecycle and infrastructure errors propagate unchanged.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            VaultError::IntegrityFailed(_)
                | VaultError::DecryptionFailed(_)
                | VaultError::InvalidStateShape(_)
                | VaultError::Corrupted(_)
        )
    }

    /// Checks if the error is retryable infrastructure trouble
    pub fn is_retryable(&self) -> bool {
        matches!(self, VaultError::StoreError(_) | VaultError::Deadline(_))
    }

    /// Gets the error category
    pub fn category(&self) -> &'static str {
        match self {
            VaultError::InvalidStateShape(_) => "validation",
            VaultError::StateTooLarge(_) => "validation",
            VaultError::MissingName(_) => "validation",
            VaultError::NameTooLong(_) => "validation",
            VaultError::DescriptionTooLong(_) => "validation",
            VaultError::InvalidSessionId(_) => "validation",
            VaultError::WeakPassword(_) => "validation",
            VaultError::KeyNameConflict(_) => "validation",
            VaultError::KeyLimitExceeded(_) => "validation",
            VaultError::RotationTooSoon(_) => "validation",
            VaultError::LastKey(_) => "validation",
            VaultError::MissingKey(_) => "validation",
            VaultError::IntegrityFailed(_) => "integrity",
            VaultError::DecryptionFailed(_) => "crypto",
            VaultError::UnsupportedAlgorithm(_) => "crypto",
            VaultError::BaseStateMismatch(_) => "integrity",
            VaultError::NotFound(_) => "lifecycle",
            VaultError::SessionNotFound(_) => "lifecycle",
            VaultError::Expired(_) => "lifecycle",
            VaultError::VersionConflict(_) => "lifecycle",
            VaultError::CheckpointLimit(_) => "lifecycle",
            VaultError::StoreError(_) => "infrastructure",
            VaultError::Deadline(_) => "infrastructure",
            VaultError::NoCandidates(_) => "recovery",
            VaultError::UnrecoverableCorruption(_) => "recovery",
            VaultError::Corrupted(_) => "recovery",
            VaultError::SerializationError(_) => "serialization",
            VaultError::InternalError(_) => "internal",
        }
    }
}

// Implement conversion from standard library errors
impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        VaultError::StoreError(err.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        VaultError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_set() {
        assert!(VaultError::integrity_failed("checksum").is_recoverable());
        assert!(VaultError::decryption_failed("tag").is_recoverable());
        assert!(VaultError::invalid_state_shape("terminals").is_recoverable());
        assert!(VaultError::Corrupted("truncated".into()).is_recoverable());

        assert!(!VaultError::SessionNotFound("s".into()).is_recoverable());
        assert!(!VaultError::store_error("db").is_recoverable());
        assert!(!VaultError::Deadline("expired".into()).is_recoverable());
    }

    #[test]
    fn test_categories() {
        assert_eq!(VaultError::WeakPassword(vec!["too short".into()]).category(), "validation");
        assert_eq!(VaultError::integrity_failed("x").category(), "integrity");
        assert_eq!(VaultError::VersionConflict("v3 != v4".into()).category(), "lifecycle");
        assert_eq!(VaultError::store_error("x").category(), "infrastructure");
    }

    #[test]
    fn test_weak_password_message_enumerates_reasons() {
        let err = VaultError::WeakPassword(vec!["too short".into(), "missing digit".into()]);
        let msg = err.to_string();
        assert!(msg.contains("too short"));
        assert!(msg.contains("missing digit"));
    }
}
