// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Session Store
//!
//! Application service for the session lifecycle: create, update, read,
//! list, delete. Creation is a single transaction covering the session row,
//! its metadata projection, the user's config upsert, and the deactivation
//! of every other session of the same user — the one-active-session
//! invariant holds at every commit point. Updates are serialized by the
//! optimistic `version` token.
//!
//! On the read path, failures in the recoverable set are handed to the
//! recovery engine; the caller receives the repaired state flagged as
//! recovered instead of an error. Anything else propagates unchanged.
//!
//! The serializer's delta scratch is per-request: every operation builds a
//! fresh [`StateSerializer`] so no previous-state leaks across users.

use std::sync::Arc;

use tracing::{debug, info, warn};

use vault_domain::entities::{OperationContext, Session, SessionConfig, SessionMetadata};
use vault_domain::repositories::{SessionPage, SessionQuery, SessionRepository};
use vault_domain::services::CryptoProvider;
use vault_domain::value_objects::{EncryptionAlgorithm, SessionId, UserId, WorkspaceId, WorkspaceState};
use vault_domain::{VaultError, VaultEvent};

use crate::application::services::recovery_service::RecoveryService;
use crate::application::services::state_serializer::{SerializerConfig, StateSerializer};

/// Request to create a session.
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub user_id: UserId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub state: WorkspaceState,
}

/// Result of creating a session.
#[derive(Debug, Clone)]
pub struct CreateSessionOutcome {
    pub session: Session,
    pub event: VaultEvent,
}

/// Result of reading a session.
#[derive(Debug, Clone)]
pub struct SessionReadOutcome {
    pub session: Session,
    pub state: WorkspaceState,
    /// True when the state came out of the recovery engine rather than a
    /// clean deserialization
    pub recovered: bool,
    pub warnings: Vec<String>,
}

/// Application service for session persistence.
pub struct SessionService {
    sessions: Arc<dyn SessionRepository>,
    crypto: Arc<dyn CryptoProvider>,
    recovery: RecoveryService,
    /// Engine-level serializer defaults, applied to users who have no
    /// config row yet
    serializer_defaults: SerializerConfig,
}

impl SessionService {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        crypto: Arc<dyn CryptoProvider>,
        serializer_defaults: SerializerConfig,
    ) -> Self {
        Self {
            sessions,
            crypto,
            recovery: RecoveryService::new(),
            serializer_defaults,
        }
    }

    /// Creates a session, atomically enforcing the one-active-session
    /// invariant.
    pub async fn create_session(
        &self,
        ctx: &OperationContext,
        request: CreateSessionRequest,
        password: Option<&str>,
    ) -> Result<CreateSessionOutcome, VaultError> {
        ctx.check_deadline()?;

        let config = self.config_for(request.user_id).await?;
        let serializer = self.serializer_for(&config);

        let password = if config.encryption_enabled { password } else { None };
        let sealed = serializer.serialize(&request.state, password)?;
        let encryption = sealed.encryption_algorithm();
        let compression = sealed.compression();

        let session = Session::create(
            request.user_id,
            request.workspace_id,
            &request.name,
            sealed.data,
            sealed.checksum,
            encryption,
            compression,
            config.retention_days,
        )?;
        let metadata = SessionMetadata::project(&session);

        ctx.check_deadline()?;
        self.sessions.create_session_txn(&session, &metadata, &config).await?;

        info!(session = %session.id, user = %session.user_id, "created session");
        let event = VaultEvent::SessionCreated {
            session_id: session.id,
            user_id: session.user_id,
            occurred_at: session.created_at,
        };
        Ok(CreateSessionOutcome { session, event })
    }

    /// Updates a session's state incrementally.
    ///
    /// A concurrent writer that committed first wins: this call fails
    /// `VersionConflict` when the stored version moved past the one it
    /// loaded.
    pub async fn update_session(
        &self,
        ctx: &OperationContext,
        session_id: SessionId,
        new_state: &WorkspaceState,
        password: Option<&str>,
    ) -> Result<Session, VaultError> {
        ctx.check_deadline()?;

        let mut session = self
            .sessions
            .find_session(session_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("session {} not found", session_id)))?;
        if session.is_expired() {
            return Err(VaultError::Expired(format!("session {} is expired", session_id)));
        }

        let config = self.config_for(session.user_id).await?;
        let password = if config.encryption_enabled { password } else { None };

        // Seed the delta base from the stored payload when it is readable;
        // an unreadable base just downgrades this save to a full payload.
        let mut serializer = self.serializer_for(&config);
        match serializer.deserialize(
            &session.payload,
            &session.state_checksum,
            session.encryption_algorithm,
            session.compression,
            password,
        ) {
            Ok(base) => serializer = serializer.with_base(base),
            Err(e) => debug!(session = %session_id, error = %e, "stored payload unusable as delta base"),
        }

        let outcome = serializer.serialize_incremental(new_state, password)?;
        if let Some(delta) = &outcome.delta {
            debug!(
                session = %session_id,
                delta_bytes = delta.size,
                changes = outcome.changes.len(),
                "incremental save produced delta envelope"
            );
        }

        let expected_version = session.version;
        let sealed = outcome.full;
        let encryption = sealed.encryption_algorithm();
        let compression = sealed.compression();
        session.apply_update(sealed.data, sealed.checksum, encryption, compression)?;

        ctx.check_deadline()?;
        self.sessions.update_session_txn(&session, expected_version).await?;
        debug!(session = %session_id, version = session.version, "updated session");
        Ok(session)
    }

    /// Reads a session and its workspace state.
    ///
    /// Recoverable read failures are routed through the recovery engine;
    /// the outcome is flagged `recovered` and carries the engine's
    /// warnings. Unrecoverable corruption surfaces as
    /// `UnrecoverableCorruption`.
    pub async fn get_session(
        &self,
        ctx: &OperationContext,
        session_id: SessionId,
        password: Option<&str>,
    ) -> Result<SessionReadOutcome, VaultError> {
        ctx.check_deadline()?;

        let session = self
            .sessions
            .find_session(session_id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("session {} not found", session_id)))?;

        let config = self.config_for(session.user_id).await?;
        let serializer = self.serializer_for(&config);

        match serializer.deserialize(
            &session.payload,
            &session.state_checksum,
            session.encryption_algorithm,
            session.compression,
            password,
        ) {
            Ok(state) => Ok(SessionReadOutcome {
                session,
                state,
                recovered: false,
                warnings: Vec::new(),
            }),
            Err(error) if error.is_recoverable() => {
                warn!(session = %session_id, error = %error, "read failed, invoking recovery engine");
                let plaintext = self.best_effort_plaintext(&session, password);
                let outcome = self.recovery.recover(&plaintext)?;

                let mut warnings = outcome.report.warnings.clone();
                warnings.extend(outcome.report.errors.iter().cloned());
                warnings.push(format!("state recovered after read failure: {}", error));

                Ok(SessionReadOutcome {
                    session,
                    state: outcome.state,
                    recovered: true,
                    warnings,
                })
            }
            Err(error) => Err(error),
        }
    }

    /// Paginated listing of a user's sessions, newest saved first
    pub async fn list_sessions(
        &self,
        ctx: &OperationContext,
        user_id: UserId,
        query: SessionQuery,
    ) -> Result<SessionPage, VaultError> {
        ctx.check_deadline()?;
        self.sessions.list_sessions(user_id, &query).await
    }

    /// Hard-deletes a session; checkpoints and metadata cascade
    pub async fn delete_session(&self, ctx: &OperationContext, session_id: SessionId) -> Result<(), VaultError> {
        ctx.check_deadline()?;
        let removed = self.sessions.delete_session(session_id).await?;
        if !removed {
            return Err(VaultError::NotFound(format!("session {} not found", session_id)));
        }
        info!(session = %session_id, "deleted session");
        Ok(())
    }

    /// Loads the user's config; first-time users inherit the engine-level
    /// serializer defaults.
    async fn config_for(&self, user_id: UserId) -> Result<SessionConfig, VaultError> {
        Ok(self.sessions.find_config(user_id).await?.unwrap_or_else(|| {
            let mut config = SessionConfig::defaults_for(user_id);
            config.max_session_size = self.serializer_defaults.max_session_size;
            config.compression_enabled = self.serializer_defaults.compression_enabled;
            config.encryption_enabled = self.serializer_defaults.encryption_enabled;
            config
        }))
    }

    fn serializer_for(&self, config: &SessionConfig) -> StateSerializer {
        StateSerializer::new(
            SerializerConfig {
                max_session_size: config.max_session_size,
                compression_enabled: config.compression_enabled,
                encryption_enabled: config.encryption_enabled,
            },
            Arc::clone(&self.crypto),
        )
    }

    /// Strips as many pipeline layers as still work so the recovery engine
    /// sees the most-plaintext bytes available.
    fn best_effort_plaintext(&self, session: &Session, password: Option<&str>) -> Vec<u8> {
        use std::io::Read;

        let mut bytes = session.payload.clone();

        if session.encryption_algorithm == EncryptionAlgorithm::AesGcm {
            if let Some(password) = password {
                if let Ok(envelope) = vault_domain::value_objects::EncryptedEnvelope::from_bytes(&bytes) {
                    if let Ok((ciphertext, iv, salt)) = envelope.open() {
                        if let Ok(key) = self.crypto.derive_key(
                            password,
                            &salt,
                            &vault_domain::services::KdfAlgorithm::default_pbkdf2(),
                        ) {
                            if let Ok(plain) = self.crypto.decrypt(&ciphertext, &key, &iv) {
                                bytes = plain;
                            }
                        }
                    }
                }
            }
        }

        let mut decoder = flate2::read::GzDecoder::new(bytes.as_slice());
        let mut inflated = Vec::new();
        if decoder.read_to_end(&mut inflated).is_ok() && !inflated.is_empty() {
            bytes = inflated;
        }

        bytes
    }
}
