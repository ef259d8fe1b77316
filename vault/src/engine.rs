// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Engine Facade
//!
//! Wires the SQLite repositories, the crypto provider, and the application
//! services into one handle a transport layer can hold. The facade owns no
//! behavior of its own; every operation lives on the service it belongs to.

use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::info;

use vault_domain::services::CryptoProvider;
use vault_domain::VaultError;

use crate::application::services::{
    CheckpointService, KeyManager, RecoveryService, RetentionScheduler, SessionService,
};
use crate::infrastructure::config::VaultSettings;
use crate::infrastructure::crypto::RingCryptoProvider;
use crate::infrastructure::repositories::{
    schema, SqliteCheckpointRepository, SqliteKeyRepository, SqliteSessionRepository,
};

/// The assembled engine.
pub struct Vault {
    pub sessions: SessionService,
    pub checkpoints: CheckpointService,
    pub keys: KeyManager,
    pub recovery: RecoveryService,
    pub scheduler: RetentionScheduler,
}

impl Vault {
    /// Opens the engine against the database named in the settings
    /// (`database_url` is required here; use [`Vault::with_pool`] to bring
    /// your own pool).
    pub async fn open(settings: VaultSettings) -> Result<Self, VaultError> {
        let url = settings
            .database_url
            .clone()
            .ok_or_else(|| VaultError::InternalError("settings carry no database_url".to_string()))?;
        let pool = schema::initialize_database(&url)
            .await
            .map_err(|e| VaultError::StoreError(e.to_string()))?;
        info!(database = %url, "session vault opened");
        Ok(Self::with_pool(pool, settings))
    }

    /// Opens the engine over an in-memory database (testing, demos)
    pub async fn in_memory(settings: VaultSettings) -> Result<Self, VaultError> {
        let pool = schema::in_memory_pool()
            .await
            .map_err(|e| VaultError::StoreError(e.to_string()))?;
        Ok(Self::with_pool(pool, settings))
    }

    /// Assembles the engine over an existing migrated pool
    pub fn with_pool(pool: SqlitePool, settings: VaultSettings) -> Self {
        let crypto: Arc<dyn CryptoProvider> = Arc::new(RingCryptoProvider::new());

        let session_repo = Arc::new(SqliteSessionRepository::new(pool.clone()));
        let checkpoint_repo = Arc::new(SqliteCheckpointRepository::new(pool.clone()));
        let key_repo = Arc::new(SqliteKeyRepository::new(pool));

        Self {
            sessions: SessionService::new(
                session_repo.clone(),
                Arc::clone(&crypto),
                settings.serializer.clone().into(),
            ),
            checkpoints: CheckpointService::new(checkpoint_repo.clone(), session_repo.clone(), Arc::clone(&crypto)),
            keys: KeyManager::new(key_repo.clone(), Arc::clone(&crypto), settings.key_manager.clone()),
            recovery: RecoveryService::new(),
            scheduler: RetentionScheduler::new(
                session_repo,
                checkpoint_repo,
                key_repo,
                settings.retention.clone(),
                settings.key_manager.rotation.clone(),
            ),
        }
    }
}
