// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Engine Settings
//!
//! Top-level configuration for the engine, loadable from a TOML file.
//! Every field defaults individually, so a partial file configures only
//! what it names:
//!
//! ```toml
//! database_url = "sqlite://vault.db"
//!
//! [serializer]
//! compression_enabled = true
//!
//! [key_manager.security]
//! min_password_length = 14
//!
//! [retention]
//! checkpoint_days = 30
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use vault_domain::entities::DEFAULT_MAX_SESSION_SIZE;
use vault_domain::VaultError;

use crate::application::services::key_manager::KeyManagerConfig;
use crate::application::services::retention_scheduler::RetentionSettings;
use crate::application::services::state_serializer::SerializerConfig;

/// Serializer defaults as they appear in the settings file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializerSettings {
    pub max_session_size: u64,
    pub compression_enabled: bool,
    pub encryption_enabled: bool,
}

impl Default for SerializerSettings {
    fn default() -> Self {
        Self {
            max_session_size: DEFAULT_MAX_SESSION_SIZE,
            compression_enabled: true,
            encryption_enabled: true,
        }
    }
}

impl From<SerializerSettings> for SerializerConfig {
    fn from(settings: SerializerSettings) -> Self {
        SerializerConfig {
            max_session_size: settings.max_session_size,
            compression_enabled: settings.compression_enabled,
            encryption_enabled: settings.encryption_enabled,
        }
    }
}

/// Full engine settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultSettings {
    /// SQLite connection URL (e.g. `sqlite://vault.db`)
    pub database_url: Option<String>,
    pub serializer: SerializerSettings,
    pub key_manager: KeyManagerConfig,
    pub retention: RetentionSettings,
}

impl VaultSettings {
    /// Parses settings from TOML text
    pub fn from_toml(text: &str) -> Result<Self, VaultError> {
        toml::from_str(text).map_err(|e| VaultError::SerializationError(format!("settings did not parse: {}", e)))
    }

    /// Loads settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, VaultError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = VaultSettings::default();
        assert_eq!(settings.serializer.max_session_size, 50 * 1024 * 1024);
        assert!(settings.serializer.compression_enabled);
        assert_eq!(settings.key_manager.security.min_password_length, 12);
        assert_eq!(settings.retention.checkpoint_days, 90);
        assert!(settings.database_url.is_none());
    }

    #[test]
    fn test_partial_toml_overrides_only_named_fields() {
        let settings = VaultSettings::from_toml(
            r#"
            database_url = "sqlite://vault.db"

            [serializer]
            compression_enabled = false

            [key_manager.security]
            min_password_length = 14

            [retention]
            checkpoint_days = 30
            "#,
        )
        .unwrap();

        assert_eq!(settings.database_url.as_deref(), Some("sqlite://vault.db"));
        assert!(!settings.serializer.compression_enabled);
        // Untouched siblings keep their defaults
        assert!(settings.serializer.encryption_enabled);
        assert_eq!(settings.key_manager.security.min_password_length, 14);
        assert_eq!(settings.key_manager.security.max_failed_attempts, 5);
        assert_eq!(settings.retention.checkpoint_days, 30);
        assert_eq!(settings.retention.inactive_days, 7);
    }

    #[test]
    fn test_malformed_toml_fails() {
        assert!(VaultSettings::from_toml("not = [valid").is_err());
    }
}
