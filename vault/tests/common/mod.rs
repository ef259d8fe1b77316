//! Shared helpers for the integration suites: an in-memory engine with a
//! reachable pool, the canonical sample state, and fast key-derivation
//! settings so key tests do not burn CPU on production iteration counts.

#![allow(dead_code)]

use serde_json::json;
use sqlx::SqlitePool;

use vault::application::services::KeyManagerConfig;
use vault::infrastructure::config::VaultSettings;
use vault::infrastructure::repositories::schema;
use vault::{OperationContext, Vault, WorkspaceState};
use vault_domain::entities::SessionConfig;
use vault_domain::value_objects::UserId;

/// An assembled in-memory engine plus the pool behind it, so tests can
/// reach into rows (aging timestamps, corrupting payloads).
pub struct TestVault {
    pub vault: Vault,
    pub pool: SqlitePool,
}

/// Test settings: production policy, test-speed key derivation.
pub fn test_settings() -> VaultSettings {
    let mut key_manager = KeyManagerConfig::default();
    key_manager.key_derivation.iterations = 1_000;
    VaultSettings {
        key_manager,
        ..VaultSettings::default()
    }
}

pub async fn test_vault() -> TestVault {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let pool = schema::in_memory_pool().await.expect("in-memory pool");
    let vault = Vault::with_pool(pool.clone(), test_settings());
    TestVault { vault, pool }
}

pub fn ctx() -> OperationContext {
    OperationContext::new()
}

/// The canonical happy-path state.
pub fn sample_state() -> WorkspaceState {
    serde_json::from_value(json!({
        "terminals": [{"id": "t1", "command": "ls", "isActive": true}],
        "browserTabs": [],
        "aiConversations": [],
        "openFiles": [{"path": "/a.ts", "content": "x", "hasUnsavedChanges": false}],
        "workspaceConfig": {},
        "metadata": {}
    }))
    .expect("sample state decodes")
}

/// Config with the payload pipeline fully transparent (no gzip, no AES),
/// for tests that poke payload bytes directly.
pub fn plain_config(user_id: UserId) -> SessionConfig {
    SessionConfig {
        compression_enabled: false,
        encryption_enabled: false,
        ..SessionConfig::defaults_for(user_id)
    }
}
