//! # Retention & Rotation Scheduler Tests
//!
//! The three cleanup passes, their idempotence, per-user checkpoint
//! retention overrides, the metadata recount, and the rotation-due scan
//! with collapse semantics.

mod common;

use chrono::{Duration, Utc};
use vault::application::services::{CreateCheckpointRequest, CreateKeyOptions, CreateSessionRequest};
use vault::VaultEvent;
use vault_domain::repositories::SessionRepository;
use vault_domain::services::datetime_serde;
use vault_domain::value_objects::{SessionId, UserId, WorkspaceId};

use common::{ctx, sample_state, test_vault, TestVault};

const PASSWORD: &str = "CorrectP@ss123!";

async fn seeded_session(harness: &TestVault, user: UserId) -> SessionId {
    harness
        .vault
        .sessions
        .create_session(
            &ctx(),
            CreateSessionRequest {
                user_id: user,
                workspace_id: WorkspaceId::new(),
                name: "retained".to_string(),
                state: sample_state(),
            },
            Some(PASSWORD),
        )
        .await
        .unwrap()
        .session
        .id
}

fn stamp(days_ago: i64) -> String {
    datetime_serde::to_canonical(&(Utc::now() - Duration::days(days_ago)))
}

#[tokio::test]
async fn test_cleanup_passes_and_idempotence() {
    let harness = test_vault().await;
    let user = UserId::new();

    // An expired auto-saved session: inactive, expiry long past the grace.
    let expired = seeded_session(&harness, user).await;
    sqlx::query("UPDATE sessions SET status = 'inactive', expires_at = ? WHERE id = ?")
        .bind(stamp(40))
        .bind(expired.to_string())
        .execute(&harness.pool)
        .await
        .unwrap();
    sqlx::query("UPDATE session_metadata SET is_active = 0 WHERE session_id = ?")
        .bind(expired.to_string())
        .execute(&harness.pool)
        .await
        .unwrap();

    // A live session with one ancient checkpoint and one fresh one.
    let live = seeded_session(&harness, user).await;
    let ancient = harness
        .vault
        .checkpoints
        .create_checkpoint(&ctx(), CreateCheckpointRequest::new(live, "ancient", sample_state()))
        .await
        .unwrap();
    sqlx::query("UPDATE checkpoints SET created_at = ? WHERE id = ?")
        .bind(stamp(120))
        .bind(ancient.id.to_string())
        .execute(&harness.pool)
        .await
        .unwrap();
    harness
        .vault
        .checkpoints
        .create_checkpoint(&ctx(), CreateCheckpointRequest::new(live, "fresh", sample_state()))
        .await
        .unwrap();

    let report = harness.vault.scheduler.cleanup_expired_sessions().await.unwrap();
    assert_eq!(report.auto_saved_deleted, 1);
    assert_eq!(report.checkpoints_deleted, 1);
    assert_eq!(report.inactive_deleted, 0);
    assert_eq!(report.total_sessions_deleted, 1);
    assert!(report.space_freed > 0);
    assert!(matches!(report.event, Some(VaultEvent::CleanupCompleted { .. })));

    // The recount pass restored consistency for the surviving session.
    let repo = vault::infrastructure::repositories::SqliteSessionRepository::new(harness.pool.clone());
    let metadata = repo.find_metadata(live).await.unwrap().unwrap();
    assert_eq!(metadata.checkpoint_count, 1);

    // Running again with no intervening writes deletes nothing.
    let second = harness.vault.scheduler.cleanup_expired_sessions().await.unwrap();
    assert_eq!(second.total_sessions_deleted, 0);
    assert_eq!(second.checkpoints_deleted, 0);
    assert_eq!(second.space_freed, 0);
}

#[tokio::test]
async fn test_inactive_session_pass_uses_metadata_join() {
    let harness = test_vault().await;
    let user = UserId::new();

    let stale = seeded_session(&harness, user).await;
    sqlx::query("UPDATE sessions SET status = 'inactive' WHERE id = ?")
        .bind(stale.to_string())
        .execute(&harness.pool)
        .await
        .unwrap();
    sqlx::query("UPDATE session_metadata SET is_active = 0, last_saved_at = ? WHERE session_id = ?")
        .bind(stamp(10))
        .bind(stale.to_string())
        .execute(&harness.pool)
        .await
        .unwrap();

    let report = harness.vault.scheduler.cleanup_expired_sessions().await.unwrap();
    assert_eq!(report.inactive_deleted, 1);

    let repo = vault::infrastructure::repositories::SqliteSessionRepository::new(harness.pool.clone());
    assert!(repo.find_session(stale).await.unwrap().is_none());
}

#[tokio::test]
async fn test_per_user_checkpoint_retention_override() {
    let harness = test_vault().await;
    let strict_user = UserId::new();
    let default_user = UserId::new();

    let strict_session = seeded_session(&harness, strict_user).await;
    let default_session = seeded_session(&harness, default_user).await;

    // The strict user keeps checkpoints only 10 days.
    sqlx::query("UPDATE session_configs SET checkpoint_retention_days = 10 WHERE user_id = ?")
        .bind(strict_user.to_string())
        .execute(&harness.pool)
        .await
        .unwrap();

    for (session, name) in [(strict_session, "strict"), (default_session, "default")] {
        let checkpoint = harness
            .vault
            .checkpoints
            .create_checkpoint(&ctx(), CreateCheckpointRequest::new(session, name, sample_state()))
            .await
            .unwrap();
        // Both checkpoints are 30 days old: past the strict override,
        // within the 90-day default.
        sqlx::query("UPDATE checkpoints SET created_at = ? WHERE id = ?")
            .bind(stamp(30))
            .bind(checkpoint.id.to_string())
            .execute(&harness.pool)
            .await
            .unwrap();
    }

    let report = harness.vault.scheduler.cleanup_expired_sessions().await.unwrap();
    assert_eq!(report.checkpoints_deleted, 1);

    let (names,): (String,) = sqlx::query_as("SELECT GROUP_CONCAT(name) FROM checkpoints")
        .fetch_one(&harness.pool)
        .await
        .unwrap();
    assert_eq!(names, "default");
}

#[tokio::test]
async fn test_rotation_scan_emits_and_collapses() {
    let harness = test_vault().await;
    let user = UserId::new();

    let key = harness
        .vault
        .keys
        .create_user_key(&ctx(), user, "aging", "OldP@ss123!0", CreateKeyOptions::default())
        .await
        .unwrap();
    // Far past the interval so the deterministic jitter cannot defer it.
    sqlx::query("UPDATE user_encryption_keys SET created_at = ? WHERE key_id = ?")
        .bind(stamp(200))
        .bind(key.key_id.to_string())
        .execute(&harness.pool)
        .await
        .unwrap();

    let events = harness.vault.scheduler.scan_for_rotation().await.unwrap();
    assert_eq!(events.len(), 1);
    let VaultEvent::KeyRotationDue { key_id, user_id, .. } = &events[0] else {
        panic!("expected KeyRotationDue");
    };
    assert_eq!(key_id, &key.key_id);
    assert_eq!(user_id, &user);

    // Still pending: a second scan collapses the duplicate.
    let collapsed = harness.vault.scheduler.scan_for_rotation().await.unwrap();
    assert!(collapsed.is_empty());

    // Once the rotation task completes, the key is eligible again.
    harness.vault.scheduler.complete_rotation(key.key_id.as_str());
    let again = harness.vault.scheduler.scan_for_rotation().await.unwrap();
    assert_eq!(again.len(), 1);
}
