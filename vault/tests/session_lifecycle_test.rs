//! # Session Lifecycle Tests
//!
//! End-to-end coverage of the session store over an in-memory database:
//! the happy round-trip, the one-active-session invariant, optimistic
//! concurrency, expiry, cascade deletion, and listing.

mod common;

use chrono::{Duration, Utc};
use vault::application::services::CreateSessionRequest;
use vault::{OperationContext, VaultError};
use vault_domain::repositories::{SessionQuery, SessionRepository};
use vault_domain::value_objects::{SessionId, UserId, WorkspaceId};

use common::{ctx, sample_state, test_vault};

const PASSWORD: &str = "CorrectP@ss123!";

fn request(user_id: UserId, name: &str) -> CreateSessionRequest {
    CreateSessionRequest {
        user_id,
        workspace_id: WorkspaceId::new(),
        name: name.to_string(),
        state: sample_state(),
    }
}

#[tokio::test]
async fn test_happy_round_trip() {
    let harness = test_vault().await;
    let user = UserId::new();

    let created = harness
        .vault
        .sessions
        .create_session(&ctx(), request(user, "dev box"), Some(PASSWORD))
        .await
        .unwrap();
    assert_eq!(created.session.version, 1);
    assert!(created.session.is_active());

    let read = harness
        .vault
        .sessions
        .get_session(&ctx(), created.session.id, Some(PASSWORD))
        .await
        .unwrap();
    assert!(!read.recovered);
    assert_eq!(read.state, sample_state());
}

#[tokio::test]
async fn test_at_most_one_active_session_per_user() {
    let harness = test_vault().await;
    let user = UserId::new();

    let a = harness
        .vault
        .sessions
        .create_session(&ctx(), request(user, "session a"), Some(PASSWORD))
        .await
        .unwrap();
    let b = harness
        .vault
        .sessions
        .create_session(&ctx(), request(user, "session b"), Some(PASSWORD))
        .await
        .unwrap();

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions WHERE user_id = ? AND status = 'active'")
        .bind(user.to_string())
        .fetch_one(&harness.pool)
        .await
        .unwrap();
    assert_eq!(count, 1);

    let page = harness
        .vault
        .sessions
        .list_sessions(
            &ctx(),
            user,
            SessionQuery {
                is_active: Some(true),
                page: 1,
                page_size: 10,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.sessions[0].id, b.session.id);

    // The earlier session stepped down, and its metadata projection agrees.
    let demoted = harness
        .vault
        .sessions
        .get_session(&ctx(), a.session.id, Some(PASSWORD))
        .await
        .unwrap();
    assert!(!demoted.session.is_active());
}

#[tokio::test]
async fn test_update_bumps_version_and_round_trips() {
    let harness = test_vault().await;
    let user = UserId::new();

    let created = harness
        .vault
        .sessions
        .create_session(&ctx(), request(user, "dev"), Some(PASSWORD))
        .await
        .unwrap();

    let mut updated_state = sample_state();
    updated_state.terminals[0].command = Some("cargo test".to_string());

    let updated = harness
        .vault
        .sessions
        .update_session(&ctx(), created.session.id, &updated_state, Some(PASSWORD))
        .await
        .unwrap();
    assert_eq!(updated.version, 2);

    let read = harness
        .vault
        .sessions
        .get_session(&ctx(), created.session.id, Some(PASSWORD))
        .await
        .unwrap();
    assert_eq!(read.state, updated_state);
}

#[tokio::test]
async fn test_stale_version_fails_conflict() {
    let harness = test_vault().await;
    let user = UserId::new();

    let created = harness
        .vault
        .sessions
        .create_session(&ctx(), request(user, "dev"), Some(PASSWORD))
        .await
        .unwrap();

    // Move the row forward, then replay a write that still observes v1.
    let state = sample_state();
    harness
        .vault
        .sessions
        .update_session(&ctx(), created.session.id, &state, Some(PASSWORD))
        .await
        .unwrap();

    let repo = vault::infrastructure::repositories::SqliteSessionRepository::new(harness.pool.clone());
    let mut stale = repo.find_session(created.session.id).await.unwrap().unwrap();
    stale.version = 5;
    let result = repo.update_session_txn(&stale, 1).await;
    assert!(matches!(result, Err(VaultError::VersionConflict(_))));
}

#[tokio::test]
async fn test_expired_session_rejects_updates() {
    let harness = test_vault().await;
    let user = UserId::new();

    let created = harness
        .vault
        .sessions
        .create_session(&ctx(), request(user, "dev"), Some(PASSWORD))
        .await
        .unwrap();

    let past = (Utc::now() - Duration::days(1)).to_rfc3339();
    sqlx::query("UPDATE sessions SET expires_at = ? WHERE id = ?")
        .bind(&past)
        .bind(created.session.id.to_string())
        .execute(&harness.pool)
        .await
        .unwrap();

    let result = harness
        .vault
        .sessions
        .update_session(&ctx(), created.session.id, &sample_state(), Some(PASSWORD))
        .await;
    assert!(matches!(result, Err(VaultError::Expired(_))));
}

#[tokio::test]
async fn test_missing_session_fails_not_found() {
    let harness = test_vault().await;
    let result = harness
        .vault
        .sessions
        .get_session(&ctx(), SessionId::new(), Some(PASSWORD))
        .await;
    assert!(matches!(result, Err(VaultError::NotFound(_))));
}

#[tokio::test]
async fn test_delete_cascades_checkpoints_and_metadata() {
    let harness = test_vault().await;
    let user = UserId::new();

    let created = harness
        .vault
        .sessions
        .create_session(&ctx(), request(user, "dev"), Some(PASSWORD))
        .await
        .unwrap();

    let checkpoint_request = vault::application::services::CreateCheckpointRequest::new(
        created.session.id,
        "before delete",
        sample_state(),
    );
    harness
        .vault
        .checkpoints
        .create_checkpoint(&ctx(), checkpoint_request)
        .await
        .unwrap();

    harness
        .vault
        .sessions
        .delete_session(&ctx(), created.session.id)
        .await
        .unwrap();

    let (checkpoints,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM checkpoints WHERE session_id = ?")
        .bind(created.session.id.to_string())
        .fetch_one(&harness.pool)
        .await
        .unwrap();
    let (metadata,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM session_metadata WHERE session_id = ?")
        .bind(created.session.id.to_string())
        .fetch_one(&harness.pool)
        .await
        .unwrap();
    assert_eq!(checkpoints, 0);
    assert_eq!(metadata, 0);
}

#[tokio::test]
async fn test_metadata_checkpoint_count_tracks_table() {
    let harness = test_vault().await;
    let user = UserId::new();

    let created = harness
        .vault
        .sessions
        .create_session(&ctx(), request(user, "dev"), Some(PASSWORD))
        .await
        .unwrap();

    for i in 0..3 {
        let checkpoint_request = vault::application::services::CreateCheckpointRequest::new(
            created.session.id,
            format!("cp-{}", i),
            sample_state(),
        );
        harness
            .vault
            .checkpoints
            .create_checkpoint(&ctx(), checkpoint_request)
            .await
            .unwrap();
    }

    let repo = vault::infrastructure::repositories::SqliteSessionRepository::new(harness.pool.clone());
    let metadata = repo.find_metadata(created.session.id).await.unwrap().unwrap();
    assert_eq!(metadata.checkpoint_count, 3);

    let (actual,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM checkpoints WHERE session_id = ?")
        .bind(created.session.id.to_string())
        .fetch_one(&harness.pool)
        .await
        .unwrap();
    assert_eq!(metadata.checkpoint_count as i64, actual);
}

#[tokio::test]
async fn test_listing_orders_by_last_saved_desc_with_total() {
    let harness = test_vault().await;
    let user = UserId::new();

    for name in ["one", "two", "three"] {
        harness
            .vault
            .sessions
            .create_session(&ctx(), request(user, name), Some(PASSWORD))
            .await
            .unwrap();
    }

    let page = harness
        .vault
        .sessions
        .list_sessions(
            &ctx(),
            user,
            SessionQuery {
                page: 1,
                page_size: 2,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.sessions.len(), 2);
    assert!(page.sessions[0].last_saved_at >= page.sessions[1].last_saved_at);

    let rest = harness
        .vault
        .sessions
        .list_sessions(
            &ctx(),
            user,
            SessionQuery {
                page: 2,
                page_size: 2,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(rest.sessions.len(), 1);
}

#[tokio::test]
async fn test_expired_deadline_aborts_before_any_write() {
    let harness = test_vault().await;
    let user = UserId::new();

    let expired = OperationContext::with_deadline(Utc::now() - Duration::seconds(1));
    let result = harness
        .vault
        .sessions
        .create_session(&expired, request(user, "never"), Some(PASSWORD))
        .await;
    assert!(matches!(result, Err(VaultError::Deadline(_))));

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
        .fetch_one(&harness.pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}
