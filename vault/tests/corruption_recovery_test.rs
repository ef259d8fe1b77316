//! # Corruption Recovery Tests
//!
//! Tampered payloads must fail integrity first, then flow through the
//! recovery engine; hopeless payloads surface `UnrecoverableCorruption`.

mod common;

use vault::application::services::CreateSessionRequest;
use vault::VaultError;
use vault_domain::repositories::SessionRepository;
use vault_domain::value_objects::{UserId, WorkspaceId};

use common::{ctx, plain_config, sample_state, test_vault};

#[tokio::test]
async fn test_flipped_byte_recovers_with_open_files_preserved() {
    let harness = test_vault().await;
    let user = UserId::new();

    // Transparent pipeline so the payload bytes are raw JSON.
    let repo = vault::infrastructure::repositories::SqliteSessionRepository::new(harness.pool.clone());
    repo.upsert_config(&plain_config(user)).await.unwrap();

    let created = harness
        .vault
        .sessions
        .create_session(
            &ctx(),
            CreateSessionRequest {
                user_id: user,
                workspace_id: WorkspaceId::new(),
                name: "corruptible".to_string(),
                state: sample_state(),
            },
            None,
        )
        .await
        .unwrap();

    // Flip one byte inside a string value: the checksum breaks while the
    // JSON stays parseable, the worst kind of silent corruption.
    let mut payload = created.session.payload.clone();
    let target = payload
        .windows(4)
        .position(|w| w == b"\"ls\"")
        .expect("command text present in payload");
    payload[target + 1] ^= 0x01;
    sqlx::query("UPDATE sessions SET payload = ? WHERE id = ?")
        .bind(&payload)
        .bind(created.session.id.to_string())
        .execute(&harness.pool)
        .await
        .unwrap();

    let read = harness
        .vault
        .sessions
        .get_session(&ctx(), created.session.id, None)
        .await
        .unwrap();

    assert!(read.recovered);
    assert!(!read.warnings.is_empty());
    assert_eq!(read.state.open_files.len(), 1);
    assert_eq!(read.state.open_files[0].path, "/a.ts");
}

#[tokio::test]
async fn test_truncated_payload_still_recovers_nested_state() {
    let harness = test_vault().await;
    let user = UserId::new();

    let repo = vault::infrastructure::repositories::SqliteSessionRepository::new(harness.pool.clone());
    repo.upsert_config(&plain_config(user)).await.unwrap();

    let created = harness
        .vault
        .sessions
        .create_session(
            &ctx(),
            CreateSessionRequest {
                user_id: user,
                workspace_id: WorkspaceId::new(),
                name: "truncated".to_string(),
                state: sample_state(),
            },
            None,
        )
        .await
        .unwrap();

    // Append garbage past the envelope: the checksum breaks, the nested
    // state object stays extractable.
    let mut payload = created.session.payload.clone();
    payload.extend_from_slice(b"####corrupt-tail####");
    sqlx::query("UPDATE sessions SET payload = ? WHERE id = ?")
        .bind(&payload)
        .bind(created.session.id.to_string())
        .execute(&harness.pool)
        .await
        .unwrap();

    let read = harness
        .vault
        .sessions
        .get_session(&ctx(), created.session.id, None)
        .await
        .unwrap();
    assert!(read.recovered);
    assert_eq!(read.state.terminals.len(), 1);
    assert_eq!(read.state.terminals[0].id, "t1");
}

#[tokio::test]
async fn test_hopeless_payload_fails_unrecoverable() {
    let harness = test_vault().await;
    let user = UserId::new();

    let repo = vault::infrastructure::repositories::SqliteSessionRepository::new(harness.pool.clone());
    repo.upsert_config(&plain_config(user)).await.unwrap();

    let created = harness
        .vault
        .sessions
        .create_session(
            &ctx(),
            CreateSessionRequest {
                user_id: user,
                workspace_id: WorkspaceId::new(),
                name: "hopeless".to_string(),
                state: sample_state(),
            },
            None,
        )
        .await
        .unwrap();

    sqlx::query("UPDATE sessions SET payload = ? WHERE id = ?")
        .bind(b"\x00\x01\x02 binary soup, nothing to salvage".as_slice())
        .bind(created.session.id.to_string())
        .execute(&harness.pool)
        .await
        .unwrap();

    let result = harness
        .vault
        .sessions
        .get_session(&ctx(), created.session.id, None)
        .await;
    assert!(matches!(result, Err(VaultError::UnrecoverableCorruption(_))));
}
