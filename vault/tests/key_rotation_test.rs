//! # Key Management Tests
//!
//! Creation limits, password validation semantics (unwrap-as-proof,
//! lockout, `last_used_at`), the 30-day rotation rule, last-key
//! protection, and expiry cleanup.

mod common;

use chrono::{Duration, Utc};
use vault::application::services::{CreateKeyOptions, RotateKeyOptions};
use vault::VaultError;
use vault_domain::entities::KeyStatus;
use vault_domain::value_objects::{KeyId, UserId};

use common::{ctx, test_vault, TestVault};

const OLD_PASSWORD: &str = "OldP@ss123!0";
const NEW_PASSWORD: &str = "NewSecureP@ss456!";

async fn age_key(harness: &TestVault, key_id: &KeyId, days: i64) {
    let stamp = vault_domain::services::datetime_serde::to_canonical(&(Utc::now() - Duration::days(days)));
    sqlx::query("UPDATE user_encryption_keys SET created_at = ? WHERE key_id = ?")
        .bind(stamp)
        .bind(key_id.to_string())
        .execute(&harness.pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_create_and_validate_key() {
    let harness = test_vault().await;
    let user = UserId::new();

    let key = harness
        .vault
        .keys
        .create_user_key(&ctx(), user, "laptop", OLD_PASSWORD, CreateKeyOptions::default())
        .await
        .unwrap();
    assert_eq!(key.key_name, "laptop");
    assert!(matches!(key.status, KeyStatus::Active));

    let good = harness
        .vault
        .keys
        .validate_user_key(&ctx(), user, &key.key_id, OLD_PASSWORD)
        .await
        .unwrap();
    assert!(good.is_valid);
    assert!(!good.is_expired);
    // Test settings derive with a reduced iteration count, which earns the
    // weak-KDF warning without invalidating the key.
    assert!(good.warnings.iter().any(|w| w.contains("iterations")));

    let bad = harness
        .vault
        .keys
        .validate_user_key(&ctx(), user, &key.key_id, "WrongP@ss123!")
        .await
        .unwrap();
    assert!(!bad.is_valid);
    assert!(bad.errors.iter().any(|e| e.contains("invalid password")));
}

#[tokio::test]
async fn test_last_used_updates_only_on_success() {
    let harness = test_vault().await;
    let user = UserId::new();

    let key = harness
        .vault
        .keys
        .create_user_key(&ctx(), user, "laptop", OLD_PASSWORD, CreateKeyOptions::default())
        .await
        .unwrap();

    harness
        .vault
        .keys
        .validate_user_key(&ctx(), user, &key.key_id, "WrongP@ss123!")
        .await
        .unwrap();
    let after_failure = harness.vault.keys.list_keys(&ctx(), user).await.unwrap();
    assert!(after_failure[0].last_used_at.is_none());

    harness
        .vault
        .keys
        .validate_user_key(&ctx(), user, &key.key_id, OLD_PASSWORD)
        .await
        .unwrap();
    let after_success = harness.vault.keys.list_keys(&ctx(), user).await.unwrap();
    assert!(after_success[0].last_used_at.is_some());
}

#[tokio::test]
async fn test_weak_password_enumerates_reasons() {
    let harness = test_vault().await;
    let result = harness
        .vault
        .keys
        .create_user_key(&ctx(), UserId::new(), "weak", "short", CreateKeyOptions::default())
        .await;
    let Err(VaultError::WeakPassword(reasons)) = result else {
        panic!("expected WeakPassword");
    };
    assert!(reasons.len() >= 3);
}

#[tokio::test]
async fn test_key_name_conflict_and_limit() {
    let harness = test_vault().await;
    let user = UserId::new();

    harness
        .vault
        .keys
        .create_user_key(&ctx(), user, "dup", OLD_PASSWORD, CreateKeyOptions::default())
        .await
        .unwrap();
    let conflict = harness
        .vault
        .keys
        .create_user_key(&ctx(), user, "dup", OLD_PASSWORD, CreateKeyOptions::default())
        .await;
    assert!(matches!(conflict, Err(VaultError::KeyNameConflict(_))));

    for i in 1..10 {
        harness
            .vault
            .keys
            .create_user_key(&ctx(), user, &format!("key-{}", i), OLD_PASSWORD, CreateKeyOptions::default())
            .await
            .unwrap();
    }
    let over = harness
        .vault
        .keys
        .create_user_key(&ctx(), user, "key-11", OLD_PASSWORD, CreateKeyOptions::default())
        .await;
    assert!(matches!(over, Err(VaultError::KeyLimitExceeded(_))));
}

#[tokio::test]
async fn test_rotation_lifecycle() {
    let harness = test_vault().await;
    let user = UserId::new();

    let k1 = harness
        .vault
        .keys
        .create_user_key(&ctx(), user, "master", OLD_PASSWORD, CreateKeyOptions::default())
        .await
        .unwrap();

    // Fresh keys refuse rotation.
    let too_soon = harness
        .vault
        .keys
        .rotate_user_key(
            &ctx(),
            user,
            &k1.key_id,
            OLD_PASSWORD,
            NEW_PASSWORD,
            RotateKeyOptions::default(),
        )
        .await;
    assert!(matches!(too_soon, Err(VaultError::RotationTooSoon(_))));

    // Forty simulated days later the rotation goes through.
    age_key(&harness, &k1.key_id, 40).await;
    let outcome = harness
        .vault
        .keys
        .rotate_user_key(
            &ctx(),
            user,
            &k1.key_id,
            OLD_PASSWORD,
            NEW_PASSWORD,
            RotateKeyOptions::default(),
        )
        .await
        .unwrap();
    assert!(outcome.old_key_deactivated);
    assert!(outcome.migration_required);
    assert_ne!(outcome.new_key.key_id, k1.key_id);

    let keys = harness.vault.keys.list_keys(&ctx(), user).await.unwrap();
    let old = keys.iter().find(|k| k.key_id == k1.key_id).unwrap();
    let KeyStatus::Deactivated { reason, .. } = &old.status else {
        panic!("old key should be deactivated");
    };
    assert_eq!(reason.as_str(), "key_rotation");

    let new = keys.iter().find(|k| k.key_id == outcome.new_key.key_id).unwrap();
    assert!(matches!(new.status, KeyStatus::Active));

    // Rotating the replacement ten simulated days later is again too soon.
    age_key(&harness, &outcome.new_key.key_id, 10).await;
    let again = harness
        .vault
        .keys
        .rotate_user_key(
            &ctx(),
            user,
            &outcome.new_key.key_id,
            NEW_PASSWORD,
            "ThirdP@ssw0rd789!",
            RotateKeyOptions::default(),
        )
        .await;
    assert!(matches!(again, Err(VaultError::RotationTooSoon(_))));

    // Unless the caller forces it.
    let forced = harness
        .vault
        .keys
        .rotate_user_key(
            &ctx(),
            user,
            &outcome.new_key.key_id,
            NEW_PASSWORD,
            "ThirdP@ssw0rd789!",
            RotateKeyOptions {
                force_rotation: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(forced.old_key_deactivated);
}

#[tokio::test]
async fn test_rotation_with_wrong_password_fails() {
    let harness = test_vault().await;
    let user = UserId::new();

    let key = harness
        .vault
        .keys
        .create_user_key(&ctx(), user, "master", OLD_PASSWORD, CreateKeyOptions::default())
        .await
        .unwrap();
    age_key(&harness, &key.key_id, 40).await;

    let result = harness
        .vault
        .keys
        .rotate_user_key(
            &ctx(),
            user,
            &key.key_id,
            "WrongP@ss123!",
            NEW_PASSWORD,
            RotateKeyOptions::default(),
        )
        .await;
    assert!(matches!(result, Err(VaultError::DecryptionFailed(_))));
}

#[tokio::test]
async fn test_only_active_key_cannot_be_deleted() {
    let harness = test_vault().await;
    let user = UserId::new();

    let only = harness
        .vault
        .keys
        .create_user_key(&ctx(), user, "only", OLD_PASSWORD, CreateKeyOptions::default())
        .await
        .unwrap();
    let refused = harness
        .vault
        .keys
        .delete_user_key(&ctx(), user, &only.key_id, OLD_PASSWORD)
        .await;
    assert!(matches!(refused, Err(VaultError::LastKey(_))));

    harness
        .vault
        .keys
        .create_user_key(&ctx(), user, "spare", OLD_PASSWORD, CreateKeyOptions::default())
        .await
        .unwrap();
    harness
        .vault
        .keys
        .delete_user_key(&ctx(), user, &only.key_id, OLD_PASSWORD)
        .await
        .unwrap();

    let remaining = harness.vault.keys.list_keys(&ctx(), user).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].key_name, "spare");
}

#[tokio::test]
async fn test_repeated_failures_soft_lock_the_key() {
    let harness = test_vault().await;
    let user = UserId::new();

    let key = harness
        .vault
        .keys
        .create_user_key(&ctx(), user, "locked", OLD_PASSWORD, CreateKeyOptions::default())
        .await
        .unwrap();

    for _ in 0..5 {
        let result = harness
            .vault
            .keys
            .validate_user_key(&ctx(), user, &key.key_id, "WrongP@ss123!")
            .await
            .unwrap();
        assert!(!result.is_valid);
    }

    // Even the correct password bounces while the lockout holds.
    let locked = harness
        .vault
        .keys
        .validate_user_key(&ctx(), user, &key.key_id, OLD_PASSWORD)
        .await
        .unwrap();
    assert!(!locked.is_valid);
    assert!(locked.errors.iter().any(|e| e.contains("locked")));
}

#[tokio::test]
async fn test_cleanup_expired_keys_is_idempotent() {
    let harness = test_vault().await;
    let user = UserId::new();

    let key = harness
        .vault
        .keys
        .create_user_key(&ctx(), user, "stale", OLD_PASSWORD, CreateKeyOptions::default())
        .await
        .unwrap();

    let past = vault_domain::services::datetime_serde::to_canonical(&(Utc::now() - Duration::days(1)));
    sqlx::query("UPDATE user_encryption_keys SET expires_at = ? WHERE key_id = ?")
        .bind(past)
        .bind(key.key_id.to_string())
        .execute(&harness.pool)
        .await
        .unwrap();

    assert_eq!(harness.vault.keys.cleanup_expired_keys().await.unwrap(), 1);

    let keys = harness.vault.keys.list_keys(&ctx(), user).await.unwrap();
    let KeyStatus::Deactivated { reason, .. } = &keys[0].status else {
        panic!("expired key should be deactivated");
    };
    assert_eq!(reason.as_str(), "expired");

    // Second run with no intervening writes finds nothing.
    assert_eq!(harness.vault.keys.cleanup_expired_keys().await.unwrap(), 0);
}
