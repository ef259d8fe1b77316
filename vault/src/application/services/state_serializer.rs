// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # State Serializer
//!
//! Turns a [`WorkspaceState`] into persisted bytes and back, through a fixed
//! pipeline:
//!
//! ```text
//! validate → canonical JSON → size check → gzip → AES-256-GCM envelope → checksum
//! ```
//!
//! The read path reverses the pipeline and verifies at each stage: checksum
//! first (`IntegrityFailed`), then decryption (`DecryptionFailed`,
//! `UnsupportedAlgorithm`), then decompression, then shape validation
//! (`InvalidStateShape`). Which stages apply on read is dispatched from the
//! algorithm identifiers persisted on the owning row, never guessed from
//! the bytes.
//!
//! ## Incremental serialization
//!
//! The serializer optionally tracks the previously serialized state. When a
//! base exists and still verifies, [`StateSerializer::serialize_incremental`]
//! additionally produces a delta envelope recording the base hash, the new
//! hash, and per-sequence change tags. Deltas are diagnostic: stores persist
//! full payloads, and [`StateSerializer::apply_delta`] refuses a delta whose
//! base checksum does not match the base state it is applied against
//! (`BaseStateMismatch`).
//!
//! The base-state scratch is instance-local. Construct one serializer per
//! request; never share one across users.
//!
//! ## Legacy date revival
//!
//! Payloads written before timestamps were typed carry bare ISO-8601
//! strings. A compatibility pass rewrites strings matching
//! `YYYY-MM-DDTHH:MM:SS[.mmm]Z` into the canonical millisecond form while
//! parsing, so typed readers see one format. New payloads are canonical
//! already; the pass is a no-op for them.

use std::io::{Read, Write};
use std::sync::Arc;

use chrono::DateTime;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use vault_domain::entities::DEFAULT_MAX_SESSION_SIZE;
use vault_domain::services::datetime_serde;
use vault_domain::services::{CryptoProvider, KdfAlgorithm, SALT_LEN};
use vault_domain::value_objects::{
    Checksum, CompressionAlgorithm, EncryptedEnvelope, EncryptionAlgorithm, SequenceChange, SerializedPayload,
    WorkspaceState,
};
use vault_domain::VaultError;

static LEGACY_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d{3})?Z$").expect("valid regex"));

/// Serializer configuration, fixed at construction.
#[derive(Debug, Clone)]
pub struct SerializerConfig {
    pub max_session_size: u64,
    pub compression_enabled: bool,
    pub encryption_enabled: bool,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            max_session_size: DEFAULT_MAX_SESSION_SIZE,
            compression_enabled: true,
            encryption_enabled: true,
        }
    }
}

/// Output of a serialization pass.
#[derive(Debug, Clone)]
pub struct SerializedState {
    pub data: Vec<u8>,
    pub checksum: Checksum,
    /// Final payload size, after compression and encryption
    pub size: u64,
    /// Canonical encoding size, before compression and encryption
    pub uncompressed_size: u64,
    pub compressed: bool,
    pub encrypted: bool,
}

impl SerializedState {
    /// Algorithm identifier to persist alongside the payload
    pub fn encryption_algorithm(&self) -> EncryptionAlgorithm {
        if self.encrypted {
            EncryptionAlgorithm::AesGcm
        } else {
            EncryptionAlgorithm::None
        }
    }

    /// Compression identifier to persist alongside the payload
    pub fn compression(&self) -> CompressionAlgorithm {
        if self.compressed {
            CompressionAlgorithm::Gzip
        } else {
            CompressionAlgorithm::None
        }
    }
}

/// Outcome of an incremental serialization pass.
#[derive(Debug, Clone)]
pub struct IncrementalOutcome {
    /// The full payload — what the stores persist
    pub full: SerializedState,

    /// The diagnostic delta envelope, present when a valid base existed
    pub delta: Option<SerializedState>,

    /// Per-sequence change tags against the base (empty when no base)
    pub changes: Vec<SequenceChange>,
}

/// Serializes workspace states to persisted bytes and back.
pub struct StateSerializer {
    config: SerializerConfig,
    crypto: Arc<dyn CryptoProvider>,
    previous_state: Option<WorkspaceState>,
    previous_checksum: Option<Checksum>,
}

impl StateSerializer {
    pub fn new(config: SerializerConfig, crypto: Arc<dyn CryptoProvider>) -> Self {
        Self {
            config,
            crypto,
            previous_state: None,
            previous_checksum: None,
        }
    }

    /// Seeds the delta base from a previously deserialized state
    pub fn with_base(mut self, base: WorkspaceState) -> Self {
        let checksum = canonical_state_checksum(&base);
        self.previous_state = Some(base);
        self.previous_checksum = checksum.ok();
        self
    }

    /// Serializes a full payload.
    ///
    /// Encryption applies only when it is enabled **and** a password is
    /// supplied; compression applies whenever it is enabled.
    pub fn serialize(&self, state: &WorkspaceState, password: Option<&str>) -> Result<SerializedState, VaultError> {
        let value = serde_json::to_value(state)?;
        WorkspaceState::validate_shape(&value)?;

        let payload = SerializedPayload::Full { state: value };
        self.seal_payload(&payload, password)
    }

    /// Serializes incrementally against the tracked base state.
    ///
    /// When there is no base, or the base's checksum no longer verifies,
    /// only a full payload is produced and the base is refreshed. Otherwise
    /// a diagnostic delta envelope is produced alongside the full payload.
    pub fn serialize_incremental(
        &mut self,
        state: &WorkspaceState,
        password: Option<&str>,
    ) -> Result<IncrementalOutcome, VaultError> {
        let full = self.serialize(state, password)?;
        let new_checksum = canonical_state_checksum(state)?;

        // The base participates only while its stored checksum re-verifies.
        let verified_base = match (&self.previous_state, &self.previous_checksum) {
            (Some(base), Some(stored)) => match canonical_state_checksum(base) {
                Ok(actual) if &actual == stored => Some((base, stored.clone())),
                _ => None,
            },
            _ => None,
        };

        let outcome = if let Some((base, base_checksum)) = verified_base {
            let changes = diff_states(base, state);
            let delta_payload = SerializedPayload::Delta {
                base_checksum,
                new_checksum: new_checksum.clone(),
                changes: changes.clone(),
            };
            let delta = self.seal_payload(&delta_payload, password)?;
            debug!(changed_sequences = changes.len(), "produced incremental delta envelope");
            IncrementalOutcome {
                full,
                delta: Some(delta),
                changes,
            }
        } else {
            IncrementalOutcome {
                full,
                delta: None,
                changes: Vec::new(),
            }
        };

        self.previous_state = Some(state.clone());
        self.previous_checksum = Some(new_checksum);
        Ok(outcome)
    }

    /// Deserializes persisted bytes back into a workspace state.
    ///
    /// `encryption` and `compression` come from the owning row; they decide
    /// which pipeline stages run. A delta payload is applied against the
    /// tracked base state.
    pub fn deserialize(
        &self,
        data: &[u8],
        checksum: &Checksum,
        encryption: EncryptionAlgorithm,
        compression: CompressionAlgorithm,
        password: Option<&str>,
    ) -> Result<WorkspaceState, VaultError> {
        checksum.verify(data)?;

        let decrypted = match encryption {
            EncryptionAlgorithm::AesGcm => {
                let password = password
                    .ok_or_else(|| VaultError::MissingKey("payload is encrypted but no password given".to_string()))?;
                let envelope = EncryptedEnvelope::from_bytes(data)?;
                let (ciphertext, iv, salt) = envelope.open()?;
                let key = self
                    .crypto
                    .derive_key(password, &salt, &KdfAlgorithm::default_pbkdf2())?;
                self.crypto.decrypt(&ciphertext, &key, &iv)?
            }
            EncryptionAlgorithm::None => data.to_vec(),
        };

        let decompressed = match compression {
            CompressionAlgorithm::Gzip => gunzip(&decrypted)?,
            CompressionAlgorithm::None => decrypted,
        };

        match SerializedPayload::from_bytes(&decompressed)? {
            SerializedPayload::Full { state } => decode_state(state),
            delta @ SerializedPayload::Delta { .. } => {
                let base = self.previous_state.as_ref().ok_or_else(|| {
                    VaultError::Corrupted("delta payload encountered with no base state available".to_string())
                })?;
                let (state, changes) = Self::apply_delta(&delta, base)?;
                debug!(changes = changes.len(), "applied delta payload against base state");
                Ok(state)
            }
        }
    }

    /// Applies a delta payload against a base state.
    ///
    /// Verifies that the delta's recorded base checksum matches the actual
    /// base (`BaseStateMismatch`), then returns the base state together
    /// with the reported changes.
    pub fn apply_delta(
        payload: &SerializedPayload,
        base: &WorkspaceState,
    ) -> Result<(WorkspaceState, Vec<SequenceChange>), VaultError> {
        match payload {
            SerializedPayload::Delta {
                base_checksum, changes, ..
            } => {
                let actual = canonical_state_checksum(base)?;
                if &actual != base_checksum {
                    return Err(VaultError::BaseStateMismatch(format!(
                        "delta base {}.. does not match state {}..",
                        &base_checksum.as_str()[..8],
                        &actual.as_str()[..8]
                    )));
                }
                Ok((base.clone(), changes.clone()))
            }
            SerializedPayload::Full { .. } => Err(VaultError::InternalError(
                "apply_delta called with a full payload".to_string(),
            )),
        }
    }

    /// Runs the size-check → compress → encrypt → checksum tail of the
    /// write pipeline over an already-validated payload.
    fn seal_payload(&self, payload: &SerializedPayload, password: Option<&str>) -> Result<SerializedState, VaultError> {
        let canonical = payload.to_bytes()?;
        let uncompressed_size = canonical.len() as u64;
        if uncompressed_size > self.config.max_session_size {
            return Err(VaultError::StateTooLarge(format!(
                "serialized state is {} bytes, limit is {}",
                uncompressed_size, self.config.max_session_size
            )));
        }

        let (bytes, compressed) = if self.config.compression_enabled {
            (gzip(&canonical)?, true)
        } else {
            (canonical, false)
        };

        let (bytes, encrypted) = match (self.config.encryption_enabled, password) {
            (true, Some(password)) => {
                let salt = self.crypto.random_bytes(SALT_LEN)?;
                let key = self
                    .crypto
                    .derive_key(password, &salt, &KdfAlgorithm::default_pbkdf2())?;
                let (ciphertext, iv) = self.crypto.encrypt(&bytes, &key)?;
                (EncryptedEnvelope::seal(&ciphertext, &iv, &salt).to_bytes()?, true)
            }
            _ => (bytes, false),
        };

        let checksum = Checksum::compute(&bytes);
        let size = bytes.len() as u64;
        Ok(SerializedState {
            data: bytes,
            checksum,
            size,
            uncompressed_size,
            compressed,
            encrypted,
        })
    }
}

/// Checksum of a state's canonical JSON encoding (pre-compression,
/// pre-encryption). This is the hash delta envelopes record.
pub fn canonical_state_checksum(state: &WorkspaceState) -> Result<Checksum, VaultError> {
    let bytes = serde_json::to_vec(state)?;
    Ok(Checksum::compute(&bytes))
}

fn gzip(bytes: &[u8]) -> Result<Vec<u8>, VaultError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder
        .finish()
        .map_err(|e| VaultError::SerializationError(format!("gzip failed: {}", e)))
}

fn gunzip(bytes: &[u8]) -> Result<Vec<u8>, VaultError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| VaultError::Corrupted(format!("gunzip failed: {}", e)))?;
    Ok(out)
}

/// Decodes a parsed state value, running the legacy date-revival pass and
/// the shape check before the typed decode.
fn decode_state(mut value: Value) -> Result<WorkspaceState, VaultError> {
    revive_legacy_dates(&mut value);
    WorkspaceState::validate_shape(&value)?;
    serde_json::from_value(value)
        .map_err(|e| VaultError::InvalidStateShape(format!("state did not decode: {}", e)))
}

/// Rewrites legacy ISO-8601 date strings (`YYYY-MM-DDTHH:MM:SS[.mmm]Z`)
/// into the canonical millisecond form, recursively. Compatibility shim for
/// payloads written before timestamps were typed; canonical input passes
/// through unchanged.
pub fn revive_legacy_dates(value: &mut Value) {
    match value {
        Value::String(s) => {
            if LEGACY_DATE.is_match(s) {
                if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
                    *s = datetime_serde::to_canonical(&parsed.to_utc());
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                revive_legacy_dates(item);
            }
        }
        Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                revive_legacy_dates(item);
            }
        }
        _ => {}
    }
}

/// Computes per-sequence change tags between two states.
fn diff_states(base: &WorkspaceState, new: &WorkspaceState) -> Vec<SequenceChange> {
    let mut changes = Vec::new();

    changes.push(diff_by_key("terminals", &base.terminals, &new.terminals, |t| {
        t.id.clone()
    }));
    changes.push(diff_by_key("browserTabs", &base.browser_tabs, &new.browser_tabs, |t| {
        let (url, title) = t.identity();
        format!("{}\u{1f}{}", url, title)
    }));
    changes.push(diff_by_key(
        "aiConversations",
        &base.ai_conversations,
        &new.ai_conversations,
        |c| c.id.clone(),
    ));
    changes.push(diff_by_key("openFiles", &base.open_files, &new.open_files, |f| {
        f.path.clone()
    }));

    if base.workspace_config != new.workspace_config {
        changes.push(SequenceChange {
            field: "workspaceConfig".to_string(),
            added: 0,
            removed: 0,
            modified: 1,
        });
    }
    if base.metadata != new.metadata {
        changes.push(SequenceChange {
            field: "metadata".to_string(),
            added: 0,
            removed: 0,
            modified: 1,
        });
    }

    changes.retain(|c| !c.is_empty());
    changes
}

fn diff_by_key<T: PartialEq, F: Fn(&T) -> String>(field: &str, base: &[T], new: &[T], key: F) -> SequenceChange {
    use std::collections::HashMap;

    let base_map: HashMap<String, &T> = base.iter().map(|item| (key(item), item)).collect();
    let new_map: HashMap<String, &T> = new.iter().map(|item| (key(item), item)).collect();

    let added = new_map.keys().filter(|k| !base_map.contains_key(*k)).count();
    let removed = base_map.keys().filter(|k| !new_map.contains_key(*k)).count();
    let modified = new_map
        .iter()
        .filter(|(k, item)| matches!(base_map.get(*k), Some(old) if *old != **item))
        .count();

    SequenceChange {
        field: field.to_string(),
        added,
        removed,
        modified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::crypto::RingCryptoProvider;
    use serde_json::json;

    fn crypto() -> Arc<dyn CryptoProvider> {
        Arc::new(RingCryptoProvider::new())
    }

    fn plain_config() -> SerializerConfig {
        SerializerConfig {
            max_session_size: DEFAULT_MAX_SESSION_SIZE,
            compression_enabled: false,
            encryption_enabled: false,
        }
    }

    fn sample_state() -> WorkspaceState {
        serde_json::from_value(json!({
            "terminals": [{"id": "t1", "command": "ls", "isActive": true}],
            "browserTabs": [],
            "aiConversations": [],
            "openFiles": [{"path": "/a.ts", "content": "x", "hasUnsavedChanges": false}],
            "workspaceConfig": {},
            "metadata": {}
        }))
        .unwrap()
    }

    #[test]
    fn test_round_trip_plain() {
        let serializer = StateSerializer::new(plain_config(), crypto());
        let state = sample_state();
        let sealed = serializer.serialize(&state, None).unwrap();
        assert!(!sealed.compressed);
        assert!(!sealed.encrypted);

        let restored = serializer
            .deserialize(
                &sealed.data,
                &sealed.checksum,
                EncryptionAlgorithm::None,
                CompressionAlgorithm::None,
                None,
            )
            .unwrap();
        assert_eq!(state, restored);
    }

    #[test]
    fn test_round_trip_compressed_and_encrypted() {
        let serializer = StateSerializer::new(SerializerConfig::default(), crypto());
        let state = sample_state();
        let sealed = serializer.serialize(&state, Some("CorrectP@ss123!")).unwrap();
        assert!(sealed.compressed);
        assert!(sealed.encrypted);
        assert_eq!(sealed.encryption_algorithm(), EncryptionAlgorithm::AesGcm);
        assert_eq!(sealed.compression(), CompressionAlgorithm::Gzip);

        let restored = serializer
            .deserialize(
                &sealed.data,
                &sealed.checksum,
                EncryptionAlgorithm::AesGcm,
                CompressionAlgorithm::Gzip,
                Some("CorrectP@ss123!"),
            )
            .unwrap();
        assert_eq!(state, restored);
    }

    #[test]
    fn test_wrong_password_fails_decryption() {
        let serializer = StateSerializer::new(SerializerConfig::default(), crypto());
        let sealed = serializer.serialize(&sample_state(), Some("CorrectP@ss123!")).unwrap();

        let result = serializer.deserialize(
            &sealed.data,
            &sealed.checksum,
            EncryptionAlgorithm::AesGcm,
            CompressionAlgorithm::Gzip,
            Some("WrongP@ss456!"),
        );
        assert!(matches!(result, Err(VaultError::DecryptionFailed(_))));
    }

    #[test]
    fn test_missing_password_fails_missing_key() {
        let serializer = StateSerializer::new(SerializerConfig::default(), crypto());
        let sealed = serializer.serialize(&sample_state(), Some("CorrectP@ss123!")).unwrap();

        let result = serializer.deserialize(
            &sealed.data,
            &sealed.checksum,
            EncryptionAlgorithm::AesGcm,
            CompressionAlgorithm::Gzip,
            None,
        );
        assert!(matches!(result, Err(VaultError::MissingKey(_))));
    }

    #[test]
    fn test_tampered_byte_fails_integrity_first() {
        let serializer = StateSerializer::new(plain_config(), crypto());
        let sealed = serializer.serialize(&sample_state(), None).unwrap();

        let mut tampered = sealed.data.clone();
        let mid = tampered.len() / 2;
        tampered[mid] ^= 0x01;

        let result = serializer.deserialize(
            &tampered,
            &sealed.checksum,
            EncryptionAlgorithm::None,
            CompressionAlgorithm::None,
            None,
        );
        assert!(matches!(result, Err(VaultError::IntegrityFailed(_))));
    }

    #[test]
    fn test_oversized_state_rejected() {
        let config = SerializerConfig {
            max_session_size: 64,
            compression_enabled: false,
            encryption_enabled: false,
        };
        let serializer = StateSerializer::new(config, crypto());
        let result = serializer.serialize(&sample_state(), None);
        assert!(matches!(result, Err(VaultError::StateTooLarge(_))));
    }

    #[test]
    fn test_checksum_deterministic_without_encryption() {
        let serializer = StateSerializer::new(plain_config(), crypto());
        let state = sample_state();
        let a = serializer.serialize(&state, None).unwrap();
        let b = serializer.serialize(&state, None).unwrap();
        assert_eq!(a.checksum, b.checksum);
    }

    #[test]
    fn test_checksums_differ_with_encryption_but_both_deserialize() {
        let serializer = StateSerializer::new(SerializerConfig::default(), crypto());
        let state = sample_state();
        let a = serializer.serialize(&state, Some("CorrectP@ss123!")).unwrap();
        let b = serializer.serialize(&state, Some("CorrectP@ss123!")).unwrap();
        // Fresh salt and IV per serialization
        assert_ne!(a.checksum, b.checksum);

        for sealed in [a, b] {
            let restored = serializer
                .deserialize(
                    &sealed.data,
                    &sealed.checksum,
                    EncryptionAlgorithm::AesGcm,
                    CompressionAlgorithm::Gzip,
                    Some("CorrectP@ss123!"),
                )
                .unwrap();
            assert_eq!(state, restored);
        }
    }

    #[test]
    fn test_incremental_first_pass_is_full_only() {
        let mut serializer = StateSerializer::new(plain_config(), crypto());
        let outcome = serializer.serialize_incremental(&sample_state(), None).unwrap();
        assert!(outcome.delta.is_none());
        assert!(outcome.changes.is_empty());
    }

    #[test]
    fn test_incremental_second_pass_reports_changes() {
        let mut serializer = StateSerializer::new(plain_config(), crypto());
        let base = sample_state();
        serializer.serialize_incremental(&base, None).unwrap();

        let mut updated = base.clone();
        updated.terminals[0].command = Some("pwd".to_string());
        updated.open_files.push(serde_json::from_value(json!({"path": "/b.ts"})).unwrap());

        let outcome = serializer.serialize_incremental(&updated, None).unwrap();
        let delta = outcome.delta.expect("second pass should carry a delta");

        let payload = SerializedPayload::from_bytes(&delta.data).unwrap();
        assert!(payload.is_delta());

        let terminals = outcome.changes.iter().find(|c| c.field == "terminals").unwrap();
        assert_eq!(terminals.modified, 1);
        let files = outcome.changes.iter().find(|c| c.field == "openFiles").unwrap();
        assert_eq!(files.added, 1);
    }

    #[test]
    fn test_apply_delta_checks_base_checksum() {
        let base = sample_state();
        let base_checksum = canonical_state_checksum(&base).unwrap();
        let delta = SerializedPayload::Delta {
            base_checksum: base_checksum.clone(),
            new_checksum: base_checksum,
            changes: vec![],
        };

        let (state, changes) = StateSerializer::apply_delta(&delta, &base).unwrap();
        assert_eq!(state, base);
        assert!(changes.is_empty());

        let mut other = base.clone();
        other.terminals.clear();
        assert!(matches!(
            StateSerializer::apply_delta(&delta, &other),
            Err(VaultError::BaseStateMismatch(_))
        ));
    }

    #[test]
    fn test_revive_legacy_dates_normalizes() {
        let mut value = json!({
            "metadata": {
                "savedAt": "2024-01-15T10:30:45Z",
                "alreadyCanonical": "2024-01-15T10:30:45.123Z",
                "notADate": "hello 2024",
            }
        });
        revive_legacy_dates(&mut value);
        assert_eq!(value["metadata"]["savedAt"], "2024-01-15T10:30:45.000Z");
        assert_eq!(value["metadata"]["alreadyCanonical"], "2024-01-15T10:30:45.123Z");
        assert_eq!(value["metadata"]["notADate"], "hello 2024");
    }

    #[test]
    fn test_deserialize_rejects_missing_sequence() {
        let serializer = StateSerializer::new(plain_config(), crypto());
        let payload = SerializedPayload::Full {
            state: json!({"terminals": []}),
        };
        let bytes = payload.to_bytes().unwrap();
        let checksum = Checksum::compute(&bytes);

        let result = serializer.deserialize(
            &bytes,
            &checksum,
            EncryptionAlgorithm::None,
            CompressionAlgorithm::None,
            None,
        );
        assert!(matches!(result, Err(VaultError::InvalidStateShape(_))));
    }
}
