// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Workspace State
//!
//! The full captured contents of one developer workspace at a moment in
//! time: open terminals, browser tabs, AI conversation transcripts, and open
//! files, plus two opaque mappings for workspace configuration and metadata.
//!
//! ## Structural Validity
//!
//! A state is structurally valid iff all four required sequences are present
//! as JSON arrays. Absence of any one makes the state corrupt but
//! potentially recoverable (the recovery engine fills missing sequences and
//! drops malformed items).
//!
//! ## Wire Format
//!
//! Field names on the wire are camelCase (`browserTabs`, `openFiles`,
//! `hasUnsavedChanges`, ...) to match the persisted payload format. Element
//! identity: terminals and conversations by `id`, files by `path`, tabs by
//! the `(url, title)` composite. Timestamps are RFC3339 UTC with
//! milliseconds, carried explicitly on typed fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::services::datetime_serde;
use crate::VaultError;

/// The four sequence fields every structurally-valid state must carry.
pub const REQUIRED_SEQUENCES: [&str; 4] = ["terminals", "browserTabs", "aiConversations", "openFiles"];

/// Captured state of a single terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalState {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<String>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub environment: Map<String, Value>,

    #[serde(default)]
    pub is_active: bool,

    #[serde(
        default,
        with = "datetime_serde::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,

    /// Fields the engine does not interpret but must carry through intact.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Captured state of a single browser tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserTabState {
    pub url: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub is_active: bool,

    #[serde(
        default,
        with = "datetime_serde::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Captured state of a single AI conversation transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Value>,

    #[serde(default)]
    pub is_active: bool,

    #[serde(
        default,
        with = "datetime_serde::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Captured state of a single open file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenFileState {
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_line: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_column: Option<u32>,

    #[serde(default)]
    pub has_unsaved_changes: bool,

    #[serde(
        default,
        with = "datetime_serde::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The full workspace state value object.
///
/// A value, not an identity: two states with the same contents are the same
/// state. All four sequences are required; `workspace_config` and `metadata`
/// are opaque mappings preserved verbatim through the pipeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceState {
    pub terminals: Vec<TerminalState>,
    pub browser_tabs: Vec<BrowserTabState>,
    pub ai_conversations: Vec<ConversationState>,
    pub open_files: Vec<OpenFileState>,

    #[serde(default)]
    pub workspace_config: Map<String, Value>,

    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl WorkspaceState {
    /// Creates an empty, structurally-valid state
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validates the structural shape of a raw JSON value.
    ///
    /// Fails `InvalidStateShape` naming every missing or non-array required
    /// sequence. This is the same check the serializer applies on both the
    /// write and read paths.
    pub fn validate_shape(value: &Value) -> Result<(), VaultError> {
        let obj = value.as_object().ok_or_else(|| {
            VaultError::InvalidStateShape("workspace state must be an object".to_string())
        })?;

        let missing: Vec<&str> = REQUIRED_SEQUENCES
            .iter()
            .filter(|field| !matches!(obj.get(**field), Some(Value::Array(_))))
            .copied()
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(VaultError::InvalidStateShape(format!(
                "missing required sequence(s): {}",
                missing.join(", ")
            )))
        }
    }

    /// Checks whether a raw JSON value looks like a workspace state (all
    /// four required sequences present as arrays). Used by the recovery
    /// engine when scanning corrupted payloads for candidates.
    pub fn is_state_like(value: &Value) -> bool {
        Self::validate_shape(value).is_ok()
    }

    /// Total element count across the four sequences
    pub fn item_count(&self) -> usize {
        self.terminals.len() + self.browser_tabs.len() + self.ai_conversations.len() + self.open_files.len()
    }
}

impl BrowserTabState {
    /// Composite identity of a tab on the wire
    pub fn identity(&self) -> (&str, &str) {
        (&self.url, &self.title)
    }
}
