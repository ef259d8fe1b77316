// /////////////////////////////////////////////////////////////////////////////
// Workspace Session Vault
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Recovery Engine
//!
//! Produces a usable workspace state when a stored payload fails integrity
//! or shape checks. Invoked by the read path only for failures in the
//! recoverable set (`IntegrityFailed`, `DecryptionFailed` on non-terminal
//! wrapping, `InvalidStateShape`, generic `Corrupted`); everything else
//! propagates untouched.
//!
//! Three capabilities compose:
//!
//! - **Structure validation** ([`RecoveryService::validate_basic_structure`]):
//!   reports missing or mistyped required sequences and whether recovery is
//!   worth attempting.
//! - **Partial extraction** ([`RecoveryService::extract_partial_state`]):
//!   scans the raw bytes for balanced-brace substrings and returns the
//!   first one that parses into something workspace-state-like. This is
//!   what salvages a state embedded in a corrupted outer envelope.
//! - **Repair** ([`RecoveryService::repair_workspace_state`]): fills
//!   missing sequences with empty arrays, drops malformed items, dedupes
//!   tabs by `(url, title)` and files by `path`, and preserves the opaque
//!   mappings verbatim.
//!
//! Conflicting candidate states merge under one of three strategies
//! (`latest`, `most-complete`, `manual`); see [`MergeStrategy`].

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{debug, warn};

use vault_domain::services::datetime_serde;
use vault_domain::value_objects::{
    BrowserTabState, Checksum, ConversationState, OpenFileState, TerminalState, WorkspaceState, REQUIRED_SEQUENCES,
};
use vault_domain::VaultError;

/// Seconds two same-identity items may drift apart before their timestamps
/// count as conflicting.
const CONFLICT_WINDOW_SECS: i64 = 60;

/// Report from structural validation of a raw payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub can_recover: bool,
}

/// Result of repairing a partial state.
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub state: WorkspaceState,
    /// Checksum of the repaired state's canonical JSON encoding
    pub checksum: Checksum,
    pub validation: StructureReport,
}

/// Result of running the full recovery path over corrupted bytes.
#[derive(Debug, Clone)]
pub struct RecoveryOutcome {
    pub state: WorkspaceState,
    pub checksum: Checksum,
    pub report: StructureReport,
}

/// Strategy for merging conflicting candidate states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Newest candidate wins; older candidates contribute items the base
    /// lacks
    Latest,
    /// Candidates ordered by a completeness score, then merged as `Latest`
    MostComplete,
    /// Newest candidate copied verbatim; conflicts emitted unresolved
    Manual,
}

impl FromStr for MergeStrategy {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest" => Ok(MergeStrategy::Latest),
            "most-complete" => Ok(MergeStrategy::MostComplete),
            "manual" => Ok(MergeStrategy::Manual),
            other => Err(VaultError::InternalError(format!("unknown merge strategy {:?}", other))),
        }
    }
}

/// One candidate state competing in a merge.
#[derive(Debug, Clone)]
pub struct MergeCandidate {
    pub state: WorkspaceState,
    pub last_saved_at: DateTime<Utc>,
}

/// A same-identity disagreement between two candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConflict {
    /// Wire name of the sequence (`terminals`, `browserTabs`, ...)
    pub field: String,
    /// Natural identifier of the conflicting item
    pub identifier: String,
    pub reasons: Vec<String>,
    pub base_value: Value,
    pub other_value: Value,
}

/// Result of a merge.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub resolved_state: WorkspaceState,
    pub conflicts: Vec<StateConflict>,
    pub warnings: Vec<String>,
}

/// Application service for corruption recovery and state merging.
#[derive(Debug, Clone, Default)]
pub struct RecoveryService;

impl RecoveryService {
    pub fn new() -> Self {
        Self
    }

    /// Validates the basic structure of raw payload bytes.
    ///
    /// `can_recover` is true when the bytes parsed as JSON and at least one
    /// required sequence is present as an array.
    pub fn validate_basic_structure(&self, bytes: &[u8]) -> StructureReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let value: Value = match serde_json::from_slice(bytes) {
            Ok(value) => value,
            Err(e) => {
                errors.push(format!("payload is not valid JSON: {}", e));
                return StructureReport {
                    errors,
                    warnings,
                    can_recover: false,
                };
            }
        };

        let Some(obj) = value.as_object() else {
            errors.push("payload is not a JSON object".to_string());
            return StructureReport {
                errors,
                warnings,
                can_recover: false,
            };
        };

        let mut present_arrays = 0usize;
        for field in REQUIRED_SEQUENCES {
            match obj.get(field) {
                None => errors.push(format!("missing required field {}", field)),
                Some(Value::Array(_)) => present_arrays += 1,
                Some(_) => warnings.push(format!("field {} is present but not an array", field)),
            }
        }

        StructureReport {
            errors,
            warnings,
            can_recover: present_arrays > 0,
        }
    }

    /// Scans corrupted bytes for balanced-brace substrings and returns the
    /// first candidate that parses into a workspace-state-like object.
    pub fn extract_partial_state(&self, bytes: &[u8]) -> Option<Value> {
        let text = String::from_utf8_lossy(bytes);
        for candidate in balanced_brace_candidates(&text) {
            if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                if WorkspaceState::is_state_like(&value) {
                    debug!(len = candidate.len(), "extracted state-like candidate from corrupted bytes");
                    return Some(value);
                }
            }
        }
        None
    }

    /// Repairs a partial state into a structurally-valid one.
    ///
    /// Missing sequences become empty arrays; items that do not decode as
    /// their element type are dropped; tabs dedupe by `(url, title)` and
    /// files by `path`; `workspaceConfig` and `metadata` pass through
    /// verbatim (defaulting to `{}` and fresh `createdAt`/`updatedAt`
    /// stamps).
    pub fn repair_workspace_state(&self, partial: &Value) -> Result<RepairOutcome, VaultError> {
        let empty = Map::new();
        let obj = partial.as_object().unwrap_or(&empty);

        let terminals: Vec<TerminalState> = decode_items(obj.get("terminals"));
        let conversations: Vec<ConversationState> = decode_items(obj.get("aiConversations"));

        let mut seen_tabs = HashSet::new();
        let browser_tabs: Vec<BrowserTabState> = decode_items(obj.get("browserTabs"))
            .into_iter()
            .filter(|tab: &BrowserTabState| {
                let (url, title) = tab.identity();
                seen_tabs.insert(format!("{}\u{1f}{}", url, title))
            })
            .collect();

        let mut seen_paths = HashSet::new();
        let open_files: Vec<OpenFileState> = decode_items(obj.get("openFiles"))
            .into_iter()
            .filter(|file: &OpenFileState| seen_paths.insert(file.path.clone()))
            .collect();

        let workspace_config = match obj.get("workspaceConfig") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        let metadata = match obj.get("metadata") {
            Some(Value::Object(map)) => map.clone(),
            _ => {
                let now = datetime_serde::to_canonical(&Utc::now());
                let mut map = Map::new();
                map.insert("createdAt".to_string(), json!(now));
                map.insert("updatedAt".to_string(), json!(now));
                map
            }
        };

        let state = WorkspaceState {
            terminals,
            browser_tabs,
            ai_conversations: conversations,
            open_files,
            workspace_config,
            metadata,
        };

        let canonical = serde_json::to_vec(&state)?;
        let checksum = Checksum::compute(&canonical);
        let validation = self.validate_basic_structure(&canonical);
        Ok(RepairOutcome {
            state,
            checksum,
            validation,
        })
    }

    /// Full recovery path: validate, extract if the top level is not itself
    /// a state, then repair. Fails `UnrecoverableCorruption` when no
    /// candidate survives.
    pub fn recover(&self, bytes: &[u8]) -> Result<RecoveryOutcome, VaultError> {
        let report = self.validate_basic_structure(bytes);

        let candidate: Option<Value> = match serde_json::from_slice::<Value>(bytes) {
            Ok(value) if WorkspaceState::is_state_like(&value) => Some(value),
            Ok(value) => self
                .extract_partial_state(bytes)
                .or(if report.can_recover { Some(value) } else { None }),
            Err(_) => self.extract_partial_state(bytes),
        };

        let Some(partial) = candidate else {
            warn!("recovery found no usable candidate in corrupted payload");
            return Err(VaultError::UnrecoverableCorruption(
                "no workspace-state candidate survived extraction".to_string(),
            ));
        };

        let repaired = self.repair_workspace_state(&partial)?;
        Ok(RecoveryOutcome {
            state: repaired.state,
            checksum: repaired.checksum,
            report,
        })
    }

    /// Merges candidate states under the given strategy.
    pub fn merge_conflicts(
        &self,
        mut candidates: Vec<MergeCandidate>,
        strategy: MergeStrategy,
    ) -> Result<MergeOutcome, VaultError> {
        if candidates.is_empty() {
            return Err(VaultError::NoCandidates("merge requires at least one candidate".to_string()));
        }

        match strategy {
            MergeStrategy::Latest => {
                candidates.sort_by(|a, b| b.last_saved_at.cmp(&a.last_saved_at));
                Ok(merge_ordered(candidates))
            }
            MergeStrategy::MostComplete => {
                candidates.sort_by(|a, b| {
                    completeness_score(&b.state)
                        .cmp(&completeness_score(&a.state))
                        .then(b.last_saved_at.cmp(&a.last_saved_at))
                });
                let scores: Vec<i64> = candidates.iter().map(|c| completeness_score(&c.state)).collect();
                debug!(?scores, "ordered merge candidates by completeness");
                Ok(merge_ordered(candidates))
            }
            MergeStrategy::Manual => {
                candidates.sort_by(|a, b| b.last_saved_at.cmp(&a.last_saved_at));
                let base = candidates[0].state.clone();
                let mut conflicts = Vec::new();
                for other in &candidates[1..] {
                    detect_conflicts(&base, &other.state, &mut conflicts);
                }
                Ok(MergeOutcome {
                    resolved_state: base,
                    conflicts,
                    warnings: vec!["conflicts require manual resolution".to_string()],
                })
            }
        }
    }
}

/// Decodes every element of an optional array that parses as `T`, dropping
/// the rest.
fn decode_items<T: DeserializeOwned>(value: Option<&Value>) -> Vec<T> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect(),
        _ => Vec::new(),
    }
}

/// Finds balanced-brace substrings, outermost-first, string- and
/// escape-aware.
fn balanced_brace_candidates(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut candidates: Vec<(usize, usize)> = Vec::new();
    let mut stack: Vec<usize> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => stack.push(i),
            b'}' if !in_string => {
                if let Some(start) = stack.pop() {
                    candidates.push((start, i + 1));
                }
            }
            _ => {}
        }
    }

    // Outermost candidates first: earliest start, longest span.
    candidates.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
    candidates
        .into_iter()
        .filter_map(|(start, end)| text.get(start..end))
        .collect()
}

/// Completeness score used by the `most-complete` strategy.
fn completeness_score(state: &WorkspaceState) -> i64 {
    let mut score = 0i64;

    score += 10 * state.terminals.len() as i64;
    if state.terminals.iter().any(|t| t.is_active) {
        score += 50;
    }

    score += 5 * state.browser_tabs.len() as i64;
    if state.browser_tabs.iter().any(|t| t.is_active) {
        score += 30;
    }

    score += 15 * state.ai_conversations.len() as i64;
    let day_ago = Utc::now() - Duration::hours(24);
    score += 10
        * state
            .ai_conversations
            .iter()
            .filter(|c| matches!(c.updated_at, Some(at) if at >= day_ago))
            .count() as i64;

    score += 8 * state.open_files.len() as i64;
    if state.open_files.iter().any(|f| f.has_unsaved_changes) {
        score += 25;
    }

    score += 3 * state.workspace_config.len() as i64;
    score += 2 * state.metadata.len() as i64;
    score
}

/// Merges an ordered candidate list: the first entry is the base, each
/// later entry contributes items the base lacks, and same-identity
/// disagreements are recorded as conflicts with the base winning.
fn merge_ordered(candidates: Vec<MergeCandidate>) -> MergeOutcome {
    let mut conflicts = Vec::new();
    let mut warnings = Vec::new();
    let mut iter = candidates.into_iter();
    let mut base = match iter.next() {
        Some(first) => first.state,
        None => WorkspaceState::empty(),
    };

    for older in iter {
        merge_into(&mut base, &older.state, &mut conflicts);
    }

    if !conflicts.is_empty() {
        warnings.push(format!("{} conflict(s) resolved in favor of the base state", conflicts.len()));
    }

    MergeOutcome {
        resolved_state: base,
        conflicts,
        warnings,
    }
}

fn merge_into(base: &mut WorkspaceState, other: &WorkspaceState, conflicts: &mut Vec<StateConflict>) {
    merge_sequence(
        &mut base.terminals,
        &other.terminals,
        "terminals",
        |t| t.id.clone(),
        |t| t.updated_at,
        |t| t.is_active,
        conflicts,
    );
    merge_sequence(
        &mut base.browser_tabs,
        &other.browser_tabs,
        "browserTabs",
        |t| {
            let (url, title) = t.identity();
            format!("{}\u{1f}{}", url, title)
        },
        |t| t.updated_at,
        |t| t.is_active,
        conflicts,
    );
    merge_sequence(
        &mut base.ai_conversations,
        &other.ai_conversations,
        "aiConversations",
        |c| c.id.clone(),
        |c| c.updated_at,
        |c| c.is_active,
        conflicts,
    );
    merge_sequence(
        &mut base.open_files,
        &other.open_files,
        "openFiles",
        |f| f.path.clone(),
        |f| f.updated_at,
        |f| f.has_unsaved_changes,
        conflicts,
    );
}

/// Detects conflicts between a base and another candidate without mutating
/// the base (a scratch copy absorbs the merge side effects).
fn detect_conflicts(base: &WorkspaceState, other: &WorkspaceState, conflicts: &mut Vec<StateConflict>) {
    let mut scratch = base.clone();
    merge_into(&mut scratch, other, conflicts);
}

fn merge_sequence<T, K, U, A>(
    base: &mut Vec<T>,
    other: &[T],
    field: &str,
    key: K,
    updated_at: U,
    active_flag: A,
    conflicts: &mut Vec<StateConflict>,
) where
    T: Clone + PartialEq + Serialize,
    K: Fn(&T) -> String,
    U: Fn(&T) -> Option<DateTime<Utc>>,
    A: Fn(&T) -> bool,
{
    use std::collections::HashMap;

    let base_index: HashMap<String, usize> = base.iter().enumerate().map(|(i, item)| (key(item), i)).collect();

    for item in other {
        let id = key(item);
        match base_index.get(&id) {
            None => base.push(item.clone()),
            Some(&i) => {
                let held = &base[i];
                if held == item {
                    continue;
                }

                let mut reasons = Vec::new();
                if let (Some(a), Some(b)) = (updated_at(held), updated_at(item)) {
                    if (a - b).num_seconds().abs() > CONFLICT_WINDOW_SECS {
                        reasons.push("timestamps differ by more than 60 seconds".to_string());
                    }
                }
                if active_flag(held) != active_flag(item) {
                    reasons.push("active flag differs".to_string());
                }
                if content_differs(held, item) {
                    reasons.push("content differs".to_string());
                }

                if !reasons.is_empty() {
                    conflicts.push(StateConflict {
                        field: field.to_string(),
                        identifier: id,
                        reasons,
                        base_value: serde_json::to_value(held).unwrap_or(Value::Null),
                        other_value: serde_json::to_value(item).unwrap_or(Value::Null),
                    });
                }
            }
        }
    }
}

/// Compares two items with their volatile timestamp stripped, so pure clock
/// drift inside the conflict window does not count as a content change.
fn content_differs<T: Serialize>(a: &T, b: &T) -> bool {
    let strip = |item: &T| -> Value {
        let mut value = serde_json::to_value(item).unwrap_or(Value::Null);
        if let Some(obj) = value.as_object_mut() {
            obj.remove("updatedAt");
        }
        value
    };
    strip(a) != strip(b)
}
